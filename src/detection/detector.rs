// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license
//! 检测器 (Detector)
//! 职责: 图片 → 模型推理 → 带类别名的 Detection 列表

use std::collections::BTreeMap;
use std::time::Instant;

use anyhow::{Context, Result};
use image::DynamicImage;
use log::debug;

use super::types::Detection;
use crate::models::{Model, YOLOv8};

/// COCO类别: 0=person
pub const COCO_PERSON_CLASS: usize = 0;

/// 外部检测器的统一接口
///
/// 同步调用, 允许返回空列表。实现方负责把类别 id 解析成标签字符串。
pub trait ObjectDetector {
    fn detect(&mut self, image: &DynamicImage) -> Result<Vec<Detection>>;

    /// 模型词表 (按类别 id 排列)
    fn names(&self) -> &[String];
}

impl<T: ObjectDetector + ?Sized> ObjectDetector for Box<T> {
    fn detect(&mut self, image: &DynamicImage) -> Result<Vec<Detection>> {
        (**self).detect(image)
    }

    fn names(&self) -> &[String] {
        (**self).names()
    }
}

impl<T: ObjectDetector + ?Sized> ObjectDetector for &mut T {
    fn detect(&mut self, image: &DynamicImage) -> Result<Vec<Detection>> {
        (**self).detect(image)
    }

    fn names(&self) -> &[String] {
        (**self).names()
    }
}

/// 基于 YOLO 系列模型的检测器
pub struct YoloDetector<M: Model = YOLOv8> {
    model: M,
    tag: String,
    profile: bool,
}

impl<M: Model> YoloDetector<M> {
    pub fn new(model: M, tag: impl Into<String>) -> Self {
        Self {
            model,
            tag: tag.into(),
            profile: false,
        }
    }

    pub fn with_profile(mut self, profile: bool) -> Self {
        self.profile = profile;
        self
    }
}

impl<M: Model> ObjectDetector for YoloDetector<M> {
    fn detect(&mut self, image: &DynamicImage) -> Result<Vec<Detection>> {
        let images = std::slice::from_ref(image);

        let t_pre = Instant::now();
        let xs = self.model.preprocess(images)?;
        let t_run = Instant::now();
        let ys = self
            .model
            .run(xs, self.profile)
            .with_context(|| format!("{} inference failed", self.tag))?;
        let t_post = Instant::now();
        let results = self.model.postprocess(ys, images)?;

        if self.profile {
            debug!(
                "⏱️ [{}] 预处理:{:?} | 推理:{:?} | 后处理:{:?}",
                self.tag,
                t_run - t_pre,
                t_post - t_run,
                t_post.elapsed()
            );
        }

        let names = self.model.names();
        let detections: Vec<Detection> = results
            .iter()
            .flat_map(|r| r.bboxes().iter())
            .map(|b| Detection::from_bbox(b, names))
            .collect();

        if log::log_enabled!(log::Level::Debug) && !detections.is_empty() {
            let mut class_counts: BTreeMap<&str, usize> = BTreeMap::new();
            for d in &detections {
                *class_counts.entry(d.label.as_str()).or_insert(0) += 1;
            }
            debug!("🔍 [{}] 原始检测: {:?}", self.tag, class_counts);
        }

        Ok(detections)
    }

    fn names(&self) -> &[String] {
        self.model.names()
    }
}

/// 人员检测器: 只保留 person 类别的检测结果
pub struct PersonDetector<D> {
    inner: D,
    person_class: usize,
}

impl<D: ObjectDetector> PersonDetector<D> {
    pub fn new(inner: D) -> Self {
        Self::with_class(inner, COCO_PERSON_CLASS)
    }

    pub fn with_class(inner: D, person_class: usize) -> Self {
        Self {
            inner,
            person_class,
        }
    }

    /// 整图人员定位, 保持检测器给出的顺序
    pub fn detect_people(&mut self, image: &DynamicImage) -> Result<Vec<Detection>> {
        let all = self.inner.detect(image)?;
        let total = all.len();
        let people: Vec<Detection> = all
            .into_iter()
            .filter(|d| d.class_id == self.person_class)
            .collect();
        debug!("🔍 原始检测: 总{}个 | 人{}个", total, people.len());
        Ok(people)
    }
}

impl<D: ObjectDetector> ObjectDetector for PersonDetector<D> {
    fn detect(&mut self, image: &DynamicImage) -> Result<Vec<Detection>> {
        self.detect_people(image)
    }

    fn names(&self) -> &[String] {
        self.inner.names()
    }
}
