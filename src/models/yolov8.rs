// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license
//
// YOLOv8 检测模型实现
// 包含: 模型加载、预处理、推理、后处理 (检测头 [N, 4 + nc, anchors])

use std::collections::BTreeMap;
use std::time::Instant;

use anyhow::{anyhow, Result};
use image::{DynamicImage, GenericImageView};
use log::{debug, info};
use ndarray::{s, Array, Axis, IxDyn};

use crate::{non_max_suppression, Bbox, DetectionResult, OrtBackend, OrtConfig, OrtEP};

/// 灰色填充值 (与 ultralytics letterbox 一致)
const PAD_VALUE: f32 = 144.0 / 255.0;

/// YOLOv8 配置
#[derive(Debug, Clone)]
pub struct YOLOv8Config {
    pub ort: OrtConfig,
    pub conf: f32,
    pub iou: f32,
    /// 类别间互不抑制 (false 时按类别分别做 NMS)
    pub agnostic_nms: bool,
    /// 模型元数据缺少 `names` 时使用
    pub names: Option<Vec<String>>,
    pub profile: bool,
}

/// YOLOv8 完整模型结构
pub struct YOLOv8 {
    engine: OrtBackend,
    post: YOLOv8Postprocessor,
    names: Vec<String>,
    profile: bool,
}

impl YOLOv8 {
    /// 从配置创建 YOLOv8 模型
    pub fn new(config: YOLOv8Config) -> Result<Self> {
        let engine = OrtBackend::build(config.ort)?;

        // class names: 元数据优先, 其次配置
        let names = engine
            .names()
            .or(config.names)
            .unwrap_or_default();

        let post = YOLOv8Postprocessor {
            width: engine.width(),
            height: engine.height(),
            conf: config.conf,
            iou: config.iou,
            agnostic_nms: config.agnostic_nms,
        };

        Ok(Self {
            engine,
            post,
            names,
            profile: config.profile,
        })
    }
}

impl super::Model for YOLOv8 {
    fn preprocess(&mut self, images: &[DynamicImage]) -> Result<Vec<Array<f32, IxDyn>>> {
        let t = Instant::now();
        let xs = preprocess(images, self.post.width, self.post.height);
        if self.profile {
            debug!("[Model Preprocess]: {:?}", t.elapsed());
        }
        Ok(vec![xs])
    }

    fn run(&mut self, xs: Vec<Array<f32, IxDyn>>, profile: bool) -> Result<Vec<Array<f32, IxDyn>>> {
        let x = xs
            .into_iter()
            .next()
            .ok_or_else(|| anyhow!("No input tensor"))?;
        self.engine.run(x, profile || self.profile)
    }

    fn postprocess(
        &self,
        xs: Vec<Array<f32, IxDyn>>,
        xs0: &[DynamicImage],
    ) -> Result<Vec<DetectionResult>> {
        let t = Instant::now();
        let ys = self.post.postprocess(&xs, xs0)?;
        if self.profile {
            debug!("[Model Postprocess]: {:?}", t.elapsed());
        }
        Ok(ys)
    }

    fn names(&self) -> &[String] {
        &self.names
    }

    fn summary(&self) {
        info!(
            "🧠 YOLOv8 | EP: {:?}{} | nc: {} | conf: {} | iou: {}",
            self.engine.ep(),
            if let OrtEP::CPU = self.engine.ep() {
                ""
            } else {
                " (May still fall back to CPU)"
            },
            self.names.len(),
            self.post.conf,
            self.post.iou,
        );
        self.engine.summary();
    }
}

fn scale_wh(w0: f32, h0: f32, w1: f32, h1: f32) -> (f32, f32, f32) {
    let r = (w1 / w0).min(h1 / h0);
    (r, (w0 * r).round(), (h0 * r).round())
}

/// 等比缩放到左上角, 其余区域灰色填充, 输出 NCHW / RGB / [0,1]
pub fn preprocess(xs: &[DynamicImage], width: u32, height: u32) -> Array<f32, IxDyn> {
    let mut ys = Array::from_elem((xs.len(), 3, height as usize, width as usize), PAD_VALUE)
        .into_dyn();
    for (idx, x) in xs.iter().enumerate() {
        let (w0, h0) = x.dimensions();
        let (_, w_new, h_new) = scale_wh(w0 as f32, h0 as f32, width as f32, height as f32);
        let img = x.resize_exact(
            (w_new as u32).clamp(1, width),
            (h_new as u32).clamp(1, height),
            image::imageops::FilterType::Triangle,
        );

        for (x, y, rgb) in img.pixels() {
            let x = x as usize;
            let y = y as usize;
            let [r, g, b, _] = rgb.0;
            ys[[idx, 0, y, x]] = (r as f32) / 255.0;
            ys[[idx, 1, y, x]] = (g as f32) / 255.0;
            ys[[idx, 2, y, x]] = (b as f32) / 255.0;
        }
    }
    ys
}

/// YOLOv8 检测头后处理器
///
/// 与推理会话分离, 便于单独测试。
#[derive(Debug, Clone)]
pub struct YOLOv8Postprocessor {
    pub width: u32,
    pub height: u32,
    pub conf: f32,
    pub iou: f32,
    pub agnostic_nms: bool,
}

impl YOLOv8Postprocessor {
    pub fn postprocess(
        &self,
        xs: &[Array<f32, IxDyn>],
        xs0: &[DynamicImage],
    ) -> Result<Vec<DetectionResult>> {
        const CXYWH_OFFSET: usize = 4;

        let preds = xs.first().ok_or_else(|| anyhow!("Model produced no outputs"))?;
        if preds.ndim() != 3 {
            return Err(anyhow!(
                "Unexpected detection output shape {:?}, expected [batch, 4 + nc, anchors]",
                preds.shape()
            ));
        }
        let nc = preds.shape()[1]
            .checked_sub(CXYWH_OFFSET)
            .filter(|nc| *nc > 0)
            .ok_or_else(|| anyhow!("Detection output has no class channels: {:?}", preds.shape()))?;

        let mut ys = Vec::with_capacity(xs0.len());
        for (idx, anchor) in preds.axis_iter(Axis(0)).enumerate() {
            let Some(x0) = xs0.get(idx) else {
                break;
            };
            let width_original = x0.width() as f32;
            let height_original = x0.height() as f32;
            let ratio = (self.width as f32 / width_original)
                .min(self.height as f32 / height_original);

            let mut data: Vec<Bbox> = Vec::new();
            for pred in anchor.axis_iter(Axis(1)) {
                let bbox = pred.slice(s![0..CXYWH_OFFSET]);
                let clss = pred.slice(s![CXYWH_OFFSET..CXYWH_OFFSET + nc]);

                let (id, confidence) = clss
                    .iter()
                    .copied()
                    .enumerate()
                    .fold((0, f32::MIN), |max, x| if x.1 > max.1 { x } else { max });

                if confidence < self.conf {
                    continue;
                }

                let cx = bbox[0] / ratio;
                let cy = bbox[1] / ratio;
                let w = bbox[2] / ratio;
                let h = bbox[3] / ratio;
                let x1 = (cx - w / 2.).clamp(0., width_original);
                let y1 = (cy - h / 2.).clamp(0., height_original);
                let x2 = (cx + w / 2.).clamp(0., width_original);
                let y2 = (cy + h / 2.).clamp(0., height_original);
                data.push(Bbox::new_from_xyxy(x1, y1, x2, y2, id, confidence));
            }

            let bboxes = if self.agnostic_nms {
                non_max_suppression(&mut data, self.iou);
                data
            } else {
                self.per_class_nms(data)
            };
            ys.push(DetectionResult::new(bboxes));
        }

        Ok(ys)
    }

    fn per_class_nms(&self, data: Vec<Bbox>) -> Vec<Bbox> {
        let mut by_class: BTreeMap<usize, Vec<Bbox>> = BTreeMap::new();
        for b in data {
            by_class.entry(b.id()).or_default().push(b);
        }
        let mut kept: Vec<Bbox> = by_class
            .into_values()
            .flat_map(|mut group| {
                non_max_suppression(&mut group, self.iou);
                group
            })
            .collect();
        kept.sort_by(|a, b| b.confidence().total_cmp(&a.confidence()));
        kept
    }
}
