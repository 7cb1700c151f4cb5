// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license
#![allow(clippy::type_complexity)]
pub mod compliance; // PPE 合规判定
pub mod config; // 命令行参数与配置文件
pub mod detection; // 检测器接口 (人员 / PPE)
pub mod input; // 图片采集 (文件 / 摄像头)
pub mod models; // 模型接口与具体实现
pub mod ort_backend;
pub mod pipeline; // 检测 → 裁剪 → 核验 流水线
pub mod renderer; // 结果标注绘制
pub mod report; // 文本/JSON 报告

pub use crate::compliance::{ComplianceResult, Equipment, LabelMap};
pub use crate::config::{Args, InspectorConfig};
pub use crate::detection::{Detection, ObjectDetector, PersonDetector, YoloDetector};
pub use crate::models::{Model, YOLOv8};
pub use crate::ort_backend::{Batch, OrtBackend, OrtConfig, OrtEP};
pub use crate::pipeline::{InspectionReport, InspectionSettings, Inspector, PersonReport};

/// 非极大值抑制: 按置信度降序, 与已保留框 IoU 超过阈值的框被丢弃
pub fn non_max_suppression(xs: &mut Vec<Bbox>, iou_threshold: f32) {
    xs.sort_by(|b1, b2| b2.confidence().total_cmp(&b1.confidence()));

    let mut current_index = 0;
    for index in 0..xs.len() {
        let mut drop = false;
        for prev_index in 0..current_index {
            let iou = xs[prev_index].iou(&xs[index]);
            if iou > iou_threshold {
                drop = true;
                break;
            }
        }
        if !drop {
            xs.swap(current_index, index);
            current_index += 1;
        }
    }
    xs.truncate(current_index);
}

/// 本地时间字符串, 用于输出文件命名
pub fn gen_time_string(delimiter: &str) -> String {
    let t_now = chrono::Local::now();
    let fmt = format!(
        "%Y{}%m{}%d{}%H{}%M{}%S{}%3f",
        delimiter, delimiter, delimiter, delimiter, delimiter, delimiter
    );
    t_now.format(&fmt).to_string()
}

/// 单张图片的原始检测结果 (模型输入坐标系 → 原图坐标系之后)
#[derive(Debug, Clone, PartialEq, Default)]
pub struct DetectionResult {
    pub bboxes: Vec<Bbox>,
}

impl DetectionResult {
    pub fn new(bboxes: Vec<Bbox>) -> Self {
        Self { bboxes }
    }

    pub fn bboxes(&self) -> &[Bbox] {
        &self.bboxes
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Bbox {
    // a bounding box around an object
    xmin: f32,
    ymin: f32,
    width: f32,
    height: f32,
    id: usize,
    confidence: f32,
}

impl Bbox {
    pub fn new(xmin: f32, ymin: f32, width: f32, height: f32, id: usize, confidence: f32) -> Self {
        Self {
            xmin,
            ymin,
            width,
            height,
            id,
            confidence,
        }
    }

    pub fn new_from_xyxy(x1: f32, y1: f32, x2: f32, y2: f32, id: usize, confidence: f32) -> Self {
        Self::new(x1, y1, x2 - x1, y2 - y1, id, confidence)
    }

    pub fn width(&self) -> f32 {
        self.width
    }

    pub fn height(&self) -> f32 {
        self.height
    }

    pub fn xmin(&self) -> f32 {
        self.xmin
    }

    pub fn ymin(&self) -> f32 {
        self.ymin
    }

    pub fn xmax(&self) -> f32 {
        self.xmin + self.width
    }

    pub fn ymax(&self) -> f32 {
        self.ymin + self.height
    }

    pub fn id(&self) -> usize {
        self.id
    }

    pub fn confidence(&self) -> f32 {
        self.confidence
    }

    pub fn area(&self) -> f32 {
        self.width * self.height
    }

    pub fn intersection_area(&self, another: &Bbox) -> f32 {
        let l = self.xmin.max(another.xmin);
        let r = self.xmax().min(another.xmax());
        let t = self.ymin.max(another.ymin);
        let b = self.ymax().min(another.ymax());
        (r - l).max(0.) * (b - t).max(0.)
    }

    pub fn union(&self, another: &Bbox) -> f32 {
        self.area() + another.area() - self.intersection_area(another)
    }

    pub fn iou(&self, another: &Bbox) -> f32 {
        let union = self.union(another);
        if union <= 0. {
            return 0.;
        }
        self.intersection_area(another) / union
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_iou_identical_and_disjoint() {
        let a = Bbox::new(0., 0., 10., 10., 0, 0.9);
        let b = Bbox::new(20., 20., 10., 10., 0, 0.8);
        assert!((a.iou(&a) - 1.0).abs() < 1e-6);
        assert_eq!(a.iou(&b), 0.0);
    }

    #[test]
    fn test_iou_degenerate_box() {
        let a = Bbox::new(5., 5., 0., 0., 0, 0.9);
        assert_eq!(a.iou(&a), 0.0);
    }

    #[test]
    fn test_nms_keeps_highest_confidence() {
        let mut xs = vec![
            Bbox::new(0., 0., 10., 10., 0, 0.6),
            Bbox::new(1., 1., 10., 10., 0, 0.9),
            Bbox::new(50., 50., 10., 10., 0, 0.7),
        ];
        non_max_suppression(&mut xs, 0.45);
        assert_eq!(xs.len(), 2);
        assert_eq!(xs[0].confidence(), 0.9);
        assert_eq!(xs[1].confidence(), 0.7);
    }

    #[test]
    fn test_xyxy_constructor() {
        let b = Bbox::new_from_xyxy(10., 20., 30., 60., 3, 0.5);
        assert_eq!(b.width(), 20.);
        assert_eq!(b.height(), 40.);
        assert_eq!(b.xmax(), 30.);
        assert_eq!(b.ymax(), 60.);
        assert_eq!(b.id(), 3);
    }
}
