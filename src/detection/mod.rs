// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license
/// 检测系统 (Detection System)
///
/// 两个外部检测器在这里被统一为 `ObjectDetector`:
/// - PersonDetector: 整图人员定位 (仅保留 person 类别)
/// - PPE 检测器:     对单人裁剪图做装备检测
pub mod detector;
pub mod types;

pub use detector::{ObjectDetector, PersonDetector, YoloDetector, COCO_PERSON_CLASS};
pub use types::{BoxXyxy, Detection};
