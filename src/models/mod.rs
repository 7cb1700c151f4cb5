// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license
//! 模型统一接口与实现
//!
//! # 架构说明
//!
//! - **YOLOv8**: 完整模型实现 (加载 / 预处理 / 推理 / 后处理), 文件 `yolov8.rs`。
//!   人员检测 (COCO yolov8n) 与 PPE 检测 (自训练 best) 都是 YOLOv8 检测头,
//!   共用同一实现, 仅类别表不同。YOLOv11 的 ONNX 输出与 v8 相同, 也可直接加载。
//! - **hub**: 模型路径解析, 支持本地路径与 http(s) 下载缓存。
//!
//! ## Model Trait
//! 统一的模型接口, 定义标准流程: preprocess → run → postprocess
//!
use anyhow::Result;
use image::DynamicImage;
use ndarray::{Array, IxDyn};

use crate::DetectionResult;

pub mod hub;
pub mod yolov8;

pub use hub::resolve_model;
pub use yolov8::{YOLOv8, YOLOv8Config};

/// 统一的深度学习模型接口
///
/// ## 核心流程
/// ```text
/// 原始图片 → preprocess → ndarray张量
///          ↓
///     推理引擎 run
///          ↓
///     原始输出 → postprocess → 检测结果
/// ```
pub trait Model {
    /// 预处理: 图片 → NCHW 张量
    fn preprocess(&mut self, images: &[DynamicImage]) -> Result<Vec<Array<f32, IxDyn>>>;

    /// 推理: 执行模型前向传播, 返回原始输出(未解码)
    fn run(&mut self, xs: Vec<Array<f32, IxDyn>>, profile: bool) -> Result<Vec<Array<f32, IxDyn>>>;

    /// 后处理: 原始输出 → 检测结果 (坐标还原到 `xs0` 中各原图)
    fn postprocess(
        &self,
        xs: Vec<Array<f32, IxDyn>>,
        xs0: &[DynamicImage],
    ) -> Result<Vec<DetectionResult>>;

    /// 类别名表
    fn names(&self) -> &[String];

    /// 打印模型信息
    fn summary(&self);
}
