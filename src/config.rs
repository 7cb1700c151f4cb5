// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license
//! 命令行参数与 JSON 配置
//!
//! 优先级: 命令行 > 配置文件 > 默认值

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Parser;
use log::info;
use serde::{Deserialize, Serialize};

use crate::compliance::{Equipment, LabelMap};
use crate::detection::COCO_PERSON_CLASS;
use crate::input::ImageSource;
use crate::ort_backend::{Batch, OrtConfig, OrtEP};
use crate::pipeline::InspectionSettings;
use crate::report::ReportFormat;

/// PPE 合规检查 - 检测人员并核验安全帽、反光背心、安全靴
#[derive(Parser, Debug, Clone)]
#[command(author, version, about = "PPE compliance inspector (person + PPE detection)", long_about = None)]
pub struct Args {
    /// 待检查图片 (JPEG / PNG)
    #[arg(short, long)]
    pub image: Option<PathBuf>,

    /// 从摄像头抓拍一帧 (设备索引或名称)
    #[arg(long, num_args = 0..=1, default_missing_value = "0", conflicts_with = "image")]
    pub camera: Option<String>,

    /// 人员检测模型 (ONNX 路径或 http(s) 地址)
    #[arg(long, default_value = "models/yolov8n.onnx")]
    pub person_model: String,

    /// PPE 检测模型 (ONNX 路径或 http(s) 地址)
    #[arg(long, default_value = "models/ppe-best.onnx")]
    pub ppe_model: String,

    /// 检测置信度阈值 (两个模型)
    #[arg(long)]
    pub conf: Option<f32>,

    /// NMS IoU 阈值
    #[arg(long)]
    pub iou: Option<f32>,

    /// PPE 计入合规的最低置信度 (默认不设)
    #[arg(long)]
    pub min_ppe_conf: Option<f32>,

    /// 人员模型中 person 的类别 id
    #[arg(long)]
    pub person_class: Option<usize>,

    /// 推理输入宽度 (仅动态输入模型)
    #[arg(long)]
    pub width: Option<u32>,

    /// 推理输入高度 (仅动态输入模型)
    #[arg(long)]
    pub height: Option<u32>,

    /// 使用 CUDA
    #[arg(long)]
    pub cuda: bool,

    /// 使用 TensorRT
    #[arg(long)]
    pub trt: bool,

    /// GPU 设备 id
    #[arg(long, default_value_t = 0)]
    pub device_id: i32,

    /// TensorRT fp16
    #[arg(long)]
    pub fp16: bool,

    /// JSON 配置文件 (标签映射、阈值)
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// 报告格式
    #[arg(short, long, value_enum, default_value_t = ReportFormat::Text)]
    pub format: ReportFormat,

    /// 标注图片输出目录
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// 标注字体 (TTF/OTF)
    #[arg(long)]
    pub font: Option<PathBuf>,

    /// 存在不合规人员时以非零状态退出
    #[arg(long)]
    pub strict: bool,

    /// 打印各阶段耗时
    #[arg(long)]
    pub profile: bool,
}

impl Args {
    pub fn source(&self) -> Option<ImageSource> {
        if let Some(path) = &self.image {
            Some(ImageSource::File(path.clone()))
        } else {
            self.camera.as_ref().map(|device| ImageSource::Camera {
                device: device.clone(),
            })
        }
    }

    pub fn ep(&self) -> OrtEP {
        if self.trt {
            OrtEP::Trt(self.device_id)
        } else if self.cuda {
            OrtEP::CUDA(self.device_id)
        } else {
            OrtEP::CPU
        }
    }

    pub fn ort_config(&self, model: PathBuf) -> OrtConfig {
        OrtConfig {
            f: model,
            ep: self.ep(),
            trt_fp16: self.fp16,
            batch: Batch::default(),
            image_size: (self.height, self.width),
        }
    }
}

/// 检查器配置 (JSON)
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InspectorConfig {
    // === 检测参数 ===
    pub person_conf_threshold: f32, // 人员检测置信度阈值
    pub ppe_conf_threshold: f32,    // PPE检测置信度阈值
    pub iou_threshold: f32,         // NMS IOU阈值
    pub person_class_id: usize,     // person 类别 id

    // === 合规参数 ===
    pub min_ppe_confidence: Option<f32>, // PPE 计入合规的最低置信度
    pub label_aliases: BTreeMap<String, Equipment>, // 模型标签 → 装备

    // === 输出 ===
    pub font_path: Option<PathBuf>,
}

impl Default for InspectorConfig {
    fn default() -> Self {
        Self {
            // ultralytics predict 默认值
            person_conf_threshold: 0.25,
            ppe_conf_threshold: 0.25,
            iou_threshold: 0.7,
            person_class_id: COCO_PERSON_CLASS,

            min_ppe_confidence: None,
            label_aliases: LabelMap::default().aliases().clone(),

            font_path: None,
        }
    }
}

impl InspectorConfig {
    /// 从JSON文件加载配置, 文件不存在时写出默认配置
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            info!("📝 配置文件不存在,创建默认配置: {}", path.display());
            let config = Self::default();
            config.save(path)?;
            return Ok(config);
        }
        let json = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config {}", path.display()))?;
        let config: Self = serde_json::from_str(&json)
            .with_context(|| format!("Failed to parse config {}", path.display()))?;
        info!("✅ 配置已从 {} 加载", path.display());
        Ok(config)
    }

    /// 保存配置到JSON文件
    pub fn save(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json).with_context(|| format!("Failed to write config {}", path.display()))?;
        info!("💾 配置已保存到 {}", path.display());
        Ok(())
    }

    /// 命令行覆盖
    pub fn apply_args(&mut self, args: &Args) {
        if let Some(conf) = args.conf {
            self.person_conf_threshold = conf;
            self.ppe_conf_threshold = conf;
        }
        if let Some(iou) = args.iou {
            self.iou_threshold = iou;
        }
        if let Some(min) = args.min_ppe_conf {
            self.min_ppe_confidence = Some(min);
        }
        if let Some(class) = args.person_class {
            self.person_class_id = class;
        }
        if let Some(font) = &args.font {
            self.font_path = Some(font.clone());
        }
    }

    pub fn label_map(&self) -> LabelMap {
        LabelMap::from_aliases(self.label_aliases.iter().map(|(k, v)| (k.clone(), *v)))
    }

    pub fn inspection_settings(&self) -> InspectionSettings {
        InspectionSettings {
            label_map: self.label_map(),
            min_ppe_confidence: self.min_ppe_confidence,
        }
    }

    /// 打印当前配置
    pub fn print_summary(&self) {
        info!("🎛️ 当前配置:");
        info!(
            "  置信度: 人员 {:.2} | PPE {:.2} | IoU {:.2}",
            self.person_conf_threshold, self.ppe_conf_threshold, self.iou_threshold
        );
        info!("  person 类别 id: {}", self.person_class_id);
        match self.min_ppe_confidence {
            Some(t) => info!("  PPE 合规最低置信度: {:.2}", t),
            None => info!("  PPE 合规最低置信度: 未设置 (任何检测均计入)"),
        }
        info!("  标签映射: {} 项", self.label_aliases.len());
    }
}
