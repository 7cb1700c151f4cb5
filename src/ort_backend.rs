// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license
//
// ONNX Runtime 推理后端
// 负责: 会话构建、执行设备选择、输入尺寸解析、元数据(类别名)读取、fp32/fp16 推理

use std::path::PathBuf;
use std::sync::OnceLock;
use std::time::Instant;

use anyhow::{anyhow, Context, Result};
use half::f16;
use log::{debug, info};
use ndarray::{Array, IxDyn};
use ort::{
    CPUExecutionProvider, CUDAExecutionProvider, ExecutionProviderDispatch,
    GraphOptimizationLevel, Session, TensorElementType, TensorRTExecutionProvider, ValueType,
};
use regex::Regex;

/// 动态轴未给出尺寸时使用的默认推理分辨率
pub const DEFAULT_INF_SIZE: u32 = 640;

/// 执行设备
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum OrtEP {
    CPU,
    CUDA(i32),
    Trt(i32),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Batch {
    pub opt: u32,
    pub min: u32,
    pub max: u32,
}

impl Default for Batch {
    fn default() -> Self {
        Self {
            opt: 1,
            min: 1,
            max: 1,
        }
    }
}

/// 推理后端构建参数
#[derive(Debug, Clone)]
pub struct OrtConfig {
    pub f: PathBuf,
    pub ep: OrtEP,
    pub trt_fp16: bool,
    pub batch: Batch,
    /// (height, width), 仅在模型输入轴为动态时生效
    pub image_size: (Option<u32>, Option<u32>),
}

pub struct OrtBackend {
    session: Session,
    ep: OrtEP,
    dtype: TensorElementType,
    batch: Batch,
    height: u32,
    width: u32,
    is_batch_dynamic: bool,
    is_height_dynamic: bool,
    is_width_dynamic: bool,
    output_names: Vec<String>,
}

impl OrtBackend {
    pub fn build(args: OrtConfig) -> Result<Self> {
        let session = Session::builder()?
            .with_optimization_level(GraphOptimizationLevel::Level3)?
            .with_execution_providers(Self::execution_providers(&args))?
            .commit_from_file(&args.f)
            .with_context(|| format!("Failed to load ONNX model: {}", args.f.display()))?;

        // 输入: 期望 NCHW
        let input = session
            .inputs
            .first()
            .ok_or_else(|| anyhow!("Model has no inputs: {}", args.f.display()))?;
        let (dtype, dims) = match &input.input_type {
            ValueType::Tensor { ty, dimensions, .. } => (*ty, dimensions.clone()),
            _ => return Err(anyhow!("Model input `{}` is not a tensor", input.name)),
        };
        if dims.len() != 4 {
            return Err(anyhow!(
                "Expected NCHW input, got {} dims ({:?})",
                dims.len(),
                dims
            ));
        }

        let is_batch_dynamic = dims[0] < 0;
        let batch = if is_batch_dynamic {
            args.batch
        } else {
            let n = dims[0] as u32;
            Batch {
                opt: n,
                min: n,
                max: n,
            }
        };

        let (height, is_height_dynamic) = resolve_axis(dims[2], args.image_size.0);
        let (width, is_width_dynamic) = resolve_axis(dims[3], args.image_size.1);

        let output_names = session.outputs.iter().map(|o| o.name.clone()).collect();

        Ok(Self {
            session,
            ep: args.ep,
            dtype,
            batch,
            height,
            width,
            is_batch_dynamic,
            is_height_dynamic,
            is_width_dynamic,
            output_names,
        })
    }

    fn execution_providers(args: &OrtConfig) -> Vec<ExecutionProviderDispatch> {
        // CPU 始终兜底
        match args.ep {
            OrtEP::Trt(device_id) => vec![
                TensorRTExecutionProvider::default()
                    .with_device_id(device_id)
                    .with_fp16(args.trt_fp16)
                    .build(),
                CUDAExecutionProvider::default()
                    .with_device_id(device_id)
                    .build(),
                CPUExecutionProvider::default().build(),
            ],
            OrtEP::CUDA(device_id) => vec![
                CUDAExecutionProvider::default()
                    .with_device_id(device_id)
                    .build(),
                CPUExecutionProvider::default().build(),
            ],
            OrtEP::CPU => vec![CPUExecutionProvider::default().build()],
        }
    }

    pub fn run(&mut self, xs: Array<f32, IxDyn>, profile: bool) -> Result<Vec<Array<f32, IxDyn>>> {
        match self.dtype {
            TensorElementType::Float16 => self.run_fp16(xs, profile),
            TensorElementType::Float32 => self.run_fp32(xs, profile),
            other => Err(anyhow!("Unsupported model input dtype: {:?}", other)),
        }
    }

    fn run_fp32(&mut self, xs: Array<f32, IxDyn>, profile: bool) -> Result<Vec<Array<f32, IxDyn>>> {
        let t = Instant::now();
        let ys = self.session.run(ort::inputs![xs.view()]?)?;
        if profile {
            debug!("[ORT Inference]: {:?}", t.elapsed());
        }

        let mut outputs = Vec::with_capacity(self.output_names.len());
        for name in &self.output_names {
            let y = ys[name.as_str()].try_extract_tensor::<f32>()?;
            outputs.push(y.into_owned());
        }
        Ok(outputs)
    }

    fn run_fp16(&mut self, xs: Array<f32, IxDyn>, profile: bool) -> Result<Vec<Array<f32, IxDyn>>> {
        let t = Instant::now();
        let xs = xs.mapv(f16::from_f32);
        let ys = self.session.run(ort::inputs![xs.view()]?)?;
        if profile {
            debug!("[ORT Inference fp16]: {:?}", t.elapsed());
        }

        let mut outputs = Vec::with_capacity(self.output_names.len());
        for name in &self.output_names {
            let y = ys[name.as_str()].try_extract_tensor::<f16>()?;
            outputs.push(y.mapv(f16::to_f32));
        }
        Ok(outputs)
    }

    /// 从 onnx 模型元数据读取自定义字段
    pub fn fetch_from_metadata(&self, key: &str) -> Option<String> {
        match self.session.metadata() {
            Err(_) => None,
            Ok(metadata) => metadata.custom(key).unwrap_or_default(),
        }
    }

    /// 类别名 (ultralytics 导出的 `names` 字段)
    pub fn names(&self) -> Option<Vec<String>> {
        self.fetch_from_metadata("names")
            .and_then(|names| parse_names(&names))
    }

    pub fn author(&self) -> Option<String> {
        self.fetch_from_metadata("author")
    }

    pub fn version(&self) -> Option<String> {
        self.fetch_from_metadata("version")
    }

    pub fn summary(&self) {
        info!(
            "📦 ORT: EP={:?} dtype={:?} batch={}({}) input={}x{}({}) {}",
            self.ep,
            self.dtype,
            self.batch.opt,
            if self.is_batch_dynamic { "Dynamic" } else { "Const" },
            self.width,
            self.height,
            if self.is_height_dynamic || self.is_width_dynamic {
                "Dynamic"
            } else {
                "Const"
            },
            match self.author().zip(self.version()) {
                Some((author, ver)) => format!("({} {})", author, ver),
                None => String::new(),
            }
        );
    }

    pub fn ep(&self) -> &OrtEP {
        &self.ep
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn width(&self) -> u32 {
        self.width
    }
}

fn resolve_axis(dim: i64, fallback: Option<u32>) -> (u32, bool) {
    if dim < 0 {
        (fallback.unwrap_or(DEFAULT_INF_SIZE), true)
    } else {
        (dim as u32, false)
    }
}

/// 类别 id 上限, 超出视为损坏的元数据
const MAX_CLASS_ID: usize = 10_000;

fn names_regex() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r#"(\d+)\s*:\s*(?:'([^']*)'|"([^"]*)")"#).ok())
        .as_ref()
}

/// 解析类别名元数据
///
/// 格式: `{0: 'person', 1: 'bicycle', 27: "yellow_lady's_slipper"}`
pub fn parse_names(raw: &str) -> Option<Vec<String>> {
    let re = names_regex()?;
    let mut pairs: Vec<(usize, String)> = Vec::new();
    for caps in re.captures_iter(raw) {
        let idx = caps.get(1)?.as_str().parse::<usize>().ok()?;
        if idx >= MAX_CLASS_ID {
            return None;
        }
        let name = caps.get(2).or_else(|| caps.get(3))?.as_str().to_string();
        pairs.push((idx, name));
    }
    if pairs.is_empty() {
        return None;
    }

    let len = pairs.iter().map(|(i, _)| i + 1).max().unwrap_or(0);
    let mut names = vec![String::new(); len];
    for (idx, name) in pairs {
        names[idx] = name;
    }
    Some(names)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_names_ultralytics_format() {
        let names = parse_names("{0: 'person', 1: 'bicycle', 2: 'sports ball'}").unwrap();
        assert_eq!(names, vec!["person", "bicycle", "sports ball"]);
    }

    #[test]
    fn test_parse_names_double_quoted_apostrophe() {
        let names = parse_names(r#"{0: 'casco', 1: "lady's_vest"}"#).unwrap();
        assert_eq!(names, vec!["casco", "lady's_vest"]);
    }

    #[test]
    fn test_parse_names_sparse_indices() {
        let names = parse_names("{2: 'boots', 0: 'helmet'}").unwrap();
        assert_eq!(names, vec!["helmet", "", "boots"]);
    }

    #[test]
    fn test_parse_names_rejects_huge_class_id() {
        assert!(parse_names("{0: 'helmet', 99999999999: 'x'}").is_none());
        assert!(parse_names("{10000: 'x'}").is_none());
        assert_eq!(parse_names("{9999: 'x'}").map(|n| n.len()), Some(10_000));
    }

    #[test]
    fn test_names_regex_compiled_once() {
        let a = names_regex().unwrap();
        let b = names_regex().unwrap();
        assert!(std::ptr::eq(a, b));
    }

    #[test]
    fn test_parse_names_garbage() {
        assert!(parse_names("not a dict").is_none());
    }

    #[test]
    fn test_resolve_axis() {
        assert_eq!(resolve_axis(-1, None), (DEFAULT_INF_SIZE, true));
        assert_eq!(resolve_axis(-1, Some(320)), (320, true));
        assert_eq!(resolve_axis(480, Some(320)), (480, false));
    }
}
