// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license
//! 图片采集 (Image Acquisition)
//!
//! 产出一张解码后的 RGB 图片:
//! - File:   本地 JPEG / PNG
//! - Camera: 本地摄像头抓拍一帧 (需要 `camera` feature)

#[cfg(feature = "camera")]
pub mod camera;

use std::path::{Path, PathBuf};

use image::DynamicImage;
use log::info;
use thiserror::Error;

/// 输入来源
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImageSource {
    File(PathBuf),
    Camera { device: String },
}

impl ImageSource {
    pub fn describe(&self) -> String {
        match self {
            ImageSource::File(path) => format!("文件 {}", path.display()),
            ImageSource::Camera { device } => format!("摄像头 {}", device),
        }
    }
}

#[derive(Debug, Error)]
pub enum InputError {
    /// 提交时没有图片, 可恢复的提示
    #[error("no image submitted: upload a file with --image or capture one with --camera")]
    Missing,

    #[error("failed to read image {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to decode image {path}: {source}")]
    Decode {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },

    #[error("camera capture requires building with the `camera` feature")]
    CameraUnsupported,

    #[error("camera capture failed on {device}: {reason}")]
    Camera { device: String, reason: String },
}

impl InputError {
    /// 是否为仅需提示用户的情况
    pub fn is_recoverable(&self) -> bool {
        matches!(self, InputError::Missing)
    }
}

/// 获取一张图片
pub fn acquire(source: Option<&ImageSource>) -> Result<DynamicImage, InputError> {
    let source = source.ok_or(InputError::Missing)?;
    info!("📷 图片来源: {}", source.describe());
    match source {
        ImageSource::File(path) => load_image(path),
        ImageSource::Camera { device } => capture(device),
    }
}

/// 读取并解码图片文件, 统一转换为 RGB8
pub fn load_image(path: &Path) -> Result<DynamicImage, InputError> {
    let bytes = std::fs::read(path).map_err(|source| InputError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    decode_bytes(&bytes, path)
}

/// 从内存解码 (格式由内容推断)
pub fn decode_bytes(bytes: &[u8], origin: &Path) -> Result<DynamicImage, InputError> {
    let img = image::load_from_memory(bytes).map_err(|source| InputError::Decode {
        path: origin.to_path_buf(),
        source,
    })?;
    Ok(DynamicImage::ImageRgb8(img.to_rgb8()))
}

#[cfg(feature = "camera")]
fn capture(device: &str) -> Result<DynamicImage, InputError> {
    camera::capture_still(device)
}

#[cfg(not(feature = "camera"))]
fn capture(_device: &str) -> Result<DynamicImage, InputError> {
    Err(InputError::CameraUnsupported)
}
