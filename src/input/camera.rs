// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license
//! 摄像头抓拍模块
//!
//! 打开本地摄像头, 只取一帧写入临时 JPEG, 再按普通图片解码。
//! 支持 DirectShow(Windows) / AVFoundation(macOS) / V4L2(Linux)

use ez_ffmpeg::{FfmpegContext, Input, Output};
use image::DynamicImage;
use log::{info, warn};

use super::InputError;

const MAX_RETRIES: usize = 3;

/// 平台采集格式
fn capture_format() -> &'static str {
    #[cfg(target_os = "windows")]
    {
        "dshow" // DirectShow
    }
    #[cfg(target_os = "macos")]
    {
        "avfoundation" // AVFoundation
    }
    #[cfg(not(any(target_os = "windows", target_os = "macos")))]
    {
        "v4l2" // Video4Linux2
    }
}

/// 格式化摄像头URL - 根据平台选择
///
/// `device` 可以是索引 ("0") 或设备名 (Windows 下的 DirectShow 名称)
pub fn format_camera_url(device: &str) -> String {
    #[cfg(target_os = "windows")]
    {
        format!("video={}", device)
    }
    #[cfg(target_os = "macos")]
    {
        device.to_string()
    }
    #[cfg(not(any(target_os = "windows", target_os = "macos")))]
    {
        if device.chars().all(|c| c.is_ascii_digit()) {
            format!("/dev/video{}", device)
        } else {
            device.to_string()
        }
    }
}

/// 抓拍一帧
pub fn capture_still(device: &str) -> Result<DynamicImage, InputError> {
    let url = format_camera_url(device);
    let format = capture_format();
    info!("🎥 摄像头抓拍: {} (格式: {})", url, format);

    let camera_err = |reason: String| InputError::Camera {
        device: device.to_string(),
        reason,
    };

    let dir = tempfile::tempdir().map_err(|e| camera_err(e.to_string()))?;
    let snapshot = dir.path().join("capture.jpg");
    let snapshot_str = snapshot.to_string_lossy().to_string();

    let mut last_err = String::new();
    for attempt in 1..=MAX_RETRIES {
        let input = Input::new(url.as_str()).set_format(format);
        let output = Output::from(snapshot_str.as_str()).set_max_video_frames(1);

        let result = FfmpegContext::builder()
            .input(input)
            .output(output)
            .build()
            .map_err(|e| format!("构建失败: {}", e))
            .and_then(|ctx| ctx.start().map_err(|e| format!("启动失败: {}", e)))
            .and_then(|sch| sch.wait().map_err(|e| format!("抓拍失败: {}", e)));

        match result {
            Ok(()) => {
                info!("✅ 抓拍完成");
                return super::load_image(&snapshot);
            }
            Err(e) => {
                warn!(
                    "⚠️ 摄像头忙或无法打开 ({}/{}): {}",
                    attempt, MAX_RETRIES, e
                );
                last_err = e;
                if attempt < MAX_RETRIES {
                    std::thread::sleep(std::time::Duration::from_secs(1));
                }
            }
        }
    }

    Err(camera_err(last_err))
}
