// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license
//! 模型路径解析
//!
//! 本地路径直接使用; http(s) 地址下载一次后缓存到
//! `<cache_dir>/ppe-inspector/models/<文件名>`。

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use log::info;

const CACHE_SUBDIR: &str = "ppe-inspector/models";

pub fn is_remote(spec: &str) -> bool {
    spec.starts_with("http://") || spec.starts_with("https://")
}

/// 模型缓存目录
pub fn cache_dir() -> PathBuf {
    dirs::cache_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join(CACHE_SUBDIR)
}

/// URL 最后一段作为缓存文件名 (去掉查询串)
pub fn file_name_from_url(url: &str) -> String {
    let path = url.split(['?', '#']).next().unwrap_or(url);
    match path.rsplit('/').next() {
        Some(name) if !name.is_empty() && !name.contains(':') => name.to_string(),
        _ => "model.onnx".to_string(),
    }
}

/// 解析模型参数为本地文件路径
pub fn resolve_model(spec: &str) -> Result<PathBuf> {
    if is_remote(spec) {
        return download_cached(spec, &cache_dir());
    }
    let path = PathBuf::from(spec);
    if !path.is_file() {
        return Err(anyhow!("Model not found: {}", path.display()));
    }
    Ok(path)
}

fn download_cached(url: &str, dir: &Path) -> Result<PathBuf> {
    let target = dir.join(file_name_from_url(url));
    if target.is_file() {
        info!("📦 使用缓存模型: {}", target.display());
        return Ok(target);
    }

    fs::create_dir_all(dir)
        .with_context(|| format!("Failed to create model cache {}", dir.display()))?;

    info!("⬇️ 下载模型: {} → {}", url, target.display());
    let response = ureq::get(url)
        .call()
        .with_context(|| format!("Failed to download model from {}", url))?;

    // 先写临时文件再改名, 避免中断留下半个模型
    let partial = target.with_extension("part");
    {
        let mut reader = response.into_reader();
        let mut file = fs::File::create(&partial)
            .with_context(|| format!("Failed to create {}", partial.display()))?;
        io::copy(&mut reader, &mut file)
            .with_context(|| format!("Failed to write {}", partial.display()))?;
    }
    fs::rename(&partial, &target)?;
    info!("✅ 模型下载完成: {}", target.display());
    Ok(target)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_name_from_url() {
        assert_eq!(
            file_name_from_url("https://example.com/models/yolov8n.onnx?raw=1"),
            "yolov8n.onnx"
        );
        assert_eq!(file_name_from_url("https://example.com/"), "model.onnx");
        assert_eq!(file_name_from_url("https://"), "model.onnx");
    }

    #[test]
    fn test_remote_detection() {
        assert!(is_remote("https://host/x.onnx"));
        assert!(!is_remote("models/x.onnx"));
    }

    #[test]
    fn test_local_missing_model() {
        let err = resolve_model("definitely/not/here.onnx").unwrap_err();
        assert!(err.to_string().contains("Model not found"));
    }

    #[test]
    fn test_local_model_and_cache_hit() {
        let dir = tempfile::tempdir().unwrap();
        let local = dir.path().join("ppe.onnx");
        fs::write(&local, b"onnx").unwrap();
        assert_eq!(resolve_model(local.to_str().unwrap()).unwrap(), local);

        // 缓存命中时不访问网络
        let hit = download_cached("https://invalid.example/ppe.onnx", dir.path()).unwrap();
        assert_eq!(hit, local);
    }
}
