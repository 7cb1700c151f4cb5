// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license
//! PPE 合规检查 (PPE Inspector)
//!
//! 流程:
//! 1. 采集: 图片文件或摄像头抓拍一帧
//! 2. 人员检测: COCO 模型, 只保留 person
//! 3. 逐人裁剪并做 PPE 检测
//! 4. 核验 helmet / vest / boots, 输出报告与标注图片

use std::process::ExitCode;

use anyhow::Result;
use clap::Parser;
use log::{error, info, warn};
use mimalloc::MiMalloc;

use ppe_inspector::input::{self, InputError};
use ppe_inspector::models::{resolve_model, YOLOv8Config};
use ppe_inspector::renderer::{self, Annotator};
use ppe_inspector::report;
use ppe_inspector::{
    Args, InspectorConfig, Inspector, Model, PersonDetector, YOLOv8, YoloDetector,
};

#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

const EXIT_FATAL: u8 = 1;
const EXIT_NO_INPUT: u8 = 2;
const EXIT_NON_COMPLIANT: u8 = 3;

fn main() -> ExitCode {
    let args = Args::parse();

    let level = if args.profile { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();

    match run(&args) {
        Ok(code) => code,
        Err(e) => {
            if e.downcast_ref::<InputError>().is_some_and(InputError::is_recoverable) {
                warn!("⚠️ {}", e);
                return ExitCode::from(EXIT_NO_INPUT);
            }
            error!("❌ {:#}", e);
            ExitCode::from(EXIT_FATAL)
        }
    }
}

fn run(args: &Args) -> Result<ExitCode> {
    // 先取图, 没有输入时不读写配置也不加载模型
    let image = input::acquire(args.source().as_ref())?;
    info!("🖼️ 图片尺寸: {}x{}", image.width(), image.height());

    let mut config = match &args.config {
        Some(path) => InspectorConfig::load(path)?,
        None => InspectorConfig::default(),
    };
    config.apply_args(args);
    config.print_summary();

    // ========== 加载模型 ==========
    let person_path = resolve_model(&args.person_model)?;
    let ppe_path = resolve_model(&args.ppe_model)?;
    info!("📦 人员模型: {}", person_path.display());
    info!("📦 PPE模型: {}", ppe_path.display());

    let person_model = YOLOv8::new(YOLOv8Config {
        ort: args.ort_config(person_path),
        conf: config.person_conf_threshold,
        iou: config.iou_threshold,
        agnostic_nms: false,
        names: None,
        profile: args.profile,
    })?;
    let ppe_model = YOLOv8::new(YOLOv8Config {
        ort: args.ort_config(ppe_path),
        conf: config.ppe_conf_threshold,
        iou: config.iou_threshold,
        agnostic_nms: false,
        names: None,
        profile: args.profile,
    })?;
    person_model.summary();
    ppe_model.summary();

    let person = PersonDetector::with_class(
        YoloDetector::new(person_model, "person").with_profile(args.profile),
        config.person_class_id,
    );
    let ppe = YoloDetector::new(ppe_model, "ppe").with_profile(args.profile);
    let mut inspector = Inspector::new(person, ppe, config.inspection_settings());

    // ========== 检测与核验 ==========
    let report = inspector.inspect(&image)?;
    info!(
        "⏱️ 总耗时 {:?}, 合规 {}/{}",
        report.elapsed,
        report.compliant_count(),
        report.person_count()
    );

    println!("{}", report::render(&report, args.format)?);

    if let Some(dir) = &args.output {
        let annotator = Annotator::new(config.font_path.as_deref())?;
        renderer::save_outputs(dir, &image, &report, &annotator)?;
    }

    if args.strict && !report.all_compliant() {
        return Ok(ExitCode::from(EXIT_NON_COMPLIANT));
    }
    Ok(ExitCode::SUCCESS)
}
