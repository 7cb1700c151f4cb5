// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license
//! 结果标注绘制
//!
//! - 整图: 人员框 (合规绿色 / 不合规红色) + "Person i", 以及换算到原图的 PPE 框
//! - 单人裁剪图: PPE 框 + "label 0.87"

use std::fs;
use std::path::{Path, PathBuf};

use ab_glyph::{FontVec, PxScale};
use anyhow::{Context, Result};
use image::{DynamicImage, Rgb, RgbImage};
use imageproc::drawing::{draw_filled_rect_mut, draw_hollow_rect_mut, draw_text_mut, text_size};
use imageproc::rect::Rect;
use log::{debug, info};

use crate::detection::{BoxXyxy, Detection};
use crate::gen_time_string;
use crate::pipeline::InspectionReport;

const PASS_COLOR: Rgb<u8> = Rgb([0, 200, 0]);
const FAIL_COLOR: Rgb<u8> = Rgb([230, 0, 0]);
const TEXT_COLOR: Rgb<u8> = Rgb([255, 255, 255]);

/// 按类别 id 循环取色
const BRIGHT_COLORS: [(u8, u8, u8); 12] = [
    (255, 0, 0),     // 红色
    (0, 255, 0),     // 绿色
    (0, 0, 255),     // 蓝色
    (255, 255, 0),   // 黄色
    (255, 0, 255),   // 品红
    (0, 255, 255),   // 青色
    (255, 128, 0),   // 橙色
    (255, 0, 128),   // 粉红
    (128, 255, 0),   // 黄绿
    (0, 128, 255),   // 天蓝
    (255, 255, 255), // 白色
    (128, 0, 255),   // 紫色
];

pub fn class_color(class_id: usize) -> Rgb<u8> {
    let (r, g, b) = BRIGHT_COLORS[class_id % BRIGHT_COLORS.len()];
    Rgb([r, g, b])
}

/// 标注器
pub struct Annotator {
    font: Option<FontVec>,
    font_scale: f32,
    thickness: u32,
}

impl Default for Annotator {
    fn default() -> Self {
        Self {
            font: None,
            font_scale: 18.0,
            thickness: 2,
        }
    }
}

impl Annotator {
    /// 指定字体文件; 未指定时搜索常见系统字体, 都找不到则只画框
    pub fn new(font_path: Option<&Path>) -> Result<Self> {
        let font = match font_path {
            Some(path) => Some(load_font(path)?),
            None => find_system_font(),
        };
        Ok(Self {
            font,
            ..Self::default()
        })
    }

    /// 整图标注人员框与其 PPE 框
    pub fn annotate_people(&self, image: &DynamicImage, report: &InspectionReport) -> RgbImage {
        let mut canvas = image.to_rgb8();
        for p in &report.people {
            let color = if p.passed() { PASS_COLOR } else { FAIL_COLOR };
            self.draw_box(&mut canvas, &p.detection.bbox, color);
            for d in p.ppe_in_image() {
                self.draw_box(&mut canvas, &d.bbox, class_color(d.class_id));
            }
            self.draw_caption(&mut canvas, &p.detection.bbox, &format!("Person {}", p.index), color);
        }
        canvas
    }

    /// 裁剪图标注 PPE 框
    pub fn annotate_ppe(&self, crop: &DynamicImage, detections: &[Detection]) -> RgbImage {
        let mut canvas = crop.to_rgb8();
        for d in detections {
            let color = class_color(d.class_id);
            self.draw_box(&mut canvas, &d.bbox, color);
            self.draw_caption(&mut canvas, &d.bbox, &d.caption(), color);
        }
        canvas
    }

    fn draw_box(&self, img: &mut RgbImage, bbox: &BoxXyxy, color: Rgb<u8>) {
        let Some((x, y, w, h)) = bbox.to_pixel_rect(img.width(), img.height()) else {
            return;
        };
        for t in 0..self.thickness {
            // 向内加粗, 保证不越界
            let (tw, th) = (w.saturating_sub(2 * t), h.saturating_sub(2 * t));
            if tw == 0 || th == 0 {
                break;
            }
            let rect = Rect::at((x + t) as i32, (y + t) as i32).of_size(tw, th);
            draw_hollow_rect_mut(img, rect, color);
        }
    }

    fn draw_caption(&self, img: &mut RgbImage, bbox: &BoxXyxy, text: &str, color: Rgb<u8>) {
        let Some(font) = &self.font else {
            return;
        };
        let Some((x, y, _, _)) = bbox.to_pixel_rect(img.width(), img.height()) else {
            return;
        };
        let scale = PxScale::from(self.font_scale);
        let (tw, th) = text_size(scale, font, text);
        let (bg_w, bg_h) = (tw + 4, th + 4);

        // 放在框上方, 顶部放不下时放进框内
        let top = if y >= bg_h { y - bg_h } else { y };
        draw_filled_rect_mut(
            img,
            Rect::at(x as i32, top as i32).of_size(bg_w, bg_h),
            color,
        );
        draw_text_mut(img, TEXT_COLOR, x as i32 + 2, top as i32 + 2, scale, font, text);
    }
}

fn load_font(path: &Path) -> Result<FontVec> {
    let data = fs::read(path).with_context(|| format!("Failed to read font {}", path.display()))?;
    FontVec::try_from_vec(data)
        .map_err(|_| anyhow::anyhow!("Failed to parse font file: {}", path.display()))
}

fn find_system_font() -> Option<FontVec> {
    let mut candidates: Vec<PathBuf> = Vec::new();
    if let Some(dir) = dirs::font_dir() {
        candidates.push(dir.join("DejaVuSans.ttf"));
    }
    candidates.extend(
        [
            "/usr/share/fonts/truetype/dejavu/DejaVuSans.ttf",
            "/usr/share/fonts/TTF/DejaVuSans.ttf",
            "/System/Library/Fonts/Supplemental/Arial.ttf",
            "/System/Library/Fonts/Arial.ttf",
            "C:\\Windows\\Fonts\\arial.ttf",
        ]
        .iter()
        .map(PathBuf::from),
    );

    for path in &candidates {
        if let Ok(font) = load_font(path) {
            info!("🔤 字体: {}", path.display());
            return Some(font);
        }
    }
    debug!("未找到系统字体, 标注只画框");
    None
}

/// 写出标注图片, 返回写出的文件列表
///
/// `<ts>_people.jpg` 为整图, `<ts>_person_<i>.jpg` 为各人裁剪图
pub fn save_outputs(
    dir: &Path,
    image: &DynamicImage,
    report: &InspectionReport,
    annotator: &Annotator,
) -> Result<Vec<PathBuf>> {
    fs::create_dir_all(dir)
        .with_context(|| format!("Failed to create output dir {}", dir.display()))?;
    let stamp = gen_time_string("");
    let mut written = Vec::new();

    let people = dir.join(format!("{}_people.jpg", stamp));
    annotator
        .annotate_people(image, report)
        .save(&people)
        .with_context(|| format!("Failed to save {}", people.display()))?;
    written.push(people);

    for p in &report.people {
        let Some(crop) = &p.crop else {
            continue;
        };
        let path = dir.join(format!("{}_person_{}.jpg", stamp, p.index));
        annotator
            .annotate_ppe(&crop.image, &p.ppe)
            .save(&path)
            .with_context(|| format!("Failed to save {}", path.display()))?;
        written.push(path);
    }

    for path in &written {
        info!("💾 已保存: {}", path.display());
    }
    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compliance::{check, LabelMap};
    use crate::pipeline::{PersonCrop, PersonReport};
    use std::time::Duration;

    fn report_with(passed: bool) -> InspectionReport {
        let labels: &[&str] = if passed {
            &["helmet", "vest", "boots"]
        } else {
            &["helmet"]
        };
        let crop = DynamicImage::new_rgb8(20, 30);
        InspectionReport {
            image_width: 64,
            image_height: 64,
            people: vec![PersonReport {
                index: 1,
                detection: Detection::new(BoxXyxy::new(10., 10., 30., 40.), 0, "person", 0.9),
                crop: Some(PersonCrop {
                    image: crop,
                    origin: (10, 10),
                }),
                ppe: vec![Detection::new(BoxXyxy::new(2., 2., 12., 10.), 1, "helmet", 0.8)],
                compliance: check(labels.iter().copied(), &LabelMap::default()),
            }],
            elapsed: Duration::ZERO,
        }
    }

    #[test]
    fn test_people_box_color_follows_verdict() {
        let image = DynamicImage::new_rgb8(64, 64);
        let annotator = Annotator::default();

        let ok = annotator.annotate_people(&image, &report_with(true));
        assert_eq!(*ok.get_pixel(10, 10), PASS_COLOR);

        let bad = annotator.annotate_people(&image, &report_with(false));
        assert_eq!(*bad.get_pixel(10, 10), FAIL_COLOR);
        // 框内部不被填充
        assert_eq!(*bad.get_pixel(20, 25), Rgb([0, 0, 0]));
    }

    #[test]
    fn test_people_image_shows_ppe_at_image_position() {
        let image = DynamicImage::new_rgb8(64, 64);
        let out = Annotator::default().annotate_people(&image, &report_with(true));
        // 裁剪图中 (2,2) 的 helmet 框, 裁剪原点 (10,10)
        assert_eq!(*out.get_pixel(12, 12), class_color(1));
        assert_eq!(*out.get_pixel(2, 2), Rgb([0, 0, 0]));
    }

    #[test]
    fn test_ppe_box_uses_class_color() {
        let crop = DynamicImage::new_rgb8(20, 30);
        let dets = vec![Detection::new(BoxXyxy::new(2., 2., 12., 10.), 1, "vest", 0.8)];
        let out = Annotator::default().annotate_ppe(&crop, &dets);
        assert_eq!(*out.get_pixel(2, 2), class_color(1));
    }

    #[test]
    fn test_degenerate_box_is_skipped() {
        let crop = DynamicImage::new_rgb8(10, 10);
        let dets = vec![Detection::new(BoxXyxy::new(50., 50., 60., 60.), 0, "boots", 0.8)];
        let out = Annotator::default().annotate_ppe(&crop, &dets);
        assert!(out.pixels().all(|p| *p == Rgb([0, 0, 0])));
    }

    #[test]
    fn test_save_outputs_writes_people_and_crops() {
        let dir = tempfile::tempdir().unwrap();
        let image = DynamicImage::new_rgb8(64, 64);
        let written =
            save_outputs(dir.path(), &image, &report_with(false), &Annotator::default()).unwrap();
        assert_eq!(written.len(), 2);
        assert!(written[0].to_string_lossy().ends_with("_people.jpg"));
        assert!(written[1].to_string_lossy().ends_with("_person_1.jpg"));
        assert!(written.iter().all(|p| p.is_file()));
    }
}
