// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license
//! 检测流水线 (Inspection Pipeline)
//!
//! 单张图片, 同步顺序执行:
//! 1. 人员定位 (整图)
//! 2. 按检测顺序逐人裁剪
//! 3. 裁剪图 PPE 检测
//! 4. 合规判定
//!
//! 两个检测器由调用方构造后注入, 不使用全局模型句柄。

pub mod crop;

use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use image::DynamicImage;
use log::{debug, info, warn};

use crate::compliance::{self, ComplianceResult, LabelMap};
use crate::detection::{BoxXyxy, Detection, ObjectDetector, PersonDetector};
pub use crop::{crop_person, PersonCrop};

/// 合规判定参数
#[derive(Debug, Clone, Default)]
pub struct InspectionSettings {
    pub label_map: LabelMap,
    /// PPE 计入合规的最低置信度; None 表示任何检测都计入
    pub min_ppe_confidence: Option<f32>,
}

/// 单人结果
#[derive(Debug, Clone)]
pub struct PersonReport {
    /// 从 1 开始
    pub index: usize,
    pub detection: Detection,
    /// 框退化时为 None
    pub crop: Option<PersonCrop>,
    /// 坐标相对于裁剪图
    pub ppe: Vec<Detection>,
    pub compliance: ComplianceResult,
}

impl PersonReport {
    pub fn passed(&self) -> bool {
        self.compliance.passed
    }

    /// 检测到的原始标签, 按检测顺序 (含重复)
    pub fn labels(&self) -> Vec<&str> {
        self.ppe.iter().map(|d| d.label.as_str()).collect()
    }

    /// PPE 检测框换算到原图坐标
    pub fn ppe_in_image(&self) -> Vec<Detection> {
        let (ox, oy) = self
            .crop
            .as_ref()
            .map(|c| (c.origin.0 as f32, c.origin.1 as f32))
            .unwrap_or((0., 0.));
        self.ppe
            .iter()
            .map(|d| Detection {
                bbox: BoxXyxy::new(d.bbox.x1 + ox, d.bbox.y1 + oy, d.bbox.x2 + ox, d.bbox.y2 + oy),
                ..d.clone()
            })
            .collect()
    }
}

/// 单张图片的检测报告
#[derive(Debug, Clone)]
pub struct InspectionReport {
    pub image_width: u32,
    pub image_height: u32,
    pub people: Vec<PersonReport>,
    pub elapsed: Duration,
}

impl InspectionReport {
    pub fn person_count(&self) -> usize {
        self.people.len()
    }

    pub fn compliant_count(&self) -> usize {
        self.people.iter().filter(|p| p.passed()).count()
    }

    /// 无人时为 true
    pub fn all_compliant(&self) -> bool {
        self.people.iter().all(PersonReport::passed)
    }
}

pub struct Inspector<P, Q> {
    person: PersonDetector<P>,
    ppe: Q,
    settings: InspectionSettings,
}

impl<P: ObjectDetector, Q: ObjectDetector> Inspector<P, Q> {
    pub fn new(person: PersonDetector<P>, ppe: Q, settings: InspectionSettings) -> Self {
        Self {
            person,
            ppe,
            settings,
        }
    }

    pub fn ppe_detector(&self) -> &Q {
        &self.ppe
    }

    pub fn inspect(&mut self, image: &DynamicImage) -> Result<InspectionReport> {
        let start = Instant::now();

        let people = self
            .person
            .detect_people(image)
            .context("Person detection failed")?;
        info!("👥 检测到 {} 人", people.len());
        debug!("⏱️ 人员检测: {:?}", start.elapsed());

        let mut reports = Vec::with_capacity(people.len());
        for (i, detection) in people.into_iter().enumerate() {
            let index = i + 1;
            let t = Instant::now();

            let crop = crop_person(image, &detection.bbox);
            let ppe = match &crop {
                Some(c) => self
                    .ppe
                    .detect(&c.image)
                    .with_context(|| format!("PPE detection failed for person {}", index))?,
                None => {
                    warn!(
                        "⚠️ 人员 {} 检测框退化 ({:.1},{:.1})-({:.1},{:.1}), 跳过PPE检测",
                        index, detection.bbox.x1, detection.bbox.y1, detection.bbox.x2, detection.bbox.y2
                    );
                    Vec::new()
                }
            };

            let compliance = compliance::check_detections(
                &ppe,
                &self.settings.label_map,
                self.settings.min_ppe_confidence,
            );
            if compliance.passed {
                info!("✅ 人员 {}: 合规", index);
            } else {
                warn!("🚨 人员 {}: 缺少 {}", index, compliance.missing_list());
            }
            debug!("⏱️ 人员 {} PPE核验: {:?}", index, t.elapsed());

            reports.push(PersonReport {
                index,
                detection,
                crop,
                ppe,
                compliance,
            });
        }

        Ok(InspectionReport {
            image_width: image.width(),
            image_height: image.height(),
            people: reports,
            elapsed: start.elapsed(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compliance::Equipment;
    use anyhow::anyhow;
    use std::collections::VecDeque;

    struct FakePeople {
        names: Vec<String>,
        boxes: Vec<Detection>,
    }

    impl FakePeople {
        fn new(boxes: &[(f32, f32, f32, f32)]) -> Self {
            let mut dets: Vec<Detection> = boxes
                .iter()
                .map(|&(x1, y1, x2, y2)| {
                    Detection::new(BoxXyxy::new(x1, y1, x2, y2), 0, "person", 0.9)
                })
                .collect();
            // 非 person 类别应被过滤
            dets.push(Detection::new(BoxXyxy::new(0., 0., 5., 5.), 2, "car", 0.9));
            Self {
                names: vec!["person".into(), "bicycle".into(), "car".into()],
                boxes: dets,
            }
        }
    }

    impl ObjectDetector for FakePeople {
        fn detect(&mut self, _image: &DynamicImage) -> Result<Vec<Detection>> {
            Ok(self.boxes.clone())
        }

        fn names(&self) -> &[String] {
            &self.names
        }
    }

    /// 按调用顺序依次返回预设标签, 并记录每次收到的图片尺寸
    struct FakePpe {
        names: Vec<String>,
        answers: VecDeque<Vec<(&'static str, f32)>>,
        seen: Vec<(u32, u32)>,
        fail: bool,
    }

    impl FakePpe {
        fn new(answers: Vec<Vec<(&'static str, f32)>>) -> Self {
            Self {
                names: vec!["helmet".into(), "vest".into(), "boots".into()],
                answers: answers.into(),
                seen: Vec::new(),
                fail: false,
            }
        }
    }

    impl ObjectDetector for FakePpe {
        fn detect(&mut self, image: &DynamicImage) -> Result<Vec<Detection>> {
            if self.fail {
                return Err(anyhow!("session crashed"));
            }
            self.seen.push((image.width(), image.height()));
            let answer = self.answers.pop_front().unwrap_or_default();
            Ok(answer
                .into_iter()
                .map(|(label, conf)| {
                    Detection::new(BoxXyxy::new(1., 2., 5., 6.), 0, label, conf)
                })
                .collect())
        }

        fn names(&self) -> &[String] {
            &self.names
        }
    }

    fn image() -> DynamicImage {
        DynamicImage::new_rgb8(200, 100)
    }

    #[test]
    fn test_zero_people_runs_no_ppe_checks() {
        let mut inspector = Inspector::new(
            PersonDetector::new(FakePeople::new(&[])),
            FakePpe::new(vec![]),
            InspectionSettings::default(),
        );
        let report = inspector.inspect(&image()).unwrap();
        assert_eq!(report.person_count(), 0);
        assert!(inspector.ppe_detector().seen.is_empty());
        assert!(report.all_compliant());
    }

    #[test]
    fn test_each_person_checked_in_order() {
        let mut inspector = Inspector::new(
            PersonDetector::new(FakePeople::new(&[
                (10., 10., 50., 90.),
                (100., 5., 160., 95.),
            ])),
            FakePpe::new(vec![
                vec![("helmet", 0.9), ("vest", 0.8), ("boots", 0.7), ("helmet", 0.4)],
                vec![("helmet", 0.9), ("vest", 0.8)],
            ]),
            InspectionSettings::default(),
        );
        let report = inspector.inspect(&image()).unwrap();

        assert_eq!(report.person_count(), 2);
        assert_eq!(report.compliant_count(), 1);
        assert!(!report.all_compliant());

        let first = &report.people[0];
        assert_eq!(first.index, 1);
        assert!(first.passed());
        assert_eq!(first.labels(), vec!["helmet", "vest", "boots", "helmet"]);

        let second = &report.people[1];
        assert_eq!(second.index, 2);
        assert!(!second.passed());
        assert_eq!(
            second.compliance.missing.iter().copied().collect::<Vec<_>>(),
            vec![Equipment::Boots]
        );

        // 裁剪尺寸与检测框一致
        assert_eq!(inspector.ppe_detector().seen, vec![(40, 80), (60, 90)]);
    }

    #[test]
    fn test_degenerate_person_reports_all_missing() {
        let mut inspector = Inspector::new(
            PersonDetector::new(FakePeople::new(&[(300., 10., 350., 90.)])),
            FakePpe::new(vec![vec![("helmet", 0.9)]]),
            InspectionSettings::default(),
        );
        let report = inspector.inspect(&image()).unwrap();
        assert_eq!(report.person_count(), 1);
        let p = &report.people[0];
        assert!(p.crop.is_none());
        assert!(p.ppe.is_empty());
        assert_eq!(p.compliance.missing.len(), 3);
        assert!(inspector.ppe_detector().seen.is_empty());
    }

    #[test]
    fn test_confidence_floor_setting() {
        let settings = InspectionSettings {
            min_ppe_confidence: Some(0.5),
            ..Default::default()
        };
        let mut inspector = Inspector::new(
            PersonDetector::new(FakePeople::new(&[(0., 0., 100., 100.)])),
            FakePpe::new(vec![vec![("helmet", 0.9), ("vest", 0.2), ("boots", 0.8)]]),
            settings,
        );
        let report = inspector.inspect(&image()).unwrap();
        assert!(!report.people[0].passed());
        assert_eq!(report.people[0].compliance.missing_list(), "vest");
    }

    #[test]
    fn test_ppe_boxes_offset_to_image() {
        let mut inspector = Inspector::new(
            PersonDetector::new(FakePeople::new(&[(20., 30., 60., 90.)])),
            FakePpe::new(vec![vec![("helmet", 0.9)]]),
            InspectionSettings::default(),
        );
        let report = inspector.inspect(&image()).unwrap();
        let moved = report.people[0].ppe_in_image();
        assert_eq!(moved[0].bbox, BoxXyxy::new(21., 32., 25., 36.));
    }

    #[test]
    fn test_detector_error_fails_request() {
        let mut ppe = FakePpe::new(vec![]);
        ppe.fail = true;
        let mut inspector = Inspector::new(
            PersonDetector::new(FakePeople::new(&[(0., 0., 50., 50.)])),
            ppe,
            InspectionSettings::default(),
        );
        let err = inspector.inspect(&image()).unwrap_err();
        assert!(format!("{:#}", err).contains("PPE detection failed for person 1"));
    }
}
