// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license
//! 检测报告输出 (文本 / Markdown / JSON)

use std::fmt::Write as _;

use anyhow::Result;
use clap::ValueEnum;
use serde::Serialize;

use crate::compliance::Equipment;
use crate::detection::{BoxXyxy, Detection};
use crate::pipeline::{InspectionReport, PersonReport};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ReportFormat {
    Text,
    Markdown,
    Json,
}

pub const VERDICT_PASS: &str = "✅ Compliant: meets the PPE requirements for site entry 🏭";
pub const VERDICT_FAIL: &str = "🚨 ALERT: PPE requirements not met. Missing:";

/// JSON 视图 (不含图片数据)
#[derive(Debug, Serialize)]
pub struct ReportSummary<'a> {
    pub image_width: u32,
    pub image_height: u32,
    pub person_count: usize,
    pub compliant_count: usize,
    pub all_compliant: bool,
    pub elapsed_ms: f64,
    pub people: Vec<PersonSummary<'a>>,
}

#[derive(Debug, Serialize)]
pub struct PersonSummary<'a> {
    pub index: usize,
    pub bbox: BoxXyxy,
    pub confidence: f32,
    pub detections: &'a [Detection],
    pub detected_labels: Vec<&'a str>,
    pub present: Vec<Equipment>,
    pub missing: Vec<Equipment>,
    pub passed: bool,
}

impl<'a> ReportSummary<'a> {
    pub fn new(report: &'a InspectionReport) -> Self {
        Self {
            image_width: report.image_width,
            image_height: report.image_height,
            person_count: report.person_count(),
            compliant_count: report.compliant_count(),
            all_compliant: report.all_compliant(),
            elapsed_ms: report.elapsed.as_secs_f64() * 1000.0,
            people: report.people.iter().map(PersonSummary::new).collect(),
        }
    }
}

impl<'a> PersonSummary<'a> {
    fn new(p: &'a PersonReport) -> Self {
        Self {
            index: p.index,
            bbox: p.detection.bbox,
            confidence: p.detection.confidence,
            detections: &p.ppe,
            detected_labels: p.labels(),
            present: p.compliance.present.iter().copied().collect(),
            missing: p.compliance.missing.iter().copied().collect(),
            passed: p.compliance.passed,
        }
    }
}

pub fn render(report: &InspectionReport, format: ReportFormat) -> Result<String> {
    match format {
        ReportFormat::Text => Ok(render_text(report)),
        ReportFormat::Markdown => Ok(render_markdown(report)),
        ReportFormat::Json => Ok(serde_json::to_string_pretty(&ReportSummary::new(report))?),
    }
}

fn labels_or_none(p: &PersonReport) -> String {
    let labels = p.labels();
    if labels.is_empty() {
        "(none)".to_string()
    } else {
        labels.join(", ")
    }
}

fn verdict(p: &PersonReport) -> String {
    if p.passed() {
        VERDICT_PASS.to_string()
    } else {
        format!("{} {}", VERDICT_FAIL, p.compliance.missing_list())
    }
}

pub fn render_text(report: &InspectionReport) -> String {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "🔍 Image: {}x{}",
        report.image_width, report.image_height
    );
    let _ = writeln!(out, "👥 People detected: {}", report.person_count());
    for p in &report.people {
        let _ = writeln!(out);
        let _ = writeln!(
            out,
            "👤 Person {} (confidence {:.2})",
            p.index, p.detection.confidence
        );
        let _ = writeln!(out, "   Detected items: {}", labels_or_none(p));
        let _ = writeln!(out, "   {}", verdict(p));
    }
    out
}

pub fn render_markdown(report: &InspectionReport) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "## 👥 People detected: {}", report.person_count());
    for p in &report.people {
        let _ = writeln!(out);
        let _ = writeln!(out, "### 👤 Person {}", p.index);
        let _ = writeln!(out);
        let _ = writeln!(out, "**Detected items:** {}", labels_or_none(p));
        let _ = writeln!(out);
        let _ = writeln!(out, "{}", verdict(p));
    }
    let _ = writeln!(out);
    let _ = writeln!(out, "---");
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compliance::{check, LabelMap};
    use std::time::Duration;

    fn person(index: usize, labels: &[&'static str]) -> PersonReport {
        let ppe: Vec<Detection> = labels
            .iter()
            .map(|l| Detection::new(BoxXyxy::new(0., 0., 1., 1.), 0, *l, 0.5))
            .collect();
        let compliance = check(labels.iter().copied(), &LabelMap::default());
        PersonReport {
            index,
            detection: Detection::new(BoxXyxy::new(0., 0., 10., 20.), 0, "person", 0.88),
            crop: None,
            ppe,
            compliance,
        }
    }

    fn report(people: Vec<PersonReport>) -> InspectionReport {
        InspectionReport {
            image_width: 640,
            image_height: 480,
            people,
            elapsed: Duration::from_millis(12),
        }
    }

    #[test]
    fn test_text_zero_people() {
        let text = render_text(&report(vec![]));
        assert!(text.contains("People detected: 0"));
        assert!(!text.contains("Person 1"));
    }

    #[test]
    fn test_text_verdicts() {
        let text = render_text(&report(vec![
            person(1, &["helmet", "vest", "boots"]),
            person(2, &["helmet"]),
            person(3, &[]),
        ]));
        assert!(text.contains("People detected: 3"));
        assert!(text.contains(VERDICT_PASS));
        assert!(text.contains("Missing: vest, boots"));
        assert!(text.contains("Missing: helmet, vest, boots"));
        assert!(text.contains("Detected items: (none)"));
    }

    #[test]
    fn test_markdown_layout() {
        let md = render_markdown(&report(vec![person(1, &["casco", "chaleco"])]));
        assert!(md.starts_with("## 👥 People detected: 1"));
        assert!(md.contains("### 👤 Person 1"));
        assert!(md.contains("**Detected items:** casco, chaleco"));
        assert!(md.contains("Missing: boots"));
    }

    #[test]
    fn test_json_shape() {
        let json = render(
            &report(vec![person(1, &["helmet", "vest", "gloves"])]),
            ReportFormat::Json,
        )
        .unwrap();
        let v: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(v["person_count"], 1);
        assert_eq!(v["all_compliant"], false);
        let p = &v["people"][0];
        assert_eq!(p["missing"], serde_json::json!(["boots"]));
        assert_eq!(p["present"], serde_json::json!(["helmet", "vest"]));
        assert_eq!(p["detected_labels"][2], "gloves");
        assert_eq!(p["detections"].as_array().unwrap().len(), 3);
    }
}
