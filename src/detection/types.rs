// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license
//! 检测结果数据结构

use serde::Serialize;

use crate::Bbox;

/// 检测框 (左上 / 右下角点, 原图像素坐标)
#[derive(Clone, Copy, Debug, PartialEq, Default, Serialize)]
pub struct BoxXyxy {
    pub x1: f32,
    pub y1: f32,
    pub x2: f32,
    pub y2: f32,
}

impl BoxXyxy {
    pub fn new(x1: f32, y1: f32, x2: f32, y2: f32) -> Self {
        Self { x1, y1, x2, y2 }
    }

    pub fn width(&self) -> f32 {
        (self.x2 - self.x1).max(0.0)
    }

    pub fn height(&self) -> f32 {
        (self.y2 - self.y1).max(0.0)
    }

    /// 截断为整数后裁剪到图像范围内, 返回 (x, y, w, h); 面积为 0 时返回 None
    pub fn to_pixel_rect(&self, img_w: u32, img_h: u32) -> Option<(u32, u32, u32, u32)> {
        let clamp = |v: f32, max: u32| -> u32 {
            if v.is_nan() || v <= 0.0 {
                0
            } else {
                (v.trunc() as u32).min(max)
            }
        };
        let x1 = clamp(self.x1, img_w);
        let y1 = clamp(self.y1, img_h);
        let x2 = clamp(self.x2, img_w);
        let y2 = clamp(self.y2, img_h);
        if x2 <= x1 || y2 <= y1 {
            return None;
        }
        Some((x1, y1, x2 - x1, y2 - y1))
    }
}

impl From<&Bbox> for BoxXyxy {
    fn from(b: &Bbox) -> Self {
        Self::new(b.xmin(), b.ymin(), b.xmax(), b.ymax())
    }
}

/// 单个检测: 框 + 类别 + 置信度, 产生后不可变
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Detection {
    pub bbox: BoxXyxy,
    pub class_id: usize,
    pub label: String,
    pub confidence: f32,
}

impl Detection {
    pub fn new(bbox: BoxXyxy, class_id: usize, label: impl Into<String>, confidence: f32) -> Self {
        Self {
            bbox,
            class_id,
            label: label.into(),
            confidence,
        }
    }

    /// 由模型原始框构造, 类别名从 names 表查找
    pub fn from_bbox(bbox: &Bbox, names: &[String]) -> Self {
        let label = names
            .get(bbox.id())
            .filter(|n| !n.is_empty())
            .cloned()
            .unwrap_or_else(|| format!("class_{}", bbox.id()));
        Self::new(BoxXyxy::from(bbox), bbox.id(), label, bbox.confidence())
    }

    /// 标注用文字, 如 "helmet 0.87"
    pub fn caption(&self) -> String {
        format!("{} {:.2}", self.label, self.confidence)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pixel_rect_truncates() {
        let b = BoxXyxy::new(10.9, 20.2, 50.7, 80.99);
        assert_eq!(b.to_pixel_rect(100, 100), Some((10, 20, 40, 60)));
    }

    #[test]
    fn test_pixel_rect_clamps_to_image() {
        let b = BoxXyxy::new(-5.0, -3.0, 120.0, 90.0);
        assert_eq!(b.to_pixel_rect(100, 80), Some((0, 0, 100, 80)));
    }

    #[test]
    fn test_pixel_rect_degenerate() {
        assert_eq!(BoxXyxy::new(10.0, 10.0, 10.5, 40.0).to_pixel_rect(100, 100), None);
        assert_eq!(BoxXyxy::new(150.0, 10.0, 200.0, 40.0).to_pixel_rect(100, 100), None);
        assert_eq!(BoxXyxy::new(f32::NAN, 0.0, 10.0, 10.0).to_pixel_rect(100, 100), Some((0, 0, 10, 10)));
    }

    #[test]
    fn test_from_bbox_label_lookup() {
        let names = vec!["helmet".to_string(), "vest".to_string()];
        let d = Detection::from_bbox(&Bbox::new(1., 2., 3., 4., 1, 0.75), &names);
        assert_eq!(d.label, "vest");
        assert_eq!(d.bbox, BoxXyxy::new(1., 2., 4., 6.));
        assert_eq!(d.caption(), "vest 0.75");

        let d = Detection::from_bbox(&Bbox::new(0., 0., 1., 1., 7, 0.5), &names);
        assert_eq!(d.label, "class_7");
    }
}
