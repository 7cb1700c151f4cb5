// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license
//! 人员裁剪

use image::DynamicImage;

use crate::detection::BoxXyxy;

/// 单人裁剪图及其在原图中的左上角坐标
#[derive(Debug, Clone)]
pub struct PersonCrop {
    pub image: DynamicImage,
    pub origin: (u32, u32),
}

/// 按检测框裁剪
///
/// 坐标截断取整并限制在图像范围内; 裁剪后面积为 0 时返回 None。
pub fn crop_person(image: &DynamicImage, bbox: &BoxXyxy) -> Option<PersonCrop> {
    let (x, y, w, h) = bbox.to_pixel_rect(image.width(), image.height())?;
    Some(PersonCrop {
        image: image.crop_imm(x, y, w, h),
        origin: (x, y),
    })
}
