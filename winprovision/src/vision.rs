//! Locating a reference image on a screenshot.
//!
//! Grayscale sum-of-squared-errors matching. It is good enough for
//! pixel-identical UI chrome such as the taskbar Start button; it does not
//! handle scaling, themes or anti-aliasing differences.

use crate::{AutomationError, ScreenshotResult};
use image::{DynamicImage, GrayImage, RgbaImage};
use imageproc::template_matching::{find_extremes, match_template, MatchTemplateMethod};
use std::path::Path;

/// Where a template was found
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TemplateMatch {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
    /// 1.0 is a pixel-perfect match
    pub confidence: f32,
}

impl TemplateMatch {
    pub fn center(&self) -> (u32, u32) {
        (self.x + self.width / 2, self.y + self.height / 2)
    }
}

pub fn load_template(path: &Path) -> Result<GrayImage, AutomationError> {
    if !path.is_file() {
        return Err(AutomationError::InvalidArgument(format!(
            "template image '{}' does not exist",
            path.display()
        )));
    }
    Ok(image::open(path)?.to_luma8())
}

pub fn screenshot_to_gray(screenshot: &ScreenshotResult) -> Result<GrayImage, AutomationError> {
    let rgba = RgbaImage::from_raw(
        screenshot.width,
        screenshot.height,
        screenshot.image_data.clone(),
    )
    .ok_or_else(|| {
        AutomationError::Internal(format!(
            "screenshot buffer of {} bytes does not fit {}x{} RGBA",
            screenshot.image_data.len(),
            screenshot.width,
            screenshot.height
        ))
    })?;
    Ok(DynamicImage::ImageRgba8(rgba).to_luma8())
}

/// Reject similarity thresholds outside (0, 1].
pub fn check_confidence(confidence: f32) -> Result<(), AutomationError> {
    if confidence > 0.0 && confidence <= 1.0 {
        Ok(())
    } else {
        Err(AutomationError::InvalidArgument(format!(
            "confidence must be in (0, 1], got {confidence}"
        )))
    }
}

/// Best position of `needle` on `haystack`, if its similarity reaches `confidence`.
///
/// Similarity is one minus the root-mean-square pixel difference over the
/// template, scaled to [0, 1].
pub fn locate(haystack: &GrayImage, needle: &GrayImage, confidence: f32) -> Option<TemplateMatch> {
    let (nw, nh) = needle.dimensions();
    if nw == 0 || nh == 0 || nw > haystack.width() || nh > haystack.height() {
        return None;
    }

    let errors = match_template(haystack, needle, MatchTemplateMethod::SumOfSquaredErrors);
    let best = find_extremes(&errors);
    let (x, y) = best.min_value_location;

    let pixels = f64::from(nw) * f64::from(nh);
    let rms = (f64::from(best.min_value).max(0.0) / pixels).sqrt();
    let similarity = (1.0 - rms / 255.0) as f32;
    (similarity >= confidence).then_some(TemplateMatch {
        x,
        y,
        width: nw,
        height: nh,
        confidence: similarity,
    })
}
