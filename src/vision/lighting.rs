//! Lighting classifier
//!
//! Labels a frame bright, dim or mixed from its luminance distribution.

use image::{GrayImage, RgbImage};

use super::conditions::{ConditionLabel, ConditionSample, LightingCondition};

/// Luminance above which a pixel counts as clipped
const CLIPPED_LEVEL: u8 = 245;
/// Luminance below which a pixel counts as crushed
const CRUSHED_LEVEL: u8 = 25;

/// Summary statistics of a grayscale image
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LuminanceStats {
    /// Mean luminance (0 - 255)
    pub mean: f32,
    /// Fraction of clipped pixels
    pub clipped: f32,
    /// Fraction of crushed pixels
    pub crushed: f32,
    /// Difference between the brightest and darkest quadrant means
    pub quadrant_spread: f32,
}

impl LuminanceStats {
    /// Compute statistics over a grayscale image; `None` for an empty image
    pub fn from_gray(gray: &GrayImage) -> Option<Self> {
        let (w, h) = gray.dimensions();
        if w == 0 || h == 0 {
            return None;
        }

        let mut sum = 0u64;
        let mut clipped = 0u32;
        let mut crushed = 0u32;
        let mut quadrants = [(0u64, 0u32); 4];

        for (x, y, px) in gray.enumerate_pixels() {
            let v = px.0[0];
            sum += v as u64;
            if v >= CLIPPED_LEVEL {
                clipped += 1;
            }
            if v <= CRUSHED_LEVEL {
                crushed += 1;
            }
            let q = (if x * 2 >= w { 1 } else { 0 }) + (if y * 2 >= h { 2 } else { 0 });
            quadrants[q].0 += v as u64;
            quadrants[q].1 += 1;
        }

        let count = (w * h) as f32;
        let quadrant_means: Vec<f32> = quadrants
            .iter()
            .filter(|(_, n)| *n > 0)
            .map(|(s, n)| *s as f32 / *n as f32)
            .collect();
        let max_q = quadrant_means.iter().copied().fold(f32::NEG_INFINITY, f32::max);
        let min_q = quadrant_means.iter().copied().fold(f32::INFINITY, f32::min);

        Some(Self {
            mean: sum as f32 / count,
            clipped: clipped as f32 / count,
            crushed: crushed as f32 / count,
            quadrant_spread: max_q - min_q,
        })
    }
}

/// Classify lighting on an RGB thumbnail
///
/// Returns `Unknown` when the winning score is below `min_evidence`.
pub fn classify_lighting(thumbnail: &RgbImage, min_evidence: f32) -> ConditionSample {
    let gray = image::imageops::grayscale(thumbnail);
    let Some(stats) = LuminanceStats::from_gray(&gray) else {
        return ConditionSample::new(ConditionLabel::Lighting(LightingCondition::Unknown), 0.0);
    };

    let (label, confidence) = score_lighting(&stats);
    if confidence < min_evidence {
        return ConditionSample::new(
            ConditionLabel::Lighting(LightingCondition::Unknown),
            confidence,
        );
    }
    ConditionSample::new(ConditionLabel::Lighting(label), confidence)
}

/// Score each lighting label and return the best one
pub fn score_lighting(stats: &LuminanceStats) -> (LightingCondition, f32) {
    let bright = ((stats.mean - 90.0) / 80.0).clamp(0.0, 1.0);
    let dim = ((100.0 - stats.mean) / 70.0).clamp(0.0, 1.0);
    // Strong highlights and deep shadows at once, or an uneven light falloff
    let split = (stats.clipped.min(stats.crushed) * 8.0).clamp(0.0, 1.0);
    let uneven = (stats.quadrant_spread / 120.0).clamp(0.0, 1.0);
    let mixed = split.max(uneven);

    [
        (LightingCondition::Mixed, mixed),
        (LightingCondition::Bright, bright),
        (LightingCondition::Dim, dim),
    ]
    .into_iter()
    .fold((LightingCondition::Unknown, 0.0), |best, cand| {
        if cand.1 > best.1 {
            cand
        } else {
            best
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    fn uniform(level: u8) -> RgbImage {
        RgbImage::from_pixel(40, 30, Rgb([level, level, level]))
    }

    #[test]
    fn test_dark_frame_is_dim() {
        let sample = classify_lighting(&uniform(20), 0.01);
        assert_eq!(sample.label, ConditionLabel::Lighting(LightingCondition::Dim));
        assert!(sample.confidence > 0.99);
    }

    #[test]
    fn test_well_lit_frame_is_bright() {
        let sample = classify_lighting(&uniform(220), 0.01);
        assert_eq!(sample.label, ConditionLabel::Lighting(LightingCondition::Bright));
        assert!(sample.confidence > 0.99);
    }

    #[test]
    fn test_half_shadowed_frame_is_mixed() {
        let img = RgbImage::from_fn(40, 40, |x, _| {
            if x < 20 {
                Rgb([0, 0, 0])
            } else {
                Rgb([255, 255, 255])
            }
        });
        let sample = classify_lighting(&img, 0.01);
        assert_eq!(sample.label, ConditionLabel::Lighting(LightingCondition::Mixed));
    }

    #[test]
    fn test_empty_thumbnail_is_unknown() {
        let sample = classify_lighting(&RgbImage::new(0, 0), 0.01);
        assert_eq!(sample.label, ConditionLabel::Lighting(LightingCondition::Unknown));
        assert_eq!(sample.confidence, 0.0);
    }

    #[test]
    fn test_min_evidence_gate() {
        // Mean 95 sits between the dim and bright ramps
        let sample = classify_lighting(&uniform(95), 0.5);
        assert_eq!(sample.label, ConditionLabel::Lighting(LightingCondition::Unknown));
        assert!(sample.confidence < 0.5);
    }

    #[test]
    fn test_luminance_stats() {
        let stats = LuminanceStats::from_gray(&image::imageops::grayscale(&uniform(250))).unwrap();
        assert!((stats.mean - 250.0).abs() < 1.0);
        assert!((stats.clipped - 1.0).abs() < 1e-6);
        assert_eq!(stats.crushed, 0.0);
        assert!(stats.quadrant_spread.abs() < 1e-3);
    }
}
