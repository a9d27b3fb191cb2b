//! Text tilt estimator
//!
//! Glyph strokes are dominated by two orthogonal edge directions, so the
//! gradient orientations are averaged with four-fold symmetry (angle × 4).
//! The result is folded into [-45°, 45°], positive clockwise in image
//! coordinates. The vector strength of the average is the confidence.

use image::RgbImage;
use imageproc::gradients::{horizontal_sobel, vertical_sobel};

use super::conditions::{ConditionLabel, ConditionSample};

/// Coherence below which no tilt is reported
pub const MIN_COHERENCE: f32 = 0.05;

/// Sobel magnitude below which a pixel is treated as noise
const MIN_EDGE_MAGNITUDE: f32 = 40.0;

/// Estimate the text tilt of an RGB thumbnail
pub fn classify_angle(thumbnail: &RgbImage) -> ConditionSample {
    match estimate_tilt(thumbnail) {
        Some((degrees, coherence)) if coherence >= MIN_COHERENCE => {
            ConditionSample::new(ConditionLabel::Angle(Some(degrees)), coherence)
        }
        Some((_, coherence)) => ConditionSample::new(ConditionLabel::Angle(None), coherence),
        None => ConditionSample::new(ConditionLabel::Angle(None), 0.0),
    }
}

/// Dominant tilt in degrees and its coherence, `None` without edge energy
pub fn estimate_tilt(thumbnail: &RgbImage) -> Option<(f32, f32)> {
    let (w, h) = thumbnail.dimensions();
    if w < 3 || h < 3 {
        return None;
    }

    let gray = image::imageops::grayscale(thumbnail);
    let gx = horizontal_sobel(&gray);
    let gy = vertical_sobel(&gray);

    let mut c = 0.0f64;
    let mut s = 0.0f64;
    let mut total = 0.0f64;

    for (px, py) in gx.pixels().zip(gy.pixels()) {
        let dx = px.0[0] as f32;
        let dy = py.0[0] as f32;
        let magnitude = (dx * dx + dy * dy).sqrt();
        if magnitude < MIN_EDGE_MAGNITUDE {
            continue;
        }
        let phi = 4.0 * dy.atan2(dx);
        c += (magnitude * phi.cos()) as f64;
        s += (magnitude * phi.sin()) as f64;
        total += magnitude as f64;
    }

    if total <= f64::EPSILON {
        return None;
    }

    let coherence = ((c * c + s * s).sqrt() / total) as f32;
    let degrees = (s.atan2(c) / 4.0).to_degrees() as f32;
    Some((degrees, coherence))
}
