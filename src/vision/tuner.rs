//! Recognition Tuner
//!
//! Maps the latest condition samples and the active accessory profile into
//! the parameters handed to the recognition engine for the next frame.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, warn};

use crate::error::{ScanError, ScanResult};
use crate::storage::profiles::{AccessoryProfile, RoiSize};

use super::conditions::{ConditionSnapshot, LightingCondition, SurfaceMaterial};

/// Recognition accuracy / speed trade-off
///
/// Ordered so that the more conservative mode compares greater.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecognitionMode {
    #[default]
    Fast,
    Accurate,
}

/// Axis-aligned rectangle in normalised frame coordinates
///
/// Always non-empty and contained in the unit square.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NormalizedRect {
    x: f32,
    y: f32,
    width: f32,
    height: f32,
}

impl NormalizedRect {
    /// Build a rectangle, rejecting anything outside [0,1]² or empty
    pub fn new(x: f32, y: f32, width: f32, height: f32) -> ScanResult<Self> {
        let finite = [x, y, width, height].iter().all(|v| v.is_finite());
        let eps = 1e-6;
        if !finite
            || width <= 0.0
            || height <= 0.0
            || x < -eps
            || y < -eps
            || x + width > 1.0 + eps
            || y + height > 1.0 + eps
        {
            return Err(ScanError::InvalidRoi {
                x,
                y,
                width,
                height,
            });
        }
        Ok(Self {
            x: x.max(0.0),
            y: y.max(0.0),
            width: width.min(1.0 - x.max(0.0)),
            height: height.min(1.0 - y.max(0.0)),
        })
    }

    /// Rectangle of the given size centred in the frame
    pub fn centered(size: RoiSize) -> ScanResult<Self> {
        Self::new(
            (1.0 - size.width) / 2.0,
            (1.0 - size.height) / 2.0,
            size.width,
            size.height,
        )
    }

    /// The whole frame
    pub fn full() -> Self {
        Self {
            x: 0.0,
            y: 0.0,
            width: 1.0,
            height: 1.0,
        }
    }

    /// Overlap of two rectangles, `None` when they do not overlap
    pub fn intersect(&self, other: &NormalizedRect) -> Option<NormalizedRect> {
        let x0 = self.x.max(other.x);
        let y0 = self.y.max(other.y);
        let x1 = (self.x + self.width).min(other.x + other.width);
        let y1 = (self.y + self.height).min(other.y + other.height);
        NormalizedRect::new(x0, y0, x1 - x0, y1 - y0).ok()
    }

    /// Left edge
    pub fn x(&self) -> f32 {
        self.x
    }

    /// Top edge
    pub fn y(&self) -> f32 {
        self.y
    }

    pub fn width(&self) -> f32 {
        self.width
    }

    pub fn height(&self) -> f32 {
        self.height
    }

    /// Pixel bounds (x, y, width, height) for a frame of the given size
    pub fn to_pixels(&self, frame_width: u32, frame_height: u32) -> (u32, u32, u32, u32) {
        let x = (self.x * frame_width as f32).round() as u32;
        let y = (self.y * frame_height as f32).round() as u32;
        let w = ((self.width * frame_width as f32).round() as u32).max(1);
        let h = ((self.height * frame_height as f32).round() as u32).max(1);
        (x, y, w.min(frame_width.saturating_sub(x)), h.min(frame_height.saturating_sub(y)))
    }
}

/// Parameters for the recognition engine
#[derive(Debug, Clone, PartialEq)]
pub struct RecognitionConfig {
    /// Region of the frame to recognize in
    pub roi: NormalizedRect,
    /// Minimum glyph height as a fraction of frame height
    pub min_glyph_height: f32,
    pub mode: RecognitionMode,
    /// Characters the engine may emit
    pub allowlist: Option<String>,
}

impl Default for RecognitionConfig {
    fn default() -> Self {
        Self {
            roi: NormalizedRect::full(),
            min_glyph_height: 0.03,
            mode: RecognitionMode::Fast,
            allowlist: None,
        }
    }
}

/// Derives recognition parameters from conditions and the profile
#[derive(Debug, Clone)]
pub struct RecognitionTuner {
    profile: Arc<AccessoryProfile>,
    /// Labels at or below this confidence are ignored
    tuning_confidence: f32,
    manual_roi: Option<NormalizedRect>,
    current: RecognitionConfig,
}

impl RecognitionTuner {
    /// Create a tuner for a validated profile snapshot
    pub fn new(profile: Arc<AccessoryProfile>, tuning_confidence: f32) -> ScanResult<Self> {
        let roi = NormalizedRect::centered(profile.roi_size)?;
        let current = RecognitionConfig {
            roi,
            min_glyph_height: profile.minimum_text_height,
            mode: profile.recognition_mode,
            allowlist: profile.allowlist.clone(),
        };
        Ok(Self {
            profile,
            tuning_confidence,
            manual_roi: None,
            current,
        })
    }

    /// Most recently computed configuration
    pub fn current(&self) -> &RecognitionConfig {
        &self.current
    }

    /// Get the profile the tuner works from
    pub fn profile(&self) -> &AccessoryProfile {
        &self.profile
    }

    /// Accept a ROI dragged by the user, clipped to the profile's maximum
    ///
    /// On failure the previous ROI stays in effect.
    pub fn set_manual_roi(&mut self, requested: NormalizedRect) -> ScanResult<NormalizedRect> {
        let max = NormalizedRect::centered(self.profile.max_roi)?;
        match requested.intersect(&max) {
            Some(roi) => {
                debug!("Manual ROI accepted: {:?}", roi);
                self.manual_roi = Some(roi);
                self.current.roi = roi;
                Ok(roi)
            }
            None => {
                warn!("Manual ROI {:?} lies outside the allowed region, keeping previous", requested);
                Err(ScanError::InvalidConfig(
                    "manual ROI does not overlap the profile's maximum ROI".to_string(),
                ))
            }
        }
    }

    /// Drop any manual ROI and return to the profile's centred ROI
    pub fn clear_manual_roi(&mut self) {
        self.manual_roi = None;
    }

    /// Recompute the configuration from the latest conditions
    pub fn retune(&mut self, conditions: &ConditionSnapshot, fast_mode: bool) -> &RecognitionConfig {
        let profile = &self.profile;
        let mut min_glyph_height = profile.minimum_text_height;
        let mut mode = profile.recognition_mode;

        if let Some((surface, confidence)) = conditions.surface() {
            if confidence > self.tuning_confidence && surface != SurfaceMaterial::Unknown {
                if let Some(o) = profile.surface_override(surface) {
                    min_glyph_height = min_glyph_height.max(o.min_glyph_height);
                    mode = mode.max(o.mode);
                }
            }
        }

        if let Some((lighting, confidence)) = conditions.lighting() {
            if confidence > self.tuning_confidence {
                let (glyph_factor, lighting_mode) = lighting_adjustment(lighting);
                min_glyph_height = min_glyph_height.max(profile.minimum_text_height * glyph_factor);
                mode = mode.max(lighting_mode);
            }
        }

        if fast_mode {
            mode = RecognitionMode::Fast;
        }

        let roi = match self.manual_roi {
            Some(roi) => roi,
            // The profile was validated, so the centred ROI always exists
            None => NormalizedRect::centered(profile.roi_size).unwrap_or(self.current.roi),
        };

        let next = RecognitionConfig {
            roi,
            min_glyph_height,
            mode,
            allowlist: profile.allowlist.clone(),
        };
        if next != self.current {
            debug!(
                "Recognition config retuned: mode={:?}, min_glyph_height={:.3}, roi={:?}",
                next.mode, next.min_glyph_height, next.roi
            );
        }
        self.current = next;
        &self.current
    }
}

/// Glyph-floor multiplier and preferred mode under a lighting condition
fn lighting_adjustment(lighting: LightingCondition) -> (f32, RecognitionMode) {
    match lighting {
        LightingCondition::Dim => (1.25, RecognitionMode::Accurate),
        LightingCondition::Mixed => (1.1, RecognitionMode::Accurate),
        LightingCondition::Bright | LightingCondition::Unknown => (1.0, RecognitionMode::Fast),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vision::conditions::{ConditionLabel, ConditionSample};

    fn tuner() -> RecognitionTuner {
        RecognitionTuner::new(Arc::new(AccessoryProfile::default()), 0.6).unwrap()
    }

    fn snapshot_with(label: ConditionLabel, confidence: f32) -> ConditionSnapshot {
        let mut snap = ConditionSnapshot::default();
        snap.record(ConditionSample::new(label, confidence));
        snap
    }

    #[test]
    fn test_rect_validation() {
        assert!(NormalizedRect::new(0.1, 0.1, 0.5, 0.5).is_ok());
        assert!(NormalizedRect::new(0.6, 0.1, 0.5, 0.5).is_err());
        assert!(NormalizedRect::new(0.1, 0.1, 0.0, 0.5).is_err());
        assert!(NormalizedRect::new(-0.2, 0.1, 0.5, 0.5).is_err());
        assert!(NormalizedRect::new(f32::NAN, 0.1, 0.5, 0.5).is_err());
    }

    #[test]
    fn test_centered_rect() {
        let r = NormalizedRect::centered(RoiSize::new(0.8, 0.2)).unwrap();
        assert!((r.x() - 0.1).abs() < 1e-6);
        assert!((r.y() - 0.4).abs() < 1e-6);
        assert_eq!(r.to_pixels(1000, 500), (100, 200, 800, 100));
    }

    #[test]
    fn test_intersection() {
        let a = NormalizedRect::new(0.0, 0.0, 0.6, 0.6).unwrap();
        let b = NormalizedRect::new(0.4, 0.4, 0.6, 0.6).unwrap();
        let i = a.intersect(&b).unwrap();
        assert!((i.width() - 0.2).abs() < 1e-6);
        assert!((i.height() - 0.2).abs() < 1e-6);

        let c = NormalizedRect::new(0.7, 0.7, 0.2, 0.2).unwrap();
        assert!(a.intersect(&c).is_none());
    }

    #[test]
    fn test_profile_defaults_without_conditions() {
        let mut t = tuner();
        let config = t.retune(&ConditionSnapshot::default(), false).clone();
        assert_eq!(config.mode, RecognitionMode::Fast);
        assert!((config.min_glyph_height - 0.03).abs() < 1e-6);
        assert_eq!(config.roi, NormalizedRect::centered(RoiSize::new(0.8, 0.25)).unwrap());
        assert!(config.allowlist.is_some());
    }

    #[test]
    fn test_confident_metal_is_conservative() {
        let mut t = tuner();
        let snap = snapshot_with(ConditionLabel::Surface(SurfaceMaterial::Metal), 0.8);
        let config = t.retune(&snap, false);
        assert_eq!(config.mode, RecognitionMode::Accurate);
        assert!((config.min_glyph_height - 0.05).abs() < 1e-6);
    }

    #[test]
    fn test_low_confidence_surface_ignored() {
        let mut t = tuner();
        let snap = snapshot_with(ConditionLabel::Surface(SurfaceMaterial::Metal), 0.6);
        let config = t.retune(&snap, false);
        assert_eq!(config.mode, RecognitionMode::Fast);
        assert!((config.min_glyph_height - 0.03).abs() < 1e-6);
    }

    #[test]
    fn test_glyph_height_never_below_profile_floor() {
        let mut profile = AccessoryProfile::default();
        profile.minimum_text_height = 0.08;
        profile.recognition_mode = RecognitionMode::Accurate;
        let mut t = RecognitionTuner::new(Arc::new(profile), 0.6).unwrap();

        let snap = snapshot_with(ConditionLabel::Surface(SurfaceMaterial::Paper), 0.9);
        let config = t.retune(&snap, false);
        assert!((config.min_glyph_height - 0.08).abs() < 1e-6);
        assert_eq!(config.mode, RecognitionMode::Accurate, "never downgraded by an override");
    }

    #[test]
    fn test_dim_lighting_raises_floor() {
        let mut t = tuner();
        let snap = snapshot_with(ConditionLabel::Lighting(LightingCondition::Dim), 0.9);
        let config = t.retune(&snap, false);
        assert_eq!(config.mode, RecognitionMode::Accurate);
        assert!((config.min_glyph_height - 0.0375).abs() < 1e-6);
    }

    #[test]
    fn test_fast_mode_keeps_floor() {
        let mut t = tuner();
        let snap = snapshot_with(ConditionLabel::Surface(SurfaceMaterial::Glass), 0.9);
        let config = t.retune(&snap, true);
        assert_eq!(config.mode, RecognitionMode::Fast);
        assert!((config.min_glyph_height - 0.06).abs() < 1e-6);
    }

    #[test]
    fn test_manual_roi_clipped_to_max() {
        let mut t = tuner();
        let requested = NormalizedRect::new(0.0, 0.0, 1.0, 1.0).unwrap();
        let roi = t.set_manual_roi(requested).unwrap();
        assert!((roi.x() - 0.025).abs() < 1e-5);
        assert!((roi.y() - 0.2).abs() < 1e-5);
        assert!((roi.width() - 0.95).abs() < 1e-5);
        assert!((roi.height() - 0.6).abs() < 1e-5);

        let config = t.retune(&ConditionSnapshot::default(), false);
        assert_eq!(config.roi, roi);
    }

    #[test]
    fn test_manual_roi_outside_max_keeps_previous() {
        let mut t = tuner();
        let before = t.current().roi;
        let requested = NormalizedRect::new(0.0, 0.0, 0.02, 0.05).unwrap();
        assert!(t.set_manual_roi(requested).is_err());
        assert_eq!(t.current().roi, before);
    }

    #[test]
    fn test_clear_manual_roi() {
        let mut t = tuner();
        t.set_manual_roi(NormalizedRect::new(0.3, 0.3, 0.2, 0.2).unwrap())
            .unwrap();
        t.clear_manual_roi();
        let config = t.retune(&ConditionSnapshot::default(), false);
        assert_eq!(config.roi, NormalizedRect::centered(RoiSize::new(0.8, 0.25)).unwrap());
    }
}
