//! Shooting-condition samples produced by the classifiers

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Instant;

/// Surface material the serial is printed or engraved on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SurfaceMaterial {
    Metal,
    Plastic,
    Glass,
    Screen,
    Paper,
    Unknown,
}

impl SurfaceMaterial {
    /// All concrete materials, in scoring order
    pub const KNOWN: [SurfaceMaterial; 5] = [
        SurfaceMaterial::Metal,
        SurfaceMaterial::Plastic,
        SurfaceMaterial::Glass,
        SurfaceMaterial::Screen,
        SurfaceMaterial::Paper,
    ];
}

/// Coarse lighting condition of the scene
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LightingCondition {
    Bright,
    Dim,
    Mixed,
    Unknown,
}

/// Which classifier produced a sample
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConditionKind {
    Surface,
    Lighting,
    Angle,
}

/// Label emitted by a classifier
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ConditionLabel {
    Surface(SurfaceMaterial),
    Lighting(LightingCondition),
    /// Text tilt in degrees, `None` when no orientation could be estimated
    Angle(Option<f32>),
}

impl ConditionLabel {
    /// Classifier kind for this label
    pub fn kind(&self) -> ConditionKind {
        match self {
            ConditionLabel::Surface(_) => ConditionKind::Surface,
            ConditionLabel::Lighting(_) => ConditionKind::Lighting,
            ConditionLabel::Angle(_) => ConditionKind::Angle,
        }
    }

    /// True when the classifier could not commit to a label
    pub fn is_unknown(&self) -> bool {
        matches!(
            self,
            ConditionLabel::Surface(SurfaceMaterial::Unknown)
                | ConditionLabel::Lighting(LightingCondition::Unknown)
                | ConditionLabel::Angle(None)
        )
    }
}

/// One classifier verdict for one frame
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ConditionSample {
    /// Coarse label
    pub label: ConditionLabel,
    /// Confidence in the label (0.0 - 1.0)
    pub confidence: f32,
    /// When the sample was produced
    pub timestamp: Instant,
}

impl ConditionSample {
    /// Create a sample, clamping confidence to the unit interval
    pub fn new(label: ConditionLabel, confidence: f32) -> Self {
        let confidence = if confidence.is_finite() {
            confidence.clamp(0.0, 1.0)
        } else {
            0.0
        };
        Self {
            label,
            confidence,
            timestamp: Instant::now(),
        }
    }

    /// Get the classifier kind this sample came from
    pub fn kind(&self) -> ConditionKind {
        self.label.kind()
    }
}

/// Latest sample per classifier kind (most recent wins)
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ConditionSnapshot {
    pub surface: Option<ConditionSample>,
    pub lighting: Option<ConditionSample>,
    pub angle: Option<ConditionSample>,
}

impl ConditionSnapshot {
    /// Record a sample, replacing any older sample of the same kind
    pub fn record(&mut self, sample: ConditionSample) {
        let slot = match sample.kind() {
            ConditionKind::Surface => &mut self.surface,
            ConditionKind::Lighting => &mut self.lighting,
            ConditionKind::Angle => &mut self.angle,
        };
        if slot.map_or(true, |old| old.timestamp <= sample.timestamp) {
            *slot = Some(sample);
        }
    }

    /// Current surface material and its confidence
    pub fn surface(&self) -> Option<(SurfaceMaterial, f32)> {
        match self.surface?.label {
            ConditionLabel::Surface(material) => Some((material, self.surface?.confidence)),
            _ => None,
        }
    }

    /// Current lighting condition and its confidence
    pub fn lighting(&self) -> Option<(LightingCondition, f32)> {
        match self.lighting?.label {
            ConditionLabel::Lighting(condition) => Some((condition, self.lighting?.confidence)),
            _ => None,
        }
    }

    /// Current tilt estimate in degrees
    pub fn tilt_degrees(&self) -> Option<f32> {
        match self.angle?.label {
            ConditionLabel::Angle(degrees) => degrees,
            _ => None,
        }
    }
}

impl fmt::Display for SurfaceMaterial {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SurfaceMaterial::Metal => "metal",
            SurfaceMaterial::Plastic => "plastic",
            SurfaceMaterial::Glass => "glass",
            SurfaceMaterial::Screen => "screen",
            SurfaceMaterial::Paper => "paper",
            SurfaceMaterial::Unknown => "unknown",
        };
        f.write_str(name)
    }
}

impl fmt::Display for LightingCondition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            LightingCondition::Bright => "bright",
            LightingCondition::Dim => "dim",
            LightingCondition::Mixed => "mixed",
            LightingCondition::Unknown => "unknown",
        };
        f.write_str(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_sample_confidence_is_clamped() {
        let s = ConditionSample::new(ConditionLabel::Lighting(LightingCondition::Dim), 1.7);
        assert_eq!(s.confidence, 1.0);
        let s = ConditionSample::new(ConditionLabel::Angle(Some(3.0)), f32::NAN);
        assert_eq!(s.confidence, 0.0);
    }

    #[test]
    fn test_snapshot_most_recent_wins() {
        let mut snap = ConditionSnapshot::default();
        let first = ConditionSample::new(ConditionLabel::Surface(SurfaceMaterial::Metal), 0.8);
        let mut second = ConditionSample::new(ConditionLabel::Surface(SurfaceMaterial::Glass), 0.7);
        second.timestamp = first.timestamp + Duration::from_millis(5);

        snap.record(first);
        snap.record(second);
        assert_eq!(snap.surface(), Some((SurfaceMaterial::Glass, 0.7)));

        // A stale sample does not overwrite a newer one
        snap.record(first);
        assert_eq!(snap.surface(), Some((SurfaceMaterial::Glass, 0.7)));
        assert!(snap.lighting().is_none());
    }

    #[test]
    fn test_kinds_are_kept_apart() {
        let mut snap = ConditionSnapshot::default();
        snap.record(ConditionSample::new(ConditionLabel::Angle(Some(-4.5)), 0.6));
        snap.record(ConditionSample::new(
            ConditionLabel::Lighting(LightingCondition::Bright),
            0.9,
        ));
        assert_eq!(snap.tilt_degrees(), Some(-4.5));
        assert_eq!(snap.lighting(), Some((LightingCondition::Bright, 0.9)));
        assert!(snap.surface.is_none());
    }

    #[test]
    fn test_unknown_labels() {
        assert!(ConditionLabel::Angle(None).is_unknown());
        assert!(ConditionLabel::Surface(SurfaceMaterial::Unknown).is_unknown());
        assert!(!ConditionLabel::Lighting(LightingCondition::Mixed).is_unknown());
    }
}
