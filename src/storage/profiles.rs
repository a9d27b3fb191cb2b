//! Accessory profile storage and loading
//!
//! A profile describes one scanning setup (clip-on lens, stand, bare phone)
//! and carries every tunable the pipeline reads: ROI geometry, glyph floor,
//! budgets, serial patterns and decision thresholds.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tracing::{info, warn};

use crate::analysis::validator::{FormatValidator, SerialPattern};
use crate::error::{ScanError, ScanResult};
use crate::vision::conditions::SurfaceMaterial;
use crate::vision::tuner::RecognitionMode;

/// ROI extent as a fraction of the frame
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RoiSize {
    pub width: f32,
    pub height: f32,
}

impl RoiSize {
    /// Create a new ROI size
    pub fn new(width: f32, height: f32) -> Self {
        Self { width, height }
    }

    fn is_valid(&self) -> bool {
        self.width > 0.0 && self.width <= 1.0 && self.height > 0.0 && self.height <= 1.0
    }
}

/// Consensus and decision thresholds
///
/// These vary between device generations, so they live on the profile
/// rather than being compiled in.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DecisionThresholds {
    /// Mean confidence a group needs to lock
    pub consensus_confidence: f32,
    /// Supporting frames a group needs to lock
    pub min_frames_for_consensus: usize,
    /// Single-frame confidence that locks immediately
    pub early_stop_confidence: f32,
    /// Locked confidence at or above which a serial is auto-accepted
    pub high_confidence: f32,
    /// Locked confidence at or above which a serial is offered for confirmation
    pub borderline: f32,
}

impl Default for DecisionThresholds {
    fn default() -> Self {
        Self {
            consensus_confidence: 0.75,
            min_frames_for_consensus: 5,
            early_stop_confidence: 0.95,
            high_confidence: 0.9,
            borderline: 0.7,
        }
    }
}

/// Recognition parameters preferred for a given surface
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SurfaceOverride {
    pub surface: SurfaceMaterial,
    /// Minimum glyph height as a fraction of frame height
    pub min_glyph_height: f32,
    pub mode: RecognitionMode,
}

/// An accessory profile definition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AccessoryProfile {
    /// Profile identifier
    pub id: String,
    /// Display name
    pub name: String,
    /// Centred ROI used for recognition
    pub roi_size: RoiSize,
    /// Largest ROI a manual drag may produce
    pub max_roi: RoiSize,
    /// Glyph-height floor as a fraction of frame height
    pub minimum_text_height: f32,
    /// Default recognition mode
    pub recognition_mode: RecognitionMode,
    /// Characters the engine may emit
    pub allowlist: Option<String>,
    /// Frames an attempt may consume before expiring
    pub frame_budget: u32,
    /// Wall time an attempt may take before expiring
    pub time_budget_ms: u64,
    /// Accepted serial shapes, tried in order
    pub serial_patterns: Vec<SerialPattern>,
    /// Prefixes that earn a confidence boost
    pub known_prefixes: Vec<String>,
    /// Serial length that earns a confidence boost
    pub canonical_length: usize,
    /// Boost for matching the canonical length
    pub length_boost: f32,
    /// Boost for matching a known prefix
    pub prefix_boost: f32,
    pub thresholds: DecisionThresholds,
    pub surface_overrides: Vec<SurfaceOverride>,
}

impl Default for AccessoryProfile {
    fn default() -> Self {
        Self {
            id: "standard".to_string(),
            name: "Standard (no accessory)".to_string(),
            roi_size: RoiSize::new(0.8, 0.25),
            max_roi: RoiSize::new(0.95, 0.6),
            minimum_text_height: 0.03,
            recognition_mode: RecognitionMode::Fast,
            allowlist: Some("ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789".to_string()),
            frame_budget: 30,
            time_budget_ms: 10_000,
            serial_patterns: vec![
                SerialPattern::Alphanumeric { length: 12 },
                SerialPattern::Alphanumeric { length: 11 },
                SerialPattern::Alphanumeric { length: 10 },
            ],
            known_prefixes: ["C02", "C07", "C1M", "F4H", "FVF", "G8W", "H4T", "W8"]
                .iter()
                .map(|p| p.to_string())
                .collect(),
            canonical_length: 12,
            length_boost: 0.05,
            prefix_boost: 0.10,
            thresholds: DecisionThresholds::default(),
            surface_overrides: vec![
                SurfaceOverride {
                    surface: SurfaceMaterial::Metal,
                    min_glyph_height: 0.05,
                    mode: RecognitionMode::Accurate,
                },
                SurfaceOverride {
                    surface: SurfaceMaterial::Glass,
                    min_glyph_height: 0.06,
                    mode: RecognitionMode::Accurate,
                },
                SurfaceOverride {
                    surface: SurfaceMaterial::Plastic,
                    min_glyph_height: 0.04,
                    mode: RecognitionMode::Accurate,
                },
                SurfaceOverride {
                    surface: SurfaceMaterial::Screen,
                    min_glyph_height: 0.04,
                    mode: RecognitionMode::Fast,
                },
                SurfaceOverride {
                    surface: SurfaceMaterial::Paper,
                    min_glyph_height: 0.03,
                    mode: RecognitionMode::Fast,
                },
            ],
        }
    }
}

impl AccessoryProfile {
    /// Attempt time budget
    pub fn time_budget(&self) -> Duration {
        Duration::from_millis(self.time_budget_ms)
    }

    /// Override for a surface, if the profile defines one
    pub fn surface_override(&self, surface: SurfaceMaterial) -> Option<&SurfaceOverride> {
        self.surface_overrides.iter().find(|o| o.surface == surface)
    }

    /// Reject profiles that would produce a degenerate configuration
    pub fn validate(&self) -> ScanResult<()> {
        let invalid = |msg: String| Err(ScanError::InvalidConfig(msg));

        if !self.roi_size.is_valid() {
            return invalid(format!("profile '{}': roi_size out of range", self.id));
        }
        if !self.max_roi.is_valid() {
            return invalid(format!("profile '{}': max_roi out of range", self.id));
        }
        if self.roi_size.width > self.max_roi.width || self.roi_size.height > self.max_roi.height {
            return invalid(format!("profile '{}': roi_size exceeds max_roi", self.id));
        }
        if !(self.minimum_text_height > 0.0 && self.minimum_text_height < 1.0) {
            return invalid(format!("profile '{}': minimum_text_height out of range", self.id));
        }
        if self.frame_budget == 0 || self.time_budget_ms == 0 {
            return invalid(format!("profile '{}': budgets must be positive", self.id));
        }
        if self.canonical_length == 0 {
            return invalid(format!("profile '{}': canonical_length must be positive", self.id));
        }
        if matches!(&self.allowlist, Some(a) if a.is_empty()) {
            return invalid(format!("profile '{}': allowlist is empty", self.id));
        }
        for (name, boost) in [("length_boost", self.length_boost), ("prefix_boost", self.prefix_boost)] {
            if !(boost.is_finite() && boost >= 0.0) {
                return invalid(format!("profile '{}': {} must be a non-negative number", self.id, name));
            }
        }

        let t = &self.thresholds;
        let unit = |v: f32| (0.0..=1.0).contains(&v);
        if !(unit(t.consensus_confidence)
            && unit(t.early_stop_confidence)
            && unit(t.high_confidence)
            && unit(t.borderline))
        {
            return invalid(format!("profile '{}': thresholds must lie in [0, 1]", self.id));
        }
        if t.borderline > t.high_confidence {
            return invalid(format!(
                "profile '{}': borderline threshold {} above high-confidence threshold {}",
                self.id, t.borderline, t.high_confidence
            ));
        }
        if t.min_frames_for_consensus == 0 {
            return invalid(format!("profile '{}': min_frames_for_consensus must be positive", self.id));
        }

        // Compiles every pattern and rejects an empty set
        FormatValidator::from_profile(self)?;
        Ok(())
    }

    /// Check that consensus can lock within a window of `window_capacity` entries
    pub fn validate_for_window(&self, window_capacity: usize) -> ScanResult<()> {
        let needed = self.thresholds.min_frames_for_consensus;
        if needed > window_capacity {
            return Err(ScanError::InvalidConfig(format!(
                "profile '{}': min_frames_for_consensus {} exceeds the consensus window of {}",
                self.id, needed, window_capacity
            )));
        }
        Ok(())
    }
}

/// Load an accessory profile from file and validate it
pub fn load_profile(path: &Path) -> ScanResult<AccessoryProfile> {
    let content = std::fs::read_to_string(path)?;
    let profile: AccessoryProfile = serde_json::from_str(&content)?;
    profile.validate()?;
    Ok(profile)
}

/// Save an accessory profile to file
pub fn save_profile(profile: &AccessoryProfile, path: &Path) -> ScanResult<()> {
    let content = serde_json::to_string_pretty(profile)?;
    std::fs::write(path, content)?;
    Ok(())
}

/// Load every valid `*.json` profile in a directory, skipping broken ones
pub fn load_profiles_dir(dir: &Path) -> ScanResult<Vec<AccessoryProfile>> {
    let mut profiles = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        if path.extension().and_then(|e| e.to_str()) != Some("json") {
            continue;
        }
        match load_profile(&path) {
            Ok(profile) => profiles.push(profile),
            Err(e) => warn!("Skipping profile {:?}: {}", path, e),
        }
    }
    profiles.sort_by(|a, b| a.id.cmp(&b.id));
    info!("Loaded {} accessory profiles from {:?}", profiles.len(), dir);
    Ok(profiles)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_profile_is_valid() {
        let profile = AccessoryProfile::default();
        assert!(profile.validate().is_ok());
        assert_eq!(profile.frame_budget, 30);
        assert_eq!(profile.time_budget(), Duration::from_secs(10));
        assert_eq!(profile.thresholds.min_frames_for_consensus, 5);
        assert!(profile.surface_override(SurfaceMaterial::Metal).is_some());
        assert!(profile.surface_override(SurfaceMaterial::Unknown).is_none());
    }

    #[test]
    fn test_empty_patterns_rejected() {
        let profile = AccessoryProfile {
            serial_patterns: vec![],
            ..Default::default()
        };
        assert!(matches!(profile.validate(), Err(ScanError::InvalidConfig(_))));
    }

    #[test]
    fn test_degenerate_roi_rejected() {
        let mut profile = AccessoryProfile::default();
        profile.roi_size = RoiSize::new(0.0, 0.3);
        assert!(profile.validate().is_err());

        let mut profile = AccessoryProfile::default();
        profile.roi_size = RoiSize::new(0.99, 0.3);
        assert!(profile.validate().is_err(), "roi larger than max_roi");
    }

    #[test]
    fn test_inverted_thresholds_rejected() {
        let mut profile = AccessoryProfile::default();
        profile.thresholds.borderline = 0.95;
        profile.thresholds.high_confidence = 0.9;
        assert!(profile.validate().is_err());
    }

    #[test]
    fn test_zero_budget_rejected() {
        let mut profile = AccessoryProfile::default();
        profile.frame_budget = 0;
        assert!(profile.validate().is_err());
    }

    #[test]
    fn test_negative_boosts_rejected() {
        let json = r#"{ "id": "lens", "length_boost": -0.4, "prefix_boost": -0.3 }"#;
        let profile: AccessoryProfile = serde_json::from_str(json).unwrap();
        assert!(matches!(profile.validate(), Err(ScanError::InvalidConfig(_))));

        let mut profile = AccessoryProfile::default();
        profile.prefix_boost = f32::NAN;
        assert!(profile.validate().is_err());

        let mut profile = AccessoryProfile::default();
        profile.length_boost = 0.0;
        profile.prefix_boost = 0.0;
        assert!(profile.validate().is_ok());
    }

    #[test]
    fn test_consensus_must_fit_window() {
        let mut profile = AccessoryProfile::default();
        assert!(profile.validate_for_window(15).is_ok());

        profile.thresholds.min_frames_for_consensus = 20;
        assert!(profile.validate().is_ok());
        assert!(matches!(
            profile.validate_for_window(15),
            Err(ScanError::InvalidConfig(_))
        ));
        assert!(profile.validate_for_window(20).is_ok());
    }

    #[test]
    fn test_save_and_load_profile() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("standard.json");

        let mut profile = AccessoryProfile::default();
        profile.thresholds.high_confidence = 0.85;
        save_profile(&profile, &path).unwrap();

        let loaded = load_profile(&path).unwrap();
        assert_eq!(loaded, profile);
    }

    #[test]
    fn test_partial_profile_uses_defaults() {
        let json = r#"{ "id": "macro-lens", "frame_budget": 45 }"#;
        let profile: AccessoryProfile = serde_json::from_str(json).unwrap();
        assert_eq!(profile.id, "macro-lens");
        assert_eq!(profile.frame_budget, 45);
        assert_eq!(profile.canonical_length, 12);
        assert!(profile.validate().is_ok());
    }

    #[test]
    fn test_load_profiles_dir_skips_invalid() {
        let dir = tempfile::tempdir().unwrap();
        save_profile(&AccessoryProfile::default(), &dir.path().join("a.json")).unwrap();
        std::fs::write(dir.path().join("broken.json"), "{ not json").unwrap();
        std::fs::write(dir.path().join("notes.txt"), "ignored").unwrap();

        let profiles = load_profiles_dir(dir.path()).unwrap();
        assert_eq!(profiles.len(), 1);
        assert_eq!(profiles[0].id, "standard");
    }
}
