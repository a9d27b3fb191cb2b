//! Application Configuration
//!
//! Pipeline tunables stored in TOML format. Serial-specific thresholds live
//! on the accessory profile instead.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{ScanError, ScanResult};

/// Application settings
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Condition classifier settings
    pub classifiers: ClassifierSettings,
    /// Consensus window settings
    pub consensus: ConsensusSettings,
    /// Frame admission settings
    pub admission: AdmissionSettings,
    /// Worker pool settings
    pub workers: WorkerSettings,
    /// Logging settings
    pub logging: LoggingSettings,
}

/// Condition classifier settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClassifierSettings {
    /// Classifiers run only on this many frames at the start of an attempt
    pub frames_per_attempt: u32,
    /// Lighting confidence below which the label is unknown
    pub lighting_min_evidence: f32,
    /// Condition confidence above which the tuner applies overrides
    pub tuning_confidence: f32,
}

impl Default for ClassifierSettings {
    fn default() -> Self {
        Self {
            frames_per_attempt: 3,
            lighting_min_evidence: 0.01,
            tuning_confidence: 0.6,
        }
    }
}

/// Consensus window settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConsensusSettings {
    /// Candidates kept per attempt
    pub window_capacity: usize,
}

impl Default for ConsensusSettings {
    fn default() -> Self {
        Self { window_capacity: 15 }
    }
}

/// Frame admission settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AdmissionSettings {
    /// Admitted frames per second under normal conditions
    pub target_fps: u32,
    /// Admitted frames per second under power saving or thermal pressure
    pub power_saving_fps: u32,
    /// Average latency that switches fast mode on
    pub latency_high_water_ms: u64,
    /// Average latency below which fast mode may switch off
    pub latency_low_water_ms: u64,
    /// In-flight depth that switches fast mode on when exceeded
    pub depth_high_water: usize,
    /// In-flight depth at or below which fast mode may switch off
    pub depth_low_water: usize,
    /// In-flight depth at which new frames are deferred
    pub max_in_flight: usize,
    /// Weight of the newest sample in the latency average
    pub latency_smoothing: f32,
}

impl Default for AdmissionSettings {
    fn default() -> Self {
        Self {
            target_fps: 15,
            power_saving_fps: 5,
            latency_high_water_ms: 120,
            latency_low_water_ms: 60,
            depth_high_water: 3,
            depth_low_water: 1,
            max_in_flight: 4,
            latency_smoothing: 0.2,
        }
    }
}

/// Worker pool settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerSettings {
    /// Frame worker threads
    pub threads: usize,
    /// Coordinator wake-up interval for time budget checks
    pub tick_ms: u64,
}

impl Default for WorkerSettings {
    fn default() -> Self {
        Self {
            threads: 2,
            tick_ms: 50,
        }
    }
}

impl WorkerSettings {
    /// Get the coordinator tick as a duration
    pub fn tick(&self) -> Duration {
        Duration::from_millis(self.tick_ms.max(1))
    }
}

/// Logging settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
    /// Default filter when RUST_LOG is unset
    pub level: String,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl AppConfig {
    /// Reject settings the pipeline cannot run with
    pub fn validate(&self) -> ScanResult<()> {
        let invalid = |msg: &str| Err(ScanError::InvalidConfig(msg.to_string()));
        let a = &self.admission;

        if a.target_fps == 0 || a.power_saving_fps == 0 {
            return invalid("admission rates must be positive");
        }
        if a.latency_low_water_ms > a.latency_high_water_ms {
            return invalid("latency low water mark above high water mark");
        }
        if a.depth_low_water > a.depth_high_water {
            return invalid("depth low water mark above high water mark");
        }
        if a.max_in_flight == 0 {
            return invalid("max_in_flight must be positive");
        }
        if !(a.latency_smoothing > 0.0 && a.latency_smoothing <= 1.0) {
            return invalid("latency_smoothing must lie in (0, 1]");
        }
        if self.workers.threads == 0 {
            return invalid("at least one worker thread is required");
        }
        if self.consensus.window_capacity == 0 {
            return invalid("consensus window capacity must be positive");
        }
        if !(0.0..=1.0).contains(&self.classifiers.tuning_confidence)
            || !(0.0..=1.0).contains(&self.classifiers.lighting_min_evidence)
        {
            return invalid("classifier thresholds must lie in [0, 1]");
        }
        Ok(())
    }
}

/// Default location of the configuration file
pub fn default_config_path() -> Result<PathBuf> {
    Ok(crate::storage::get_config_dir()?.join("config.toml"))
}

/// Load configuration from file
pub fn load_config(path: &Path) -> Result<AppConfig> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config {:?}", path))?;
    let config: AppConfig = toml::from_str(&content)?;
    config.validate()?;
    Ok(config)
}

/// Save configuration to file
pub fn save_config(config: &AppConfig, path: &Path) -> Result<()> {
    let content = toml::to_string_pretty(config)?;
    std::fs::write(path, content)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_default_app_config() {
        let config = AppConfig::default();

        assert_eq!(config.classifiers.frames_per_attempt, 3);
        assert!((config.classifiers.lighting_min_evidence - 0.01).abs() < 1e-6);
        assert!((config.classifiers.tuning_confidence - 0.6).abs() < 1e-6);

        assert_eq!(config.consensus.window_capacity, 15);

        assert_eq!(config.admission.target_fps, 15);
        assert_eq!(config.admission.power_saving_fps, 5);
        assert_eq!(config.admission.latency_high_water_ms, 120);
        assert_eq!(config.admission.latency_low_water_ms, 60);
        assert_eq!(config.admission.max_in_flight, 4);

        assert_eq!(config.workers.threads, 2);
        assert_eq!(config.logging.level, "info");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_serialization_roundtrip() {
        let mut config = AppConfig::default();
        config.admission.target_fps = 30;
        config.workers.threads = 4;

        let toml_str = toml::to_string_pretty(&config).unwrap();
        let parsed: AppConfig = toml::from_str(&toml_str).unwrap();

        assert_eq!(config, parsed);
    }

    #[test]
    fn test_partial_config_uses_defaults() {
        let parsed: AppConfig = toml::from_str("[admission]\ntarget_fps = 10\n").unwrap();
        assert_eq!(parsed.admission.target_fps, 10);
        assert_eq!(parsed.admission.power_saving_fps, 5);
        assert_eq!(parsed.consensus.window_capacity, 15);
    }

    #[test]
    fn test_save_and_load_config() {
        let mut config = AppConfig::default();
        config.logging.level = "debug".to_string();

        let temp_file = NamedTempFile::new().unwrap();
        save_config(&config, temp_file.path()).unwrap();
        let loaded = load_config(temp_file.path()).unwrap();

        assert_eq!(loaded.logging.level, "debug");
        assert_eq!(loaded.admission, config.admission);
    }

    #[test]
    fn test_load_config_file_not_found() {
        let result = load_config(Path::new("/nonexistent/path/config.toml"));
        assert!(result.is_err());
    }

    #[test]
    fn test_load_config_invalid_toml() {
        let mut temp_file = NamedTempFile::new().unwrap();
        writeln!(temp_file, "this is not valid toml {{{{").unwrap();

        let result = load_config(temp_file.path());
        assert!(result.is_err());
    }

    #[test]
    fn test_load_config_rejects_inverted_water_marks() {
        let mut temp_file = NamedTempFile::new().unwrap();
        writeln!(
            temp_file,
            "[admission]\nlatency_high_water_ms = 50\nlatency_low_water_ms = 80"
        )
        .unwrap();

        assert!(load_config(temp_file.path()).is_err());
    }

    #[test]
    fn test_validate_rejects_zero_workers() {
        let mut config = AppConfig::default();
        config.workers.threads = 0;
        assert!(matches!(config.validate(), Err(ScanError::InvalidConfig(_))));
    }
}
