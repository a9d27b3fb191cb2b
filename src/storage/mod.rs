//! Storage Layer
//!
//! Locates the platform directories for settings and accessory profiles.

pub mod profiles;

pub use profiles::{
    load_profile, load_profiles_dir, save_profile, AccessoryProfile, DecisionThresholds, RoiSize,
    SurfaceOverride,
};

use anyhow::Result;
use std::path::PathBuf;

fn project_dirs() -> Result<directories::ProjectDirs> {
    directories::ProjectDirs::from("com", "serialscan", "SerialScan")
        .ok_or_else(|| anyhow::anyhow!("Could not determine home directory"))
}

/// Get the configuration directory
pub fn get_config_dir() -> Result<PathBuf> {
    let config_dir = project_dirs()?.config_dir().to_path_buf();
    std::fs::create_dir_all(&config_dir)?;
    Ok(config_dir)
}

/// Get the directory holding accessory profiles
pub fn get_profiles_dir() -> Result<PathBuf> {
    let profiles_dir = project_dirs()?.data_dir().join("profiles");
    std::fs::create_dir_all(&profiles_dir)?;
    Ok(profiles_dir)
}
