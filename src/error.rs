//! Error types for the recognition core
//!
//! Nothing in here is fatal to the host process. Engine failures degrade to an
//! empty frame, configuration failures keep the previous valid configuration.

use thiserror::Error;

/// Errors surfaced by the scanning core
#[derive(Error, Debug)]
pub enum ScanError {
    /// The external text-recognition engine failed or timed out on a frame
    #[error("recognition engine failure: {0}")]
    RecognitionEngineFailure(String),

    /// A profile or tuning request produced an unusable configuration
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// A region of interest fell outside the unit square or was empty
    #[error("invalid region of interest ({x}, {y}, {width}x{height})")]
    InvalidRoi {
        x: f32,
        y: f32,
        width: f32,
        height: f32,
    },

    /// The pipeline threads have shut down
    #[error("scan pipeline is closed")]
    PipelineClosed,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("image error: {0}")]
    Image(#[from] image::ImageError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    TomlDe(#[from] toml::de::Error),

    #[error("TOML write error: {0}")]
    TomlSer(#[from] toml::ser::Error),
}

/// Convenience alias used across the crate
pub type ScanResult<T> = std::result::Result<T, ScanError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = ScanError::InvalidConfig("empty pattern set".to_string());
        assert_eq!(err.to_string(), "invalid configuration: empty pattern set");

        let err = ScanError::RecognitionEngineFailure("timeout".to_string());
        assert!(err.to_string().contains("timeout"));
    }

    #[test]
    fn test_io_error_conversion() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "missing");
        let err: ScanError = io.into();
        assert!(matches!(err, ScanError::Io(_)));
    }
}
