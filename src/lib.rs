//! serial-scan - Frame-to-decision serial number recognition
//!
//! Streams camera frames through condition classifiers, an external text
//! recognizer, candidate correction, format validation and cross-frame
//! consensus, and emits one Accept, Borderline or Reject decision per scan
//! attempt within a bounded time and frame budget.

pub mod analysis;
pub mod capture;
pub mod config;
pub mod error;
pub mod pipeline;
pub mod shared;
pub mod storage;
pub mod vision;

pub use analysis::{Decision, RejectReason, ScanEvent};
pub use capture::Frame;
pub use config::AppConfig;
pub use error::{ScanError, ScanResult};
pub use pipeline::{AdmissionOutcome, PowerState, ScanPipeline, ThermalState};
pub use shared::AttemptId;
pub use storage::AccessoryProfile;
pub use vision::{RecognitionConfig, TextRecognizer};
