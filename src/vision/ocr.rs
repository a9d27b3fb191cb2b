//! Text recognition seam
//!
//! The recognition engine itself is an external capability. The core only
//! sees candidate strings with a per-candidate confidence.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::{Duration, Instant};

use crate::capture::{Frame, FrameId};
use crate::error::{ScanError, ScanResult};

use super::tuner::RecognitionConfig;

/// One recognized text region from one frame
#[derive(Debug, Clone, PartialEq)]
pub struct RawCandidate {
    /// Recognized text as returned by the engine
    pub text: String,
    /// Engine confidence (0.0 - 1.0, not guaranteed in range)
    pub confidence: f32,
    /// Monotonic timestamp of the source frame
    pub timestamp: Instant,
}

impl RawCandidate {
    /// Create a candidate stamped with the current time
    pub fn new(text: impl Into<String>, confidence: f32) -> Self {
        Self {
            text: text.into(),
            confidence,
            timestamp: Instant::now(),
        }
    }
}

/// External text-recognition engine
pub trait TextRecognizer: Send + Sync {
    /// Engine name for logging
    fn name(&self) -> &str;

    /// Recognize text in `frame` using the current recognition parameters
    fn recognize(&self, frame: &Frame, config: &RecognitionConfig) -> ScanResult<Vec<RawCandidate>>;
}

/// Pre-recorded engine output for one frame
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScriptedOutput {
    /// Candidates as `(text, confidence)` pairs
    Candidates(Vec<(String, f32)>),
    /// The engine failed on this frame
    Failure(String),
}

/// Recognizer that replays recorded output keyed by frame id
///
/// Frames without a recording produce no candidates.
#[derive(Debug, Clone, Default)]
pub struct ScriptedRecognizer {
    outputs: HashMap<FrameId, ScriptedOutput>,
    latency: Duration,
}

impl ScriptedRecognizer {
    /// Create a recognizer with no recorded output
    pub fn new() -> Self {
        Self::default()
    }

    /// Record candidates for a frame
    pub fn with_candidates(mut self, frame: FrameId, candidates: &[(&str, f32)]) -> Self {
        let owned = candidates
            .iter()
            .map(|(t, c)| (t.to_string(), *c))
            .collect();
        self.outputs.insert(frame, ScriptedOutput::Candidates(owned));
        self
    }

    /// Record an engine failure for a frame
    pub fn with_failure(mut self, frame: FrameId, message: &str) -> Self {
        self.outputs
            .insert(frame, ScriptedOutput::Failure(message.to_string()));
        self
    }

    /// Simulated processing time per frame
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Insert a recorded output
    pub fn insert(&mut self, frame: FrameId, output: ScriptedOutput) {
        self.outputs.insert(frame, output);
    }
}

impl TextRecognizer for ScriptedRecognizer {
    fn name(&self) -> &str {
        "scripted"
    }

    fn recognize(&self, frame: &Frame, _config: &RecognitionConfig) -> ScanResult<Vec<RawCandidate>> {
        if !self.latency.is_zero() {
            std::thread::sleep(self.latency);
        }

        match self.outputs.get(&frame.id) {
            Some(ScriptedOutput::Candidates(list)) => Ok(list
                .iter()
                .map(|(text, confidence)| RawCandidate {
                    text: text.clone(),
                    confidence: *confidence,
                    timestamp: frame.timestamp,
                })
                .collect()),
            Some(ScriptedOutput::Failure(message)) => {
                Err(ScanError::RecognitionEngineFailure(message.clone()))
            }
            None => Ok(vec![]),
        }
    }
}
