//! Recorded scan sessions
//!
//! A trace lists frames in capture order together with what the recognition
//! engine returned for each. Frames either point to an image file or are
//! synthesised as a flat grey buffer.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use crate::error::ScanResult;
use crate::pipeline::PowerState;
use crate::vision::ocr::{ScriptedOutput, ScriptedRecognizer};

use super::{load_frame, Frame, FrameId};

/// One recorded frame
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReplayFrame {
    /// Image file, relative to the trace file
    pub image: Option<PathBuf>,
    /// Grey level of the synthesised frame when no image is given
    pub luma: Option<u8>,
    /// What the engine returned; nothing when absent
    pub output: Option<ScriptedOutput>,
    /// Power state change applied before this frame is submitted
    pub power: Option<PowerState>,
}

/// A recorded scan session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReplayTrace {
    /// Size of synthesised frames
    pub width: u32,
    pub height: u32,
    /// Capture interval between frames
    pub frame_interval_ms: u64,
    pub frames: Vec<ReplayFrame>,
}

impl Default for ReplayTrace {
    fn default() -> Self {
        Self {
            width: 640,
            height: 480,
            frame_interval_ms: 70,
            frames: Vec::new(),
        }
    }
}

impl ReplayTrace {
    /// Recognizer answering with the recorded outputs, keyed by frame index
    pub fn recognizer(&self) -> ScriptedRecognizer {
        let mut recognizer = ScriptedRecognizer::new();
        for (index, frame) in self.frames.iter().enumerate() {
            if let Some(output) = &frame.output {
                recognizer.insert(index as FrameId, output.clone());
            }
        }
        recognizer
    }

    /// Get the capture interval as a duration
    pub fn frame_interval(&self) -> Duration {
        Duration::from_millis(self.frame_interval_ms)
    }

    /// Materialise frame `index`, stamped with its capture time
    pub fn frame(&self, index: usize, base_dir: &Path, captured_at: Instant) -> ScanResult<Frame> {
        let id = index as FrameId;
        let recorded = self.frames.get(index).cloned().unwrap_or_default();
        let frame = match &recorded.image {
            Some(path) => load_frame(&base_dir.join(path), id)?,
            None => {
                let l = recorded.luma.unwrap_or(128);
                Frame::filled(id, self.width.max(1), self.height.max(1), [l, l, l, 255])
            }
        };
        Ok(frame.with_timestamp(captured_at))
    }
}

/// Load a trace from a JSON file
pub fn load_trace(path: &Path) -> ScanResult<ReplayTrace> {
    let content = std::fs::read_to_string(path)?;
    let trace: ReplayTrace = serde_json::from_str(&content)?;
    Ok(trace)
}
