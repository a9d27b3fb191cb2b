//! Event feed for the host application
//!
//! Guidance, live text and decisions produced by the scan coordinator are
//! broadcast to every subscriber in the order they were emitted.
//!
//! `Guidance` is structured; hosts map its fields to their own text. The
//! English `Display` impl is only a fallback rendering for logs and the CLI.

use crossbeam_channel::{unbounded, Receiver, Sender};
use parking_lot::Mutex;
use std::fmt;

use crate::shared::messages::AttemptId;
use crate::vision::conditions::{ConditionSnapshot, LightingCondition, SurfaceMaterial};

use super::arbiter::Decision;
use super::consensus::StabilityState;

/// Structured guidance for the capture UI
#[derive(Debug, Clone, PartialEq)]
pub struct Guidance {
    pub attempt: AttemptId,
    pub surface: Option<SurfaceMaterial>,
    pub lighting: Option<LightingCondition>,
    /// Estimated text tilt in degrees
    pub tilt_degrees: Option<f32>,
    pub stability: StabilityState,
    /// Frames supporting the current leader
    pub supporting_frames: usize,
    /// Frames needed for a consensus lock
    pub frames_needed: usize,
}

impl Guidance {
    /// Create guidance from the current conditions and consensus progress
    pub fn new(
        attempt: AttemptId,
        conditions: &ConditionSnapshot,
        stability: StabilityState,
        supporting_frames: usize,
        frames_needed: usize,
    ) -> Self {
        Self {
            attempt,
            surface: conditions.surface().map(|(s, _)| s),
            lighting: conditions.lighting().map(|(l, _)| l),
            tilt_degrees: conditions.tilt_degrees(),
            stability,
            supporting_frames,
            frames_needed,
        }
    }
}

/// Tilt beyond which the user is asked to straighten the device
const TILT_HINT_DEGREES: f32 = 15.0;

impl fmt::Display for Guidance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.stability {
            StabilityState::Stable => return write!(f, "Serial locked"),
            StabilityState::Expired => return write!(f, "Could not read a serial"),
            StabilityState::Collecting => {}
        }

        match self.lighting {
            Some(LightingCondition::Dim) => return write!(f, "Too dark, add light"),
            Some(LightingCondition::Mixed) => return write!(f, "Uneven light, avoid glare and shadows"),
            _ => {}
        }
        if let Some(t) = self.tilt_degrees {
            if t.abs() > TILT_HINT_DEGREES {
                return write!(f, "Straighten the label ({:+.0}°)", t);
            }
        }
        if matches!(self.surface, Some(SurfaceMaterial::Glass | SurfaceMaterial::Screen)) {
            return write!(f, "Tilt slightly to avoid reflections");
        }

        if self.supporting_frames == 0 {
            write!(f, "Center the serial in the frame")
        } else {
            write!(
                f,
                "Hold steady ({}/{})",
                self.supporting_frames.min(self.frames_needed),
                self.frames_needed
            )
        }
    }
}

/// Event published to subscribers
#[derive(Debug, Clone, PartialEq)]
pub enum ScanEvent {
    /// Conditions or consensus changed
    Guidance(Guidance),
    /// Current leading corrected text; informational only
    LiveText {
        attempt: AttemptId,
        text: String,
        confidence: f32,
    },
    /// The single decision of an attempt
    Decision {
        attempt: AttemptId,
        decision: Decision,
    },
}

impl ScanEvent {
    /// Get the attempt the event belongs to
    pub fn attempt(&self) -> AttemptId {
        match self {
            ScanEvent::Guidance(g) => g.attempt,
            ScanEvent::LiveText { attempt, .. } | ScanEvent::Decision { attempt, .. } => *attempt,
        }
    }
}

/// Broadcasts scan events to subscribers
pub struct EventEmitter {
    subscribers: Mutex<Vec<Sender<ScanEvent>>>,
}

impl EventEmitter {
    /// Create a new event emitter
    pub fn new() -> Self {
        Self {
            subscribers: Mutex::new(Vec::new()),
        }
    }

    /// Register a new subscriber; it sees events emitted from now on
    pub fn subscribe(&self) -> Receiver<ScanEvent> {
        let (tx, rx) = unbounded();
        self.subscribers.lock().push(tx);
        rx
    }

    /// Emit an event to all subscribers, forgetting disconnected ones
    pub fn emit(&self, event: ScanEvent) {
        self.subscribers
            .lock()
            .retain(|tx| tx.send(event.clone()).is_ok());
    }

    /// Get the number of live subscribers
    pub fn subscriber_count(&self) -> usize {
        self.subscribers.lock().len()
    }
}

impl Default for EventEmitter {
    fn default() -> Self {
        Self::new()
    }
}
