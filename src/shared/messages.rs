//! Message types passed between the frame workers and the scan coordinator

use std::fmt;
use std::time::{Duration, Instant};
use uuid::Uuid;

use crate::analysis::corrector::CorrectedCandidate;
use crate::capture::FrameId;
use crate::pipeline::attempt::ScanAttempt;
use crate::vision::conditions::ConditionSample;
use crate::vision::tuner::NormalizedRect;

/// Identifier of one scan attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AttemptId(Uuid);

impl AttemptId {
    /// Fresh random identifier
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for AttemptId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for AttemptId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Short form is enough to tell attempts apart in logs
        write!(f, "{}", &self.0.simple().to_string()[..8])
    }
}

/// Evidence produced by a worker for one frame
#[derive(Debug, Clone)]
pub enum FrameEvent {
    /// A classifier verdict
    Condition(ConditionSample),
    /// A corrected candidate that passed the format validator
    Candidate(CorrectedCandidate),
    /// The frame is fully processed; sent last for every admitted frame
    FrameDone {
        frame_id: FrameId,
        latency: Duration,
        /// Set when the recognition engine failed on this frame
        engine_failure: Option<String>,
    },
}

/// Frame evidence tagged with the attempt it was produced for
#[derive(Debug, Clone)]
pub struct Envelope {
    pub attempt: AttemptId,
    pub event: FrameEvent,
    pub received_at: Instant,
}

impl Envelope {
    /// Wrap an event for the coordinator, stamped with the current time
    pub fn new(attempt: AttemptId, event: FrameEvent) -> Self {
        Self {
            attempt,
            event,
            received_at: Instant::now(),
        }
    }
}

/// Messages consumed by the scan coordinator
#[derive(Debug)]
pub enum CoordinatorMessage {
    /// Take ownership of a freshly started attempt, replacing any current one
    StartAttempt(Box<ScanAttempt>),
    /// Cancel the attempt without emitting a decision
    CancelAttempt(AttemptId),
    /// Apply a manual ROI to the running attempt
    SetManualRoi(NormalizedRect),
    /// Drop the manual ROI and return to the profile's centred ROI
    ClearManualRoi,
    /// Fast-mode flag changed in the admission controller
    FastMode(bool),
    /// Evidence from a worker
    Frame(Envelope),
    /// Request the coordinator to shutdown
    Shutdown,
}
