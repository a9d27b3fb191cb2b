//! State shared between the frame source, the workers and the coordinator

use std::sync::Arc;

use crate::pipeline::worker::TextStage;

use super::messages::AttemptId;

/// Dispatch ticket for the running scan attempt
///
/// Cleared the moment an attempt is stopped or decided so no further frames
/// are dispatched for it.
#[derive(Clone, Default)]
pub struct ActiveAttempt {
    /// Running attempt, if any
    pub id: Option<AttemptId>,
    /// Frames dispatched to workers for this attempt
    pub dispatched: u32,
    /// Frames the attempt may consume
    pub frame_budget: u32,
    /// Leading frames that run the condition classifiers
    pub classify_frames: u32,
    /// Corrector and validator built from the attempt's profile
    pub text_stage: Option<Arc<TextStage>>,
}

impl ActiveAttempt {
    /// Create a ticket for a freshly started attempt
    pub fn start(id: AttemptId, frame_budget: u32, classify_frames: u32, text_stage: Arc<TextStage>) -> Self {
        Self {
            id: Some(id),
            dispatched: 0,
            frame_budget,
            classify_frames,
            text_stage: Some(text_stage),
        }
    }

    /// Clear the ticket if it still belongs to `id`
    pub fn finish(&mut self, id: AttemptId) -> bool {
        if self.id == Some(id) {
            *self = Self::default();
            true
        } else {
            false
        }
    }

    /// Check if an attempt is running
    pub fn is_active(&self) -> bool {
        self.id.is_some()
    }

    /// Whether the frame budget allows another dispatch
    pub fn has_budget(&self) -> bool {
        self.dispatched < self.frame_budget
    }

    /// Whether the next dispatched frame should run the classifiers
    pub fn classify_next(&self) -> bool {
        self.dispatched < self.classify_frames
    }
}

/// Pipeline counters, not persisted
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RuntimeStats {
    /// Frames offered by the host
    pub frames_submitted: u64,
    /// Frames handed to a worker
    pub frames_dispatched: u64,
    /// Frames dropped by the rate cap or budget
    pub frames_dropped: u64,
    /// Frames parked in the deferred slot
    pub frames_deferred: u64,
    /// Deferred frames replaced by a newer one before being re-offered
    pub deferred_superseded: u64,
    /// Envelopes discarded because their attempt was no longer current
    pub stale_envelopes: u64,
    /// Frames on which the recognition engine failed
    pub engine_failures: u64,
    /// Decisions emitted
    pub decisions: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::{CandidateCorrector, FormatValidator};
    use crate::storage::AccessoryProfile;

    fn stage() -> Arc<TextStage> {
        let profile = AccessoryProfile::default();
        Arc::new(TextStage {
            corrector: CandidateCorrector::from_profile(&profile),
            validator: FormatValidator::from_profile(&profile).unwrap(),
        })
    }

    #[test]
    fn test_finish_only_clears_matching_attempt() {
        let id = AttemptId::new();
        let mut active = ActiveAttempt::start(id, 30, 3, stage());
        assert!(!active.finish(AttemptId::new()));
        assert!(active.is_active());
        assert!(active.finish(id));
        assert!(!active.is_active());
        assert!(active.text_stage.is_none());
    }

    #[test]
    fn test_budget_and_classifier_window() {
        let mut active = ActiveAttempt::start(AttemptId::new(), 4, 2, stage());
        let mut classified = 0;
        while active.has_budget() {
            if active.classify_next() {
                classified += 1;
            }
            active.dispatched += 1;
        }
        assert_eq!(active.dispatched, 4);
        assert_eq!(classified, 2);
    }
}
