//! Scan Attempt
//!
//! Owning context of one scan: budgets, the consensus window, the arbiter,
//! the latest conditions and the tuner. Lives on the coordinator thread only.

use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use crate::analysis::arbiter::{Decision, DecisionArbiter};
use crate::analysis::consensus::{ConsensusEngine, ConsensusParams, ConsensusUpdate};
use crate::analysis::corrector::CorrectedCandidate;
use crate::analysis::events::Guidance;
use crate::config::AppConfig;
use crate::error::ScanResult;
use crate::shared::messages::{AttemptId, FrameEvent};
use crate::storage::profiles::AccessoryProfile;
use crate::vision::conditions::{ConditionSample, ConditionSnapshot};
use crate::vision::tuner::{NormalizedRect, RecognitionConfig, RecognitionTuner};

/// What the coordinator should publish after handling an event
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AttemptOutput {
    /// Leading corrected text and its confidence
    pub live_text: Option<(String, f32)>,
    pub guidance: Option<Guidance>,
    pub decision: Option<Decision>,
    /// Set when the recognition config changed
    pub config: Option<RecognitionConfig>,
}

/// One scan attempt
#[derive(Debug)]
pub struct ScanAttempt {
    id: AttemptId,
    started_at: Instant,
    frame_budget: u32,
    time_budget: Duration,
    frame_counter: u32,
    profile: Arc<AccessoryProfile>,
    consensus: ConsensusEngine,
    arbiter: DecisionArbiter,
    conditions: ConditionSnapshot,
    tuner: RecognitionTuner,
    fast_mode: bool,
}

impl ScanAttempt {
    /// Start an attempt with an immutable profile snapshot
    pub fn start(
        id: AttemptId,
        profile: Arc<AccessoryProfile>,
        config: &AppConfig,
        started_at: Instant,
    ) -> ScanResult<Self> {
        profile.validate_for_window(config.consensus.window_capacity)?;
        let params = ConsensusParams::new(config.consensus.window_capacity, &profile.thresholds);
        let tuner = RecognitionTuner::new(profile.clone(), config.classifiers.tuning_confidence)?;

        info!(
            "Attempt {} started (profile '{}', {} frames / {:?})",
            id,
            profile.id,
            profile.frame_budget,
            profile.time_budget()
        );

        Ok(Self {
            id,
            started_at,
            frame_budget: profile.frame_budget,
            time_budget: profile.time_budget(),
            frame_counter: 0,
            consensus: ConsensusEngine::new(id, params),
            arbiter: DecisionArbiter::new(profile.thresholds),
            conditions: ConditionSnapshot::default(),
            tuner,
            profile,
            fast_mode: false,
        })
    }

    /// Get the attempt identifier
    pub fn id(&self) -> AttemptId {
        self.id
    }

    /// Get the instant the attempt started
    pub fn started_at(&self) -> Instant {
        self.started_at
    }

    /// Get the number of frames finished so far
    pub fn frame_counter(&self) -> u32 {
        self.frame_counter
    }

    /// Get the maximum number of frames
    pub fn frame_budget(&self) -> u32 {
        self.frame_budget
    }

    /// Get the maximum wall time
    pub fn time_budget(&self) -> Duration {
        self.time_budget
    }

    /// Get the profile snapshot this attempt runs with
    pub fn profile(&self) -> &AccessoryProfile {
        &self.profile
    }

    /// Get the latest condition samples
    pub fn conditions(&self) -> &ConditionSnapshot {
        &self.conditions
    }

    /// Get the consensus engine
    pub fn consensus(&self) -> &ConsensusEngine {
        &self.consensus
    }

    /// Get the current recognition parameters
    pub fn recognition_config(&self) -> &RecognitionConfig {
        self.tuner.current()
    }

    /// Guidance before any evidence has arrived
    pub fn initial_guidance(&self) -> Guidance {
        self.guidance(&self.consensus.snapshot())
    }

    /// Decision already emitted
    pub fn is_done(&self) -> bool {
        self.arbiter.is_done()
    }

    /// Route one worker event
    pub fn handle(&mut self, event: FrameEvent, now: Instant) -> AttemptOutput {
        if self.is_done() {
            return AttemptOutput::default();
        }
        let mut out = match event {
            FrameEvent::Condition(sample) => self.record_condition(sample),
            FrameEvent::Candidate(candidate) => self.ingest_candidate(candidate, now),
            FrameEvent::FrameDone {
                frame_id,
                latency,
                engine_failure,
            } => {
                if let Some(err) = engine_failure {
                    warn!(
                        "Attempt {}: frame {} counted as empty after engine failure: {}",
                        self.id, frame_id, err
                    );
                }
                self.frame_counter += 1;
                debug!(
                    "Attempt {}: frame {} done in {:?} ({}/{})",
                    self.id, frame_id, latency, self.frame_counter, self.frame_budget
                );
                AttemptOutput::default()
            }
        };

        if out.decision.is_none() {
            if let Some(expired) = self.check_budget(now) {
                out.guidance = expired.guidance;
                out.decision = expired.decision;
            }
        }
        out
    }

    /// Store a classifier verdict and retune
    pub fn record_condition(&mut self, sample: ConditionSample) -> AttemptOutput {
        self.conditions.record(sample);
        let config = self.retune();
        AttemptOutput {
            guidance: Some(self.guidance(&self.consensus.snapshot())),
            config,
            ..AttemptOutput::default()
        }
    }

    /// Feed one well-formed candidate into the consensus
    pub fn ingest_candidate(&mut self, candidate: CorrectedCandidate, seen_at: Instant) -> AttemptOutput {
        let update = self.consensus.ingest(candidate, seen_at);
        if !update.accepted {
            return AttemptOutput::default();
        }
        AttemptOutput {
            live_text: update
                .consensus
                .as_ref()
                .map(|c| (c.text.clone(), c.overall_confidence)),
            guidance: Some(self.guidance(&update)),
            decision: self.arbiter.observe(&update),
            config: None,
        }
    }

    /// Expire the attempt when either budget is used up
    pub fn check_budget(&mut self, now: Instant) -> Option<AttemptOutput> {
        if self.is_done() {
            return None;
        }
        let elapsed = now.saturating_duration_since(self.started_at);
        let frames_spent = self.frame_counter >= self.frame_budget;
        if !frames_spent && elapsed < self.time_budget {
            return None;
        }

        info!(
            "Attempt {}: budget exhausted after {} frames / {:?}",
            self.id, self.frame_counter, elapsed
        );
        let update = self.consensus.expire();
        Some(AttemptOutput {
            guidance: Some(self.guidance(&update)),
            decision: self.arbiter.observe(&update),
            ..AttemptOutput::default()
        })
    }

    /// Apply a fast-mode change from admission
    pub fn set_fast_mode(&mut self, fast_mode: bool) -> Option<RecognitionConfig> {
        if self.fast_mode == fast_mode {
            return None;
        }
        self.fast_mode = fast_mode;
        self.retune()
    }

    /// Apply a manual ROI, keeping the previous one on failure
    pub fn set_manual_roi(&mut self, roi: NormalizedRect) -> ScanResult<RecognitionConfig> {
        self.tuner.set_manual_roi(roi)?;
        self.tuner.retune(&self.conditions, self.fast_mode);
        Ok(self.tuner.current().clone())
    }

    /// Return to the centred ROI; the new config if it changed
    pub fn clear_manual_roi(&mut self) -> Option<RecognitionConfig> {
        self.tuner.clear_manual_roi();
        self.retune()
    }

    fn retune(&mut self) -> Option<RecognitionConfig> {
        let before = self.tuner.current().clone();
        let after = self.tuner.retune(&self.conditions, self.fast_mode);
        (*after != before).then(|| after.clone())
    }

    fn guidance(&self, update: &ConsensusUpdate) -> Guidance {
        Guidance::new(
            self.id,
            &self.conditions,
            update.state,
            update
                .consensus
                .as_ref()
                .map_or(0, |c| c.supporting_frame_count),
            self.profile.thresholds.min_frames_for_consensus,
        )
    }
}
