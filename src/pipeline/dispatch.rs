//! Frame dispatch
//!
//! Shared between the host-facing pipeline handle and the workers: checks
//! the active attempt ticket, asks admission for a verdict and hands admitted
//! frames to the worker pool. Holds the single deferred-frame slot.

use crossbeam_channel::Sender;
use parking_lot::{Mutex, RwLock};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tracing::{debug, warn};

use crate::capture::{Frame, FrameId};
use crate::shared::messages::CoordinatorMessage;
use crate::shared::state::{ActiveAttempt, RuntimeStats};
use crate::vision::tuner::RecognitionConfig;
use crate::vision::ClassifierPlan;

use super::admission::{AdmissionController, AdmissionVerdict};
use super::worker::{FrameJob, WorkerJob};

/// What happened to a submitted frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdmissionOutcome {
    /// Handed to a worker
    Dispatched(FrameId),
    /// Dropped by the rate cap or because the frame budget is spent
    Dropped,
    /// Parked in the deferred slot until a worker frees up
    Deferred,
    /// No scan attempt is running
    NoActiveAttempt,
    /// The worker pool has shut down
    Closed,
}

pub struct Dispatcher {
    admission: AdmissionController,
    active: RwLock<ActiveAttempt>,
    deferred: Mutex<Option<Frame>>,
    recognition: RwLock<RecognitionConfig>,
    stats: Mutex<RuntimeStats>,
    jobs: Sender<WorkerJob>,
    coordinator: Sender<CoordinatorMessage>,
    /// Fast-mode value last announced to the coordinator
    fast_mode_announced: AtomicBool,
}

impl Dispatcher {
    /// Create a dispatcher feeding the given worker and coordinator channels
    pub fn new(
        admission: AdmissionController,
        jobs: Sender<WorkerJob>,
        coordinator: Sender<CoordinatorMessage>,
    ) -> Self {
        Self {
            admission,
            active: RwLock::new(ActiveAttempt::default()),
            deferred: Mutex::new(None),
            recognition: RwLock::new(RecognitionConfig::default()),
            stats: Mutex::new(RuntimeStats::default()),
            jobs,
            coordinator,
            fast_mode_announced: AtomicBool::new(false),
        }
    }

    /// Get the admission controller
    pub fn admission(&self) -> &AdmissionController {
        &self.admission
    }

    /// Get the active attempt ticket
    pub fn active(&self) -> &RwLock<ActiveAttempt> {
        &self.active
    }

    /// Get the coordinator channel
    pub fn coordinator(&self) -> &Sender<CoordinatorMessage> {
        &self.coordinator
    }

    /// Get the worker job channel
    pub fn jobs(&self) -> &Sender<WorkerJob> {
        &self.jobs
    }

    /// Recognition parameters used for the next dispatched frame
    pub fn recognition_config(&self) -> RecognitionConfig {
        self.recognition.read().clone()
    }

    /// Replace the recognition parameters used for dispatched frames
    pub fn publish_config(&self, config: RecognitionConfig) {
        debug!(
            "Recognition config: mode {:?}, glyph {:.3}, roi {:?}",
            config.mode, config.min_glyph_height, config.roi
        );
        *self.recognition.write() = config;
    }

    /// Get a snapshot of the runtime counters
    pub fn stats(&self) -> RuntimeStats {
        self.stats.lock().clone()
    }

    /// Update the runtime counters
    pub fn record<F: FnOnce(&mut RuntimeStats)>(&self, f: F) {
        f(&mut self.stats.lock());
    }

    /// Offer a frame from the host
    pub fn submit(&self, frame: Frame) -> AdmissionOutcome {
        self.record(|s| s.frames_submitted += 1);
        self.offer(frame)
    }

    /// A worker finished a frame; re-offer the deferred frame if any
    pub fn frame_finished(&self, latency: Duration) {
        self.admission.complete(latency);
        self.announce_fast_mode(self.admission.is_fast_mode());

        let parked = self.deferred.lock().take();
        if let Some(frame) = parked {
            debug!("Re-offering deferred frame {}", frame.id);
            self.offer(frame);
        }
    }

    /// Drop any parked frame
    pub fn clear_deferred(&self) {
        self.deferred.lock().take();
    }

    fn offer(&self, frame: Frame) -> AdmissionOutcome {
        let mut active = self.active.write();
        let (Some(attempt), Some(text_stage)) = (active.id, active.text_stage.clone()) else {
            return AdmissionOutcome::NoActiveAttempt;
        };
        if !active.has_budget() {
            self.record(|s| s.frames_dropped += 1);
            return AdmissionOutcome::Dropped;
        }

        let mut admitted = match self.admission.admit(frame.timestamp) {
            AdmissionVerdict::Process(admitted) => admitted,
            AdmissionVerdict::Drop => {
                self.record(|s| s.frames_dropped += 1);
                return AdmissionOutcome::Dropped;
            }
            AdmissionVerdict::Defer => {
                drop(active);
                self.park(frame);
                return AdmissionOutcome::Deferred;
            }
        };

        if !active.classify_next() {
            admitted.plan = ClassifierPlan::NONE;
        }
        active.dispatched += 1;

        let frame_id = frame.id;
        let job = FrameJob {
            attempt,
            frame,
            admitted,
            config: self.recognition_config(),
            text_stage,
        };
        drop(active);

        self.announce_fast_mode(admitted.fast_mode);
        if self.jobs.send(WorkerJob::Frame(job)).is_err() {
            warn!("Worker pool closed, frame {} not dispatched", frame_id);
            self.admission.complete(Duration::ZERO);
            return AdmissionOutcome::Closed;
        }
        self.record(|s| s.frames_dispatched += 1);
        AdmissionOutcome::Dispatched(frame_id)
    }

    /// Keep only the newest deferred frame
    fn park(&self, frame: Frame) {
        let superseded = self.deferred.lock().replace(frame).is_some();
        self.record(|s| {
            s.frames_deferred += 1;
            if superseded {
                s.deferred_superseded += 1;
            }
        });
    }

    fn announce_fast_mode(&self, fast_mode: bool) {
        if self.fast_mode_announced.swap(fast_mode, Ordering::AcqRel) != fast_mode {
            let _ = self.coordinator.send(CoordinatorMessage::FastMode(fast_mode));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::{CandidateCorrector, FormatValidator};
    use crate::config::AdmissionSettings;
    use crate::shared::messages::AttemptId;
    use crate::storage::AccessoryProfile;
    use crate::pipeline::worker::TextStage;
    use crossbeam_channel::{unbounded, Receiver};
    use std::sync::Arc;
    use std::time::Instant;

    fn dispatcher(
        settings: AdmissionSettings,
    ) -> (Dispatcher, Receiver<WorkerJob>, Receiver<CoordinatorMessage>) {
        let (jobs_tx, jobs_rx) = unbounded();
        let (coord_tx, coord_rx) = unbounded();
        (
            Dispatcher::new(AdmissionController::new(settings), jobs_tx, coord_tx),
            jobs_rx,
            coord_rx,
        )
    }

    fn activate(d: &Dispatcher, frame_budget: u32) -> AttemptId {
        let profile = AccessoryProfile::default();
        let stage = Arc::new(TextStage {
            corrector: CandidateCorrector::from_profile(&profile),
            validator: FormatValidator::from_profile(&profile).unwrap(),
        });
        let id = AttemptId::new();
        *d.active().write() = ActiveAttempt::start(id, frame_budget, 1, stage);
        id
    }

    fn frame(id: u64, at: Instant) -> Frame {
        Frame::filled(id, 8, 8, [0, 0, 0, 255]).with_timestamp(at)
    }

    #[test]
    fn test_idle_pipeline_ignores_frames() {
        let (d, jobs, _) = dispatcher(AdmissionSettings::default());
        assert_eq!(d.submit(frame(0, Instant::now())), AdmissionOutcome::NoActiveAttempt);
        assert!(jobs.try_recv().is_err());
        assert_eq!(d.stats().frames_submitted, 1);
    }

    #[test]
    fn test_dispatch_tags_attempt_and_limits_classifiers() {
        let settings = AdmissionSettings {
            target_fps: 1000,
            ..AdmissionSettings::default()
        };
        let (d, jobs, _) = dispatcher(settings);
        let id = activate(&d, 30);
        let t0 = Instant::now();

        assert_eq!(d.submit(frame(0, t0)), AdmissionOutcome::Dispatched(0));
        assert_eq!(d.submit(frame(1, t0 + Duration::from_millis(5))), AdmissionOutcome::Dispatched(1));

        let Ok(WorkerJob::Frame(first)) = jobs.try_recv() else {
            panic!("expected a frame job");
        };
        assert_eq!(first.attempt, id);
        assert!(!first.admitted.plan.is_empty());

        let Ok(WorkerJob::Frame(second)) = jobs.try_recv() else {
            panic!("expected a frame job");
        };
        assert!(second.admitted.plan.is_empty());
    }

    #[test]
    fn test_frame_budget_stops_dispatch() {
        let settings = AdmissionSettings {
            target_fps: 1000,
            ..AdmissionSettings::default()
        };
        let (d, _jobs, _) = dispatcher(settings);
        activate(&d, 2);
        let t0 = Instant::now();

        d.submit(frame(0, t0));
        d.frame_finished(Duration::from_millis(1));
        d.submit(frame(1, t0 + Duration::from_millis(5)));
        d.frame_finished(Duration::from_millis(1));
        assert_eq!(
            d.submit(frame(2, t0 + Duration::from_millis(10))),
            AdmissionOutcome::Dropped
        );
    }

    #[test]
    fn test_deferred_slot_keeps_latest_and_is_reoffered() {
        let settings = AdmissionSettings {
            target_fps: 1000,
            max_in_flight: 1,
            depth_high_water: 1,
            depth_low_water: 0,
            ..AdmissionSettings::default()
        };
        let (d, jobs, _) = dispatcher(settings);
        activate(&d, 30);
        let t0 = Instant::now();

        assert_eq!(d.submit(frame(0, t0)), AdmissionOutcome::Dispatched(0));
        assert_eq!(d.submit(frame(1, t0 + Duration::from_millis(5))), AdmissionOutcome::Deferred);
        assert_eq!(d.submit(frame(2, t0 + Duration::from_millis(10))), AdmissionOutcome::Deferred);
        assert_eq!(d.stats().deferred_superseded, 1);

        d.frame_finished(Duration::from_millis(3));
        let ids: Vec<u64> = jobs
            .try_iter()
            .filter_map(|j| match j {
                WorkerJob::Frame(job) => Some(job.frame.id),
                WorkerJob::Shutdown => None,
            })
            .collect();
        assert_eq!(ids, vec![0, 2]);
    }

    #[test]
    fn test_fast_mode_change_is_announced() {
        let settings = AdmissionSettings {
            target_fps: 1000,
            ..AdmissionSettings::default()
        };
        let (d, _jobs, coord) = dispatcher(settings);
        activate(&d, 30);

        d.frame_finished(Duration::from_millis(500));
        assert!(matches!(coord.try_recv(), Ok(CoordinatorMessage::FastMode(true))));
        d.frame_finished(Duration::from_millis(500));
        assert!(coord.try_recv().is_err());
    }
}
