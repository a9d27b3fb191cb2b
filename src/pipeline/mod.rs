//! Scan Pipeline
//!
//! Wires frame admission, the worker pool and the scan coordinator together
//! behind one host-facing handle.
//!
//! ```text
//! host -> submit_frame -> admission -> workers -> coordinator -> events
//! ```

pub mod admission;
pub mod attempt;
pub mod coordinator;
pub mod dispatch;
pub mod worker;

pub use admission::{AdmissionController, AdmissionVerdict, AdmittedFrame, PowerState, ThermalState};
pub use attempt::{AttemptOutput, ScanAttempt};
pub use coordinator::Coordinator;
pub use dispatch::{AdmissionOutcome, Dispatcher};
pub use worker::{FrameJob, TextStage, WorkerJob};

use crossbeam_channel::{unbounded, Receiver};
use parking_lot::{Mutex, RwLock};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Instant;
use tracing::{info, warn};

use crate::analysis::corrector::CandidateCorrector;
use crate::analysis::events::{EventEmitter, ScanEvent};
use crate::analysis::validator::FormatValidator;
use crate::capture::Frame;
use crate::config::AppConfig;
use crate::error::{ScanError, ScanResult};
use crate::shared::messages::{AttemptId, CoordinatorMessage};
use crate::shared::state::{ActiveAttempt, RuntimeStats};
use crate::storage::profiles::AccessoryProfile;
use crate::vision::ocr::TextRecognizer;
use crate::vision::tuner::{NormalizedRect, RecognitionConfig};

/// Host-facing handle of the recognition pipeline
pub struct ScanPipeline {
    config: AppConfig,
    profile: RwLock<Arc<AccessoryProfile>>,
    manual_roi: Mutex<Option<NormalizedRect>>,
    dispatcher: Arc<Dispatcher>,
    events: Arc<EventEmitter>,
    handles: Vec<JoinHandle<()>>,
}

impl ScanPipeline {
    /// Validate settings and profile, then start the worker and coordinator threads
    pub fn new(
        config: AppConfig,
        profile: AccessoryProfile,
        recognizer: Arc<dyn TextRecognizer>,
    ) -> ScanResult<Self> {
        config.validate()?;
        profile.validate()?;
        profile.validate_for_window(config.consensus.window_capacity)?;

        let (jobs_tx, jobs_rx) = unbounded();
        let (coord_tx, coord_rx) = unbounded();
        let dispatcher = Arc::new(Dispatcher::new(
            AdmissionController::new(config.admission.clone()),
            jobs_tx,
            coord_tx,
        ));
        let events = Arc::new(EventEmitter::new());

        let mut handles = Vec::with_capacity(config.workers.threads + 1);
        for index in 0..config.workers.threads {
            let jobs = jobs_rx.clone();
            let dispatcher = dispatcher.clone();
            let recognizer = recognizer.clone();
            let min_evidence = config.classifiers.lighting_min_evidence;
            let handle = std::thread::Builder::new()
                .name(format!("scan-worker-{}", index))
                .spawn(move || worker::run_worker(index, jobs, dispatcher, recognizer, min_evidence))?;
            handles.push(handle);
        }

        let coordinator = Coordinator::new(coord_rx, events.clone(), dispatcher.clone(), config.workers.tick());
        handles.push(
            std::thread::Builder::new()
                .name("scan-coordinator".to_string())
                .spawn(move || coordinator.run())?,
        );

        info!(
            "Scan pipeline started: {} workers, recognizer '{}', profile '{}'",
            config.workers.threads,
            recognizer.name(),
            profile.id
        );

        Ok(Self {
            config,
            profile: RwLock::new(Arc::new(profile)),
            manual_roi: Mutex::new(None),
            dispatcher,
            events,
            handles,
        })
    }

    /// Start a new scan attempt, cancelling any running one
    pub fn start_scan(&self) -> ScanResult<AttemptId> {
        self.ensure_running()?;
        let profile = self.profile.read().clone();
        let id = AttemptId::new();

        let mut attempt = ScanAttempt::start(id, profile.clone(), &self.config, Instant::now())?;
        if let Some(roi) = *self.manual_roi.lock() {
            if let Err(e) = attempt.set_manual_roi(roi) {
                warn!("Stored manual ROI no longer fits profile '{}': {}", profile.id, e);
            }
        }
        let initial_config = attempt.recognition_config().clone();
        let text_stage = Arc::new(TextStage {
            corrector: CandidateCorrector::from_profile(&profile),
            validator: FormatValidator::from_profile(&profile)?,
        });

        // The ticket and the start message change together so no frame of the
        // new attempt can reach the coordinator before the attempt does
        let mut active = self.dispatcher.active().write();
        if let Some(previous) = active.id {
            let _ = self
                .dispatcher
                .coordinator()
                .send(CoordinatorMessage::CancelAttempt(previous));
        }
        self.dispatcher.clear_deferred();
        self.dispatcher.publish_config(initial_config);
        self.dispatcher
            .coordinator()
            .send(CoordinatorMessage::StartAttempt(Box::new(attempt)))
            .map_err(|_| ScanError::PipelineClosed)?;
        *active = ActiveAttempt::start(
            id,
            profile.frame_budget,
            self.config.classifiers.frames_per_attempt,
            text_stage,
        );
        Ok(id)
    }

    /// Cancel the running attempt without a decision
    ///
    /// Results still in flight for it are discarded when they arrive.
    pub fn stop_scan(&self) -> Option<AttemptId> {
        let mut active = self.dispatcher.active().write();
        let id = active.id?;
        active.finish(id);
        self.dispatcher.clear_deferred();
        let _ = self
            .dispatcher
            .coordinator()
            .send(CoordinatorMessage::CancelAttempt(id));
        info!("Scan {} stopped", id);
        Some(id)
    }

    /// Offer a frame from the capture source
    pub fn submit_frame(&self, frame: Frame) -> AdmissionOutcome {
        self.dispatcher.submit(frame)
    }

    /// Forward power and thermal signals to admission control
    pub fn set_power_state(&self, state: PowerState) {
        self.dispatcher.admission().set_power_state(state);
    }

    /// Replace the accessory profile; applies from the next attempt
    pub fn set_profile(&self, profile: AccessoryProfile) -> ScanResult<()> {
        let checked = profile
            .validate()
            .and_then(|_| profile.validate_for_window(self.config.consensus.window_capacity));
        if let Err(e) = checked {
            warn!("Rejected profile '{}': {}", profile.id, e);
            return Err(e);
        }
        info!("Profile '{}' selected", profile.id);
        *self.profile.write() = Arc::new(profile);
        Ok(())
    }

    /// Get the profile the next attempt will use
    pub fn profile(&self) -> Arc<AccessoryProfile> {
        self.profile.read().clone()
    }

    /// Apply a user-dragged ROI, clipped to the profile's maximum ROI
    pub fn set_manual_roi(&self, roi: NormalizedRect) -> ScanResult<()> {
        let max = NormalizedRect::centered(self.profile.read().max_roi)?;
        if roi.intersect(&max).is_none() {
            warn!("Manual ROI {:?} outside the allowed region, keeping previous", roi);
            return Err(ScanError::InvalidConfig(
                "manual ROI does not overlap the profile's maximum ROI".to_string(),
            ));
        }
        *self.manual_roi.lock() = Some(roi);
        self.dispatcher
            .coordinator()
            .send(CoordinatorMessage::SetManualRoi(roi))
            .map_err(|_| ScanError::PipelineClosed)
    }

    /// Return to the profile's centred ROI
    pub fn clear_manual_roi(&self) -> ScanResult<()> {
        *self.manual_roi.lock() = None;
        self.dispatcher
            .coordinator()
            .send(CoordinatorMessage::ClearManualRoi)
            .map_err(|_| ScanError::PipelineClosed)
    }

    /// Subscribe to guidance, live text and decisions
    pub fn subscribe(&self) -> Receiver<ScanEvent> {
        self.events.subscribe()
    }

    /// Parameters the recognizer receives for the next frame
    pub fn recognition_config(&self) -> RecognitionConfig {
        self.dispatcher.recognition_config()
    }

    /// Get the running attempt, if any
    pub fn active_attempt(&self) -> Option<AttemptId> {
        self.dispatcher.active().read().id
    }

    /// Whether admission currently runs in fast mode
    pub fn is_fast_mode(&self) -> bool {
        self.dispatcher.admission().is_fast_mode()
    }

    /// Get a snapshot of the frame and decision counters
    pub fn stats(&self) -> RuntimeStats {
        self.dispatcher.stats()
    }

    /// Stop all pipeline threads and wait for them
    pub fn shutdown(&mut self) {
        if self.handles.is_empty() {
            return;
        }
        let _ = self.dispatcher.coordinator().send(CoordinatorMessage::Shutdown);
        for _ in 0..self.config.workers.threads {
            let _ = self.dispatcher.jobs().send(WorkerJob::Shutdown);
        }
        for handle in self.handles.drain(..) {
            let _ = handle.join();
        }
        info!("Scan pipeline shut down");
    }

    fn ensure_running(&self) -> ScanResult<()> {
        if self.handles.is_empty() {
            Err(ScanError::PipelineClosed)
        } else {
            Ok(())
        }
    }
}

impl Drop for ScanPipeline {
    fn drop(&mut self) {
        self.shutdown();
    }
}
