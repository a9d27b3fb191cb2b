//! Frame workers
//!
//! Each worker runs the classifiers and the recognition engine for one
//! admitted frame, corrects and validates the candidates, and reports
//! everything to the coordinator tagged with the frame's attempt.

use crossbeam_channel::{Receiver, Sender};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use crate::analysis::corrector::CandidateCorrector;
use crate::analysis::validator::FormatValidator;
use crate::capture::Frame;
use crate::shared::messages::{AttemptId, CoordinatorMessage, Envelope, FrameEvent};
use crate::vision::ocr::TextRecognizer;
use crate::vision::tuner::{RecognitionConfig, RecognitionMode};
use crate::vision::run_classifiers;

use super::admission::AdmittedFrame;
use super::dispatch::Dispatcher;

/// Per-profile text processing shared by every frame of an attempt
pub struct TextStage {
    pub corrector: CandidateCorrector,
    pub validator: FormatValidator,
}

/// One admitted frame and everything needed to process it
pub struct FrameJob {
    pub attempt: AttemptId,
    pub frame: Frame,
    pub admitted: AdmittedFrame,
    /// Recognition parameters at dispatch time
    pub config: RecognitionConfig,
    pub text_stage: Arc<TextStage>,
}

/// Work queue message
pub enum WorkerJob {
    Frame(FrameJob),
    Shutdown,
}

/// Process one frame and send its envelopes; returns the processing latency
///
/// `FrameDone` is always the last envelope sent for the frame.
pub fn process_frame(
    job: &FrameJob,
    recognizer: &dyn TextRecognizer,
    lighting_min_evidence: f32,
    sink: &Sender<CoordinatorMessage>,
) -> Duration {
    let start = Instant::now();
    let frame = &job.frame;

    let mut config = job.config.clone();
    if job.admitted.fast_mode {
        config.mode = RecognitionMode::Fast;
    }

    let (samples, recognized) = rayon::join(
        || run_classifiers(frame, job.admitted.plan, lighting_min_evidence),
        || recognizer.recognize(frame, &config),
    );

    let send = |event: FrameEvent| {
        // A closed coordinator means the pipeline is shutting down
        let _ = sink.send(CoordinatorMessage::Frame(Envelope::new(job.attempt, event)));
    };

    for sample in samples {
        send(FrameEvent::Condition(sample));
    }

    let engine_failure = match recognized {
        Ok(candidates) => {
            for raw in &candidates {
                let corrected = job.text_stage.corrector.correct(raw, frame.id);
                let verdict = job.text_stage.validator.validate(&corrected.text);
                if verdict.is_well_formed {
                    debug!(
                        "Frame {}: '{}' -> '{}' ({:.3} -> {:.3})",
                        frame.id, raw.text, corrected.text, raw.confidence, corrected.confidence
                    );
                    send(FrameEvent::Candidate(corrected));
                } else {
                    debug!("Frame {}: '{}' rejected as malformed", frame.id, corrected.text);
                }
            }
            None
        }
        Err(e) => {
            warn!("Recognizer '{}' failed on frame {}: {}", recognizer.name(), frame.id, e);
            Some(e.to_string())
        }
    };

    let latency = start.elapsed();
    send(FrameEvent::FrameDone {
        frame_id: frame.id,
        latency,
        engine_failure,
    });
    latency
}

/// Worker thread body: process jobs until shutdown
pub fn run_worker(
    index: usize,
    jobs: Receiver<WorkerJob>,
    dispatcher: Arc<Dispatcher>,
    recognizer: Arc<dyn TextRecognizer>,
    lighting_min_evidence: f32,
) {
    info!("Frame worker {} starting...", index);
    while let Ok(job) = jobs.recv() {
        match job {
            WorkerJob::Frame(job) => {
                let latency = process_frame(
                    &job,
                    recognizer.as_ref(),
                    lighting_min_evidence,
                    dispatcher.coordinator(),
                );
                dispatcher.frame_finished(latency);
            }
            WorkerJob::Shutdown => break,
        }
    }
    info!("Frame worker {} exiting...", index);
}
