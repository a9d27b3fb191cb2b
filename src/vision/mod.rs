//! Vision Layer
//!
//! Condition classifiers (surface, lighting, tilt), the recognition tuner
//! and the seam to the external text-recognition engine.
//!
//! Classifiers are pure functions of one frame and run concurrently with
//! each other on a downsampled thumbnail.

pub mod angle;
pub mod conditions;
pub mod lighting;
pub mod ocr;
pub mod surface;
pub mod tuner;

pub use conditions::{
    ConditionKind, ConditionLabel, ConditionSample, ConditionSnapshot, LightingCondition,
    SurfaceMaterial,
};
pub use ocr::{RawCandidate, ScriptedOutput, ScriptedRecognizer, TextRecognizer};
pub use tuner::{NormalizedRect, RecognitionConfig, RecognitionMode, RecognitionTuner};

use std::time::Instant;
use tracing::debug;

use crate::capture::Frame;

/// Longest thumbnail side the classifiers work on
pub const CLASSIFIER_THUMBNAIL_SIDE: u32 = 160;

/// Which classifiers to run on a frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClassifierPlan {
    pub surface: bool,
    pub lighting: bool,
    pub angle: bool,
}

impl ClassifierPlan {
    pub const ALL: ClassifierPlan = ClassifierPlan {
        surface: true,
        lighting: true,
        angle: true,
    };

    pub const NONE: ClassifierPlan = ClassifierPlan {
        surface: false,
        lighting: false,
        angle: false,
    };

    /// Check if no classifier is planned
    pub fn is_empty(&self) -> bool {
        !(self.surface || self.lighting || self.angle)
    }
}

/// Run the planned classifiers on a frame
///
/// Surface runs alongside lighting and angle; the returned samples are in
/// surface, lighting, angle order with skipped kinds omitted.
pub fn run_classifiers(
    frame: &Frame,
    plan: ClassifierPlan,
    lighting_min_evidence: f32,
) -> Vec<ConditionSample> {
    if plan.is_empty() || !frame.is_complete() {
        return vec![];
    }

    let start = Instant::now();
    let thumbnail = frame.thumbnail(CLASSIFIER_THUMBNAIL_SIDE);

    let (surface, (lighting, angle)) = rayon::join(
        || plan.surface.then(|| surface::classify_surface(&thumbnail)),
        || {
            rayon::join(
                || {
                    plan.lighting
                        .then(|| lighting::classify_lighting(&thumbnail, lighting_min_evidence))
                },
                || plan.angle.then(|| angle::classify_angle(&thumbnail)),
            )
        },
    );

    let samples: Vec<ConditionSample> = [surface, lighting, angle].into_iter().flatten().collect();
    debug!(
        "Classified frame {} in {:?}: {:?}",
        frame.id,
        start.elapsed(),
        samples.iter().map(|s| s.label).collect::<Vec<_>>()
    );
    samples
}
