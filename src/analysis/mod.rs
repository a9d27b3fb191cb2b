//! Analysis Layer
//!
//! Text-side stages of the pipeline: correction, format validation,
//! cross-frame consensus and the final decision, plus the event feed the
//! host listens on.

pub mod arbiter;
pub mod consensus;
pub mod corrector;
pub mod events;
pub mod validator;

pub use arbiter::{ArbiterPhase, Decision, DecisionArbiter, RejectReason};
pub use consensus::{
    ConsensusEngine, ConsensusParams, ConsensusUpdate, ConsensusWindow, SerialConsensus,
    StabilityState,
};
pub use corrector::{CandidateCorrector, CorrectedCandidate};
pub use events::{EventEmitter, Guidance, ScanEvent};
pub use validator::{FormatValidator, MatchedPattern, PatternKind, SerialFormatVerdict, SerialPattern};
