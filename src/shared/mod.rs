//! Shared state and messaging between the pipeline threads
//!
//! Workers and the host-facing pipeline handle talk to the single scan
//! coordinator through attempt-tagged messages.

pub mod messages;
pub mod state;

pub use messages::{AttemptId, CoordinatorMessage, Envelope, FrameEvent};
pub use state::{ActiveAttempt, RuntimeStats};
