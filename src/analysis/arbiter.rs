//! Decision Arbiter
//!
//! Terminal state machine of a scan attempt. It watches consensus updates
//! and turns the first terminal one into exactly one [`Decision`].

use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::info;

use crate::storage::profiles::DecisionThresholds;

use super::consensus::{ConsensusUpdate, SerialConsensus, StabilityState};

/// Arbiter lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArbiterPhase {
    /// Waiting for a terminal consensus state
    Scanning,
    /// Applying thresholds to the frozen consensus
    Deciding,
    /// Decision emitted; further updates are ignored
    Done,
}

/// Why an attempt was rejected
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum RejectReason {
    /// Nothing reached the borderline threshold before the budget ran out
    NoCandidate,
    /// A consensus locked but its confidence is below borderline
    LowConfidence { serial: String, confidence: f32 },
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RejectReason::NoCandidate => write!(f, "no candidate"),
            RejectReason::LowConfidence { serial, confidence } => {
                write!(f, "low confidence {:.2} for {}", confidence, serial)
            }
        }
    }
}

/// Outcome of a scan attempt
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "decision", rename_all = "snake_case")]
pub enum Decision {
    /// Confident enough to submit automatically
    Accept { serial: String, confidence: f32 },
    /// Needs confirmation from the user
    Borderline { serial: String, confidence: f32 },
    Reject(RejectReason),
}

impl Decision {
    /// Serial carried by the decision, if any
    pub fn serial(&self) -> Option<&str> {
        match self {
            Decision::Accept { serial, .. } | Decision::Borderline { serial, .. } => Some(serial),
            Decision::Reject(RejectReason::LowConfidence { serial, .. }) => Some(serial),
            Decision::Reject(RejectReason::NoCandidate) => None,
        }
    }

    /// Check if the serial can be submitted automatically
    pub fn is_accept(&self) -> bool {
        matches!(self, Decision::Accept { .. })
    }

    /// Check if the attempt produced no usable serial
    pub fn is_reject(&self) -> bool {
        matches!(self, Decision::Reject(_))
    }
}

impl fmt::Display for Decision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Decision::Accept { serial, confidence } => {
                write!(f, "ACCEPT {} ({:.2})", serial, confidence)
            }
            Decision::Borderline { serial, confidence } => {
                write!(f, "BORDERLINE {} ({:.2})", serial, confidence)
            }
            Decision::Reject(reason) => write!(f, "REJECT {}", reason),
        }
    }
}

/// Per-attempt decision state machine
#[derive(Debug, Clone)]
pub struct DecisionArbiter {
    thresholds: DecisionThresholds,
    phase: ArbiterPhase,
}

impl DecisionArbiter {
    /// Create a new arbiter in the scanning phase
    pub fn new(thresholds: DecisionThresholds) -> Self {
        Self {
            thresholds,
            phase: ArbiterPhase::Scanning,
        }
    }

    /// Get the current phase
    pub fn phase(&self) -> ArbiterPhase {
        self.phase
    }

    /// Check if a decision has been made
    pub fn is_done(&self) -> bool {
        self.phase == ArbiterPhase::Done
    }

    /// Get the decision thresholds
    pub fn thresholds(&self) -> &DecisionThresholds {
        &self.thresholds
    }

    /// Observe one consensus update; returns the decision at most once
    pub fn observe(&mut self, update: &ConsensusUpdate) -> Option<Decision> {
        if self.phase == ArbiterPhase::Done {
            return None;
        }
        if !update.state.is_terminal() {
            return None;
        }

        self.phase = ArbiterPhase::Deciding;
        let decision = match update.state {
            StabilityState::Stable => self.decide_stable(update.consensus.as_ref()),
            _ => self.decide_expired(update.consensus.as_ref()),
        };
        self.phase = ArbiterPhase::Done;

        info!("Decision after {:?}: {}", update.state, decision);
        Some(decision)
    }

    fn decide_stable(&self, consensus: Option<&SerialConsensus>) -> Decision {
        let Some(c) = consensus else {
            return Decision::Reject(RejectReason::NoCandidate);
        };
        let confidence = c.overall_confidence;
        if confidence >= self.thresholds.high_confidence {
            Decision::Accept {
                serial: c.text.clone(),
                confidence,
            }
        } else if confidence >= self.thresholds.borderline {
            Decision::Borderline {
                serial: c.text.clone(),
                confidence,
            }
        } else {
            Decision::Reject(RejectReason::LowConfidence {
                serial: c.text.clone(),
                confidence,
            })
        }
    }

    /// An unstable leader is never accepted automatically
    fn decide_expired(&self, consensus: Option<&SerialConsensus>) -> Decision {
        match consensus {
            Some(c) if c.overall_confidence >= self.thresholds.borderline => Decision::Borderline {
                serial: c.text.clone(),
                confidence: c.overall_confidence,
            },
            _ => Decision::Reject(RejectReason::NoCandidate),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    fn update(state: StabilityState, confidence: Option<f32>) -> ConsensusUpdate {
        let now = Instant::now();
        ConsensusUpdate {
            consensus: confidence.map(|c| SerialConsensus {
                text: "C02XJ1A2X3C9".to_string(),
                overall_confidence: c,
                supporting_frame_count: 5,
                first_seen_at: now,
                last_seen_at: now,
            }),
            state,
            locked_now: state == StabilityState::Stable,
            accepted: true,
        }
    }

    fn arbiter() -> DecisionArbiter {
        DecisionArbiter::new(DecisionThresholds::default())
    }

    #[test]
    fn test_collecting_keeps_scanning() {
        let mut a = arbiter();
        assert_eq!(a.observe(&update(StabilityState::Collecting, Some(0.99))), None);
        assert_eq!(a.phase(), ArbiterPhase::Scanning);
    }

    #[test]
    fn test_stable_thresholds() {
        let cases = [
            (0.95, "accept"),
            (0.9, "accept"),
            (0.8145, "borderline"),
            (0.7, "borderline"),
            (0.69, "reject"),
        ];
        for (confidence, expected) in cases {
            let decision = arbiter()
                .observe(&update(StabilityState::Stable, Some(confidence)))
                .unwrap();
            let got = match decision {
                Decision::Accept { .. } => "accept",
                Decision::Borderline { .. } => "borderline",
                Decision::Reject(_) => "reject",
            };
            assert_eq!(got, expected, "confidence {}", confidence);
        }
    }

    #[test]
    fn test_threshold_ordering() {
        let t = DecisionThresholds::default();
        for i in 0..=100 {
            let c = i as f32 / 100.0;
            for state in [StabilityState::Stable, StabilityState::Expired] {
                let d = arbiter().observe(&update(state, Some(c))).unwrap();
                if c >= t.high_confidence && state == StabilityState::Stable {
                    assert!(!d.is_reject(), "{} rejected", c);
                }
                if c < t.borderline {
                    assert!(!d.is_accept(), "{} accepted", c);
                }
            }
        }
    }

    #[test]
    fn test_expired_never_accepts() {
        let d = arbiter()
            .observe(&update(StabilityState::Expired, Some(0.99)))
            .unwrap();
        assert!(matches!(d, Decision::Borderline { .. }));

        let d = arbiter()
            .observe(&update(StabilityState::Expired, Some(0.5)))
            .unwrap();
        assert_eq!(d, Decision::Reject(RejectReason::NoCandidate));

        let d = arbiter().observe(&update(StabilityState::Expired, None)).unwrap();
        assert_eq!(d.to_string(), "REJECT no candidate");
    }

    #[test]
    fn test_decides_exactly_once() {
        let mut a = arbiter();
        assert!(a.observe(&update(StabilityState::Stable, Some(0.95))).is_some());
        assert!(a.is_done());
        assert!(a.observe(&update(StabilityState::Stable, Some(0.95))).is_none());
        assert!(a.observe(&update(StabilityState::Expired, None)).is_none());
    }

    #[test]
    fn test_low_confidence_lock_carries_serial() {
        let d = arbiter()
            .observe(&update(StabilityState::Stable, Some(0.4)))
            .unwrap();
        assert_eq!(d.serial(), Some("C02XJ1A2X3C9"));
        assert!(matches!(d, Decision::Reject(RejectReason::LowConfidence { .. })));
    }

    #[test]
    fn test_decision_json_shape() {
        let d = Decision::Accept {
            serial: "C02XJ1A2X3C9".to_string(),
            confidence: 0.95,
        };
        let json = serde_json::to_value(&d).unwrap();
        assert_eq!(json["decision"], "accept");
        assert_eq!(json["serial"], "C02XJ1A2X3C9");
    }
}
