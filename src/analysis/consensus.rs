//! Consensus Engine
//!
//! Aggregates corrected, well-formed candidates across frames of one scan
//! attempt. Candidates are grouped by exact text inside a bounded window and
//! the best-supported group is the current consensus. Once a group locks the
//! engine is frozen for the rest of the attempt.

use std::cmp::Ordering;
use std::collections::{HashMap, VecDeque};
use std::time::Instant;
use tracing::{debug, info};

use crate::shared::messages::AttemptId;
use crate::storage::profiles::DecisionThresholds;

use super::corrector::CorrectedCandidate;

/// Default number of candidates kept in the window
pub const DEFAULT_WINDOW_CAPACITY: usize = 15;

/// Evidence state of a scan attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StabilityState {
    /// Not enough agreement yet
    Collecting,
    /// Agreement and confidence thresholds met; terminal
    Stable,
    /// Budget ran out before stability; terminal
    Expired,
}

impl StabilityState {
    /// Check if the state can no longer change
    pub fn is_terminal(&self) -> bool {
        !matches!(self, StabilityState::Collecting)
    }
}

/// Best-supported text hypothesis
#[derive(Debug, Clone, PartialEq)]
pub struct SerialConsensus {
    pub text: String,
    /// Confidence-weighted mean confidence of the group
    pub overall_confidence: f32,
    pub supporting_frame_count: usize,
    pub first_seen_at: Instant,
    pub last_seen_at: Instant,
}

/// Tunables for one engine
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ConsensusParams {
    pub window_capacity: usize,
    pub min_frames_for_consensus: usize,
    pub consensus_confidence: f32,
    pub early_stop_confidence: f32,
}

impl ConsensusParams {
    /// Create parameters from a window size and profile thresholds
    pub fn new(window_capacity: usize, thresholds: &DecisionThresholds) -> Self {
        Self {
            window_capacity: window_capacity.max(1),
            min_frames_for_consensus: thresholds.min_frames_for_consensus,
            consensus_confidence: thresholds.consensus_confidence,
            early_stop_confidence: thresholds.early_stop_confidence,
        }
    }
}

impl Default for ConsensusParams {
    fn default() -> Self {
        Self::new(DEFAULT_WINDOW_CAPACITY, &DecisionThresholds::default())
    }
}

#[derive(Debug, Clone)]
struct WindowEntry {
    candidate: CorrectedCandidate,
    seen_at: Instant,
}

/// Bounded ring buffer of candidates from a single scan attempt
#[derive(Debug, Clone)]
pub struct ConsensusWindow {
    attempt: AttemptId,
    capacity: usize,
    entries: VecDeque<WindowEntry>,
}

impl ConsensusWindow {
    /// Create an empty window owned by an attempt
    pub fn new(attempt: AttemptId, capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            attempt,
            capacity,
            entries: VecDeque::with_capacity(capacity),
        }
    }

    /// Attempt every entry belongs to
    pub fn attempt(&self) -> AttemptId {
        self.attempt
    }

    /// Get the number of buffered candidates
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if the window holds no candidates
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Get the maximum number of buffered candidates
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Append a candidate, evicting and returning the oldest when full
    pub fn push(&mut self, candidate: CorrectedCandidate, seen_at: Instant) -> Option<CorrectedCandidate> {
        let evicted = if self.entries.len() == self.capacity {
            self.entries.pop_front().map(|e| e.candidate)
        } else {
            None
        };
        self.entries.push_back(WindowEntry { candidate, seen_at });
        evicted
    }

    /// Empty the window and re-tag it for another attempt
    pub fn reset(&mut self, attempt: AttemptId) {
        self.entries.clear();
        self.attempt = attempt;
    }

    /// Per-text groups over the current window, in no particular order
    pub fn groups(&self) -> Vec<SerialConsensus> {
        struct Acc {
            sum: f32,
            sum_sq: f32,
            count: usize,
            first: Instant,
            last: Instant,
        }

        let mut acc: HashMap<&str, Acc> = HashMap::new();
        for entry in &self.entries {
            let c = entry.candidate.confidence;
            acc.entry(entry.candidate.text.as_str())
                .and_modify(|a| {
                    a.sum += c;
                    a.sum_sq += c * c;
                    a.count += 1;
                    a.first = a.first.min(entry.seen_at);
                    a.last = a.last.max(entry.seen_at);
                })
                .or_insert(Acc {
                    sum: c,
                    sum_sq: c * c,
                    count: 1,
                    first: entry.seen_at,
                    last: entry.seen_at,
                });
        }

        acc.into_iter()
            .map(|(text, a)| SerialConsensus {
                text: text.to_string(),
                overall_confidence: if a.sum > 0.0 { a.sum_sq / a.sum } else { 0.0 },
                supporting_frame_count: a.count,
                first_seen_at: a.first,
                last_seen_at: a.last,
            })
            .collect()
    }

    /// Group with the highest (supporting frames, confidence) ranking
    pub fn leader(&self) -> Option<SerialConsensus> {
        self.groups().into_iter().max_by(rank)
    }

    /// Group for one exact text
    pub fn group(&self, text: &str) -> Option<SerialConsensus> {
        self.groups().into_iter().find(|g| g.text == text)
    }
}

/// Lexicographic ranking; later sightings and then text order break ties
fn rank(a: &SerialConsensus, b: &SerialConsensus) -> Ordering {
    a.supporting_frame_count
        .cmp(&b.supporting_frame_count)
        .then(a.overall_confidence.total_cmp(&b.overall_confidence))
        .then(a.last_seen_at.cmp(&b.last_seen_at))
        .then(b.text.cmp(&a.text))
}

/// Engine output after each ingested candidate
#[derive(Debug, Clone, PartialEq)]
pub struct ConsensusUpdate {
    /// Current leader, or the frozen consensus once terminal
    pub consensus: Option<SerialConsensus>,
    pub state: StabilityState,
    /// True only on the update that performed the lock
    pub locked_now: bool,
    /// False when the candidate was ignored because the engine is frozen
    pub accepted: bool,
}

/// Windowed consensus over one scan attempt
#[derive(Debug, Clone)]
pub struct ConsensusEngine {
    params: ConsensusParams,
    window: ConsensusWindow,
    state: StabilityState,
    /// Frozen consensus once terminal
    frozen: Option<SerialConsensus>,
}

impl ConsensusEngine {
    /// Create a new consensus engine in the collecting state
    pub fn new(attempt: AttemptId, params: ConsensusParams) -> Self {
        Self {
            window: ConsensusWindow::new(attempt, params.window_capacity),
            params,
            state: StabilityState::Collecting,
            frozen: None,
        }
    }

    /// Get the current stability state
    pub fn state(&self) -> StabilityState {
        self.state
    }

    /// Get the candidate window
    pub fn window(&self) -> &ConsensusWindow {
        &self.window
    }

    /// Get the lock parameters
    pub fn params(&self) -> &ConsensusParams {
        &self.params
    }

    /// Current consensus: the frozen one once terminal, else the live leader
    pub fn consensus(&self) -> Option<SerialConsensus> {
        if self.state.is_terminal() {
            self.frozen.clone()
        } else {
            self.window.leader()
        }
    }

    /// Current output without ingesting anything
    pub fn snapshot(&self) -> ConsensusUpdate {
        ConsensusUpdate {
            consensus: self.consensus(),
            state: self.state,
            locked_now: false,
            accepted: false,
        }
    }

    /// Ingest one well-formed corrected candidate
    pub fn ingest(&mut self, candidate: CorrectedCandidate, seen_at: Instant) -> ConsensusUpdate {
        if self.state.is_terminal() {
            debug!(
                "Attempt {}: ignoring '{}' after {:?}",
                self.window.attempt(),
                candidate.text,
                self.state
            );
            return self.snapshot();
        }

        let text = candidate.text.clone();
        let confidence = candidate.confidence;
        self.window.push(candidate, seen_at);

        if confidence >= self.params.early_stop_confidence {
            if let Some(mut group) = self.window.group(&text) {
                group.overall_confidence = group.overall_confidence.max(confidence);
                info!(
                    "Attempt {}: early lock on '{}' at {:.3}",
                    self.window.attempt(),
                    group.text,
                    confidence
                );
                return self.lock(group);
            }
        }

        let leader = self.window.leader();
        if let Some(l) = &leader {
            debug!(
                "Attempt {}: leader '{}' ({} frames, {:.3})",
                self.window.attempt(),
                l.text,
                l.supporting_frame_count,
                l.overall_confidence
            );
            if l.supporting_frame_count >= self.params.min_frames_for_consensus
                && l.overall_confidence >= self.params.consensus_confidence
            {
                info!(
                    "Attempt {}: consensus locked on '{}' ({} frames, {:.3})",
                    self.window.attempt(),
                    l.text,
                    l.supporting_frame_count,
                    l.overall_confidence
                );
                return self.lock(l.clone());
            }
        }

        ConsensusUpdate {
            consensus: leader,
            state: StabilityState::Collecting,
            locked_now: false,
            accepted: true,
        }
    }

    /// Budget exhausted: freeze the current leader as expired
    ///
    /// No effect once the engine is already terminal.
    pub fn expire(&mut self) -> ConsensusUpdate {
        if self.state == StabilityState::Collecting {
            self.frozen = self.window.leader();
            self.state = StabilityState::Expired;
            debug!(
                "Attempt {}: expired with leader {:?}",
                self.window.attempt(),
                self.frozen.as_ref().map(|c| c.text.as_str())
            );
        }
        self.snapshot()
    }

    /// Clear all state for another attempt
    pub fn reset(&mut self, attempt: AttemptId) {
        self.window.reset(attempt);
        self.state = StabilityState::Collecting;
        self.frozen = None;
    }

    fn lock(&mut self, consensus: SerialConsensus) -> ConsensusUpdate {
        self.frozen = Some(consensus.clone());
        self.state = StabilityState::Stable;
        ConsensusUpdate {
            consensus: Some(consensus),
            state: StabilityState::Stable,
            locked_now: true,
            accepted: true,
        }
    }
}
