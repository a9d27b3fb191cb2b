//! Candidate Corrector
//!
//! Deterministic cleanup of raw recognizer output: normalise case and
//! whitespace, undo common glyph confusions, then boost confidence for
//! strings that look like a canonical serial. Never rejects a candidate.

use crate::capture::FrameId;
use crate::storage::profiles::AccessoryProfile;
use crate::vision::ocr::RawCandidate;

/// A recognizer candidate after correction
#[derive(Debug, Clone, PartialEq)]
pub struct CorrectedCandidate {
    /// Corrected text
    pub text: String,
    /// Adjusted confidence, always within [0, 1]
    pub confidence: f32,
    /// Input confidence after clamping, before any boost
    pub raw_confidence: f32,
    /// Frame the candidate came from
    pub source_frame_id: FrameId,
}

impl CorrectedCandidate {
    /// Re-express as a raw candidate so it can be corrected again
    pub fn to_raw(&self) -> RawCandidate {
        RawCandidate::new(self.text.clone(), self.raw_confidence)
    }
}

/// Map one uppercase character through the confusion table
///
/// `None` means the character is stripped. Every other character maps to
/// exactly one output, and every output maps to itself.
pub fn substitute(c: char) -> Option<char> {
    match c {
        'O' | 'D' | 'Q' => Some('0'),
        'I' => Some('1'),
        'S' => Some('5'),
        'B' => Some('8'),
        'Z' => Some('2'),
        ' ' | '-' | '.' | ',' => None,
        other => Some(other),
    }
}

/// Corrects raw candidates for one profile
#[derive(Debug, Clone)]
pub struct CandidateCorrector {
    canonical_length: usize,
    known_prefixes: Vec<String>,
    length_boost: f32,
    prefix_boost: f32,
}

impl Default for CandidateCorrector {
    fn default() -> Self {
        Self::from_profile(&AccessoryProfile::default())
    }
}

impl CandidateCorrector {
    /// Create a corrector from a profile's length, prefix and boost settings
    pub fn from_profile(profile: &AccessoryProfile) -> Self {
        Self {
            canonical_length: profile.canonical_length,
            // Prefixes are compared against corrected text
            known_prefixes: profile
                .known_prefixes
                .iter()
                .map(|p| correct_text(p))
                .filter(|p| !p.is_empty())
                .collect(),
            length_boost: profile.length_boost,
            prefix_boost: profile.prefix_boost,
        }
    }

    /// Correct one raw candidate from the given frame
    pub fn correct(&self, raw: &RawCandidate, source_frame_id: FrameId) -> CorrectedCandidate {
        let text = correct_text(&raw.text);
        let raw_confidence = if raw.confidence.is_finite() {
            raw.confidence.clamp(0.0, 1.0)
        } else {
            0.0
        };

        let mut confidence = raw_confidence;
        if text.chars().count() == self.canonical_length {
            confidence += self.length_boost;
        }
        if self.known_prefixes.iter().any(|p| text.starts_with(p.as_str())) {
            confidence += self.prefix_boost;
        }

        CorrectedCandidate {
            text,
            confidence: confidence.clamp(0.0, 1.0),
            raw_confidence,
            source_frame_id,
        }
    }
}

/// Trim, uppercase and apply the substitution table
pub fn correct_text(raw: &str) -> String {
    raw.trim()
        .chars()
        .flat_map(char::to_uppercase)
        .filter_map(substitute)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw(text: &str, confidence: f32) -> RawCandidate {
        RawCandidate::new(text, confidence)
    }

    #[test]
    fn test_substitutions() {
        assert_eq!(correct_text("O0CIVE1"), "00C1VE1");
        assert_eq!(correct_text("  sbz-dq. i,o "), "5820010");
        assert_eq!(correct_text("c02xj1a2x3c9"), "C02XJ1A2X3C9");
    }

    #[test]
    fn test_table_outputs_are_fixed_points() {
        for c in ('A'..='Z').chain('0'..='9') {
            if let Some(out) = substitute(c) {
                assert_eq!(substitute(out), Some(out), "{} -> {}", c, out);
            }
        }
    }

    #[test]
    fn test_unboosted_candidate_keeps_confidence() {
        let corrector = CandidateCorrector::default();
        let c = corrector.correct(&raw("O0CIVE1", 0.6), 3);
        assert_eq!(c.text, "00C1VE1");
        assert!((c.confidence - 0.6).abs() < 1e-6);
        assert_eq!(c.source_frame_id, 3);
    }

    #[test]
    fn test_length_boost() {
        let corrector = CandidateCorrector::default();
        let c = corrector.correct(&raw("A12XJ1A2X3C9", 0.7), 0);
        assert!((c.confidence - 0.75).abs() < 1e-6);
    }

    #[test]
    fn test_prefix_and_length_boost() {
        let corrector = CandidateCorrector::default();
        let c = corrector.correct(&raw("C02XJ1A2X3C9", 0.7), 0);
        assert!((c.confidence - 0.85).abs() < 1e-6);
    }

    #[test]
    fn test_prefix_boost_is_not_cumulative() {
        let mut profile = AccessoryProfile::default();
        profile.known_prefixes = vec!["C0".to_string(), "C02".to_string()];
        let corrector = CandidateCorrector::from_profile(&profile);
        let c = corrector.correct(&raw("C02XJ", 0.5), 0);
        assert!((c.confidence - 0.6).abs() < 1e-6);
    }

    #[test]
    fn test_confidence_is_capped() {
        let corrector = CandidateCorrector::default();
        let c = corrector.correct(&raw("C02XJ1A2X3C9", 0.98), 0);
        assert_eq!(c.confidence, 1.0);

        let c = corrector.correct(&raw("X", 1.4), 0);
        assert_eq!(c.confidence, 1.0);
        let c = corrector.correct(&raw("X", -0.3), 0);
        assert_eq!(c.confidence, 0.0);
        let c = corrector.correct(&raw("X", f32::NAN), 0);
        assert_eq!(c.confidence, 0.0);
    }

    #[test]
    fn test_correction_is_idempotent() {
        let corrector = CandidateCorrector::default();
        let inputs = [
            ("c02 xj1-a2x3.c9", 0.7),
            ("O0CIVE1", 0.4),
            ("FVFZQ1BSD2OI", 0.93),
            ("", 0.2),
        ];
        for (text, confidence) in inputs {
            let once = corrector.correct(&raw(text, confidence), 9);
            let twice = corrector.correct(&once.to_raw(), 9);
            assert_eq!(once, twice, "input {:?}", text);
        }
    }

    #[test]
    fn test_confidence_never_drops() {
        let corrector = CandidateCorrector::default();
        for i in 0..=20 {
            let confidence = i as f32 / 20.0;
            for text in ["C02XJ1A2X3C9", "junk", "W8ABCDEFGHJK", ""] {
                let c = corrector.correct(&raw(text, confidence), 0);
                assert!(c.confidence >= confidence - 1e-6);
                assert!((0.0..=1.0).contains(&c.confidence));
            }
        }
    }
}
