//! Format Validator
//!
//! Structural check that corrected text is shaped like a serial. Pure: it
//! neither changes confidence nor remembers anything between calls.

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::{ScanError, ScanResult};
use crate::storage::profiles::AccessoryProfile;

/// An accepted serial shape
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SerialPattern {
    /// Exactly `length` of `[A-Z0-9]` with at least one letter and one digit
    Alphanumeric { length: usize },
    /// `letters` letters followed by `digits` digits
    LettersDigits { letters: usize, digits: usize },
    /// Custom expression, implicitly anchored at both ends
    Regex { name: String, pattern: String },
}

/// Kind of pattern that matched
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PatternKind {
    Alphanumeric,
    LettersDigits,
    Regex,
}

/// First pattern that accepted a string
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MatchedPattern {
    /// Position in the profile's pattern list
    pub index: usize,
    pub kind: PatternKind,
}

/// Result of a format check
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SerialFormatVerdict {
    pub is_well_formed: bool,
    pub pattern: Option<MatchedPattern>,
}

impl SerialFormatVerdict {
    const REJECTED: SerialFormatVerdict = SerialFormatVerdict {
        is_well_formed: false,
        pattern: None,
    };
}

#[derive(Debug, Clone)]
struct CompiledPattern {
    kind: PatternKind,
    regex: Regex,
    /// Require at least one letter and one digit
    mixed: bool,
}

/// Ordered set of compiled serial patterns
#[derive(Debug, Clone)]
pub struct FormatValidator {
    patterns: Vec<CompiledPattern>,
    allowlist: Option<Vec<char>>,
}

impl FormatValidator {
    /// Compile a pattern list; an empty list or a bad expression is rejected
    pub fn new(patterns: &[SerialPattern], allowlist: Option<&str>) -> ScanResult<Self> {
        if patterns.is_empty() {
            return Err(ScanError::InvalidConfig("serial pattern set is empty".to_string()));
        }

        let compiled = patterns
            .iter()
            .map(compile)
            .collect::<ScanResult<Vec<_>>>()?;

        Ok(Self {
            patterns: compiled,
            allowlist: allowlist.map(|a| a.chars().collect()),
        })
    }

    /// Create a validator from a profile's patterns and allow-list
    pub fn from_profile(profile: &AccessoryProfile) -> ScanResult<Self> {
        Self::new(&profile.serial_patterns, profile.allowlist.as_deref())
    }

    /// Check corrected text against the patterns in order
    pub fn validate(&self, text: &str) -> SerialFormatVerdict {
        if text.is_empty() {
            return SerialFormatVerdict::REJECTED;
        }
        if let Some(allowed) = &self.allowlist {
            if !text.chars().all(|c| allowed.contains(&c)) {
                return SerialFormatVerdict::REJECTED;
            }
        }

        for (index, p) in self.patterns.iter().enumerate() {
            if !p.regex.is_match(text) {
                continue;
            }
            if p.mixed && !(text.chars().any(|c| c.is_ascii_alphabetic())
                && text.chars().any(|c| c.is_ascii_digit()))
            {
                continue;
            }
            return SerialFormatVerdict {
                is_well_formed: true,
                pattern: Some(MatchedPattern {
                    index,
                    kind: p.kind,
                }),
            };
        }
        SerialFormatVerdict::REJECTED
    }

    /// Check if the text matches any pattern
    pub fn is_well_formed(&self, text: &str) -> bool {
        self.validate(text).is_well_formed
    }
}

fn compile(pattern: &SerialPattern) -> ScanResult<CompiledPattern> {
    let (kind, source, mixed) = match pattern {
        SerialPattern::Alphanumeric { length } => {
            if *length == 0 {
                return Err(ScanError::InvalidConfig("alphanumeric length must be positive".to_string()));
            }
            (PatternKind::Alphanumeric, format!("^[A-Z0-9]{{{}}}$", length), true)
        }
        SerialPattern::LettersDigits { letters, digits } => {
            if letters + digits == 0 {
                return Err(ScanError::InvalidConfig("letters/digits pattern is empty".to_string()));
            }
            (
                PatternKind::LettersDigits,
                format!("^[A-Z]{{{}}}[0-9]{{{}}}$", letters, digits),
                false,
            )
        }
        SerialPattern::Regex { name, pattern } => {
            if pattern.is_empty() {
                return Err(ScanError::InvalidConfig(format!("pattern '{}' is empty", name)));
            }
            (PatternKind::Regex, format!("^(?:{})$", pattern), false)
        }
    };

    let regex = Regex::new(&source)
        .map_err(|e| ScanError::InvalidConfig(format!("bad serial pattern {:?}: {}", pattern, e)))?;
    Ok(CompiledPattern { kind, regex, mixed })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn default_validator() -> FormatValidator {
        FormatValidator::from_profile(&AccessoryProfile::default()).unwrap()
    }

    #[test]
    fn test_twelve_char_serial() {
        let v = default_validator();
        let verdict = v.validate("C02XJ1A2X3C9");
        assert!(verdict.is_well_formed);
        assert_eq!(
            verdict.pattern,
            Some(MatchedPattern {
                index: 0,
                kind: PatternKind::Alphanumeric
            })
        );
    }

    #[test]
    fn test_first_match_wins() {
        let v = default_validator();
        let verdict = v.validate("C02XJ1A2X3C");
        assert_eq!(verdict.pattern.map(|p| p.index), Some(1));
    }

    #[test]
    fn test_rejects_malformed() {
        let v = default_validator();
        assert!(!v.is_well_formed(""));
        assert!(!v.is_well_formed("00C1VE1"), "too short");
        assert!(!v.is_well_formed("ABCDEFGHJKLM"), "no digits");
        assert!(!v.is_well_formed("123456789012"), "no letters");
        assert!(!v.is_well_formed("C02XJ1A2X3C9X"), "too long");
        assert!(!v.is_well_formed("c02xj1a2x3c9"), "lowercase is not corrected text");
    }

    #[test]
    fn test_letters_digits_and_regex() {
        let patterns = vec![
            SerialPattern::LettersDigits { letters: 2, digits: 6 },
            SerialPattern::Regex {
                name: "dashed".to_string(),
                pattern: "SN[0-9]{4}".to_string(),
            },
        ];
        let v = FormatValidator::new(&patterns, None).unwrap();
        assert_eq!(
            v.validate("AB123456").pattern.map(|p| p.kind),
            Some(PatternKind::LettersDigits)
        );
        assert_eq!(
            v.validate("SN1234").pattern.map(|p| p.kind),
            Some(PatternKind::Regex)
        );
        assert!(!v.is_well_formed("XSN1234"), "regex is anchored");
    }

    #[test]
    fn test_allowlist_enforced() {
        let patterns = vec![SerialPattern::Regex {
            name: "any".to_string(),
            pattern: ".+".to_string(),
        }];
        let v = FormatValidator::new(&patterns, Some("ABC123")).unwrap();
        assert!(v.is_well_formed("CAB321"));
        assert!(!v.is_well_formed("CAB9"));
    }

    #[test]
    fn test_invalid_pattern_sets() {
        assert!(matches!(
            FormatValidator::new(&[], None),
            Err(ScanError::InvalidConfig(_))
        ));
        let bad = vec![SerialPattern::Regex {
            name: "broken".to_string(),
            pattern: "([A-Z".to_string(),
        }];
        assert!(FormatValidator::new(&bad, None).is_err());
        assert!(FormatValidator::new(&[SerialPattern::Alphanumeric { length: 0 }], None).is_err());
    }

    #[test]
    fn test_pattern_serde_shape() {
        let json = r#"[{"kind":"alphanumeric","length":12},{"kind":"letters_digits","letters":3,"digits":5}]"#;
        let parsed: Vec<SerialPattern> = serde_json::from_str(json).unwrap();
        assert_eq!(parsed[0], SerialPattern::Alphanumeric { length: 12 });
        assert_eq!(parsed[1], SerialPattern::LettersDigits { letters: 3, digits: 5 });
    }
}
