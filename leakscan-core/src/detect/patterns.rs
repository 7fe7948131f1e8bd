//! Detector trait and the builtin regex detector set.

use regex::Regex;

/// One raw occurrence as reported by a detector. Only the engine ever sees
/// the unmasked text.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RawMatch {
    pub text: String,
    pub byte_offset: usize,
}

/// An independent pattern matcher. Implementations must be pure: the same
/// content always yields the same matches.
pub trait Detector: Send + Sync {
    fn name(&self) -> &str;

    /// Non-overlapping occurrences in `content`, in ascending offset order.
    fn find(&self, content: &str) -> Vec<RawMatch>;
}

/// Regex-backed detector. Covers every builtin pattern; custom recognizers
/// can implement [`Detector`] directly.
#[derive(Clone, Debug)]
pub struct RegexDetector {
    name: String,
    pattern: Regex,
}

impl RegexDetector {
    pub fn new(name: impl Into<String>, pattern: Regex) -> Self {
        Self {
            name: name.into(),
            pattern,
        }
    }
}

impl Detector for RegexDetector {
    fn name(&self) -> &str {
        &self.name
    }

    fn find(&self, content: &str) -> Vec<RawMatch> {
        self.pattern
            .find_iter(content)
            .map(|m| RawMatch {
                text: m.as_str().to_string(),
                byte_offset: m.start(),
            })
            .collect()
    }
}

/// Social-security-number-shaped sequences.
const SSN: &str = r"\b\d{3}-\d{2}-\d{4}\b";
/// Payment-card-shaped digit runs: 13-16 digits with optional separators.
const CREDIT_CARD: &str = r"\b(?:\d[ -]*?){13,16}\b";
/// AWS access key ids.
const AWS_KEY: &str = r"AKIA[0-9A-Z]{16}";
const EMAIL: &str = r"\b[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}\b";
/// US-style phone numbers, optionally with a +1 country code.
const US_PHONE: &str =
    r"\b(?:\+1[-.\s]?)?(?:\(?\d{3}\)?[-.\s]?)\d{3}[-.\s]?\d{4}\b";

/// The reference detector set. Each entry is a self-contained recognizer,
/// not a shared grammar.
pub fn builtin_detectors() -> Vec<Box<dyn Detector>> {
    [
        ("ssn", SSN),
        ("credit_card", CREDIT_CARD),
        ("aws_key", AWS_KEY),
        ("email", EMAIL),
        ("us_phone", US_PHONE),
    ]
    .into_iter()
    .map(|(name, pattern)| {
        let regex = Regex::new(pattern)
            .unwrap_or_else(|e| panic!("builtin pattern {name} invalid: {e}"));
        Box::new(RegexDetector::new(name, regex)) as Box<dyn Detector>
    })
    .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_patterns_compile() {
        let detectors = builtin_detectors();
        let names: Vec<_> = detectors.iter().map(|d| d.name()).collect();
        assert_eq!(
            names,
            ["ssn", "credit_card", "aws_key", "email", "us_phone"]
        );
    }

    #[test]
    fn occurrences_are_offset_ordered() {
        let detectors = builtin_detectors();
        let email = detectors.iter().find(|d| d.name() == "email").unwrap();
        let matches =
            email.find("a@example.com then b@example.org at the end");
        assert_eq!(matches.len(), 2);
        assert!(matches[0].byte_offset < matches[1].byte_offset);
        assert_eq!(matches[0].text, "a@example.com");
    }
}
