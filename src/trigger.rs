//! Trigger phrase matching.
//!
//! Hypotheses from the recognizer rarely come back byte-identical to what
//! the user typed: Whisper capitalizes, adds punctuation, and pads
//! whitespace. The default mode therefore compares normalized forms;
//! `--match-mode exact` restores strict equality.

use crate::config::MatchMode;

/// Matcher for the configured trigger phrase.
#[derive(Debug, Clone)]
pub struct TriggerMatcher {
    phrase: String,
    normalized: String,
    mode: MatchMode,
}

impl TriggerMatcher {
    pub fn new(phrase: &str, mode: MatchMode) -> Self {
        Self { phrase: phrase.to_string(), normalized: normalize(phrase), mode }
    }

    /// Check whether a hypothesis matches the trigger phrase.
    pub fn matches(&self, hypothesis: &str) -> bool {
        match self.mode {
            MatchMode::Exact => hypothesis == self.phrase,
            MatchMode::Normalized => normalize(hypothesis) == self.normalized,
        }
    }
}

/// Lowercase, strip punctuation, and collapse runs of whitespace.
fn normalize(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut pending_space = false;

    for c in text.chars() {
        if c.is_alphanumeric() {
            if pending_space && !out.is_empty() {
                out.push(' ');
            }
            pending_space = false;
            for lower in c.to_lowercase() {
                out.push(lower);
            }
        } else {
            // Whitespace and punctuation both act as separators
            pending_space = true;
        }
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalized_ignores_case_and_punctuation() {
        let matcher = TriggerMatcher::new("stop listening", MatchMode::Normalized);
        assert!(matcher.matches("Stop listening."));
        assert!(matcher.matches("STOP, LISTENING!"));
        assert!(matcher.matches("  stop   listening  "));
    }

    #[test]
    fn test_normalized_rejects_different_words() {
        let matcher = TriggerMatcher::new("stop listening", MatchMode::Normalized);
        assert!(!matcher.matches("stop"));
        assert!(!matcher.matches("please stop listening"));
        assert!(!matcher.matches("stop listing"));
    }

    #[test]
    fn test_exact_requires_byte_equality() {
        let matcher = TriggerMatcher::new("stop listening", MatchMode::Exact);
        assert!(matcher.matches("stop listening"));
        assert!(!matcher.matches("Stop listening"));
        assert!(!matcher.matches("stop listening."));
    }

    #[test]
    fn test_normalize_handles_unicode() {
        let matcher = TriggerMatcher::new("Café au lait", MatchMode::Normalized);
        assert!(matcher.matches("café au lait"));
    }

    #[test]
    fn test_normalize_collapses_separators() {
        assert_eq!(normalize("  Stop,  listening!  "), "stop listening");
        assert_eq!(normalize("..."), "");
    }
}
