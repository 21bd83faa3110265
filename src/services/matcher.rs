//! Fuzzy phrase matching over recognized text.
//!
//! OCR output of hull lettering is noisy: words run together, punctuation
//! appears between letters, and casing is arbitrary. Matching therefore works
//! on two normalized views of the text:
//!
//! 1. lower-cased and trimmed, where every word of the target phrase must
//!    appear somewhere (any order);
//! 2. stripped down to ASCII letters and digits, where the joined phrase
//!    (`"durabulk"`) must appear contiguously.
//!
//! [`MatchMode::Partial`] additionally accepts any contiguous piece of the
//! joined phrase of at least [`MIN_PARTIAL_LEN`] characters. It raises recall
//! on badly clipped crops at the cost of false positives.

use serde::Deserialize;
use strum::{Display, EnumString};

/// Shortest slice of the joined phrase accepted in partial mode.
pub const MIN_PARTIAL_LEN: usize = 4;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Display, EnumString)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum MatchMode {
    #[default]
    Exact,
    Partial,
}

#[derive(Debug, Clone)]
pub struct FuzzyMatcher {
    words: Vec<String>,
    joined: String,
    mode: MatchMode,
}

impl FuzzyMatcher {
    pub fn new(phrase: &str, mode: MatchMode) -> Self {
        let lower = phrase.trim().to_lowercase();
        Self {
            words: lower.split_whitespace().map(str::to_string).collect(),
            joined: strip_non_alphanumeric(&lower),
            mode,
        }
    }

    pub fn mode(&self) -> MatchMode {
        self.mode
    }

    /// Whether `text` contains the target phrase. Total: never fails, and
    /// empty or whitespace-only input never matches.
    pub fn matches(&self, text: &str) -> bool {
        let normalized = text.trim().to_lowercase();
        if normalized.is_empty() || self.joined.is_empty() {
            return false;
        }

        if self.words.iter().all(|w| normalized.contains(w.as_str())) {
            return true;
        }

        let cleaned = strip_non_alphanumeric(&normalized);
        if cleaned.contains(&self.joined) {
            return true;
        }

        self.mode == MatchMode::Partial && self.contains_partial(&cleaned)
    }

    fn contains_partial(&self, cleaned: &str) -> bool {
        let target = self.joined.as_bytes();
        let min_len = MIN_PARTIAL_LEN.min(target.len());
        (min_len..=target.len()).any(|len| {
            target
                .windows(len)
                .any(|window| contains_bytes(cleaned.as_bytes(), window))
        })
    }
}

impl Default for FuzzyMatcher {
    fn default() -> Self {
        Self::new("Dura Bulk", MatchMode::Exact)
    }
}

fn strip_non_alphanumeric(text: &str) -> String {
    text.chars().filter(|c| c.is_ascii_alphanumeric()).collect()
}

fn contains_bytes(haystack: &[u8], needle: &[u8]) -> bool {
    haystack.windows(needle.len()).any(|w| w == needle)
}
