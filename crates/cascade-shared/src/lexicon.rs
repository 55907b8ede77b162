//! Word lists used by the confidence heuristics and conflict detection.
//!
//! Defaults reproduce the built-in lists; a `[lexicon]` config section can
//! replace any of them.

use serde::{Deserialize, Serialize};

/// Phrase lists for scoring and conflict detection
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Lexicon {
    /// Phrases that lower language-model certainty
    #[serde(default = "default_hedge_phrases")]
    pub hedge_phrases: Vec<String>,

    /// (positive, negative) pairs that mark contradictory answers
    #[serde(default = "default_antonym_pairs")]
    pub antonym_pairs: Vec<(String, String)>,

    /// Phrases that mark a query as a memory/recall request
    #[serde(default = "default_memory_phrases")]
    pub memory_phrases: Vec<String>,

    /// Phrases that mark a response as an acknowledgment
    #[serde(default = "default_acknowledgment_phrases")]
    pub acknowledgment_phrases: Vec<String>,
}

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

fn default_hedge_phrases() -> Vec<String> {
    strings(&[
        "i think",
        "maybe",
        "probably",
        "might",
        "could be",
        "possibly",
        "not sure",
        "uncertain",
        "unclear",
        "don't know",
    ])
}

fn default_antonym_pairs() -> Vec<(String, String)> {
    [
        ("should", "should not"),
        ("can", "cannot"),
        ("is", "is not"),
        ("will", "will not"),
        ("must", "must not"),
        ("true", "false"),
        ("yes", "no"),
        ("correct", "incorrect"),
    ]
    .iter()
    .map(|(p, n)| (p.to_string(), n.to_string()))
    .collect()
}

fn default_memory_phrases() -> Vec<String> {
    strings(&[
        "remember",
        "what did i",
        "you said",
        "mentioned",
        "earlier",
        "my name",
    ])
}

fn default_acknowledgment_phrases() -> Vec<String> {
    strings(&[
        "got it",
        "okay",
        "noted",
        "i'll remember",
        "i remember",
        "you told me",
        "you mentioned",
    ])
}

impl Default for Lexicon {
    fn default() -> Self {
        Self {
            hedge_phrases: default_hedge_phrases(),
            antonym_pairs: default_antonym_pairs(),
            memory_phrases: default_memory_phrases(),
            acknowledgment_phrases: default_acknowledgment_phrases(),
        }
    }
}

impl Lexicon {
    /// Hedge phrases present in `text` (each counted once)
    pub fn hedges_in(&self, text: &str) -> usize {
        count_substrings(&self.hedge_phrases, text)
    }

    pub fn is_memory_query(&self, query: &str) -> bool {
        count_substrings(&self.memory_phrases, query) > 0
    }

    pub fn is_acknowledgment(&self, response: &str) -> bool {
        count_substrings(&self.acknowledgment_phrases, response) > 0
    }
}

fn count_substrings(phrases: &[String], text: &str) -> usize {
    let lower = text.to_lowercase();
    phrases
        .iter()
        .filter(|p| !p.is_empty() && lower.contains(&p.to_lowercase()))
        .count()
}

/// Lower-cased words with surrounding punctuation trimmed
pub fn normalized_words(text: &str) -> Vec<String> {
    text.to_lowercase()
        .split_whitespace()
        .map(|w| w.trim_matches(|c: char| !c.is_alphanumeric() && c != '\''))
        .filter(|w| !w.is_empty())
        .map(str::to_string)
        .collect()
}

/// Whether `phrase` occurs in `words` as a contiguous word sequence
pub fn contains_phrase(words: &[String], phrase: &str) -> bool {
    let needle = normalized_words(phrase);
    if needle.is_empty() || needle.len() > words.len() {
        return false;
    }
    words.windows(needle.len()).any(|w| w == needle.as_slice())
}
