//! Conflict detection between stage answers.
//!
//! Every unordered pair of answers is compared by Jaccard word-set
//! similarity and by explicit antonym pairs. Analysis is computed from the
//! answers of a single run only.

use crate::confidence::ConfidenceScorer;
use crate::lexicon::{contains_phrase, normalized_words};
use crate::types::SourceType;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashSet};
use tracing::{debug, info};

/// Pairs below this similarity conflict
pub const CONFLICT_SIMILARITY: f64 = 0.5;

/// Mean similarity below this is a high-severity conflict
pub const HIGH_SEVERITY_SIMILARITY: f64 = 0.3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ConflictSeverity {
    Low,
    Medium,
    High,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ResolutionStrategy {
    PreferHighestConfidence,
    PreferAuthoritativeTieBreaker,
}

/// A non-empty answer from one source
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceAnswer {
    pub source: SourceType,
    pub text: String,
}

impl SourceAnswer {
    pub fn new(source: SourceType, text: impl Into<String>) -> Self {
        Self {
            source,
            text: text.into(),
        }
    }
}

/// Outcome of comparing the answers of one run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConflictAnalysis {
    pub has_conflict: bool,
    pub severity: ConflictSeverity,
    pub sources: BTreeSet<SourceType>,
    pub descriptions: Vec<String>,
    /// Pairwise similarity keyed by "SourceA-SourceB"
    pub similarities: BTreeMap<String, f64>,
    pub strategy: ResolutionStrategy,
}

impl ConflictAnalysis {
    /// Analysis with nothing to compare
    pub fn none() -> Self {
        Self {
            has_conflict: false,
            severity: ConflictSeverity::Low,
            sources: BTreeSet::new(),
            descriptions: vec![],
            similarities: BTreeMap::new(),
            strategy: ResolutionStrategy::PreferHighestConfidence,
        }
    }

    pub fn mean_similarity(&self) -> Option<f64> {
        if self.similarities.is_empty() {
            None
        } else {
            Some(self.similarities.values().sum::<f64>() / self.similarities.len() as f64)
        }
    }
}

/// Jaccard similarity of lower-cased whitespace token sets
pub fn jaccard_similarity(a: &str, b: &str) -> f64 {
    let a_lower = a.to_lowercase();
    let b_lower = b.to_lowercase();
    let set_a: HashSet<&str> = a_lower.split_whitespace().collect();
    let set_b: HashSet<&str> = b_lower.split_whitespace().collect();

    let union = set_a.union(&set_b).count();
    if union == 0 {
        return 1.0;
    }
    set_a.intersection(&set_b).count() as f64 / union as f64
}

/// Key used in the similarity map
pub fn pair_key(a: SourceType, b: SourceType) -> String {
    format!("{}-{}", a, b)
}

impl ConfidenceScorer {
    /// Antonym pair that puts `a` and `b` in contradiction, if any
    fn contradiction(&self, a: &[String], b: &[String]) -> Option<(String, String)> {
        self.lexicon()
            .antonym_pairs
            .iter()
            .find(|(positive, negative)| {
                let a_pos = contains_phrase(a, positive);
                let a_neg = contains_phrase(a, negative);
                let b_pos = contains_phrase(b, positive);
                let b_neg = contains_phrase(b, negative);
                (a_pos && b_neg && !a_neg) || (b_pos && a_neg && !b_neg)
            })
            .cloned()
    }

    /// Compare every pair of answers and recommend a resolution strategy
    pub fn detect_conflicts(&self, responses: &[SourceAnswer]) -> ConflictAnalysis {
        if responses.len() < 2 {
            return ConflictAnalysis::none();
        }

        let words: Vec<Vec<String>> = responses.iter().map(|r| normalized_words(&r.text)).collect();
        let mut analysis = ConflictAnalysis::none();
        let mut explicit = false;

        for i in 0..responses.len() {
            for j in (i + 1)..responses.len() {
                let (a, b) = (&responses[i], &responses[j]);
                let key = pair_key(a.source, b.source);
                let similarity = jaccard_similarity(&a.text, &b.text);
                analysis.similarities.insert(key.clone(), similarity);

                if similarity < CONFLICT_SIMILARITY {
                    analysis.sources.insert(a.source);
                    analysis.sources.insert(b.source);
                    analysis
                        .descriptions
                        .push(format!("{}: low agreement (similarity {:.2})", key, similarity));
                }

                if let Some((positive, negative)) = self.contradiction(&words[i], &words[j]) {
                    explicit = true;
                    analysis.sources.insert(a.source);
                    analysis.sources.insert(b.source);
                    analysis.descriptions.push(format!(
                        "{}: contradictory claims ('{}' vs '{}')",
                        key, positive, negative
                    ));
                }
            }
        }

        analysis.has_conflict = !analysis.descriptions.is_empty();
        let mean = analysis.mean_similarity().unwrap_or(1.0);
        analysis.severity = if explicit || mean < HIGH_SEVERITY_SIMILARITY {
            ConflictSeverity::High
        } else if mean < CONFLICT_SIMILARITY {
            ConflictSeverity::Medium
        } else {
            ConflictSeverity::Low
        };
        if analysis.has_conflict {
            analysis.strategy = ResolutionStrategy::PreferAuthoritativeTieBreaker;
        }

        debug!(
            responses = responses.len(),
            has_conflict = analysis.has_conflict,
            severity = ?analysis.severity,
            mean_similarity = mean,
            "conflict analysis complete"
        );
        analysis
    }

    /// Resolve a conflict in favour of the tie-breaker candidate.
    ///
    /// The candidate is always returned; only the log line depends on
    /// whether it came from the authoritative source.
    pub fn resolve_conflict(
        &self,
        analysis: &ConflictAnalysis,
        candidate: SourceAnswer,
    ) -> SourceAnswer {
        if !analysis.has_conflict {
            debug!(source = %candidate.source, "no conflict to resolve");
        } else if candidate.source == SourceType::AuthoritativeDocs {
            info!(
                severity = ?analysis.severity,
                "conflict resolved by authoritative docs"
            );
        } else {
            info!(
                source = %candidate.source,
                severity = ?analysis.severity,
                "conflict resolved by non-authoritative candidate"
            );
        }
        candidate
    }
}
