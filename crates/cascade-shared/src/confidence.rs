//! Confidence scoring for stage answers.
//!
//! Turns one stage's raw result into a bounded score with reasoning and a
//! pass/fail against that stage's threshold. Stateless: a scorer only holds
//! its thresholds and lexicon, so it can be shared freely.

use crate::config::StageThresholds;
use crate::lexicon::Lexicon;
use crate::sources::{DocsSearchResult, KnowledgeMatch, StageOutput, WebSearchResult};
use crate::types::SourceType;
use chrono::{DateTime, Duration, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::{Arc, OnceLock};

/// Individual local match considered high quality
pub const HIGH_QUALITY_MATCH: f64 = 0.7;

/// Articles modified within this many days count as recent
pub const RECENT_ARTICLE_DAYS: i64 = 365;

/// Responses shorter than this may count as short-and-specific
const SHORT_RESPONSE_CHARS: usize = 150;

/// Scored confidence for one stage
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfidenceScore {
    pub source: SourceType,
    pub score: f64,
    pub reasoning: String,
    pub threshold: f64,
    pub meets_threshold: bool,
    /// Named sub-metrics and their values
    pub metrics: BTreeMap<String, f64>,
}

impl ConfidenceScore {
    fn new(
        source: SourceType,
        score: f64,
        threshold: f64,
        reasoning: impl Into<String>,
        metrics: BTreeMap<String, f64>,
    ) -> Self {
        Self {
            source,
            score,
            reasoning: reasoning.into(),
            threshold,
            meets_threshold: score >= threshold,
            metrics,
        }
    }

    fn empty(source: SourceType, threshold: f64) -> Self {
        Self::new(source, 0.0, threshold, "no results", BTreeMap::new())
    }
}

/// Round to 3 decimals
fn round3(value: f64) -> f64 {
    (value * 1000.0).round() / 1000.0
}

fn function_call_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"\b[A-Za-z_][A-Za-z0-9_.]*\([^()\n]*\)").expect("static regex compiles")
    })
}

fn url_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"https?://\S+|www\.\S+").expect("static regex compiles"))
}

/// Per-source confidence scorer
#[derive(Debug, Clone)]
pub struct ConfidenceScorer {
    thresholds: StageThresholds,
    lexicon: Arc<Lexicon>,
}

impl Default for ConfidenceScorer {
    fn default() -> Self {
        Self::new(StageThresholds::default(), Arc::new(Lexicon::default()))
    }
}

impl ConfidenceScorer {
    pub fn new(thresholds: StageThresholds, lexicon: Arc<Lexicon>) -> Self {
        Self { thresholds, lexicon }
    }

    /// Same lexicon, different thresholds
    pub fn with_thresholds(&self, thresholds: StageThresholds) -> Self {
        Self {
            thresholds,
            lexicon: Arc::clone(&self.lexicon),
        }
    }

    pub fn thresholds(&self) -> &StageThresholds {
        &self.thresholds
    }

    pub fn lexicon(&self) -> &Lexicon {
        &self.lexicon
    }

    /// Score any stage output with the matching source formula
    pub fn score(&self, query: &str, output: &StageOutput) -> ConfidenceScore {
        match output {
            StageOutput::LocalKnowledge { matches } => self.score_local_knowledge(query, matches),
            StageOutput::LanguageModel { text } => self.score_language_model(query, text),
            StageOutput::AuthoritativeDocs { result } => {
                self.score_authoritative_docs(query, result)
            }
            StageOutput::WebSearch { result } => self.score_web_search(query, result),
        }
    }

    // ========================================================================
    // Local knowledge
    // ========================================================================

    pub fn score_local_knowledge(&self, _query: &str, matches: &[KnowledgeMatch]) -> ConfidenceScore {
        let threshold = self.thresholds.local_knowledge;
        if matches.is_empty() {
            return ConfidenceScore::empty(SourceType::LocalKnowledge, threshold);
        }

        let mut scores: Vec<f64> = matches.iter().map(|m| m.score).collect();
        scores.sort_by(|a, b| b.total_cmp(a));

        let high_quality = scores.iter().filter(|s| **s >= HIGH_QUALITY_MATCH).count();
        let top_score = scores[0];
        let top3 = &scores[..scores.len().min(3)];
        let avg3 = top3.iter().sum::<f64>() / top3.len() as f64;
        let mean = scores.iter().sum::<f64>() / scores.len() as f64;
        let variance = scores.iter().map(|s| (s - mean).powi(2)).sum::<f64>() / scores.len() as f64;

        let coverage = (high_quality as f64 / 3.0).min(1.0);
        let consistency = 1.0 - variance.min(0.3);
        let score = round3(0.4 * top_score + 0.3 * avg3 + 0.2 * coverage + 0.1 * consistency);

        let mut metrics = BTreeMap::new();
        metrics.insert("top_score".to_string(), top_score);
        metrics.insert("avg_top3".to_string(), avg3);
        metrics.insert("high_quality_count".to_string(), high_quality as f64);
        metrics.insert("variance".to_string(), variance);

        let reasoning = format!(
            "{} matches ({} high quality), top {:.2}, top-3 average {:.2}, variance {:.3}",
            matches.len(),
            high_quality,
            top_score,
            avg3,
            variance
        );
        ConfidenceScore::new(SourceType::LocalKnowledge, score, threshold, reasoning, metrics)
    }

    // ========================================================================
    // Authoritative docs / web search
    // ========================================================================

    pub fn score_authoritative_docs(&self, query: &str, result: &DocsSearchResult) -> ConfidenceScore {
        self.score_authoritative_docs_at(query, result, Utc::now())
    }

    /// Docs scoring against an explicit clock
    pub fn score_authoritative_docs_at(
        &self,
        _query: &str,
        result: &DocsSearchResult,
        now: DateTime<Utc>,
    ) -> ConfidenceScore {
        let threshold = self.thresholds.authoritative_docs;
        if result.articles.is_empty() {
            return ConfidenceScore::empty(SourceType::AuthoritativeDocs, threshold);
        }

        let cutoff = now - Duration::days(RECENT_ARTICLE_DAYS);
        let recent = result
            .articles
            .iter()
            .filter(|a| a.last_modified.map_or(false, |m| m >= cutoff))
            .count();
        let recency_bonus = (recent as f64 / 3.0).min(0.1);
        let score = (result.overall_confidence + recency_bonus).clamp(0.0, 1.0);

        let mut metrics = BTreeMap::new();
        metrics.insert("base_confidence".to_string(), result.overall_confidence);
        metrics.insert("recent_articles".to_string(), recent as f64);
        metrics.insert("recency_bonus".to_string(), recency_bonus);

        let reasoning = format!(
            "{} articles, provider confidence {:.2}, {} recent (+{:.2})",
            result.articles.len(),
            result.overall_confidence,
            recent,
            recency_bonus
        );
        ConfidenceScore::new(SourceType::AuthoritativeDocs, score, threshold, reasoning, metrics)
    }

    pub fn score_web_search(&self, _query: &str, result: &WebSearchResult) -> ConfidenceScore {
        let threshold = self.thresholds.web_search;
        if result.hits.is_empty() {
            return ConfidenceScore::empty(SourceType::WebSearch, threshold);
        }

        let mut metrics = BTreeMap::new();
        metrics.insert("base_confidence".to_string(), result.overall_confidence);
        metrics.insert("hit_count".to_string(), result.hits.len() as f64);

        let reasoning = format!(
            "{} hits, provider confidence {:.2}",
            result.hits.len(),
            result.overall_confidence
        );
        ConfidenceScore::new(
            SourceType::WebSearch,
            result.overall_confidence,
            threshold,
            reasoning,
            metrics,
        )
    }

    // ========================================================================
    // Language model
    // ========================================================================

    /// Heuristic score for a completion; makes no external call
    pub fn score_language_model(&self, query: &str, response: &str) -> ConfidenceScore {
        let threshold = self.thresholds.language_model;
        let response = response.trim();
        if response.is_empty() {
            return ConfidenceScore::empty(SourceType::LanguageModel, threshold);
        }

        let length = length_score(response.chars().count());
        let hedges = self.lexicon.hedges_in(response);
        let certainty = (1.0 - 0.2 * hedges as f64).max(0.4);
        let specificity = specificity_score(response);
        let conversational = self.conversational_bonus(query, response);

        let conversational_formula = conversational > 0.5;
        let raw = if conversational_formula {
            0.2 * length + 0.4 * certainty + 0.1 * specificity + 0.3 * conversational
        } else {
            0.3 * length + 0.5 * certainty + 0.2 * specificity
        };
        let score = round3(raw);

        let mut metrics = BTreeMap::new();
        metrics.insert("length_score".to_string(), length);
        metrics.insert("certainty_score".to_string(), certainty);
        metrics.insert("specificity_score".to_string(), specificity);
        metrics.insert("conversational_bonus".to_string(), conversational);
        metrics.insert("hedge_count".to_string(), hedges as f64);

        let reasoning = format!(
            "length {:.1}, certainty {:.1} ({} hedges), specificity {:.1}{}",
            length,
            certainty,
            hedges,
            specificity,
            if conversational_formula {
                format!(", conversational {:.1}", conversational)
            } else {
                String::new()
            }
        );
        ConfidenceScore::new(SourceType::LanguageModel, score, threshold, reasoning, metrics)
    }

    fn conversational_bonus(&self, query: &str, response: &str) -> f64 {
        let memory_query = self.lexicon.is_memory_query(query);
        let acknowledgment = self.lexicon.is_acknowledgment(response);
        let short_and_specific = response.chars().count() < SHORT_RESPONSE_CHARS
            && (response.chars().any(|c| c.is_ascii_digit()) || has_capitalized_word(response));

        match (memory_query, acknowledgment, short_and_specific) {
            (true, true, _) => 1.0,
            (true, false, true) => 0.9,
            (false, true, _) => 0.8,
            _ => 0.0,
        }
    }
}

/// U-shaped preference for mid-length answers
fn length_score(chars: usize) -> f64 {
    match chars {
        0..=49 => 0.3,
        50..=199 => 0.7,
        200..=2000 => 1.0,
        2001..=4000 => 0.8,
        _ => 0.6,
    }
}

fn specificity_score(response: &str) -> f64 {
    let lower = response.to_lowercase();
    let mut score: f64 = 0.5;
    if response.contains("```") || function_call_pattern().is_match(response) {
        score += 0.2;
    }
    if response.chars().any(|c| c.is_ascii_digit()) {
        score += 0.1;
    }
    if url_pattern().is_match(response) {
        score += 0.1;
    }
    if lower.contains("example") || lower.contains("for instance") {
        score += 0.1;
    }
    score.min(1.0)
}

fn has_capitalized_word(text: &str) -> bool {
    text.split_whitespace()
        .any(|w| w.chars().next().map_or(false, char::is_uppercase))
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn test_length_score_shape() {
        assert_eq!(length_score(10), 0.3);
        assert_eq!(length_score(50), 0.7);
        assert_eq!(length_score(199), 0.7);
        assert_eq!(length_score(200), 1.0);
        assert_eq!(length_score(2000), 1.0);
        assert_eq!(length_score(4000), 0.8);
        assert_eq!(length_score(4001), 0.6);
    }

    #[test]
    fn test_specificity_signals() {
        assert_abs_diff_eq!(specificity_score("Restart the resolver service"), 0.5, epsilon = 1e-9);
        assert_abs_diff_eq!(specificity_score("Run `resolvectl flush_caches()` now"), 0.7, epsilon = 1e-9);
        assert_abs_diff_eq!(specificity_score("Port 53 must be open"), 0.6, epsilon = 1e-9);
        assert_abs_diff_eq!(
            specificity_score("For example see https://wiki.archlinux.org/title/Systemd-resolved"),
            0.7,
            epsilon = 1e-9
        );
        assert_abs_diff_eq!(
            specificity_score("```\nping(1)\n```\nexample on port 53 at https://x.org"),
            1.0,
            epsilon = 1e-9
        );
    }

    #[test]
    fn test_capitalized_word_detection() {
        assert!(has_capitalized_word("your server is Atlas"));
        assert!(!has_capitalized_word("all lower case words"));
    }

    #[test]
    fn test_round3() {
        assert_eq!(round3(0.81), 0.81);
        assert_eq!(round3(0.7966666), 0.797);
    }
}
