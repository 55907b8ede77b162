//! Golden tests for confidence scoring.
//!
//! These lock the exact formulas. Changing a number here changes which
//! stage a cascade stops at.

use approx::assert_abs_diff_eq;
use cascade_shared::config::StageThresholds;
use cascade_shared::{
    ConfidenceScorer, DocsArticle, DocsSearchResult, KnowledgeMatch, Lexicon, SourceType,
    StageOutput, WebHit, WebSearchResult,
};
use chrono::{Duration, Utc};
use std::sync::Arc;

fn matches(scores: &[f64]) -> Vec<KnowledgeMatch> {
    scores
        .iter()
        .enumerate()
        .map(|(i, s)| KnowledgeMatch::new(format!("answer {}", i), *s))
        .collect()
}

fn article(days_old: Option<i64>) -> DocsArticle {
    DocsArticle {
        title: "Systemd-resolved".to_string(),
        snippet: "Enable systemd-resolved.service and link the stub resolv.conf.".to_string(),
        url: "https://wiki.archlinux.org/title/Systemd-resolved".to_string(),
        relevance: 0.9,
        last_modified: days_old.map(|d| Utc::now() - Duration::days(d)),
    }
}

fn web_hit() -> WebHit {
    WebHit {
        title: "Fixing DNS".to_string(),
        snippet: "Restart the resolver.".to_string(),
        url: "https://example.org/dns".to_string(),
        domain: "example.org".to_string(),
        relevance: 0.7,
    }
}

// === Local knowledge ===

/// GOLDEN: three strong matches
/// top=0.95 avg3=0.91 hq=3 variance~0.00087
#[test]
fn golden_local_three_strong_matches() {
    let scorer = ConfidenceScorer::default();
    let score = scorer.score_local_knowledge("dns", &matches(&[0.9, 0.95, 0.88]));

    // 0.38 + 0.273 + 0.2 + 0.0999 = 0.953
    assert_abs_diff_eq!(score.score, 0.953, epsilon = 1e-9);
    assert!(score.meets_threshold);
    assert_eq!(score.threshold, 0.85);
    assert_eq!(score.metrics["high_quality_count"], 3.0);
    assert_abs_diff_eq!(score.metrics["top_score"], 0.95, epsilon = 1e-9);
}

/// GOLDEN: single 0.9 match falls short of the default threshold
#[test]
fn golden_local_single_match() {
    let scorer = ConfidenceScorer::default();
    let score = scorer.score_local_knowledge("dns", &matches(&[0.9]));

    // 0.36 + 0.27 + 0.0667 + 0.1 = 0.797
    assert_abs_diff_eq!(score.score, 0.797, epsilon = 1e-9);
    assert!(!score.meets_threshold);
}

/// GOLDEN: weak matches, no high-quality hits
#[test]
fn golden_local_weak_matches() {
    let scorer = ConfidenceScorer::default();
    let score = scorer.score_local_knowledge("dns", &matches(&[0.5, 0.4]));

    // 0.2 + 0.135 + 0 + 0.09975 = 0.435
    assert_abs_diff_eq!(score.score, 0.435, epsilon = 1e-9);
    assert_eq!(score.metrics["high_quality_count"], 0.0);
    assert!(!score.meets_threshold);
}

#[test]
fn test_local_empty_matches() {
    let scorer = ConfidenceScorer::default();
    let score = scorer.score_local_knowledge("dns", &[]);
    assert_eq!(score.score, 0.0);
    assert!(!score.meets_threshold);
    assert_eq!(score.reasoning, "no results");
}

#[test]
fn test_local_uses_configured_threshold() {
    let thresholds = StageThresholds {
        local_knowledge: 0.5,
        ..Default::default()
    };
    let scorer = ConfidenceScorer::new(thresholds, Arc::new(Lexicon::default()));
    let score = scorer.score_local_knowledge("dns", &matches(&[0.9]));
    assert!(score.meets_threshold);
    assert_eq!(score.threshold, 0.5);
}

// === Authoritative docs ===

#[test]
fn test_docs_recency_bonus() {
    let scorer = ConfidenceScorer::default();
    let result = DocsSearchResult {
        articles: vec![article(Some(30)), article(Some(900))],
        overall_confidence: 0.75,
    };
    let score = scorer.score_authoritative_docs("dns", &result);

    // one recent article: min(1/3, 0.1) = 0.1
    assert_abs_diff_eq!(score.score, 0.85, epsilon = 1e-9);
    assert!(score.meets_threshold);
    assert_eq!(score.metrics["recent_articles"], 1.0);
}

#[test]
fn test_docs_without_recent_articles() {
    let scorer = ConfidenceScorer::default();
    let result = DocsSearchResult {
        articles: vec![article(None), article(Some(400))],
        overall_confidence: 0.75,
    };
    let score = scorer.score_authoritative_docs("dns", &result);
    assert_abs_diff_eq!(score.score, 0.75, epsilon = 1e-9);
    assert!(!score.meets_threshold);
}

#[test]
fn test_docs_score_clamped() {
    let scorer = ConfidenceScorer::default();
    let result = DocsSearchResult {
        articles: vec![article(Some(1))],
        overall_confidence: 0.97,
    };
    assert_eq!(scorer.score_authoritative_docs("dns", &result).score, 1.0);
}

#[test]
fn test_docs_empty() {
    let scorer = ConfidenceScorer::default();
    let score = scorer.score_authoritative_docs("dns", &DocsSearchResult::default());
    assert_eq!(score.score, 0.0);
    assert_eq!(score.threshold, 0.80);
    assert!(!score.meets_threshold);
}

// === Web search ===

#[test]
fn test_web_passes_provider_confidence_through() {
    let scorer = ConfidenceScorer::default();
    let result = WebSearchResult {
        hits: vec![web_hit()],
        overall_confidence: 0.72,
    };
    let score = scorer.score_web_search("dns", &result);
    assert_eq!(score.score, 0.72);
    assert!(score.meets_threshold);

    let empty = scorer.score_web_search("dns", &WebSearchResult::default());
    assert_eq!(empty.score, 0.0);
    assert_eq!(empty.threshold, 0.70);
}

// === Language model ===

/// GOLDEN: confident mid-length answer, nothing specific
#[test]
fn golden_language_model_plain_answer() {
    let scorer = ConfidenceScorer::default();
    let answer = "Check that systemd-resolved is running and that resolv.conf points at the \
                  stub resolver, then flush the resolver cache and retry the lookup.";
    assert!((50..200).contains(&answer.chars().count()));

    let score = scorer.score_language_model("DNS not resolving", answer);

    // 0.3*0.7 + 0.5*1.0 + 0.2*0.5 = 0.81
    assert_abs_diff_eq!(score.score, 0.81, epsilon = 1e-9);
    assert_eq!(score.metrics["length_score"], 0.7);
    assert_eq!(score.metrics["certainty_score"], 1.0);
    assert_eq!(score.metrics["specificity_score"], 0.5);
    assert_eq!(score.metrics["conversational_bonus"], 0.0);
    assert!(score.meets_threshold);
}

/// GOLDEN: hedged short answer
#[test]
fn golden_language_model_hedged_answer() {
    let scorer = ConfidenceScorer::default();
    let score = scorer.score_language_model(
        "why is dns broken",
        "Maybe it is DNS, I think. Possibly the resolver.",
    );

    // three hedges -> certainty 0.4; 0.3*0.3 + 0.5*0.4 + 0.2*0.5 = 0.39
    assert_eq!(score.metrics["hedge_count"], 3.0);
    assert_abs_diff_eq!(score.metrics["certainty_score"], 0.4, epsilon = 1e-9);
    assert_abs_diff_eq!(score.score, 0.39, epsilon = 1e-9);
    assert!(!score.meets_threshold);
}

/// GOLDEN: recall question answered with an acknowledgment
#[test]
fn golden_language_model_conversational_recall() {
    let scorer = ConfidenceScorer::default();
    let score = scorer.score_language_model(
        "What did I say my server name was?",
        "Got it, your server is called Atlas.",
    );

    // 0.2*0.3 + 0.4*1.0 + 0.1*0.5 + 0.3*1.0 = 0.81
    assert_eq!(score.metrics["conversational_bonus"], 1.0);
    assert_abs_diff_eq!(score.score, 0.81, epsilon = 1e-9);
    assert!(score.meets_threshold);
}

#[test]
fn test_language_model_short_specific_recall() {
    let scorer = ConfidenceScorer::default();
    let score = scorer.score_language_model("Do you remember my port?", "Your port is 8443.");
    assert_eq!(score.metrics["conversational_bonus"], 0.9);
}

#[test]
fn test_language_model_acknowledgment_alone() {
    let scorer = ConfidenceScorer::default();
    let score = scorer.score_language_model("set my editor to vim", "Okay, vim it is.");
    assert_eq!(score.metrics["conversational_bonus"], 0.8);
}

#[test]
fn test_language_model_empty_response() {
    let scorer = ConfidenceScorer::default();
    let score = scorer.score_language_model("anything", "   ");
    assert_eq!(score.score, 0.0);
    assert!(!score.meets_threshold);
}

#[test]
fn test_custom_hedge_lexicon() {
    let lexicon = Lexicon {
        hedge_phrases: vec!["perhaps".to_string()],
        ..Default::default()
    };
    let scorer = ConfidenceScorer::new(StageThresholds::default(), Arc::new(lexicon));
    let score = scorer.score_language_model("q", "Perhaps restart it, maybe.");
    assert_eq!(score.metrics["hedge_count"], 1.0);
}

// === Dispatch ===

#[test]
fn test_score_dispatches_by_output() {
    let scorer = ConfidenceScorer::default();
    let output = StageOutput::LocalKnowledge {
        matches: matches(&[0.9]),
    };
    let score = scorer.score("dns", &output);
    assert_eq!(score.source, SourceType::LocalKnowledge);
    assert_abs_diff_eq!(score.score, 0.797, epsilon = 1e-9);

    let output = StageOutput::WebSearch {
        result: WebSearchResult {
            hits: vec![web_hit()],
            overall_confidence: 0.6,
        },
    };
    assert_eq!(scorer.score("dns", &output).source, SourceType::WebSearch);
}
