//! Conflict detection tests.

use approx::assert_abs_diff_eq;
use cascade_shared::conflict::pair_key;
use cascade_shared::{
    ConfidenceScorer, ConflictSeverity, Lexicon, ResolutionStrategy, SourceAnswer, SourceType,
};
use cascade_shared::config::StageThresholds;
use std::sync::Arc;

fn answer(source: SourceType, text: &str) -> SourceAnswer {
    SourceAnswer::new(source, text)
}

#[test]
fn test_identical_answers_do_not_conflict() {
    let scorer = ConfidenceScorer::default();
    let text = "Enable systemd-resolved and restart the network";
    let analysis = scorer.detect_conflicts(&[
        answer(SourceType::LanguageModel, text),
        answer(SourceType::AuthoritativeDocs, text),
    ]);

    assert!(!analysis.has_conflict);
    assert_eq!(analysis.severity, ConflictSeverity::Low);
    assert_eq!(analysis.strategy, ResolutionStrategy::PreferHighestConfidence);
    assert!(analysis.sources.is_empty());
    assert_abs_diff_eq!(
        analysis.similarities[&pair_key(SourceType::LanguageModel, SourceType::AuthoritativeDocs)],
        1.0
    );
}

#[test]
fn test_should_versus_should_not_is_high_severity() {
    let scorer = ConfidenceScorer::default();
    let analysis = scorer.detect_conflicts(&[
        answer(SourceType::LanguageModel, "The service should be enabled"),
        answer(SourceType::AuthoritativeDocs, "The service should not be enabled"),
    ]);

    assert!(analysis.has_conflict);
    assert_eq!(analysis.severity, ConflictSeverity::High);
    assert_eq!(analysis.strategy, ResolutionStrategy::PreferAuthoritativeTieBreaker);
    assert!(analysis.sources.contains(&SourceType::LanguageModel));
    assert!(analysis.sources.contains(&SourceType::AuthoritativeDocs));
    assert!(analysis
        .descriptions
        .iter()
        .any(|d| d.contains("'should' vs 'should not'")));
}

#[test]
fn test_restart_required_contradiction() {
    let scorer = ConfidenceScorer::default();
    let analysis = scorer.detect_conflicts(&[
        answer(SourceType::LanguageModel, "Restart is required"),
        answer(SourceType::AuthoritativeDocs, "Restart is not required"),
    ]);

    // similarity 3/4 is high, the antonym alone flags it
    assert_abs_diff_eq!(analysis.mean_similarity().unwrap(), 0.75, epsilon = 1e-9);
    assert!(analysis.has_conflict);
    assert_eq!(analysis.severity, ConflictSeverity::High);
}

#[test]
fn test_contradiction_detected_in_either_order() {
    let scorer = ConfidenceScorer::default();
    let analysis = scorer.detect_conflicts(&[
        answer(SourceType::WebSearch, "You cannot mount it read-write"),
        answer(SourceType::LocalKnowledge, "You can mount it read-write"),
    ]);
    assert!(analysis.has_conflict);
    assert_eq!(analysis.severity, ConflictSeverity::High);
}

#[test]
fn test_both_sides_negated_is_not_contradiction() {
    let scorer = ConfidenceScorer::default();
    let analysis = scorer.detect_conflicts(&[
        answer(SourceType::LanguageModel, "Restart is not required here"),
        answer(SourceType::AuthoritativeDocs, "Restart is not required at all"),
    ]);
    assert!(!analysis.has_conflict);
}

#[test]
fn test_moderate_disagreement_is_medium() {
    let scorer = ConfidenceScorer::default();
    let analysis = scorer.detect_conflicts(&[
        answer(SourceType::LocalKnowledge, "enable the firewall service on boot"),
        answer(SourceType::WebSearch, "enable the firewall daemon at startup"),
    ]);

    // 3 shared of 9 distinct words
    assert_abs_diff_eq!(analysis.mean_similarity().unwrap(), 1.0 / 3.0, epsilon = 1e-9);
    assert!(analysis.has_conflict);
    assert_eq!(analysis.severity, ConflictSeverity::Medium);
    assert_eq!(analysis.strategy, ResolutionStrategy::PreferAuthoritativeTieBreaker);
}

#[test]
fn test_unrelated_answers_are_high_severity() {
    let scorer = ConfidenceScorer::default();
    let analysis = scorer.detect_conflicts(&[
        answer(SourceType::LocalKnowledge, "Use the wiki"),
        answer(SourceType::WebSearch, "Reboot the machine now"),
    ]);
    assert!(analysis.has_conflict);
    assert_eq!(analysis.severity, ConflictSeverity::High);
}

#[test]
fn test_three_answers_produce_three_pairs() {
    let scorer = ConfidenceScorer::default();
    let analysis = scorer.detect_conflicts(&[
        answer(SourceType::LocalKnowledge, "flush the dns cache"),
        answer(SourceType::LanguageModel, "flush the dns cache"),
        answer(SourceType::WebSearch, "flush the dns cache"),
    ]);
    assert_eq!(analysis.similarities.len(), 3);
    assert!(analysis
        .similarities
        .contains_key("LocalKnowledge-WebSearch"));
    assert!(!analysis.has_conflict);
}

#[test]
fn test_custom_antonym_lexicon() {
    let lexicon = Lexicon {
        antonym_pairs: vec![("enabled".to_string(), "disabled".to_string())],
        ..Default::default()
    };
    let scorer = ConfidenceScorer::new(StageThresholds::default(), Arc::new(lexicon));
    let analysis = scorer.detect_conflicts(&[
        answer(SourceType::LanguageModel, "swap should stay enabled on this host"),
        answer(SourceType::AuthoritativeDocs, "swap should stay disabled on this host"),
    ]);
    assert!(analysis.has_conflict);
    assert_eq!(analysis.severity, ConflictSeverity::High);
}

#[test]
fn test_resolve_prefers_given_candidate() {
    let scorer = ConfidenceScorer::default();
    let analysis = scorer.detect_conflicts(&[
        answer(SourceType::LanguageModel, "Restart is required"),
        answer(SourceType::AuthoritativeDocs, "Restart is not required"),
    ]);
    let resolved = scorer.resolve_conflict(
        &analysis,
        answer(SourceType::AuthoritativeDocs, "Restart is not required"),
    );
    assert_eq!(resolved.source, SourceType::AuthoritativeDocs);
    assert_eq!(resolved.text, "Restart is not required");
}
