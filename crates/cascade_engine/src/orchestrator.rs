//! Cascade orchestrator.
//!
//! Runs the four stages in cost order (local knowledge, language model,
//! authoritative docs, web search), scores each answer, stops early when a
//! stage is confident enough and picks the final answer. When more than one
//! stage answered, the answers are checked for conflicts and the
//! authoritative docs answer breaks ties.
//!
//! Stages run sequentially: a stage only runs because the previous one was
//! not confident enough. Adapter errors and timeouts are recorded on the
//! stage and never abort the run.

use crate::adapters::AdapterSet;
use crate::circuit::{BreakerPermit, CircuitBreakers, FailureKind};
use crate::config::EngineConfig;
use crate::health::{check_health, HealthReport};
use crate::metrics::{CascadeMetrics, MetricsSnapshot};
use cascade_shared::{
    AdapterError, CascadeConfiguration, CascadeError, CascadeRequest, CascadeResult, CascadeStage,
    ConfidenceScorer, ConfigError, ConflictAnalysis, SourceAnswer, SourceType, StageExecution,
    StageOutput,
};
use chrono::Utc;
use std::collections::BTreeMap;
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

// ============================================================================
// Constants
// ============================================================================

/// Error recorded on stages skipped because their circuit is open
pub const CIRCUIT_OPEN_ERROR: &str = "circuit open";

/// Error recorded on stages skipped because the run budget ran out
pub const BUDGET_EXHAUSTED_ERROR: &str = "overall timeout exhausted";

/// How the final answer was chosen
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SelectionPath {
    EarlyStop,
    TieBreaker,
    HighestConfidence,
    LastAnswer,
    None,
}

impl SelectionPath {
    pub fn as_str(&self) -> &'static str {
        match self {
            SelectionPath::EarlyStop => "early_stop",
            SelectionPath::TieBreaker => "tie_breaker",
            SelectionPath::HighestConfidence => "highest_confidence",
            SelectionPath::LastAnswer => "last_answer",
            SelectionPath::None => "none",
        }
    }
}

/// Chosen answer plus the conflict analysis that led to it
#[derive(Debug)]
struct Selection {
    source: Option<SourceType>,
    answer: String,
    path: SelectionPath,
    conflict: Option<ConflictAnalysis>,
}

// ============================================================================
// Orchestrator
// ============================================================================

/// Runs cascades against one adapter set.
///
/// Cheap to share behind an `Arc`; every `execute` call is independent.
/// The only state shared between runs is the metrics aggregator, the
/// circuit breakers and the active configuration.
pub struct CascadeOrchestrator {
    adapters: AdapterSet,
    config: RwLock<Arc<CascadeConfiguration>>,
    scorer: ConfidenceScorer,
    metrics: Arc<CascadeMetrics>,
    breakers: CircuitBreakers,
}

impl CascadeOrchestrator {
    /// Orchestrator with its own metrics aggregator
    pub fn new(adapters: AdapterSet, settings: &EngineConfig) -> Result<Self, ConfigError> {
        Self::with_metrics(adapters, settings, Arc::new(CascadeMetrics::new()))
    }

    /// Orchestrator reporting into a caller-owned aggregator
    pub fn with_metrics(
        adapters: AdapterSet,
        settings: &EngineConfig,
        metrics: Arc<CascadeMetrics>,
    ) -> Result<Self, ConfigError> {
        settings.cascade.validate()?;
        let scorer = ConfidenceScorer::new(
            settings.cascade.thresholds.clone(),
            Arc::new(settings.lexicon.clone()),
        );
        Ok(Self {
            adapters,
            config: RwLock::new(Arc::new(settings.cascade.clone())),
            scorer,
            metrics,
            breakers: CircuitBreakers::new(&settings.circuit_breaker),
        })
    }

    // ========================================================================
    // Configuration
    // ========================================================================

    fn active_config(&self) -> Arc<CascadeConfiguration> {
        Arc::clone(&self.config.read().unwrap_or_else(|e| e.into_inner()))
    }

    pub fn get_configuration(&self) -> CascadeConfiguration {
        self.active_config().as_ref().clone()
    }

    /// Swap the active configuration. Invalid values are rejected and the
    /// previous configuration stays active. Runs already in flight keep the
    /// configuration they started with.
    pub fn update_configuration(&self, config: CascadeConfiguration) -> Result<(), ConfigError> {
        if let Err(e) = config.validate() {
            warn!("Rejected configuration update: {}", e);
            return Err(e);
        }
        *self.config.write().unwrap_or_else(|e| e.into_inner()) = Arc::new(config);
        info!("Cascade configuration updated");
        Ok(())
    }

    // ========================================================================
    // Observability
    // ========================================================================

    pub fn metrics(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }

    pub async fn health_status(&self) -> HealthReport {
        check_health(&self.adapters, &self.metrics, &self.breakers).await
    }

    // ========================================================================
    // Execution
    // ========================================================================

    /// Run one cascade.
    ///
    /// Returns `InvalidRequest` for an empty query, `InvalidConfiguration`
    /// for a bad per-call override and `Cancelled` when `cancel` fires.
    /// Everything else, including every stage failing, is a `CascadeResult`.
    pub async fn execute(
        &self,
        request: CascadeRequest,
        cancel: &CancellationToken,
    ) -> Result<CascadeResult, CascadeError> {
        if request.query.trim().is_empty() {
            return Err(CascadeError::InvalidRequest(
                "query must not be empty".to_string(),
            ));
        }
        let config = match &request.config_override {
            Some(config) => {
                config.validate()?;
                Arc::new(config.clone())
            }
            None => self.active_config(),
        };

        let run_id = Uuid::new_v4();
        let started = Instant::now();
        let scorer = self.scorer.with_thresholds(config.thresholds.clone());
        info!(
            run_id = %run_id,
            session = %request.session_id,
            "Cascade started"
        );

        let (stages, early_stop) = match self
            .run_stages(&request, &config, &scorer, started, cancel)
            .await
        {
            Ok(log) => log,
            Err(e) => {
                info!(run_id = %run_id, "Cascade cancelled");
                return Err(e);
            }
        };
        let total_elapsed_ms = elapsed_ms(started);

        let (mut result, path) = match select_answer(&stages, early_stop, &config, &scorer) {
            Ok(selection) => build_result(selection, stages, early_stop, total_elapsed_ms),
            Err(e) => {
                error!(run_id = %run_id, "Cascade internal failure: {}", e);
                let result = CascadeResult::failed(e.to_string(), stages, total_elapsed_ms);
                (result, SelectionPath::None)
            }
        };
        annotate(&mut result, path, &request, run_id);
        self.metrics
            .record_run(&result, path == SelectionPath::TieBreaker);

        info!(
            run_id = %run_id,
            stopped_at = %result.stopped_at,
            score = ?result.confidence.as_ref().map(|c| c.score),
            selection = path.as_str(),
            elapsed_ms = total_elapsed_ms,
            "Cascade finished"
        );
        Ok(result)
    }

    /// Walk the stages in order until one triggers an early stop
    async fn run_stages(
        &self,
        request: &CascadeRequest,
        config: &CascadeConfiguration,
        scorer: &ConfidenceScorer,
        started: Instant,
        cancel: &CancellationToken,
    ) -> Result<(Vec<StageExecution>, Option<SourceType>), CascadeError> {
        let mut stages = Vec::with_capacity(SourceType::ALL.len());

        for source in SourceType::ALL {
            if cancel.is_cancelled() {
                return Err(CascadeError::Cancelled);
            }

            let remaining = config.overall_timeout().saturating_sub(started.elapsed());
            if remaining.is_zero() {
                debug!(stage = %source, "Skipping stage, run budget exhausted");
                stages.push(StageExecution::skipped(source, Utc::now(), BUDGET_EXHAUSTED_ERROR));
                continue;
            }
            let Some(permit) = self.breakers.admit(source) else {
                debug!(stage = %source, "Skipping stage, circuit open");
                stages.push(StageExecution::skipped(source, Utc::now(), CIRCUIT_OPEN_ERROR));
                continue;
            };

            let execution = self
                .run_stage(source, request, config, scorer, remaining, permit, cancel)
                .await?;
            if execution.triggered_early_stop {
                stages.push(execution);
                return Ok((stages, Some(source)));
            }
            stages.push(execution);
        }

        Ok((stages, None))
    }

    /// Invoke one adapter under its timeout and score the answer. The
    /// permit is settled with the call's outcome; on cancellation it is
    /// dropped unsettled.
    #[allow(clippy::too_many_arguments)]
    async fn run_stage(
        &self,
        source: SourceType,
        request: &CascadeRequest,
        config: &CascadeConfiguration,
        scorer: &ConfidenceScorer,
        remaining: Duration,
        permit: BreakerPermit<'_>,
        cancel: &CancellationToken,
    ) -> Result<StageExecution, CascadeError> {
        let stage_timeout = config.stage_timeout().min(remaining);
        let started_at = Utc::now();
        let clock = Instant::now();
        let timeout_ms = stage_timeout.as_millis() as u64;
        debug!(stage = %source, timeout_ms, trial = permit.is_trial(), "Stage started");

        let outcome = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(CascadeError::Cancelled),
            outcome = timeout(stage_timeout, self.invoke(source, request, config)) => outcome,
        };
        let elapsed = elapsed_ms(clock);

        let execution = match outcome {
            Ok(Ok(output)) => {
                permit.succeed();
                let confidence = scorer.score(&request.query, &output);
                let answer = output.answer_text();
                let stop = config.enable_early_stopping
                    && confidence.meets_threshold
                    && !answer.trim().is_empty();
                info!(
                    stage = %source,
                    elapsed_ms = elapsed,
                    results = output.result_count(),
                    score = confidence.score,
                    threshold = confidence.threshold,
                    early_stop = stop,
                    "Stage completed"
                );
                StageExecution::completed(
                    source,
                    started_at,
                    elapsed,
                    output.result_count(),
                    answer,
                    confidence,
                    stop,
                )
            }
            Ok(Err(e)) => {
                permit.fail(FailureKind::Error);
                warn!(stage = %source, elapsed_ms = elapsed, "Stage failed: {}", e);
                StageExecution::failed(source, started_at, elapsed, e.to_string())
            }
            Err(_) => {
                permit.fail(FailureKind::Timeout);
                warn!(stage = %source, elapsed_ms = elapsed, "Stage timed out");
                StageExecution::failed(
                    source,
                    started_at,
                    elapsed,
                    format!("stage timed out after {} ms", timeout_ms),
                )
            }
        };
        Ok(execution)
    }

    async fn invoke(
        &self,
        source: SourceType,
        request: &CascadeRequest,
        config: &CascadeConfiguration,
    ) -> Result<StageOutput, AdapterError> {
        let max_results = config.max_results_per_stage;
        let output = match source {
            SourceType::LocalKnowledge => StageOutput::LocalKnowledge {
                matches: self
                    .adapters
                    .local_knowledge
                    .search(&request.query, max_results, config.min_match_score)
                    .await?,
            },
            SourceType::LanguageModel => StageOutput::LanguageModel {
                text: self
                    .adapters
                    .language_model
                    .complete(&request.query, &request.context)
                    .await?,
            },
            SourceType::AuthoritativeDocs => StageOutput::AuthoritativeDocs {
                result: self
                    .adapters
                    .authoritative_docs
                    .search(&request.query, max_results)
                    .await?,
            },
            SourceType::WebSearch => StageOutput::WebSearch {
                result: self
                    .adapters
                    .web_search
                    .search(&request.query, max_results)
                    .await?,
            },
        };
        Ok(output)
    }
}

impl std::fmt::Debug for CascadeOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CascadeOrchestrator")
            .field("config", &self.active_config())
            .finish_non_exhaustive()
    }
}

// ============================================================================
// Selection
// ============================================================================

/// Pick the final answer from the stage log.
///
/// Conflicts (checked when at least two stages answered) go to the
/// authoritative docs answer if the tie-breaker is on, otherwise to the
/// highest score. Without a conflict the early-stop answer wins, then the
/// last answer produced.
fn select_answer(
    stages: &[StageExecution],
    early_stop: Option<SourceType>,
    config: &CascadeConfiguration,
    scorer: &ConfidenceScorer,
) -> Result<Selection, CascadeError> {
    if let Some(bad) = stages
        .iter()
        .find(|s| s.score().map_or(false, |score| !score.is_finite()))
    {
        return Err(CascadeError::Internal(format!(
            "non-finite confidence score from {}",
            bad.stage
        )));
    }

    let answered: Vec<&StageExecution> = stages.iter().filter(|s| s.has_answer()).collect();

    let conflict = if config.enable_conflict_detection && answered.len() >= 2 {
        let responses: Vec<SourceAnswer> = answered
            .iter()
            .map(|s| SourceAnswer::new(s.stage, s.answer.clone()))
            .collect();
        Some(scorer.detect_conflicts(&responses))
    } else {
        None
    };

    let (source, answer, path) = match &conflict {
        Some(analysis) if analysis.has_conflict => {
            let docs = answered
                .iter()
                .find(|s| s.stage == SourceType::AuthoritativeDocs);
            match docs {
                Some(docs) if config.enable_authoritative_tie_breaker => {
                    let resolved = scorer.resolve_conflict(
                        analysis,
                        SourceAnswer::new(docs.stage, docs.answer.clone()),
                    );
                    (Some(resolved.source), resolved.text, SelectionPath::TieBreaker)
                }
                _ => match highest_confidence(&answered) {
                    Some(best) => (
                        Some(best.stage),
                        best.answer.clone(),
                        SelectionPath::HighestConfidence,
                    ),
                    None => (None, String::new(), SelectionPath::None),
                },
            }
        }
        _ => {
            if let Some(stopped) = early_stop.and_then(|s| answered.iter().find(|e| e.stage == s)) {
                (Some(stopped.stage), stopped.answer.clone(), SelectionPath::EarlyStop)
            } else if let Some(last) = answered.last() {
                (Some(last.stage), last.answer.clone(), SelectionPath::LastAnswer)
            } else {
                (None, String::new(), SelectionPath::None)
            }
        }
    };

    if let Some(source) = source {
        if !answered.iter().any(|s| s.stage == source) {
            return Err(CascadeError::Internal(format!(
                "selected stage {} produced no answer",
                source
            )));
        }
    }

    Ok(Selection {
        source,
        answer,
        path,
        conflict,
    })
}

/// Highest score among scored stages; ties go to the earlier stage
fn highest_confidence<'a>(answered: &[&'a StageExecution]) -> Option<&'a StageExecution> {
    let mut best: Option<&'a StageExecution> = None;
    for &stage in answered {
        let Some(score) = stage.score() else {
            continue;
        };
        if best.and_then(|b| b.score()).map_or(true, |top| score > top) {
            best = Some(stage);
        }
    }
    best
}

fn build_result(
    selection: Selection,
    stages: Vec<StageExecution>,
    early_stop: Option<SourceType>,
    total_elapsed_ms: u64,
) -> (CascadeResult, SelectionPath) {
    let Some(source) = selection.source else {
        let mut result =
            CascadeResult::failed("no stage produced an answer", stages, total_elapsed_ms);
        result.conflict = selection.conflict;
        return (result, SelectionPath::None);
    };

    // The run stops where early stopping fired even when conflict
    // resolution takes the answer from an earlier stage.
    let stopped_at = CascadeStage::from(early_stop.unwrap_or(source));
    let confidence = stages
        .iter()
        .find(|s| s.stage == source)
        .and_then(|s| s.confidence.clone());
    let mut metadata = BTreeMap::new();
    metadata.insert("answer_source".to_string(), source.to_string());
    let result = CascadeResult {
        answer: selection.answer,
        stopped_at,
        confidence,
        stages,
        conflict: selection.conflict,
        total_elapsed_ms,
        early_stopped: early_stop.is_some(),
        metadata,
    };
    (result, selection.path)
}

/// Diagnostics every result carries
fn annotate(result: &mut CascadeResult, path: SelectionPath, request: &CascadeRequest, run_id: Uuid) {
    let attempted = result.executed_stages().count();
    let failed = result
        .executed_stages()
        .filter(|s| s.error.is_some())
        .count();
    let metadata = &mut result.metadata;
    metadata.insert("run_id".to_string(), run_id.to_string());
    metadata.insert("session_id".to_string(), request.session_id.clone());
    metadata.insert("stages_attempted".to_string(), attempted.to_string());
    metadata.insert("stages_failed".to_string(), failed.to_string());
    metadata.insert("selection".to_string(), path.as_str().to_string());
}

fn elapsed_ms(since: Instant) -> u64 {
    since.elapsed().as_millis() as u64
}

#[cfg(test)]
mod tests {
    use super::*;
    use cascade_shared::ConfidenceScore;

    fn answered(stage: SourceType, answer: &str, score: f64) -> StageExecution {
        let scorer = ConfidenceScorer::default();
        let mut confidence: ConfidenceScore =
            scorer.score(answer, &StageOutput::LanguageModel { text: answer.to_string() });
        confidence.source = stage;
        confidence.score = score;
        StageExecution::completed(stage, Utc::now(), 5, 1, answer.to_string(), confidence, false)
    }

    #[test]
    fn test_highest_confidence_prefers_earlier_on_tie() {
        let a = answered(SourceType::LanguageModel, "first", 0.6);
        let b = answered(SourceType::WebSearch, "second", 0.6);
        let best = highest_confidence(&[&a, &b]).unwrap();
        assert_eq!(best.stage, SourceType::LanguageModel);
    }

    #[test]
    fn test_non_finite_score_is_internal_error() {
        let stages = vec![answered(SourceType::LanguageModel, "answer", f64::NAN)];
        let err = select_answer(
            &stages,
            None,
            &CascadeConfiguration::default(),
            &ConfidenceScorer::default(),
        )
        .unwrap_err();
        assert!(matches!(err, CascadeError::Internal(_)));
    }

    #[test]
    fn test_last_answer_without_conflict() {
        let stages = vec![
            answered(SourceType::LanguageModel, "restart the resolver service", 0.4),
            answered(SourceType::WebSearch, "restart the resolver service", 0.5),
        ];
        let selection = select_answer(
            &stages,
            None,
            &CascadeConfiguration::default(),
            &ConfidenceScorer::default(),
        )
        .unwrap();
        assert_eq!(selection.path, SelectionPath::LastAnswer);
        assert_eq!(selection.source, Some(SourceType::WebSearch));
        assert!(!selection.conflict.unwrap().has_conflict);
    }

    #[test]
    fn test_conflict_without_tie_breaker_uses_highest_score() {
        let config = CascadeConfiguration {
            enable_authoritative_tie_breaker: false,
            ..Default::default()
        };
        let stages = vec![
            answered(SourceType::LanguageModel, "Restart is required", 0.7),
            answered(SourceType::AuthoritativeDocs, "Restart is not required", 0.6),
        ];
        let selection =
            select_answer(&stages, None, &config, &ConfidenceScorer::default()).unwrap();
        assert_eq!(selection.path, SelectionPath::HighestConfidence);
        assert_eq!(selection.source, Some(SourceType::LanguageModel));
    }

    #[test]
    fn test_nothing_answered_selects_none() {
        let stages = vec![StageExecution::failed(
            SourceType::LocalKnowledge,
            Utc::now(),
            3,
            "boom",
        )];
        let selection = select_answer(
            &stages,
            None,
            &CascadeConfiguration::default(),
            &ConfidenceScorer::default(),
        )
        .unwrap();
        assert_eq!(selection.path, SelectionPath::None);
        assert!(selection.source.is_none());
        assert!(selection.conflict.is_none());
    }
}
