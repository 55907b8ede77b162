//! Core data model for a cascade run.
//!
//! A run produces one `StageExecution` per stage it reached and is
//! summarised by a single `CascadeResult`. Nothing here is retained by the
//! engine once the result is returned.

use crate::confidence::ConfidenceScore;
use crate::config::CascadeConfiguration;
use crate::conflict::ConflictAnalysis;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Answer text used when no stage produced anything usable
pub const NO_INFORMATION_ANSWER: &str =
    "No information could be retrieved for this query from any source.";

// ============================================================================
// Sources and stages
// ============================================================================

/// The four knowledge sources, in cascade (cost-ascending) order
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum SourceType {
    LocalKnowledge,
    LanguageModel,
    AuthoritativeDocs,
    WebSearch,
}

impl SourceType {
    /// Fixed invocation order
    pub const ALL: [SourceType; 4] = [
        SourceType::LocalKnowledge,
        SourceType::LanguageModel,
        SourceType::AuthoritativeDocs,
        SourceType::WebSearch,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            SourceType::LocalKnowledge => "LocalKnowledge",
            SourceType::LanguageModel => "LanguageModel",
            SourceType::AuthoritativeDocs => "AuthoritativeDocs",
            SourceType::WebSearch => "WebSearch",
        }
    }

    /// Whether the source exposes a health probe
    pub fn has_health_probe(&self) -> bool {
        matches!(self, SourceType::AuthoritativeDocs | SourceType::WebSearch)
    }
}

impl fmt::Display for SourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where a run ended up: one of the sources, or `Failed`
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum CascadeStage {
    LocalKnowledge,
    LanguageModel,
    AuthoritativeDocs,
    WebSearch,
    Failed,
}

impl CascadeStage {
    pub const ALL: [CascadeStage; 5] = [
        CascadeStage::LocalKnowledge,
        CascadeStage::LanguageModel,
        CascadeStage::AuthoritativeDocs,
        CascadeStage::WebSearch,
        CascadeStage::Failed,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            CascadeStage::Failed => "Failed",
            other => other.source().map(|s| s.as_str()).unwrap_or("Failed"),
        }
    }

    /// The source behind this stage, `None` for `Failed`
    pub fn source(&self) -> Option<SourceType> {
        match self {
            CascadeStage::LocalKnowledge => Some(SourceType::LocalKnowledge),
            CascadeStage::LanguageModel => Some(SourceType::LanguageModel),
            CascadeStage::AuthoritativeDocs => Some(SourceType::AuthoritativeDocs),
            CascadeStage::WebSearch => Some(SourceType::WebSearch),
            CascadeStage::Failed => None,
        }
    }
}

impl From<SourceType> for CascadeStage {
    fn from(source: SourceType) -> Self {
        match source {
            SourceType::LocalKnowledge => CascadeStage::LocalKnowledge,
            SourceType::LanguageModel => CascadeStage::LanguageModel,
            SourceType::AuthoritativeDocs => CascadeStage::AuthoritativeDocs,
            SourceType::WebSearch => CascadeStage::WebSearch,
        }
    }
}

impl fmt::Display for CascadeStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Request
// ============================================================================

/// A query submitted to the cascade
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CascadeRequest {
    /// Query text (must be non-empty)
    pub query: String,
    /// Caller or session identifier
    pub session_id: String,
    /// Free-form context; prior conversation turns live under `history`
    #[serde(default)]
    pub context: BTreeMap<String, serde_json::Value>,
    /// Per-call configuration override
    #[serde(default)]
    pub config_override: Option<CascadeConfiguration>,
}

impl CascadeRequest {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            ..Default::default()
        }
    }

    pub fn with_session(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = session_id.into();
        self
    }

    pub fn with_context(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.context.insert(key.into(), value);
        self
    }

    pub fn with_config(mut self, config: CascadeConfiguration) -> Self {
        self.config_override = Some(config);
        self
    }
}

// ============================================================================
// Stage execution log
// ============================================================================

/// One record per stage the run reached. Built once, never mutated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageExecution {
    pub stage: SourceType,
    /// False when the stage was skipped (open circuit, exhausted budget)
    pub executed: bool,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub elapsed_ms: u64,
    pub result_count: usize,
    /// Raw answer text, empty when the stage produced nothing
    pub answer: String,
    pub confidence: Option<ConfidenceScore>,
    pub error: Option<String>,
    pub triggered_early_stop: bool,
}

impl StageExecution {
    /// Stage that ran and was scored
    pub fn completed(
        stage: SourceType,
        started_at: DateTime<Utc>,
        elapsed_ms: u64,
        result_count: usize,
        answer: String,
        confidence: ConfidenceScore,
        triggered_early_stop: bool,
    ) -> Self {
        Self {
            stage,
            executed: true,
            started_at,
            finished_at: started_at + chrono::Duration::milliseconds(elapsed_ms as i64),
            elapsed_ms,
            result_count,
            answer,
            confidence: Some(confidence),
            error: None,
            triggered_early_stop,
        }
    }

    /// Stage whose adapter errored or timed out
    pub fn failed(
        stage: SourceType,
        started_at: DateTime<Utc>,
        elapsed_ms: u64,
        error: impl Into<String>,
    ) -> Self {
        Self {
            stage,
            executed: true,
            started_at,
            finished_at: started_at + chrono::Duration::milliseconds(elapsed_ms as i64),
            elapsed_ms,
            result_count: 0,
            answer: String::new(),
            confidence: None,
            error: Some(error.into()),
            triggered_early_stop: false,
        }
    }

    /// Stage that was never invoked
    pub fn skipped(stage: SourceType, at: DateTime<Utc>, reason: impl Into<String>) -> Self {
        Self {
            stage,
            executed: false,
            started_at: at,
            finished_at: at,
            elapsed_ms: 0,
            result_count: 0,
            answer: String::new(),
            confidence: None,
            error: Some(reason.into()),
            triggered_early_stop: false,
        }
    }

    /// Executed without error
    pub fn succeeded(&self) -> bool {
        self.executed && self.error.is_none()
    }

    pub fn has_answer(&self) -> bool {
        !self.answer.trim().is_empty()
    }

    pub fn score(&self) -> Option<f64> {
        self.confidence.as_ref().map(|c| c.score)
    }
}

// ============================================================================
// Result
// ============================================================================

/// Final outcome of one cascade run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CascadeResult {
    pub answer: String,
    /// Stage whose answer was selected, `Failed` if none
    pub stopped_at: CascadeStage,
    /// Confidence of the selected stage
    pub confidence: Option<ConfidenceScore>,
    /// Every stage reached, in invocation order
    pub stages: Vec<StageExecution>,
    pub conflict: Option<ConflictAnalysis>,
    pub total_elapsed_ms: u64,
    pub early_stopped: bool,
    /// Diagnostics (session, selection path, error text)
    pub metadata: BTreeMap<String, String>,
}

impl CascadeResult {
    /// Result for a run that produced nothing usable
    pub fn failed(
        message: impl Into<String>,
        stages: Vec<StageExecution>,
        total_elapsed_ms: u64,
    ) -> Self {
        let mut metadata = BTreeMap::new();
        metadata.insert("error".to_string(), message.into());
        Self {
            answer: NO_INFORMATION_ANSWER.to_string(),
            stopped_at: CascadeStage::Failed,
            confidence: None,
            stages,
            conflict: None,
            total_elapsed_ms,
            early_stopped: false,
            metadata,
        }
    }

    pub fn is_failed(&self) -> bool {
        self.stopped_at == CascadeStage::Failed
    }

    pub fn stage(&self, source: SourceType) -> Option<&StageExecution> {
        self.stages.iter().find(|s| s.stage == source)
    }

    pub fn executed_stages(&self) -> impl Iterator<Item = &StageExecution> {
        self.stages.iter().filter(|s| s.executed)
    }
}
