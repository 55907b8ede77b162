//! Error types for the cascade.

use crate::types::SourceType;
use thiserror::Error;

/// Failure reported by a single source adapter.
///
/// Never escapes a cascade run: the orchestrator records it on the
/// stage execution and moves on.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum AdapterError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("Provider error: {0}")]
    Provider(String),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Source unavailable: {0}")]
    Unavailable(String),
}

/// Rejected configuration values.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    #[error("Threshold for {stage} must be within [0, 1], got {value}")]
    ThresholdOutOfRange { stage: SourceType, value: f64 },

    #[error("Timeout {field} must be greater than zero")]
    NonPositiveTimeout { field: &'static str },

    #[error("max_results_per_stage must be greater than zero")]
    ZeroMaxResults,

    #[error("min_match_score must be within [0, 1], got {0}")]
    InvalidMatchScore(f64),
}

/// Outcomes of a cascade run that are not a `CascadeResult`.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CascadeError {
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(#[from] ConfigError),

    #[error("Cascade cancelled by caller")]
    Cancelled,

    #[error("Internal error: {0}")]
    Internal(String),
}

impl CascadeError {
    pub fn code(&self) -> i32 {
        match self {
            CascadeError::InvalidRequest(_) => -32602,
            CascadeError::InvalidConfiguration(_) => -32010,
            CascadeError::Cancelled => -32011,
            CascadeError::Internal(_) => -32603,
        }
    }

    /// Cancellation is a caller decision, not a failure.
    pub fn is_cancellation(&self) -> bool {
        matches!(self, CascadeError::Cancelled)
    }
}
