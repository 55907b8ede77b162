//! Cascade configuration.
//!
//! One process-wide default is built at startup and may be overridden per
//! request. Every field has a serde default so partial TOML works.

use crate::error::ConfigError;
use crate::types::SourceType;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Per-source confidence thresholds
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StageThresholds {
    #[serde(default = "default_local_knowledge_threshold")]
    pub local_knowledge: f64,

    #[serde(default = "default_language_model_threshold")]
    pub language_model: f64,

    #[serde(default = "default_authoritative_docs_threshold")]
    pub authoritative_docs: f64,

    #[serde(default = "default_web_search_threshold")]
    pub web_search: f64,
}

fn default_local_knowledge_threshold() -> f64 {
    0.85
}

fn default_language_model_threshold() -> f64 {
    0.75
}

fn default_authoritative_docs_threshold() -> f64 {
    0.80
}

fn default_web_search_threshold() -> f64 {
    0.70
}

impl Default for StageThresholds {
    fn default() -> Self {
        Self {
            local_knowledge: default_local_knowledge_threshold(),
            language_model: default_language_model_threshold(),
            authoritative_docs: default_authoritative_docs_threshold(),
            web_search: default_web_search_threshold(),
        }
    }
}

impl StageThresholds {
    pub fn for_source(&self, source: SourceType) -> f64 {
        match source {
            SourceType::LocalKnowledge => self.local_knowledge,
            SourceType::LanguageModel => self.language_model,
            SourceType::AuthoritativeDocs => self.authoritative_docs,
            SourceType::WebSearch => self.web_search,
        }
    }
}

/// Behaviour switches, limits and timeouts for one cascade run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CascadeConfiguration {
    #[serde(default)]
    pub thresholds: StageThresholds,

    /// Stop at the first stage that meets its threshold
    #[serde(default = "default_true")]
    pub enable_early_stopping: bool,

    /// Compare answers when more than one stage produced one
    #[serde(default = "default_true")]
    pub enable_conflict_detection: bool,

    /// Prefer the authoritative docs answer when answers conflict
    #[serde(default = "default_true")]
    pub enable_authoritative_tie_breaker: bool,

    /// topK / maxResults handed to every adapter
    #[serde(default = "default_max_results")]
    pub max_results_per_stage: usize,

    /// Minimum match score handed to the local knowledge lookup
    #[serde(default = "default_min_match_score")]
    pub min_match_score: f64,

    /// Per-stage timeout in milliseconds
    #[serde(default = "default_stage_timeout")]
    pub stage_timeout_ms: u64,

    /// Whole-run budget in milliseconds
    #[serde(default = "default_overall_timeout")]
    pub overall_timeout_ms: u64,
}

fn default_true() -> bool {
    true
}

fn default_max_results() -> usize {
    5
}

fn default_min_match_score() -> f64 {
    0.3
}

fn default_stage_timeout() -> u64 {
    10_000
}

fn default_overall_timeout() -> u64 {
    30_000
}

impl Default for CascadeConfiguration {
    fn default() -> Self {
        Self {
            thresholds: StageThresholds::default(),
            enable_early_stopping: true,
            enable_conflict_detection: true,
            enable_authoritative_tie_breaker: true,
            max_results_per_stage: default_max_results(),
            min_match_score: default_min_match_score(),
            stage_timeout_ms: default_stage_timeout(),
            overall_timeout_ms: default_overall_timeout(),
        }
    }
}

impl CascadeConfiguration {
    /// Check the invariants: thresholds in [0,1], timeouts > 0
    pub fn validate(&self) -> Result<(), ConfigError> {
        for source in SourceType::ALL {
            let value = self.thresholds.for_source(source);
            if !(0.0..=1.0).contains(&value) {
                return Err(ConfigError::ThresholdOutOfRange {
                    stage: source,
                    value,
                });
            }
        }
        if self.stage_timeout_ms == 0 {
            return Err(ConfigError::NonPositiveTimeout {
                field: "stage_timeout_ms",
            });
        }
        if self.overall_timeout_ms == 0 {
            return Err(ConfigError::NonPositiveTimeout {
                field: "overall_timeout_ms",
            });
        }
        if self.max_results_per_stage == 0 {
            return Err(ConfigError::ZeroMaxResults);
        }
        if !(0.0..=1.0).contains(&self.min_match_score) {
            return Err(ConfigError::InvalidMatchScore(self.min_match_score));
        }
        Ok(())
    }

    pub fn threshold(&self, source: SourceType) -> f64 {
        self.thresholds.for_source(source)
    }

    pub fn stage_timeout(&self) -> Duration {
        Duration::from_millis(self.stage_timeout_ms)
    }

    pub fn overall_timeout(&self) -> Duration {
        Duration::from_millis(self.overall_timeout_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = CascadeConfiguration::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.threshold(SourceType::LocalKnowledge), 0.85);
        assert_eq!(config.threshold(SourceType::LanguageModel), 0.75);
        assert_eq!(config.threshold(SourceType::AuthoritativeDocs), 0.80);
        assert_eq!(config.threshold(SourceType::WebSearch), 0.70);
    }

    #[test]
    fn test_rejects_threshold_out_of_range() {
        let mut config = CascadeConfiguration::default();
        config.thresholds.authoritative_docs = 1.2;
        assert_eq!(
            config.validate(),
            Err(ConfigError::ThresholdOutOfRange {
                stage: SourceType::AuthoritativeDocs,
                value: 1.2
            })
        );
    }

    #[test]
    fn test_rejects_nan_threshold() {
        let mut config = CascadeConfiguration::default();
        config.thresholds.web_search = f64::NAN;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rejects_zero_timeouts() {
        let mut config = CascadeConfiguration::default();
        config.stage_timeout_ms = 0;
        assert_eq!(
            config.validate(),
            Err(ConfigError::NonPositiveTimeout {
                field: "stage_timeout_ms"
            })
        );

        let mut config = CascadeConfiguration::default();
        config.overall_timeout_ms = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config: CascadeConfiguration =
            serde_json::from_str(r#"{"thresholds": {"local_knowledge": 0.5}, "enable_early_stopping": false}"#)
                .unwrap();
        assert_eq!(config.thresholds.local_knowledge, 0.5);
        assert_eq!(config.thresholds.web_search, 0.70);
        assert!(!config.enable_early_stopping);
        assert!(config.enable_conflict_detection);
        assert_eq!(config.stage_timeout(), Duration::from_secs(10));
    }
}
