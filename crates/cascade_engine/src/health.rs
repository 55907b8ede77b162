//! Health report for the cascade stages.

use crate::adapters::AdapterSet;
use crate::circuit::{CircuitBreakers, CircuitState, FailureKind};
use crate::metrics::CascadeMetrics;
use cascade_shared::SourceType;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;
use tokio::time::timeout;
use tracing::warn;

/// A probe that does not answer within this window counts as down
pub const HEALTH_PROBE_TIMEOUT: Duration = Duration::from_secs(5);

/// Overall cascade health
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum HealthStatus {
    /// Every stage is up
    Healthy,
    /// Some stages are up
    Degraded,
    /// No stage is up
    Unhealthy,
}

impl HealthStatus {
    pub fn from_counts(healthy: usize, total: usize) -> Self {
        if total > 0 && healthy == total {
            HealthStatus::Healthy
        } else if healthy > 0 {
            HealthStatus::Degraded
        } else {
            HealthStatus::Unhealthy
        }
    }
}

/// Health of one stage
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageHealth {
    pub healthy: bool,
    /// Mean over the retained samples, 0.0 when none
    pub avg_response_time_ms: f64,
    pub success_rate: f64,
    pub circuit: CircuitState,
    /// Cause of the stage's most recent breaker failure
    pub last_failure: Option<FailureKind>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthReport {
    pub overall_status: HealthStatus,
    pub per_stage: BTreeMap<SourceType, StageHealth>,
    pub checked_at: DateTime<Utc>,
}

impl HealthReport {
    pub fn healthy_stages(&self) -> usize {
        self.per_stage.values().filter(|s| s.healthy).count()
    }
}

/// Probe every stage and combine with the running metrics.
///
/// A stage is up when its probe answers true in time and its circuit is
/// not open. Sources without a probe only depend on the circuit.
pub async fn check_health(
    adapters: &AdapterSet,
    metrics: &CascadeMetrics,
    breakers: &CircuitBreakers,
) -> HealthReport {
    let mut per_stage = BTreeMap::new();

    for source in SourceType::ALL {
        let reachable = match timeout(HEALTH_PROBE_TIMEOUT, adapters.health_check(source)).await {
            Ok(up) => up,
            Err(_) => {
                warn!(stage = %source, "health probe timed out");
                false
            }
        };
        let circuit = breakers.state(source);
        per_stage.insert(
            source,
            StageHealth {
                healthy: reachable && circuit != CircuitState::Open,
                avg_response_time_ms: metrics.average_response_ms(source).unwrap_or(0.0),
                success_rate: metrics.success_rate(source),
                circuit,
                last_failure: breakers.stats(source).last_failure,
            },
        );
    }

    let healthy = per_stage.values().filter(|s| s.healthy).count();
    HealthReport {
        overall_status: HealthStatus::from_counts(healthy, per_stage.len()),
        per_stage,
        checked_at: Utc::now(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::fake::FakeAdaptersBuilder;
    use crate::config::BreakerConfig;

    #[test]
    fn test_status_from_counts() {
        assert_eq!(HealthStatus::from_counts(4, 4), HealthStatus::Healthy);
        assert_eq!(HealthStatus::from_counts(2, 4), HealthStatus::Degraded);
        assert_eq!(HealthStatus::from_counts(0, 4), HealthStatus::Unhealthy);
        assert_eq!(HealthStatus::from_counts(0, 0), HealthStatus::Unhealthy);
    }

    #[tokio::test]
    async fn test_all_up_is_healthy() {
        let fakes = FakeAdaptersBuilder::new().build();
        let report = check_health(
            &fakes.adapters(),
            &CascadeMetrics::new(),
            &CircuitBreakers::new(&BreakerConfig::default()),
        )
        .await;

        assert_eq!(report.overall_status, HealthStatus::Healthy);
        assert_eq!(report.healthy_stages(), 4);
        let local = &report.per_stage[&SourceType::LocalKnowledge];
        assert_eq!(local.avg_response_time_ms, 0.0);
        assert_eq!(local.success_rate, 1.0);
        assert_eq!(local.circuit, CircuitState::Closed);
    }

    #[tokio::test]
    async fn test_failed_probe_degrades() {
        let fakes = FakeAdaptersBuilder::new().web_healthy(false).build();
        let report = check_health(
            &fakes.adapters(),
            &CascadeMetrics::new(),
            &CircuitBreakers::new(&BreakerConfig::default()),
        )
        .await;

        assert_eq!(report.overall_status, HealthStatus::Degraded);
        assert!(!report.per_stage[&SourceType::WebSearch].healthy);
        assert!(report.per_stage[&SourceType::AuthoritativeDocs].healthy);
    }

    #[tokio::test]
    async fn test_open_circuit_marks_stage_down() {
        let fakes = FakeAdaptersBuilder::new().build();
        let breakers = CircuitBreakers::new(&BreakerConfig {
            failure_threshold: 1,
            ..Default::default()
        });
        breakers
            .admit(SourceType::LocalKnowledge)
            .unwrap()
            .fail(FailureKind::Timeout);

        let report = check_health(&fakes.adapters(), &CascadeMetrics::new(), &breakers).await;
        let local = &report.per_stage[&SourceType::LocalKnowledge];
        assert!(!local.healthy);
        assert_eq!(local.circuit, CircuitState::Open);
        assert_eq!(local.last_failure, Some(FailureKind::Timeout));
        assert_eq!(report.overall_status, HealthStatus::Degraded);
    }
}
