//! Running cascade metrics.
//!
//! One aggregator per orchestrator, owned explicitly rather than global, so
//! independent orchestrators (and tests) never share counters. Counters are
//! never reset while the aggregator lives.

use cascade_shared::{CascadeResult, CascadeStage, SourceType};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, VecDeque};
use std::sync::RwLock;

/// Elapsed-time samples kept per stage
pub const RESPONSE_HISTORY_LIMIT: usize = 100;

#[derive(Debug, Default, Clone)]
struct StageStats {
    attempts: u64,
    successes: u64,
    samples: VecDeque<u64>,
}

impl StageStats {
    fn push_sample(&mut self, elapsed_ms: u64) {
        if self.samples.len() == RESPONSE_HISTORY_LIMIT {
            self.samples.pop_front();
        }
        self.samples.push_back(elapsed_ms);
    }

    fn average_ms(&self) -> Option<f64> {
        if self.samples.is_empty() {
            None
        } else {
            Some(self.samples.iter().sum::<u64>() as f64 / self.samples.len() as f64)
        }
    }

    /// 1.0 for a stage never attempted
    fn success_rate(&self) -> f64 {
        if self.attempts == 0 {
            1.0
        } else {
            self.successes as f64 / self.attempts as f64
        }
    }
}

#[derive(Debug, Default)]
struct MetricsState {
    total_runs: u64,
    stopped_at: BTreeMap<CascadeStage, u64>,
    stages: BTreeMap<SourceType, StageStats>,
    conflicts_detected: u64,
    tie_breaker_used: u64,
}

/// Point-in-time copy of the counters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub total_runs: u64,
    pub stopped_at_stage_counts: BTreeMap<CascadeStage, u64>,
    /// Mean of the retained samples, 0.0 when none
    pub avg_execution_time_by_stage: BTreeMap<SourceType, f64>,
    pub success_rate_by_stage: BTreeMap<SourceType, f64>,
    pub conflicts_detected: u64,
    pub tie_breaker_used_count: u64,
}

/// Thread-safe metrics aggregator
#[derive(Debug, Default)]
pub struct CascadeMetrics {
    state: RwLock<MetricsState>,
}

impl CascadeMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold one finished run into the counters
    pub fn record_run(&self, result: &CascadeResult, tie_breaker_used: bool) {
        let mut state = self.state.write().unwrap_or_else(|e| e.into_inner());
        state.total_runs += 1;
        *state.stopped_at.entry(result.stopped_at).or_insert(0) += 1;

        for execution in result.executed_stages() {
            let stats = state.stages.entry(execution.stage).or_default();
            stats.attempts += 1;
            if execution.succeeded() {
                stats.successes += 1;
            }
            stats.push_sample(execution.elapsed_ms);
        }

        if result.conflict.as_ref().map_or(false, |c| c.has_conflict) {
            state.conflicts_detected += 1;
        }
        if tie_breaker_used {
            state.tie_breaker_used += 1;
        }
    }

    pub fn total_runs(&self) -> u64 {
        self.state.read().unwrap_or_else(|e| e.into_inner()).total_runs
    }

    pub fn average_response_ms(&self, source: SourceType) -> Option<f64> {
        let state = self.state.read().unwrap_or_else(|e| e.into_inner());
        state.stages.get(&source).and_then(StageStats::average_ms)
    }

    pub fn success_rate(&self, source: SourceType) -> f64 {
        let state = self.state.read().unwrap_or_else(|e| e.into_inner());
        state.stages.get(&source).map_or(1.0, StageStats::success_rate)
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        let state = self.state.read().unwrap_or_else(|e| e.into_inner());
        let mut stopped_at_stage_counts = BTreeMap::new();
        for stage in CascadeStage::ALL {
            stopped_at_stage_counts.insert(stage, state.stopped_at.get(&stage).copied().unwrap_or(0));
        }

        let mut avg_execution_time_by_stage = BTreeMap::new();
        let mut success_rate_by_stage = BTreeMap::new();
        for source in SourceType::ALL {
            let stats = state.stages.get(&source);
            avg_execution_time_by_stage
                .insert(source, stats.and_then(StageStats::average_ms).unwrap_or(0.0));
            success_rate_by_stage.insert(source, stats.map_or(1.0, StageStats::success_rate));
        }

        MetricsSnapshot {
            total_runs: state.total_runs,
            stopped_at_stage_counts,
            avg_execution_time_by_stage,
            success_rate_by_stage,
            conflicts_detected: state.conflicts_detected,
            tie_breaker_used_count: state.tie_breaker_used,
        }
    }
}
