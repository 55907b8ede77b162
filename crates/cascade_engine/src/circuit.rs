//! Circuit breakers around the source adapters.
//!
//! Orthogonal to scoring: a breaker only decides whether a stage's adapter
//! is called at all. A skipped stage is recorded and the cascade moves on.
//!
//! ```text
//!   Closed   ──(failure_threshold consecutive failures)──> Open
//!   Open     ──(open interval elapsed, next admission)───> HalfOpen
//!   HalfOpen ──(success_threshold trial successes)──────> Closed
//!   HalfOpen ──(trial failure)───────────────────────────> Open
//! ```
//!
//! While half-open a source takes one trial call at a time. Every admitted
//! call holds a [`BreakerPermit`]; a permit dropped without an outcome (the
//! run was cancelled) gives its trial slot back.

use crate::config::BreakerConfig;
use cascade_shared::SourceType;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Concurrent trial calls admitted while half-open
pub const HALF_OPEN_TRIAL_LIMIT: u32 = 1;

/// Circuit breaker state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CircuitState {
    /// Calls flow normally
    Closed,
    /// Calls are rejected
    Open,
    /// Trial calls decide whether the source recovered
    HalfOpen,
}

/// Why an adapter call counted against its breaker
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// The stage ran out of time
    Timeout,
    /// The adapter returned an error
    Error,
}

/// Breaker counters for one source
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BreakerStats {
    pub timeouts: u64,
    pub errors: u64,
    pub times_opened: u64,
    pub trials_attempted: u64,
    pub trials_succeeded: u64,
    pub last_failure: Option<FailureKind>,
}

/// What an admission decided
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    /// Breaker closed, normal call
    Pass,
    /// Half-open trial call
    Trial,
    /// Open, or the half-open trial slot is taken
    Rejected,
}

/// Breaker for one source's adapter
#[derive(Debug, Clone)]
pub struct CircuitBreaker {
    source: SourceType,
    state: CircuitState,
    consecutive_failures: u32,
    trial_successes: u32,
    trials_in_flight: u32,
    failure_threshold: u32,
    success_threshold: u32,
    open_interval: Duration,
    opened_at: Option<Instant>,
    stats: BreakerStats,
}

impl CircuitBreaker {
    pub fn new(source: SourceType, config: &BreakerConfig) -> Self {
        Self {
            source,
            state: CircuitState::Closed,
            consecutive_failures: 0,
            trial_successes: 0,
            trials_in_flight: 0,
            failure_threshold: config.failure_threshold.max(1),
            success_threshold: config.success_threshold.max(1),
            open_interval: Duration::from_millis(config.open_interval_ms),
            opened_at: None,
            stats: BreakerStats::default(),
        }
    }

    pub fn source(&self) -> SourceType {
        self.source
    }

    pub fn state(&self) -> CircuitState {
        self.state
    }

    pub fn stats(&self) -> &BreakerStats {
        &self.stats
    }

    /// Decide whether a call may start at `now`
    pub fn admit(&mut self, now: Instant) -> Admission {
        if self.state == CircuitState::Open {
            let elapsed = self
                .opened_at
                .map_or(true, |at| now.saturating_duration_since(at) >= self.open_interval);
            if !elapsed {
                return Admission::Rejected;
            }
            self.state = CircuitState::HalfOpen;
            self.trial_successes = 0;
            self.trials_in_flight = 0;
            info!(stage = %self.source, "circuit half-open");
        }

        match self.state {
            CircuitState::Closed => Admission::Pass,
            CircuitState::HalfOpen if self.trials_in_flight < HALF_OPEN_TRIAL_LIMIT => {
                self.trials_in_flight += 1;
                self.stats.trials_attempted += 1;
                Admission::Trial
            }
            _ => Admission::Rejected,
        }
    }

    /// A call admitted as `admission` completed
    pub fn on_success(&mut self, admission: Admission) {
        match admission {
            Admission::Trial => {
                self.end_trial();
                self.stats.trials_succeeded += 1;
                if self.state == CircuitState::HalfOpen {
                    self.trial_successes += 1;
                    if self.trial_successes >= self.success_threshold {
                        self.close();
                    }
                }
            }
            Admission::Pass if self.state == CircuitState::Closed => {
                self.consecutive_failures = 0;
            }
            // A call admitted before the breaker opened says nothing about now
            _ => {}
        }
    }

    /// A call admitted as `admission` failed with `kind` at `now`
    pub fn on_failure(&mut self, admission: Admission, kind: FailureKind, now: Instant) {
        match kind {
            FailureKind::Timeout => self.stats.timeouts += 1,
            FailureKind::Error => self.stats.errors += 1,
        }
        self.stats.last_failure = Some(kind);

        match admission {
            Admission::Trial => {
                self.end_trial();
                if self.state == CircuitState::HalfOpen {
                    self.open(now, kind);
                }
            }
            Admission::Pass if self.state == CircuitState::Closed => {
                self.consecutive_failures += 1;
                if self.consecutive_failures >= self.failure_threshold {
                    self.open(now, kind);
                }
            }
            _ => {}
        }
    }

    /// A trial call ended without an outcome
    pub fn release_trial(&mut self) {
        self.end_trial();
    }

    fn end_trial(&mut self) {
        self.trials_in_flight = self.trials_in_flight.saturating_sub(1);
    }

    fn open(&mut self, now: Instant, cause: FailureKind) {
        self.state = CircuitState::Open;
        self.opened_at = Some(now);
        self.consecutive_failures = 0;
        self.trial_successes = 0;
        self.stats.times_opened += 1;
        warn!(stage = %self.source, cause = ?cause, "circuit opened");
    }

    fn close(&mut self) {
        self.state = CircuitState::Closed;
        self.opened_at = None;
        self.consecutive_failures = 0;
        self.trial_successes = 0;
        info!(stage = %self.source, "circuit closed");
    }
}

/// One breaker per source, shared by all runs of an orchestrator
#[derive(Debug)]
pub struct CircuitBreakers {
    enabled: bool,
    breakers: Mutex<HashMap<SourceType, CircuitBreaker>>,
}

impl CircuitBreakers {
    pub fn new(config: &BreakerConfig) -> Self {
        let breakers = SourceType::ALL
            .iter()
            .map(|s| (*s, CircuitBreaker::new(*s, config)))
            .collect();
        Self {
            enabled: config.enabled,
            breakers: Mutex::new(breakers),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Ask to call the stage adapter. `None` means skip the stage.
    pub fn admit(&self, source: SourceType) -> Option<BreakerPermit<'_>> {
        if !self.enabled {
            return Some(BreakerPermit::new(self, source, Admission::Pass, false));
        }
        let admission = self.with_breaker(source, |b| b.admit(Instant::now()))?;
        match admission {
            Admission::Rejected => {
                debug!(stage = %source, "circuit rejected call");
                None
            }
            admission => Some(BreakerPermit::new(self, source, admission, true)),
        }
    }

    pub fn state(&self, source: SourceType) -> CircuitState {
        self.with_breaker(source, |b| b.state())
            .unwrap_or(CircuitState::Closed)
    }

    pub fn stats(&self, source: SourceType) -> BreakerStats {
        self.with_breaker(source, |b| b.stats().clone())
            .unwrap_or_default()
    }

    fn with_breaker<T>(
        &self,
        source: SourceType,
        f: impl FnOnce(&mut CircuitBreaker) -> T,
    ) -> Option<T> {
        let mut breakers = self.breakers.lock().unwrap_or_else(|e| e.into_inner());
        breakers.get_mut(&source).map(f)
    }
}

/// An admitted adapter call. Settle it with [`succeed`](Self::succeed) or
/// [`fail`](Self::fail); dropping it unsettled frees a half-open trial slot.
#[must_use = "an unsettled permit records no outcome"]
#[derive(Debug)]
pub struct BreakerPermit<'a> {
    breakers: &'a CircuitBreakers,
    source: SourceType,
    admission: Admission,
    tracked: bool,
}

impl<'a> BreakerPermit<'a> {
    fn new(
        breakers: &'a CircuitBreakers,
        source: SourceType,
        admission: Admission,
        tracked: bool,
    ) -> Self {
        Self {
            breakers,
            source,
            admission,
            tracked,
        }
    }

    pub fn is_trial(&self) -> bool {
        self.admission == Admission::Trial
    }

    pub fn succeed(mut self) {
        if std::mem::take(&mut self.tracked) {
            let admission = self.admission;
            self.breakers
                .with_breaker(self.source, |b| b.on_success(admission));
        }
    }

    pub fn fail(mut self, kind: FailureKind) {
        if std::mem::take(&mut self.tracked) {
            let admission = self.admission;
            self.breakers
                .with_breaker(self.source, |b| b.on_failure(admission, kind, Instant::now()));
        }
    }
}

impl Drop for BreakerPermit<'_> {
    fn drop(&mut self) {
        if self.tracked && self.admission == Admission::Trial {
            self.breakers
                .with_breaker(self.source, CircuitBreaker::release_trial);
        }
    }
}
