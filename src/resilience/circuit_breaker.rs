//! Circuit breaker for downstream operation protection.
//!
//! # States
//! - Closed: normal operation, calls pass through
//! - Open: operation assumed unhealthy, calls fail fast
//! - Half-Open: a single trial tests whether it recovered
//!
//! # State Transitions
//! ```text
//! Closed → Open: failure record reaches failure_threshold
//! Open → Half-Open: first call after recovery_timeout has elapsed
//! Half-Open → Closed: trial succeeds
//! Half-Open → Open: trial fails
//! ```
//!
//! # Design Decisions
//! - One breaker per logical operation (see `registry.rs`), never per service
//! - Fail fast in Open state; rejections do not count as failures
//! - Single trial in Half-Open: concurrent callers are rejected until the
//!   trial reports. A trial dropped before reporting frees the slot.
//! - State, failure record, open timestamp and trial slot live behind one
//!   mutex, never held across an await
//! - Results of calls admitted before the latest transition are counted in
//!   the stats but do not move the state machine

use std::collections::VecDeque;
use std::future::Future;
use std::time::Duration;

use parking_lot::Mutex;
use serde::Serialize;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use crate::config::{CircuitBreakerConfig, FailurePolicy};
use crate::observability::metrics;
use crate::resilience::outcome::{BreakerOpen, CallError, CallOutcome};

/// Circuit breaker states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

impl CircuitState {
    pub fn as_str(&self) -> &'static str {
        match self {
            CircuitState::Closed => "closed",
            CircuitState::Open => "open",
            CircuitState::HalfOpen => "half_open",
        }
    }
}

/// Failure bookkeeping, one of the two configured policies.
#[derive(Debug)]
enum FailureRecord {
    Windowed {
        stamps: VecDeque<Instant>,
        window: Option<Duration>,
    },
    Counter(u32),
}

impl FailureRecord {
    fn new(config: &CircuitBreakerConfig) -> Self {
        match config.policy {
            FailurePolicy::Windowed => FailureRecord::Windowed {
                stamps: VecDeque::with_capacity(config.failure_threshold as usize),
                window: config.failure_window(),
            },
            FailurePolicy::Counter => FailureRecord::Counter(0),
        }
    }

    fn record(&mut self, now: Instant, threshold: u32) {
        match self {
            FailureRecord::Windowed { stamps, window } => {
                if let Some(window) = window {
                    while stamps
                        .front()
                        .is_some_and(|t| now.duration_since(*t) > *window)
                    {
                        stamps.pop_front();
                    }
                }
                stamps.push_back(now);
                while stamps.len() > threshold as usize {
                    stamps.pop_front();
                }
            }
            FailureRecord::Counter(count) => *count = count.saturating_add(1),
        }
    }

    fn count(&self) -> u32 {
        match self {
            FailureRecord::Windowed { stamps, .. } => stamps.len() as u32,
            FailureRecord::Counter(count) => *count,
        }
    }

    fn clear(&mut self) {
        match self {
            FailureRecord::Windowed { stamps, .. } => stamps.clear(),
            FailureRecord::Counter(count) => *count = 0,
        }
    }
}

#[derive(Debug, Default, Clone, Copy)]
struct Counters {
    calls: u64,
    successes: u64,
    failures: u64,
    rejections: u64,
}

#[derive(Debug)]
struct Inner {
    state: CircuitState,
    failures: FailureRecord,
    last_failure_time: Option<Instant>,
    trial_in_flight: bool,
    /// Bumped on every transition; permits from older generations are stale.
    generation: u64,
    counters: Counters,
}

/// Point-in-time view of a breaker for the admin surface.
#[derive(Debug, Clone, Serialize)]
pub struct BreakerSnapshot {
    pub name: String,
    pub state: CircuitState,
    pub policy: FailurePolicy,
    pub failure_threshold: u32,
    pub recorded_failures: u32,
    pub recovery_timeout_ms: u64,
    /// Remaining cooldown while open.
    pub retry_after_ms: Option<u64>,
    pub calls: u64,
    pub successes: u64,
    pub failures: u64,
    pub rejections: u64,
}

/// Failure-tracking breaker guarding one logical operation.
#[derive(Debug)]
pub struct CircuitBreaker {
    name: String,
    config: CircuitBreakerConfig,
    inner: Mutex<Inner>,
}

impl CircuitBreaker {
    /// Create a closed breaker.
    pub fn new(name: impl Into<String>, config: CircuitBreakerConfig) -> Self {
        let name = name.into();
        info!(
            operation = %name,
            failure_threshold = config.failure_threshold,
            recovery_timeout_ms = config.recovery_timeout_ms,
            policy = ?config.policy,
            "Circuit breaker initialized"
        );

        let failures = FailureRecord::new(&config);
        Self {
            name,
            config,
            inner: Mutex::new(Inner {
                state: CircuitState::Closed,
                failures,
                last_failure_time: None,
                trial_in_flight: false,
                generation: 0,
                counters: Counters::default(),
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn config(&self) -> &CircuitBreakerConfig {
        &self.config
    }

    pub fn state(&self) -> CircuitState {
        self.inner.lock().state
    }

    /// Failures currently held in the record.
    pub fn failure_count(&self) -> u32 {
        self.inner.lock().failures.count()
    }

    /// When the circuit last opened.
    pub fn last_failure_time(&self) -> Option<Instant> {
        self.inner.lock().last_failure_time
    }

    /// Execute `operation` under breaker protection.
    ///
    /// Returns `ServiceUnavailable` without invoking `operation` while open.
    pub async fn call<T, E, F, Fut>(&self, operation: F) -> CallOutcome<T, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let permit = self.try_acquire()?;
        let result = operation().await;
        permit.record(result.is_ok());
        result.map_err(CallError::Failed)
    }

    /// Ask to run one call. The permit must be settled with
    /// [`CallPermit::record`]; dropping it unsettled records nothing.
    pub fn try_acquire(&self) -> Result<CallPermit<'_>, BreakerOpen> {
        let now = Instant::now();
        let mut inner = self.inner.lock();

        match inner.state {
            CircuitState::Closed => {}
            CircuitState::Open => {
                let elapsed = inner
                    .last_failure_time
                    .map(|t| now.duration_since(t))
                    .unwrap_or(Duration::MAX);
                let recovery = self.config.recovery_timeout();
                if elapsed <= recovery {
                    return Err(self.reject(&mut inner, recovery - elapsed));
                }
                self.transition(&mut inner, CircuitState::HalfOpen);
                inner.trial_in_flight = true;
                info!(operation = %self.name, "Circuit breaker half-open (probing recovery)");
            }
            CircuitState::HalfOpen => {
                if inner.trial_in_flight {
                    return Err(self.reject(&mut inner, Duration::ZERO));
                }
                inner.trial_in_flight = true;
                debug!(operation = %self.name, "Circuit breaker re-issuing trial");
            }
        }

        inner.counters.calls += 1;
        Ok(CallPermit {
            breaker: self,
            generation: inner.generation,
            trial: inner.state == CircuitState::HalfOpen,
            settled: false,
        })
    }

    fn reject(&self, inner: &mut Inner, retry_after: Duration) -> BreakerOpen {
        inner.counters.rejections += 1;
        metrics::record_breaker_rejection(&self.name);
        debug!(
            operation = %self.name,
            state = inner.state.as_str(),
            retry_after_ms = retry_after.as_millis() as u64,
            "Call rejected (circuit open)"
        );
        BreakerOpen {
            operation: self.name.clone(),
            retry_after,
        }
    }

    fn on_success(&self, generation: u64, trial: bool) {
        let mut inner = self.inner.lock();
        inner.counters.successes += 1;
        if generation != inner.generation {
            return;
        }

        match inner.state {
            CircuitState::Closed => inner.failures.clear(),
            CircuitState::HalfOpen if trial => {
                inner.failures.clear();
                inner.trial_in_flight = false;
                self.transition(&mut inner, CircuitState::Closed);
                info!(
                    operation = %self.name,
                    total_calls = inner.counters.calls,
                    "Circuit breaker closed (recovered)"
                );
            }
            _ => {}
        }
    }

    fn on_failure(&self, generation: u64, trial: bool) {
        let now = Instant::now();
        let mut inner = self.inner.lock();
        inner.counters.failures += 1;
        if generation != inner.generation {
            return;
        }

        match inner.state {
            CircuitState::Closed => {
                inner.failures.record(now, self.config.failure_threshold);
                let recorded = inner.failures.count();
                warn!(
                    operation = %self.name,
                    recorded_failures = recorded,
                    failure_threshold = self.config.failure_threshold,
                    "Operation failed"
                );
                if recorded >= self.config.failure_threshold {
                    self.trip(&mut inner, now);
                }
            }
            CircuitState::HalfOpen if trial => {
                inner.failures.record(now, self.config.failure_threshold);
                inner.trial_in_flight = false;
                self.trip(&mut inner, now);
            }
            _ => {}
        }
    }

    fn release_trial(&self, generation: u64) {
        let mut inner = self.inner.lock();
        if generation == inner.generation && inner.state == CircuitState::HalfOpen {
            inner.trial_in_flight = false;
            warn!(operation = %self.name, "Trial abandoned before reporting; slot released");
        }
    }

    fn trip(&self, inner: &mut Inner, now: Instant) {
        inner.last_failure_time = Some(now);
        self.transition(inner, CircuitState::Open);
        error!(
            operation = %self.name,
            recorded_failures = inner.failures.count(),
            failure_threshold = self.config.failure_threshold,
            recovery_timeout_ms = self.config.recovery_timeout_ms,
            "Circuit breaker opened (failing fast)"
        );
    }

    fn transition(&self, inner: &mut Inner, to: CircuitState) {
        let from = inner.state;
        inner.state = to;
        inner.generation += 1;
        metrics::record_breaker_transition(&self.name, from.as_str(), to.as_str());
    }

    /// Force the circuit open, as if it had just tripped.
    pub fn force_open(&self) {
        warn!(operation = %self.name, "Circuit breaker forced open");
        let mut inner = self.inner.lock();
        inner.trial_in_flight = false;
        self.trip(&mut inner, Instant::now());
    }

    /// Force the circuit closed with an empty failure record.
    pub fn force_closed(&self) {
        warn!(operation = %self.name, "Circuit breaker forced closed");
        let mut inner = self.inner.lock();
        inner.failures.clear();
        inner.trial_in_flight = false;
        self.transition(&mut inner, CircuitState::Closed);
    }

    pub fn snapshot(&self) -> BreakerSnapshot {
        let inner = self.inner.lock();
        let retry_after_ms = match (inner.state, inner.last_failure_time) {
            (CircuitState::Open, Some(opened)) => Some(
                self.config
                    .recovery_timeout()
                    .saturating_sub(opened.elapsed())
                    .as_millis() as u64,
            ),
            _ => None,
        };

        BreakerSnapshot {
            name: self.name.clone(),
            state: inner.state,
            policy: self.config.policy,
            failure_threshold: self.config.failure_threshold,
            recorded_failures: inner.failures.count(),
            recovery_timeout_ms: self.config.recovery_timeout_ms,
            retry_after_ms,
            calls: inner.counters.calls,
            successes: inner.counters.successes,
            failures: inner.counters.failures,
            rejections: inner.counters.rejections,
        }
    }
}

/// Admission for one call through a [`CircuitBreaker`].
#[must_use = "a permit must be settled with `record`"]
#[derive(Debug)]
pub struct CallPermit<'a> {
    breaker: &'a CircuitBreaker,
    generation: u64,
    trial: bool,
    settled: bool,
}

impl CallPermit<'_> {
    /// Whether this call is the Half-Open trial.
    pub fn is_trial(&self) -> bool {
        self.trial
    }

    /// Report the outcome of the admitted call.
    pub fn record(mut self, success: bool) {
        self.settled = true;
        if success {
            self.breaker.on_success(self.generation, self.trial);
        } else {
            self.breaker.on_failure(self.generation, self.trial);
        }
    }
}

impl Drop for CallPermit<'_> {
    fn drop(&mut self) {
        if !self.settled && self.trial {
            self.breaker.release_trial(self.generation);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;
    use tokio::time::advance;

    fn config(threshold: u32, recovery: Duration, policy: FailurePolicy) -> CircuitBreakerConfig {
        CircuitBreakerConfig {
            failure_threshold: threshold,
            recovery_timeout_ms: recovery.as_millis() as u64,
            policy,
            failure_window_ms: None,
        }
    }

    async fn fail(breaker: &CircuitBreaker, calls: &AtomicU32) -> CallOutcome<(), &'static str> {
        breaker
            .call(|| async {
                calls.fetch_add(1, Ordering::SeqCst);
                Err::<(), _>("boom")
            })
            .await
    }

    async fn succeed(breaker: &CircuitBreaker, calls: &AtomicU32) -> CallOutcome<u32, &'static str> {
        breaker
            .call(|| async {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok(42)
            })
            .await
    }

    #[tokio::test(start_paused = true)]
    async fn test_three_failures_trip_and_reject_without_invoking() {
        for policy in [FailurePolicy::Windowed, FailurePolicy::Counter] {
            let breaker = CircuitBreaker::new("users.register", config(3, Duration::from_secs(10), policy));
            let calls = AtomicU32::new(0);

            for _ in 0..2 {
                assert!(matches!(fail(&breaker, &calls).await, Err(CallError::Failed("boom"))));
                assert_eq!(breaker.state(), CircuitState::Closed);
            }
            let _ = fail(&breaker, &calls).await;
            assert_eq!(breaker.state(), CircuitState::Open);
            assert!(breaker.last_failure_time().is_some());
            assert_eq!(calls.load(Ordering::SeqCst), 3);

            let result = succeed(&breaker, &calls).await;
            assert!(matches!(result, Err(CallError::ServiceUnavailable { .. })));
            assert_eq!(calls.load(Ordering::SeqCst), 3, "open circuit must not invoke");
            // Rejections never feed the failure record.
            assert_eq!(breaker.failure_count(), 3);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_recovery_scenario() {
        let breaker = CircuitBreaker::new("games.start", config(3, Duration::from_secs(10), FailurePolicy::Windowed));
        let calls = AtomicU32::new(0);

        for _ in 0..3 {
            let _ = fail(&breaker, &calls).await;
        }
        assert_eq!(breaker.state(), CircuitState::Open);

        advance(Duration::from_secs(1)).await;
        match succeed(&breaker, &calls).await {
            Err(CallError::ServiceUnavailable { retry_after, .. }) => {
                assert_eq!(retry_after, Duration::from_secs(9));
            }
            other => panic!("expected rejection, got {other:?}"),
        }

        advance(Duration::from_secs(10)).await;
        assert!(matches!(succeed(&breaker, &calls).await, Ok(42)));
        assert_eq!(breaker.state(), CircuitState::Closed);
        assert_eq!(breaker.failure_count(), 0);
        assert_eq!(calls.load(Ordering::SeqCst), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_trial_reopens_and_refreshes_timestamp() {
        let breaker = CircuitBreaker::new("games.start", config(1, Duration::from_secs(5), FailurePolicy::Counter));
        let calls = AtomicU32::new(0);

        let _ = fail(&breaker, &calls).await;
        let first_open = breaker.last_failure_time().unwrap();

        advance(Duration::from_secs(6)).await;
        let _ = fail(&breaker, &calls).await;
        assert_eq!(breaker.state(), CircuitState::Open);
        let reopened = breaker.last_failure_time().unwrap();
        assert_eq!(reopened.duration_since(first_open), Duration::from_secs(6));

        // Cooldown restarts from the refreshed timestamp.
        advance(Duration::from_secs(3)).await;
        assert!(matches!(succeed(&breaker, &calls).await, Err(CallError::ServiceUnavailable { .. })));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cooldown_boundary_is_exclusive() {
        let breaker = CircuitBreaker::new("op", config(1, Duration::from_secs(2), FailurePolicy::Counter));
        let calls = AtomicU32::new(0);
        let _ = fail(&breaker, &calls).await;

        advance(Duration::from_secs(2)).await;
        assert!(breaker.try_acquire().is_err());
        advance(Duration::from_millis(1)).await;
        let permit = breaker.try_acquire().expect("cooldown elapsed");
        assert!(permit.is_trial());
        permit.record(true);
        assert_eq!(breaker.state(), CircuitState::Closed);
    }

    #[tokio::test]
    async fn test_success_resets_record() {
        for policy in [FailurePolicy::Windowed, FailurePolicy::Counter] {
            let breaker = CircuitBreaker::new("op", config(3, Duration::from_secs(10), policy));
            let calls = AtomicU32::new(0);

            let _ = fail(&breaker, &calls).await;
            let _ = fail(&breaker, &calls).await;
            assert_eq!(breaker.failure_count(), 2);

            let _ = succeed(&breaker, &calls).await;
            assert_eq!(breaker.failure_count(), 0);

            // Interleaved traffic never reaches the threshold.
            let _ = fail(&breaker, &calls).await;
            let _ = fail(&breaker, &calls).await;
            assert_eq!(breaker.state(), CircuitState::Closed);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_windowed_policy_forgets_stale_failures() {
        let mut cfg = config(3, Duration::from_secs(10), FailurePolicy::Windowed);
        cfg.failure_window_ms = Some(1_000);
        let breaker = CircuitBreaker::new("op", cfg);
        let calls = AtomicU32::new(0);

        let _ = fail(&breaker, &calls).await;
        let _ = fail(&breaker, &calls).await;
        advance(Duration::from_secs(2)).await;
        let _ = fail(&breaker, &calls).await;
        assert_eq!(breaker.failure_count(), 1);
        assert_eq!(breaker.state(), CircuitState::Closed);

        let _ = fail(&breaker, &calls).await;
        let _ = fail(&breaker, &calls).await;
        assert_eq!(breaker.state(), CircuitState::Open);
    }

    #[tokio::test(start_paused = true)]
    async fn test_single_trial_in_half_open() {
        let breaker = Arc::new(CircuitBreaker::new("op", config(1, Duration::from_secs(1), FailurePolicy::Counter)));
        breaker.force_open();
        advance(Duration::from_secs(2)).await;

        let trial = breaker.try_acquire().expect("trial admitted");
        assert!(trial.is_trial());
        assert_eq!(breaker.state(), CircuitState::HalfOpen);

        let concurrent = breaker.try_acquire();
        assert!(matches!(concurrent, Err(BreakerOpen { retry_after, .. }) if retry_after == Duration::ZERO));

        trial.record(true);
        assert_eq!(breaker.state(), CircuitState::Closed);
        assert!(breaker.try_acquire().is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn test_dropped_trial_releases_slot() {
        let breaker = CircuitBreaker::new("op", config(1, Duration::from_secs(1), FailurePolicy::Counter));
        breaker.force_open();
        advance(Duration::from_secs(2)).await;

        drop(breaker.try_acquire().expect("trial admitted"));
        assert_eq!(breaker.state(), CircuitState::HalfOpen);

        let next = breaker.try_acquire().expect("slot released");
        assert!(next.is_trial());
        next.record(false);
        assert_eq!(breaker.state(), CircuitState::Open);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stale_results_do_not_move_state() {
        let breaker = CircuitBreaker::new("op", config(1, Duration::from_secs(1), FailurePolicy::Counter));
        let slow = breaker.try_acquire().expect("closed admits");

        breaker.force_open();
        advance(Duration::from_secs(2)).await;
        let trial = breaker.try_acquire().expect("trial admitted");

        // A success admitted while closed must not close a half-open circuit.
        slow.record(true);
        assert_eq!(breaker.state(), CircuitState::HalfOpen);

        trial.record(false);
        assert_eq!(breaker.state(), CircuitState::Open);
    }

    #[tokio::test]
    async fn test_force_operations_and_snapshot() {
        let breaker = CircuitBreaker::new("op", config(2, Duration::from_secs(30), FailurePolicy::Windowed));

        breaker.force_open();
        let snap = breaker.snapshot();
        assert_eq!(snap.state, CircuitState::Open);
        assert!(snap.retry_after_ms.unwrap() <= 30_000);
        assert!(breaker.try_acquire().is_err());
        assert_eq!(breaker.snapshot().rejections, 1);

        breaker.force_closed();
        let snap = breaker.snapshot();
        assert_eq!(snap.state, CircuitState::Closed);
        assert_eq!(snap.retry_after_ms, None);
        assert_eq!(snap.recorded_failures, 0);
    }
}
