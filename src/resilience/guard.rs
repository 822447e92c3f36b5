//! Guarded operation invocation.
//!
//! `OperationGuard::call(operation, work)` is the single entry point used by
//! the service layer: the operation's breaker decides whether the work may
//! run, and a per-call deadline bounds how long it may run. A deadline miss
//! counts as a failure for the breaker; a rejection does not.
//!
//! `call_idempotent` also retries transient failures under the same permit
//! before the breaker hears about the outcome.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use crate::config::{DeadlinePolicy, ResilienceConfig};
use crate::observability::metrics;
use crate::resilience::circuit_breaker::BreakerSnapshot;
use crate::resilience::outcome::CallOutcome;
use crate::resilience::registry::BreakerRegistry;
use crate::resilience::retries::{RetryPolicy, Transient};
use crate::resilience::timeouts::DeadlineGuard;

/// Breaker + deadline composition shared by all request handlers.
#[derive(Debug, Clone)]
pub struct OperationGuard {
    registry: Arc<BreakerRegistry>,
    policy: DeadlinePolicy,
}

impl OperationGuard {
    pub fn new(config: ResilienceConfig) -> Self {
        let policy = config.deadline_policy;
        Self {
            registry: Arc::new(BreakerRegistry::new(config)),
            policy,
        }
    }

    pub fn registry(&self) -> &BreakerRegistry {
        &self.registry
    }

    pub fn snapshots(&self) -> Vec<BreakerSnapshot> {
        self.registry.snapshots()
    }

    /// Run `work` as `operation` with the operation's configured deadline.
    pub async fn call<T, E, Fut>(&self, operation: &str, work: Fut) -> CallOutcome<T, E>
    where
        Fut: Future<Output = Result<T, E>> + Send + 'static,
        T: Send + 'static,
        E: Send + 'static,
    {
        let timeout = self.registry.config().timeout_for(operation);
        self.call_with_timeout(operation, timeout, work).await
    }

    /// Run `work` as `operation` with an explicit deadline.
    pub async fn call_with_timeout<T, E, Fut>(
        &self,
        operation: &str,
        timeout: Duration,
        work: Fut,
    ) -> CallOutcome<T, E>
    where
        Fut: Future<Output = Result<T, E>> + Send + 'static,
        T: Send + 'static,
        E: Send + 'static,
    {
        let breaker = self.registry.get(operation);
        let permit = match breaker.try_acquire() {
            Ok(permit) => permit,
            Err(open) => {
                metrics::record_call(operation, "service_unavailable");
                return Err(open.into());
            }
        };

        let result = DeadlineGuard::new(timeout, self.policy).run(work).await;
        permit.record(result.is_ok());
        observe(operation, &result);
        result
    }

    /// Run an idempotent call as `operation`, rebuilding the work with
    /// `make_work` for each retry of a transient failure. Each attempt gets
    /// the full deadline.
    pub async fn call_idempotent<T, E, F, Fut>(&self, operation: &str, mut make_work: F) -> CallOutcome<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
        T: Send + 'static,
        E: Transient + Send + 'static,
    {
        let config = self.registry.config();
        let timeout = config.timeout_for(operation);
        let retry = RetryPolicy::new(config.retry_for(operation));

        let breaker = self.registry.get(operation);
        let permit = match breaker.try_acquire() {
            Ok(permit) => permit,
            Err(open) => {
                metrics::record_call(operation, "service_unavailable");
                return Err(open.into());
            }
        };

        let mut retries = 0;
        let result = loop {
            let result = DeadlineGuard::new(timeout, self.policy).run(make_work()).await;
            if !matches!(&result, Err(e) if retry.should_retry(retries, e)) {
                break result;
            }
            retries += 1;
            let delay = retry.delay(retries);
            tracing::debug!(
                operation,
                retry = retries,
                max_retries = retry.max_retries(),
                delay_ms = delay.as_millis() as u64,
                "Retrying transient failure"
            );
            metrics::record_retry(operation);
            tokio::time::sleep(delay).await;
        };

        if result.is_err() && retries > 0 {
            tracing::warn!(operation, retries, "Retries exhausted");
        }
        permit.record(result.is_ok());
        observe(operation, &result);
        result
    }
}

fn observe<T, E>(operation: &str, result: &CallOutcome<T, E>) {
    match result {
        Ok(_) => metrics::record_call(operation, "success"),
        Err(e) => {
            tracing::warn!(operation, outcome = e.kind(), "Guarded call did not succeed");
            metrics::record_call(operation, e.kind());
        }
    }
}
