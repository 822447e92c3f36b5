//! Deadline enforcement.
//!
//! # Responsibilities
//! - Bound the run time of one unit of work
//! - Report expiry as `DeadlineExceeded`, distinct from the work's own failure
//! - Apply the configured policy to work that outlives its deadline
//!
//! # Design Decisions
//! - Uses Tokio's timeout facilities: one timer per call, owned by the call's
//!   future and released on every exit path (return, expiry, panic, drop)
//! - `DeadlinePolicy::Cancel` drops the work future at expiry; it stops at its
//!   next await point and later side effects never happen
//! - `DeadlinePolicy::Detach` spawns the work as its own task; at expiry the
//!   task keeps running to completion and its result is discarded, so a
//!   write may still land after the caller saw the timeout
//! - Timed-out requests surface as 504 at the HTTP edge

use std::future::Future;
use std::time::Duration;

use tokio::time;

use crate::config::DeadlinePolicy;
use crate::resilience::outcome::{CallError, CallOutcome};

/// Per-call deadline with an explicit expiry policy.
#[derive(Debug, Clone, Copy)]
pub struct DeadlineGuard {
    timeout: Duration,
    policy: DeadlinePolicy,
}

impl DeadlineGuard {
    pub fn new(timeout: Duration, policy: DeadlinePolicy) -> Self {
        Self { timeout, policy }
    }

    /// Guard that drops the work at expiry.
    pub fn cancelling(timeout: Duration) -> Self {
        Self::new(timeout, DeadlinePolicy::Cancel)
    }

    /// Guard that abandons the work at expiry.
    pub fn detaching(timeout: Duration) -> Self {
        Self::new(timeout, DeadlinePolicy::Detach)
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn policy(&self) -> DeadlinePolicy {
        self.policy
    }

    /// Run `work` under this guard's deadline and policy.
    pub async fn run<T, E, Fut>(&self, work: Fut) -> CallOutcome<T, E>
    where
        Fut: Future<Output = Result<T, E>> + Send + 'static,
        T: Send + 'static,
        E: Send + 'static,
    {
        match self.policy {
            DeadlinePolicy::Cancel => self.run_cancelling(work).await,
            DeadlinePolicy::Detach => self.run_detached(work).await,
        }
    }

    /// Cancel policy without the `'static` bound, for borrowed work.
    pub async fn run_cancelling<T, E, Fut>(&self, work: Fut) -> CallOutcome<T, E>
    where
        Fut: Future<Output = Result<T, E>>,
    {
        match time::timeout(self.timeout, work).await {
            Ok(result) => result.map_err(CallError::Failed),
            Err(_) => {
                tracing::debug!(timeout_ms = self.timeout.as_millis() as u64, "Deadline exceeded; work dropped");
                Err(CallError::DeadlineExceeded { timeout: self.timeout })
            }
        }
    }

    async fn run_detached<T, E, Fut>(&self, work: Fut) -> CallOutcome<T, E>
    where
        Fut: Future<Output = Result<T, E>> + Send + 'static,
        T: Send + 'static,
        E: Send + 'static,
    {
        let handle = tokio::spawn(work);
        match time::timeout(self.timeout, handle).await {
            Ok(Ok(result)) => result.map_err(CallError::Failed),
            Ok(Err(join_error)) => {
                if join_error.is_panic() {
                    std::panic::resume_unwind(join_error.into_panic());
                }
                Err(CallError::Interrupted)
            }
            Err(_) => {
                // Dropping the JoinHandle detaches the task; it runs on.
                tracing::debug!(timeout_ms = self.timeout.as_millis() as u64, "Deadline exceeded; work detached");
                Err(CallError::DeadlineExceeded { timeout: self.timeout })
            }
        }
    }
}
