//! Retry logic.
//!
//! # Responsibilities
//! - Decide whether a failed attempt may be repeated
//! - Space repeated attempts with exponential backoff plus jitter
//!
//! # Design Decisions
//! - Only idempotent calls are retried; `OperationGuard::call_idempotent`
//!   is the sole caller, and it needs a factory to rebuild the work
//! - Only transient downstream failures (5xx, connect errors) qualify;
//!   open circuits and deadline misses are returned as they are
//! - All attempts share one breaker permit, so the breaker sees a single
//!   outcome after the retries are spent

use std::time::Duration;

use crate::config::RetryConfig;
use crate::resilience::backoff::calculate_backoff;
use crate::resilience::outcome::CallError;

/// Errors that may go away if the same request is sent again.
pub trait Transient {
    fn is_transient(&self) -> bool;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    config: RetryConfig,
}

impl RetryPolicy {
    pub fn new(config: RetryConfig) -> Self {
        Self { config }
    }

    pub fn max_retries(&self) -> u32 {
        self.config.max_retries
    }

    /// Whether another attempt is allowed after `retries_done` retries
    /// ended in `error`.
    pub fn should_retry<E: Transient>(&self, retries_done: u32, error: &CallError<E>) -> bool {
        retries_done < self.config.max_retries
            && matches!(error, CallError::Failed(e) if e.is_transient())
    }

    /// Pause before retry number `retry` (1-based).
    pub fn delay(&self, retry: u32) -> Duration {
        calculate_backoff(retry, self.config.base_delay_ms, self.config.max_delay_ms)
    }
}
