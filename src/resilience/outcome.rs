//! Outcome of a guarded invocation.
//!
//! A guarded call resolves to `Result<T, CallError<E>>`. The error side keeps
//! control-flow outcomes (circuit open, deadline) apart from the failure of
//! the wrapped work itself, so callers always branch on the kind.

use std::time::Duration;

/// Result of a call made through a breaker and/or a deadline.
pub type CallOutcome<T, E> = Result<T, CallError<E>>;

/// Why a guarded call did not produce a value.
#[derive(Debug, thiserror::Error)]
pub enum CallError<E> {
    /// The circuit for `operation` is open; the work was not attempted.
    #[error("service unavailable: circuit open for {operation} (retry after {retry_after:?})")]
    ServiceUnavailable {
        operation: String,
        retry_after: Duration,
    },

    /// The work did not finish within `timeout`.
    #[error("deadline of {timeout:?} exceeded")]
    DeadlineExceeded { timeout: Duration },

    /// Detached work was cancelled before it could report (runtime shutdown).
    #[error("work was interrupted before completing")]
    Interrupted,

    /// The work ran and failed.
    #[error("operation failed: {0}")]
    Failed(E),
}

impl<E> CallError<E> {
    /// Whether the caller may retry later.
    ///
    /// `Failed` is not retryable at this layer: the work's own error decides.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            CallError::ServiceUnavailable { .. } | CallError::DeadlineExceeded { .. }
        )
    }

    /// Short label used for metrics and logs.
    pub fn kind(&self) -> &'static str {
        match self {
            CallError::ServiceUnavailable { .. } => "service_unavailable",
            CallError::DeadlineExceeded { .. } => "deadline_exceeded",
            CallError::Interrupted => "interrupted",
            CallError::Failed(_) => "failed",
        }
    }

    /// The work's own error, if that is what happened.
    pub fn into_failure(self) -> Option<E> {
        match self {
            CallError::Failed(e) => Some(e),
            _ => None,
        }
    }

    /// Map the work's error type, keeping control-flow outcomes intact.
    pub fn map_failure<F, O>(self, f: F) -> CallError<O>
    where
        F: FnOnce(E) -> O,
    {
        match self {
            CallError::ServiceUnavailable { operation, retry_after } => {
                CallError::ServiceUnavailable { operation, retry_after }
            }
            CallError::DeadlineExceeded { timeout } => CallError::DeadlineExceeded { timeout },
            CallError::Interrupted => CallError::Interrupted,
            CallError::Failed(e) => CallError::Failed(f(e)),
        }
    }
}

/// Rejection produced by an open breaker, before any work type is known.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("circuit open for {operation}")]
pub struct BreakerOpen {
    pub operation: String,
    pub retry_after: Duration,
}

impl<E> From<BreakerOpen> for CallError<E> {
    fn from(open: BreakerOpen) -> Self {
        CallError::ServiceUnavailable {
            operation: open.operation,
            retry_after: open.retry_after,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_kinds() {
        let open: CallError<String> = BreakerOpen {
            operation: "users.register".into(),
            retry_after: Duration::from_secs(3),
        }
        .into();
        assert!(open.is_retryable());
        assert_eq!(open.kind(), "service_unavailable");

        let late: CallError<String> = CallError::DeadlineExceeded {
            timeout: Duration::from_millis(100),
        };
        assert!(late.is_retryable());

        let failed: CallError<String> = CallError::Failed("boom".into());
        assert!(!failed.is_retryable());
        assert_eq!(failed.into_failure().as_deref(), Some("boom"));
    }

    #[test]
    fn test_map_failure_keeps_control_flow() {
        let late: CallError<u8> = CallError::DeadlineExceeded {
            timeout: Duration::from_millis(5),
        };
        let mapped = late.map_failure(|code| code.to_string());
        assert!(matches!(mapped, CallError::DeadlineExceeded { .. }));

        let failed: CallError<u8> = CallError::Failed(7);
        assert!(matches!(failed.map_failure(|c| c * 2), CallError::Failed(14)));
    }
}
