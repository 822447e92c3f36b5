//! Resilience subsystem.
//!
//! # Data Flow
//! ```text
//! Outbound call to a downstream service:
//!     → guard.rs (look up the operation's breaker, compose with deadline)
//!     → circuit_breaker.rs (admit, reject fast, or admit a single trial)
//!     → timeouts.rs (bound the call; cancel or detach at expiry)
//!     → retries.rs + backoff.rs (idempotent calls: repeat transient failures)
//!     → outcome.rs (success, unavailable, deadline exceeded, or failure)
//!
//! Multi-step workflow:
//!     → saga.rs (forward steps in order, compensate in reverse on failure)
//! ```
//!
//! # Design Decisions
//! - One breaker per logical operation, created lazily by registry.rs
//! - Every external call has a deadline; a miss counts as a failure
//! - Saga steps are guarded individually
//! - Only idempotent calls are retried, and only on transient failures

pub mod backoff;
pub mod circuit_breaker;
pub mod guard;
pub mod outcome;
pub mod registry;
pub mod retries;
pub mod saga;
pub mod timeouts;

pub use circuit_breaker::{BreakerSnapshot, CallPermit, CircuitBreaker, CircuitState};
pub use guard::OperationGuard;
pub use outcome::{BreakerOpen, CallError, CallOutcome};
pub use registry::BreakerRegistry;
pub use retries::{RetryPolicy, Transient};
pub use saga::{BoxError, CompensationFailure, RollbackReport, Saga, SagaError};
pub use timeouts::DeadlineGuard;
