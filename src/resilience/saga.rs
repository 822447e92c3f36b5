//! Saga coordination with compensating rollback.
//!
//! # Responsibilities
//! - Run named steps strictly in the order they were added
//! - On the first failing step, compensate every completed step in reverse
//!   completion order; the failing step itself is not compensated
//! - Report the original failure, naming the step, with a record of which
//!   compensations ran and which failed
//!
//! # Design Decisions
//! - A saga is an owned value consumed by `execute`; it is never shared
//! - Compensation failures are logged and collected, never surfaced as the
//!   saga's error, and never stop the remaining rollback
//! - Steps share data through whatever they capture (e.g. `Arc<OnceLock<_>>`);
//!   the coordinator only sees success or failure

use std::future::Future;

use futures_util::future::BoxFuture;
use serde::Serialize;
use tracing::{debug, error, info};

use crate::observability::metrics;

/// Error type carried by step actions.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

type Action<'a> = Box<dyn FnOnce() -> BoxFuture<'a, Result<(), BoxError>> + Send + 'a>;

fn boxed<'a, F, Fut, E>(action: F) -> Action<'a>
where
    F: FnOnce() -> Fut + Send + 'a,
    Fut: Future<Output = Result<(), E>> + Send + 'a,
    E: Into<BoxError> + 'a,
{
    Box::new(move || -> BoxFuture<'a, Result<(), BoxError>> {
        Box::pin(async move { action().await.map_err(Into::into) })
    })
}

struct SagaStep<'a> {
    name: String,
    forward: Action<'a>,
    compensate: Action<'a>,
}

/// A compensation that failed during rollback.
#[derive(Debug, Clone, Serialize)]
pub struct CompensationFailure {
    pub step: String,
    pub message: String,
}

/// What happened during rollback, in the order it happened.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RollbackReport {
    /// Steps whose compensation succeeded.
    pub compensated: Vec<String>,
    /// Steps whose compensation failed.
    pub failed: Vec<CompensationFailure>,
}

impl RollbackReport {
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty()
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SagaError {
    /// A forward action failed; rollback has already run.
    #[error("saga '{saga}' failed at step '{step}': {source}")]
    StepFailed {
        saga: String,
        step: String,
        index: usize,
        source: BoxError,
        rollback: RollbackReport,
    },
}

impl SagaError {
    /// Name of the step whose forward action failed.
    pub fn step(&self) -> &str {
        match self {
            SagaError::StepFailed { step, .. } => step,
        }
    }

    /// The original failure.
    pub fn cause(&self) -> &(dyn std::error::Error + Send + Sync + 'static) {
        match self {
            SagaError::StepFailed { source, .. } => source.as_ref(),
        }
    }

    pub fn rollback(&self) -> &RollbackReport {
        match self {
            SagaError::StepFailed { rollback, .. } => rollback,
        }
    }
}

/// Ordered steps with paired compensations, run once.
pub struct Saga<'a> {
    name: String,
    steps: Vec<SagaStep<'a>>,
}

impl<'a> Saga<'a> {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            steps: Vec::new(),
        }
    }

    /// Append a step with its compensating action.
    pub fn add_step<F, FFut, FE, C, CFut, CE>(
        &mut self,
        name: impl Into<String>,
        forward: F,
        compensate: C,
    ) -> &mut Self
    where
        F: FnOnce() -> FFut + Send + 'a,
        FFut: Future<Output = Result<(), FE>> + Send + 'a,
        FE: Into<BoxError> + 'a,
        C: FnOnce() -> CFut + Send + 'a,
        CFut: Future<Output = Result<(), CE>> + Send + 'a,
        CE: Into<BoxError> + 'a,
    {
        self.steps.push(SagaStep {
            name: name.into(),
            forward: boxed(forward),
            compensate: boxed(compensate),
        });
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Run every step. On failure, roll back and return the original cause.
    pub async fn execute(self) -> Result<(), SagaError> {
        let saga = self.name;
        let mut completed: Vec<(String, Action<'a>)> = Vec::with_capacity(self.steps.len());

        for (index, step) in self.steps.into_iter().enumerate() {
            debug!(saga = %saga, step = %step.name, index, "Running saga step");
            match (step.forward)().await {
                Ok(()) => completed.push((step.name, step.compensate)),
                Err(source) => {
                    error!(
                        saga = %saga,
                        step = %step.name,
                        error = %source,
                        to_compensate = completed.len(),
                        "Saga step failed; rolling back"
                    );
                    let rollback = rollback(&saga, completed).await;
                    metrics::record_saga(&saga, "rolled_back");
                    return Err(SagaError::StepFailed {
                        saga,
                        step: step.name,
                        index,
                        source,
                        rollback,
                    });
                }
            }
        }

        info!(saga = %saga, steps = completed.len(), "Saga completed");
        metrics::record_saga(&saga, "completed");
        Ok(())
    }
}

async fn rollback(saga: &str, completed: Vec<(String, Action<'_>)>) -> RollbackReport {
    let mut report = RollbackReport::default();
    for (step, compensate) in completed.into_iter().rev() {
        match compensate().await {
            Ok(()) => {
                info!(saga, step = %step, "Compensation step completed");
                report.compensated.push(step);
            }
            Err(e) => {
                error!(saga, step = %step, error = %e, "Compensation step failed");
                metrics::record_compensation_failure(saga, &step);
                report.failed.push(CompensationFailure {
                    step,
                    message: e.to_string(),
                });
            }
        }
    }
    report
}
