//! Error-to-response mapping.
//!
//! # Responsibilities
//! - Map guarded-call outcomes to status codes clients can act on
//! - Describe saga failures: failing step, cause, what was rolled back
//!
//! # Design Decisions
//! - Open circuit → 503 with `Retry-After` (whole seconds, rounded up)
//! - Rate limited → 429 with `Retry-After`
//! - A workflow task that dies without an answer → 500
//! - Deadline exceeded → 504; downstream failure → 502
//! - A saga failure keeps the status of its cause when the cause was a
//!   guarded call, otherwise 500

use std::fmt;
use std::time::Duration;

use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::{json, Value};
use tokio::task::JoinError;

use crate::resilience::CallError;
use crate::services::{ClientError, WorkflowError};

/// JSON error response.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    body: Value,
    retry_after: Option<Duration>,
}

impl ApiError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            body: json!({ "error": message.into() }),
            retry_after: None,
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, message)
    }

    pub fn too_many_requests(retry_after: Duration) -> Self {
        let mut api = Self::new(
            StatusCode::TOO_MANY_REQUESTS,
            "Too many requests, please try again later.",
        );
        api.retry_after = Some(retry_after);
        api
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    fn with_field(mut self, key: &str, value: Value) -> Self {
        if let Value::Object(map) = &mut self.body {
            map.insert(key.to_string(), value);
        }
        self
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let mut response = (self.status, Json(self.body)).into_response();
        if let Some(after) = self.retry_after {
            let secs = after.as_millis().div_ceil(1000).max(1);
            if let Ok(value) = HeaderValue::from_str(&secs.to_string()) {
                response.headers_mut().insert(header::RETRY_AFTER, value);
            }
        }
        response
    }
}

fn status_for<E>(err: &CallError<E>) -> StatusCode {
    match err {
        CallError::ServiceUnavailable { .. } => StatusCode::SERVICE_UNAVAILABLE,
        CallError::DeadlineExceeded { .. } => StatusCode::GATEWAY_TIMEOUT,
        CallError::Interrupted => StatusCode::SERVICE_UNAVAILABLE,
        CallError::Failed(_) => StatusCode::BAD_GATEWAY,
    }
}

fn retry_after<E>(err: &CallError<E>) -> Option<Duration> {
    match err {
        CallError::ServiceUnavailable { retry_after, .. } => Some(*retry_after),
        _ => None,
    }
}

impl<E: fmt::Display> From<CallError<E>> for ApiError {
    fn from(err: CallError<E>) -> Self {
        let mut api = ApiError::new(status_for(&err), err.to_string())
            .with_field("kind", json!(err.kind()))
            .with_field("retryable", json!(err.is_retryable()));
        api.retry_after = retry_after(&err);
        api
    }
}

impl From<WorkflowError> for ApiError {
    fn from(err: WorkflowError) -> Self {
        let saga = match err {
            WorkflowError::Saga(saga) => saga,
            other => return ApiError::new(StatusCode::INTERNAL_SERVER_ERROR, other.to_string()),
        };

        let guarded = saga.cause().downcast_ref::<CallError<ClientError>>();
        let status = guarded.map(status_for).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        let rollback = saga.rollback();

        let mut api = ApiError::new(status, "Failed to create user and game session")
            .with_field("step", json!(saga.step()))
            .with_field("cause", json!(saga.cause().to_string()))
            .with_field("compensated", json!(rollback.compensated))
            .with_field("failed_compensations", json!(rollback.failed));
        if let Some(call) = guarded {
            api = api.with_field("kind", json!(call.kind()));
            api.retry_after = retry_after(call);
        }
        api
    }
}

impl From<JoinError> for ApiError {
    fn from(err: JoinError) -> Self {
        tracing::error!(error = %err, "Workflow task ended without a result");
        ApiError::new(StatusCode::INTERNAL_SERVER_ERROR, "Workflow task failed")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_open_circuit_maps_to_503_with_retry_after() {
        let err: CallError<String> = CallError::ServiceUnavailable {
            operation: "games.start".into(),
            retry_after: Duration::from_millis(1_200),
        };
        let response = ApiError::from(err).into_response();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(response.headers()[header::RETRY_AFTER], "2");
    }

    #[test]
    fn test_half_open_rejection_still_sets_retry_after() {
        let err: CallError<String> = CallError::ServiceUnavailable {
            operation: "games.start".into(),
            retry_after: Duration::ZERO,
        };
        let response = ApiError::from(err).into_response();
        assert_eq!(response.headers()[header::RETRY_AFTER], "1");
    }

    #[test]
    fn test_deadline_and_failure_statuses() {
        let timeout: CallError<String> = CallError::DeadlineExceeded {
            timeout: Duration::from_secs(5),
        };
        assert_eq!(ApiError::from(timeout).status(), StatusCode::GATEWAY_TIMEOUT);

        let failed: CallError<String> = CallError::Failed("boom".into());
        let api = ApiError::from(failed);
        assert_eq!(api.status(), StatusCode::BAD_GATEWAY);
        assert_eq!(api.body["retryable"], false);
    }

    #[test]
    fn test_rate_limit_maps_to_429() {
        let response = ApiError::too_many_requests(Duration::from_secs(240)).into_response();
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(response.headers()[header::RETRY_AFTER], "240");
    }

    #[tokio::test]
    async fn test_panicked_task_maps_to_500() {
        let join_err = tokio::spawn(async { panic!("workflow blew up") }).await.unwrap_err();
        let api = ApiError::from(join_err);
        assert_eq!(api.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(api.body["error"], "Workflow task failed");
    }
}
