//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (thresholds > 0, timeouts > 0)
//! - Validate addresses and downstream URLs
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: GatewayConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::net::SocketAddr;

use url::Url;

use crate::config::schema::{CircuitBreakerConfig, FailurePolicy, GatewayConfig, RetryConfig};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("{field}: must be greater than zero")]
    NotPositive { field: String },

    #[error("{field}: invalid socket address '{value}'")]
    InvalidAddress { field: String, value: String },

    #[error("{field}: invalid URL '{value}': {reason}")]
    InvalidUrl {
        field: String,
        value: String,
        reason: String,
    },

    #[error("{field}: only meaningful with the windowed failure policy")]
    WindowWithoutWindowedPolicy { field: String },

    #[error("{field}: must not be empty")]
    Empty { field: String },

    #[error("{field}: must not be below {min_field}")]
    BelowMinimum { field: String, min_field: String },
}

pub fn validate_config(config: &GatewayConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    check_address(&mut errors, "listener.bind_address", &config.listener.bind_address);
    check_positive(&mut errors, "listener.request_timeout_secs", config.listener.request_timeout_secs);

    let resilience = &config.resilience;
    check_positive(&mut errors, "resilience.default_timeout_ms", resilience.default_timeout_ms);
    check_breaker(&mut errors, "resilience.breaker", &resilience.breaker);
    check_retry(&mut errors, "resilience.retry", &resilience.retry);

    if config.rate_limit.enabled {
        check_positive(&mut errors, "rate_limit.max_requests", config.rate_limit.max_requests.into());
        check_positive(&mut errors, "rate_limit.window_secs", config.rate_limit.window_secs);
    }

    let mut operations: Vec<_> = resilience.operations.iter().collect();
    operations.sort_by(|a, b| a.0.cmp(b.0));
    for (name, op) in operations {
        let prefix = format!("resilience.operations.{name}");
        if let Some(timeout) = op.timeout_ms {
            check_positive(&mut errors, &format!("{prefix}.timeout_ms"), timeout);
        }
        check_breaker(&mut errors, &prefix, &resilience.breaker_for(name));
    }

    check_url(&mut errors, "services.user_management_url", &config.services.user_management_url);
    check_url(&mut errors, "services.game_engine_url", &config.services.game_engine_url);
    check_positive(&mut errors, "services.request_timeout_ms", config.services.request_timeout_ms);

    if config.realtime.lobby_room.trim().is_empty() {
        errors.push(ValidationError::Empty {
            field: "realtime.lobby_room".into(),
        });
    }

    if config.observability.metrics_enabled {
        check_address(
            &mut errors,
            "observability.metrics_address",
            &config.observability.metrics_address,
        );
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn check_breaker(errors: &mut Vec<ValidationError>, prefix: &str, breaker: &CircuitBreakerConfig) {
    check_positive(errors, &format!("{prefix}.failure_threshold"), breaker.failure_threshold.into());
    check_positive(errors, &format!("{prefix}.recovery_timeout_ms"), breaker.recovery_timeout_ms);
    if let Some(window) = breaker.failure_window_ms {
        check_positive(errors, &format!("{prefix}.failure_window_ms"), window);
        if breaker.policy != FailurePolicy::Windowed {
            errors.push(ValidationError::WindowWithoutWindowedPolicy {
                field: format!("{prefix}.failure_window_ms"),
            });
        }
    }
}

fn check_retry(errors: &mut Vec<ValidationError>, prefix: &str, retry: &RetryConfig) {
    if retry.max_retries == 0 {
        return;
    }
    check_positive(errors, &format!("{prefix}.base_delay_ms"), retry.base_delay_ms);
    if retry.max_delay_ms < retry.base_delay_ms {
        errors.push(ValidationError::BelowMinimum {
            field: format!("{prefix}.max_delay_ms"),
            min_field: format!("{prefix}.base_delay_ms"),
        });
    }
}

fn check_positive(errors: &mut Vec<ValidationError>, field: &str, value: u64) {
    if value == 0 {
        errors.push(ValidationError::NotPositive { field: field.into() });
    }
}

fn check_address(errors: &mut Vec<ValidationError>, field: &str, value: &str) {
    if value.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::InvalidAddress {
            field: field.into(),
            value: value.into(),
        });
    }
}

fn check_url(errors: &mut Vec<ValidationError>, field: &str, value: &str) {
    let reason = match Url::parse(value) {
        Ok(url) if matches!(url.scheme(), "http" | "https") => return,
        Ok(url) => format!("unsupported scheme '{}'", url.scheme()),
        Err(e) => e.to_string(),
    };
    errors.push(ValidationError::InvalidUrl {
        field: field.into(),
        value: value.into(),
        reason,
    });
}
