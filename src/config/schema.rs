//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the gateway.
//! All types derive Serde traits for deserialization from config files.

use std::collections::HashMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Root configuration for the gateway.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct GatewayConfig {
    /// Listener configuration (bind address, request timeout).
    pub listener: ListenerConfig,

    /// Per-client request limit on the API routes.
    pub rate_limit: RateLimitConfig,

    /// Breakers, deadlines and per-operation overrides.
    pub resilience: ResilienceConfig,

    /// Downstream service locations.
    pub services: ServicesConfig,

    /// Room broadcasting settings.
    pub realtime: RealtimeConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:5000").
    pub bind_address: String,

    /// Outer HTTP request timeout in seconds. WebSocket sessions are exempt.
    pub request_timeout_secs: u64,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:5000".to_string(),
            request_timeout_secs: 30,
        }
    }
}

/// Fixed-window request limit keyed by client IP.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RateLimitConfig {
    pub enabled: bool,

    /// Requests allowed per client in one window.
    pub max_requests: u32,

    /// Window length in seconds.
    pub window_secs: u64,
}

impl RateLimitConfig {
    pub fn window(&self) -> Duration {
        Duration::from_secs(self.window_secs)
    }
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_requests: 15,
            window_secs: 300,
        }
    }
}

/// What happens to work that outlives its deadline.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DeadlinePolicy {
    /// Drop the work future at expiry; it stops at its next await point.
    #[default]
    Cancel,
    /// Leave the work running as its own task and discard its result.
    Detach,
}

/// How a breaker remembers failures.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailurePolicy {
    /// Bounded window of the most recent failure timestamps.
    #[default]
    Windowed,
    /// Plain count of consecutive failures.
    Counter,
}

/// Circuit breaker settings.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct CircuitBreakerConfig {
    /// Failures needed to open the circuit.
    pub failure_threshold: u32,

    /// Cooldown before an open circuit lets a trial through, in milliseconds.
    pub recovery_timeout_ms: u64,

    /// Failure tracking strategy.
    pub policy: FailurePolicy,

    /// Windowed policy only: failures older than this are forgotten.
    pub failure_window_ms: Option<u64>,
}

impl CircuitBreakerConfig {
    pub fn recovery_timeout(&self) -> Duration {
        Duration::from_millis(self.recovery_timeout_ms)
    }

    pub fn failure_window(&self) -> Option<Duration> {
        self.failure_window_ms.map(Duration::from_millis)
    }
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 3,
            recovery_timeout_ms: 17_000,
            policy: FailurePolicy::Windowed,
            failure_window_ms: None,
        }
    }
}

/// Retries of idempotent calls that failed with a transient error.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Extra attempts after the first one.
    pub max_retries: u32,

    /// Delay before the first retry; doubles on each further retry.
    pub base_delay_ms: u64,

    /// Upper bound for a single delay, before jitter.
    pub max_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay_ms: 100,
            max_delay_ms: 2_000,
        }
    }
}

/// Per-operation overrides. Unset fields fall back to the defaults.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct OperationConfig {
    pub timeout_ms: Option<u64>,
    pub failure_threshold: Option<u32>,
    pub recovery_timeout_ms: Option<u64>,
    pub policy: Option<FailurePolicy>,
    pub failure_window_ms: Option<u64>,
    pub max_retries: Option<u32>,
}

/// Resilience configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ResilienceConfig {
    /// Deadline applied to operations without an override, in milliseconds.
    pub default_timeout_ms: u64,

    /// What to do with work that misses its deadline.
    pub deadline_policy: DeadlinePolicy,

    /// Breaker settings for operations without an override.
    pub breaker: CircuitBreakerConfig,

    /// Retry settings for idempotent calls.
    pub retry: RetryConfig,

    /// Overrides keyed by operation name (e.g. "users.register").
    pub operations: HashMap<String, OperationConfig>,
}

impl ResilienceConfig {
    /// Deadline for `operation`.
    pub fn timeout_for(&self, operation: &str) -> Duration {
        let ms = self
            .operations
            .get(operation)
            .and_then(|o| o.timeout_ms)
            .unwrap_or(self.default_timeout_ms);
        Duration::from_millis(ms)
    }

    /// Retry settings for `operation`, overrides applied.
    pub fn retry_for(&self, operation: &str) -> RetryConfig {
        let mut config = self.retry.clone();
        if let Some(retries) = self.operations.get(operation).and_then(|o| o.max_retries) {
            config.max_retries = retries;
        }
        config
    }

    /// Breaker settings for `operation`, overrides applied.
    pub fn breaker_for(&self, operation: &str) -> CircuitBreakerConfig {
        let mut config = self.breaker.clone();
        if let Some(o) = self.operations.get(operation) {
            if let Some(threshold) = o.failure_threshold {
                config.failure_threshold = threshold;
            }
            if let Some(recovery) = o.recovery_timeout_ms {
                config.recovery_timeout_ms = recovery;
            }
            if let Some(policy) = o.policy {
                config.policy = policy;
            }
            if o.failure_window_ms.is_some() {
                config.failure_window_ms = o.failure_window_ms;
            }
        }
        config
    }
}

impl Default for ResilienceConfig {
    fn default() -> Self {
        Self {
            default_timeout_ms: 5_000,
            deadline_policy: DeadlinePolicy::Cancel,
            breaker: CircuitBreakerConfig::default(),
            retry: RetryConfig::default(),
            operations: HashMap::new(),
        }
    }
}

/// Downstream services the gateway calls directly.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ServicesConfig {
    /// Base URL of the user management service.
    pub user_management_url: String,

    /// Base URL of the game engine service.
    pub game_engine_url: String,

    /// Transport-level timeout for downstream HTTP calls, in milliseconds.
    pub request_timeout_ms: u64,
}

impl Default for ServicesConfig {
    fn default() -> Self {
        Self {
            user_management_url: "http://user_management_service:5002".to_string(),
            game_engine_url: "http://game_engine_service:5003".to_string(),
            request_timeout_ms: 10_000,
        }
    }
}

/// Real-time broadcasting configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RealtimeConfig {
    /// Room that hears about gateway-level events such as new players.
    pub lobby_room: String,
}

impl Default for RealtimeConfig {
    fn default() -> Self {
        Self {
            lobby_room: "lobby".to_string(),
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error) or a full filter directive.
    pub log_level: String,

    /// Human-readable or JSON lines.
    pub log_format: LogFormat,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: LogFormat::Pretty,
            metrics_enabled: false,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_services() {
        let config = GatewayConfig::default();
        assert_eq!(config.resilience.breaker.failure_threshold, 3);
        assert_eq!(config.resilience.breaker.recovery_timeout(), Duration::from_secs(17));
        assert_eq!(config.resilience.timeout_for("anything"), Duration::from_secs(5));
        assert_eq!(config.resilience.deadline_policy, DeadlinePolicy::Cancel);
        assert_eq!(config.resilience.retry.max_retries, 3);
        assert_eq!(config.rate_limit.max_requests, 15);
        assert_eq!(config.rate_limit.window(), Duration::from_secs(300));
    }

    #[test]
    fn test_operation_overrides() {
        let toml_src = r#"
            [resilience]
            default_timeout_ms = 2000

            [resilience.breaker]
            failure_threshold = 5
            policy = "counter"

            [resilience.operations."games.start"]
            timeout_ms = 750
            failure_threshold = 2
            policy = "windowed"
            failure_window_ms = 60000

            [resilience.operations."users.delete"]
            max_retries = 1
        "#;
        let config: GatewayConfig = toml::from_str(toml_src).unwrap();
        let resilience = &config.resilience;

        assert_eq!(resilience.timeout_for("games.start"), Duration::from_millis(750));
        assert_eq!(resilience.timeout_for("users.register"), Duration::from_secs(2));

        let games = resilience.breaker_for("games.start");
        assert_eq!(games.failure_threshold, 2);
        assert_eq!(games.policy, FailurePolicy::Windowed);
        assert_eq!(games.failure_window(), Some(Duration::from_secs(60)));
        assert_eq!(games.recovery_timeout_ms, 17_000);

        let users = resilience.breaker_for("users.register");
        assert_eq!(users.failure_threshold, 5);
        assert_eq!(users.policy, FailurePolicy::Counter);
        assert_eq!(users.failure_window(), None);

        assert_eq!(resilience.retry_for("users.delete").max_retries, 1);
        assert_eq!(resilience.retry_for("games.delete").max_retries, 3);
    }
}
