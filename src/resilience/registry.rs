//! One circuit breaker per logical operation.
//!
//! Breakers are created lazily the first time an operation name is seen,
//! using the defaults plus any per-operation override. Unrelated operations
//! never share a breaker, so a failing endpoint cannot trip a healthy one.

use std::sync::Arc;

use dashmap::DashMap;

use crate::config::ResilienceConfig;
use crate::resilience::circuit_breaker::{BreakerSnapshot, CircuitBreaker};

#[derive(Debug)]
pub struct BreakerRegistry {
    breakers: DashMap<String, Arc<CircuitBreaker>>,
    config: ResilienceConfig,
}

impl BreakerRegistry {
    pub fn new(config: ResilienceConfig) -> Self {
        Self {
            breakers: DashMap::new(),
            config,
        }
    }

    /// Breaker for `operation`, created on first use.
    pub fn get(&self, operation: &str) -> Arc<CircuitBreaker> {
        if let Some(existing) = self.breakers.get(operation) {
            return existing.clone();
        }
        self.breakers
            .entry(operation.to_string())
            .or_insert_with(|| {
                Arc::new(CircuitBreaker::new(
                    operation,
                    self.config.breaker_for(operation),
                ))
            })
            .clone()
    }

    /// Breaker for `operation` if one was already created.
    pub fn find(&self, operation: &str) -> Option<Arc<CircuitBreaker>> {
        self.breakers.get(operation).map(|b| b.clone())
    }

    pub fn len(&self) -> usize {
        self.breakers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.breakers.is_empty()
    }

    /// Snapshots of every breaker, sorted by name.
    pub fn snapshots(&self) -> Vec<BreakerSnapshot> {
        let mut all: Vec<_> = self.breakers.iter().map(|b| b.snapshot()).collect();
        all.sort_by(|a, b| a.name.cmp(&b.name));
        all
    }

    pub fn config(&self) -> &ResilienceConfig {
        &self.config
    }
}
