//! Rate limiting middleware.
//!
//! Fixed windows per client IP: the first request from a client opens a
//! window, and at most `max_requests` are admitted until it ends.

use std::collections::HashMap;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;

use axum::{
    body::Body,
    extract::{ConnectInfo, State},
    http::Request,
    middleware::Next,
    response::{IntoResponse, Response},
};
use parking_lot::Mutex;
use tokio::time::Instant;

use crate::config::RateLimitConfig;
use crate::http::response::ApiError;
use crate::observability::metrics;

/// Expired windows are swept once this many clients are tracked.
const SWEEP_AT: usize = 4096;

#[derive(Debug)]
struct Window {
    started: Instant,
    count: u32,
}

/// Per-client fixed-window request counter.
#[derive(Debug)]
pub struct RateLimiter {
    windows: Mutex<HashMap<IpAddr, Window>>,
    max_requests: u32,
    window: Duration,
}

impl RateLimiter {
    pub fn new(config: &RateLimitConfig) -> Self {
        Self {
            windows: Mutex::new(HashMap::new()),
            max_requests: config.max_requests,
            window: config.window(),
        }
    }

    /// Count one request from `client`. Returns how long until its window
    /// ends when the budget is spent.
    pub fn check(&self, client: IpAddr) -> Result<(), Duration> {
        let now = Instant::now();
        let mut windows = self.windows.lock();

        if windows.len() >= SWEEP_AT {
            windows.retain(|_, w| now.duration_since(w.started) < self.window);
        }

        let window = windows.entry(client).or_insert(Window { started: now, count: 0 });
        if now.duration_since(window.started) >= self.window {
            *window = Window { started: now, count: 0 };
        }

        if window.count < self.max_requests {
            window.count += 1;
            Ok(())
        } else {
            Err(self.window.saturating_sub(now.duration_since(window.started)))
        }
    }

    pub fn tracked_clients(&self) -> usize {
        self.windows.lock().len()
    }
}

/// Middleware function for per-IP rate limiting.
///
/// Requests without a peer address (in-process routers) are not limited.
pub async fn rate_limit_middleware(
    State(limiter): State<Arc<RateLimiter>>,
    request: Request<Body>,
    next: Next,
) -> Response {
    let client = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip());

    let Some(client) = client else {
        return next.run(request).await;
    };

    match limiter.check(client) {
        Ok(()) => next.run(request).await,
        Err(retry_after) => {
            tracing::warn!(client = %client, path = %request.uri().path(), "Rate limit exceeded");
            metrics::record_rate_limited();
            ApiError::too_many_requests(retry_after).into_response()
        }
    }
}
