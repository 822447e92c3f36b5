//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Create Axum Router with all handlers
//! - Wire up middleware (request ID, tracing, request timeout, rate limit)
//! - Bind server to listener and stop on the shutdown signal

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    http::StatusCode,
    middleware,
    routing::{get, post},
    Router,
};
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::{timeout::TimeoutLayer, trace::TraceLayer};

use crate::admin::setup_admin_router;
use crate::config::GatewayConfig;
use crate::http::handlers::{create_with_game, publish_room_message};
use crate::http::request::{make_request_span, propagate_request_id_layer, set_request_id_layer};
use crate::http::websocket::ws_handler;
use crate::lifecycle::Shutdown;
use crate::realtime::RoomBroadcaster;
use crate::resilience::OperationGuard;
use crate::security::{rate_limit_middleware, RateLimiter};
use crate::services::{GameSessions, UserDirectory};

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub guard: OperationGuard,
    pub rooms: Arc<RoomBroadcaster<Arc<str>>>,
    pub users: Arc<dyn UserDirectory>,
    pub games: Arc<dyn GameSessions>,
    pub config: Arc<GatewayConfig>,
    pub shutdown: Shutdown,
}

impl AppState {
    pub fn new(
        config: GatewayConfig,
        users: Arc<dyn UserDirectory>,
        games: Arc<dyn GameSessions>,
        shutdown: Shutdown,
    ) -> Self {
        Self {
            guard: OperationGuard::new(config.resilience.clone()),
            rooms: Arc::new(RoomBroadcaster::new()),
            users,
            games,
            config: Arc::new(config),
            shutdown,
        }
    }
}

/// HTTP and WebSocket front of the gateway.
pub struct GatewayServer {
    router: Router,
    state: AppState,
}

impl GatewayServer {
    pub fn new(state: AppState) -> Self {
        let router = Self::build_router(state.clone());
        Self { router, state }
    }

    /// Build the Axum router with all middleware layers.
    fn build_router(state: AppState) -> Router {
        let request_timeout = Duration::from_secs(state.config.listener.request_timeout_secs);

        let mut api = Router::new()
            .route("/users/create_with_game", post(create_with_game))
            .route("/rooms/{room}/messages", post(publish_room_message))
            .layer(TimeoutLayer::with_status_code(StatusCode::REQUEST_TIMEOUT, request_timeout));

        let limits = &state.config.rate_limit;
        if limits.enabled {
            let limiter = Arc::new(RateLimiter::new(limits));
            api = api.layer(middleware::from_fn_with_state(limiter, rate_limit_middleware));
        }

        Router::new()
            .merge(setup_admin_router())
            .merge(api)
            .route("/ws", get(ws_handler))
            .with_state(state)
            .layer(
                ServiceBuilder::new()
                    .layer(set_request_id_layer())
                    .layer(propagate_request_id_layer())
                    .layer(TraceLayer::new_for_http().make_span_with(make_request_span)),
            )
    }

    pub fn state(&self) -> &AppState {
        &self.state
    }

    /// Router without a listener, for in-process use.
    pub fn router(&self) -> Router {
        self.router.clone()
    }

    /// Serve until the shutdown coordinator fires.
    pub async fn run(self, listener: TcpListener) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(address = %addr, "HTTP server starting");

        let mut shutdown = self.state.shutdown.subscribe();
        let app = self.router.into_make_service_with_connect_info::<SocketAddr>();
        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = shutdown.recv().await;
            })
            .await?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }
}
