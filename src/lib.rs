//! Trivia gateway: resilience layer and real-time fan-out in front of the
//! user-management and game-engine services.

pub mod admin;
pub mod config;
pub mod http;
pub mod lifecycle;
pub mod observability;
pub mod realtime;
pub mod resilience;
pub mod security;
pub mod services;

pub use config::schema::GatewayConfig;
pub use http::{AppState, GatewayServer};
pub use lifecycle::Shutdown;
