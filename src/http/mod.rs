//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (Axum setup, middleware)
//!     → request.rs (request ID, request span)
//!     → handlers.rs (saga workflow, room publish) | websocket.rs (sessions)
//!     → response.rs (error → status code, Retry-After)
//!     → Send to client
//! ```

pub mod handlers;
pub mod request;
pub mod response;
pub mod server;
pub mod websocket;

pub use request::X_REQUEST_ID;
pub use response::ApiError;
pub use server::{AppState, GatewayServer};
pub use websocket::Envelope;
