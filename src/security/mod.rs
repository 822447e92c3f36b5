//! Security subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming API request:
//!     → rate_limit.rs (per-IP request budget)
//!     → Pass to routing
//! ```
//!
//! # Design Decisions
//! - Only the API routes are limited; status, admin and WebSocket upgrades
//!   are not

pub mod rate_limit;

pub use rate_limit::{rate_limit_middleware, RateLimiter};
