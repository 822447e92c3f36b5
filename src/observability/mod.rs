//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! Resilience layer, rooms, HTTP handlers produce:
//!     → logging.rs (structured log events)
//!     → metrics.rs (counters, gauges)
//!
//! Consumers:
//!     → Log aggregation (stdout, JSON lines)
//!     → Metrics endpoint (Prometheus scrape)
//! ```
//!
//! # Design Decisions
//! - Structured logging (JSON) for machine parsing
//! - Request ID flows through HTTP spans
//! - Metrics are cheap (atomic increments)

pub mod logging;
pub mod metrics;
