//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! Sessions, pool, client:
//!     → tracing events with connection/session/request ids
//!     → metrics.rs (counters, histograms)
//!
//! Consumers:
//!     → logging.rs subscriber (stdout)
//!     → Prometheus scrape endpoint
//! ```
//!
//! # Design Decisions
//! - Library code only emits; the binary decides where output goes
//! - Request ID (`X-Request-Id` or a fresh UUID) is attached to every
//!   exchange's log events

pub mod logging;
pub mod metrics;
