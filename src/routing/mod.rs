//! Routing subsystem.
//!
//! # Data Flow
//! ```text
//! Parsed Request (method, path)
//!     → router.rs (per-method route list)
//!     → matcher.rs (anchored regex or exact path)
//!     → Return: handler + captures, or NoMatch (404)
//!
//! Route Compilation (at registration):
//!     (method, pattern, handler)
//!     → compile matcher
//!     → append to the method's list
//!     → table frozen and shared once the server starts
//! ```
//!
//! # Design Decisions
//! - Patterns compiled at registration, immutable at runtime
//! - Deterministic: same input always matches same route
//! - First match wins (registration order)

pub mod matcher;
pub mod router;

pub use router::{ContentReaderHandler, Handler, RouteHandler, RouteMatch, Router};
