//! Async HTTP/1.1 server and client engine.
//!
//! The server accepts connections, runs each one as a keep-alive
//! [`Session`](http::Session) drawn from a recycling pool, and dispatches
//! requests through a hot-swappable route table. The client speaks the
//! same wire format with keep-alive, redirects, proxies and auth.

// Core subsystems
pub mod config;
pub mod error;
pub mod http;
pub mod net;
pub mod pool;
pub mod routing;

// Cross-cutting concerns
pub mod lifecycle;
pub mod observability;
pub mod resilience;
pub mod security;

pub use config::EngineConfig;
pub use error::HttpError;
pub use http::{Client, Headers, Method, Request, Response, Server, StatusCode};
pub use lifecycle::Shutdown;
