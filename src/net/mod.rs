//! Network layer subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming TCP connection
//!     → listener.rs (bounded accept)
//!     → connection.rs (connection id, live-connection tracking)
//!     → reactor.rs (hand the socket to a reactor thread, round-robin)
//!     → tls.rs (optional TLS handshake)
//!     → transport.rs (Tcp | Tls | Buffer byte stream)
//!     → Hand off to the HTTP session
//! ```
//!
//! # Design Decisions
//! - Bounded accept queue prevents resource exhaustion
//! - Each connection tracked for graceful shutdown
//! - TLS is optional and handled transparently behind `Transport`

pub mod connection;
pub mod listener;
pub mod reactor;
pub mod tls;
pub mod transport;

pub use connection::{ConnectionGuard, ConnectionId, ConnectionTracker};
pub use listener::{ConnectionPermit, Listener, ListenerError};
pub use reactor::ReactorPool;
pub use transport::{BufferStream, Transport};
