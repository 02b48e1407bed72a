//! Pooling subsystem.
//!
//! # Data Flow
//! ```text
//! Accepted connection
//!     → session_pool.rs (pop idle session or create, bind route table)
//!     → session runs exchanges until close
//!     → guard drop returns session to the idle queue
//!
//! Reactor selection:
//!     round_robin.rs rotates accepted sockets across reactor threads
//! ```
//!
//! # Design Decisions
//! - Session objects outlive connections so their buffers are reused
//! - Shared state is limited to the idle queue and the rotation counter

pub mod round_robin;
pub mod session_pool;

pub use round_robin::RoundRobin;
pub use session_pool::{PoolStats, PooledSession, SessionPool};
