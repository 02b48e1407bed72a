//! HTTP/1.1 protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! Server side:
//!     accepted socket
//!         → session.rs (read head, route, read body, run handler, write response)
//!         → codec.rs / content.rs (framing, chunking, multipart, providers)
//!         → files.rs (static mounts)
//!
//! Client side:
//!     client.rs (connect, proxy, TLS)
//!         → codec.rs / content.rs (same framing machinery as the server)
//!         → auth.rs (Basic / Digest)
//! ```
//!
//! # Design Decisions
//! - Both directions read through one `Wire` so framing rules live in one place
//! - Value types (`Request`, `Response`, `Headers`) are plain owned data

pub mod auth;
pub mod client;
pub mod codec;
pub mod content;
pub mod files;
pub mod headers;
pub mod request;
pub mod response;
pub mod server;
pub mod session;
pub mod types;
pub(crate) mod wire;

pub use client::{Client, Scheme};
pub use content::{ContentReader, DataSink, MultipartEvent, MultipartFormData};
pub use headers::Headers;
pub use request::{Params, Request};
pub use response::Response;
pub use server::{PoolHandle, RouteTable, Server};
pub use session::{Session, SessionSettings, SessionState};
pub use types::{mime, ByteRange, Method, StatusCode, Version};
