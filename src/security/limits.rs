//! Request and connection limits.
//!
//! # Responsibilities
//! - Bound the header section size and field count
//! - Bound the request-target length
//! - Bound request body size
//!
//! # Design Decisions
//! - Limits checked before full parsing (early rejection)
//! - Oversized heads answer 400, long targets 414, oversized bodies 413

/// Parsing limits applied to every inbound message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Limits {
    /// Maximum bytes in a header section, request line included.
    pub max_header_bytes: usize,
    /// Maximum number of header fields.
    pub max_header_count: usize,
    /// Maximum request-target length.
    pub max_uri_length: usize,
    /// Maximum request body length.
    pub payload_max_length: u64,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            max_header_bytes: 8 * 1024,
            max_header_count: 100,
            max_uri_length: 8 * 1024,
            payload_max_length: 8 * 1024 * 1024,
        }
    }
}

impl Limits {
    /// Limits for reading responses on the client side: no body cap.
    pub fn unbounded_body() -> Self {
        Self {
            payload_max_length: u64::MAX,
            ..Self::default()
        }
    }
}
