//! Error types shared by the server and client pipelines.
//!
//! # Design Decisions
//! - One enum for both directions; the server maps a subset to status codes
//! - Transport failures stay distinguishable from protocol failures so the
//!   session can decide between "answer with an error" and "just close"

use std::io;

use crate::http::types::StatusCode;
use crate::net::listener::ListenerError;

/// Errors produced while reading, writing, or exchanging HTTP messages.
#[derive(Debug, thiserror::Error)]
pub enum HttpError {
    #[error("io error: {0}")]
    Io(#[from] io::Error),

    #[error("failed to connect to {addr}: {source}")]
    Connect {
        addr: String,
        #[source]
        source: io::Error,
    },

    #[error("{0} timed out")]
    Timeout(&'static str),

    #[error("malformed message: {0}")]
    Parse(String),

    #[error("request target exceeds {0} bytes")]
    UriTooLong(usize),

    #[error("unsupported protocol version: {0}")]
    VersionNotSupported(String),

    #[error("payload exceeds configured maximum")]
    PayloadTooLarge,

    #[error("requested range not satisfiable")]
    RangeNotSatisfiable,

    #[error("redirect limit exceeded")]
    TooManyRedirects,

    #[error("body transfer canceled")]
    Canceled,

    #[error("invalid url: {0}")]
    InvalidUrl(String),

    #[error("invalid route pattern {pattern:?}: {source}")]
    InvalidPattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },

    #[error("tls error: {0}")]
    Tls(String),

    #[error("proxy refused CONNECT with status {0}")]
    ProxyConnect(u16),

    #[error("connection closed by peer")]
    ConnectionClosed,

    #[error(transparent)]
    Listener(#[from] ListenerError),
}

impl HttpError {
    /// Shorthand for a [`HttpError::Parse`] with a message.
    pub fn parse(msg: impl Into<String>) -> Self {
        HttpError::Parse(msg.into())
    }

    /// Status code the server answers with when this error ends an exchange.
    ///
    /// `None` means the connection is closed without a response.
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            HttpError::Parse(_) => Some(StatusCode::BAD_REQUEST),
            HttpError::UriTooLong(_) => Some(StatusCode::URI_TOO_LONG),
            HttpError::VersionNotSupported(_) => Some(StatusCode::HTTP_VERSION_NOT_SUPPORTED),
            HttpError::PayloadTooLarge => Some(StatusCode::PAYLOAD_TOO_LARGE),
            HttpError::RangeNotSatisfiable => Some(StatusCode::RANGE_NOT_SATISFIABLE),
            _ => None,
        }
    }

    /// True for failures of the underlying socket rather than of the message.
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            HttpError::Io(_)
                | HttpError::Connect { .. }
                | HttpError::Timeout(_)
                | HttpError::ConnectionClosed
                | HttpError::Tls(_)
        )
    }
}
