//! Timeout enforcement.
//!
//! # Responsibilities
//! - Bound every socket read, write and connect by its configured limit
//! - Report expiry as a distinct error naming the operation
//!
//! # Design Decisions
//! - Uses Tokio's timeout facilities
//! - `None` means "no limit" so callers don't branch on configuration
//! - A timed-out read or write leaves the socket in an unknown state; the
//!   caller closes it rather than retrying

use std::future::Future;
use std::io;
use std::time::Duration;

use crate::error::HttpError;

/// Await `fut`, failing with [`HttpError::Timeout`] after `limit`.
pub async fn with_timeout<F, T>(limit: Option<Duration>, op: &'static str, fut: F) -> Result<T, HttpError>
where
    F: Future<Output = io::Result<T>>,
{
    match limit {
        Some(limit) => match tokio::time::timeout(limit, fut).await {
            Ok(result) => result.map_err(HttpError::from),
            Err(_) => {
                tracing::debug!(operation = op, timeout_ms = limit.as_millis() as u64, "Operation timed out");
                Err(HttpError::Timeout(op))
            }
        },
        None => fut.await.map_err(HttpError::from),
    }
}

/// Convert a millisecond setting into an optional limit (`0` disables it).
pub fn from_millis(ms: u64) -> Option<Duration> {
    (ms > 0).then(|| Duration::from_millis(ms))
}
