//! Response model.
//!
//! A response carries either a buffered `body` or a content provider that
//! the session drives after the head is written. An optional resource
//! releaser runs exactly once when the response is dropped, whether the
//! body was fully sent, aborted, or never sent at all.

use std::fmt;

use crate::http::content::{ChunkedContentProvider, Content, ContentProvider, DataSink};
use crate::http::headers::Headers;
use crate::http::types::{StatusCode, Version};

/// Cleanup hook run when the response is dropped.
pub type ResourceReleaser = Box<dyn FnOnce() + Send>;

/// An HTTP response.
pub struct Response {
    pub version: Version,
    pub status: StatusCode,
    /// Custom reason phrase; the canonical one is used when `None`.
    pub reason: Option<String>,
    pub headers: Headers,
    pub body: Vec<u8>,
    /// Client only: final URL after following redirects.
    pub location: String,
    content: Option<Content>,
    releaser: Option<ResourceReleaser>,
}

impl Response {
    pub fn new() -> Self {
        Self::with_status(StatusCode::OK)
    }

    pub fn with_status(status: StatusCode) -> Self {
        Self {
            version: Version::Http11,
            status,
            reason: None,
            headers: Headers::new(),
            body: Vec::new(),
            location: String::new(),
            content: None,
            releaser: None,
        }
    }

    pub fn reason_phrase(&self) -> &str {
        self.reason.as_deref().unwrap_or_else(|| self.status.reason())
    }

    pub fn has_header(&self, name: &str) -> bool {
        self.headers.contains(name)
    }

    pub fn header_value(&self, name: &str) -> Option<&str> {
        self.headers.get(name)
    }

    pub fn set_header(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.headers.set(name, value);
    }

    /// Set a buffered body, dropping any content provider.
    pub fn set_content(&mut self, body: impl Into<Vec<u8>>, content_type: &str) {
        self.body = body.into();
        self.content = None;
        self.headers.set("Content-Type", content_type);
    }

    /// Point the client at `url` with a 3xx status (302 if `status` isn't 3xx).
    pub fn set_redirect(&mut self, url: &str, status: StatusCode) {
        self.headers.set("Location", url);
        self.status = if status.is_redirection() {
            status
        } else {
            StatusCode::FOUND
        };
    }

    /// Stream a body of `length` bytes from `provider`.
    pub fn set_content_provider<P>(&mut self, length: u64, content_type: &str, provider: P)
    where
        P: FnMut(u64, u64, &mut DataSink) -> bool + Send + Sync + 'static,
    {
        let provider: ContentProvider = Box::new(provider);
        self.body.clear();
        self.content = Some(Content::Sized {
            offset: 0,
            length,
            provider,
        });
        self.headers.set("Content-Type", content_type);
    }

    /// Stream a body of unknown length with chunked transfer coding.
    pub fn set_chunked_content_provider<P>(&mut self, content_type: &str, provider: P)
    where
        P: FnMut(u64, &mut DataSink) -> bool + Send + Sync + 'static,
    {
        let provider: ChunkedContentProvider = Box::new(provider);
        self.body.clear();
        self.content = Some(Content::Chunked(provider));
        self.headers.set("Content-Type", content_type);
    }

    /// Register cleanup to run when this response is dropped.
    ///
    /// Replacing an existing releaser runs the old one immediately.
    pub fn set_resource_releaser<R>(&mut self, releaser: R)
    where
        R: FnOnce() + Send + 'static,
    {
        if let Some(previous) = self.releaser.replace(Box::new(releaser)) {
            previous();
        }
    }

    pub fn has_content_provider(&self) -> bool {
        self.content.is_some()
    }

    /// True if there is nothing to send: no buffered bytes and no provider.
    pub fn is_body_empty(&self) -> bool {
        self.body.is_empty() && self.content.is_none()
    }

    pub(crate) fn content(&self) -> Option<&Content> {
        self.content.as_ref()
    }

    pub(crate) fn content_mut(&mut self) -> Option<&mut Content> {
        self.content.as_mut()
    }

    pub(crate) fn take_content(&mut self) -> Option<Content> {
        self.content.take()
    }

    /// Body as text, lossily decoded.
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

impl Default for Response {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for Response {
    fn drop(&mut self) {
        if let Some(release) = self.releaser.take() {
            release();
        }
    }
}

impl fmt::Debug for Response {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Response")
            .field("version", &self.version)
            .field("status", &self.status)
            .field("headers", &self.headers)
            .field("body_len", &self.body.len())
            .field("content", &self.content)
            .field("has_releaser", &self.releaser.is_some())
            .finish()
    }
}
