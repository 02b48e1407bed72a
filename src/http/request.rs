//! Request model shared by the server and client.
//!
//! Server-side, the session fills in the parsed fields (`path`, `params`,
//! `matches`, `ranges`, `files`, `remote_addr`). Client-side, callers set
//! the method, target, headers and body, and optionally a streaming body,
//! a content receiver and a progress callback.

use std::fmt;
use std::net::SocketAddr;

use crate::http::codec;
use crate::http::content::{
    boundary_from_content_type, ChunkedContentProvider, Content, ContentProvider, ContentReceiver,
    MultipartFormData, Progress,
};
use crate::http::headers::Headers;
use crate::http::types::{ByteRange, Method, Version};

/// Redirect budget a fresh request starts with.
pub const DEFAULT_REDIRECT_BUDGET: usize = 20;

/// Regex capture groups of the matched route; index 0 is the whole path.
pub type Captures = Vec<Option<String>>;

/// Ordered multimap of query or form parameters. Keys are case-sensitive.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Params {
    entries: Vec<(String, String)>,
}

impl Params {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.entries.push((key.into(), value.into()));
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries.iter().find(|(k, _)| k == key).map(|(_, v)| v.as_str())
    }

    pub fn get_all<'a>(&'a self, key: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.entries.iter().filter(move |(k, _)| k == key).map(|(_, v)| v.as_str())
    }

    pub fn count(&self, key: &str) -> usize {
        self.get_all(key).count()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.iter().any(|(k, _)| k == key)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Params {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut params = Params::new();
        for (k, v) in iter {
            params.append(k, v);
        }
        params
    }
}

/// An HTTP request.
pub struct Request {
    pub method: Method,
    /// Request-target exactly as received or as given to [`Request::new`].
    pub target: String,
    /// Target without the query string.
    pub path: String,
    pub version: Version,
    pub params: Params,
    pub headers: Headers,
    pub body: Vec<u8>,
    pub remote_addr: Option<SocketAddr>,
    pub matches: Captures,
    pub ranges: Vec<ByteRange>,
    /// Parts of a buffered `multipart/form-data` body.
    pub files: Vec<MultipartFormData>,
    /// Redirects the client may still follow for this request.
    pub redirect_count: usize,
    /// Streaming body, used instead of `body` when set.
    pub content: Option<Content>,
    /// Client only: receives the response body instead of buffering it.
    pub content_receiver: Option<ContentReceiver>,
    /// Client only: download progress callback.
    pub progress: Option<Progress>,
}

impl Request {
    /// Build a request for `target`, splitting off and decoding its query.
    pub fn new(method: Method, target: impl Into<String>) -> Self {
        let target = target.into();
        let (path, params) = match target.split_once('?') {
            Some((path, query)) => (path.to_string(), codec::parse_query(query)),
            None => (target.clone(), Params::new()),
        };
        Self {
            method,
            target,
            path,
            version: Version::Http11,
            params,
            headers: Headers::new(),
            body: Vec::new(),
            remote_addr: None,
            matches: Vec::new(),
            ranges: Vec::new(),
            files: Vec::new(),
            redirect_count: DEFAULT_REDIRECT_BUDGET,
            content: None,
            content_receiver: None,
            progress: None,
        }
    }

    /// Path plus re-encoded query parameters.
    pub fn request_target(&self) -> String {
        if self.params.is_empty() {
            self.path.clone()
        } else {
            format!("{}?{}", self.path, codec::encode_query(&self.params))
        }
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

    pub fn has_param(&self, key: &str) -> bool {
        self.params.contains(key)
    }

    pub fn param_value(&self, key: &str) -> Option<&str> {
        self.params.get(key)
    }

    /// Capture group `index` of the route that matched this request.
    pub fn capture(&self, index: usize) -> Option<&str> {
        self.matches.get(index).and_then(|m| m.as_deref())
    }

    pub fn is_multipart_form_data(&self) -> bool {
        self.header_value("Content-Type")
            .and_then(boundary_from_content_type)
            .is_some()
    }

    pub fn has_file(&self, name: &str) -> bool {
        self.files.iter().any(|f| f.name == name)
    }

    pub fn file(&self, name: &str) -> Option<&MultipartFormData> {
        self.files.iter().find(|f| f.name == name)
    }

    /// Builder: add a header.
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.append(name, value);
        self
    }

    /// Builder: set a buffered body and its content type.
    pub fn with_body(mut self, body: impl Into<Vec<u8>>, content_type: &str) -> Self {
        self.body = body.into();
        if !content_type.is_empty() {
            self.headers.set("Content-Type", content_type);
        }
        self
    }

    /// Stream a body of known `length` from `provider`.
    pub fn set_content_provider<P>(&mut self, length: u64, content_type: &str, provider: P)
    where
        P: FnMut(u64, u64, &mut crate::http::content::DataSink) -> bool + Send + Sync + 'static,
    {
        let provider: ContentProvider = Box::new(provider);
        self.content = Some(Content::Sized {
            offset: 0,
            length,
            provider,
        });
        if !content_type.is_empty() {
            self.headers.set("Content-Type", content_type);
        }
    }

    /// Stream a chunked body of unknown length from `provider`.
    pub fn set_chunked_content_provider<P>(&mut self, content_type: &str, provider: P)
    where
        P: FnMut(u64, &mut crate::http::content::DataSink) -> bool + Send + Sync + 'static,
    {
        let provider: ChunkedContentProvider = Box::new(provider);
        self.content = Some(Content::Chunked(provider));
        if !content_type.is_empty() {
            self.headers.set("Content-Type", content_type);
        }
    }

    /// Client: deliver the response body to `receiver` instead of buffering.
    pub fn set_content_receiver<R>(&mut self, receiver: R)
    where
        R: FnMut(&[u8]) -> bool + Send + Sync + 'static,
    {
        self.content_receiver = Some(Box::new(receiver));
    }

    /// Client: observe download progress as `(received, total)`.
    pub fn set_progress<P>(&mut self, progress: P)
    where
        P: FnMut(u64, u64) -> bool + Send + Sync + 'static,
    {
        self.progress = Some(Box::new(progress));
    }

    /// True if the peer asked to close after this exchange.
    pub fn wants_close(&self) -> bool {
        match self.version {
            Version::Http10 => !self.headers.has_token("Connection", "keep-alive"),
            Version::Http11 => self.headers.has_token("Connection", "close"),
        }
    }
}

impl fmt::Debug for Request {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Request")
            .field("method", &self.method)
            .field("target", &self.target)
            .field("version", &self.version)
            .field("headers", &self.headers)
            .field("body_len", &self.body.len())
            .field("remote_addr", &self.remote_addr)
            .field("matches", &self.matches)
            .field("redirect_count", &self.redirect_count)
            .field("content", &self.content)
            .finish_non_exhaustive()
    }
}
