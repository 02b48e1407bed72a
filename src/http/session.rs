//! Per-connection request/response state machine.
//!
//! # Responsibilities
//! - Read and parse request heads, enforce limits
//! - Dispatch to static mounts or routes, buffering or streaming the body
//! - Shield the connection from handler panics (500)
//! - Apply single byte ranges, the error handler, and connection persistence
//! - Write the response, including streamed and chunked bodies
//!
//! # Data Flow
//! ```text
//! Idle ─attach─▶ ReadingHeaders ─▶ Dispatching ─▶ ReadingBody ─▶ WritingResponse
//!                     ▲                                               │
//!                     └────────────── KeepAlive ◀─────────────────────┤
//!                                                                     ▼
//!                                                          Closing ─▶ Closed ─release─▶ Idle
//! ```
//!
//! # Design Decisions
//! - One exchange at a time per connection; bytes that arrive early stay
//!   in the session buffer for the next exchange
//! - A body the handler didn't read is drained when it is within the
//!   payload limit, otherwise the connection is closed after the response
//! - Transport failures close silently; protocol failures get a response

use std::collections::HashMap;
use std::net::SocketAddr;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};

use bytes::BytesMut;
use futures_util::FutureExt;
use tokio::io::AsyncWriteExt;
use uuid::Uuid;

use crate::error::HttpError;
use crate::http::codec::{self, BodyFraming};
use crate::http::content::{self, BodyState, Content, ContentReader};
use crate::http::files::{self, MountPoint};
use crate::http::request::Request;
use crate::http::response::Response;
use crate::http::types::{mime, Method, StatusCode};
use crate::http::wire::Wire;
use crate::net::connection::ConnectionId;
use crate::net::transport::Transport;
use crate::observability::metrics;
use crate::pool::session_pool::SessionPool;
use crate::resilience::timeouts::with_timeout;
use crate::routing::{Handler, RouteHandler, Router};
use crate::security::limits::Limits;

static SESSION_IDS: AtomicU64 = AtomicU64::new(1);

/// Decides whether a request announcing `Expect: 100-continue` may proceed.
/// Returning anything but 100 rejects it with that status.
pub type ExpectHandler = Arc<dyn Fn(&Request, &mut Response) -> StatusCode + Send + Sync>;

/// Lifecycle state of a [`Session`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    ReadingHeaders,
    Dispatching,
    ReadingBody,
    WritingResponse,
    KeepAlive,
    Closing,
    Closed,
}

/// Server behavior shared by every session.
pub struct SessionSettings {
    pub keep_alive_max_count: usize,
    pub read_timeout: Option<Duration>,
    pub write_timeout: Option<Duration>,
    /// How long a kept-alive connection may sit before its next request.
    pub idle_timeout: Option<Duration>,
    pub limits: Limits,
    pub error_handler: Handler,
    pub expect_handler: Option<ExpectHandler>,
    pub mounts: Vec<MountPoint>,
    pub mime_overrides: HashMap<String, String>,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            keep_alive_max_count: 5,
            read_timeout: Some(Duration::from_secs(5)),
            write_timeout: Some(Duration::from_secs(5)),
            idle_timeout: Some(Duration::from_secs(5)),
            limits: Limits::default(),
            error_handler: Arc::new(default_error_handler),
            expect_handler: None,
            mounts: Vec::new(),
            mime_overrides: HashMap::new(),
        }
    }
}

impl std::fmt::Debug for SessionSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionSettings")
            .field("keep_alive_max_count", &self.keep_alive_max_count)
            .field("read_timeout", &self.read_timeout)
            .field("write_timeout", &self.write_timeout)
            .field("idle_timeout", &self.idle_timeout)
            .field("limits", &self.limits)
            .field("has_expect_handler", &self.expect_handler.is_some())
            .field("mounts", &self.mounts)
            .finish_non_exhaustive()
    }
}

/// Fills an empty error response with a short plain-text description.
pub fn default_error_handler(_req: &Request, res: &mut Response) {
    let text = format!("{} {}", res.status.as_u16(), res.reason_phrase());
    res.set_content(text, "text/plain");
}

enum Next {
    KeepAlive,
    Close,
}

/// One server-side connection's worth of state, reused across connections
/// through the [`SessionPool`].
pub struct Session {
    id: u64,
    state: SessionState,
    transport: Option<Transport>,
    buf: BytesMut,
    settings: Arc<SessionSettings>,
    router: Arc<Router>,
    pool: Weak<SessionPool>,
    connection: Option<ConnectionId>,
    exchanges: usize,
}

impl Session {
    pub(crate) fn new(settings: Arc<SessionSettings>, router: Arc<Router>, pool: Weak<SessionPool>) -> Self {
        Self {
            id: SESSION_IDS.fetch_add(1, Ordering::Relaxed),
            state: SessionState::Idle,
            transport: None,
            buf: BytesMut::with_capacity(8 * 1024),
            settings,
            router,
            pool,
            connection: None,
            exchanges: 0,
        }
    }

    /// Stable identity of this session object across pool reuse.
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Exchanges completed on the current (or last) connection.
    pub fn exchanges(&self) -> usize {
        self.exchanges
    }

    pub fn has_transport(&self) -> bool {
        self.transport.is_some()
    }

    pub(crate) fn pool(&self) -> &Weak<SessionPool> {
        &self.pool
    }

    /// Bind a freshly accepted connection and the current route table.
    pub(crate) fn attach(&mut self, transport: Transport, router: Arc<Router>, connection: Option<ConnectionId>) {
        self.transport = Some(transport);
        self.router = router;
        self.connection = connection;
        self.buf.clear();
        self.exchanges = 0;
        self.state = SessionState::Idle;
    }

    /// Take the transport back out and return to a socket-less idle state.
    pub(crate) fn detach(&mut self) -> Option<Transport> {
        let transport = self.transport.take();
        self.buf.clear();
        // don't let one large request pin memory in the pool
        if self.buf.capacity() > 64 * 1024 {
            self.buf = BytesMut::with_capacity(8 * 1024);
        }
        self.connection = None;
        self.state = SessionState::Idle;
        transport
    }

    /// Serve exchanges until the connection closes.
    pub async fn run(&mut self) {
        let Some(mut transport) = self.transport.take() else {
            return;
        };
        let peer = transport.peer_addr();
        tracing::debug!(
            session_id = self.id,
            connection_id = ?self.connection.map(|c| c.to_string()),
            transport = transport.kind(),
            "Session started"
        );

        loop {
            self.state = SessionState::ReadingHeaders;
            match self.exchange(&mut transport, peer).await {
                Next::KeepAlive => self.state = SessionState::KeepAlive,
                Next::Close => break,
            }
        }

        self.state = SessionState::Closing;
        let _ = with_timeout(self.settings.write_timeout, "shutdown", transport.shutdown()).await;
        self.transport = Some(transport);
        self.state = SessionState::Closed;
        tracing::debug!(session_id = self.id, exchanges = self.exchanges, "Session closed");
    }

    async fn exchange(&mut self, transport: &mut Transport, peer: Option<SocketAddr>) -> Next {
        let settings = Arc::clone(&self.settings);
        let router = Arc::clone(&self.router);
        let head_timeout = if self.exchanges == 0 {
            settings.read_timeout
        } else {
            settings.idle_timeout.or(settings.read_timeout)
        };
        let last_allowed = self.exchanges + 1 >= settings.keep_alive_max_count;
        let mut wire = Wire::new(transport, &mut self.buf, head_timeout, settings.write_timeout);

        // 1. Request head
        let head = match wire.read_head(settings.limits.max_header_bytes).await {
            Ok(Some(head)) => head,
            Ok(None) => return Next::Close,
            Err(e) if e.is_transport() => {
                tracing::debug!(session_id = self.id, error = %e, "Connection ended while waiting for request");
                return Next::Close;
            }
            Err(e) => return reject(&mut wire, &settings, e).await,
        };
        wire.set_read_timeout(settings.read_timeout);
        let started = Instant::now();

        let mut req = match codec::parse_request_head(&head, &settings.limits) {
            Ok(req) => req,
            Err(e) => return reject(&mut wire, &settings, e).await,
        };
        req.remote_addr = peer;
        self.exchanges += 1;
        self.state = SessionState::Dispatching;

        let request_id = req
            .header_value("X-Request-Id")
            .map(str::to_string)
            .unwrap_or_else(|| Uuid::new_v4().to_string());
        let mut close = last_allowed || req.wants_close();

        let framing = match codec::request_framing(&req.headers) {
            Ok(f) => f,
            Err(e) => return reject(&mut wire, &settings, e).await,
        };
        let max = settings.limits.payload_max_length;

        let mut res = Response::new();
        let mut body_state = BodyState::Unread;
        let mut fault = false;

        // 2. Early rejections that don't need a handler
        let mut early: Option<StatusCode> = None;
        if let Some(value) = req.header_value("Range").map(str::to_string) {
            match codec::parse_ranges(&value) {
                Ok(ranges) => req.ranges = ranges,
                Err(_) => early = Some(StatusCode::RANGE_NOT_SATISFIABLE),
            }
        }
        if matches!(framing, BodyFraming::Length(n) if n > max) {
            early = Some(StatusCode::PAYLOAD_TOO_LARGE);
            close = true;
        }

        // 3. Static mounts, then routes
        let static_file = if early.is_none() && matches!(req.method, Method::Get | Method::Head) {
            files::lookup(&settings.mounts, &req.path)
        } else {
            None
        };

        if let Some(status) = early {
            res.status = status;
        } else if let Some(path) = static_file {
            if let Err(e) = files::serve(&path, &mut res, &settings.mime_overrides) {
                tracing::warn!(file = %path.display(), error = %e, "Static file unavailable");
                res = Response::with_status(StatusCode::NOT_FOUND);
            }
        } else if let Some(route) = router.find(&req.method, &req.path) {
            req.matches = route.captures;

            let mut proceed = true;
            if framing.has_body() && req.headers.has_token("Expect", "100-continue") {
                let status = match &settings.expect_handler {
                    Some(decide) => decide(&req, &mut res),
                    None => StatusCode::CONTINUE,
                };
                if status == StatusCode::CONTINUE {
                    let interim = format!("{} 100 Continue\r\n\r\n", req.version);
                    if wire.write_all(interim.as_bytes()).await.is_err() || wire.flush().await.is_err() {
                        return Next::Close;
                    }
                } else {
                    res.status = status;
                    proceed = false;
                    close = true;
                }
            }

            if proceed {
                self.state = SessionState::ReadingBody;
                match route.handler {
                    RouteHandler::Plain(handler) => {
                        match read_full_body(&mut wire, framing, max).await {
                            Ok(body) => {
                                req.body = body;
                                body_state = BodyState::Consumed;
                            }
                            Err(e) => {
                                body_state = BodyState::Failed {
                                    status: e.status(),
                                    transport: e.is_transport(),
                                };
                            }
                        }
                        if body_state == BodyState::Consumed {
                            let boundary = req
                                .header_value("Content-Type")
                                .and_then(content::boundary_from_content_type);
                            let parsed = match boundary {
                                Some(b) => content::parse_multipart(&req.body, &b).map(|files| req.files = files),
                                None => {
                                    if is_form_urlencoded(&req) {
                                        let form = codec::parse_query(&String::from_utf8_lossy(&req.body));
                                        for (k, v) in form.iter() {
                                            req.params.append(k, v);
                                        }
                                    }
                                    Ok(())
                                }
                            };
                            self.state = SessionState::Dispatching;
                            match parsed {
                                Ok(()) => fault = invoke(handler, &req, &mut res),
                                Err(_) => res.status = StatusCode::BAD_REQUEST,
                            }
                        }
                    }
                    RouteHandler::Reader(handler) => {
                        let boundary = req
                            .header_value("Content-Type")
                            .and_then(content::boundary_from_content_type);
                        let reader = ContentReader::new(wire.reborrow(), framing, max, boundary, &mut body_state);
                        let call = handler.call(&req, &mut res, reader);
                        if AssertUnwindSafe(call).catch_unwind().await.is_err() {
                            fault = true;
                        }
                    }
                }

                match body_state {
                    BodyState::Failed { transport: true, .. } => {
                        tracing::debug!(session_id = self.id, "Connection failed while reading request body");
                        return Next::Close;
                    }
                    BodyState::Failed { status, .. } => {
                        res = Response::with_status(status.unwrap_or(StatusCode::BAD_REQUEST));
                        close = true;
                    }
                    _ => {}
                }
            }
        } else {
            res.status = StatusCode::NOT_FOUND;
        }

        if fault {
            tracing::error!(
                request_id = %request_id,
                method = %req.method,
                path = %req.path,
                "Handler panicked"
            );
            res = Response::with_status(StatusCode::INTERNAL_SERVER_ERROR);
            // a panicking reader may have left the body half-read
            close = true;
        }

        // 4. Leftover request body
        if body_state == BodyState::Unread && framing.has_body() && !close {
            if let Err(e) = content::read_body(&mut wire, framing, max, &mut |_: &[u8]| true).await {
                if e.is_transport() {
                    return Next::Close;
                }
                close = true;
            }
        }

        // 5. Response
        apply_range(&req, &mut res);
        if res.status.is_error() && res.is_body_empty() {
            (settings.error_handler)(&req, &mut res);
        }
        self.state = SessionState::WritingResponse;
        let written = write_response(&mut wire, &req, &mut res, &mut close).await;

        metrics::record_request(req.method.as_str(), res.status.as_u16(), started);
        tracing::debug!(
            request_id = %request_id,
            session_id = self.id,
            method = %req.method,
            path = %req.path,
            status = res.status.as_u16(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Request served"
        );

        match written {
            Err(e) => {
                tracing::debug!(request_id = %request_id, error = %e, "Response write failed");
                Next::Close
            }
            Ok(()) if close => Next::Close,
            Ok(()) => Next::KeepAlive,
        }
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("state", &self.state)
            .field("transport", &self.transport)
            .field("exchanges", &self.exchanges)
            .finish_non_exhaustive()
    }
}

fn invoke(handler: &Handler, req: &Request, res: &mut Response) -> bool {
    std::panic::catch_unwind(AssertUnwindSafe(|| handler(req, res))).is_err()
}

fn is_form_urlencoded(req: &Request) -> bool {
    req.header_value("Content-Type")
        .and_then(|ct| ct.split(';').next())
        .is_some_and(|ct| ct.trim().eq_ignore_ascii_case(mime::FORM_URLENCODED))
}

async fn read_full_body(wire: &mut Wire<'_>, framing: BodyFraming, max: u64) -> Result<Vec<u8>, HttpError> {
    let mut body = Vec::new();
    if let BodyFraming::Length(n) = framing {
        body.reserve(n.min(max) as usize);
    }
    content::read_body(wire, framing, max, &mut |d: &[u8]| {
        body.extend_from_slice(d);
        true
    })
    .await?;
    Ok(body)
}

/// Answer a request that couldn't be parsed, then close.
async fn reject(wire: &mut Wire<'_>, settings: &SessionSettings, err: HttpError) -> Next {
    let status = err.status().unwrap_or(StatusCode::BAD_REQUEST);
    tracing::debug!(status = status.as_u16(), error = %err, "Rejecting malformed request");

    let req = Request::new(Method::Get, "/");
    let mut res = Response::with_status(status);
    (settings.error_handler)(&req, &mut res);
    let mut close = true;
    let _ = write_response(wire, &req, &mut res, &mut close).await;
    metrics::record_request("-", status.as_u16(), Instant::now());
    Next::Close
}

/// Narrow a 200 response to the single requested byte range.
fn apply_range(req: &Request, res: &mut Response) {
    if req.ranges.len() != 1 || res.status != StatusCode::OK {
        return;
    }
    let total = match res.content() {
        None => res.body.len() as u64,
        Some(Content::Sized { length, .. }) => *length,
        Some(Content::Chunked(_)) => return,
    };
    match req.ranges[0].resolve(total) {
        None => {
            res.status = StatusCode::RANGE_NOT_SATISFIABLE;
            res.body.clear();
            res.take_content();
            res.headers.remove("Content-Type");
            res.set_header("Content-Range", format!("bytes */{}", total));
        }
        Some((first, last)) => {
            res.status = StatusCode::PARTIAL_CONTENT;
            res.set_header("Content-Range", format!("bytes {}-{}/{}", first, last, total));
            match res.content_mut() {
                Some(Content::Sized { offset, length, .. }) => {
                    *offset += first;
                    *length = last - first + 1;
                }
                _ => res.body = res.body[first as usize..=last as usize].to_vec(),
            }
        }
    }
}

/// Fill in framing and persistence headers, then write head and body.
async fn write_response(
    wire: &mut Wire<'_>,
    req: &Request,
    res: &mut Response,
    close: &mut bool,
) -> Result<(), HttpError> {
    if res.headers.has_token("Connection", "close") {
        *close = true;
    }
    res.set_header("Connection", if *close { "close" } else { "keep-alive" });

    // a HEAD route may advertise the length of a body it never builds
    let declared_length = if req.method == Method::Head && res.body.is_empty() && res.content().is_none() {
        res.headers.get("Content-Length").map(str::to_string)
    } else {
        None
    };
    res.headers.remove("Transfer-Encoding");
    res.headers.remove("Content-Length");
    if !res.status.forbids_body() {
        match res.content() {
            None => {
                let length = declared_length.unwrap_or_else(|| res.body.len().to_string());
                res.set_header("Content-Length", length);
            }
            Some(Content::Sized { length, .. }) => {
                let length = *length;
                res.set_header("Content-Length", length.to_string());
            }
            Some(Content::Chunked(_)) => res.set_header("Transfer-Encoding", "chunked"),
        }
    }

    wire.write_all(&codec::serialize_response_head(res)).await?;

    if req.method != Method::Head && !res.status.forbids_body() {
        match res.take_content() {
            None => {
                if !res.body.is_empty() {
                    wire.write_all(&res.body).await?;
                }
            }
            Some(Content::Sized {
                offset,
                length,
                mut provider,
            }) => content::write_sized(wire, &mut provider, offset, length).await?,
            Some(Content::Chunked(mut provider)) => content::write_chunked(wire, &mut provider).await?,
        }
    }
    wire.flush().await
}
