//! HTTP/1.1 client.
//!
//! # Responsibilities
//! - Connect (directly, through an HTTP proxy, or through a CONNECT tunnel)
//! - Serialize requests, streaming provider bodies with backpressure
//! - Read responses through the same inbound body machinery the server uses
//! - Follow redirects within the request's budget
//! - Basic credentials up front; one digest replay per 401/407 challenge
//! - Keep one socket alive across calls when asked to, closing it after an
//!   idle period
//!
//! # Data Flow
//! ```text
//! send(req)
//!     → send_with_auth (401/407 → digest → replay once)
//!         → round_trip (lock connection, reuse or open socket, retry once if stale)
//!             → exchange (write head + body, read head + body, keep-alive decision)
//!     → 3xx + Location? → budget check → rewrite request → loop
//! ```
//!
//! # Design Decisions
//! - The connection sits behind an async mutex: one exchange at a time per
//!   client, and the idle-close timer can never close a socket mid-exchange
//! - Each exchange bumps a generation counter; an idle timer only closes the
//!   socket if no exchange happened since it was armed
//! - A streamed request body can't be replayed, so streamed requests never
//!   follow redirects or answer auth challenges

use std::borrow::Cow;
use std::io::{self, Write};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use bytes::BytesMut;
use flate2::write::{GzDecoder, ZlibDecoder};
use memchr::memmem;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio_rustls::TlsConnector;
use url::Url;

use crate::config::ClientConfig;
use crate::error::HttpError;
use crate::http::auth::{self, DigestChallenge, DigestInput};
use crate::http::codec::{self, BodyFraming};
use crate::http::content::{self, Content, ContentReceiver, MultipartFormData};
use crate::http::headers::Headers;
use crate::http::request::{Params, Request};
use crate::http::response::Response;
use crate::http::types::{mime, Method, StatusCode, Version};
use crate::http::wire::Wire;
use crate::net::tls;
use crate::net::transport::Transport;
use crate::observability::metrics;
use crate::resilience::timeouts::{from_millis, with_timeout};
use crate::security::limits::Limits;

const USER_AGENT: &str = concat!("h1-engine/", env!("CARGO_PKG_VERSION"));
const MAX_TUNNEL_HEAD: usize = 8 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scheme {
    Http,
    Https,
}

impl Scheme {
    pub fn as_str(&self) -> &'static str {
        match self {
            Scheme::Http => "http",
            Scheme::Https => "https",
        }
    }

    fn default_port(&self) -> u16 {
        match self {
            Scheme::Http => 80,
            Scheme::Https => 443,
        }
    }
}

#[derive(Clone)]
struct Credentials {
    username: String,
    password: String,
}

impl Credentials {
    fn new(username: &str, password: &str) -> Self {
        Self {
            username: username.to_string(),
            password: password.to_string(),
        }
    }
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Clone)]
struct ProxyTarget {
    host: String,
    port: u16,
}

#[derive(Debug, Clone)]
struct ClientSettings {
    connect_timeout: Option<Duration>,
    read_timeout: Option<Duration>,
    write_timeout: Option<Duration>,
    keep_alive: bool,
    keep_alive_max_count: usize,
    idle_close: Option<Duration>,
    follow_location: bool,
    max_redirects: usize,
    compress: bool,
    basic_auth: Option<Credentials>,
    digest_auth: Option<Credentials>,
    proxy: Option<ProxyTarget>,
    proxy_basic_auth: Option<Credentials>,
    proxy_digest_auth: Option<Credentials>,
    default_headers: Headers,
}

impl From<&ClientConfig> for ClientSettings {
    fn from(config: &ClientConfig) -> Self {
        Self {
            connect_timeout: from_millis(config.connect_timeout_ms),
            read_timeout: from_millis(config.read_timeout_ms),
            write_timeout: from_millis(config.write_timeout_ms),
            keep_alive: config.keep_alive,
            keep_alive_max_count: config.keep_alive_max_count,
            idle_close: (config.idle_close_secs > 0).then(|| Duration::from_secs(config.idle_close_secs)),
            follow_location: config.follow_location,
            max_redirects: config.max_redirects,
            compress: config.compress,
            basic_auth: None,
            digest_auth: None,
            proxy: config.proxy.as_ref().map(|p| ProxyTarget {
                host: p.host.clone(),
                port: p.port,
            }),
            proxy_basic_auth: None,
            proxy_digest_auth: None,
            default_headers: Headers::new(),
        }
    }
}

/// Socket state that persists across calls on one [`Client`].
#[derive(Default)]
struct ClientConnection {
    transport: Option<Transport>,
    buf: BytesMut,
    /// Exchanges completed on the current socket.
    exchanges: usize,
    generation: u64,
    head_received: bool,
}

/// Response body decoding for `compress` mode.
enum Decoder {
    Identity,
    Gzip(GzDecoder<Vec<u8>>),
    Deflate(ZlibDecoder<Vec<u8>>),
}

impl Decoder {
    fn for_encoding(encoding: Option<&str>) -> Self {
        match encoding.map(|e| e.trim().to_ascii_lowercase()).as_deref() {
            Some("gzip") | Some("x-gzip") => Decoder::Gzip(GzDecoder::new(Vec::new())),
            Some("deflate") => Decoder::Deflate(ZlibDecoder::new(Vec::new())),
            _ => Decoder::Identity,
        }
    }

    fn decode<'a>(&mut self, data: &'a [u8]) -> io::Result<Cow<'a, [u8]>> {
        match self {
            Decoder::Identity => Ok(Cow::Borrowed(data)),
            Decoder::Gzip(d) => {
                d.write_all(data)?;
                Ok(Cow::Owned(std::mem::take(d.get_mut())))
            }
            Decoder::Deflate(d) => {
                d.write_all(data)?;
                Ok(Cow::Owned(std::mem::take(d.get_mut())))
            }
        }
    }

    fn finish(self) -> io::Result<Vec<u8>> {
        match self {
            Decoder::Identity => Ok(Vec::new()),
            Decoder::Gzip(d) => d.finish(),
            Decoder::Deflate(d) => d.finish(),
        }
    }
}

fn deliver(receiver: &mut Option<ContentReceiver>, body: &mut Vec<u8>, data: &[u8]) -> bool {
    if data.is_empty() {
        return true;
    }
    match receiver {
        Some(receiver) => receiver(data),
        None => {
            body.extend_from_slice(data);
            true
        }
    }
}

/// `[::1]` → `::1`; names and IPv4 literals pass through.
fn bare_host(host: &str) -> &str {
    host.strip_prefix('[').and_then(|h| h.strip_suffix(']')).unwrap_or(host)
}

fn is_followed_redirect(status: StatusCode) -> bool {
    matches!(status.as_u16(), 301 | 302 | 303 | 307 | 308)
}

/// An HTTP client bound to one origin.
pub struct Client {
    scheme: Scheme,
    host: String,
    port: u16,
    settings: ClientSettings,
    tls: Option<TlsConnector>,
    conn: Arc<Mutex<ClientConnection>>,
    nonce_count: AtomicU32,
}

impl Client {
    /// Client for `base`, e.g. `http://localhost:8080` or `https://example.com`.
    pub fn new(base: &str) -> Result<Self, HttpError> {
        Self::with_config(base, &ClientConfig::default())
    }

    pub fn with_config(base: &str, config: &ClientConfig) -> Result<Self, HttpError> {
        let url = Url::parse(base).map_err(|e| HttpError::InvalidUrl(format!("{}: {}", base, e)))?;
        Self::from_url(&url, ClientSettings::from(config))
    }

    fn from_url(url: &Url, settings: ClientSettings) -> Result<Self, HttpError> {
        let scheme = match url.scheme() {
            "http" => Scheme::Http,
            "https" => Scheme::Https,
            other => return Err(HttpError::InvalidUrl(format!("unsupported scheme {:?}", other))),
        };
        let host = url
            .host_str()
            .ok_or_else(|| HttpError::InvalidUrl(format!("{} has no host", url)))?
            .to_string();
        let port = url.port().unwrap_or(scheme.default_port());
        let tls = match scheme {
            Scheme::Https => Some(tls::client_connector()?),
            Scheme::Http => None,
        };
        Ok(Self {
            scheme,
            host,
            port,
            settings,
            tls,
            conn: Arc::new(Mutex::new(ClientConnection::default())),
            nonce_count: AtomicU32::new(0),
        })
    }

    /// A client for another origin sharing this client's settings.
    fn redirected_to(&self, url: &Url) -> Result<Self, HttpError> {
        let mut client = Self::from_url(url, self.settings.clone())?;
        if client.scheme == self.scheme {
            client.tls = self.tls.clone().or(client.tls);
        }
        Ok(client)
    }

    fn same_origin(&self, url: &Url) -> bool {
        url.scheme() == self.scheme.as_str()
            && url.host_str() == Some(self.host.as_str())
            && url.port_or_known_default() == Some(self.port)
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn scheme(&self) -> Scheme {
        self.scheme
    }

    pub fn set_connect_timeout(&mut self, timeout: Duration) -> &mut Self {
        self.settings.connect_timeout = Some(timeout);
        self
    }

    pub fn set_read_timeout(&mut self, timeout: Duration) -> &mut Self {
        self.settings.read_timeout = Some(timeout);
        self
    }

    pub fn set_write_timeout(&mut self, timeout: Duration) -> &mut Self {
        self.settings.write_timeout = Some(timeout);
        self
    }

    /// Keep the socket open between calls instead of sending `Connection: close`.
    pub fn set_keep_alive(&mut self, on: bool) -> &mut Self {
        self.settings.keep_alive = on;
        self
    }

    /// Exchanges per socket before the client closes it.
    pub fn set_keep_alive_max_count(&mut self, count: usize) -> &mut Self {
        self.settings.keep_alive_max_count = count.max(1);
        self
    }

    /// Close a kept-alive socket after `after` without use. `None` keeps it.
    pub fn set_idle_close(&mut self, after: Option<Duration>) -> &mut Self {
        self.settings.idle_close = after;
        self
    }

    pub fn set_follow_location(&mut self, on: bool) -> &mut Self {
        self.settings.follow_location = on;
        self
    }

    /// Redirect budget given to requests built by this client's helpers.
    pub fn set_max_redirects(&mut self, max: usize) -> &mut Self {
        self.settings.max_redirects = max;
        self
    }

    /// Ask for gzip/deflate and decode compressed bodies.
    pub fn set_compress(&mut self, on: bool) -> &mut Self {
        self.settings.compress = on;
        self
    }

    pub fn set_basic_auth(&mut self, username: &str, password: &str) -> &mut Self {
        self.settings.basic_auth = Some(Credentials::new(username, password));
        self
    }

    pub fn set_digest_auth(&mut self, username: &str, password: &str) -> &mut Self {
        self.settings.digest_auth = Some(Credentials::new(username, password));
        self
    }

    pub fn set_proxy(&mut self, host: &str, port: u16) -> &mut Self {
        self.settings.proxy = Some(ProxyTarget {
            host: host.to_string(),
            port,
        });
        self
    }

    pub fn set_proxy_basic_auth(&mut self, username: &str, password: &str) -> &mut Self {
        self.settings.proxy_basic_auth = Some(Credentials::new(username, password));
        self
    }

    pub fn set_proxy_digest_auth(&mut self, username: &str, password: &str) -> &mut Self {
        self.settings.proxy_digest_auth = Some(Credentials::new(username, password));
        self
    }

    /// Headers added to every request that doesn't set them itself.
    pub fn set_default_headers(&mut self, headers: Headers) -> &mut Self {
        self.settings.default_headers = headers;
        self
    }

    /// Trust a custom set of roots, e.g. a private CA.
    pub fn set_tls_connector(&mut self, connector: TlsConnector) -> &mut Self {
        self.tls = Some(connector);
        self
    }

    /// True while a kept-alive socket is open.
    pub async fn is_socket_open(&self) -> bool {
        self.conn.lock().await.transport.is_some()
    }

    /// Close the kept-alive socket, if any.
    pub async fn stop(&self) {
        let mut conn = self.conn.lock().await;
        if conn.transport.take().is_some() {
            tracing::debug!(host = %self.host, port = self.port, "Client connection closed");
        }
    }

    fn host_header(&self) -> String {
        if self.port == self.scheme.default_port() {
            self.host.clone()
        } else {
            format!("{}:{}", self.host, self.port)
        }
    }

    fn url_for(&self, target: &str) -> String {
        format!("{}://{}{}", self.scheme.as_str(), self.host_header(), target)
    }

    fn via_http_proxy(&self) -> bool {
        self.settings.proxy.is_some() && self.scheme == Scheme::Http
    }

    fn origin_target(req: &Request) -> String {
        let target = req.request_target();
        if target.is_empty() {
            "/".to_string()
        } else {
            target
        }
    }

    /// Request-target as written on the wire: absolute-form through a plain
    /// HTTP proxy, origin-form otherwise.
    fn wire_target(&self, req: &Request) -> String {
        let origin = Self::origin_target(req);
        if self.via_http_proxy() {
            self.url_for(&origin)
        } else {
            origin
        }
    }

    fn request_headers(
        &self,
        req: &Request,
        content: Option<&Content>,
        auth: Option<&(&'static str, String)>,
        last: bool,
    ) -> Headers {
        let mut headers = req.headers.clone();
        for (name, value) in self.settings.default_headers.iter() {
            if !headers.contains(name) {
                headers.append(name, value);
            }
        }
        if !headers.contains("Host") {
            headers.set("Host", self.host_header());
        }
        if !headers.contains("Accept") {
            headers.set("Accept", "*/*");
        }
        if !headers.contains("User-Agent") {
            headers.set("User-Agent", USER_AGENT);
        }
        if self.settings.compress && !headers.contains("Accept-Encoding") {
            headers.set("Accept-Encoding", "gzip, deflate");
        }
        if let Some(c) = &self.settings.basic_auth {
            if !headers.contains("Authorization") {
                headers.set("Authorization", auth::basic_authorization(&c.username, &c.password));
            }
        }
        if self.via_http_proxy() {
            if let Some(c) = &self.settings.proxy_basic_auth {
                if !headers.contains("Proxy-Authorization") {
                    headers.set("Proxy-Authorization", auth::basic_authorization(&c.username, &c.password));
                }
            }
        }
        if let Some((name, value)) = auth {
            headers.set(*name, value.clone());
        }

        headers.remove("Connection");
        if last {
            headers.set("Connection", "close");
        }

        headers.remove("Content-Length");
        headers.remove("Transfer-Encoding");
        match content {
            Some(Content::Sized { length, .. }) => headers.set("Content-Length", length.to_string()),
            Some(Content::Chunked(_)) => headers.set("Transfer-Encoding", "chunked"),
            None if !req.body.is_empty() || req.method.expects_body() => {
                headers.set("Content-Length", req.body.len().to_string())
            }
            None => {}
        }
        headers
    }

    /// Send `req`, following redirects within `req.redirect_count`.
    pub async fn send(&self, mut req: Request) -> Result<Response, HttpError> {
        let replayable = req.content.is_none();
        let mut hop: Option<Client> = None;
        loop {
            let client = hop.as_ref().unwrap_or(self);
            let mut res = client.send_with_auth(&mut req, replayable).await?;
            res.location = client.url_for(&Self::origin_target(&req));

            let location = match res.header_value("Location") {
                Some(l) if replayable && self.settings.follow_location && is_followed_redirect(res.status) => l.to_string(),
                _ => return Ok(res),
            };
            if req.redirect_count == 0 {
                tracing::debug!(location = %location, "Redirect budget exhausted");
                return Err(HttpError::TooManyRedirects);
            }
            req.redirect_count -= 1;

            let next = Url::parse(&res.location)
                .and_then(|base| base.join(&location))
                .map_err(|e| HttpError::InvalidUrl(format!("{}: {}", location, e)))?;
            tracing::debug!(
                status = res.status.as_u16(),
                from = %res.location,
                to = %next,
                remaining = req.redirect_count,
                "Following redirect"
            );

            let to_get = res.status == StatusCode::SEE_OTHER
                || (matches!(res.status, StatusCode::MOVED_PERMANENTLY | StatusCode::FOUND) && req.method == Method::Post);
            if to_get {
                req.method = Method::Get;
                req.body.clear();
                req.headers.remove("Content-Type");
            }
            req.path = next.path().to_string();
            req.params = next.query().map(codec::parse_query).unwrap_or_default();
            req.target = Self::origin_target(&req);

            let cross_origin = !client.same_origin(&next);
            if cross_origin {
                req.headers.remove("Host");
                hop = Some(client.redirected_to(&next)?);
            }
        }
    }

    fn digest_credentials(&self, status: StatusCode) -> Option<(&Credentials, &'static str, &'static str)> {
        match status {
            StatusCode::UNAUTHORIZED => self
                .settings
                .digest_auth
                .as_ref()
                .map(|c| (c, "WWW-Authenticate", "Authorization")),
            StatusCode::PROXY_AUTHENTICATION_REQUIRED => self
                .settings
                .proxy_digest_auth
                .as_ref()
                .map(|c| (c, "Proxy-Authenticate", "Proxy-Authorization")),
            _ => None,
        }
    }

    async fn send_with_auth(&self, req: &mut Request, replayable: bool) -> Result<Response, HttpError> {
        let res = self.round_trip(req, None, replayable).await?;
        let Some((creds, challenge_header, answer_header)) = self.digest_credentials(res.status).filter(|_| replayable)
        else {
            return Ok(res);
        };
        let Some(challenge) = res.headers.get_all(challenge_header).find_map(DigestChallenge::parse) else {
            return Ok(res);
        };

        let uri = Self::origin_target(req);
        let cnonce = auth::random_cnonce();
        let value = auth::digest_authorization(
            &challenge,
            &DigestInput {
                username: &creds.username,
                password: &creds.password,
                method: &req.method,
                uri: &uri,
                nc: self.nonce_count.fetch_add(1, Ordering::Relaxed) + 1,
                cnonce: &cnonce,
                body: &req.body,
            },
        );
        tracing::debug!(status = res.status.as_u16(), realm = %challenge.realm, "Answering digest challenge");
        drop(res);
        self.round_trip(req, Some((answer_header, value)), replayable).await
    }

    /// True if this response will be answered by another request, in which
    /// case its body isn't handed to the caller's receiver.
    fn is_intermediate(&self, status: StatusCode, headers: &Headers, answered: bool) -> bool {
        let redirect = self.settings.follow_location && is_followed_redirect(status) && headers.contains("Location");
        let challenge = !answered
            && self
                .digest_credentials(status)
                .is_some_and(|(_, name, _)| headers.get_all(name).any(|v| DigestChallenge::parse(v).is_some()));
        redirect || challenge
    }

    async fn round_trip(
        &self,
        req: &mut Request,
        auth: Option<(&'static str, String)>,
        replayable: bool,
    ) -> Result<Response, HttpError> {
        let started = Instant::now();
        let mut conn = self.conn.lock().await;
        conn.generation = conn.generation.wrapping_add(1);

        let mut retried = false;
        let result = loop {
            let reused = conn.transport.is_some();
            if !reused {
                match self.open().await {
                    Ok(transport) => {
                        conn.transport = Some(transport);
                        conn.buf.clear();
                        conn.exchanges = 0;
                    }
                    Err(e) => break Err(e),
                }
            }
            let had_content = req.content.is_some();
            match self.exchange(&mut conn, req, auth.as_ref(), replayable).await {
                Err(e)
                    if reused
                        && !retried
                        && !conn.head_received
                        && e.is_transport()
                        && (!had_content || req.content.is_some()) =>
                {
                    tracing::debug!(host = %self.host, error = %e, "Kept-alive connection went stale, reconnecting");
                    conn.transport = None;
                    retried = true;
                }
                other => break other,
            }
        };

        match &result {
            Ok(res) => {
                metrics::record_client_request(res.status.as_u16());
                tracing::debug!(
                    host = %self.host,
                    method = %req.method,
                    path = %req.path,
                    status = res.status.as_u16(),
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "Client request completed"
                );
            }
            Err(e) => {
                conn.transport = None;
                tracing::debug!(host = %self.host, method = %req.method, path = %req.path, error = %e, "Client request failed");
            }
        }
        if conn.transport.is_some() {
            self.arm_idle_close(conn.generation);
        }
        result
    }

    async fn exchange(
        &self,
        conn: &mut ClientConnection,
        req: &mut Request,
        auth: Option<&(&'static str, String)>,
        replayable: bool,
    ) -> Result<Response, HttpError> {
        conn.head_received = false;
        let last = !self.settings.keep_alive
            || conn.exchanges + 1 >= self.settings.keep_alive_max_count
            || req.headers.has_token("Connection", "close");
        let content = req.content.take();
        let headers = self.request_headers(req, content.as_ref(), auth, last);
        let target = self.wire_target(req);
        let limits = Limits::unbounded_body();

        let io = conn.transport.as_mut().ok_or(HttpError::ConnectionClosed)?;
        let mut wire = Wire::new(io, &mut conn.buf, self.settings.read_timeout, self.settings.write_timeout);

        // 1. Request
        wire.write_all(&codec::serialize_head(&req.method, &target, Version::Http11, &headers))
            .await?;
        match content {
            Some(Content::Sized {
                offset,
                length,
                mut provider,
            }) => content::write_sized(&mut wire, &mut provider, offset, length).await?,
            Some(Content::Chunked(mut provider)) => content::write_chunked(&mut wire, &mut provider).await?,
            None if !req.body.is_empty() => wire.write_all(&req.body).await?,
            None => {}
        }
        wire.flush().await?;

        // 2. Response head, skipping interim 1xx responses
        let (version, status, reason, res_headers) = loop {
            let head = wire
                .read_head(limits.max_header_bytes)
                .await?
                .ok_or(HttpError::ConnectionClosed)?;
            conn.head_received = true;
            let parsed = codec::parse_response_head(&head, &limits)?;
            if parsed.1.is_informational() && parsed.1 != StatusCode::SWITCHING_PROTOCOLS {
                continue;
            }
            break parsed;
        };

        // 3. Response body
        let framing = codec::response_framing(&req.method, status, &res_headers)?;
        let intermediate = replayable && self.is_intermediate(status, &res_headers, auth.is_some());
        let mut receiver = if intermediate { None } else { req.content_receiver.take() };
        let mut progress = if intermediate { None } else { req.progress.take() };
        let mut decoder = if self.settings.compress {
            Decoder::for_encoding(res_headers.get("Content-Encoding"))
        } else {
            Decoder::Identity
        };
        let total = match framing {
            BodyFraming::Length(n) => n,
            _ => 0,
        };

        let mut body = Vec::new();
        let mut received = 0u64;
        let mut failure: Option<HttpError> = None;
        let read = {
            let mut on_data = |data: &[u8]| -> bool {
                received += data.len() as u64;
                if let Some(progress) = progress.as_mut() {
                    if !progress(received, total) {
                        return false;
                    }
                }
                match decoder.decode(data) {
                    Ok(plain) => deliver(&mut receiver, &mut body, &plain),
                    Err(e) => {
                        failure = Some(HttpError::Io(e));
                        false
                    }
                }
            };
            content::read_body(&mut wire, framing, limits.payload_max_length, &mut on_data).await
        };
        let read = match (read, failure) {
            (_, Some(e)) => Err(e),
            (r, None) => r,
        };
        let read = read.and_then(|()| {
            let tail = decoder.finish()?;
            if deliver(&mut receiver, &mut body, &tail) {
                Ok(())
            } else {
                Err(HttpError::Canceled)
            }
        });
        if receiver.is_some() {
            req.content_receiver = receiver;
        }
        if progress.is_some() {
            req.progress = progress;
        }
        read?;

        // 4. Persistence
        conn.exchanges += 1;
        let peer_closes = res_headers.has_token("Connection", "close")
            || (version == Version::Http10 && !res_headers.has_token("Connection", "keep-alive"))
            || framing == BodyFraming::UntilClose;
        if last || peer_closes {
            conn.transport = None;
        }

        let mut res = Response::with_status(status);
        res.version = version;
        if !reason.is_empty() && reason != status.reason() {
            res.reason = Some(reason);
        }
        res.headers = res_headers;
        res.body = body;
        Ok(res)
    }

    fn arm_idle_close(&self, generation: u64) {
        let Some(after) = self.settings.idle_close else {
            return;
        };
        let conn = Arc::downgrade(&self.conn);
        let host = self.host.clone();
        tokio::spawn(async move {
            tokio::time::sleep(after).await;
            let Some(conn) = conn.upgrade() else {
                return;
            };
            let mut conn = conn.lock().await;
            if conn.generation == generation && conn.transport.take().is_some() {
                tracing::debug!(host = %host, idle_ms = after.as_millis() as u64, "Idle client connection closed");
            }
        });
    }

    async fn connect_tcp(&self, host: &str, port: u16) -> Result<TcpStream, HttpError> {
        let addr = format!("{}:{}", host, port);
        let connect = TcpStream::connect((bare_host(host), port));
        let stream = match self.settings.connect_timeout {
            Some(limit) => tokio::time::timeout(limit, connect)
                .await
                .map_err(|_| HttpError::Timeout("connect"))?,
            None => connect.await,
        }
        .map_err(|source| HttpError::Connect {
            addr: addr.clone(),
            source,
        })?;
        if let Err(e) = stream.set_nodelay(true) {
            tracing::trace!(addr = %addr, error = %e, "Failed to set TCP_NODELAY");
        }
        tracing::debug!(addr = %addr, "Client connected");
        Ok(stream)
    }

    async fn open(&self) -> Result<Transport, HttpError> {
        let (host, port) = match &self.settings.proxy {
            Some(proxy) => (proxy.host.as_str(), proxy.port),
            None => (self.host.as_str(), self.port),
        };
        let stream = self.connect_tcp(host, port).await?;
        match &self.tls {
            None => Ok(Transport::Tcp(stream)),
            Some(connector) => {
                let stream = match &self.settings.proxy {
                    Some(proxy) => self.tunnel(stream, proxy).await?,
                    None => stream,
                };
                tls::connect(connector, bare_host(&self.host), stream).await
            }
        }
    }

    /// Establish a CONNECT tunnel through the proxy, answering one digest
    /// challenge on a fresh proxy connection if needed.
    async fn tunnel(&self, mut stream: TcpStream, proxy: &ProxyTarget) -> Result<TcpStream, HttpError> {
        let authority = format!("{}:{}", self.host, self.port);
        let mut proxy_auth = self
            .settings
            .proxy_basic_auth
            .as_ref()
            .map(|c| auth::basic_authorization(&c.username, &c.password));

        for attempt in 0..2 {
            let mut head = format!("CONNECT {a} HTTP/1.1\r\nHost: {a}\r\n", a = authority);
            if let Some(value) = &proxy_auth {
                head.push_str(&format!("Proxy-Authorization: {}\r\n", value));
            }
            head.push_str("\r\n");
            with_timeout(self.settings.write_timeout, "write", stream.write_all(head.as_bytes())).await?;

            let (status, headers) = self.read_tunnel_response(&mut stream).await?;
            if status.is_success() {
                tracing::debug!(proxy = %proxy.host, target = %authority, "CONNECT tunnel established");
                return Ok(stream);
            }

            let challenge = headers.get_all("Proxy-Authenticate").find_map(DigestChallenge::parse);
            match (attempt, status, &self.settings.proxy_digest_auth, challenge) {
                (0, StatusCode::PROXY_AUTHENTICATION_REQUIRED, Some(creds), Some(challenge)) => {
                    let cnonce = auth::random_cnonce();
                    proxy_auth = Some(auth::digest_authorization(
                        &challenge,
                        &DigestInput {
                            username: &creds.username,
                            password: &creds.password,
                            method: &Method::Connect,
                            uri: &authority,
                            nc: self.nonce_count.fetch_add(1, Ordering::Relaxed) + 1,
                            cnonce: &cnonce,
                            body: b"",
                        },
                    ));
                    stream = self.connect_tcp(&proxy.host, proxy.port).await?;
                }
                _ => return Err(HttpError::ProxyConnect(status.as_u16())),
            }
        }
        Err(HttpError::ProxyConnect(StatusCode::PROXY_AUTHENTICATION_REQUIRED.as_u16()))
    }

    async fn read_tunnel_response(&self, stream: &mut TcpStream) -> Result<(StatusCode, Headers), HttpError> {
        let mut buf = BytesMut::with_capacity(1024);
        loop {
            if let Some(pos) = memmem::find(&buf, b"\r\n\r\n") {
                let (_, status, _, headers) = codec::parse_response_head(&buf[..pos + 4], &Limits::default())?;
                return Ok((status, headers));
            }
            if buf.len() > MAX_TUNNEL_HEAD {
                return Err(HttpError::parse("proxy response head too large"));
            }
            if with_timeout(self.settings.read_timeout, "read", stream.read_buf(&mut buf)).await? == 0 {
                return Err(HttpError::ConnectionClosed);
            }
        }
    }

    fn request(&self, method: Method, path: &str) -> Request {
        let mut req = Request::new(method, path);
        req.redirect_count = self.settings.max_redirects;
        req
    }

    pub async fn get(&self, path: &str) -> Result<Response, HttpError> {
        self.send(self.request(Method::Get, path)).await
    }

    pub async fn get_with_headers(&self, path: &str, headers: Headers) -> Result<Response, HttpError> {
        let mut req = self.request(Method::Get, path);
        req.headers = headers;
        self.send(req).await
    }

    /// GET streaming the body into `receiver`; `progress` sees `(received, total)`.
    pub async fn get_with_receiver<R, P>(&self, path: &str, receiver: R, progress: Option<P>) -> Result<Response, HttpError>
    where
        R: FnMut(&[u8]) -> bool + Send + Sync + 'static,
        P: FnMut(u64, u64) -> bool + Send + Sync + 'static,
    {
        let mut req = self.request(Method::Get, path);
        req.set_content_receiver(receiver);
        if let Some(progress) = progress {
            req.set_progress(progress);
        }
        self.send(req).await
    }

    pub async fn head(&self, path: &str) -> Result<Response, HttpError> {
        self.send(self.request(Method::Head, path)).await
    }

    pub async fn options(&self, path: &str) -> Result<Response, HttpError> {
        self.send(self.request(Method::Options, path)).await
    }

    pub async fn delete(&self, path: &str) -> Result<Response, HttpError> {
        self.send(self.request(Method::Delete, path)).await
    }

    pub async fn post(&self, path: &str, body: impl Into<Vec<u8>>, content_type: &str) -> Result<Response, HttpError> {
        self.send(self.request(Method::Post, path).with_body(body, content_type)).await
    }

    pub async fn put(&self, path: &str, body: impl Into<Vec<u8>>, content_type: &str) -> Result<Response, HttpError> {
        self.send(self.request(Method::Put, path).with_body(body, content_type)).await
    }

    pub async fn patch(&self, path: &str, body: impl Into<Vec<u8>>, content_type: &str) -> Result<Response, HttpError> {
        self.send(self.request(Method::Patch, path).with_body(body, content_type)).await
    }

    /// POST `params` as `application/x-www-form-urlencoded`.
    pub async fn post_form(&self, path: &str, params: &Params) -> Result<Response, HttpError> {
        self.post(path, codec::encode_query(params), mime::FORM_URLENCODED).await
    }

    /// POST `items` as `multipart/form-data` with a random boundary.
    pub async fn post_multipart(&self, path: &str, items: &[MultipartFormData]) -> Result<Response, HttpError> {
        let boundary = content::random_boundary();
        let body = content::serialize_multipart(items, &boundary);
        let content_type = format!("{}; boundary={}", mime::MULTIPART_FORM_DATA, boundary);
        self.post(path, body, &content_type).await
    }

    /// POST a body of known `length` pulled from `provider`.
    pub async fn post_with_provider<P>(
        &self,
        path: &str,
        length: u64,
        content_type: &str,
        provider: P,
    ) -> Result<Response, HttpError>
    where
        P: FnMut(u64, u64, &mut content::DataSink) -> bool + Send + Sync + 'static,
    {
        let mut req = self.request(Method::Post, path);
        req.set_content_provider(length, content_type, provider);
        self.send(req).await
    }

    /// POST a chunked body pulled from `provider`.
    pub async fn post_chunked<P>(&self, path: &str, content_type: &str, provider: P) -> Result<Response, HttpError>
    where
        P: FnMut(u64, &mut content::DataSink) -> bool + Send + Sync + 'static,
    {
        let mut req = self.request(Method::Post, path);
        req.set_chunked_content_provider(content_type, provider);
        self.send(req).await
    }
}

impl std::fmt::Debug for Client {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client")
            .field("scheme", &self.scheme)
            .field("host", &self.host)
            .field("port", &self.port)
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}
