//! HTTP server setup and accept loop.
//!
//! # Responsibilities
//! - Collect routes, mounts and session behavior before start
//! - Accept connections with a bounded listener
//! - Hand each socket to a reactor (or the caller's runtime), run the TLS
//!   handshake, and serve it through a pooled session
//! - Stop accepting on shutdown and drain open connections
//!
//! # Design Decisions
//! - The route table lives behind an `ArcSwap`; each connection loads the
//!   current table when it is accepted, so a swap never disturbs an
//!   exchange in flight
//! - Registration errors (bad patterns, missing mount dirs) are kept and
//!   reported by `run`, so route setup reads as a flat list of calls

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwap;
use futures_util::future::BoxFuture;
use tokio::net::TcpStream;
use tokio::sync::broadcast;
use tokio_rustls::TlsAcceptor;

use crate::config::ServerConfig;
use crate::error::HttpError;
use crate::http::content::ContentReader;
use crate::http::files::MountPoint;
use crate::http::request::Request;
use crate::http::response::Response;
use crate::http::session::SessionSettings;
use crate::http::types::{Method, StatusCode};
use crate::net::connection::{ConnectionGuard, ConnectionTracker};
use crate::net::listener::{ConnectionPermit, Listener, ListenerError};
use crate::net::reactor::ReactorPool;
use crate::net::tls;
use crate::net::transport::Transport;
use crate::pool::session_pool::{PoolStats, SessionPool};
use crate::resilience::timeouts::from_millis;
use crate::routing::{RouteHandler, Router};

/// Shared, swappable route table.
#[derive(Clone, Default)]
pub struct RouteTable {
    current: Arc<ArcSwap<Router>>,
}

impl RouteTable {
    /// The table new connections will be bound to.
    pub fn load(&self) -> Arc<Router> {
        self.current.load_full()
    }

    /// Replace the table. Open connections keep the table they started with.
    pub fn replace(&self, router: Router) {
        tracing::info!(routes = router.len(), "Route table replaced");
        self.current.store(Arc::new(router));
    }
}

impl std::fmt::Debug for RouteTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RouteTable").field("routes", &self.current.load().len()).finish()
    }
}

/// Read-only window onto a running server's session pool.
#[derive(Debug, Clone, Default)]
pub struct PoolHandle {
    pool: Arc<std::sync::OnceLock<Arc<SessionPool>>>,
}

impl PoolHandle {
    /// Pool counters, or zeros before the server starts.
    pub fn stats(&self) -> PoolStats {
        match self.pool.get() {
            Some(pool) => pool.stats(),
            None => PoolStats {
                created: 0,
                reused: 0,
                idle: 0,
            },
        }
    }
}

/// An HTTP/1.1 server.
pub struct Server {
    config: ServerConfig,
    router: Router,
    settings: SessionSettings,
    table: RouteTable,
    pool: PoolHandle,
    tls: Option<TlsAcceptor>,
    errors: Vec<HttpError>,
}

impl Server {
    pub fn new(config: ServerConfig) -> Self {
        let mut settings = SessionSettings {
            keep_alive_max_count: config.keep_alive_max_count,
            read_timeout: from_millis(config.read_timeout_ms),
            write_timeout: from_millis(config.write_timeout_ms),
            idle_timeout: from_millis(config.idle_timeout_ms),
            ..SessionSettings::default()
        };
        settings.limits.payload_max_length = config.payload_max_length;

        let mounts = config.mounts.clone();
        let mut server = Self {
            config,
            router: Router::new(),
            settings,
            table: RouteTable::default(),
            pool: PoolHandle::default(),
            tls: None,
            errors: Vec::new(),
        };
        for mount in mounts {
            server.set_mount_point(&mount.mount_point, &mount.dir);
        }
        server
    }

    /// Register `handler` for `method` requests whose path matches `pattern`.
    pub fn route(&mut self, method: Method, pattern: &str, handler: RouteHandler) -> &mut Self {
        if let Err(e) = self.router.register(method, pattern, handler) {
            tracing::error!(pattern, error = %e, "Route registration failed");
            self.errors.push(e);
        }
        self
    }

    pub fn get<F>(&mut self, pattern: &str, handler: F) -> &mut Self
    where
        F: Fn(&Request, &mut Response) + Send + Sync + 'static,
    {
        self.route(Method::Get, pattern, RouteHandler::plain(handler))
    }

    pub fn post<F>(&mut self, pattern: &str, handler: F) -> &mut Self
    where
        F: Fn(&Request, &mut Response) + Send + Sync + 'static,
    {
        self.route(Method::Post, pattern, RouteHandler::plain(handler))
    }

    pub fn put<F>(&mut self, pattern: &str, handler: F) -> &mut Self
    where
        F: Fn(&Request, &mut Response) + Send + Sync + 'static,
    {
        self.route(Method::Put, pattern, RouteHandler::plain(handler))
    }

    pub fn patch<F>(&mut self, pattern: &str, handler: F) -> &mut Self
    where
        F: Fn(&Request, &mut Response) + Send + Sync + 'static,
    {
        self.route(Method::Patch, pattern, RouteHandler::plain(handler))
    }

    pub fn delete<F>(&mut self, pattern: &str, handler: F) -> &mut Self
    where
        F: Fn(&Request, &mut Response) + Send + Sync + 'static,
    {
        self.route(Method::Delete, pattern, RouteHandler::plain(handler))
    }

    pub fn options<F>(&mut self, pattern: &str, handler: F) -> &mut Self
    where
        F: Fn(&Request, &mut Response) + Send + Sync + 'static,
    {
        self.route(Method::Options, pattern, RouteHandler::plain(handler))
    }

    /// Explicit HEAD route. Without one, HEAD uses the GET route.
    pub fn head<F>(&mut self, pattern: &str, handler: F) -> &mut Self
    where
        F: Fn(&Request, &mut Response) + Send + Sync + 'static,
    {
        self.route(Method::Head, pattern, RouteHandler::plain(handler))
    }

    /// Streaming-body variants: the handler reads the body itself.
    pub fn post_with_reader<F>(&mut self, pattern: &str, handler: F) -> &mut Self
    where
        F: for<'a> Fn(&'a Request, &'a mut Response, ContentReader<'a>) -> BoxFuture<'a, ()> + Send + Sync + 'static,
    {
        self.route(Method::Post, pattern, RouteHandler::reader(handler))
    }

    pub fn put_with_reader<F>(&mut self, pattern: &str, handler: F) -> &mut Self
    where
        F: for<'a> Fn(&'a Request, &'a mut Response, ContentReader<'a>) -> BoxFuture<'a, ()> + Send + Sync + 'static,
    {
        self.route(Method::Put, pattern, RouteHandler::reader(handler))
    }

    pub fn patch_with_reader<F>(&mut self, pattern: &str, handler: F) -> &mut Self
    where
        F: for<'a> Fn(&'a Request, &'a mut Response, ContentReader<'a>) -> BoxFuture<'a, ()> + Send + Sync + 'static,
    {
        self.route(Method::Patch, pattern, RouteHandler::reader(handler))
    }

    /// Fills error responses (status >= 400) that have no body.
    pub fn set_error_handler<F>(&mut self, handler: F) -> &mut Self
    where
        F: Fn(&Request, &mut Response) + Send + Sync + 'static,
    {
        self.settings.error_handler = Arc::new(handler);
        self
    }

    /// Decide `Expect: 100-continue` requests; return 100 to let them proceed.
    pub fn set_expect_100_continue_handler<F>(&mut self, handler: F) -> &mut Self
    where
        F: Fn(&Request, &mut Response) -> StatusCode + Send + Sync + 'static,
    {
        self.settings.expect_handler = Some(Arc::new(handler));
        self
    }

    /// Serve files below `dir` under the URL prefix `mount`. Returns false
    /// (and records an error) if `dir` is not a directory.
    pub fn set_mount_point(&mut self, mount: &str, dir: impl AsRef<Path>) -> bool {
        let dir = dir.as_ref();
        if !dir.is_dir() {
            tracing::error!(mount_point = mount, dir = %dir.display(), "Mount directory does not exist");
            self.errors.push(HttpError::Io(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("mount directory {:?} does not exist", dir),
            )));
            return false;
        }
        self.remove_mount_point(mount);
        self.settings.mounts.push(MountPoint::new(mount, dir));
        tracing::debug!(mount_point = mount, dir = %dir.display(), "Mount point added");
        true
    }

    pub fn remove_mount_point(&mut self, mount: &str) -> bool {
        let prefix = MountPoint::new(mount, "").prefix;
        let before = self.settings.mounts.len();
        self.settings.mounts.retain(|m| m.prefix != prefix);
        before != self.settings.mounts.len()
    }

    /// Map a file extension (without the dot) to a MIME type for static files.
    pub fn set_file_extension_and_mimetype_mapping(&mut self, ext: &str, mime: &str) -> &mut Self {
        self.settings
            .mime_overrides
            .insert(ext.trim_start_matches('.').to_ascii_lowercase(), mime.to_string());
        self
    }

    pub fn set_keep_alive_max_count(&mut self, count: usize) -> &mut Self {
        self.settings.keep_alive_max_count = count;
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

    pub fn set_idle_timeout(&mut self, timeout: Duration) -> &mut Self {
        self.settings.idle_timeout = Some(timeout);
        self
    }

    pub fn set_payload_max_length(&mut self, max: u64) -> &mut Self {
        self.settings.limits.payload_max_length = max;
        self
    }

    /// Serve TLS with an already built acceptor (overrides `config.tls`).
    pub fn set_tls_acceptor(&mut self, acceptor: TlsAcceptor) -> &mut Self {
        self.tls = Some(acceptor);
        self
    }

    /// Handle for swapping routes while the server runs.
    pub fn route_table(&self) -> RouteTable {
        self.table.clone()
    }

    /// Handle for reading session pool counters while the server runs.
    pub fn pool_handle(&self) -> PoolHandle {
        self.pool.clone()
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Bind `config.bind_address` and run until `shutdown` fires.
    pub async fn listen(self, shutdown: broadcast::Receiver<()>) -> Result<(), HttpError> {
        let listener = Listener::bind(&self.config).await?;
        self.run(listener, shutdown).await
    }

    /// Serve connections from `listener` until `shutdown` receives a message
    /// (or its sender is dropped), then wait for open connections to finish.
    pub async fn run(mut self, listener: Listener, mut shutdown: broadcast::Receiver<()>) -> Result<(), HttpError> {
        if let Some(e) = self.errors.drain(..).next() {
            return Err(e);
        }

        let tls = match (self.tls.take(), &self.config.tls) {
            (Some(acceptor), _) => Some(acceptor),
            (None, Some(cfg)) => Some(tls::load_acceptor(Path::new(&cfg.cert_path), Path::new(&cfg.key_path))?),
            (None, None) => None,
        };
        let reactors = if self.config.reactors > 0 {
            Some(ReactorPool::new(self.config.reactors)?)
        } else {
            None
        };

        let handshake_timeout = self.settings.read_timeout;
        let pool = SessionPool::new(Arc::new(self.settings), self.config.max_idle_sessions);
        let _ = self.pool.pool.set(Arc::clone(&pool));
        self.table.replace(self.router);
        let tracker = ConnectionTracker::new();

        tracing::info!(
            address = %listener.local_addr()?,
            reactors = self.config.reactors,
            tls = tls.is_some(),
            "HTTP server starting"
        );

        loop {
            let accepted = tokio::select! {
                _ = shutdown.recv() => {
                    tracing::info!("Shutdown signal received, no longer accepting");
                    break;
                }
                accepted = listener.accept() => accepted,
            };
            let (stream, peer, permit) = match accepted {
                Ok(accepted) => accepted,
                Err(ListenerError::Closed) => break,
                Err(e) => {
                    // e.g. EMFILE; back off instead of spinning
                    tracing::warn!(error = %e, "Accept failed");
                    tokio::time::sleep(Duration::from_millis(50)).await;
                    continue;
                }
            };

            let conn = Connection {
                pool: Arc::clone(&pool),
                table: self.table.clone(),
                tls: tls.clone(),
                handshake_timeout,
                guard: tracker.track(),
                permit,
            };
            match &reactors {
                None => {
                    tokio::spawn(conn.serve(stream));
                }
                Some(reactors) => match stream.into_std() {
                    Ok(std_stream) => {
                        reactors.spawn(async move {
                            match TcpStream::from_std(std_stream) {
                                Ok(stream) => conn.serve(stream).await,
                                Err(e) => tracing::warn!(peer_addr = %peer, error = %e, "Failed to register socket on reactor"),
                            }
                        });
                    }
                    Err(e) => tracing::warn!(peer_addr = %peer, error = %e, "Failed to detach accepted socket"),
                },
            }
        }

        drop(listener);
        let deadline = Duration::from_millis(self.config.shutdown_timeout_ms);
        if !tracker.wait_idle_timeout(deadline).await {
            tracing::warn!(
                remaining = tracker.active_count(),
                "Shutdown deadline reached with connections still open"
            );
        }
        if let Some(reactors) = reactors {
            let _ = tokio::task::spawn_blocking(move || reactors.shutdown()).await;
        }

        tracing::info!(sessions = ?pool.stats(), "HTTP server stopped");
        Ok(())
    }
}

impl std::fmt::Debug for Server {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Server")
            .field("config", &self.config)
            .field("routes", &self.router.len())
            .field("settings", &self.settings)
            .field("tls", &self.tls.is_some())
            .finish_non_exhaustive()
    }
}

/// Everything one accepted connection needs, moved into its task.
struct Connection {
    pool: Arc<SessionPool>,
    table: RouteTable,
    tls: Option<TlsAcceptor>,
    handshake_timeout: Option<Duration>,
    guard: ConnectionGuard,
    permit: ConnectionPermit,
}

impl Connection {
    async fn serve(self, stream: TcpStream) {
        let Connection {
            pool,
            table,
            tls,
            handshake_timeout,
            guard,
            permit: _permit,
        } = self;

        let transport = match &tls {
            None => Transport::Tcp(stream),
            Some(acceptor) => {
                let handshake = tls::accept(acceptor, stream);
                let result = match handshake_timeout {
                    Some(limit) => tokio::time::timeout(limit, handshake)
                        .await
                        .unwrap_or(Err(HttpError::Timeout("tls handshake"))),
                    None => handshake.await,
                };
                match result {
                    Ok(transport) => transport,
                    Err(e) => {
                        tracing::debug!(connection_id = %guard.id(), error = %e, "TLS handshake failed");
                        return;
                    }
                }
            }
        };

        let mut session = pool.acquire(transport, table.load(), Some(guard.id()));
        session.run().await;
    }
}
