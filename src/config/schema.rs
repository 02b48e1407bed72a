//! Configuration schema definitions.
//!
//! All types derive Serde traits for deserialization from TOML files, and
//! every section defaults so a minimal file (or none) is valid.

use serde::{Deserialize, Serialize};

/// Root configuration for the engine binary.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct EngineConfig {
    /// Inbound side: listener, sessions, mounts.
    pub server: ServerConfig,

    /// Outbound side: defaults for `h1-engine get`.
    pub client: ClientConfig,

    pub observability: ObservabilityConfig,
}

/// Server configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Bind address (e.g., "0.0.0.0:8080").
    pub bind_address: String,

    /// Maximum concurrent connections (backpressure).
    pub max_connections: usize,

    /// Single-threaded reactors; 0 runs connections on the caller's runtime.
    pub reactors: usize,

    /// Exchanges served on one connection before it is closed.
    pub keep_alive_max_count: usize,

    pub read_timeout_ms: u64,
    pub write_timeout_ms: u64,

    /// How long a kept-alive connection may wait for its next request.
    pub idle_timeout_ms: u64,

    /// Largest request body accepted, in bytes.
    pub payload_max_length: u64,

    /// Cap on idle sessions kept by the session pool.
    pub max_idle_sessions: usize,

    /// How long shutdown waits for open connections.
    pub shutdown_timeout_ms: u64,

    pub tls: Option<TlsConfig>,

    /// Static file directories.
    pub mounts: Vec<MountConfig>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8080".to_string(),
            max_connections: 10_000,
            reactors: 0,
            keep_alive_max_count: 5,
            read_timeout_ms: 5_000,
            write_timeout_ms: 5_000,
            idle_timeout_ms: 5_000,
            payload_max_length: 8 * 1024 * 1024,
            max_idle_sessions: 1024,
            shutdown_timeout_ms: 30_000,
            tls: None,
            mounts: Vec::new(),
        }
    }
}

/// TLS configuration for the listener.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TlsConfig {
    /// Path to certificate file (PEM).
    pub cert_path: String,

    /// Path to private key file (PEM).
    pub key_path: String,
}

/// A URL prefix served from a directory.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct MountConfig {
    /// URL prefix, e.g. "/static".
    pub mount_point: String,

    pub dir: String,
}

/// Client defaults.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ClientConfig {
    pub connect_timeout_ms: u64,
    pub read_timeout_ms: u64,
    pub write_timeout_ms: u64,
    pub keep_alive: bool,
    pub keep_alive_max_count: usize,

    /// Seconds an idle kept-alive socket survives after an exchange.
    pub idle_close_secs: u64,

    pub follow_location: bool,
    pub max_redirects: usize,

    /// Ask for and decode gzip/deflate bodies.
    pub compress: bool,

    pub proxy: Option<ProxyConfig>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            connect_timeout_ms: 300_000,
            read_timeout_ms: 5_000,
            write_timeout_ms: 5_000,
            keep_alive: false,
            keep_alive_max_count: 5,
            idle_close_secs: 1,
            follow_location: false,
            max_redirects: 20,
            compress: false,
            proxy: None,
        }
    }
}

/// Forward proxy the client connects through.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ProxyConfig {
    pub host: String,
    pub port: u16,
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level used when `RUST_LOG` is unset.
    pub log_level: String,

    pub metrics_enabled: bool,

    /// Prometheus scrape endpoint.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            metrics_enabled: false,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}
