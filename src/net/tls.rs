//! TLS configuration and certificate loading.
//!
//! Server side builds a [`TlsAcceptor`] from PEM files; client side builds a
//! [`TlsConnector`] trusting the webpki root set. Handshakes themselves are
//! left to rustls.

use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use std::sync::Arc;

use tokio::net::TcpStream;
use tokio_rustls::rustls::pki_types::{CertificateDer, PrivateKeyDer, ServerName};
use tokio_rustls::rustls::{self, crypto::ring, ClientConfig, RootCertStore};
use tokio_rustls::{TlsAcceptor, TlsConnector};

use crate::error::HttpError;
use crate::net::transport::Transport;

fn open(path: &Path, what: &str) -> Result<BufReader<File>, HttpError> {
    if !path.exists() {
        return Err(HttpError::Tls(format!("{} file not found: {:?}", what, path)));
    }
    Ok(BufReader::new(File::open(path)?))
}

fn load_certs(path: &Path) -> Result<Vec<CertificateDer<'static>>, HttpError> {
    let certs = rustls_pemfile::certs(&mut open(path, "Certificate")?).collect::<Result<Vec<_>, _>>()?;
    if certs.is_empty() {
        return Err(HttpError::Tls(format!("no certificates in {:?}", path)));
    }
    Ok(certs)
}

fn load_key(path: &Path) -> Result<PrivateKeyDer<'static>, HttpError> {
    rustls_pemfile::private_key(&mut open(path, "Private key")?)?
        .ok_or_else(|| HttpError::Tls(format!("no private key in {:?}", path)))
}

/// Build a server-side acceptor from a PEM certificate chain and key.
pub fn load_acceptor(cert_path: &Path, key_path: &Path) -> Result<TlsAcceptor, HttpError> {
    let certs = load_certs(cert_path)?;
    let key = load_key(key_path)?;
    let config = rustls::ServerConfig::builder_with_provider(Arc::new(ring::default_provider()))
        .with_safe_default_protocol_versions()
        .map_err(|e| HttpError::Tls(e.to_string()))?
        .with_no_client_auth()
        .with_single_cert(certs, key)
        .map_err(|e| HttpError::Tls(e.to_string()))?;
    tracing::info!(cert = ?cert_path, "TLS acceptor configured");
    Ok(TlsAcceptor::from(Arc::new(config)))
}

/// Client connector trusting the bundled webpki roots.
pub fn client_connector() -> Result<TlsConnector, HttpError> {
    let roots = RootCertStore {
        roots: webpki_roots::TLS_SERVER_ROOTS.to_vec(),
    };
    connector_with_roots(roots)
}

/// Client connector trusting exactly `roots`.
pub fn connector_with_roots(roots: RootCertStore) -> Result<TlsConnector, HttpError> {
    let config = ClientConfig::builder_with_provider(Arc::new(ring::default_provider()))
        .with_safe_default_protocol_versions()
        .map_err(|e| HttpError::Tls(e.to_string()))?
        .with_root_certificates(roots)
        .with_no_client_auth();
    Ok(TlsConnector::from(Arc::new(config)))
}

/// Run the server handshake on an accepted socket.
pub async fn accept(acceptor: &TlsAcceptor, stream: TcpStream) -> Result<Transport, HttpError> {
    let tls = acceptor
        .accept(stream)
        .await
        .map_err(|e| HttpError::Tls(e.to_string()))?;
    Ok(Transport::Tls(Box::new(tls.into())))
}

/// Run the client handshake against `host`.
pub async fn connect(connector: &TlsConnector, host: &str, stream: TcpStream) -> Result<Transport, HttpError> {
    let name = ServerName::try_from(host.to_string())
        .map_err(|_| HttpError::InvalidUrl(format!("invalid TLS server name: {}", host)))?;
    let tls = connector
        .connect(name, stream)
        .await
        .map_err(|e| HttpError::Tls(e.to_string()))?;
    Ok(Transport::Tls(Box::new(tls.into())))
}
