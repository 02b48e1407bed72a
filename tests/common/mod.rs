//! Shared utilities for integration tests.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;

use h1_engine::config::ServerConfig;
use h1_engine::error::HttpError;
use h1_engine::http::Server;
use h1_engine::lifecycle::Shutdown;
use h1_engine::net::Listener;

/// A server running on an ephemeral port.
pub struct TestServer {
    pub addr: SocketAddr,
    pub shutdown: Shutdown,
    pub handle: JoinHandle<Result<(), HttpError>>,
}

impl TestServer {
    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    pub fn base(&self) -> String {
        format!("http://{}", self.addr)
    }

    /// Trigger shutdown and wait for the accept loop to finish.
    pub async fn stop(self) -> Result<(), HttpError> {
        self.shutdown.trigger();
        tokio::time::timeout(Duration::from_secs(10), self.handle)
            .await
            .expect("server did not stop")
            .expect("server task panicked")
    }
}

pub fn test_config() -> ServerConfig {
    ServerConfig {
        bind_address: "127.0.0.1:0".into(),
        shutdown_timeout_ms: 2000,
        ..ServerConfig::default()
    }
}

/// Build a server with `test_config`, let `configure` register routes, and start it.
pub async fn start_server<F>(configure: F) -> TestServer
where
    F: FnOnce(&mut Server),
{
    start_server_with(test_config(), configure).await
}

pub async fn start_server_with<F>(config: ServerConfig, configure: F) -> TestServer
where
    F: FnOnce(&mut Server),
{
    let mut server = Server::new(config);
    configure(&mut server);
    let listener = Listener::bind(server.config()).await.unwrap();
    let addr = listener.local_addr().unwrap();
    let shutdown = Shutdown::new();
    let handle = tokio::spawn(server.run(listener, shutdown.subscribe()));
    TestServer { addr, shutdown, handle }
}

/// Write `request` on a fresh connection and read until the server closes it.
pub async fn raw_exchange(addr: SocketAddr, request: &[u8]) -> String {
    let mut stream = TcpStream::connect(addr).await.unwrap();
    stream.write_all(request).await.unwrap();
    read_until_close(&mut stream).await
}

pub async fn read_until_close(stream: &mut TcpStream) -> String {
    let mut out = Vec::new();
    let mut chunk = [0u8; 4096];
    loop {
        let read = tokio::time::timeout(Duration::from_secs(10), stream.read(&mut chunk))
            .await
            .expect("server did not close the connection");
        match read {
            Ok(0) | Err(_) => break,
            Ok(n) => out.extend_from_slice(&chunk[..n]),
        }
    }
    String::from_utf8_lossy(&out).into_owned()
}

/// Read one response (head plus `Content-Length` body) without waiting for close.
pub async fn read_response(stream: &mut TcpStream) -> String {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 4096];
    loop {
        if let Some(end) = find(&buf, b"\r\n\r\n") {
            let head = String::from_utf8_lossy(&buf[..end]).to_string();
            let length = header(&head, "content-length").and_then(|v| v.parse::<usize>().ok()).unwrap_or(0);
            if buf.len() >= end + 4 + length {
                return String::from_utf8_lossy(&buf[..end + 4 + length]).into_owned();
            }
        }
        let n = tokio::time::timeout(Duration::from_secs(10), stream.read(&mut chunk))
            .await
            .expect("timed out reading response")
            .unwrap();
        assert!(n > 0, "connection closed mid-response: {:?}", String::from_utf8_lossy(&buf));
        buf.extend_from_slice(&chunk[..n]);
    }
}

pub fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack.windows(needle.len()).position(|w| w == needle)
}

/// Case-insensitive header lookup in a raw message head.
pub fn header<'a>(head: &'a str, name: &str) -> Option<&'a str> {
    head.lines().find_map(|line| {
        let (k, v) = line.split_once(':')?;
        k.trim().eq_ignore_ascii_case(name).then(|| v.trim())
    })
}

/// Body of a raw response (everything after the blank line).
pub fn body(response: &str) -> &str {
    response.split_once("\r\n\r\n").map(|(_, b)| b).unwrap_or("")
}

/// One request as seen by a [`ScriptedBackend`].
#[derive(Debug, Clone)]
pub struct Recorded {
    pub head: String,
    pub body: Vec<u8>,
    pub connection: usize,
}

impl Recorded {
    pub fn request_line(&self) -> &str {
        self.head.lines().next().unwrap_or("")
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        header(&self.head, name)
    }
}

type Script = Arc<dyn Fn(&Recorded) -> Vec<u8> + Send + Sync>;

/// Raw HTTP/1.1 peer for client tests: records every request, answers with
/// whatever the script returns, and closes when the answer says so.
pub struct ScriptedBackend {
    pub addr: SocketAddr,
    pub requests: Arc<Mutex<Vec<Recorded>>>,
    pub connections: Arc<AtomicUsize>,
}

impl ScriptedBackend {
    pub async fn start<F, R>(script: F) -> Self
    where
        F: Fn(&Recorded) -> R + Send + Sync + 'static,
        R: Into<Vec<u8>>,
    {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let requests = Arc::new(Mutex::new(Vec::new()));
        let connections = Arc::new(AtomicUsize::new(0));
        let script: Script = Arc::new(move |r: &Recorded| script(r).into());

        let (reqs, conns) = (requests.clone(), connections.clone());
        tokio::spawn(async move {
            while let Ok((socket, _)) = listener.accept().await {
                let id = conns.fetch_add(1, Ordering::SeqCst) + 1;
                tokio::spawn(serve_scripted(socket, id, script.clone(), reqs.clone()));
            }
        });
        Self {
            addr,
            requests,
            connections,
        }
    }

    pub fn base(&self) -> String {
        format!("http://{}", self.addr)
    }

    pub fn recorded(&self) -> Vec<Recorded> {
        self.requests.lock().unwrap().clone()
    }

    pub fn connection_count(&self) -> usize {
        self.connections.load(Ordering::SeqCst)
    }
}

async fn serve_scripted(mut socket: TcpStream, id: usize, script: Script, requests: Arc<Mutex<Vec<Recorded>>>) {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 4096];
    loop {
        let request = loop {
            if let Some(request) = take_request(&mut buf, id) {
                break request;
            }
            match socket.read(&mut chunk).await {
                Ok(0) | Err(_) => return,
                Ok(n) => buf.extend_from_slice(&chunk[..n]),
            }
        };
        let response = script(&request);
        requests.lock().unwrap().push(request);
        if socket.write_all(&response).await.is_err() {
            return;
        }
        let head_end = find(&response, b"\r\n\r\n").unwrap_or(response.len());
        if String::from_utf8_lossy(&response[..head_end]).to_ascii_lowercase().contains("connection: close") {
            let _ = socket.shutdown().await;
            return;
        }
    }
}

/// Split one complete request off the front of `buf`.
fn take_request(buf: &mut Vec<u8>, connection: usize) -> Option<Recorded> {
    let end = find(buf, b"\r\n\r\n")?;
    let head = String::from_utf8_lossy(&buf[..end]).into_owned();
    let start = end + 4;
    let chunked = header(&head, "transfer-encoding").is_some_and(|v| v.eq_ignore_ascii_case("chunked"));

    let (body, consumed) = if chunked {
        let mut body = Vec::new();
        let mut pos = start;
        loop {
            let line_end = pos + find(&buf[pos..], b"\r\n")?;
            let size = usize::from_str_radix(std::str::from_utf8(&buf[pos..line_end]).ok()?.trim(), 16).ok()?;
            pos = line_end + 2;
            if size == 0 {
                let trailer_end = pos + find(&buf[pos..], b"\r\n")?;
                break (body, trailer_end + 2);
            }
            if buf.len() < pos + size + 2 {
                return None;
            }
            body.extend_from_slice(&buf[pos..pos + size]);
            pos += size + 2;
        }
    } else {
        let length = header(&head, "content-length").and_then(|v| v.parse::<usize>().ok()).unwrap_or(0);
        if buf.len() < start + length {
            return None;
        }
        (buf[start..start + length].to_vec(), start + length)
    };

    buf.drain(..consumed);
    Some(Recorded { head, body, connection })
}

/// `HTTP/1.1 <status>` response with a body and extra header lines.
pub fn response(status: &str, extra_headers: &[&str], body: &str) -> String {
    let mut out = format!("HTTP/1.1 {}\r\nContent-Length: {}\r\n", status, body.len());
    for h in extra_headers {
        out.push_str(h);
        out.push_str("\r\n");
    }
    out.push_str("\r\n");
    out.push_str(body);
    out
}
