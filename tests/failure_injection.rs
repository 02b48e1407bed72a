//! Failure injection: misbehaving peers, limits, and timeouts.

use std::time::{Duration, Instant};

use tokio::io::AsyncWriteExt;
use tokio::net::{TcpListener, TcpStream};

use h1_engine::config::ServerConfig;
use h1_engine::error::HttpError;
use h1_engine::http::{mime, Client};

mod common;

use common::{body, raw_exchange, read_response, read_until_close, start_server, start_server_with, test_config};

#[tokio::test]
async fn connection_limit_queues_excess_clients() {
    let config = ServerConfig {
        max_connections: 1,
        ..test_config()
    };
    let server = start_server_with(config, |s| {
        s.get("/", |_, res| res.set_content("ok", mime::TEXT_PLAIN));
    })
    .await;

    let mut first = TcpStream::connect(server.addr).await.unwrap();
    first.write_all(b"GET / HTTP/1.1\r\nHost: h\r\n\r\n").await.unwrap();
    assert_eq!(body(&read_response(&mut first).await), "ok");

    let mut second = TcpStream::connect(server.addr).await.unwrap();
    second.write_all(b"GET / HTTP/1.1\r\nHost: h\r\nConnection: close\r\n\r\n").await.unwrap();
    let waiting = tokio::time::timeout(Duration::from_millis(200), read_response(&mut second)).await;
    assert!(waiting.is_err(), "second connection was served while the first held the only slot");

    drop(first);
    let out = read_until_close(&mut second).await;
    assert_eq!(body(&out), "ok");

    server.stop().await.unwrap();
}

#[tokio::test]
async fn idle_keep_alive_connection_is_closed() {
    let config = ServerConfig {
        idle_timeout_ms: 100,
        ..test_config()
    };
    let server = start_server_with(config, |s| {
        s.get("/", |_, res| res.set_content("ok", mime::TEXT_PLAIN));
    })
    .await;

    let mut stream = TcpStream::connect(server.addr).await.unwrap();
    stream.write_all(b"GET / HTTP/1.1\r\nHost: h\r\n\r\n").await.unwrap();
    read_response(&mut stream).await;

    let started = Instant::now();
    let rest = read_until_close(&mut stream).await;
    assert!(rest.is_empty(), "{}", rest);
    assert!(started.elapsed() < Duration::from_secs(3));

    server.stop().await.unwrap();
}

#[tokio::test]
async fn garbage_and_oversized_targets_are_answered() {
    let server = start_server(|s| {
        s.get("/", |_, res| res.set_content("ok", mime::TEXT_PLAIN));
    })
    .await;

    let out = raw_exchange(server.addr, b"THIS IS NOT HTTP\r\n\r\n").await;
    assert!(out.starts_with("HTTP/1.1 400 Bad Request\r\n"), "{}", out);

    let long = format!("GET /{} HTTP/1.1\r\nHost: h\r\n\r\n", "a".repeat(9000));
    let out = raw_exchange(server.addr, long.as_bytes()).await;
    assert!(out.starts_with("HTTP/1.1 414 URI Too Long\r\n") || out.starts_with("HTTP/1.1 400 Bad Request\r\n"), "{}", out);

    let out = raw_exchange(server.addr, b"GET / HTTP/2.0\r\nHost: h\r\n\r\n").await;
    assert!(out.starts_with("HTTP/1.1 505 HTTP Version Not Supported\r\n"), "{}", out);

    server.stop().await.unwrap();
}

#[tokio::test]
async fn aborted_upload_does_not_disturb_other_connections() {
    let server = start_server(|s| {
        s.post("/up", |req, res| res.set_content(req.body.len().to_string(), mime::TEXT_PLAIN))
            .get("/", |_, res| res.set_content("ok", mime::TEXT_PLAIN));
    })
    .await;

    {
        let mut stream = TcpStream::connect(server.addr).await.unwrap();
        stream
            .write_all(b"POST /up HTTP/1.1\r\nHost: h\r\nContent-Length: 1000\r\n\r\nonly ten b")
            .await
            .unwrap();
    }

    let out = raw_exchange(server.addr, b"GET / HTTP/1.1\r\nHost: h\r\nConnection: close\r\n\r\n").await;
    assert_eq!(body(&out), "ok");

    server.stop().await.unwrap();
}

#[tokio::test]
async fn handler_panic_is_contained() {
    let server = start_server(|s| {
        s.get("/boom", |_, _| panic!("injected"))
            .get("/", |_, res| res.set_content("still here", mime::TEXT_PLAIN));
    })
    .await;

    let out = raw_exchange(server.addr, b"GET /boom HTTP/1.1\r\nHost: h\r\n\r\n").await;
    assert!(out.starts_with("HTTP/1.1 500 Internal Server Error\r\n"), "{}", out);

    let out = raw_exchange(server.addr, b"GET / HTTP/1.1\r\nHost: h\r\nConnection: close\r\n\r\n").await;
    assert_eq!(body(&out), "still here");

    server.stop().await.unwrap();
}

#[tokio::test]
async fn client_times_out_on_stalled_peer() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let mut held = Vec::new();
        while let Ok((socket, _)) = listener.accept().await {
            held.push(socket);
        }
    });

    let mut client = Client::new(&format!("http://{}", addr)).unwrap();
    client.set_read_timeout(Duration::from_millis(150));
    let started = Instant::now();
    let err = client.get("/").await.unwrap_err();
    assert!(matches!(err, HttpError::Timeout(_)), "{:?}", err);
    assert!(err.is_transport());
    assert!(started.elapsed() < Duration::from_secs(3));
}

#[tokio::test]
async fn stale_kept_alive_socket_is_replaced() {
    let config = ServerConfig {
        idle_timeout_ms: 100,
        ..test_config()
    };
    let server = start_server_with(config, |s| {
        s.get("/", |_, res| res.set_content("ok", mime::TEXT_PLAIN));
    })
    .await;

    let mut client = Client::new(&server.base()).unwrap();
    client.set_keep_alive(true).set_idle_close(None);
    assert_eq!(client.get("/").await.unwrap().text(), "ok");
    assert!(client.is_socket_open().await);

    // the server has dropped the idle connection; the client only finds out
    // when it tries to reuse it
    tokio::time::sleep(Duration::from_millis(400)).await;
    assert!(client.is_socket_open().await);
    assert_eq!(client.get("/").await.unwrap().text(), "ok");

    client.stop().await;
    server.stop().await.unwrap();
}
