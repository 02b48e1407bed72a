//! Client integration tests against scripted raw peers and the engine server.

use std::io::Write;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use flate2::write::GzEncoder;
use flate2::Compression;

use h1_engine::error::HttpError;
use h1_engine::http::{mime, Client, Headers, MultipartFormData, Params, StatusCode};

mod common;

use common::{response, start_server, Recorded, ScriptedBackend};

fn redirect(location: &str) -> String {
    response("302 Found", &[format!("Location: {}", location).as_str()], "")
}

#[tokio::test]
async fn redirect_budget_is_enforced() {
    let backend = ScriptedBackend::start(|r: &Recorded| match r.request_line() {
        l if l.starts_with("GET /start ") => redirect("/next"),
        l if l.starts_with("GET /next ") => redirect("/final"),
        _ => response("200 OK", &[], "final"),
    })
    .await;

    let mut client = Client::new(&backend.base()).unwrap();
    client.set_follow_location(true).set_max_redirects(1);
    let err = client.get("/start").await.unwrap_err();
    assert!(matches!(err, HttpError::TooManyRedirects), "{:?}", err);

    let lines: Vec<String> = backend.recorded().iter().map(|r| r.request_line().to_string()).collect();
    assert_eq!(lines, vec!["GET /start HTTP/1.1", "GET /next HTTP/1.1"]);

    let backend = ScriptedBackend::start(|_: &Recorded| redirect("/next")).await;
    let mut client = Client::new(&backend.base()).unwrap();
    client.set_follow_location(true).set_max_redirects(0);
    assert!(matches!(client.get("/start").await, Err(HttpError::TooManyRedirects)));
    assert_eq!(backend.recorded().len(), 1);
}

#[tokio::test]
async fn redirects_are_followed_and_see_other_switches_to_get() {
    let backend = ScriptedBackend::start(|r: &Recorded| match r.request_line() {
        l if l.starts_with("POST /submit ") => response("303 See Other", &["Location: /done?id=7"], ""),
        l if l.starts_with("GET /done?id=7 ") => response("200 OK", &[], "thanks"),
        _ => response("400 Bad Request", &[], "unexpected"),
    })
    .await;

    let mut client = Client::new(&backend.base()).unwrap();
    client.set_follow_location(true);
    let res = client.post("/submit", "payload", mime::TEXT_PLAIN).await.unwrap();
    assert_eq!(res.status, StatusCode::OK);
    assert_eq!(res.text(), "thanks");
    assert_eq!(res.location, format!("{}/done?id=7", backend.base()));

    let recorded = backend.recorded();
    assert_eq!(recorded.len(), 2);
    assert_eq!(recorded[0].body, b"payload");
    assert!(recorded[1].body.is_empty());
    assert_eq!(recorded[1].header("Content-Type"), None);

    // without follow_location the 3xx is returned as-is
    let client = Client::new(&backend.base()).unwrap();
    let res = client.post("/submit", "payload", mime::TEXT_PLAIN).await.unwrap();
    assert_eq!(res.status, StatusCode::SEE_OTHER);
    assert_eq!(res.header_value("Location"), Some("/done?id=7"));
}

#[tokio::test]
async fn keep_alive_reuses_socket_until_max_count() {
    let backend = ScriptedBackend::start(|_: &Recorded| response("200 OK", &[], "ok")).await;

    let mut client = Client::new(&backend.base()).unwrap();
    client.set_keep_alive(true).set_keep_alive_max_count(2).set_idle_close(None);
    for _ in 0..3 {
        assert_eq!(client.get("/").await.unwrap().text(), "ok");
    }

    let recorded = backend.recorded();
    let connections: Vec<usize> = recorded.iter().map(|r| r.connection).collect();
    assert_eq!(connections, vec![1, 1, 2]);
    assert_eq!(recorded[0].header("Connection"), None);
    assert_eq!(recorded[1].header("Connection"), Some("close"));
    assert_eq!(backend.connection_count(), 2);
    assert!(client.is_socket_open().await);

    client.stop().await;
    assert!(!client.is_socket_open().await);
}

#[tokio::test]
async fn without_keep_alive_every_request_closes() {
    let backend = ScriptedBackend::start(|_: &Recorded| response("200 OK", &[], "ok")).await;
    let client = Client::new(&backend.base()).unwrap();
    client.get("/a").await.unwrap();
    client.get("/b").await.unwrap();

    assert!(backend.recorded().iter().all(|r| r.header("Connection") == Some("close")));
    assert!(!client.is_socket_open().await);
}

#[tokio::test]
async fn idle_socket_is_closed_after_timeout() {
    let backend = ScriptedBackend::start(|_: &Recorded| response("200 OK", &[], "ok")).await;
    let mut client = Client::new(&backend.base()).unwrap();
    client.set_keep_alive(true).set_idle_close(Some(Duration::from_millis(100)));

    client.get("/").await.unwrap();
    assert!(client.is_socket_open().await);
    tokio::time::sleep(Duration::from_millis(400)).await;
    assert!(!client.is_socket_open().await);

    // the next call reconnects
    client.get("/").await.unwrap();
    assert_eq!(backend.connection_count(), 2);
}

#[tokio::test]
async fn chunked_response_is_reassembled() {
    let backend = ScriptedBackend::start(|_: &Recorded| {
        "HTTP/1.1 200 OK\r\nTransfer-Encoding: chunked\r\n\r\n5\r\nhello\r\n6\r\n world\r\n0\r\n\r\n"
    })
    .await;
    let client = Client::new(&backend.base()).unwrap();
    let res = client.get("/").await.unwrap();
    assert_eq!(res.text(), "hello world");
}

#[tokio::test]
async fn body_until_close_is_read_to_eof() {
    let backend = ScriptedBackend::start(|_: &Recorded| "HTTP/1.0 200 OK\r\nConnection: close\r\n\r\nlegacy body").await;
    let client = Client::new(&backend.base()).unwrap();
    let res = client.get("/").await.unwrap();
    assert_eq!(res.text(), "legacy body");
    assert_eq!(res.version.as_str(), "HTTP/1.0");
}

fn digest_script(r: &Recorded) -> String {
    match r.header("Authorization") {
        Some(auth) if auth.starts_with("Digest ") => response("200 OK", &[], "secret"),
        _ => response(
            "401 Unauthorized",
            &[r#"WWW-Authenticate: Digest realm="vault", nonce="abc123", qop="auth", opaque="xyz""#],
            "denied",
        ),
    }
}

fn quoted<'a>(header: &'a str, key: &str) -> &'a str {
    let start = header.find(&format!("{}=\"", key)).unwrap() + key.len() + 2;
    let len = header[start..].find('"').unwrap();
    &header[start..start + len]
}

#[tokio::test]
async fn digest_challenge_is_answered_once() {
    let backend = ScriptedBackend::start(digest_script).await;
    let mut client = Client::new(&backend.base()).unwrap();
    client.set_digest_auth("alice", "wonderland");

    let res = client.get("/private").await.unwrap();
    assert_eq!(res.status, StatusCode::OK);
    assert_eq!(res.text(), "secret");

    let recorded = backend.recorded();
    assert_eq!(recorded.len(), 2);
    assert_eq!(recorded[0].header("Authorization"), None);

    let auth = recorded[1].header("Authorization").unwrap();
    assert_eq!(quoted(auth, "username"), "alice");
    assert_eq!(quoted(auth, "uri"), "/private");
    assert_eq!(quoted(auth, "opaque"), "xyz");
    assert!(auth.contains("nc=00000001"));

    let cnonce = quoted(auth, "cnonce");
    let ha1 = format!("{:x}", md5::compute("alice:vault:wonderland"));
    let ha2 = format!("{:x}", md5::compute("GET:/private"));
    let expected = format!("{:x}", md5::compute(format!("{}:abc123:00000001:{}:auth:{}", ha1, cnonce, ha2)));
    assert_eq!(quoted(auth, "response"), expected);
}

#[tokio::test]
async fn digest_without_credentials_returns_challenge() {
    let backend = ScriptedBackend::start(digest_script).await;
    let client = Client::new(&backend.base()).unwrap();
    let res = client.get("/private").await.unwrap();
    assert_eq!(res.status, StatusCode::UNAUTHORIZED);
    assert_eq!(res.text(), "denied");
    assert_eq!(backend.recorded().len(), 1);
}

#[tokio::test]
async fn basic_auth_is_sent_up_front() {
    let backend = ScriptedBackend::start(|_: &Recorded| response("200 OK", &[], "ok")).await;
    let mut client = Client::new(&backend.base()).unwrap();
    client.set_basic_auth("Aladdin", "open sesame");
    client.get("/").await.unwrap();
    assert_eq!(
        backend.recorded()[0].header("Authorization"),
        Some("Basic QWxhZGRpbjpvcGVuIHNlc2FtZQ==")
    );
}

#[tokio::test]
async fn http_proxy_gets_absolute_target_and_digest_replay() {
    let proxy = ScriptedBackend::start(|r: &Recorded| match r.header("Proxy-Authorization") {
        Some(auth) if auth.starts_with("Digest ") => response("200 OK", &[], "via proxy"),
        _ => response(
            "407 Proxy Authentication Required",
            &[r#"Proxy-Authenticate: Digest realm="proxy", nonce="n1""#],
            "",
        ),
    })
    .await;

    let mut client = Client::new("http://origin.test:8080").unwrap();
    client
        .set_proxy("127.0.0.1", proxy.addr.port())
        .set_proxy_digest_auth("p", "q");
    let res = client.get("/x?y=1").await.unwrap();
    assert_eq!(res.text(), "via proxy");

    let recorded = proxy.recorded();
    assert_eq!(recorded.len(), 2);
    assert_eq!(recorded[0].request_line(), "GET http://origin.test:8080/x?y=1 HTTP/1.1");
    assert_eq!(recorded[0].header("Host"), Some("origin.test:8080"));
    let auth = recorded[1].header("Proxy-Authorization").unwrap();
    assert_eq!(quoted(auth, "realm"), "proxy");
    assert_eq!(quoted(auth, "uri"), "/x?y=1");
}

#[tokio::test]
async fn gzip_body_is_decoded_when_compress_is_on() {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(b"squeezed text").unwrap();
    let gz = encoder.finish().unwrap();

    let backend = ScriptedBackend::start(move |_: &Recorded| {
        let mut out = format!("HTTP/1.1 200 OK\r\nContent-Encoding: gzip\r\nContent-Length: {}\r\n\r\n", gz.len()).into_bytes();
        out.extend_from_slice(&gz);
        out
    })
    .await;

    let mut client = Client::new(&backend.base()).unwrap();
    client.set_compress(true);
    let res = client.get("/").await.unwrap();
    assert_eq!(res.text(), "squeezed text");
    assert_eq!(backend.recorded()[0].header("Accept-Encoding"), Some("gzip, deflate"));
}

#[tokio::test]
async fn connect_failure_is_transport_error() {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);

    let client = Client::new(&format!("http://127.0.0.1:{}", port)).unwrap();
    let err = client.get("/").await.unwrap_err();
    assert!(err.is_transport(), "{:?}", err);
}

#[tokio::test]
async fn default_headers_and_user_headers() {
    let backend = ScriptedBackend::start(|_: &Recorded| response("200 OK", &[], "ok")).await;
    let mut client = Client::new(&backend.base()).unwrap();
    let mut defaults = Headers::new();
    defaults.set("X-Team", "core");
    defaults.set("Accept", "text/plain");
    client.set_default_headers(defaults);

    let mut headers = Headers::new();
    headers.set("Accept", "application/json");
    client.get_with_headers("/", headers).await.unwrap();

    let recorded = backend.recorded();
    assert_eq!(recorded[0].header("X-Team"), Some("core"));
    assert_eq!(recorded[0].header("Accept"), Some("application/json"));
    assert!(recorded[0].header("User-Agent").unwrap().starts_with("h1-engine/"));
}

#[tokio::test]
async fn client_against_engine_server() {
    let server = start_server(|s| {
        s.get("/", |_, res| res.set_content("Hello World!", mime::TEXT_PLAIN))
            .post("/echo", |req, res| {
                let content_type = req.header_value("Content-Type").unwrap_or(mime::TEXT_PLAIN).to_string();
                res.set_content(req.body.clone(), &content_type);
            })
            .post("/form", |req, res| {
                res.set_content(format!("{}+{}", req.param_value("a").unwrap_or(""), req.param_value("b").unwrap_or("")), mime::TEXT_PLAIN)
            })
            .post("/files", |req, res| {
                let names: Vec<String> = req
                    .files
                    .iter()
                    .map(|f| format!("{}={}", f.name, String::from_utf8_lossy(&f.content)))
                    .collect();
                res.set_content(names.join(","), mime::TEXT_PLAIN);
            })
            .get("/big", |_, res| res.set_content(vec![b'z'; 10_000], mime::APPLICATION_OCTET_STREAM));
    })
    .await;

    let mut client = Client::new(&server.base()).unwrap();
    client.set_keep_alive(true);

    let res = client.get("/").await.unwrap();
    assert_eq!(res.status, StatusCode::OK);
    assert_eq!(res.header_value("content-length"), Some("12"));
    assert_eq!(res.text(), "Hello World!");

    let res = client.post("/echo", "ping", mime::TEXT_PLAIN).await.unwrap();
    assert_eq!(res.text(), "ping");

    let mut params = Params::new();
    params.append("a", "1 2");
    params.append("b", "&=");
    assert_eq!(client.post_form("/form", &params).await.unwrap().text(), "1 2+&=");

    let items = [MultipartFormData::new("one", "1"), MultipartFormData::new("two", "22")];
    assert_eq!(client.post_multipart("/files", &items).await.unwrap().text(), "one=1,two=22");

    let mut sent = 0u64;
    let res = client
        .post_with_provider("/echo", 6, mime::TEXT_PLAIN, move |_, _, sink| {
            let ok = sink.write(if sent == 0 { b"abc" } else { b"def" });
            sent += 3;
            ok
        })
        .await
        .unwrap();
    assert_eq!(res.text(), "abcdef");

    let res = client
        .post_chunked("/echo", mime::TEXT_PLAIN, |offset, sink| {
            if offset < 4 {
                sink.write(b"xy");
            } else {
                sink.done();
            }
            true
        })
        .await
        .unwrap();
    assert_eq!(res.text(), "xyxy");

    let received = Arc::new(Mutex::new(Vec::new()));
    let last_progress = Arc::new(Mutex::new((0u64, 0u64)));
    let (sink, progress) = (received.clone(), last_progress.clone());
    let res = client
        .get_with_receiver(
            "/big",
            move |data: &[u8]| {
                sink.lock().unwrap().extend_from_slice(data);
                true
            },
            Some(move |got: u64, total: u64| {
                *progress.lock().unwrap() = (got, total);
                true
            }),
        )
        .await
        .unwrap();
    assert!(res.body.is_empty());
    assert_eq!(received.lock().unwrap().len(), 10_000);
    assert_eq!(*last_progress.lock().unwrap(), (10_000, 10_000));

    let res = client.get("/missing").await.unwrap();
    assert_eq!(res.status, StatusCode::NOT_FOUND);

    client.stop().await;
    server.stop().await.unwrap();
}

#[tokio::test]
async fn receiver_can_cancel_download() {
    let server = start_server(|s| {
        s.get("/big", |_, res| res.set_content(vec![b'z'; 100_000], mime::APPLICATION_OCTET_STREAM));
    })
    .await;

    let client = Client::new(&server.base()).unwrap();
    let err = client
        .get_with_receiver("/big", |_: &[u8]| false, None::<fn(u64, u64) -> bool>)
        .await
        .unwrap_err();
    assert!(matches!(err, HttpError::Canceled), "{:?}", err);

    server.stop().await.unwrap();
}
