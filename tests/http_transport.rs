//! End-to-end tests for the HTTP disguise server.

mod common;

use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hyper::{Method, Request, StatusCode};
use hyper_util::rt::{TokioExecutor, TokioIo};
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

use common::{eventually, read_head, send_raw, start, status_of, RecordingHandler};
use disguise_proxy::config::{HttpOptions, TransportOptions};
use disguise_proxy::transport::{new_server, Network};

fn options(hosts: &[&str], path: &str) -> TransportOptions {
    TransportOptions::Http(HttpOptions {
        host: hosts.iter().map(|h| h.to_string()).collect(),
        path: path.to_string(),
        ..Default::default()
    })
}

#[tokio::test]
async fn put_is_promoted_and_echoed() {
    let handler = RecordingHandler::new();
    let running = start(new_server(&options(&[], "/v2ray"), None, handler.clone()).unwrap()).await;

    let mut client = send_raw(
        running.addr,
        b"PUT /v2ray HTTP/1.1\r\nHost: example.com\r\n\r\n",
    )
    .await;
    let head = read_head(&mut client).await;
    assert_eq!(status_of(&head), 200);
    assert!(head.to_ascii_lowercase().contains("cache-control: no-store"));

    client.write_all(b"hello").await.unwrap();
    let mut echoed = [0u8; 5];
    client.read_exact(&mut echoed).await.unwrap();
    assert_eq!(&echoed, b"hello");

    let promoted = handler.promoted();
    assert_eq!(promoted.len(), 1);
    assert_eq!(promoted[0].source, Some(client.local_addr().unwrap()));
    assert!(handler.errors().is_empty());

    drop(client);
    running.shutdown().await;
}

#[tokio::test]
async fn bytes_sent_with_the_head_reach_the_stream() {
    let handler = RecordingHandler::new();
    let running = start(new_server(&options(&[], "/v2ray"), None, handler.clone()).unwrap()).await;

    let mut client = send_raw(
        running.addr,
        b"PUT /v2ray/sub HTTP/1.1\r\nHost: example.com\r\nX-Forwarded-For: 203.0.113.9\r\n\r\nearly",
    )
    .await;
    let head = read_head(&mut client).await;
    assert_eq!(status_of(&head), 200);

    let mut echoed = [0u8; 5];
    client.read_exact(&mut echoed).await.unwrap();
    assert_eq!(&echoed, b"early");

    let source = handler.promoted()[0].source.unwrap();
    assert_eq!(source.ip().to_string(), "203.0.113.9");

    drop(client);
    running.shutdown().await;
}

#[tokio::test]
async fn custom_headers_are_sent_on_promotion() {
    let handler = RecordingHandler::new();
    let mut http = HttpOptions {
        path: "/v2ray".into(),
        ..Default::default()
    };
    http.headers.insert("Server".into(), "nginx".into());
    let running = start(new_server(&TransportOptions::Http(http), None, handler).unwrap()).await;

    let mut client = send_raw(running.addr, b"PUT /v2ray HTTP/1.1\r\nHost: a\r\n\r\n").await;
    let head = read_head(&mut client).await.to_ascii_lowercase();
    assert!(head.contains("server: nginx"));

    drop(client);
    running.shutdown().await;
}

#[tokio::test]
async fn unknown_path_is_not_found() {
    let handler = RecordingHandler::new();
    let running = start(new_server(&options(&[], "/v2ray"), None, handler.clone()).unwrap()).await;

    let mut client = send_raw(running.addr, b"GET /other HTTP/1.1\r\nHost: a\r\n\r\n").await;
    let head = read_head(&mut client).await;
    assert_eq!(status_of(&head), 404);

    eventually(|| handler.errors().len() == 1).await;
    let errors = handler.errors();
    assert!(errors[0].contains("bad path: /other"), "{}", errors[0]);
    assert_eq!(handler.fallbacks(), 1);
    assert!(handler.promoted().is_empty());

    running.shutdown().await;
}

#[tokio::test]
async fn wrong_host_is_bad_request() {
    let handler = RecordingHandler::new();
    let running = start(
        new_server(&options(&["cdn.example.com"], "/v2ray"), None, handler.clone()).unwrap(),
    )
    .await;

    let mut client = send_raw(running.addr, b"PUT /v2ray HTTP/1.1\r\nHost: evil.test\r\n\r\n").await;
    assert_eq!(status_of(&read_head(&mut client).await), 400);

    let mut client = send_raw(
        running.addr,
        b"PUT /v2ray HTTP/1.1\r\nHost: cdn.example.com\r\n\r\n",
    )
    .await;
    assert_eq!(status_of(&read_head(&mut client).await), 200);

    eventually(|| handler.promoted().len() == 1).await;
    eventually(|| handler.errors().len() == 1).await;
    assert!(handler.errors()[0].contains("bad host: evil.test"));

    drop(client);
    running.shutdown().await;
}

#[tokio::test]
async fn wrong_method_is_not_found() {
    let handler = RecordingHandler::new();
    let running = start(new_server(&options(&[], "/v2ray"), None, handler.clone()).unwrap()).await;

    let mut client = send_raw(running.addr, b"GET /v2ray HTTP/1.1\r\nHost: a\r\n\r\n").await;
    assert_eq!(status_of(&read_head(&mut client).await), 404);

    eventually(|| handler.errors().len() == 1).await;
    assert!(handler.errors()[0].contains("bad method: GET"));

    running.shutdown().await;
}

#[tokio::test]
async fn decoy_fallback_answers_probes() {
    let handler = RecordingHandler::with_decoy(b"<h1>Welcome to nginx!</h1>");
    let running = start(new_server(&options(&[], "/v2ray"), None, handler.clone()).unwrap()).await;

    let mut client = send_raw(
        running.addr,
        b"GET / HTTP/1.1\r\nHost: a\r\nConnection: close\r\n\r\n",
    )
    .await;
    let head = read_head(&mut client).await;
    assert_eq!(status_of(&head), 200);

    let mut body = Vec::new();
    client.read_to_end(&mut body).await.unwrap();
    assert!(String::from_utf8_lossy(&body).contains("<h1>Welcome to nginx!</h1>"));

    assert_eq!(handler.fallbacks(), 1);
    assert!(handler.errors().is_empty());

    running.shutdown().await;
}

#[tokio::test]
async fn rejected_connections_stay_alive() {
    let handler = RecordingHandler::with_decoy(b"<h1>Welcome to nginx!</h1>");
    let running = start(new_server(&options(&[], "/v2ray"), None, handler.clone()).unwrap()).await;

    let tcp = TcpStream::connect(running.addr).await.unwrap();
    let (mut sender, conn) = hyper::client::conn::http1::handshake(TokioIo::new(tcp))
        .await
        .unwrap();
    tokio::spawn(conn);

    for _ in 0..2 {
        sender.ready().await.unwrap();
        let request = Request::builder()
            .uri("/")
            .header("host", "a")
            .body(Full::new(Bytes::new()))
            .unwrap();
        let response = sender.send_request(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert!(response.headers().get("connection").is_none());

        let body = response.into_body().collect().await.unwrap().to_bytes();
        assert_eq!(body, "<h1>Welcome to nginx!</h1>");
    }
    assert_eq!(handler.fallbacks(), 2);

    drop(sender);
    running.shutdown().await;
}

#[tokio::test]
async fn promotion_after_rejection_on_one_connection() {
    let handler = RecordingHandler::new();
    let running = start(new_server(&options(&[], "/v2ray"), None, handler.clone()).unwrap()).await;

    let mut client = send_raw(running.addr, b"GET /other HTTP/1.1\r\nHost: a\r\n\r\n").await;
    let head = read_head(&mut client).await;
    assert_eq!(status_of(&head), 404);
    assert!(!head.to_ascii_lowercase().contains("connection: close"));

    client
        .write_all(b"PUT /v2ray HTTP/1.1\r\nHost: a\r\n\r\n")
        .await
        .unwrap();
    let head = read_head(&mut client).await;
    assert_eq!(status_of(&head), 200);
    assert!(head.to_ascii_lowercase().contains("connection: close"));

    client.write_all(b"tunnel").await.unwrap();
    let mut echoed = [0u8; 6];
    client.read_exact(&mut echoed).await.unwrap();
    assert_eq!(&echoed, b"tunnel");
    assert_eq!(handler.promoted().len(), 1);

    drop(client);
    running.shutdown().await;
}

#[tokio::test]
async fn declared_request_body_is_not_part_of_the_stream() {
    let handler = RecordingHandler::new();
    let running = start(new_server(&options(&[], "/v2ray"), None, handler.clone()).unwrap()).await;

    let mut client = send_raw(
        running.addr,
        b"PUT /v2ray HTTP/1.1\r\nHost: a\r\nContent-Length: 5\r\n\r\nhello",
    )
    .await;
    assert_eq!(status_of(&read_head(&mut client).await), 200);

    client.write_all(b"world").await.unwrap();
    let mut echoed = [0u8; 5];
    client.read_exact(&mut echoed).await.unwrap();
    assert_eq!(&echoed, b"world");

    drop(client);
    running.shutdown().await;
}

async fn h2c_client(
    addr: std::net::SocketAddr,
) -> hyper::client::conn::http2::SendRequest<Full<Bytes>> {
    let tcp = TcpStream::connect(addr).await.unwrap();
    let (sender, conn) = hyper::client::conn::http2::handshake(TokioExecutor::new(), TokioIo::new(tcp))
        .await
        .unwrap();
    tokio::spawn(conn);
    sender
}

#[tokio::test]
async fn h2c_preface_is_served_as_http2() {
    let handler = RecordingHandler::new();
    let running = start(new_server(&options(&[], "/v2ray"), None, handler.clone()).unwrap()).await;

    let mut sender = h2c_client(running.addr).await;
    let request = Request::builder()
        .method(Method::PUT)
        .uri("http://example.com/v2ray")
        .body(Full::new(Bytes::from_static(b"over h2c")))
        .unwrap();
    let response = sender.send_request(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers().get("cache-control").unwrap(), "no-store");

    let body = response.into_body().collect().await.unwrap().to_bytes();
    assert_eq!(body, "over h2c");
    assert_eq!(handler.promoted().len(), 1);

    let request = Request::builder()
        .method(Method::GET)
        .uri("http://example.com/other")
        .body(Full::new(Bytes::new()))
        .unwrap();
    let response = sender.send_request(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    drop(sender);
    running.shutdown().await;
}

#[tokio::test]
async fn close_is_idempotent_and_ends_serve() {
    let handler = RecordingHandler::new();
    let running = start(new_server(&options(&[], "/"), None, handler).unwrap()).await;
    assert_eq!(running.server.network(), &[Network::Tcp]);

    running.server.close().await.unwrap();
    running.server.close().await.unwrap();
    running.shutdown().await;
}

#[tokio::test]
async fn connections_survive_close() {
    let handler = RecordingHandler::new();
    let running = start(new_server(&options(&[], "/v2ray"), None, handler.clone()).unwrap()).await;

    let mut client = send_raw(running.addr, b"PUT /v2ray HTTP/1.1\r\nHost: a\r\n\r\n").await;
    assert_eq!(status_of(&read_head(&mut client).await), 200);

    let server = Arc::clone(&running.server);
    running.shutdown().await;
    server.close().await.unwrap();

    client.write_all(b"still").await.unwrap();
    let mut echoed = [0u8; 5];
    client.read_exact(&mut echoed).await.unwrap();
    assert_eq!(&echoed, b"still");
}
