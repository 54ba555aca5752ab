//! Requests over a real TCP socket.

use std::net::SocketAddr;
use std::time::Duration;

use http::StatusCode;
use pylon_config::ServerConfig;
use pylon_middleware::stages::{abort_if, real_ip, RealIp};
use pylon_middleware::{components, handler_fn};
use pylon_core::HttpError;
use pylon_server::{path_param, Router, RouterOptions, Server, ShutdownSignal};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

async fn start(config: ServerConfig) -> (SocketAddr, ShutdownSignal, tokio::task::JoinHandle<()>) {
    let options = RouterOptions {
        server_name: "pylon-test".to_string(),
        real_ip: Some(RealIp::new()),
        ..Default::default()
    };
    let mut router = Router::new(options);
    router.get(
        "/hello/{name}",
        components![handler_fn(|ex| {
            Box::pin(async move {
                let name = path_param(ex, "name").unwrap_or("world").to_owned();
                ex.respond_text(StatusCode::OK, format!("hello {name}"));
            })
        })],
    );
    router.get(
        "/ip",
        components![handler_fn(|ex| {
            Box::pin(async move {
                let ip = real_ip(ex).map(|ip| ip.to_string()).unwrap_or_default();
                ex.respond_text(StatusCode::OK, ip);
            })
        })],
    );
    router.post(
        "/len",
        components![
            abort_if(
                |ex| ex.request().body().is_empty(),
                HttpError::bad_request("empty body"),
            ),
            handler_fn(|ex| {
                Box::pin(async move {
                    let len = ex.request().body().len();
                    ex.respond_text(StatusCode::OK, len.to_string());
                })
            }),
        ],
    );

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let shutdown = ShutdownSignal::new();
    let server = Server::new(config, router.build().unwrap());
    let handle = {
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            server.serve(listener, shutdown).await.unwrap();
        })
    };
    (addr, shutdown, handle)
}

async fn send(addr: SocketAddr, raw: String) -> String {
    let mut stream = TcpStream::connect(addr).await.unwrap();
    stream.write_all(raw.as_bytes()).await.unwrap();
    let mut out = Vec::new();
    tokio::time::timeout(Duration::from_secs(5), stream.read_to_end(&mut out))
        .await
        .expect("response in time")
        .unwrap();
    String::from_utf8_lossy(&out).into_owned()
}

fn get(path: &str) -> String {
    format!("GET {path} HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n")
}

fn post(path: &str, body: &str) -> String {
    format!(
        "POST {path} HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\nContent-Length: {}\r\n\r\n{body}",
        body.len()
    )
}

#[tokio::test]
async fn routed_request_round_trips() {
    let (addr, shutdown, handle) = start(ServerConfig::default()).await;

    let response = send(addr, get("/hello/pylon")).await;
    assert!(response.starts_with("HTTP/1.1 200"), "{response}");
    assert!(response.to_ascii_lowercase().contains("server: pylon-test"));
    assert!(response.to_ascii_lowercase().contains("x-request-id:"));
    assert!(response.ends_with("hello pylon"));

    shutdown.trigger();
    handle.await.unwrap();
}

#[tokio::test]
async fn unknown_route_is_json_404() {
    let (addr, shutdown, handle) = start(ServerConfig::default()).await;

    let response = send(addr, get("/nope")).await;
    assert!(response.starts_with("HTTP/1.1 404"), "{response}");
    assert!(response.contains("\"NOT_FOUND\""));

    shutdown.trigger();
    handle.await.unwrap();
}

#[tokio::test]
async fn aborted_request_reports_error() {
    let (addr, shutdown, handle) = start(ServerConfig::default()).await;

    let response = send(addr, post("/len", "")).await;
    assert!(response.starts_with("HTTP/1.1 400"), "{response}");
    assert!(response.contains("empty body"));

    let response = send(addr, post("/len", "abcd")).await;
    assert!(response.ends_with("4"), "{response}");

    shutdown.trigger();
    handle.await.unwrap();
}

#[tokio::test]
async fn oversized_body_is_rejected() {
    let config = ServerConfig {
        max_body_bytes: 8,
        ..Default::default()
    };
    let (addr, shutdown, handle) = start(config).await;

    let response = send(addr, post("/len", "this body is too long")).await;
    assert!(response.starts_with("HTTP/1.1 413"), "{response}");

    shutdown.trigger();
    handle.await.unwrap();
}

#[tokio::test]
async fn client_address_comes_from_the_connection() {
    let (addr, shutdown, handle) = start(ServerConfig::default()).await;

    let response = send(addr, get("/ip")).await;
    assert!(response.ends_with("127.0.0.1"), "{response}");

    let forwarded = "GET /ip HTTP/1.1\r\nHost: localhost\r\nX-Forwarded-For: 198.51.100.7\r\nConnection: close\r\n\r\n";
    let response = send(addr, forwarded.to_string()).await;
    assert!(response.ends_with("198.51.100.7"), "{response}");

    shutdown.trigger();
    handle.await.unwrap();
}
