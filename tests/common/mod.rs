#![allow(dead_code)]

use std::{net::SocketAddr, sync::Arc};

use axum::{Json, Router, extract::Request, http::HeaderMap};
use serde_json::{Value, json};
use tokio::net::TcpListener;
use waypost::{
    GatewayServer, HttpClientAdapter,
    config::{ServerConfig, ServiceConfig},
    utils::GracefulShutdown,
};

/// Serve `app` on an ephemeral port and return its address.
pub async fn spawn_backend(app: Router) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    addr
}

/// An address nothing listens on.
pub async fn closed_port() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    addr
}

pub struct TestGateway {
    pub addr: SocketAddr,
    pub shutdown: GracefulShutdown,
}

impl TestGateway {
    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }
}

pub async fn spawn_gateway(config: ServerConfig) -> TestGateway {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let client = Arc::new(HttpClientAdapter::new().unwrap());
    let server = GatewayServer::from_listener(listener, &config, client).unwrap();
    let addr = server.local_addr().unwrap();
    let shutdown = GracefulShutdown::new();
    tokio::spawn(server.run(shutdown.shutdown_token()));
    TestGateway { addr, shutdown }
}

pub fn service(addr: SocketAddr, name: &str, prefixes: &[&str]) -> ServiceConfig {
    ServiceConfig::new(format!("http://{addr}"), prefixes).with_name(name)
}

/// HTTP client that ignores proxy environment variables.
pub fn http_client() -> reqwest::Client {
    reqwest::Client::builder().no_proxy().build().unwrap()
}

fn header(headers: &HeaderMap, name: &str) -> Value {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map_or(Value::Null, |v| Value::String(v.to_string()))
}

/// Backend handler describing the request it received.
pub async fn echo(req: Request) -> Json<Value> {
    let (parts, body) = req.into_parts();
    let body = axum::body::to_bytes(body, usize::MAX).await.unwrap();
    Json(json!({
        "method": parts.method.as_str(),
        "path": parts.uri.path(),
        "query": parts.uri.query(),
        "body": String::from_utf8_lossy(&body),
        "host": header(&parts.headers, "host"),
        "content_type": header(&parts.headers, "content-type"),
        "x_forwarded_for": header(&parts.headers, "x-forwarded-for"),
        "x_forwarded_proto": header(&parts.headers, "x-forwarded-proto"),
        "x_request_id": header(&parts.headers, "x-request-id"),
        "connection_nominated": header(&parts.headers, "x-hop-secret"),
    }))
}

pub fn echo_backend() -> Router {
    Router::new().fallback(echo)
}
