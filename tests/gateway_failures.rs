// Gateway-authored responses: unknown routes, unreachable and slow backends.
mod common;

use std::{
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    time::{Duration, Instant},
};

use axum::{Router, http::StatusCode, routing::get};
use common::{closed_port, echo_backend, http_client, service, spawn_backend, spawn_gateway};
use serde_json::{Value, json};
use waypost::{config::ServerConfig, utils::ShutdownReason};

async fn slow_backend(delay: Duration) -> std::net::SocketAddr {
    spawn_backend(
        Router::new()
            .route(
                "/slow",
                get(move || async move {
                    tokio::time::sleep(delay).await;
                    "finally"
                }),
            )
            .route("/fast", get(|| async { "quick" })),
    )
    .await
}

#[tokio::test]
async fn unknown_path_gets_route_not_found_envelope() {
    let users = spawn_backend(echo_backend()).await;
    let gateway = spawn_gateway(
        ServerConfig::builder()
            .service("users", service(users, "User service", &["/users"]))
            .build()
            .unwrap(),
    )
    .await;

    let response = http_client()
        .delete(gateway.url("/unknown"))
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(response.headers()["content-type"], "application/json");
    assert_eq!(
        response.json::<Value>().await.unwrap(),
        json!({"error": "Route not found", "path": "/unknown"})
    );
}

#[tokio::test]
async fn refused_backend_is_bad_gateway() {
    let gateway = spawn_gateway(
        ServerConfig::builder()
            .service(
                "products",
                service(closed_port().await, "Product service", &["/products"]),
            )
            .build()
            .unwrap(),
    )
    .await;

    let response = http_client()
        .get(gateway.url("/products/9"))
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["error"], "Product service unavailable");
    assert!(!body["message"].as_str().unwrap().is_empty());
}

#[tokio::test]
async fn slow_backend_is_gateway_timeout() {
    let notes = slow_backend(Duration::from_secs(3)).await;
    let gateway = spawn_gateway(
        ServerConfig::builder()
            .service(
                "notes",
                service(notes, "Notes service", &["/notes"]).with_timeout("300ms"),
            )
            .build()
            .unwrap(),
    )
    .await;

    let started = Instant::now();
    let response = http_client()
        .get(gateway.url("/notes/slow"))
        .send()
        .await
        .unwrap();

    assert!(started.elapsed() < Duration::from_secs(2));
    assert_eq!(response.status(), StatusCode::GATEWAY_TIMEOUT);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["error"], "Notes service timeout");
    assert!(body["message"].as_str().unwrap().contains("300ms"));
}

#[tokio::test]
async fn slow_requests_do_not_delay_fast_ones() {
    let users = slow_backend(Duration::from_millis(800)).await;
    let gateway = spawn_gateway(
        ServerConfig::builder()
            .service("users", service(users, "User service", &["/users"]))
            .build()
            .unwrap(),
    )
    .await;
    let client = http_client();

    let slow = {
        let client = client.clone();
        let url = gateway.url("/users/slow");
        tokio::spawn(async move { client.get(url).send().await.unwrap().text().await.unwrap() })
    };
    // Let the slow request reach the backend first.
    tokio::time::sleep(Duration::from_millis(50)).await;

    let started = Instant::now();
    let fast = client
        .get(gateway.url("/users/fast"))
        .send()
        .await
        .unwrap()
        .text()
        .await
        .unwrap();
    let fast_elapsed = started.elapsed();

    assert_eq!(fast, "quick");
    assert!(fast_elapsed < Duration::from_millis(600));
    assert_eq!(slow.await.unwrap(), "finally");
}

#[tokio::test]
async fn caller_disconnect_abandons_backend_request() {
    let completed = Arc::new(AtomicBool::new(false));
    let backend_completed = completed.clone();
    let users = spawn_backend(Router::new().route(
        "/slow",
        get(move || {
            let completed = backend_completed.clone();
            async move {
                tokio::time::sleep(Duration::from_millis(600)).await;
                completed.store(true, Ordering::SeqCst);
                "finally"
            }
        }),
    ))
    .await;
    let gateway = spawn_gateway(
        ServerConfig::builder()
            .service("users", service(users, "User service", &["/users"]))
            .build()
            .unwrap(),
    )
    .await;

    let impatient = reqwest::Client::builder()
        .no_proxy()
        .timeout(Duration::from_millis(150))
        .build()
        .unwrap();
    let result = impatient.get(gateway.url("/users/slow")).send().await;
    assert!(result.unwrap_err().is_timeout());
    drop(impatient);

    // Well past the point the backend would have finished had it kept running.
    tokio::time::sleep(Duration::from_millis(900)).await;
    assert!(!completed.load(Ordering::SeqCst));
}

#[tokio::test]
async fn shutdown_stops_accepting_connections() {
    let users = spawn_backend(echo_backend()).await;
    let gateway = spawn_gateway(
        ServerConfig::builder()
            .service("users", service(users, "User service", &["/users"]))
            .build()
            .unwrap(),
    )
    .await;
    let client = http_client();

    let response = client.get(gateway.url("/users")).send().await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    gateway.shutdown.trigger_shutdown(ShutdownReason::Manual);
    tokio::time::sleep(Duration::from_millis(200)).await;

    let fresh = http_client();
    assert!(fresh.get(gateway.url("/health")).send().await.is_err());
}
