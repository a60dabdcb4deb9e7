//! Waypost - a small prefix-routing API gateway.
//!
//! Waypost is the single public entry point in front of a set of independently
//! deployed HTTP services (users, products, notes, ...). Every request is
//! matched against an immutable table of path prefixes and forwarded to the
//! owning backend with the prefix stripped; the backend's status, headers and
//! body come back unchanged. When the gateway itself has to answer (no route,
//! backend unreachable, backend too slow) it responds with a small JSON error
//! envelope.
//!
//! # Features
//! - Longest-prefix routing on path-segment boundaries, with alias prefixes
//!   (`/users` and `/api/users` may point at the same service)
//! - Per-service forwarding timeouts (`504`) and transport failure
//!   classification (`502`)
//! - `GET /health` liveness report and a `GET /` service descriptor
//! - Request id propagation, security headers and permissive CORS
//! - Layered configuration: defaults, optional file, environment variables
//! - Structured JSON logging via `tracing`
//! - Graceful shutdown on SIGINT/SIGTERM
//!
//! # Quick Example
//! ```no_run
//! use std::sync::Arc;
//!
//! use waypost::{GatewayServer, HttpClientAdapter, config::load_config, utils::GracefulShutdown};
//!
//! # #[tokio::main] async fn main() -> eyre::Result<()> {
//! let config = load_config(None)?;
//! let server = GatewayServer::bind(&config, Arc::new(HttpClientAdapter::new()?)).await?;
//! let shutdown = GracefulShutdown::new();
//! server.run(shutdown.shutdown_token()).await?;
//! # Ok(()) }
//! ```
//!
//! # Architecture
//! The crate separates **ports** (traits) from **adapters** (implementations)
//! while keeping routing and error translation inside `core`. The route table
//! is built once at startup and shared read-only; requests never mutate
//! gateway state, so concurrent requests are fully independent.
//!
//! # Error Handling
//! Startup APIs return `eyre::Result<T>` with `WrapErr` context. Request
//! handling uses the domain [`core::GatewayError`], which maps one-to-one onto
//! the gateway's HTTP error responses.
pub mod config;
pub mod ports;
pub mod tracing_setup;
pub mod utils;

pub mod adapters;
pub mod core;

// Re-export the specific types needed by the binary crate
pub use crate::{
    adapters::{GatewayServer, HttpClientAdapter, HttpHandler},
    core::{GatewayError, GatewayService},
    ports::http_client::HttpClient,
    utils::GracefulShutdown,
};
