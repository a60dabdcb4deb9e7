use std::{net::SocketAddr, sync::Arc};

use axum::Router;
use eyre::{Result, WrapErr};
use tokio::net::TcpListener;

use crate::{
    adapters::http_handler::{HttpHandler, router},
    config::ServerConfig,
    core::GatewayService,
    ports::HttpClient,
    utils::ShutdownToken,
};

/// Plain HTTP/1.1 listener serving the gateway router.
pub struct GatewayServer {
    listener: TcpListener,
    app: Router,
}

impl GatewayServer {
    /// Bind the configured listen address.
    pub async fn bind(config: &ServerConfig, http_client: Arc<dyn HttpClient>) -> Result<Self> {
        let addr = config
            .socket_addr()
            .wrap_err_with(|| format!("Invalid listen address {}", config.listen_addr()))?;
        let listener = TcpListener::bind(addr)
            .await
            .wrap_err_with(|| format!("Failed to bind to {addr}"))?;
        Self::from_listener(listener, config, http_client)
    }

    /// Serve on an already bound listener (tests bind `127.0.0.1:0`).
    pub fn from_listener(
        listener: TcpListener,
        config: &ServerConfig,
        http_client: Arc<dyn HttpClient>,
    ) -> Result<Self> {
        let gateway =
            GatewayService::from_config(config, http_client).wrap_err("Failed to build route table")?;

        for route in gateway.routes().routes() {
            tracing::info!(
                "Configured route: {} -> {} ({}, timeout {})",
                route.prefix,
                route.target_base_url(),
                route.service_name,
                humantime::format_duration(route.timeout)
            );
        }

        let handler = Arc::new(HttpHandler::new(Arc::new(gateway), config.max_body_bytes));
        Ok(Self {
            listener,
            app: router(handler),
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        self.listener
            .local_addr()
            .wrap_err("Failed to read local address")
    }

    /// Serve until `shutdown` fires, then stop accepting and drain in-flight requests.
    pub async fn run(self, shutdown: ShutdownToken) -> Result<()> {
        let addr = self.local_addr()?;
        tracing::info!("Waypost API Gateway listening on {}", addr);

        axum::serve(
            self.listener,
            self.app
                .into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(async move {
            let reason = shutdown.wait_for_shutdown().await;
            tracing::info!("Stopping listener ({:?}), draining in-flight requests", reason);
        })
        .await
        .wrap_err("Server error")
    }
}
