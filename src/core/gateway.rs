//! Core gateway orchestration service.
//!
//! The `GatewayService` ties the immutable [`RouteTable`] to the outbound
//! [`HttpClient`] port and runs the fixed per-request stage sequence:
//! * route resolution (no match → `RouteNotFound`)
//! * outbound request preparation (path rewrite, header stripping)
//! * forwarding through the client port
//! * transport failure translation
//!
//! Backend responses come back untouched whatever their status code.
use std::{collections::BTreeMap, sync::Arc};

use serde::Serialize;

use crate::{
    config::ServerConfig,
    core::{
        error::GatewayError,
        forwarder::{InboundRequest, prepare_outbound},
        health::{HealthReport, HealthReporter, SERVICE_NAME},
        route::{RouteTable, RouteTableError},
    },
    ports::{BackendResponse, HttpClient},
};

/// Static self-description served on `GET /`.
#[derive(Debug, Serialize)]
pub struct ServiceDescriptor {
    pub message: &'static str,
    pub service: &'static str,
    pub version: &'static str,
    /// Primary entry point per service plus the health endpoint
    pub endpoints: BTreeMap<String, String>,
    /// Every routable prefix, most specific first
    pub prefixes: Vec<String>,
    pub timestamp: String,
}

/// Central orchestrator for routing and forwarding. Cheap to share (Arc inside).
pub struct GatewayService {
    routes: Arc<RouteTable>,
    http_client: Arc<dyn HttpClient>,
    health: HealthReporter,
}

impl GatewayService {
    pub fn new(routes: Arc<RouteTable>, http_client: Arc<dyn HttpClient>) -> Self {
        Self {
            routes,
            http_client,
            health: HealthReporter::new(),
        }
    }

    /// Build the route table from configuration and wrap it in a service.
    pub fn from_config(
        config: &ServerConfig,
        http_client: Arc<dyn HttpClient>,
    ) -> Result<Self, RouteTableError> {
        let routes = RouteTable::from_config(config)?;
        Ok(Self::new(Arc::new(routes), http_client))
    }

    pub fn routes(&self) -> &RouteTable {
        &self.routes
    }

    pub fn health(&self) -> HealthReport {
        self.health.report()
    }

    pub fn descriptor(&self) -> ServiceDescriptor {
        let mut endpoints = BTreeMap::new();
        endpoints.insert("health".to_string(), "/health".to_string());

        // Shortest prefix of each service is its primary entry point.
        for route in self.routes.routes() {
            endpoints
                .entry(route.service_key.clone())
                .and_modify(|current: &mut String| {
                    if route.prefix.len() < current.len() {
                        *current = route.prefix.clone();
                    }
                })
                .or_insert_with(|| route.prefix.clone());
        }

        ServiceDescriptor {
            message: "Welcome to the Waypost API Gateway",
            service: SERVICE_NAME,
            version: env!("CARGO_PKG_VERSION"),
            endpoints,
            prefixes: self.routes.routes().iter().map(|r| r.prefix.clone()).collect(),
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }

    /// Route and forward one request.
    ///
    /// `Ok` carries whatever the backend answered, 4xx/5xx included. `Err` is
    /// reserved for situations where the gateway must author the response.
    pub async fn forward(&self, inbound: InboundRequest) -> Result<BackendResponse, GatewayError> {
        let route_match = self.routes.resolve(&inbound.path).ok_or_else(|| {
            GatewayError::RouteNotFound {
                path: inbound.original_url(),
            }
        })?;

        let route = route_match.route;
        tracing::debug!(
            prefix = %route.prefix,
            service = %route.service_key,
            forward_path = %route_match.forward_path,
            "Matched route"
        );

        let outbound = prepare_outbound(&route_match, inbound)?;

        match self.http_client.send_request(outbound).await {
            Ok(response) => Ok(response),
            Err(failure) => {
                tracing::warn!(
                    service = %route.service_key,
                    kind = %failure.kind,
                    "Backend transport failure: {}",
                    failure.cause
                );
                Err(GatewayError::from_transport(&route.service_name, failure))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use async_trait::async_trait;
    use bytes::Bytes;
    use hyper::{HeaderMap, Method, StatusCode};

    use super::*;
    use crate::{
        config::ServiceConfig,
        ports::{BackendOutcome, OutboundRequest, TransportFailure, TransportFailureKind},
    };

    /// Client double that records requests and replays a canned outcome.
    struct StubClient {
        outcome: BackendOutcome,
        seen: Mutex<Vec<OutboundRequest>>,
    }

    impl StubClient {
        fn new(outcome: BackendOutcome) -> Arc<Self> {
            Arc::new(Self {
                outcome,
                seen: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl HttpClient for StubClient {
        async fn send_request(&self, req: OutboundRequest) -> BackendOutcome {
            self.seen.lock().unwrap().push(req);
            self.outcome.clone()
        }
    }

    fn config() -> ServerConfig {
        ServerConfig::builder()
            .service(
                "users",
                ServiceConfig::new("http://user-service:4001", &["/users", "/api/users"])
                    .with_name("User service"),
            )
            .service(
                "products",
                ServiceConfig::new("http://product-service:4003", &["/products"])
                    .with_name("Product service"),
            )
            .build()
            .unwrap()
    }

    fn request(method: Method, path: &str) -> InboundRequest {
        InboundRequest {
            method,
            path: path.to_string(),
            query: None,
            headers: HeaderMap::new(),
            body: Bytes::new(),
            client_addr: None,
        }
    }

    fn backend(status: StatusCode, body: &'static str) -> BackendOutcome {
        Ok(BackendResponse {
            status,
            headers: HeaderMap::new(),
            body: Bytes::from_static(body.as_bytes()),
        })
    }

    #[tokio::test]
    async fn forwards_to_stripped_backend_path() {
        let client = StubClient::new(backend(StatusCode::OK, "{}"));
        let gateway = GatewayService::from_config(&config(), client.clone()).unwrap();

        gateway
            .forward(request(Method::GET, "/users/123"))
            .await
            .unwrap();

        let seen = client.seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].method, Method::GET);
        assert_eq!(seen[0].uri, "http://user-service:4001/123");
    }

    #[tokio::test]
    async fn backend_errors_are_relayed_not_translated() {
        let client = StubClient::new(backend(
            StatusCode::INTERNAL_SERVER_ERROR,
            r#"{"error":"db down"}"#,
        ));
        let gateway = GatewayService::from_config(&config(), client).unwrap();

        let response = gateway
            .forward(request(Method::GET, "/products/1"))
            .await
            .unwrap();
        assert_eq!(response.status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(response.body, Bytes::from_static(br#"{"error":"db down"}"#));
    }

    #[tokio::test]
    async fn unmatched_path_is_route_not_found() {
        let client = StubClient::new(backend(StatusCode::OK, "{}"));
        let gateway = GatewayService::from_config(&config(), client.clone()).unwrap();

        let mut req = request(Method::GET, "/unknown");
        req.query = Some("x=1".to_string());
        let err = gateway.forward(req).await.unwrap_err();

        assert!(matches!(&err, GatewayError::RouteNotFound { path } if path == "/unknown?x=1"));
        assert!(client.seen.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn transport_failures_are_translated_per_service() {
        let client = StubClient::new(Err(TransportFailure::new(
            TransportFailureKind::ConnectionRefused,
            "tcp connect error: Connection refused",
        )));
        let gateway = GatewayService::from_config(&config(), client).unwrap();
        let err = gateway
            .forward(request(Method::POST, "/products"))
            .await
            .unwrap_err();
        assert_eq!(err.status(), StatusCode::BAD_GATEWAY);
        assert_eq!(err.envelope().error, "Product service unavailable");

        let client = StubClient::new(Err(TransportFailure::new(
            TransportFailureKind::Timeout,
            "timed out",
        )));
        let gateway = GatewayService::from_config(&config(), client).unwrap();
        let err = gateway
            .forward(request(Method::GET, "/api/users/5"))
            .await
            .unwrap_err();
        assert_eq!(err.status(), StatusCode::GATEWAY_TIMEOUT);
        assert_eq!(err.envelope().error, "User service timeout");
    }

    #[tokio::test]
    async fn descriptor_lists_primary_prefixes() {
        let client = StubClient::new(backend(StatusCode::OK, "{}"));
        let gateway = GatewayService::from_config(&config(), client).unwrap();
        let descriptor = gateway.descriptor();

        assert_eq!(descriptor.service, "api-gateway");
        assert_eq!(descriptor.endpoints["users"], "/users");
        assert_eq!(descriptor.endpoints["products"], "/products");
        assert_eq!(descriptor.endpoints["health"], "/health");
        assert_eq!(descriptor.prefixes.len(), 3);
        assert_eq!(descriptor.prefixes[0], "/api/users");
    }
}
