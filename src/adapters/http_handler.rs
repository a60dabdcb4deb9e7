use std::{error::Error as StdError, net::SocketAddr, sync::Arc};

use axum::{
    Router,
    body::Body as AxumBody,
    extract::{ConnectInfo, Request},
    http::{HeaderValue, Method, StatusCode, header},
    middleware,
    response::{IntoResponse, Response},
};
use http_body_util::LengthLimitError;
use serde::Serialize;
use tower_http::{catch_panic::CatchPanicLayer, trace::TraceLayer};

use crate::{
    adapters::middleware::{
        cors_middleware, panic_response, request_id_middleware, request_timing_middleware,
        security_headers_middleware,
    },
    core::{GatewayError, GatewayService, InboundRequest},
    ports::BackendResponse,
};

/// HTTP handler for the Waypost API Gateway
pub struct HttpHandler {
    gateway_service: Arc<GatewayService>,
    max_body_bytes: usize,
}

impl HttpHandler {
    pub fn new(gateway_service: Arc<GatewayService>, max_body_bytes: usize) -> Self {
        Self {
            gateway_service,
            max_body_bytes,
        }
    }

    /// Main request handler that routes requests appropriately
    pub async fn handle_request(&self, req: Request) -> Result<Response, GatewayError> {
        // Only GET/HEAD are answered locally; other methods fall through to routing.
        if matches!(*req.method(), Method::GET | Method::HEAD) {
            match req.uri().path() {
                "/health" => return self.handle_health_check(),
                "/" => return self.handle_descriptor(),
                _ => {}
            }
        }

        self.handle_proxy_request(req).await
    }

    fn handle_health_check(&self) -> Result<Response, GatewayError> {
        json_response(StatusCode::OK, &self.gateway_service.health())
    }

    fn handle_descriptor(&self) -> Result<Response, GatewayError> {
        json_response(StatusCode::OK, &self.gateway_service.descriptor())
    }

    /// Buffer the request, forward it and relay whatever the backend answered.
    async fn handle_proxy_request(&self, req: Request) -> Result<Response, GatewayError> {
        let inbound = self.read_inbound(req).await?;
        let response = self.gateway_service.forward(inbound).await?;
        Ok(relay(response))
    }

    async fn read_inbound(&self, req: Request) -> Result<InboundRequest, GatewayError> {
        let client_addr = req
            .extensions()
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| *addr);

        let (parts, body) = req.into_parts();
        let body = axum::body::to_bytes(body, self.max_body_bytes)
            .await
            .map_err(|e| {
                if exceeds_length_limit(&e) {
                    GatewayError::PayloadTooLarge(format!(
                        "request body exceeds {} bytes",
                        self.max_body_bytes
                    ))
                } else {
                    GatewayError::internal(format!("failed to read request body: {e}"))
                }
            })?;

        Ok(InboundRequest {
            method: parts.method,
            path: parts.uri.path().to_string(),
            query: parts.uri.query().map(str::to_string),
            headers: parts.headers,
            body,
            client_addr,
        })
    }
}

impl Clone for HttpHandler {
    fn clone(&self) -> Self {
        Self {
            gateway_service: self.gateway_service.clone(),
            max_body_bytes: self.max_body_bytes,
        }
    }
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        match &self {
            GatewayError::InternalFault(cause) => tracing::error!("Internal fault: {}", cause),
            GatewayError::RouteNotFound { path } => tracing::debug!("No route for {}", path),
            other => tracing::warn!("{}", other),
        }

        (
            self.status(),
            [(header::CONTENT_TYPE, "application/json")],
            self.envelope_json(),
        )
            .into_response()
    }
}

/// Build the gateway router with the full middleware stack.
///
/// Every request, including asterisk-form `OPTIONS *`, lands in the single
/// fallback; path dispatch happens in [`HttpHandler::handle_request`].
pub fn router(handler: Arc<HttpHandler>) -> Router {
    // Innermost first: panics still get CORS/security headers and a request id.
    Router::new()
        .fallback(move |req: Request| {
            let handler = handler.clone();
            async move {
                match handler.handle_request(req).await {
                    Ok(response) => response,
                    Err(err) => err.into_response(),
                }
            }
        })
        .layer(CatchPanicLayer::custom(panic_response))
        .layer(middleware::from_fn(cors_middleware))
        .layer(middleware::from_fn(security_headers_middleware))
        .layer(middleware::from_fn(request_timing_middleware))
        .layer(middleware::from_fn(request_id_middleware))
        .layer(TraceLayer::new_for_http())
}

/// Copy a buffered backend response into an axum response, status and headers intact.
pub fn relay(response: BackendResponse) -> Response {
    let mut relayed = Response::new(AxumBody::from(response.body));
    *relayed.status_mut() = response.status;
    *relayed.headers_mut() = response.headers;
    relayed
}

fn json_response<T: Serialize>(status: StatusCode, value: &T) -> Result<Response, GatewayError> {
    let body = serde_json::to_vec(value).map_err(GatewayError::internal)?;
    let mut response = Response::new(AxumBody::from(body));
    *response.status_mut() = status;
    response.headers_mut().insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("application/json"),
    );
    Ok(response)
}

fn exceeds_length_limit(err: &axum::Error) -> bool {
    let mut current: Option<&(dyn StdError + 'static)> = Some(err);
    while let Some(e) = current {
        if e.is::<LengthLimitError>() {
            return true;
        }
        current = e.source();
    }
    false
}
