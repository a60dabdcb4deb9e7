//! Axum middleware applied around every gateway response.
//!
//! These are small stateless layers assembled once, in a fixed order, by
//! [`router`](crate::adapters::http_handler::router): request id propagation,
//! request timing (access log), security headers, CORS and panic isolation.
//! Headers set by a backend are never overwritten.
use std::{any::Any, time::Instant};

use axum::{
    body::Body,
    extract::Request,
    http::{HeaderName, HeaderValue, Method, StatusCode, header},
    middleware::Next,
    response::Response,
};
use tracing::Instrument;

use crate::{core::error::GatewayError, tracing_setup::create_request_span};

pub const X_REQUEST_ID: HeaderName = HeaderName::from_static("x-request-id");

/// Longest caller-supplied request id that is propagated as-is.
const MAX_REQUEST_ID_LEN: usize = 128;

/// Log start/end of a request including latency.
pub async fn request_timing_middleware(req: Request, next: Next) -> Response {
    let start = Instant::now();
    let method = req.method().clone();
    let uri = req.uri().clone();
    let version = req.version();

    tracing::debug!("Started processing {} {} {:?}", method, uri, version);

    let response = next.run(req).await;
    let duration = start.elapsed();

    let span = tracing::Span::current();
    span.record("http.status_code", response.status().as_u16());
    span.record("duration_ms", duration.as_millis() as u64);

    tracing::info!(
        http.method = %method,
        http.path = %uri,
        http.status_code = response.status().as_u16(),
        duration_ms = duration.as_millis() as u64,
        "Completed {} {} {:?} - {} in {:?}",
        method,
        uri,
        version,
        response.status(),
        duration
    );

    response
}

/// Keep an incoming `X-Request-ID` or mint a UUID; forward it to the backend
/// and expose it on the response.
pub async fn request_id_middleware(mut req: Request, next: Next) -> Response {
    let incoming = req
        .headers()
        .get(&X_REQUEST_ID)
        .filter(|v| !v.is_empty() && v.len() <= MAX_REQUEST_ID_LEN)
        .cloned();

    let request_id = match incoming {
        Some(value) => Some(value),
        None => HeaderValue::from_str(&uuid::Uuid::new_v4().to_string()).ok(),
    };

    let Some(request_id) = request_id else {
        return next.run(req).await;
    };

    req.headers_mut().insert(X_REQUEST_ID, request_id.clone());
    let span = create_request_span(
        req.method().as_str(),
        req.uri().path(),
        request_id.to_str().unwrap_or_default(),
    );

    let mut response = next.run(req).instrument(span).await;
    response
        .headers_mut()
        .entry(X_REQUEST_ID)
        .or_insert(request_id);
    response
}

/// Add common security hardening headers without overwriting backend ones.
pub async fn security_headers_middleware(req: Request, next: Next) -> Response {
    let mut response = next.run(req).await;
    let headers = response.headers_mut();

    headers
        .entry(header::X_CONTENT_TYPE_OPTIONS)
        .or_insert(HeaderValue::from_static("nosniff"));
    headers
        .entry(header::X_FRAME_OPTIONS)
        .or_insert(HeaderValue::from_static("DENY"));
    headers
        .entry(header::X_XSS_PROTECTION)
        .or_insert(HeaderValue::from_static("0"));
    headers
        .entry(header::REFERRER_POLICY)
        .or_insert(HeaderValue::from_static("no-referrer"));
    headers
        .entry(header::STRICT_TRANSPORT_SECURITY)
        .or_insert(HeaderValue::from_static("max-age=15552000; includeSubDomains"));

    response
}

/// Provide permissive CORS headers reflecting caller origin (if provided).
///
/// Preflight requests (`OPTIONS` carrying `Origin` and
/// `Access-Control-Request-Method`) are answered here with `204` on every
/// path; they never reach routing or a backend.
pub async fn cors_middleware(req: Request, next: Next) -> Response {
    let origin = req.headers().get(header::ORIGIN).cloned();

    if is_preflight(&req) {
        let requested_headers = req
            .headers()
            .get(header::ACCESS_CONTROL_REQUEST_HEADERS)
            .cloned();
        let mut response = Response::new(Body::empty());
        *response.status_mut() = StatusCode::NO_CONTENT;
        let headers = response.headers_mut();
        if let Some(requested) = requested_headers {
            headers.insert(header::ACCESS_CONTROL_ALLOW_HEADERS, requested);
        }
        headers.insert(
            header::VARY,
            HeaderValue::from_static("Access-Control-Request-Headers"),
        );
        headers.insert(header::CONTENT_LENGTH, HeaderValue::from_static("0"));
        apply_cors_headers(&mut response, origin);
        return response;
    }

    let mut response = next.run(req).await;
    apply_cors_headers(&mut response, origin);
    response
}

fn is_preflight(req: &Request) -> bool {
    req.method() == Method::OPTIONS
        && req.headers().contains_key(header::ORIGIN)
        && req
            .headers()
            .contains_key(header::ACCESS_CONTROL_REQUEST_METHOD)
}

fn apply_cors_headers(response: &mut Response, origin: Option<HeaderValue>) {
    let headers = response.headers_mut();

    headers
        .entry(header::ACCESS_CONTROL_ALLOW_ORIGIN)
        .or_insert(origin.unwrap_or_else(|| HeaderValue::from_static("*")));
    headers
        .entry(header::ACCESS_CONTROL_ALLOW_METHODS)
        .or_insert(HeaderValue::from_static(
            "GET, HEAD, PUT, PATCH, POST, DELETE, OPTIONS",
        ));
    headers
        .entry(header::ACCESS_CONTROL_ALLOW_HEADERS)
        .or_insert(HeaderValue::from_static(
            "Content-Type, Authorization, X-Requested-With, X-Request-ID",
        ));
    headers
        .entry(header::ACCESS_CONTROL_MAX_AGE)
        .or_insert(HeaderValue::from_static("86400"));
}

/// Response for a panic inside request handling; only that request fails.
pub fn panic_response(err: Box<dyn Any + Send + 'static>) -> Response<Body> {
    let detail = if let Some(s) = err.downcast_ref::<String>() {
        s.clone()
    } else if let Some(s) = err.downcast_ref::<&str>() {
        s.to_string()
    } else {
        "unknown panic".to_string()
    };
    tracing::error!("Request handler panicked: {}", detail);

    let fault = GatewayError::internal(detail);
    let mut response = Response::new(Body::from(fault.envelope_json()));
    *response.status_mut() = StatusCode::INTERNAL_SERVER_ERROR;
    response.headers_mut().insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("application/json"),
    );
    response
}
