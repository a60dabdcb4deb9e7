//! Request rewriting for the forwarding stage.
//!
//! Turns an inbound request plus its resolved route into an
//! [`OutboundRequest`]: rewritten URL, sanitized headers, unchanged method and
//! body. No I/O happens here; the prepared request is handed to the
//! [`HttpClient`](crate::ports::HttpClient) port.
use std::net::SocketAddr;

use bytes::Bytes;
use hyper::{
    HeaderMap, Method, Uri,
    header::{self, HeaderName, HeaderValue},
};

use crate::{
    core::{error::GatewayError, route::RouteMatch},
    ports::OutboundRequest,
};

pub const X_FORWARDED_FOR: HeaderName = HeaderName::from_static("x-forwarded-for");
pub const X_FORWARDED_HOST: HeaderName = HeaderName::from_static("x-forwarded-host");
pub const X_FORWARDED_PROTO: HeaderName = HeaderName::from_static("x-forwarded-proto");

/// Per-hop headers plus framing headers the client recomputes.
const HOP_BY_HOP_HEADERS: &[&str] = &[
    "connection",
    "keep-alive",
    "proxy-connection",
    "proxy-authenticate",
    "proxy-authorization",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
    "host",
    "content-length",
];

/// The request as received by the gateway, body already buffered.
#[derive(Debug, Clone)]
pub struct InboundRequest {
    pub method: Method,
    pub path: String,
    pub query: Option<String>,
    pub headers: HeaderMap,
    pub body: Bytes,
    pub client_addr: Option<SocketAddr>,
}

impl InboundRequest {
    /// Path plus query string exactly as the caller sent it.
    pub fn original_url(&self) -> String {
        match &self.query {
            Some(q) => format!("{}?{}", self.path, q),
            None => self.path.clone(),
        }
    }
}

/// Remove per-hop headers, including any header nominated by `Connection`.
pub fn strip_hop_by_hop(headers: &mut HeaderMap) {
    let nominated: Vec<HeaderName> = headers
        .get_all(header::CONNECTION)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(','))
        .filter_map(|name| HeaderName::from_bytes(name.trim().as_bytes()).ok())
        .collect();

    for name in nominated {
        headers.remove(name);
    }
    for name in HOP_BY_HOP_HEADERS {
        headers.remove(*name);
    }
}

/// Build the backend request for a matched route.
pub fn prepare_outbound(
    route_match: &RouteMatch<'_>,
    inbound: InboundRequest,
) -> Result<OutboundRequest, GatewayError> {
    let route = route_match.route;
    let url = route.outbound_url(&route_match.forward_path, inbound.query.as_deref());
    let uri = url
        .parse::<Uri>()
        .map_err(|e| GatewayError::internal(format!("Failed to build backend URI '{url}': {e}")))?;

    let mut headers = inbound.headers;
    let original_host = headers.get(header::HOST).cloned();
    strip_hop_by_hop(&mut headers);

    let host = HeaderValue::from_str(route.authority())
        .map_err(|e| GatewayError::internal(format!("Invalid backend authority: {e}")))?;
    headers.insert(header::HOST, host);

    if let Some(client_addr) = inbound.client_addr {
        append_forwarded_for(&mut headers, client_addr)?;
    }
    if let Some(original_host) = original_host {
        headers.entry(X_FORWARDED_HOST).or_insert(original_host);
    }
    headers
        .entry(X_FORWARDED_PROTO)
        .or_insert(HeaderValue::from_static("http"));

    Ok(OutboundRequest {
        method: inbound.method,
        uri,
        headers,
        body: inbound.body,
        timeout: route.timeout,
    })
}

/// Append the caller to an existing `X-Forwarded-For` chain.
fn append_forwarded_for(
    headers: &mut HeaderMap,
    client_addr: SocketAddr,
) -> Result<(), GatewayError> {
    let client_ip = client_addr.ip().to_string();
    let chain = match headers.get(&X_FORWARDED_FOR).and_then(|v| v.to_str().ok()) {
        Some(existing) if !existing.trim().is_empty() => format!("{existing}, {client_ip}"),
        _ => client_ip,
    };
    let value = HeaderValue::from_str(&chain)
        .map_err(|e| GatewayError::internal(format!("Failed to encode X-Forwarded-For: {e}")))?;
    headers.insert(X_FORWARDED_FOR, value);
    Ok(())
}
