//! Gateway-authored failures and their JSON envelope.
//!
//! Backend responses with an error status are *not* represented here: they are
//! ordinary [`BackendResponse`](crate::ports::BackendResponse) values and are
//! relayed untouched. Only situations where the gateway itself has to answer
//! end up as a [`GatewayError`].
use hyper::StatusCode;
use serde::Serialize;
use thiserror::Error;

use crate::ports::{TransportFailure, TransportFailureKind};

pub const INTERNAL_FAULT_MESSAGE: &str = "Something went wrong!";

#[derive(Error, Debug)]
#[non_exhaustive]
pub enum GatewayError {
    /// No configured prefix matches the request path
    #[error("Route not found: {path}")]
    RouteNotFound { path: String },

    /// Refused connection, DNS failure or reset
    #[error("{service} unavailable: {cause}")]
    BackendUnavailable { service: String, cause: String },

    #[error("{service} timeout: {cause}")]
    BackendTimeout { service: String, cause: String },

    #[error("Payload too large: {0}")]
    PayloadTooLarge(String),

    /// Anything unanticipated while building or relaying a request
    #[error("Internal fault: {0}")]
    InternalFault(String),
}

/// JSON body of every gateway-authored error response.
#[derive(Debug, Serialize, PartialEq, Eq)]
pub struct ErrorEnvelope {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
}

impl GatewayError {
    /// Translate a transport failure for the named service.
    pub fn from_transport(service: &str, failure: TransportFailure) -> Self {
        match failure.kind {
            TransportFailureKind::Timeout => GatewayError::BackendTimeout {
                service: service.to_string(),
                cause: failure.cause,
            },
            _ => GatewayError::BackendUnavailable {
                service: service.to_string(),
                cause: failure.cause,
            },
        }
    }

    pub fn internal(cause: impl std::fmt::Display) -> Self {
        GatewayError::InternalFault(cause.to_string())
    }

    pub fn status(&self) -> StatusCode {
        match self {
            GatewayError::RouteNotFound { .. } => StatusCode::NOT_FOUND,
            GatewayError::BackendUnavailable { .. } => StatusCode::BAD_GATEWAY,
            GatewayError::BackendTimeout { .. } => StatusCode::GATEWAY_TIMEOUT,
            GatewayError::PayloadTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
            GatewayError::InternalFault(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn envelope(&self) -> ErrorEnvelope {
        match self {
            GatewayError::RouteNotFound { path } => ErrorEnvelope {
                error: "Route not found".to_string(),
                message: None,
                path: Some(path.clone()),
            },
            GatewayError::BackendUnavailable { service, cause } => ErrorEnvelope {
                error: format!("{service} unavailable"),
                message: Some(cause.clone()),
                path: None,
            },
            GatewayError::BackendTimeout { service, cause } => ErrorEnvelope {
                error: format!("{service} timeout"),
                message: Some(cause.clone()),
                path: None,
            },
            GatewayError::PayloadTooLarge(cause) => ErrorEnvelope {
                error: "Payload too large".to_string(),
                message: Some(cause.clone()),
                path: None,
            },
            GatewayError::InternalFault(cause) => ErrorEnvelope {
                error: INTERNAL_FAULT_MESSAGE.to_string(),
                message: Some(cause.clone()),
                path: None,
            },
        }
    }

    /// Serialized envelope. Serialization of plain strings cannot fail, the
    /// fallback only keeps the body JSON if it ever does.
    pub fn envelope_json(&self) -> String {
        serde_json::to_string(&self.envelope())
            .unwrap_or_else(|_| format!(r#"{{"error":"{INTERNAL_FAULT_MESSAGE}"}}"#))
    }
}

#[cfg(test)]
mod tests {
    use serde_json::{Value, json};

    use super::*;

    fn body(err: &GatewayError) -> Value {
        serde_json::from_str(&err.envelope_json()).unwrap()
    }

    #[test]
    fn route_not_found_envelope() {
        let err = GatewayError::RouteNotFound {
            path: "/unknown".to_string(),
        };
        assert_eq!(err.status(), StatusCode::NOT_FOUND);
        assert_eq!(
            body(&err),
            json!({"error": "Route not found", "path": "/unknown"})
        );
    }

    #[test]
    fn refused_reset_and_dns_are_bad_gateway() {
        for kind in [
            TransportFailureKind::ConnectionRefused,
            TransportFailureKind::ConnectionReset,
            TransportFailureKind::DnsFailure,
        ] {
            let err = GatewayError::from_transport(
                "Product service",
                TransportFailure::new(kind, "tcp connect error"),
            );
            assert_eq!(err.status(), StatusCode::BAD_GATEWAY);
            assert_eq!(
                body(&err),
                json!({"error": "Product service unavailable", "message": "tcp connect error"})
            );
        }
    }

    #[test]
    fn timeout_is_gateway_timeout() {
        let err = GatewayError::from_transport(
            "User service",
            TransportFailure::new(TransportFailureKind::Timeout, "timed out after 30s"),
        );
        assert_eq!(err.status(), StatusCode::GATEWAY_TIMEOUT);
        assert_eq!(body(&err)["error"], "User service timeout");
    }

    #[test]
    fn internal_fault_uses_generic_error() {
        let err = GatewayError::internal("invalid uri");
        assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(
            body(&err),
            json!({"error": "Something went wrong!", "message": "invalid uri"})
        );
    }
}
