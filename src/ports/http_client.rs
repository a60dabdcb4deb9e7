use std::{fmt, time::Duration};

use async_trait::async_trait;
use bytes::Bytes;
use hyper::{HeaderMap, Method, StatusCode, Uri};
use thiserror::Error;

/// Why a backend could not produce an HTTP response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum TransportFailureKind {
    /// Nothing is listening on the backend address
    ConnectionRefused,
    /// The backend did not answer within the route timeout
    Timeout,
    /// The backend host name could not be resolved
    DnsFailure,
    /// The connection broke before a complete response was read
    ConnectionReset,
}

impl fmt::Display for TransportFailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            TransportFailureKind::ConnectionRefused => "connection refused",
            TransportFailureKind::Timeout => "timeout",
            TransportFailureKind::DnsFailure => "dns failure",
            TransportFailureKind::ConnectionReset => "connection reset",
        };
        f.write_str(label)
    }
}

/// A network-level failure talking to a backend. Never relayed verbatim.
#[derive(Error, Debug, Clone)]
#[error("{kind}: {cause}")]
pub struct TransportFailure {
    pub kind: TransportFailureKind,
    pub cause: String,
}

impl TransportFailure {
    pub fn new(kind: TransportFailureKind, cause: impl Into<String>) -> Self {
        Self {
            kind,
            cause: cause.into(),
        }
    }

    pub fn is_timeout(&self) -> bool {
        self.kind == TransportFailureKind::Timeout
    }
}

/// Fully prepared request for a backend.
#[derive(Debug, Clone)]
pub struct OutboundRequest {
    pub method: Method,
    pub uri: Uri,
    pub headers: HeaderMap,
    pub body: Bytes,
    /// Upper bound for connect + response headers + body
    pub timeout: Duration,
}

/// Whatever the backend answered, any status code included.
#[derive(Debug, Clone)]
pub struct BackendResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
}

/// Result of one forwarding attempt.
pub type BackendOutcome = Result<BackendResponse, TransportFailure>;

/// HttpClient defines the port (interface) for making HTTP requests to backends
#[async_trait]
pub trait HttpClient: Send + Sync + 'static {
    /// Send a request to a backend server and buffer its response.
    ///
    /// Implementations must map every network-layer error to a
    /// [`TransportFailure`] and must not retry.
    async fn send_request(&self, req: OutboundRequest) -> BackendOutcome;
}
