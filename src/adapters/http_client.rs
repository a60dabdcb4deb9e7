use std::{error::Error as StdError, io, time::Duration};

use async_trait::async_trait;
use bytes::Bytes;
use eyre::Result;
use http_body_util::{BodyExt, Full};
use hyper::{Request, Version, header};
use hyper_rustls::HttpsConnector;
use hyper_util::{
    client::legacy::{Client, connect::HttpConnector},
    rt::TokioExecutor,
};
use rustls_native_certs::load_native_certs;
use tokio::time::timeout;
use tracing::Instrument;

use crate::{
    ports::http_client::{
        BackendOutcome, BackendResponse, HttpClient, OutboundRequest, TransportFailure,
        TransportFailureKind,
    },
    tracing_setup::create_backend_span,
};

/// HTTP client adapter using Hyper with Rustls (HTTP/1.1, plain or TLS).
///
/// Responsibilities:
/// * Pools connections per backend authority
/// * Forces request version to HTTP/1.1 towards backends
/// * Buffers the backend body inside the route timeout
/// * Classifies network errors into [`TransportFailureKind`]s
///
/// No retries are attempted; a failed exchange is reported as-is.
pub struct HttpClientAdapter {
    client: Client<HttpsConnector<HttpConnector>, Full<Bytes>>,
}

impl HttpClientAdapter {
    /// Create a new HTTP client adapter.
    pub fn new() -> Result<Self> {
        // Install default crypto provider for rustls if not already set
        let _ = rustls::crypto::aws_lc_rs::default_provider().install_default();

        let mut http_connector = HttpConnector::new();
        http_connector.enforce_http(false); // Allow HTTPS URLs
        http_connector.set_nodelay(true);

        let mut root_cert_store = rustls::RootCertStore::empty();
        let native_certs = load_native_certs();

        if !native_certs.certs.is_empty() {
            for cert in native_certs.certs {
                if root_cert_store.add(cert).is_err() {
                    tracing::warn!("Failed to add native certificate to rustls RootCertStore");
                }
            }
            tracing::debug!("Loaded {} native root certificates.", root_cert_store.len());
        }

        if !native_certs.errors.is_empty() {
            tracing::warn!(
                "Some native certificates failed to load: {:?}",
                native_certs.errors
            );
        }

        let tls_config = rustls::ClientConfig::builder()
            .with_root_certificates(root_cert_store)
            .with_no_client_auth();

        let https_connector = hyper_rustls::HttpsConnectorBuilder::new()
            .with_tls_config(tls_config)
            .https_or_http()
            .enable_http1()
            .wrap_connector(http_connector);

        let client = Client::builder(TokioExecutor::new())
            .pool_idle_timeout(Duration::from_secs(90))
            .build(https_connector);

        tracing::info!("Created backend HTTP client");
        Ok(Self { client })
    }

    async fn exchange(&self, request: Request<Full<Bytes>>) -> BackendOutcome {
        let response = self.client.request(request).await.map_err(|e| {
            let kind = kind_from_chain(&e).unwrap_or(if e.is_connect() {
                TransportFailureKind::ConnectionRefused
            } else {
                TransportFailureKind::ConnectionReset
            });
            TransportFailure::new(kind, error_chain(&e))
        })?;

        let (mut parts, body) = response.into_parts();
        tracing::Span::current().record("http.status_code", parts.status.as_u16());

        let body = body
            .collect()
            .await
            .map_err(|e| {
                let kind = kind_from_chain(&e).unwrap_or(TransportFailureKind::ConnectionReset);
                TransportFailure::new(kind, error_chain(&e))
            })?
            .to_bytes();

        // The body is fully buffered; framing is recomputed downstream.
        parts.headers.remove(header::TRANSFER_ENCODING);

        Ok(BackendResponse {
            status: parts.status,
            headers: parts.headers,
            body,
        })
    }
}

#[async_trait]
impl HttpClient for HttpClientAdapter {
    async fn send_request(&self, req: OutboundRequest) -> BackendOutcome {
        let OutboundRequest {
            method,
            uri,
            headers,
            body,
            timeout: limit,
        } = req;

        let backend_identifier = format!(
            "{}://{}",
            uri.scheme_str().unwrap_or("http"),
            uri.authority()
                .map_or_else(|| "unknown".to_string(), |a| a.to_string())
        );

        let span = create_backend_span(&backend_identifier, method.as_str(), uri.path());
        let started = std::time::Instant::now();

        let mut request = Request::new(Full::new(body));
        *request.method_mut() = method.clone();
        *request.uri_mut() = uri.clone();
        *request.version_mut() = Version::HTTP_11;
        *request.headers_mut() = headers;

        tracing::debug!(parent: &span, "Sending request: {} {}", method, uri);

        let outcome = timeout(limit, self.exchange(request).instrument(span.clone())).await;
        span.record("duration_ms", started.elapsed().as_millis() as u64);

        match outcome {
            Ok(Ok(response)) => Ok(response),
            Ok(Err(failure)) => {
                span.record("http.status_code", 599u16);
                tracing::error!(
                    parent: &span,
                    "Error making request to backend {} ({} {}): {}",
                    backend_identifier,
                    method,
                    uri,
                    failure
                );
                Err(failure)
            }
            Err(_) => {
                span.record("http.status_code", 599u16);
                tracing::error!(
                    parent: &span,
                    "Backend {} did not answer {} {} within {}",
                    backend_identifier,
                    method,
                    uri,
                    humantime::format_duration(limit)
                );
                Err(TransportFailure::new(
                    TransportFailureKind::Timeout,
                    format!(
                        "timeout of {} exceeded for {} {}",
                        humantime::format_duration(limit),
                        method,
                        uri
                    ),
                ))
            }
        }
    }
}

/// Map the first recognisable cause in an error chain to a failure kind.
pub(crate) fn kind_from_chain(err: &(dyn StdError + 'static)) -> Option<TransportFailureKind> {
    let mut current = Some(err);
    while let Some(e) = current {
        if let Some(io_err) = e.downcast_ref::<io::Error>() {
            match io_err.kind() {
                io::ErrorKind::ConnectionRefused => {
                    return Some(TransportFailureKind::ConnectionRefused);
                }
                io::ErrorKind::TimedOut => return Some(TransportFailureKind::Timeout),
                io::ErrorKind::ConnectionReset
                | io::ErrorKind::ConnectionAborted
                | io::ErrorKind::BrokenPipe
                | io::ErrorKind::UnexpectedEof => {
                    return Some(TransportFailureKind::ConnectionReset);
                }
                _ => {}
            }
        }
        // hyper-util reports resolver failures as a ConnectError with this message
        if e.to_string().contains("dns error") {
            return Some(TransportFailureKind::DnsFailure);
        }
        current = e.source();
    }
    None
}

/// Render an error and all of its sources as one line.
pub(crate) fn error_chain(err: &(dyn StdError + 'static)) -> String {
    let mut parts: Vec<String> = Vec::new();
    let mut current = Some(err);
    while let Some(e) = current {
        let msg = e.to_string();
        if parts.last() != Some(&msg) {
            parts.push(msg);
        }
        current = e.source();
    }
    parts.join(": ")
}
