//! Configuration data structures for Waypost.
//!
//! These types map directly to TOML (also JSON / YAML) configuration files and to
//! environment variables. They are serde‑friendly and carry defaults matching the
//! stock three-service deployment so that an empty configuration is runnable.
use std::{collections::BTreeMap, net::SocketAddr, time::Duration};

use serde::{Deserialize, Serialize};

pub const DEFAULT_HOST: &str = "0.0.0.0";
pub const DEFAULT_PORT: u16 = 3000;
pub const DEFAULT_REQUEST_TIMEOUT: &str = "30s";
pub const DEFAULT_MAX_BODY_BYTES: usize = 1024 * 1024;

fn default_host() -> String {
    DEFAULT_HOST.to_string()
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

fn default_request_timeout() -> String {
    DEFAULT_REQUEST_TIMEOUT.to_string()
}

fn default_max_body_bytes() -> usize {
    DEFAULT_MAX_BODY_BYTES
}

fn default_true() -> bool {
    true
}

/// Output format of the structured logs.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    #[default]
    Json,
    Pretty,
}

/// A single backend service reachable through one or more path prefixes.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ServiceConfig {
    /// Human readable name used in error envelopes ("User service").
    #[serde(default)]
    pub name: Option<String>,
    /// Base URL of the backend, e.g. `http://user-service:4001`
    pub url: String,
    /// Path prefixes routed to this backend
    #[serde(default)]
    pub prefixes: Vec<String>,
    /// Remove the matched prefix before forwarding
    #[serde(default = "default_true")]
    pub strip_prefix: bool,
    /// Per-service timeout override (humantime, e.g. "5s")
    #[serde(default)]
    pub timeout: Option<String>,
    #[serde(default = "default_true")]
    pub enabled: bool,
}

impl ServiceConfig {
    pub fn new(url: impl Into<String>, prefixes: &[&str]) -> Self {
        Self {
            name: None,
            url: url.into(),
            prefixes: prefixes.iter().map(|p| p.to_string()).collect(),
            strip_prefix: true,
            timeout: None,
            enabled: true,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_timeout(mut self, timeout: impl Into<String>) -> Self {
        self.timeout = Some(timeout.into());
        self
    }

    pub fn with_strip_prefix(mut self, strip_prefix: bool) -> Self {
        self.strip_prefix = strip_prefix;
        self
    }

    /// Name used in gateway error envelopes. Falls back to "<Key> service"
    /// when no explicit name is configured.
    pub fn display_name(&self, key: &str) -> String {
        if let Some(name) = self.name.as_deref().filter(|n| !n.trim().is_empty()) {
            return name.to_string();
        }
        let mut chars = key.chars();
        match chars.next() {
            Some(first) => format!("{}{} service", first.to_uppercase(), chars.as_str()),
            None => "Backend service".to_string(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Default forwarding timeout (humantime string)
    #[serde(default = "default_request_timeout")]
    pub request_timeout: String,
    /// Maximum accepted inbound body size in bytes
    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: usize,
    #[serde(default)]
    pub log_format: LogFormat,
    /// Backends keyed by a short service key ("users", "products", ...)
    #[serde(default)]
    pub services: BTreeMap<String, ServiceConfig>,
}

impl ServerConfig {
    /// Create a new server configuration builder
    pub fn builder() -> ServerConfigBuilder {
        ServerConfigBuilder::default()
    }

    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn socket_addr(&self) -> Result<SocketAddr, std::net::AddrParseError> {
        self.listen_addr().parse()
    }

    pub fn default_timeout(&self) -> Result<Duration, humantime::DurationError> {
        humantime::parse_duration(&self.request_timeout)
    }

    /// Effective timeout for a service: its own override or the global default.
    pub fn service_timeout(
        &self,
        service: &ServiceConfig,
    ) -> Result<Duration, humantime::DurationError> {
        match service.timeout.as_deref() {
            Some(raw) => humantime::parse_duration(raw),
            None => self.default_timeout(),
        }
    }

    pub fn enabled_services(&self) -> impl Iterator<Item = (&String, &ServiceConfig)> {
        self.services.iter().filter(|(_, svc)| svc.enabled)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        let mut services = BTreeMap::new();
        services.insert(
            "users".to_string(),
            ServiceConfig::new("http://localhost:3001", &["/users", "/api/users"])
                .with_name("User service"),
        );
        services.insert(
            "products".to_string(),
            ServiceConfig::new("http://localhost:3002", &["/products", "/api/products"])
                .with_name("Product service"),
        );
        services.insert(
            "notes".to_string(),
            ServiceConfig::new("http://localhost:3003", &["/notes"]).with_name("Notes service"),
        );

        Self {
            host: default_host(),
            port: default_port(),
            request_timeout: default_request_timeout(),
            max_body_bytes: default_max_body_bytes(),
            log_format: LogFormat::default(),
            services,
        }
    }
}

/// Builder for ServerConfig. Starts with no services so tests and embedders
/// declare exactly the backends they need.
pub struct ServerConfigBuilder {
    host: String,
    port: u16,
    request_timeout: String,
    max_body_bytes: usize,
    log_format: LogFormat,
    services: BTreeMap<String, ServiceConfig>,
}

impl Default for ServerConfigBuilder {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            request_timeout: default_request_timeout(),
            max_body_bytes: default_max_body_bytes(),
            log_format: LogFormat::default(),
            services: BTreeMap::new(),
        }
    }
}

impl ServerConfigBuilder {
    pub fn host(mut self, host: impl Into<String>) -> Self {
        self.host = host.into();
        self
    }

    pub fn port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn request_timeout(mut self, timeout: impl Into<String>) -> Self {
        self.request_timeout = timeout.into();
        self
    }

    pub fn max_body_bytes(mut self, limit: usize) -> Self {
        self.max_body_bytes = limit;
        self
    }

    pub fn log_format(mut self, format: LogFormat) -> Self {
        self.log_format = format;
        self
    }

    /// Add a backend service under the given key
    pub fn service(mut self, key: impl Into<String>, config: ServiceConfig) -> Self {
        self.services.insert(key.into(), config);
        self
    }

    /// Build the final ServerConfig
    pub fn build(self) -> Result<ServerConfig, String> {
        if self.services.is_empty() {
            return Err("At least one service must be configured".to_string());
        }

        Ok(ServerConfig {
            host: self.host,
            port: self.port,
            request_timeout: self.request_timeout,
            max_body_bytes: self.max_body_bytes,
            log_format: self.log_format,
            services: self.services,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_routes_the_three_services() {
        let config = ServerConfig::default();
        assert_eq!(config.port, 3000);
        assert_eq!(config.services.len(), 3);
        assert_eq!(config.services["users"].prefixes, vec!["/users", "/api/users"]);
        assert!(config.services.values().all(|s| s.strip_prefix));
        assert_eq!(config.default_timeout().unwrap(), Duration::from_secs(30));
    }

    #[test]
    fn display_name_falls_back_to_key() {
        let svc = ServiceConfig::new("http://orders:8080", &["/orders"]);
        assert_eq!(svc.display_name("orders"), "Orders service");

        let named = svc.with_name("Order API");
        assert_eq!(named.display_name("orders"), "Order API");
    }

    #[test]
    fn service_timeout_prefers_override() {
        let config = ServerConfig::default();
        let svc = ServiceConfig::new("http://x:1", &["/x"]).with_timeout("250ms");
        assert_eq!(
            config.service_timeout(&svc).unwrap(),
            Duration::from_millis(250)
        );
    }

    #[test]
    fn builder_requires_a_service() {
        assert!(ServerConfig::builder().build().is_err());

        let config = ServerConfig::builder()
            .host("127.0.0.1")
            .port(8080)
            .service("users", ServiceConfig::new("http://localhost:4001", &["/users"]))
            .build()
            .unwrap();
        assert_eq!(config.listen_addr(), "127.0.0.1:8080");
    }
}
