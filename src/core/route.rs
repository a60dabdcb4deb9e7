//! Route table and longest-prefix matcher.
//!
//! The table is built once from [`ServerConfig`] and is immutable afterwards,
//! so it can be shared behind an `Arc` and queried from any number of request
//! tasks without locking.
use std::{collections::HashSet, time::Duration};

use hyper::Uri;
use thiserror::Error;

use crate::config::{ServerConfig, validation::RESERVED_PATHS};

#[derive(Error, Debug)]
#[non_exhaustive]
pub enum RouteTableError {
    #[error("Invalid prefix '{prefix}' for service '{service}': {reason}")]
    InvalidPrefix {
        service: String,
        prefix: String,
        reason: String,
    },

    #[error("Prefix '{0}' is configured more than once")]
    DuplicatePrefix(String),

    #[error("Invalid target URL '{url}' for service '{service}': {reason}")]
    InvalidTarget {
        service: String,
        url: String,
        reason: String,
    },

    #[error("Invalid timeout for service '{service}': {reason}")]
    InvalidTimeout { service: String, reason: String },
}

/// One prefix → backend mapping.
#[derive(Debug, Clone)]
pub struct Route {
    pub prefix: String,
    /// Configuration key of the owning service ("users")
    pub service_key: String,
    /// Display name used in error envelopes ("User service")
    pub service_name: String,
    scheme: String,
    authority: String,
    /// Path component of the base URL without trailing slash ("" for none)
    base_path: String,
    pub strip_prefix: bool,
    pub timeout: Duration,
}

impl Route {
    pub fn target_base_url(&self) -> String {
        format!("{}://{}{}", self.scheme, self.authority, self.base_path)
    }

    pub fn authority(&self) -> &str {
        &self.authority
    }

    /// True when `path` equals the prefix or continues it with a new segment.
    pub fn matches(&self, path: &str) -> bool {
        match path.strip_prefix(self.prefix.as_str()) {
            Some(rest) => rest.is_empty() || rest.starts_with('/'),
            None => false,
        }
    }

    /// Path sent downstream for an inbound path this route matched.
    pub fn rewrite_path(&self, path: &str) -> String {
        if !self.strip_prefix {
            return path.to_string();
        }
        match path.strip_prefix(self.prefix.as_str()) {
            Some("") | None => "/".to_string(),
            Some(rest) => rest.to_string(),
        }
    }

    /// Absolute backend URL for a rewritten path and optional query string.
    pub fn outbound_url(&self, rewritten_path: &str, query: Option<&str>) -> String {
        let mut url = self.target_base_url();
        url.push_str(rewritten_path);
        if let Some(q) = query {
            url.push('?');
            url.push_str(q);
        }
        url
    }
}

/// A resolved route plus the path to forward.
#[derive(Debug)]
pub struct RouteMatch<'a> {
    pub route: &'a Route,
    pub forward_path: String,
}

/// Immutable set of routes ordered by descending prefix length.
#[derive(Debug, Clone, Default)]
pub struct RouteTable {
    routes: Vec<Route>,
}

impl RouteTable {
    /// Build the table from every enabled service in the configuration.
    pub fn from_config(config: &ServerConfig) -> Result<Self, RouteTableError> {
        let mut routes = Vec::new();
        let mut seen = HashSet::new();

        for (key, service) in config.enabled_services() {
            let (scheme, authority, base_path) = split_target(&service.url).map_err(|reason| {
                RouteTableError::InvalidTarget {
                    service: key.clone(),
                    url: service.url.clone(),
                    reason,
                }
            })?;

            let timeout =
                config
                    .service_timeout(service)
                    .map_err(|e| RouteTableError::InvalidTimeout {
                        service: key.clone(),
                        reason: e.to_string(),
                    })?;

            for prefix in &service.prefixes {
                check_prefix(key, prefix)?;
                if !seen.insert(prefix.clone()) {
                    return Err(RouteTableError::DuplicatePrefix(prefix.clone()));
                }

                routes.push(Route {
                    prefix: prefix.clone(),
                    service_key: key.clone(),
                    service_name: service.display_name(key),
                    scheme: scheme.clone(),
                    authority: authority.clone(),
                    base_path: base_path.clone(),
                    strip_prefix: service.strip_prefix,
                    timeout,
                });
            }
        }

        // Longest prefix first so the first hit is the most specific one.
        routes.sort_by(|a, b| {
            b.prefix
                .len()
                .cmp(&a.prefix.len())
                .then_with(|| a.prefix.cmp(&b.prefix))
        });

        for route in &routes {
            tracing::debug!(
                prefix = %route.prefix,
                target = %route.target_base_url(),
                strip_prefix = route.strip_prefix,
                "Registered route"
            );
        }

        Ok(Self { routes })
    }

    /// Longest‑prefix match for an inbound request path.
    ///
    /// `None` means the request is unroutable; that is a normal outcome.
    pub fn resolve(&self, path: &str) -> Option<RouteMatch<'_>> {
        self.routes
            .iter()
            .find(|route| route.matches(path))
            .map(|route| RouteMatch {
                route,
                forward_path: route.rewrite_path(path),
            })
    }

    pub fn routes(&self) -> &[Route] {
        &self.routes
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }
}

fn check_prefix(service: &str, prefix: &str) -> Result<(), RouteTableError> {
    let invalid = |reason: &str| RouteTableError::InvalidPrefix {
        service: service.to_string(),
        prefix: prefix.to_string(),
        reason: reason.to_string(),
    };

    if !prefix.starts_with('/') {
        return Err(invalid("must start with '/'"));
    }
    if prefix.len() > 1 && prefix.ends_with('/') {
        return Err(invalid("must not end with '/'"));
    }
    if RESERVED_PATHS.contains(&prefix) {
        return Err(invalid("reserved for the gateway"));
    }
    Ok(())
}

/// Split a base URL into scheme, authority and a slash-trimmed path.
fn split_target(url: &str) -> Result<(String, String, String), String> {
    let uri = url.parse::<Uri>().map_err(|e| e.to_string())?;

    let scheme = match uri.scheme_str() {
        Some(s @ ("http" | "https")) => s.to_string(),
        Some(other) => return Err(format!("unsupported scheme '{other}'")),
        None => return Err("missing scheme".to_string()),
    };
    let authority = uri
        .authority()
        .map(|a| a.to_string())
        .ok_or_else(|| "missing host".to_string())?;
    if uri.query().is_some() {
        return Err("base URL must not carry a query".to_string());
    }
    let base_path = uri.path().trim_end_matches('/').to_string();

    Ok((scheme, authority, base_path))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ServiceConfig;

    fn table() -> RouteTable {
        let config = ServerConfig::builder()
            .service(
                "users",
                ServiceConfig::new("http://user-service:4001", &["/users", "/api/users"])
                    .with_name("User service"),
            )
            .service(
                "products",
                ServiceConfig::new("http://product-service:4003/v1/", &["/products"]),
            )
            .service(
                "legacy",
                ServiceConfig::new("http://legacy:9000", &["/api"]).with_strip_prefix(false),
            )
            .build()
            .unwrap();
        RouteTable::from_config(&config).unwrap()
    }

    #[test]
    fn strips_prefix_and_keeps_remainder() {
        let table = table();
        let m = table.resolve("/users/123").unwrap();
        assert_eq!(m.route.service_key, "users");
        assert_eq!(m.forward_path, "/123");
        assert_eq!(
            m.route.outbound_url(&m.forward_path, None),
            "http://user-service:4001/123"
        );
    }

    #[test]
    fn empty_remainder_becomes_root() {
        let table = table();
        assert_eq!(table.resolve("/users").unwrap().forward_path, "/");
        assert_eq!(table.resolve("/users/").unwrap().forward_path, "/");
    }

    #[test]
    fn longest_prefix_wins() {
        let table = table();
        let m = table.resolve("/api/users/7").unwrap();
        assert_eq!(m.route.prefix, "/api/users");
        assert_eq!(m.forward_path, "/7");

        let m = table.resolve("/api/orders").unwrap();
        assert_eq!(m.route.prefix, "/api");
        assert_eq!(m.forward_path, "/api/orders");
    }

    #[test]
    fn matches_only_on_segment_boundaries() {
        let table = table();
        assert!(table.resolve("/usersx").is_none());
        assert!(table.resolve("/unknown").is_none());
        assert!(table.resolve("/").is_none());
    }

    #[test]
    fn base_path_and_query_are_combined() {
        let table = table();
        let m = table.resolve("/products/9").unwrap();
        assert_eq!(
            m.route.outbound_url(&m.forward_path, Some("sort=asc&page=2")),
            "http://product-service:4003/v1/9?sort=asc&page=2"
        );
    }

    #[test]
    fn display_name_and_timeout_are_resolved() {
        let table = table();
        let users = table.resolve("/users").unwrap().route;
        assert_eq!(users.service_name, "User service");
        assert_eq!(users.timeout, Duration::from_secs(30));

        let products = table.resolve("/products").unwrap().route;
        assert_eq!(products.service_name, "Products service");
    }

    #[test]
    fn rejects_duplicate_prefix() {
        let config = ServerConfig::builder()
            .service("a", ServiceConfig::new("http://a:1", &["/x"]))
            .service("b", ServiceConfig::new("http://b:1", &["/x"]))
            .build()
            .unwrap();
        assert!(matches!(
            RouteTable::from_config(&config),
            Err(RouteTableError::DuplicatePrefix(p)) if p == "/x"
        ));
    }

    #[test]
    fn rejects_reserved_prefix_and_bad_target() {
        let config = ServerConfig::builder()
            .service("a", ServiceConfig::new("http://a:1", &["/health"]))
            .build()
            .unwrap();
        assert!(RouteTable::from_config(&config).is_err());

        let config = ServerConfig::builder()
            .service("a", ServiceConfig::new("a:1/nope", &["/a"]))
            .build()
            .unwrap();
        assert!(matches!(
            RouteTable::from_config(&config),
            Err(RouteTableError::InvalidTarget { .. })
        ));
    }

    #[test]
    fn disabled_services_are_not_routed() {
        let mut notes = ServiceConfig::new("http://notes:4002", &["/notes"]);
        notes.enabled = false;
        let config = ServerConfig::builder()
            .service("users", ServiceConfig::new("http://u:1", &["/users"]))
            .service("notes", notes)
            .build()
            .unwrap();
        let table = RouteTable::from_config(&config).unwrap();
        assert_eq!(table.len(), 1);
        assert!(table.resolve("/notes/1").is_none());
    }
}
