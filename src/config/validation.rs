#![allow(clippy::collapsible_if)]

use std::collections::HashMap;

use eyre::Result;

use crate::config::models::{ServerConfig, ServiceConfig};

/// Paths answered by the gateway itself; no service may claim them.
pub const RESERVED_PATHS: &[&str] = &["/", "/health"];

/// Validation result type alias
pub type ValidationResult<T> = Result<T, ValidationError>;

/// Validation error types
#[derive(Debug, thiserror::Error, Clone)]
pub enum ValidationError {
    #[error("Missing required field: {field}")]
    MissingField { field: String },

    #[error("Invalid field '{field}': {message}")]
    InvalidField { field: String, message: String },

    #[error("Invalid listen address '{address}': {reason}")]
    InvalidListenAddress { address: String, reason: String },

    #[error("Route conflict detected: {message}")]
    RouteConflict { message: String },

    #[error("Validation failed: {message}")]
    ValidationFailed { message: String },
}

/// Server configuration validator
pub struct ServerConfigValidator;

impl ServerConfigValidator {
    /// Validate the entire server configuration
    pub fn validate(config: &ServerConfig) -> ValidationResult<()> {
        let mut errors = Vec::new();

        if let Err(e) = Self::validate_listen_address(config) {
            errors.push(e);
        }

        if let Err(e) = Self::validate_duration(&config.request_timeout, "request_timeout") {
            errors.push(e);
        }

        if config.max_body_bytes == 0 {
            errors.push(ValidationError::InvalidField {
                field: "max_body_bytes".to_string(),
                message: "Must be greater than 0".to_string(),
            });
        }

        if config.enabled_services().next().is_none() {
            errors.push(ValidationError::MissingField {
                field: "services".to_string(),
            });
        } else {
            for (key, service) in config.enabled_services() {
                if let Err(mut service_errors) = Self::validate_service(key, service) {
                    errors.append(&mut service_errors);
                }
            }
        }

        if let Err(conflict_error_list) = Self::check_prefix_conflicts(config) {
            errors.extend(conflict_error_list);
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(ValidationError::ValidationFailed {
                message: Self::format_multiple_errors(errors),
            })
        }
    }

    fn validate_listen_address(config: &ServerConfig) -> ValidationResult<()> {
        if config.socket_addr().is_err() {
            return Err(ValidationError::InvalidListenAddress {
                address: config.listen_addr(),
                reason: "Host must be an IP address (e.g., '127.0.0.1' or '0.0.0.0')".to_string(),
            });
        }
        Ok(())
    }

    fn validate_duration(raw: &str, field: &str) -> ValidationResult<()> {
        match humantime::parse_duration(raw) {
            Ok(d) if d.is_zero() => Err(ValidationError::InvalidField {
                field: field.to_string(),
                message: "Duration must be greater than 0".to_string(),
            }),
            Ok(_) => Ok(()),
            Err(e) => Err(ValidationError::InvalidField {
                field: field.to_string(),
                message: format!("Invalid duration '{raw}': {e} (use e.g. '500ms', '30s')"),
            }),
        }
    }

    fn validate_service(key: &str, service: &ServiceConfig) -> Result<(), Vec<ValidationError>> {
        let mut errors = Vec::new();

        if let Err(e) = Self::validate_url(&service.url, &format!("service '{key}' url")) {
            errors.push(e);
        }

        if let Some(timeout) = &service.timeout {
            if let Err(e) = Self::validate_duration(timeout, &format!("service '{key}' timeout")) {
                errors.push(e);
            }
        }

        if service.prefixes.is_empty() {
            errors.push(ValidationError::InvalidField {
                field: format!("service '{key}' prefixes"),
                message: "At least one path prefix is required".to_string(),
            });
        }

        for prefix in &service.prefixes {
            if let Err(e) = Self::validate_prefix(key, prefix) {
                errors.push(e);
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    fn validate_prefix(key: &str, prefix: &str) -> ValidationResult<()> {
        let field = format!("service '{key}' prefix '{prefix}'");
        if !prefix.starts_with('/') {
            return Err(ValidationError::InvalidField {
                field,
                message: "Prefixes must start with '/'".to_string(),
            });
        }
        if prefix.len() > 1 && prefix.ends_with('/') {
            return Err(ValidationError::InvalidField {
                field,
                message: "Prefixes must not end with '/'".to_string(),
            });
        }
        if prefix.contains(&['?', '#'][..]) {
            return Err(ValidationError::InvalidField {
                field,
                message: "Prefixes must not contain a query or fragment".to_string(),
            });
        }
        if RESERVED_PATHS.contains(&prefix) {
            return Err(ValidationError::InvalidField {
                field,
                message: "Path is reserved for the gateway itself".to_string(),
            });
        }
        Ok(())
    }

    /// Validate URL format
    fn validate_url(url_str: &str, context: &str) -> ValidationResult<()> {
        match url::Url::parse(url_str) {
            Ok(url) => {
                if url.scheme() != "http" && url.scheme() != "https" {
                    return Err(ValidationError::InvalidField {
                        field: context.to_string(),
                        message: format!(
                            "URL scheme must be 'http' or 'https', got '{}'",
                            url.scheme()
                        ),
                    });
                }

                if url.host().is_none() {
                    return Err(ValidationError::InvalidField {
                        field: context.to_string(),
                        message: "URL must have a valid host".to_string(),
                    });
                }

                if url.query().is_some() || url.fragment().is_some() {
                    return Err(ValidationError::InvalidField {
                        field: context.to_string(),
                        message: "Base URL must not carry a query or fragment".to_string(),
                    });
                }

                Ok(())
            }
            Err(e) => Err(ValidationError::InvalidField {
                field: context.to_string(),
                message: format!("Invalid URL format: {e}"),
            }),
        }
    }

    /// The same prefix may not be claimed twice, across or within services.
    fn check_prefix_conflicts(config: &ServerConfig) -> Result<(), Vec<ValidationError>> {
        let mut errors = Vec::new();
        let mut owners: HashMap<&str, &str> = HashMap::new();

        for (key, service) in config.enabled_services() {
            for prefix in &service.prefixes {
                if let Some(owner) = owners.insert(prefix.as_str(), key.as_str()) {
                    errors.push(ValidationError::RouteConflict {
                        message: format!(
                            "Prefix '{prefix}' is claimed by both '{owner}' and '{key}'"
                        ),
                    });
                }
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    /// Format multiple validation errors into a single message
    fn format_multiple_errors(errors: Vec<ValidationError>) -> String {
        if errors.is_empty() {
            return "No errors".to_string();
        }

        if errors.len() == 1 {
            return errors[0].to_string();
        }

        let mut message = format!("Found {} validation errors:\n", errors.len());
        for (i, error) in errors.iter().enumerate() {
            message.push_str(&format!("  {}. {}\n", i + 1, error));
        }
        message
    }
}
