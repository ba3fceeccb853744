//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Propagation header must be a valid lowercase header name
//! - Excluded methods must look like `/service/method`
//! - Metrics listener must parse when metrics are enabled
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: InterceptorConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::net::SocketAddr;

use http::HeaderName;
use thiserror::Error;
use tracing_subscriber::EnvFilter;

use crate::config::schema::InterceptorConfig;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("tracing.header_name {0:?} is not a valid lowercase header name")]
    InvalidHeaderName(String),

    #[error("logging.level {0:?} is not a valid log filter")]
    InvalidLogLevel(String),

    #[error("metrics.listen_address {0:?} is not a socket address")]
    InvalidListenAddress(String),

    #[error("filter.exclude_methods entry {0:?} is not of the form /service/method")]
    InvalidMethodName(String),
}

pub fn validate_config(config: &InterceptorConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if let Some(name) = &config.tracing.header_name {
        if !is_lowercase_header_name(name) {
            errors.push(ValidationError::InvalidHeaderName(name.clone()));
        }
    }

    if EnvFilter::try_new(&config.logging.level).is_err() {
        errors.push(ValidationError::InvalidLogLevel(config.logging.level.clone()));
    }

    if config.metrics.enabled && config.metrics.listen_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::InvalidListenAddress(
            config.metrics.listen_address.clone(),
        ));
    }

    for method in &config.filter.exclude_methods {
        if !is_full_method_name(method) {
            errors.push(ValidationError::InvalidMethodName(method.clone()));
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn is_lowercase_header_name(name: &str) -> bool {
    !name.bytes().any(|b| b.is_ascii_uppercase()) && HeaderName::from_bytes(name.as_bytes()).is_ok()
}

fn is_full_method_name(name: &str) -> bool {
    let Some(rest) = name.strip_prefix('/') else {
        return false;
    };
    matches!(
        rest.split_once('/'),
        Some((service, method)) if !service.is_empty() && !method.is_empty() && !method.contains('/')
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        assert_eq!(validate_config(&InterceptorConfig::default()), Ok(()));
    }

    #[test]
    fn test_collects_every_error() {
        let mut config = InterceptorConfig::default();
        config.tracing.header_name = Some("Trace Parent".to_string());
        config.logging.level = "info,app=loud".to_string();
        config.metrics.enabled = true;
        config.metrics.listen_address = "localhost".to_string();
        config.filter.exclude_methods = vec![
            "/grpc.health.v1.Health/Check".to_string(),
            "Health/Check".to_string(),
            "/Health".to_string(),
            "/Health/".to_string(),
        ];

        let errors = validate_config(&config).unwrap_err();
        assert_eq!(
            errors,
            vec![
                ValidationError::InvalidHeaderName("Trace Parent".to_string()),
                ValidationError::InvalidLogLevel("info,app=loud".to_string()),
                ValidationError::InvalidListenAddress("localhost".to_string()),
                ValidationError::InvalidMethodName("Health/Check".to_string()),
                ValidationError::InvalidMethodName("/Health".to_string()),
                ValidationError::InvalidMethodName("/Health/".to_string()),
            ]
        );
    }

    #[test]
    fn test_listen_address_ignored_when_disabled() {
        let mut config = InterceptorConfig::default();
        config.metrics.listen_address = "not an address".to_string();
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn test_header_name_rules() {
        assert!(is_lowercase_header_name("traceparent"));
        assert!(is_lowercase_header_name("uber-trace-id"));
        assert!(!is_lowercase_header_name("Uber-Trace-Id"));
        assert!(!is_lowercase_header_name(""));
        assert!(!is_lowercase_header_name("bad header"));
    }
}
