//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (ttl > 0, ports valid)
//! - Reject offload settings that would make rewriting non-idempotent
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: StackConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::fmt;
use std::net::SocketAddr;

use url::Url;

use crate::config::schema::StackConfig;

/// A single semantic problem in a configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    /// Dotted path of the offending field.
    pub field: String,
    /// Human readable description.
    pub message: String,
}

impl ValidationError {
    fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Validate a parsed configuration.
pub fn validate_config(config: &StackConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.server.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::new(
            "server.bind_address",
            format!("'{}' is not a socket address", config.server.bind_address),
        ));
    }

    if config.origin.host.trim().is_empty() {
        errors.push(ValidationError::new("origin.host", "must not be empty"));
    }
    if config.origin.port == 0 {
        errors.push(ValidationError::new("origin.port", "must be greater than 0"));
    }

    validate_offload(config, &mut errors);

    if config.discovery.ttl_secs == 0 {
        errors.push(ValidationError::new("discovery.ttl_secs", "must be greater than 0"));
    }
    if config.discovery.timeout_ms == 0 {
        errors.push(ValidationError::new("discovery.timeout_ms", "must be greater than 0"));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn validate_offload(config: &StackConfig, errors: &mut Vec<ValidationError>) {
    let offload = &config.offload;
    let cdn = offload.cdn_host.trim();

    if !cdn.is_empty() {
        if !is_bare_host(cdn) {
            errors.push(ValidationError::new(
                "offload.cdn_host",
                format!("'{}' must be a bare hostname without scheme or path", cdn),
            ));
        }
        if offload.asset_hosts.iter().any(|h| h.trim().eq_ignore_ascii_case(cdn)) {
            errors.push(ValidationError::new(
                "offload.cdn_host",
                "must not also be listed in offload.asset_hosts",
            ));
        }
    }

    for (i, host) in offload.asset_hosts.iter().enumerate() {
        if !is_bare_host(host.trim()) {
            errors.push(ValidationError::new(
                format!("offload.asset_hosts[{}]", i),
                format!("'{}' must be a bare hostname", host),
            ));
        }
    }

    for (i, path) in offload.asset_paths.iter().enumerate() {
        if path.trim().trim_matches('/').is_empty() {
            errors.push(ValidationError::new(
                format!("offload.asset_paths[{}]", i),
                "must not be empty",
            ));
        }
    }

    for (i, ext) in offload.extensions.iter().enumerate() {
        let ext = ext.trim().trim_start_matches('.');
        if ext.is_empty() || ext.contains('/') {
            errors.push(ValidationError::new(
                format!("offload.extensions[{}]", i),
                "must be a non-empty extension without slashes",
            ));
        }
    }
}

fn is_bare_host(host: &str) -> bool {
    if host.is_empty() || host.contains("://") || host.contains('/') || host.contains(char::is_whitespace) {
        return false;
    }
    Url::parse(&format!("http://{}", host))
        .map(|u| u.host_str().is_some() && u.path() == "/")
        .unwrap_or(false)
}
