//! Error types shared across the edge subsystems.
//!
//! None of these are allowed to escape into a request: each component maps
//! its errors onto a defined fallback (original body, empty discovery
//! result, uncached lookup, master routing).

use thiserror::Error;

use crate::config::validation::ValidationError;

/// Error type for configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation failed: {}", join_errors(.0))]
    Validation(Vec<ValidationError>),
}

fn join_errors(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Failures inside the asset rewriter.
#[derive(Debug, Error)]
pub enum RewriteError {
    #[error("failed to compile asset pattern: {0}")]
    Pattern(#[from] regex::Error),

    #[error("response body is not valid UTF-8")]
    NonUtf8(#[from] std::str::Utf8Error),
}

/// Failures talking to DNS.
#[derive(Debug, Error)]
pub enum DiscoveryError {
    #[error("lookup for {name} failed: {reason}")]
    Lookup { name: String, reason: String },

    #[error("lookup for {0} timed out")]
    Timeout(String),
}

/// Failures talking to the shared cache store.
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("cache store unavailable: {0}")]
    Unavailable(String),

    #[error("cached value could not be decoded: {0}")]
    Codec(#[from] serde_json::Error),
}
