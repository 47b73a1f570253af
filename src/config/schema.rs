//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the edge layer.
//! All types derive Serde traits for deserialization from config files.

use serde::{Deserialize, Serialize};

/// Root configuration for the edge stack.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct StackConfig {
    /// Listener and request handling settings.
    pub server: ServerConfig,

    /// Where the origin application lives.
    pub origin: OriginConfig,

    /// CDN offload rules.
    pub offload: OffloadConfig,

    /// DNS discovery and caching.
    pub discovery: DiscoveryConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

/// Server configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Bind address (e.g., "0.0.0.0:8080").
    pub bind_address: String,

    /// Treat every request as served over TLS (TLS terminated upstream).
    pub assume_tls: bool,

    /// Largest response body buffered for rewriting, in bytes.
    pub max_body_bytes: usize,

    /// Request timeout (total time for request/response) in seconds.
    pub request_timeout_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8080".to_string(),
            assume_tls: false,
            max_body_bytes: 8 * 1024 * 1024, // 8MB
            request_timeout_secs: 30,
        }
    }
}

/// Origin application location.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct OriginConfig {
    /// Symbolic hostname or IPv4 literal.
    pub host: String,

    /// Port used when the origin is resolved through A records.
    pub port: u16,

    /// SRV service name. Empty disables SRV discovery.
    pub service: String,

    /// SRV protocol label (usually "tcp").
    pub protocol: String,
}

impl Default for OriginConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 80,
            service: String::new(),
            protocol: "tcp".to_string(),
        }
    }
}

/// CDN offload configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct OffloadConfig {
    /// CDN hostname. Empty disables offloading.
    pub cdn_host: String,

    /// Hostnames whose asset URLs are considered local.
    pub asset_hosts: Vec<String>,

    /// Path prefixes (without surrounding slashes) holding static assets.
    pub asset_paths: Vec<String>,

    /// Recognized static file extensions.
    pub extensions: Vec<String>,

    /// Host-level kill switch.
    pub kill_switch: bool,

    /// Request header that bypasses offloading for a single request.
    pub bypass_header: String,
}

impl Default for OffloadConfig {
    fn default() -> Self {
        Self {
            cdn_host: String::new(),
            asset_hosts: Vec::new(),
            asset_paths: vec!["wp-content".to_string(), "wp-includes".to_string()],
            extensions: default_extensions(),
            kill_switch: false,
            bypass_header: "x-stack-offload-bypass".to_string(),
        }
    }
}

fn default_extensions() -> Vec<String> {
    [
        "jpg", "jpeg", "png", "gif", "webp", "avif", "svg", "ico", "bmp", "css", "js", "map",
        "woff", "woff2", "ttf", "eot", "otf", "mp3", "mp4", "m4a", "ogg", "webm", "wav", "pdf",
        "zip", "gz", "tar.gz", "txt",
    ]
    .iter()
    .map(|e| e.to_string())
    .collect()
}

/// Where the current process runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionContext {
    /// Long-lived serving process; discovery answers are cached.
    #[default]
    Serving,
    /// Single-shot batch or CLI process; discovery is never cached.
    Batch,
}

/// DNS discovery configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct DiscoveryConfig {
    /// Cache key namespace.
    pub namespace: String,

    /// Cache entry lifetime in seconds.
    pub ttl_secs: u64,

    /// Upper bound on a single DNS lookup in milliseconds.
    pub timeout_ms: u64,

    /// Execution context; caching only engages when serving.
    pub context: ExecutionContext,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            namespace: "stack-dns".to_string(),
            ttl_secs: 10,
            timeout_ms: 2000,
            context: ExecutionContext::Serving,
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Emit logs as JSON lines.
    pub json_logs: bool,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            json_logs: false,
            metrics_enabled: true,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}
