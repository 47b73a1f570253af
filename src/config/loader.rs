//! Configuration loading from disk and environment.

use std::fs;
use std::path::Path;

use crate::config::schema::StackConfig;
use crate::config::validation::validate_config;
use crate::error::ConfigError;

/// Load and validate configuration from a TOML file.
pub fn load_config(path: &Path) -> Result<StackConfig, ConfigError> {
    let content = fs::read_to_string(path)?;
    parse_config(&content)
}

/// Parse TOML text, apply environment overrides and validate.
pub fn parse_config(content: &str) -> Result<StackConfig, ConfigError> {
    let mut config: StackConfig = toml::from_str(content)?;
    apply_env_overrides(&mut config, |key| std::env::var(key).ok());

    validate_config(&config).map_err(ConfigError::Validation)?;

    Ok(config)
}

/// Overlay `STACK_*` variables on top of a parsed config.
///
/// The lookup is injected so tests don't have to touch the process environment.
pub fn apply_env_overrides<F>(config: &mut StackConfig, lookup: F)
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(cdn) = lookup("STACK_CDN_HOST") {
        config.offload.cdn_host = cdn;
    }
    if let Some(bind) = lookup("STACK_BIND_ADDRESS") {
        config.server.bind_address = bind;
    }
    if let Some(origin) = lookup("STACK_ORIGIN_HOST") {
        config.origin.host = origin;
    }
    if let Some(flag) = lookup("STACK_OFFLOAD_KILL_SWITCH") {
        config.offload.kill_switch = is_truthy(&flag);
    }
}

/// Interpret a flag value from a header or environment variable.
pub fn is_truthy(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}
