//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)
//!     → loader.rs (parse, deserialize, STACK_* env overrides)
//!     → validation.rs (semantic checks)
//!     → StackConfig (validated, immutable)
//!     → passed by reference into every component constructor
//!
//! On file change:
//!     watcher.rs detects change
//!     → loader.rs loads new config
//!     → validation.rs validates
//!     → server rebuilds the offload rule set
//!     → atomic swap of the shared OutputSettings
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded; changes require full reload
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod validation;
pub mod watcher;

pub use schema::{
    DiscoveryConfig, ExecutionContext, ObservabilityConfig, OffloadConfig, OriginConfig,
    ServerConfig, StackConfig,
};
