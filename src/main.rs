//! WordPress edge stack.
//!
//! An HTTP front for a WordPress origin that rewrites asset URLs to a CDN
//! and finds the origin through DNS service discovery.
//!
//! # Architecture Overview
//!
//! ```text
//!                       ┌───────────────────────────────────────────────┐
//!                       │                  EDGE STACK                    │
//!                       │                                                │
//!   Client Request      │  ┌─────────┐   ┌──────────┐   ┌────────────┐  │
//!   ────────────────────┼─▶│  http   │──▶│discovery │──▶│  origin    │──┼──▶ WordPress
//!                       │  │ server  │   │ resolver │   │  forward   │  │
//!                       │  └─────────┘   └──────────┘   └─────┬──────┘  │
//!                       │                                      │         │
//!   Client Response     │  ┌──────────────────────────┐       │         │
//!   ◀───────────────────┼──│ output pipeline          │◀──────┘         │
//!                       │  │  + offload rewriter      │                 │
//!                       │  └──────────────────────────┘                 │
//!                       │                                                │
//!                       │  config (hot reload) · observability · lifecycle │
//!                       └───────────────────────────────────────────────┘
//! ```
//!
//! Usage: `edge-stack [CONFIG_PATH]`. Without a path the built-in defaults
//! are used, with `STACK_*` environment overrides applied.

use std::path::PathBuf;

use clap::Parser;
use tokio::net::TcpListener;

use edge_stack::config::loader::{apply_env_overrides, load_config};
use edge_stack::config::validation::validate_config;
use edge_stack::config::watcher::ConfigWatcher;
use edge_stack::error::ConfigError;
use edge_stack::lifecycle::signals::spawn_signal_handler;
use edge_stack::observability::{logging, metrics};
use edge_stack::{HttpServer, Shutdown, StackConfig};

#[derive(Parser)]
#[command(name = "edge-stack")]
#[command(about = "Edge HTTP front for a WordPress origin", long_about = None)]
struct Args {
    /// TOML configuration file, watched for changes.
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let config = match &args.config {
        Some(path) => load_config(path)?,
        None => {
            let mut config = StackConfig::default();
            apply_env_overrides(&mut config, |key| std::env::var(key).ok());
            validate_config(&config).map_err(ConfigError::Validation)?;
            config
        }
    };

    logging::init(&config.observability);
    tracing::info!("edge-stack v{} starting", env!("CARGO_PKG_VERSION"));

    tracing::info!(
        bind_address = %config.server.bind_address,
        origin = %config.origin.host,
        cdn_host = %config.offload.cdn_host,
        context = ?config.discovery.context,
        "Configuration loaded"
    );

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => metrics::init_metrics(addr),
            Err(_) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    let listener = TcpListener::bind(&config.server.bind_address).await?;
    tracing::info!(address = %listener.local_addr()?, "Listening for connections");

    // Held for the life of the process; dropping it stops watching.
    let (config_updates, _watcher) = match &args.config {
        Some(path) => {
            let (watcher, updates) = ConfigWatcher::new(path);
            (updates, Some(watcher.run()?))
        }
        None => {
            let (_tx, updates) = tokio::sync::mpsc::unbounded_channel();
            (updates, None)
        }
    };

    let shutdown = Shutdown::new();
    spawn_signal_handler(&shutdown);

    let server = HttpServer::new(config);
    server.run(listener, config_updates, shutdown.subscribe()).await?;

    tracing::info!("Shutdown complete");
    Ok(())
}
