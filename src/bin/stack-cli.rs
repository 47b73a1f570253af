use std::path::PathBuf;
use std::sync::Arc;

use axum::http::Method;
use clap::{Parser, Subcommand};

use edge_stack::config::loader::{apply_env_overrides, load_config};
use edge_stack::config::ExecutionContext;
use edge_stack::db::QueryRouter;
use edge_stack::discovery::{HickoryLookup, ServiceResolver};
use edge_stack::observability::logging;
use edge_stack::offload::{AssetUrlRewriter, OffloadRuleSet, RequestContext};
use edge_stack::StackConfig;

#[derive(Parser)]
#[command(name = "stack-cli")]
#[command(about = "Batch tooling for the WordPress edge stack", long_about = None)]
struct Cli {
    /// Configuration file. Defaults plus `STACK_*` overrides when omitted.
    #[arg(short, long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Resolve a hostname to one IPv4 address
    Resolve { host: String },
    /// List discovered endpoints as JSON
    Discover {
        host: String,
        /// SRV service name; plain A discovery when omitted
        #[arg(long)]
        service: Option<String>,
        #[arg(long, default_value = "tcp")]
        protocol: String,
    },
    /// Rewrite asset URLs in a file and print the result
    Rewrite {
        file: PathBuf,
        /// Treat the document as served over TLS
        #[arg(long)]
        tls: bool,
    },
    /// Show how a request would route each SQL query
    Route {
        #[arg(long, default_value = "GET")]
        method: String,
        #[arg(long, default_value = "/")]
        path: String,
        #[arg(required = true)]
        queries: Vec<String>,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => load_config(path)?,
        None => {
            let mut config = StackConfig::default();
            apply_env_overrides(&mut config, |key| std::env::var(key).ok());
            config
        }
    };
    config.discovery.context = ExecutionContext::Batch;
    logging::init(&config.observability);

    match cli.command {
        Commands::Resolve { host } => {
            let resolver = batch_resolver(&config);
            match resolver.resolve(&host).await {
                Some(ip) => println!("{}", ip),
                None => {
                    eprintln!("Error: {} did not resolve", host);
                    std::process::exit(1);
                }
            }
        }
        Commands::Discover {
            host,
            service,
            protocol,
        } => {
            let resolver = batch_resolver(&config);
            let endpoints = match service {
                Some(service) => resolver.discover_srv(&host, &service, &protocol).await,
                None => resolver.discover(&host).await,
            };
            println!("{}", serde_json::to_string_pretty(&endpoints)?);
        }
        Commands::Rewrite { file, tls } => {
            let body = std::fs::read(&file)?;
            let rules = Arc::new(OffloadRuleSet::from_config(&config.offload)?);
            let context = RequestContext { tls, bypass: config.offload.kill_switch };
            let rewriter = AssetUrlRewriter::new(rules, context);
            print!("{}", rewriter.rewrite_bytes(&body)?);
        }
        Commands::Route {
            method,
            path,
            queries,
        } => {
            let method: Method = method.to_ascii_uppercase().parse()?;
            let mut router = QueryRouter::for_request(&method, &path);
            for query in &queries {
                println!("{}", router.route(query));
            }
        }
    }

    Ok(())
}

fn batch_resolver(config: &StackConfig) -> ServiceResolver {
    ServiceResolver::new(Arc::new(HickoryLookup::from_system_conf()), &config.discovery)
}
