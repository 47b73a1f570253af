//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Create Axum Router with the forwarding handler
//! - Wire up middleware (request ID, tracing, timeout, output rewriting)
//! - Resolve the origin through service discovery on every request
//! - Forward requests to the origin
//! - Publish reloaded output settings without restarting

use std::net::SocketAddr;
use std::str::FromStr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::http::uri::{Authority, Scheme};
use axum::{
    body::Body,
    extract::State,
    http::{Request, StatusCode, Uri},
    middleware,
    response::{IntoResponse, Response},
    routing::any,
    Router,
};
use hyper_util::{
    client::legacy::{connect::HttpConnector, Client},
    rt::TokioExecutor,
};
use rand::seq::SliceRandom;
use tokio::net::TcpListener;
use tokio::sync::{broadcast, mpsc};
use tower_http::{
    request_id::{PropagateRequestIdLayer, SetRequestIdLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};

use crate::config::{OriginConfig, StackConfig};
use crate::discovery::{HickoryLookup, MemoryCacheStore, ServiceResolver};
use crate::http::request::{request_id, MakeRequestUuidV4};
use crate::observability::metrics;
use crate::output::{rewrite_output, OutputSettings, SharedOutputSettings};

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub resolver: Arc<ServiceResolver>,
    pub origin: Arc<OriginConfig>,
    pub client: Client<HttpConnector, Body>,
}

impl AppState {
    /// Current origin address, or `None` when discovery finds nothing.
    ///
    /// SRV discovery takes the lowest-priority endpoint; A discovery picks a
    /// random address so load spreads across origin instances.
    async fn origin_addr(&self) -> Option<SocketAddr> {
        let origin = &self.origin;
        if origin.service.is_empty() {
            let endpoints = self.resolver.cached_discover(&origin.host).await;
            let picked = endpoints.choose(&mut rand::thread_rng()).copied();
            picked.map(|e| e.socket_addr(origin.port))
        } else {
            let endpoints = self
                .resolver
                .cached_discover_srv(&origin.host, &origin.service, &origin.protocol)
                .await;
            endpoints.first().map(|e| e.socket_addr(origin.port))
        }
    }
}

/// Edge HTTP server in front of the WordPress origin.
pub struct HttpServer {
    router: Router,
    config: StackConfig,
    output: SharedOutputSettings,
}

impl HttpServer {
    /// Server resolving through the system DNS configuration with an
    /// in-process discovery cache.
    pub fn new(config: StackConfig) -> Self {
        let resolver = ServiceResolver::new(
            Arc::new(HickoryLookup::from_system_conf()),
            &config.discovery,
        )
        .with_cache(Arc::new(MemoryCacheStore::new()));
        Self::with_resolver(config, resolver)
    }

    pub fn with_resolver(config: StackConfig, resolver: ServiceResolver) -> Self {
        let client = Client::builder(TokioExecutor::new()).build(HttpConnector::new());

        let state = AppState {
            resolver: Arc::new(resolver),
            origin: Arc::new(config.origin.clone()),
            client,
        };

        let output = OutputSettings::from_config(&config).shared();
        let router = Self::build_router(&config, state, output.clone());
        Self {
            router,
            config,
            output,
        }
    }

    /// Build the Axum router with all middleware layers.
    #[allow(deprecated)]
    fn build_router(config: &StackConfig, state: AppState, output: SharedOutputSettings) -> Router {
        Router::new()
            .route("/{*path}", any(proxy_handler))
            .route("/", any(proxy_handler))
            .with_state(state)
            .layer(middleware::from_fn_with_state(output, rewrite_output))
            .layer(TimeoutLayer::new(Duration::from_secs(
                config.server.request_timeout_secs,
            )))
            .layer(PropagateRequestIdLayer::x_request_id())
            .layer(TraceLayer::new_for_http())
            .layer(SetRequestIdLayer::x_request_id(MakeRequestUuidV4))
    }

    /// Run the server, accepting connections on the given listener.
    ///
    /// Configurations arriving on `config_updates` replace the offload rules
    /// for subsequent responses. Returns once `shutdown` fires and in-flight
    /// requests have drained.
    pub async fn run(
        self,
        listener: TcpListener,
        mut config_updates: mpsc::UnboundedReceiver<StackConfig>,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(address = %addr, origin = %self.config.origin.host, "HTTP server starting");

        let output = self.output.clone();
        let mut reload_shutdown = shutdown.resubscribe();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    Some(config) = config_updates.recv() => {
                        output.store(Arc::new(OutputSettings::from_config(&config)));
                        tracing::info!(cdn_host = %config.offload.cdn_host, "Offload rules reloaded");
                    }
                    _ = reload_shutdown.recv() => break,
                }
            }
        });

        axum::serve(listener, self.router)
            .with_graceful_shutdown(async move {
                let _ = shutdown.recv().await;
                tracing::info!("Shutdown signal received");
            })
            .await?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }

    /// Router with all layers, for driving the server without a socket.
    pub fn router(&self) -> Router {
        self.router.clone()
    }

    /// Handle to the live output settings.
    pub fn output_settings(&self) -> SharedOutputSettings {
        self.output.clone()
    }

    pub fn config(&self) -> &StackConfig {
        &self.config
    }
}

/// Main proxy handler.
/// Resolves the origin and forwards the request unchanged.
async fn proxy_handler(State(state): State<AppState>, request: Request<Body>) -> Response {
    let start_time = Instant::now();
    let request_id = request_id(request.headers()).to_string();
    let method = request.method().to_string();

    tracing::debug!(
        request_id = %request_id,
        method = %method,
        path = %request.uri().path(),
        "Proxying request"
    );

    let Some(upstream) = state.origin_addr().await else {
        tracing::warn!(request_id = %request_id, origin = %state.origin.host, "Origin did not resolve");
        metrics::record_request(&method, 503, start_time);
        return (StatusCode::SERVICE_UNAVAILABLE, "Origin unavailable").into_response();
    };

    let (parts, body) = request.into_parts();
    let mut uri_parts = parts.uri.clone().into_parts();
    uri_parts.scheme = Some(Scheme::HTTP);
    if let Ok(authority) = Authority::from_str(&upstream.to_string()) {
        uri_parts.authority = Some(authority);
    }
    if uri_parts.path_and_query.is_none() {
        uri_parts.path_and_query = Some("/".parse().expect("static path"));
    }
    let uri = Uri::from_parts(uri_parts).unwrap_or_else(|_| parts.uri.clone());

    let mut upstream_request = Request::from_parts(parts, body);
    *upstream_request.uri_mut() = uri;

    match state.client.request(upstream_request).await {
        Ok(response) => {
            metrics::record_request(&method, response.status().as_u16(), start_time);
            let (parts, body) = response.into_parts();
            Response::from_parts(parts, Body::new(body))
        }
        Err(e) => {
            tracing::error!(request_id = %request_id, upstream = %upstream, error = %e, "Upstream error");
            metrics::record_request(&method, 502, start_time);
            (StatusCode::BAD_GATEWAY, "Upstream request failed").into_response()
        }
    }
}
