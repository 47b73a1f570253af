//! Axum middleware wiring the output pipeline into the response path.
//!
//! # Responsibilities
//! - Derive the per-request `RequestContext` (TLS, bypass)
//! - Register the asset rewriter for this request
//! - Pass responses through untouched when nothing is enabled
//! - Buffer textual, uncompressed bodies and release the rewritten result
//! - Stream bodies larger than `max_body_bytes` through unchanged

use std::sync::Arc;

use arc_swap::ArcSwap;
use axum::{
    body::{Body, Bytes},
    extract::{Request, State},
    http::{header, HeaderMap, Method, StatusCode},
    middleware::Next,
    response::Response,
};
use futures_util::stream::{self, StreamExt};

use crate::config::loader::is_truthy;
use crate::config::StackConfig;
use crate::offload::{AssetUrlRewriter, OffloadRuleSet, RequestContext};
use crate::output::OutputPipeline;

const REWRITABLE_TYPES: &[&str] = &[
    "text/html",
    "text/css",
    "text/xml",
    "text/javascript",
    "application/javascript",
    "application/x-javascript",
    "application/json",
    "application/xml",
    "application/rss+xml",
    "image/svg+xml",
];

/// Everything the middleware needs, published as one unit on reload.
#[derive(Debug, Clone)]
pub struct OutputSettings {
    pub rules: Arc<OffloadRuleSet>,
    pub assume_tls: bool,
    pub kill_switch: bool,
    pub bypass_header: String,
    pub max_body_bytes: usize,
}

/// Atomically swappable settings shared by all requests.
pub type SharedOutputSettings = Arc<ArcSwap<OutputSettings>>;

impl OutputSettings {
    /// Build settings, disabling offload if the rule set fails to compile.
    pub fn from_config(config: &StackConfig) -> Self {
        let rules = match OffloadRuleSet::from_config(&config.offload) {
            Ok(rules) => rules,
            Err(e) => {
                tracing::error!(error = %e, "Failed to build offload rules, offloading disabled");
                OffloadRuleSet::disabled()
            }
        };

        if rules.is_active() {
            tracing::info!(
                cdn_host = %rules.cdn_host(),
                asset_hosts = rules.asset_hosts().len(),
                extensions = rules.extensions().len(),
                "CDN offload rules built"
            );
        } else {
            tracing::info!("CDN offload inactive");
        }

        Self {
            rules: Arc::new(rules),
            assume_tls: config.server.assume_tls,
            kill_switch: config.offload.kill_switch,
            bypass_header: config.offload.bypass_header.trim().to_ascii_lowercase(),
            max_body_bytes: config.server.max_body_bytes,
        }
    }

    /// Wrap for sharing between the server and the reload task.
    pub fn shared(self) -> SharedOutputSettings {
        Arc::new(ArcSwap::from_pointee(self))
    }

    /// Per-request TLS and bypass flags.
    pub fn request_context(&self, headers: &HeaderMap) -> RequestContext {
        let forwarded_tls = headers
            .get("x-forwarded-proto")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.split(',').next())
            .map(|v| v.trim().eq_ignore_ascii_case("https"))
            .unwrap_or(false);

        let bypass_requested = !self.bypass_header.is_empty()
            && headers
                .get(self.bypass_header.as_str())
                .and_then(|v| v.to_str().ok())
                .map(is_truthy)
                .unwrap_or(false);

        RequestContext {
            tls: self.assume_tls || forwarded_tls,
            bypass: self.kill_switch || bypass_requested,
        }
    }
}

/// Middleware: run the output pipeline over the final response body.
pub async fn rewrite_output(
    State(settings): State<SharedOutputSettings>,
    request: Request,
    next: Next,
) -> Response {
    let settings = settings.load_full();
    let context = settings.request_context(request.headers());
    let is_head = request.method() == Method::HEAD;

    let mut pipeline = OutputPipeline::new();
    pipeline.register(AssetUrlRewriter::new(settings.rules.clone(), context));

    let mut buffer = match pipeline.start() {
        Some(buffer) if !is_head => buffer,
        _ => return next.run(request).await,
    };

    let response = next.run(request).await;
    if !is_rewritable(&response, settings.max_body_bytes) {
        return response;
    }

    let (mut parts, body) = response.into_parts();
    let bytes = match buffer_within(body, settings.max_body_bytes).await {
        Buffered::Complete(bytes) => bytes,
        Buffered::Passthrough(body) => return Response::from_parts(parts, body),
    };

    buffer.write(&bytes);
    let rewritten = buffer.finish();

    parts.headers.remove(header::CONTENT_LENGTH);
    Response::from_parts(parts, Body::from(rewritten))
}

enum Buffered {
    /// The whole body, within the limit.
    Complete(Vec<u8>),
    /// The body as the origin sent it: what was read so far, then the rest.
    Passthrough(Body),
}

/// Read `body` up to `limit` bytes. A body that grows past the limit or
/// fails mid-read is handed back unchanged for streaming.
async fn buffer_within(body: Body, limit: usize) -> Buffered {
    let mut chunks = body.into_data_stream();
    let mut collected = Vec::new();

    while let Some(chunk) = chunks.next().await {
        match chunk {
            Ok(data) if collected.len() + data.len() <= limit => collected.extend_from_slice(&data),
            Ok(data) => {
                tracing::debug!(max_body_bytes = limit, "Response body over rewrite limit, streaming unchanged");
                collected.extend_from_slice(&data);
                let head = stream::once(async move { Ok::<_, axum::Error>(Bytes::from(collected)) });
                return Buffered::Passthrough(Body::from_stream(head.chain(chunks)));
            }
            Err(e) => {
                tracing::warn!(error = %e, "Response body failed while buffering, streaming unchanged");
                let rest = stream::iter([Ok(Bytes::from(collected)), Err(e)]);
                return Buffered::Passthrough(Body::from_stream(rest));
            }
        }
    }

    Buffered::Complete(collected)
}

fn is_rewritable(response: &Response, max_body_bytes: usize) -> bool {
    let status = response.status();
    if status.is_informational()
        || status == StatusCode::NO_CONTENT
        || status == StatusCode::NOT_MODIFIED
    {
        return false;
    }

    let headers = response.headers();

    let encoded = headers
        .get(header::CONTENT_ENCODING)
        .and_then(|v| v.to_str().ok())
        .map(|v| !v.trim().eq_ignore_ascii_case("identity"))
        .unwrap_or(false);
    if encoded {
        return false;
    }

    let textual = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(|v| {
            let mime = v.split(';').next().unwrap_or("").trim().to_ascii_lowercase();
            REWRITABLE_TYPES.contains(&mime.as_str())
        })
        .unwrap_or(false);
    if !textual {
        return false;
    }

    let too_large = headers
        .get(header::CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<usize>().ok())
        .map(|len| len > max_body_bytes)
        .unwrap_or(false);
    if too_large {
        tracing::debug!(max_body_bytes, "Response too large to rewrite, passing through");
        return false;
    }

    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{middleware, routing::get, Router};
    use tower::ServiceExt;

    const PAGE: &str = r#"<img src="http://www.example.com/wp-content/uploads/a.png">"#;

    fn settings(cdn: &str) -> SharedOutputSettings {
        let mut config = StackConfig::default();
        config.offload.cdn_host = cdn.to_string();
        config.offload.asset_hosts = vec!["www.example.com".to_string()];
        OutputSettings::from_config(&config).shared()
    }

    fn app(settings: SharedOutputSettings) -> Router {
        Router::new()
            .route(
                "/",
                get(|| async { ([(header::CONTENT_TYPE, "text/html; charset=UTF-8")], PAGE) }),
            )
            .route(
                "/image",
                get(|| async { ([(header::CONTENT_TYPE, "image/png")], PAGE) }),
            )
            .route(
                "/gzip",
                get(|| async {
                    (
                        [
                            (header::CONTENT_TYPE, "text/html"),
                            (header::CONTENT_ENCODING, "gzip"),
                        ],
                        PAGE,
                    )
                }),
            )
            .layer(middleware::from_fn_with_state(settings, rewrite_output))
    }

    async fn fetch(app: Router, request: Request) -> String {
        let response = app.oneshot(request).await.unwrap();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    fn get_request(uri: &str) -> Request {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    #[tokio::test]
    async fn test_html_rewritten() {
        let body = fetch(app(settings("cdn.example.com")), get_request("/")).await;
        assert_eq!(body, r#"<img src="http://cdn.example.com/wp-content/uploads/a.png">"#);
    }

    #[tokio::test]
    async fn test_forwarded_proto_upgrades_scheme() {
        let request = Request::builder()
            .uri("/")
            .header("X-Forwarded-Proto", "https")
            .body(Body::empty())
            .unwrap();
        let body = fetch(app(settings("cdn.example.com")), request).await;
        assert_eq!(body, r#"<img src="https://cdn.example.com/wp-content/uploads/a.png">"#);
    }

    #[tokio::test]
    async fn test_bypass_header_passes_through() {
        let request = Request::builder()
            .uri("/")
            .header("x-stack-offload-bypass", "1")
            .body(Body::empty())
            .unwrap();
        assert_eq!(fetch(app(settings("cdn.example.com")), request).await, PAGE);
    }

    #[tokio::test]
    async fn test_without_cdn_passes_through() {
        assert_eq!(fetch(app(settings("")), get_request("/")).await, PAGE);
    }

    #[tokio::test]
    async fn test_binary_and_encoded_bodies_untouched() {
        let shared = settings("cdn.example.com");
        assert_eq!(fetch(app(shared.clone()), get_request("/image")).await, PAGE);
        assert_eq!(fetch(app(shared), get_request("/gzip")).await, PAGE);
    }

    #[tokio::test]
    async fn test_swapped_settings_take_effect() {
        let shared = settings("cdn.example.com");
        let mut config = StackConfig::default();
        config.offload.cdn_host = "static.example.net".to_string();
        config.offload.asset_hosts = vec!["www.example.com".to_string()];
        shared.store(Arc::new(OutputSettings::from_config(&config)));

        let body = fetch(app(shared), get_request("/")).await;
        assert!(body.contains("http://static.example.net/wp-content/uploads/a.png"));
    }

    fn chunked(chunks: &'static [&'static str]) -> Body {
        Body::from_stream(stream::iter(
            chunks.iter().map(|c| Ok::<_, std::io::Error>(Bytes::from_static(c.as_bytes()))),
        ))
    }

    fn limited_app(max_body_bytes: usize, chunks: &'static [&'static str]) -> Router {
        let mut config = StackConfig::default();
        config.offload.cdn_host = "cdn.example.com".to_string();
        config.offload.asset_hosts = vec!["www.example.com".to_string()];
        config.server.max_body_bytes = max_body_bytes;
        let shared = OutputSettings::from_config(&config).shared();

        Router::new()
            .route(
                "/",
                get(move || async move { ([(header::CONTENT_TYPE, "text/html")], chunked(chunks)) }),
            )
            .layer(middleware::from_fn_with_state(shared, rewrite_output))
    }

    const CHUNKS: &[&str] = &[
        r#"<img src="http://www.example.com"#,
        r#"/wp-content/uploads/a.png">"#,
    ];

    #[tokio::test]
    async fn test_chunked_body_over_limit_streams_unchanged() {
        let response = limited_app(16, CHUNKS).oneshot(get_request("/")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert_eq!(bytes, CHUNKS.concat());
    }

    #[tokio::test]
    async fn test_chunked_body_within_limit_is_rewritten() {
        let body = fetch(limited_app(1024, CHUNKS), get_request("/")).await;
        assert_eq!(body, r#"<img src="http://cdn.example.com/wp-content/uploads/a.png">"#);
    }

    #[tokio::test]
    async fn test_failing_body_is_passed_on() {
        let body = Body::from_stream(stream::iter([
            Ok(Bytes::from_static(b"<p>partial")),
            Err(std::io::Error::other("origin reset")),
        ]));
        let collected = buffer_within(body, 1024).await;
        let Buffered::Passthrough(body) = collected else {
            panic!("a failed body must not be rewritten");
        };
        assert!(axum::body::to_bytes(body, usize::MAX).await.is_err());
    }

    #[test]
    fn test_request_context() {
        let mut config = StackConfig::default();
        config.offload.cdn_host = "cdn.example.com".to_string();
        let settings = OutputSettings::from_config(&config);

        let mut headers = HeaderMap::new();
        assert_eq!(settings.request_context(&headers), RequestContext::default());

        headers.insert("x-forwarded-proto", "https, http".parse().unwrap());
        headers.insert("x-stack-offload-bypass", "yes".parse().unwrap());
        let ctx = settings.request_context(&headers);
        assert!(ctx.tls);
        assert!(ctx.bypass);

        config.offload.kill_switch = true;
        config.server.assume_tls = true;
        let ctx = OutputSettings::from_config(&config).request_context(&HeaderMap::new());
        assert!(ctx.tls);
        assert!(ctx.bypass);
    }
}
