//! End-to-end tests through a running edge server.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;

use edge_stack::discovery::ServiceResolver;
use edge_stack::{HttpServer, Shutdown, StackConfig};

mod common;
use common::FakeDns;

const PAGE: &str = r#"<html><head><link rel="stylesheet" href="https://www.example.com/wp-content/themes/t/style.css"></head><body><img src="/wp-content/uploads/2024/01/cat.png"><a href="https://www.example.com/shop/">Shop</a></body></html>"#;

fn edge_config(origin: SocketAddr) -> StackConfig {
    let mut config = StackConfig::default();
    config.origin.host = origin.ip().to_string();
    config.origin.port = origin.port();
    config.offload.cdn_host = "cdn.example.com".into();
    config.offload.asset_hosts = vec!["www.example.com".into()];
    config
}

struct Edge {
    addr: SocketAddr,
    shutdown: Shutdown,
    updates: mpsc::UnboundedSender<StackConfig>,
}

async fn start_edge(server: HttpServer) -> Edge {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let shutdown = Shutdown::new();
    let (updates, config_updates) = mpsc::unbounded_channel();
    let server_shutdown = shutdown.subscribe();

    tokio::spawn(async move {
        let _ = server.run(listener, config_updates, server_shutdown).await;
    });
    tokio::time::sleep(Duration::from_millis(100)).await;

    Edge {
        addr,
        shutdown,
        updates,
    }
}

fn client() -> reqwest::Client {
    reqwest::Client::builder()
        .pool_max_idle_per_host(0)
        .no_proxy()
        .build()
        .unwrap()
}

#[tokio::test]
async fn test_html_assets_are_offloaded() {
    let origin = common::start_mock_origin("text/html; charset=UTF-8", PAGE.to_string()).await;
    let edge = start_edge(HttpServer::new(edge_config(origin))).await;

    let res = client()
        .get(format!("http://{}/", edge.addr))
        .send()
        .await
        .expect("edge unreachable");
    assert_eq!(res.status(), 200);
    assert!(res.headers().contains_key("x-request-id"));

    let body = res.text().await.unwrap();
    assert!(body.contains(r#"href="https://cdn.example.com/wp-content/themes/t/style.css""#));
    assert!(body.contains(r#"src="http://cdn.example.com/wp-content/uploads/2024/01/cat.png""#));
    assert!(body.contains(r#"href="https://www.example.com/shop/""#));

    edge.shutdown.trigger();
}

#[tokio::test]
async fn test_forwarded_https_keeps_tls_scheme() {
    let origin = common::start_mock_origin("text/html", PAGE.to_string()).await;
    let edge = start_edge(HttpServer::new(edge_config(origin))).await;

    let body = client()
        .get(format!("http://{}/", edge.addr))
        .header("x-forwarded-proto", "https")
        .send()
        .await
        .unwrap()
        .text()
        .await
        .unwrap();
    assert!(body.contains("https://cdn.example.com/wp-content/uploads/2024/01/cat.png"));

    edge.shutdown.trigger();
}

#[tokio::test]
async fn test_bypass_header_returns_original() {
    let origin = common::start_mock_origin("text/html", PAGE.to_string()).await;
    let edge = start_edge(HttpServer::new(edge_config(origin))).await;

    let body = client()
        .get(format!("http://{}/", edge.addr))
        .header("x-stack-offload-bypass", "1")
        .send()
        .await
        .unwrap()
        .text()
        .await
        .unwrap();
    assert_eq!(body, PAGE);

    edge.shutdown.trigger();
}

#[tokio::test]
async fn test_binary_content_is_untouched() {
    let origin = common::start_mock_origin("application/octet-stream", PAGE.to_string()).await;
    let edge = start_edge(HttpServer::new(edge_config(origin))).await;

    let body = client()
        .get(format!("http://{}/download", edge.addr))
        .send()
        .await
        .unwrap()
        .text()
        .await
        .unwrap();
    assert_eq!(body, PAGE);

    edge.shutdown.trigger();
}

#[tokio::test]
async fn test_reload_applies_kill_switch() {
    let origin = common::start_mock_origin("text/html", PAGE.to_string()).await;
    let config = edge_config(origin);
    let edge = start_edge(HttpServer::new(config.clone())).await;

    let mut reloaded = config;
    reloaded.offload.kill_switch = true;
    edge.updates.send(reloaded).unwrap();
    tokio::time::sleep(Duration::from_millis(100)).await;

    let body = client()
        .get(format!("http://{}/", edge.addr))
        .send()
        .await
        .unwrap()
        .text()
        .await
        .unwrap();
    assert_eq!(body, PAGE);

    edge.shutdown.trigger();
}

#[tokio::test]
async fn test_origin_found_through_srv() {
    let origin = common::start_mock_origin("text/plain", "hello".to_string()).await;
    let dns = FakeDns::new()
        .with_srv("_http._tcp.origin.internal", &[(10, origin.port(), "app1.internal")])
        .with_a("app1.internal", &[[127, 0, 0, 1]]);

    let mut config = edge_config(origin);
    config.origin.host = "origin.internal".into();
    config.origin.service = "http".into();
    config.origin.port = 1;
    let resolver = ServiceResolver::new(Arc::new(dns), &config.discovery);
    let edge = start_edge(HttpServer::with_resolver(config, resolver)).await;

    let res = client()
        .get(format!("http://{}/", edge.addr))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), 200);
    assert_eq!(res.text().await.unwrap(), "hello");

    edge.shutdown.trigger();
}

#[tokio::test]
async fn test_unresolvable_origin_is_503() {
    let mut config = StackConfig::default();
    config.origin.host = "nowhere.internal".into();
    let resolver = ServiceResolver::new(Arc::new(FakeDns::new()), &config.discovery);
    let edge = start_edge(HttpServer::with_resolver(config, resolver)).await;

    let res = client()
        .get(format!("http://{}/", edge.addr))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), 503);
    assert_eq!(res.text().await.unwrap(), "Origin unavailable");

    edge.shutdown.trigger();
}
