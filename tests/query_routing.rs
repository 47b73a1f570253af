//! Query routing as seen from an axum handler.

use axum::{body::Body, http::Request, routing::any, Router};
use tower::ServiceExt;

use edge_stack::db::{QueryRouter, MASTER_MARKER};

/// Runs a fixed query sequence and reports the routed text, one per line.
async fn run_queries(mut router: QueryRouter) -> String {
    ["SELECT * FROM wp_options", "UPDATE wp_options SET option_value = 1", "SELECT 1"]
        .iter()
        .map(|q| router.route(q).into_owned())
        .collect::<Vec<_>>()
        .join("\n")
}

async fn call(method: &str, uri: &str) -> Vec<String> {
    let app = Router::new().route("/{*path}", any(run_queries));
    let response = app
        .oneshot(Request::builder().method(method).uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    String::from_utf8(bytes.to_vec())
        .unwrap()
        .lines()
        .map(str::to_string)
        .collect()
}

#[tokio::test]
async fn test_front_end_get_reads_until_first_write() {
    let routed = call("GET", "/2024/01/hello-world/").await;
    assert_eq!(routed[0], "SELECT * FROM wp_options");
    assert_eq!(
        routed[1],
        format!("UPDATE wp_options SET option_value = 1{}", MASTER_MARKER)
    );
    assert_eq!(routed[2], format!("SELECT 1{}", MASTER_MARKER));
}

#[tokio::test]
async fn test_admin_request_is_sticky_from_first_query() {
    let routed = call("GET", "/wp-admin/options-general.php").await;
    assert!(routed.iter().all(|q| q.ends_with(MASTER_MARKER)));
}

#[tokio::test]
async fn test_post_is_sticky_from_first_query() {
    let routed = call("POST", "/cart/").await;
    assert_eq!(routed[0], format!("SELECT * FROM wp_options{}", MASTER_MARKER));
}

#[tokio::test]
async fn test_each_request_starts_fresh() {
    call("GET", "/a/").await;
    let routed = call("GET", "/b/").await;
    assert_eq!(routed[0], "SELECT * FROM wp_options");
}
