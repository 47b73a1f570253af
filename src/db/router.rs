//! Per-request read/write routing decisions.
//!
//! # Responsibilities
//! - Start sticky when the request method or path implies writes
//! - Escalate to sticky on the first query that is not a read
//! - Append the primary-routing marker to every query once sticky
//!
//! # Design Decisions
//! - Escalate-only: a request never returns to replica reads
//! - Classification stops once sticky
//! - Query results are never inspected, only query text

use std::borrow::Cow;
use std::convert::Infallible;

use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use axum::http::Method;

use crate::db::classify::is_read_query;
use crate::observability::metrics;

/// Trailing comment the SQL proxy uses to send a query to the primary.
pub const MASTER_MARKER: &str = " /* stack:master */";

/// Scripts whose requests always write.
const STICKY_SCRIPTS: &[&str] = &["wp-login.php", "wp-signup.php", "wp-cron.php", "xmlrpc.php"];

/// Path segment of the admin area.
const ADMIN_SEGMENT: &str = "wp-admin";

/// Routing state of one request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoutingState {
    /// Reads may go to a replica.
    ReadAllowed,
    /// Every query goes to the primary for the rest of the request.
    MasterSticky,
}

/// Whether the request must be pinned to the primary before any query runs.
pub fn requires_master(method: &Method, path: &str) -> bool {
    if method != Method::GET && method != Method::HEAD {
        return true;
    }

    let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
    if segments.iter().any(|s| *s == ADMIN_SEGMENT) {
        return true;
    }

    segments
        .last()
        .map(|last| STICKY_SCRIPTS.contains(last))
        .unwrap_or(false)
}

/// Routes the queries of a single request.
#[derive(Debug, Clone)]
pub struct QueryRouter {
    state: RoutingState,
}

impl QueryRouter {
    /// Router with its initial state derived from request metadata.
    pub fn for_request(method: &Method, path: &str) -> Self {
        let state = if requires_master(method, path) {
            tracing::debug!(method = %method, path = %path, "Request pinned to primary");
            RoutingState::MasterSticky
        } else {
            RoutingState::ReadAllowed
        };
        Self { state }
    }

    pub fn with_state(state: RoutingState) -> Self {
        Self { state }
    }

    pub fn state(&self) -> RoutingState {
        self.state
    }

    pub fn is_sticky(&self) -> bool {
        self.state == RoutingState::MasterSticky
    }

    /// Annotate `query` for the SQL proxy, escalating if it writes.
    pub fn route<'q>(&mut self, query: &'q str) -> Cow<'q, str> {
        if self.state == RoutingState::ReadAllowed && !is_read_query(query) {
            tracing::debug!("Write detected, routing remaining queries to primary");
            self.state = RoutingState::MasterSticky;
        }

        match self.state {
            RoutingState::ReadAllowed => {
                metrics::record_query_route("replica");
                Cow::Borrowed(query)
            }
            RoutingState::MasterSticky => {
                metrics::record_query_route("primary");
                Cow::Owned(format!("{}{}", query, MASTER_MARKER))
            }
        }
    }
}

impl<S> FromRequestParts<S> for QueryRouter
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(Self::for_request(&parts.method, parts.uri.path()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::Request;

    fn marked(q: &str) -> String {
        format!("{}{}", q, MASTER_MARKER)
    }

    #[test]
    fn test_write_escalates_and_sticks() {
        let mut router = QueryRouter::for_request(&Method::GET, "/shop/");
        assert_eq!(router.route("SELECT 1"), "SELECT 1");
        assert_eq!(
            router.route("INSERT INTO t VALUES (1)"),
            marked("INSERT INTO t VALUES (1)")
        );
        assert_eq!(router.route("SELECT 2"), marked("SELECT 2"));
        assert!(router.is_sticky());
    }

    #[test]
    fn test_post_is_sticky_from_the_start() {
        let mut router = QueryRouter::for_request(&Method::POST, "/cart/");
        assert_eq!(router.state(), RoutingState::MasterSticky);
        assert_eq!(router.route("SELECT 1"), marked("SELECT 1"));
        assert_eq!(router.route("SELECT 2"), marked("SELECT 2"));
    }

    #[test]
    fn test_head_behaves_like_get() {
        let router = QueryRouter::for_request(&Method::HEAD, "/");
        assert_eq!(router.state(), RoutingState::ReadAllowed);
    }

    #[test]
    fn test_sticky_paths() {
        for path in [
            "/wp-admin/",
            "/wp-admin/edit.php",
            "/blog/wp-admin/admin-ajax.php",
            "/wp-login.php",
            "/wp-signup.php",
            "/wp-cron.php",
            "/xmlrpc.php",
            "/blog/xmlrpc.php",
        ] {
            assert!(requires_master(&Method::GET, path), "{} should be sticky", path);
        }

        for path in ["/", "/shop/", "/wp-admin-guide/", "/wp-content/uploads/a.png", "/xmlrpc.php.bak"] {
            assert!(!requires_master(&Method::GET, path), "{} should not be sticky", path);
        }
    }

    #[test]
    fn test_non_idempotent_methods() {
        for method in [Method::POST, Method::PUT, Method::PATCH, Method::DELETE, Method::OPTIONS] {
            assert!(requires_master(&method, "/"));
        }
    }

    #[test]
    fn test_read_queries_pass_through_borrowed() {
        let mut router = QueryRouter::for_request(&Method::GET, "/");
        assert!(matches!(router.route("SHOW TABLES"), Cow::Borrowed(_)));
        assert!(!router.is_sticky());
    }

    #[tokio::test]
    async fn test_extractor_uses_method_and_path() {
        let request = Request::builder()
            .method(Method::GET)
            .uri("http://example.com/wp-login.php?action=register")
            .body(())
            .unwrap();
        let (mut parts, _) = request.into_parts();
        let router = QueryRouter::from_request_parts(&mut parts, &()).await.unwrap();
        assert!(router.is_sticky());
    }
}
