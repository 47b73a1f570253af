//! Symbolic hostname → endpoint resolution.
//!
//! # Responsibilities
//! - Pass IPv4 literals through without a lookup
//! - Pick one A record at random to spread load across hosts
//! - Expand SRV records into endpoints, resolving each target
//! - Cache answers for a short TTL when running as a server
//!
//! # Design Decisions
//! - Lookup failures, timeouts and empty answers all become "no endpoint";
//!   callers own the fallback policy
//! - Batch processes never cache: there is nothing long-lived to share
//! - An unavailable cache store degrades to a direct lookup
//! - Answers behind a failed or timed-out lookup are served but never cached

use std::net::Ipv4Addr;
use std::sync::Arc;
use std::time::Duration;

use rand::seq::SliceRandom;

use crate::config::{DiscoveryConfig, ExecutionContext};
use crate::discovery::cache::{CacheStore, Computed};
use crate::discovery::dns::{DnsLookup, SrvRecord};
use crate::discovery::endpoint::ResolvedEndpoint;
use crate::error::DiscoveryError;
use crate::observability::metrics;

/// Resolves service names through DNS with an optional shared cache.
pub struct ServiceResolver {
    lookup: Arc<dyn DnsLookup>,
    cache: Option<Arc<dyn CacheStore>>,
    context: ExecutionContext,
    namespace: String,
    ttl: Duration,
    timeout: Duration,
}

impl ServiceResolver {
    pub fn new(lookup: Arc<dyn DnsLookup>, config: &DiscoveryConfig) -> Self {
        Self {
            lookup,
            cache: None,
            context: config.context,
            namespace: config.namespace.clone(),
            ttl: Duration::from_secs(config.ttl_secs),
            timeout: Duration::from_millis(config.timeout_ms),
        }
    }

    /// Attach a shared cache store. Ignored in the batch context.
    pub fn with_cache(mut self, cache: Arc<dyn CacheStore>) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn caching_enabled(&self) -> bool {
        self.cache.is_some() && self.context == ExecutionContext::Serving
    }

    /// DNS name queried for an SRV lookup.
    pub fn srv_name(host: &str, service: &str, protocol: &str) -> String {
        if service.is_empty() {
            host.to_string()
        } else {
            format!("_{}._{}.{}", service, protocol, host)
        }
    }

    /// Cache key for a query host (a hostname or a full SRV name).
    pub fn cache_key(&self, query_host: &str) -> String {
        format!("{}:{}", self.namespace, query_host)
    }

    /// One address for `host`, chosen uniformly at random among its A records.
    pub async fn resolve(&self, host: &str) -> Option<Ipv4Addr> {
        self.pick(host).await.0
    }

    /// Every A record for `host` as an endpoint with the default priority and
    /// no port.
    pub async fn discover(&self, host: &str) -> Vec<ResolvedEndpoint> {
        self.discover_checked(host).await.0
    }

    /// Endpoints from the SRV records of `_{service}._{protocol}.{host}`,
    /// lowest priority first. Targets that do not resolve are dropped.
    pub async fn discover_srv(
        &self,
        host: &str,
        service: &str,
        protocol: &str,
    ) -> Vec<ResolvedEndpoint> {
        self.discover_srv_checked(host, service, protocol).await.0
    }

    /// `discover` through the cache.
    pub async fn cached_discover(&self, host: &str) -> Vec<ResolvedEndpoint> {
        let host = host.trim();
        let key = self.cache_key(host);
        match self.through_cache(&key, self.discover_checked(host)).await {
            Some(endpoints) => endpoints,
            None => self.discover(host).await,
        }
    }

    /// `discover_srv` through the cache.
    pub async fn cached_discover_srv(
        &self,
        host: &str,
        service: &str,
        protocol: &str,
    ) -> Vec<ResolvedEndpoint> {
        let host = host.trim();
        let key = self.cache_key(&Self::srv_name(host, service, protocol));
        match self
            .through_cache(&key, self.discover_srv_checked(host, service, protocol))
            .await
        {
            Some(endpoints) => endpoints,
            None => self.discover_srv(host, service, protocol).await,
        }
    }

    // The `bool` in the helpers below is false when any lookup behind the
    // answer failed or timed out. Such answers are never cached.

    async fn pick(&self, host: &str) -> (Option<Ipv4Addr>, bool) {
        let host = host.trim();
        if let Ok(ip) = host.parse::<Ipv4Addr>() {
            return (Some(ip), true);
        }

        match self.lookup_a(host).await {
            Some(mut addrs) => {
                addrs.shuffle(&mut rand::thread_rng());
                (addrs.first().copied(), true)
            }
            None => (None, false),
        }
    }

    async fn discover_checked(&self, host: &str) -> (Vec<ResolvedEndpoint>, bool) {
        let host = host.trim();
        if let Ok(ip) = host.parse::<Ipv4Addr>() {
            return (vec![ResolvedEndpoint::from_a_record(ip)], true);
        }

        match self.lookup_a(host).await {
            Some(mut addrs) => {
                addrs.shuffle(&mut rand::thread_rng());
                let endpoints = addrs.into_iter().map(ResolvedEndpoint::from_a_record).collect();
                (endpoints, true)
            }
            None => (Vec::new(), false),
        }
    }

    async fn discover_srv_checked(
        &self,
        host: &str,
        service: &str,
        protocol: &str,
    ) -> (Vec<ResolvedEndpoint>, bool) {
        let name = Self::srv_name(host.trim(), service, protocol);
        let Some(records) = self.lookup_srv(&name).await else {
            return (Vec::new(), false);
        };

        let mut complete = true;
        let mut endpoints = Vec::with_capacity(records.len());
        for record in records {
            let (ip, ok) = self.pick(&record.target).await;
            complete &= ok;
            match ip {
                Some(ip) => endpoints.push(ResolvedEndpoint {
                    host: ip,
                    port: record.port,
                    priority: u32::from(record.priority),
                }),
                None => {
                    tracing::debug!(name = %name, target = %record.target, "SRV target did not resolve, dropping");
                }
            }
        }

        endpoints.sort_by_key(|e| e.priority);
        (endpoints, complete)
    }

    /// Run `lookup` behind the cache's get-or-compute.
    ///
    /// `None` means the cache could not answer and the caller should resolve
    /// directly.
    async fn through_cache<F>(&self, key: &str, lookup: F) -> Option<Vec<ResolvedEndpoint>>
    where
        F: std::future::Future<Output = (Vec<ResolvedEndpoint>, bool)> + Send,
    {
        let cache = match &self.cache {
            Some(cache) if self.context == ExecutionContext::Serving => cache,
            _ => return None,
        };

        let mut computed = false;
        let computed_flag = &mut computed;
        let compute = Box::pin(async move {
            *computed_flag = true;
            let (endpoints, complete) = lookup.await;
            let value = serde_json::to_string(&endpoints).unwrap_or_else(|_| "[]".to_string());
            if complete {
                Computed::cacheable(value)
            } else {
                Computed::transient(value)
            }
        });

        let raw = match cache.get_or_compute(key, self.ttl, compute).await {
            Ok(raw) => raw,
            Err(e) => {
                tracing::warn!(key = %key, error = %e, "Discovery cache unavailable, resolving directly");
                metrics::record_discovery_cache("unavailable");
                return None;
            }
        };

        metrics::record_discovery_cache(if computed { "miss" } else { "hit" });

        match serde_json::from_str(&raw) {
            Ok(endpoints) => Some(endpoints),
            Err(e) => {
                tracing::warn!(key = %key, error = %e, "Undecodable discovery cache entry, resolving directly");
                metrics::record_discovery_cache("corrupt");
                None
            }
        }
    }

    async fn lookup_a(&self, host: &str) -> Option<Vec<Ipv4Addr>> {
        let result = match tokio::time::timeout(self.timeout, self.lookup.lookup_a(host)).await {
            Ok(result) => result,
            Err(_) => Err(DiscoveryError::Timeout(host.to_string())),
        };
        settle("a", host, result)
    }

    async fn lookup_srv(&self, name: &str) -> Option<Vec<SrvRecord>> {
        let result = match tokio::time::timeout(self.timeout, self.lookup.lookup_srv(name)).await {
            Ok(result) => result,
            Err(_) => Err(DiscoveryError::Timeout(name.to_string())),
        };
        settle("srv", name, result)
    }
}

/// Log and count a lookup outcome. `None` when the lookup failed.
fn settle<T>(
    kind: &'static str,
    name: &str,
    result: Result<Vec<T>, DiscoveryError>,
) -> Option<Vec<T>> {
    match result {
        Ok(records) if records.is_empty() => {
            tracing::debug!(kind, name = %name, "DNS lookup returned no records");
            metrics::record_dns_lookup(kind, "empty");
            Some(records)
        }
        Ok(records) => {
            metrics::record_dns_lookup(kind, "ok");
            Some(records)
        }
        Err(e @ DiscoveryError::Timeout(_)) => {
            tracing::warn!(kind, error = %e, "DNS lookup timed out");
            metrics::record_dns_lookup(kind, "timeout");
            None
        }
        Err(e) => {
            tracing::warn!(kind, error = %e, "DNS lookup failed");
            metrics::record_dns_lookup(kind, "error");
            None
        }
    }
}

impl std::fmt::Debug for ServiceResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceResolver")
            .field("context", &self.context)
            .field("namespace", &self.namespace)
            .field("ttl", &self.ttl)
            .field("timeout", &self.timeout)
            .field("caching", &self.caching_enabled())
            .finish()
    }
}
