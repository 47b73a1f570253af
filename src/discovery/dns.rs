//! DNS lookups behind a trait so the resolver can be driven without a network.

use std::net::Ipv4Addr;

use async_trait::async_trait;
use hickory_resolver::config::{ResolverConfig, ResolverOpts};
use hickory_resolver::error::{ResolveError, ResolveErrorKind};
use hickory_resolver::TokioAsyncResolver;

use crate::error::DiscoveryError;

/// One SRV answer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SrvRecord {
    pub priority: u16,
    pub weight: u16,
    pub port: u16,
    /// Target hostname without the trailing root dot.
    pub target: String,
}

/// Raw A and SRV queries.
#[async_trait]
pub trait DnsLookup: Send + Sync {
    /// A records for `host`. No records is `Ok(vec![])`.
    async fn lookup_a(&self, host: &str) -> Result<Vec<Ipv4Addr>, DiscoveryError>;

    /// SRV records for the fully qualified `name`.
    async fn lookup_srv(&self, name: &str) -> Result<Vec<SrvRecord>, DiscoveryError>;
}

/// System resolver backed by hickory.
#[derive(Clone)]
pub struct HickoryLookup {
    resolver: TokioAsyncResolver,
}

impl HickoryLookup {
    /// Use `/etc/resolv.conf` (or the platform equivalent), falling back to
    /// hickory's default upstreams if it cannot be read.
    pub fn from_system_conf() -> Self {
        let resolver = match TokioAsyncResolver::tokio_from_system_conf() {
            Ok(resolver) => resolver,
            Err(e) => {
                tracing::warn!(error = %e, "Failed to read system resolver config, using defaults");
                TokioAsyncResolver::tokio(ResolverConfig::default(), ResolverOpts::default())
            }
        };
        Self { resolver }
    }
}

impl std::fmt::Debug for HickoryLookup {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HickoryLookup").finish_non_exhaustive()
    }
}

fn lookup_error(name: &str, e: ResolveError) -> DiscoveryError {
    DiscoveryError::Lookup {
        name: name.to_string(),
        reason: e.to_string(),
    }
}

fn is_no_records(e: &ResolveError) -> bool {
    matches!(e.kind(), ResolveErrorKind::NoRecordsFound { .. })
}

#[async_trait]
impl DnsLookup for HickoryLookup {
    async fn lookup_a(&self, host: &str) -> Result<Vec<Ipv4Addr>, DiscoveryError> {
        match self.resolver.ipv4_lookup(host).await {
            Ok(answer) => Ok(answer.iter().map(|a| a.0).collect()),
            Err(e) if is_no_records(&e) => Ok(Vec::new()),
            Err(e) => Err(lookup_error(host, e)),
        }
    }

    async fn lookup_srv(&self, name: &str) -> Result<Vec<SrvRecord>, DiscoveryError> {
        match self.resolver.srv_lookup(name).await {
            Ok(answer) => Ok(answer
                .iter()
                .map(|srv| SrvRecord {
                    priority: srv.priority(),
                    weight: srv.weight(),
                    port: srv.port(),
                    target: srv.target().to_utf8().trim_end_matches('.').to_string(),
                })
                .collect()),
            Err(e) if is_no_records(&e) => Ok(Vec::new()),
            Err(e) => Err(lookup_error(name, e)),
        }
    }
}
