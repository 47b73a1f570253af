//! Discovery result types.

use std::net::Ipv4Addr;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

/// Priority given to endpoints that came from plain A records.
pub const DEFAULT_PRIORITY: u32 = 10;

/// A concrete address for a symbolic service name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ResolvedEndpoint {
    /// IP literal.
    pub host: Ipv4Addr,
    /// 0 when the caller supplies the port out of band.
    pub port: u16,
    /// Lower sorts first.
    pub priority: u32,
}

impl ResolvedEndpoint {
    /// Endpoint from an A record: default priority, no port.
    pub fn from_a_record(host: Ipv4Addr) -> Self {
        Self {
            host,
            port: 0,
            priority: DEFAULT_PRIORITY,
        }
    }

    /// `host:port`, substituting `default_port` when the record carried none.
    pub fn socket_addr(&self, default_port: u16) -> std::net::SocketAddr {
        let port = if self.port == 0 { default_port } else { self.port };
        std::net::SocketAddr::from((self.host, port))
    }
}

/// A cached value with its insertion time and lifetime.
#[derive(Debug, Clone)]
pub struct CacheEntry<T> {
    pub value: T,
    pub inserted_at: Instant,
    pub ttl: Duration,
}

impl<T> CacheEntry<T> {
    pub fn new(value: T, ttl: Duration) -> Self {
        Self {
            value,
            inserted_at: Instant::now(),
            ttl,
        }
    }

    pub fn ttl_secs(&self) -> u64 {
        self.ttl.as_secs()
    }

    /// Expired once `ttl` has elapsed since insertion.
    pub fn is_expired_at(&self, now: Instant) -> bool {
        now.saturating_duration_since(self.inserted_at) >= self.ttl
    }

    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Instant::now())
    }
}
