//! Service discovery subsystem.
//!
//! # Data Flow
//! ```text
//! resolve(host)
//!     → IPv4 literal? return as is
//!     → dns.rs A lookup (bounded by timeout)
//!     → shuffle, pick one
//!
//! discover_srv(host, service, protocol)
//!     → dns.rs SRV lookup of _service._protocol.host
//!     → resolve() each target, keep record port/priority
//!
//! cached_discover*(…)
//!     → cache.rs get-or-compute on "namespace:query"
//!     → miss: run the uncached lookup once, store for ttl
//! ```

pub mod cache;
pub mod dns;
pub mod endpoint;
pub mod resolver;

pub use cache::{CacheStore, ComputeFuture, Computed, MemoryCacheStore};
pub use dns::{DnsLookup, HickoryLookup, SrvRecord};
pub use endpoint::{CacheEntry, ResolvedEndpoint, DEFAULT_PRIORITY};
pub use resolver::ServiceResolver;
