//! Shared TTL cache for discovery answers.
//!
//! # Responsibilities
//! - Store serialized endpoint lists under `namespace:query` keys
//! - Expire entries after their TTL
//! - Provide an atomic get-or-compute so concurrent misses on one key
//!   trigger a single lookup
//!
//! # Design Decisions
//! - The store is a trait; an external store can replace the in-memory one
//! - No lock is held while the compute future runs; waiters park on a
//!   per-key in-flight cell instead

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use tokio::sync::OnceCell;

use crate::discovery::endpoint::CacheEntry;
use crate::error::CacheError;

/// Value produced on a miss.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Computed {
    pub value: String,
    /// False when the value came from a failure and must not outlive this
    /// call. It is still handed to callers already waiting on the key.
    pub cacheable: bool,
}

impl Computed {
    pub fn cacheable(value: String) -> Self {
        Self { value, cacheable: true }
    }

    pub fn transient(value: String) -> Self {
        Self { value, cacheable: false }
    }
}

/// Future producing the value to cache on a miss.
pub type ComputeFuture<'a> = Pin<Box<dyn Future<Output = Computed> + Send + 'a>>;

/// A shared key/value store with per-entry TTL.
#[async_trait]
pub trait CacheStore: Send + Sync {
    /// Fresh value for `key`, if any.
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError>;

    /// Store `value` for `ttl`.
    async fn set(&self, key: &str, value: String, ttl: Duration) -> Result<(), CacheError>;

    /// Return the fresh value for `key`, or run `compute`, store its output
    /// if cacheable and return it, as one indivisible operation per key.
    async fn get_or_compute(
        &self,
        key: &str,
        ttl: Duration,
        compute: ComputeFuture<'_>,
    ) -> Result<String, CacheError>;
}

/// In-process cache store.
#[derive(Debug, Clone, Default)]
pub struct MemoryCacheStore {
    entries: Arc<DashMap<String, CacheEntry<String>>>,
    inflight: Arc<DashMap<String, Arc<OnceCell<String>>>>,
}

impl MemoryCacheStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored entries, expired ones included.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn fresh(&self, key: &str) -> Option<String> {
        let (expired, value) = {
            let entry = self.entries.get(key)?;
            (entry.is_expired(), entry.value.clone())
        };

        if expired {
            self.entries.remove_if(key, |_, e| e.is_expired());
            None
        } else {
            Some(value)
        }
    }
}

#[async_trait]
impl CacheStore for MemoryCacheStore {
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        Ok(self.fresh(key))
    }

    async fn set(&self, key: &str, value: String, ttl: Duration) -> Result<(), CacheError> {
        self.entries.insert(key.to_string(), CacheEntry::new(value, ttl));
        Ok(())
    }

    async fn get_or_compute(
        &self,
        key: &str,
        ttl: Duration,
        compute: ComputeFuture<'_>,
    ) -> Result<String, CacheError> {
        if let Some(value) = self.fresh(key) {
            return Ok(value);
        }

        let cell = self
            .inflight
            .entry(key.to_string())
            .or_insert_with(|| Arc::new(OnceCell::new()))
            .clone();

        let value = cell
            .get_or_init(|| async move {
                // A flight that finished between our miss and joining the cell.
                if let Some(value) = self.fresh(key) {
                    return value;
                }
                let computed = compute.await;
                if computed.cacheable {
                    self.entries
                        .insert(key.to_string(), CacheEntry::new(computed.value.clone(), ttl));
                }
                computed.value
            })
            .await
            .clone();

        self.inflight.remove_if(key, |_, c| Arc::ptr_eq(c, &cell));
        Ok(value)
    }
}
