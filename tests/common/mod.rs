//! Shared utilities for integration testing.

#![allow(dead_code)]

use std::collections::HashMap;
use std::net::{Ipv4Addr, SocketAddr};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

use edge_stack::discovery::{CacheStore, ComputeFuture, DnsLookup, SrvRecord};
use edge_stack::error::{CacheError, DiscoveryError};

/// Start a mock origin on an ephemeral port that answers every request with
/// `body` as `content_type`. Returns its address.
pub async fn start_mock_origin(content_type: &'static str, body: String) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let body = Arc::new(body);

    tokio::spawn(async move {
        loop {
            match listener.accept().await {
                Ok((mut socket, _)) => {
                    let body = body.clone();
                    tokio::spawn(async move {
                        let mut buf = [0u8; 4096];
                        let _ = socket.read(&mut buf).await;
                        let response = format!(
                            "HTTP/1.1 200 OK\r\nContent-Type: {}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                            content_type,
                            body.len(),
                            body
                        );
                        let _ = socket.write_all(response.as_bytes()).await;
                        let _ = socket.shutdown().await;
                        tokio::time::sleep(Duration::from_millis(10)).await;
                    });
                }
                Err(_) => break,
            }
        }
    });

    addr
}

/// In-memory DNS answering from fixed tables and counting queries.
#[derive(Debug, Default)]
pub struct FakeDns {
    pub a: HashMap<String, Vec<Ipv4Addr>>,
    pub srv: HashMap<String, Vec<SrvRecord>>,
    pub delay: Option<Duration>,
    pub fail: AtomicBool,
    pub a_queries: AtomicUsize,
    pub srv_queries: AtomicUsize,
}

impl FakeDns {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_a(mut self, host: &str, addrs: &[[u8; 4]]) -> Self {
        self.a
            .insert(host.to_string(), addrs.iter().map(|o| Ipv4Addr::from(*o)).collect());
        self
    }

    pub fn with_srv(mut self, name: &str, records: &[(u16, u16, &str)]) -> Self {
        self.srv.insert(
            name.to_string(),
            records
                .iter()
                .map(|(priority, port, target)| SrvRecord {
                    priority: *priority,
                    weight: 0,
                    port: *port,
                    target: target.to_string(),
                })
                .collect(),
        );
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn failing() -> Self {
        let dns = Self::default();
        dns.set_failing(true);
        dns
    }

    /// Switch between answering and failing every lookup.
    pub fn set_failing(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    pub fn queries(&self) -> usize {
        self.a_queries.load(Ordering::SeqCst) + self.srv_queries.load(Ordering::SeqCst)
    }

    async fn pause(&self) {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
    }
}

#[async_trait]
impl DnsLookup for FakeDns {
    async fn lookup_a(&self, host: &str) -> Result<Vec<Ipv4Addr>, DiscoveryError> {
        self.a_queries.fetch_add(1, Ordering::SeqCst);
        self.pause().await;
        if self.fail.load(Ordering::SeqCst) {
            return Err(DiscoveryError::Lookup {
                name: host.to_string(),
                reason: "SERVFAIL".into(),
            });
        }
        Ok(self.a.get(host).cloned().unwrap_or_default())
    }

    async fn lookup_srv(&self, name: &str) -> Result<Vec<SrvRecord>, DiscoveryError> {
        self.srv_queries.fetch_add(1, Ordering::SeqCst);
        self.pause().await;
        if self.fail.load(Ordering::SeqCst) {
            return Err(DiscoveryError::Lookup {
                name: name.to_string(),
                reason: "SERVFAIL".into(),
            });
        }
        Ok(self.srv.get(name).cloned().unwrap_or_default())
    }
}

/// Cache store whose backend is always down.
#[derive(Debug, Default)]
pub struct UnavailableStore;

#[async_trait]
impl CacheStore for UnavailableStore {
    async fn get(&self, _key: &str) -> Result<Option<String>, CacheError> {
        Err(CacheError::Unavailable("connection refused".into()))
    }

    async fn set(&self, _key: &str, _value: String, _ttl: Duration) -> Result<(), CacheError> {
        Err(CacheError::Unavailable("connection refused".into()))
    }

    async fn get_or_compute(
        &self,
        _key: &str,
        _ttl: Duration,
        _compute: ComputeFuture<'_>,
    ) -> Result<String, CacheError> {
        Err(CacheError::Unavailable("connection refused".into()))
    }
}
