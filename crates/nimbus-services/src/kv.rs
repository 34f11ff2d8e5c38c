//! Key-value cache store contract.
//!
//! Entries are plain strings with a per-write TTL; expiry is the store's job.
//! Callers never inspect TTLs to judge staleness, they only overwrite on miss.

use std::collections::HashMap;
use std::future::Future;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use parking_lot::Mutex;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum KvError {
    #[error("cache {operation} timed out after {timeout:?}")]
    Timeout {
        operation: &'static str,
        timeout: Duration,
    },

    #[error("cache {operation} failed: {message}")]
    Backend {
        operation: &'static str,
        message: String,
    },
}

impl KvError {
    pub fn backend(operation: &'static str, err: impl std::fmt::Display) -> Self {
        Self::Backend {
            operation,
            message: err.to_string(),
        }
    }
}

pub type KvResult<T> = Result<T, KvError>;

/// Remaining lifetime of a key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyTtl {
    /// No such key (or already expired).
    Missing,
    /// Key exists without an expiry.
    Persistent,
    Expires(Duration),
}

/// A network-attached expiring key/value store.
#[async_trait]
pub trait KvStore: Send + Sync {
    /// Liveness check; a healthy store answers `PONG`.
    async fn ping(&self) -> KvResult<String>;

    /// `Ok(None)` when the key is absent or expired.
    async fn get(&self, key: &str) -> KvResult<Option<String>>;

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> KvResult<()>;

    async fn del(&self, key: &str) -> KvResult<()>;

    async fn ttl(&self, key: &str) -> KvResult<KeyTtl>;
}

/// Run one cache command, failing with `KvError::Timeout` after `timeout`.
pub async fn bounded<T, F>(operation: &'static str, timeout: Duration, fut: F) -> KvResult<T>
where
    F: Future<Output = KvResult<T>>,
{
    match tokio::time::timeout(timeout, fut).await {
        Ok(result) => result,
        Err(_) => Err(KvError::Timeout { operation, timeout }),
    }
}

#[derive(Debug)]
struct MemoryEntry {
    value: String,
    expires_at: Option<Instant>,
}

impl MemoryEntry {
    fn is_live(&self, now: Instant) -> bool {
        self.expires_at.map_or(true, |at| at > now)
    }
}

/// In-process `KvStore` honouring TTLs. Used in tests and local runs.
#[derive(Debug, Default)]
pub struct MemoryKvStore {
    entries: Mutex<HashMap<String, MemoryEntry>>,
}

impl MemoryKvStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live entries.
    pub fn len(&self) -> usize {
        let now = Instant::now();
        self.entries.lock().values().filter(|e| e.is_live(now)).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl KvStore for MemoryKvStore {
    async fn ping(&self) -> KvResult<String> {
        Ok("PONG".to_string())
    }

    async fn get(&self, key: &str) -> KvResult<Option<String>> {
        let now = Instant::now();
        let mut entries = self.entries.lock();
        match entries.get(key) {
            Some(entry) if entry.is_live(now) => Ok(Some(entry.value.clone())),
            Some(_) => {
                entries.remove(key);
                Ok(None)
            }
            None => Ok(None),
        }
    }

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> KvResult<()> {
        let entry = MemoryEntry {
            value: value.to_string(),
            // A TTL too large to represent never expires.
            expires_at: Instant::now().checked_add(ttl),
        };
        self.entries.lock().insert(key.to_string(), entry);
        Ok(())
    }

    async fn del(&self, key: &str) -> KvResult<()> {
        self.entries.lock().remove(key);
        Ok(())
    }

    async fn ttl(&self, key: &str) -> KvResult<KeyTtl> {
        let now = Instant::now();
        let entries = self.entries.lock();
        Ok(match entries.get(key) {
            Some(entry) if entry.is_live(now) => match entry.expires_at {
                Some(at) => KeyTtl::Expires(at.saturating_duration_since(now)),
                None => KeyTtl::Persistent,
            },
            _ => KeyTtl::Missing,
        })
    }
}
