//! Shared cache-aside lookup used by both proxies.
//!
//! A lookup reads the key; a decodable entry is returned without touching the
//! origin. Otherwise the origin is called once, its error is returned as-is
//! (nothing is written), and a successful value is written back best-effort.
//! Cache store failures never surface to the caller.

use std::fmt::Display;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::de::DeserializeOwned;
use serde::Serialize;
use thiserror::Error;

use crate::kv::{KvError, KvStore};
use crate::metrics::{CacheType, MetricsSink, Outcome};

/// Which origin a miss falls through to, for metrics labelling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OriginKind {
    /// City catalog query, labelled with the store operation name.
    Catalog(&'static str),
    Weather,
}

/// Why a write-back did not land.
#[derive(Debug, Error)]
pub enum CacheWriteError {
    #[error("failed to encode cache entry: {0}")]
    Serialize(#[from] serde_json::Error),
    #[error(transparent)]
    Store(#[from] KvError),
}

/// One proxied lookup.
#[derive(Debug, Clone)]
pub struct Lookup {
    /// Proxy method name, used for logs and the lookup duration metric.
    pub method: &'static str,
    pub key: String,
    pub cache: CacheType,
    pub ttl: Duration,
    pub origin: OriginKind,
}

/// Cache-aside engine over a `KvStore` with optional metrics.
#[derive(Clone)]
pub struct CacheAside {
    store: Arc<dyn KvStore>,
    metrics: Option<Arc<dyn MetricsSink>>,
}

impl CacheAside {
    pub fn new(store: Arc<dyn KvStore>, metrics: Option<Arc<dyn MetricsSink>>) -> Self {
        Self { store, metrics }
    }

    pub fn store(&self) -> &Arc<dyn KvStore> {
        &self.store
    }

    /// Read and decode `key`. Store errors and undecodable entries are misses.
    pub async fn read<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let raw = match self.store.get(key).await {
            Ok(Some(raw)) => raw,
            Ok(None) => return None,
            Err(e) => {
                tracing::warn!(key, "Cache read failed, falling through: {}", e);
                return None;
            }
        };

        match serde_json::from_str(&raw) {
            Ok(value) => Some(value),
            Err(e) => {
                tracing::warn!(key, "Discarding undecodable cache entry: {}", e);
                None
            }
        }
    }

    /// Encode `value` and store it under `key` for `ttl`.
    pub async fn write<T: Serialize>(
        &self,
        key: &str,
        value: &T,
        ttl: Duration,
    ) -> Result<(), CacheWriteError> {
        let encoded = serde_json::to_string(value)?;
        self.store.set(key, &encoded, ttl).await?;
        Ok(())
    }

    /// Serve `lookup` from cache, or from `load` on a miss.
    pub async fn get_or_load<T, E, F, Fut>(&self, lookup: Lookup, load: F) -> Result<T, E>
    where
        T: Serialize + DeserializeOwned,
        E: Display,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let started = Instant::now();

        if let Some(value) = self.read::<T>(&lookup.key).await {
            tracing::debug!(method = lookup.method, key = %lookup.key, "Cache hit");
            if let Some(metrics) = &self.metrics {
                metrics.cache_hit(lookup.cache);
                metrics.lookup_duration(lookup.method, started.elapsed());
            }
            return Ok(value);
        }

        tracing::debug!(method = lookup.method, key = %lookup.key, "Cache miss");
        if let Some(metrics) = &self.metrics {
            metrics.cache_miss(lookup.cache);
        }

        let origin_started = Instant::now();
        let result = load().await;
        self.observe_origin(lookup.origin, result.is_ok(), origin_started.elapsed());

        let value = match result {
            Ok(value) => value,
            Err(e) => {
                tracing::debug!(method = lookup.method, "Origin lookup failed: {}", e);
                return Err(e);
            }
        };

        if let Err(e) = self.write(&lookup.key, &value, lookup.ttl).await {
            tracing::warn!(key = %lookup.key, "Cache write failed: {}", e);
        }

        if let Some(metrics) = &self.metrics {
            metrics.lookup_duration(lookup.method, started.elapsed());
        }
        Ok(value)
    }

    fn observe_origin(&self, origin: OriginKind, ok: bool, elapsed: Duration) {
        let Some(metrics) = &self.metrics else {
            return;
        };
        let outcome = Outcome::from_ok(ok);
        match origin {
            OriginKind::Catalog(operation) => metrics.origin_request(operation, outcome, elapsed),
            OriginKind::Weather => metrics.weather_request(outcome, elapsed),
        }
    }
}
