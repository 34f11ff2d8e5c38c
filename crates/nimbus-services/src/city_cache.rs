//! Cache-aside proxy in front of a `CityCatalog`.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use nimbus_core::CacheConfig;

use crate::cache_aside::{CacheAside, Lookup, OriginKind};
use crate::catalog::{CatalogResult, City, CityCatalog};
use crate::keys::KeyBuilder;
use crate::kv::KvStore;
use crate::metrics::{CacheType, MetricsSink};

/// Entry lifetimes for the two city caches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CityCacheTtl {
    pub by_name: Duration,
    pub all: Duration,
}

impl CityCacheTtl {
    pub fn from_config(config: &CacheConfig) -> Self {
        Self {
            by_name: config.city_ttl(),
            all: config.cities_all_ttl(),
        }
    }
}

impl Default for CityCacheTtl {
    fn default() -> Self {
        Self::from_config(&CacheConfig::default())
    }
}

/// `CityCatalog` that consults the cache before the wrapped catalog.
///
/// Not-found and backend errors from the catalog pass through unchanged and
/// are never cached.
pub struct CityCacheProxy {
    origin: Arc<dyn CityCatalog>,
    cache: CacheAside,
    keys: KeyBuilder,
    ttl: CityCacheTtl,
}

impl CityCacheProxy {
    pub fn new(
        origin: Arc<dyn CityCatalog>,
        store: Arc<dyn KvStore>,
        metrics: Option<Arc<dyn MetricsSink>>,
        keys: KeyBuilder,
        ttl: CityCacheTtl,
    ) -> Self {
        Self {
            origin,
            cache: CacheAside::new(store, metrics),
            keys,
            ttl,
        }
    }
}

#[async_trait]
impl CityCatalog for CityCacheProxy {
    async fn get_city_by_name(&self, name: &str) -> CatalogResult<City> {
        let lookup = Lookup {
            method: "get_city_by_name",
            key: self.keys.city_by_name(name),
            cache: CacheType::City,
            ttl: self.ttl.by_name,
            origin: OriginKind::Catalog("get_city"),
        };
        self.cache
            .get_or_load(lookup, || self.origin.get_city_by_name(name))
            .await
    }

    async fn get_all_cities(&self) -> CatalogResult<Vec<City>> {
        let lookup = Lookup {
            method: "get_all_cities",
            key: self.keys.all_cities(),
            cache: CacheType::CitiesAll,
            ttl: self.ttl.all,
            origin: OriginKind::Catalog("get_all_cities"),
        };
        self.cache
            .get_or_load(lookup, || self.origin.get_all_cities())
            .await
    }
}
