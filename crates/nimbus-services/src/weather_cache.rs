//! Cache-aside proxy in front of a `WeatherSource`.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use nimbus_weather::{Coordinates, WeatherError, WeatherSnapshot, WeatherSource};

use crate::cache_aside::{CacheAside, Lookup, OriginKind};
use crate::keys::KeyBuilder;
use crate::kv::KvStore;
use crate::metrics::{CacheType, MetricsSink};

/// `WeatherSource` that serves repeated coordinates from the cache.
///
/// Keys are coordinates rounded to six decimals, so nearby requests inside
/// that precision share one entry.
pub struct WeatherCacheProxy {
    origin: Arc<dyn WeatherSource>,
    cache: CacheAside,
    keys: KeyBuilder,
    ttl: Duration,
}

impl WeatherCacheProxy {
    pub fn new(
        origin: Arc<dyn WeatherSource>,
        store: Arc<dyn KvStore>,
        metrics: Option<Arc<dyn MetricsSink>>,
        keys: KeyBuilder,
        ttl: Duration,
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
impl WeatherSource for WeatherCacheProxy {
    async fn weather_today(&self, coords: Coordinates) -> Result<WeatherSnapshot, WeatherError> {
        let lookup = Lookup {
            method: "get_weather",
            key: self.keys.weather(coords),
            cache: CacheType::Weather,
            ttl: self.ttl,
            origin: OriginKind::Weather,
        };
        self.cache
            .get_or_load(lookup, || self.origin.weather_today(coords))
            .await
    }
}
