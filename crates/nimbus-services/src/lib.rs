pub mod cache_aside;
pub mod catalog;
pub mod city_cache;
pub mod keys;
pub mod kv;
pub mod metrics;
pub mod pg_catalog;
pub mod redis_store;
pub mod weather_cache;
pub mod weather_service;

pub use cache_aside::{CacheAside, CacheWriteError, Lookup, OriginKind};
pub use catalog::{CatalogError, CatalogResult, City, CityCatalog};
pub use city_cache::{CityCacheProxy, CityCacheTtl};
pub use keys::KeyBuilder;
pub use kv::{KeyTtl, KvError, KvResult, KvStore, MemoryKvStore};
pub use metrics::{CacheType, MetricsSink, Outcome, PrometheusMetrics};
pub use pg_catalog::PgCityCatalog;
pub use redis_store::RedisKvStore;
pub use weather_cache::WeatherCacheProxy;
pub use weather_service::{CurrentWeather, ServiceError, WeatherService};
