//! Fakes shared by the integration tests.

#![allow(dead_code, clippy::panic)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use nimbus_services::kv::bounded;
use nimbus_services::{
    CacheType, CatalogError, CatalogResult, City, CityCatalog, KeyTtl, KvError, KvResult, KvStore,
    MetricsSink, Outcome,
};
use nimbus_weather::{Coordinates, WeatherError, WeatherSnapshot, WeatherSource};
use parking_lot::Mutex;

pub fn paris() -> City {
    City {
        name: "Paris".into(),
        latitude: 48.85,
        longitude: 2.35,
        country: "FR".into(),
    }
}

pub fn oslo() -> City {
    City {
        name: "Oslo".into(),
        latitude: 59.91,
        longitude: 10.75,
        country: "NO".into(),
    }
}

/// In-memory catalog that counts calls and can be switched to fail.
#[derive(Default)]
pub struct CountingCatalog {
    cities: HashMap<String, City>,
    calls: AtomicUsize,
    failing: AtomicBool,
}

impl CountingCatalog {
    pub fn with_cities(cities: impl IntoIterator<Item = City>) -> Self {
        Self {
            cities: cities.into_iter().map(|c| (c.name.clone(), c)).collect(),
            ..Self::default()
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    fn check(&self, operation: &'static str) -> CatalogResult<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.failing.load(Ordering::SeqCst) {
            return Err(CatalogError::backend(operation, "connection refused"));
        }
        Ok(())
    }
}

#[async_trait]
impl CityCatalog for CountingCatalog {
    async fn get_city_by_name(&self, name: &str) -> CatalogResult<City> {
        self.check("get_city")?;
        self.cities
            .get(name)
            .cloned()
            .ok_or_else(|| CatalogError::not_found(name))
    }

    async fn get_all_cities(&self) -> CatalogResult<Vec<City>> {
        self.check("get_all_cities")?;
        let mut all: Vec<City> = self.cities.values().cloned().collect();
        all.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(all)
    }
}

/// Weather origin returning a fixed snapshot. Can be told to fail or to panic.
pub struct FakeWeather {
    snapshot: WeatherSnapshot,
    calls: AtomicUsize,
    failing: AtomicBool,
    panic_on_call: AtomicBool,
}

impl FakeWeather {
    pub fn new(temperature: f64, weather_code: i32) -> Self {
        Self {
            snapshot: WeatherSnapshot {
                temperature,
                weather_code,
            },
            calls: AtomicUsize::new(0),
            failing: AtomicBool::new(false),
            panic_on_call: AtomicBool::new(false),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn panic_on_call(&self) {
        self.panic_on_call.store(true, Ordering::SeqCst);
    }
}

#[async_trait]
impl WeatherSource for FakeWeather {
    async fn weather_today(&self, _coords: Coordinates) -> Result<WeatherSnapshot, WeatherError> {
        if self.panic_on_call.load(Ordering::SeqCst) {
            panic!("weather origin called while it should be served from cache");
        }
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.failing.load(Ordering::SeqCst) {
            return Err(WeatherError::Status {
                status: 503,
                body: "upstream down".into(),
            });
        }
        Ok(self.snapshot.clone())
    }
}

/// A store whose every command fails.
pub struct BrokenKvStore;

#[async_trait]
impl KvStore for BrokenKvStore {
    async fn ping(&self) -> KvResult<String> {
        Err(KvError::backend("ping", "connection refused"))
    }

    async fn get(&self, _key: &str) -> KvResult<Option<String>> {
        Err(KvError::backend("get", "connection refused"))
    }

    async fn set(&self, _key: &str, _value: &str, _ttl: Duration) -> KvResult<()> {
        Err(KvError::backend("set", "connection refused"))
    }

    async fn del(&self, _key: &str) -> KvResult<()> {
        Err(KvError::backend("del", "connection refused"))
    }

    async fn ttl(&self, _key: &str) -> KvResult<KeyTtl> {
        Err(KvError::backend("ttl", "connection refused"))
    }
}

/// A store that never answers; every command hits the operation timeout.
pub struct StalledKvStore {
    pub timeout: Duration,
}

impl StalledKvStore {
    async fn stall<T>(&self, operation: &'static str) -> KvResult<T> {
        bounded(operation, self.timeout, std::future::pending()).await
    }
}

#[async_trait]
impl KvStore for StalledKvStore {
    async fn ping(&self) -> KvResult<String> {
        self.stall("ping").await
    }

    async fn get(&self, _key: &str) -> KvResult<Option<String>> {
        self.stall("get").await
    }

    async fn set(&self, _key: &str, _value: &str, _ttl: Duration) -> KvResult<()> {
        self.stall("set").await
    }

    async fn del(&self, _key: &str) -> KvResult<()> {
        self.stall("del").await
    }

    async fn ttl(&self, _key: &str) -> KvResult<KeyTtl> {
        self.stall("ttl").await
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum MetricEvent {
    Hit(CacheType),
    Miss(CacheType),
    Origin(String, Outcome),
    Weather(Outcome),
    Lookup(String),
}

/// Metrics sink that records events in order.
#[derive(Default)]
pub struct RecordingMetrics {
    events: Mutex<Vec<MetricEvent>>,
}

impl RecordingMetrics {
    pub fn events(&self) -> Vec<MetricEvent> {
        self.events.lock().clone()
    }
}

impl MetricsSink for RecordingMetrics {
    fn cache_hit(&self, cache: CacheType) {
        self.events.lock().push(MetricEvent::Hit(cache));
    }

    fn cache_miss(&self, cache: CacheType) {
        self.events.lock().push(MetricEvent::Miss(cache));
    }

    fn origin_request(&self, operation: &str, outcome: Outcome, _elapsed: Duration) {
        self.events
            .lock()
            .push(MetricEvent::Origin(operation.to_string(), outcome));
    }

    fn weather_request(&self, outcome: Outcome, _elapsed: Duration) {
        self.events.lock().push(MetricEvent::Weather(outcome));
    }

    fn lookup_duration(&self, method: &str, _elapsed: Duration) {
        self.events.lock().push(MetricEvent::Lookup(method.to_string()));
    }
}
