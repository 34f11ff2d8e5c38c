//! Integration tests for the city and weather cache proxies.
//!
//! The proxies run over `MemoryKvStore` with call-counting fakes behind them.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

mod common;

use std::sync::Arc;
use std::time::Duration;

use common::{
    oslo, paris, BrokenKvStore, CountingCatalog, FakeWeather, MetricEvent, RecordingMetrics,
    StalledKvStore,
};
use nimbus_services::{
    CacheType, CatalogError, City, CityCacheProxy, CityCacheTtl, CityCatalog, KeyBuilder,
    KvStore, MemoryKvStore, MetricsSink, Outcome, WeatherCacheProxy,
};
use nimbus_weather::{Coordinates, WeatherError, WeatherSnapshot, WeatherSource};

fn city_proxy(
    origin: Arc<CountingCatalog>,
    store: Arc<dyn KvStore>,
    metrics: Option<Arc<dyn MetricsSink>>,
) -> CityCacheProxy {
    CityCacheProxy::new(
        origin,
        store,
        metrics,
        KeyBuilder::default(),
        CityCacheTtl::default(),
    )
}

fn weather_proxy(
    origin: Arc<FakeWeather>,
    store: Arc<dyn KvStore>,
    metrics: Option<Arc<dyn MetricsSink>>,
) -> WeatherCacheProxy {
    WeatherCacheProxy::new(
        origin,
        store,
        metrics,
        KeyBuilder::default(),
        Duration::from_secs(60),
    )
}

fn coords(lat: f64, lon: f64) -> Coordinates {
    Coordinates::new(lat, lon).unwrap()
}

#[tokio::test]
async fn test_city_lookup_populates_cache() {
    let store = Arc::new(MemoryKvStore::new());
    let origin = Arc::new(CountingCatalog::with_cities([paris()]));
    let proxy = city_proxy(origin.clone(), store.clone(), None);

    let city = proxy.get_city_by_name("Paris").await.unwrap();
    assert_eq!(city, paris());
    assert_eq!(origin.calls(), 1);

    let raw = store
        .get(&KeyBuilder::default().city_by_name("Paris"))
        .await
        .unwrap()
        .expect("entry written after miss");
    let cached: City = serde_json::from_str(&raw).unwrap();
    assert_eq!(cached, paris());
}

#[tokio::test]
async fn test_city_hit_skips_origin() {
    let store = Arc::new(MemoryKvStore::new());
    let origin = Arc::new(CountingCatalog::with_cities([paris()]));
    let proxy = city_proxy(origin.clone(), store, None);

    let first = proxy.get_city_by_name("Paris").await.unwrap();
    let second = proxy.get_city_by_name("Paris").await.unwrap();

    assert_eq!(first, second);
    assert_eq!(origin.calls(), 1);
}

#[tokio::test]
async fn test_unknown_city_is_not_found_and_not_cached() {
    let store = Arc::new(MemoryKvStore::new());
    let origin = Arc::new(CountingCatalog::with_cities([paris()]));
    let proxy = city_proxy(origin.clone(), store.clone(), None);

    let err = proxy.get_city_by_name("Atlantis").await.unwrap_err();
    assert!(err.is_not_found(), "got {:?}", err);
    assert!(store.is_empty());

    proxy.get_city_by_name("Atlantis").await.unwrap_err();
    assert_eq!(origin.calls(), 2);
}

#[tokio::test]
async fn test_catalog_failure_writes_nothing() {
    let store = Arc::new(MemoryKvStore::new());
    let origin = Arc::new(CountingCatalog::with_cities([paris()]));
    origin.set_failing(true);
    let proxy = city_proxy(origin.clone(), store.clone(), None);

    let err = proxy.get_city_by_name("Paris").await.unwrap_err();
    assert!(matches!(err, CatalogError::Backend { operation: "get_city", .. }));
    assert!(store.is_empty());

    origin.set_failing(false);
    assert_eq!(proxy.get_city_by_name("Paris").await.unwrap(), paris());
    assert_eq!(origin.calls(), 2);
}

#[tokio::test]
async fn test_corrupt_city_entry_is_overwritten() {
    let store = Arc::new(MemoryKvStore::new());
    let key = KeyBuilder::default().city_by_name("Paris");
    store
        .set(&key, "{\"name\": 42", Duration::from_secs(60))
        .await
        .unwrap();

    let origin = Arc::new(CountingCatalog::with_cities([paris()]));
    let proxy = city_proxy(origin.clone(), store.clone(), None);

    assert_eq!(proxy.get_city_by_name("Paris").await.unwrap(), paris());
    assert_eq!(origin.calls(), 1);

    let raw = store.get(&key).await.unwrap().unwrap();
    assert_eq!(serde_json::from_str::<City>(&raw).unwrap(), paris());
}

#[tokio::test]
async fn test_all_cities_cached_under_one_key() {
    let store = Arc::new(MemoryKvStore::new());
    let origin = Arc::new(CountingCatalog::with_cities([paris(), oslo()]));
    let proxy = city_proxy(origin.clone(), store.clone(), None);

    let first = proxy.get_all_cities().await.unwrap();
    let second = proxy.get_all_cities().await.unwrap();

    assert_eq!(first, vec![oslo(), paris()]);
    assert_eq!(first, second);
    assert_eq!(origin.calls(), 1);
    assert!(store
        .get(&KeyBuilder::default().all_cities())
        .await
        .unwrap()
        .is_some());
}

#[tokio::test]
async fn test_city_entry_expires_after_ttl() {
    let store = Arc::new(MemoryKvStore::new());
    let origin = Arc::new(CountingCatalog::with_cities([paris()]));
    let proxy = CityCacheProxy::new(
        origin.clone(),
        store,
        None,
        KeyBuilder::default(),
        CityCacheTtl {
            by_name: Duration::from_millis(30),
            all: Duration::from_millis(30),
        },
    );

    proxy.get_city_by_name("Paris").await.unwrap();
    tokio::time::sleep(Duration::from_millis(60)).await;
    proxy.get_city_by_name("Paris").await.unwrap();

    assert_eq!(origin.calls(), 2);
}

#[tokio::test]
async fn test_weather_scenario_hit_survives_panicking_origin() {
    let store = Arc::new(MemoryKvStore::new());
    let origin = Arc::new(FakeWeather::new(18.2, 3));
    let proxy = weather_proxy(origin.clone(), store, None);

    let first = proxy.weather_today(coords(48.85, 2.35)).await.unwrap();
    assert_eq!(
        first,
        WeatherSnapshot {
            temperature: 18.2,
            weather_code: 3
        }
    );

    origin.panic_on_call();
    let second = proxy.weather_today(coords(48.85, 2.35)).await.unwrap();
    assert_eq!(second, first);
    assert_eq!(origin.calls(), 1);
}

#[tokio::test]
async fn test_weather_origin_called_once_per_coordinate() {
    let store = Arc::new(MemoryKvStore::new());
    let origin = Arc::new(FakeWeather::new(4.0, 61));
    let proxy = weather_proxy(origin.clone(), store.clone(), None);

    for _ in 0..3 {
        proxy.weather_today(coords(59.91, 10.75)).await.unwrap();
        proxy.weather_today(coords(48.85, 2.35)).await.unwrap();
    }
    // Same key within six decimals.
    proxy.weather_today(coords(48.8500001, 2.35)).await.unwrap();

    assert_eq!(origin.calls(), 2);
    assert_eq!(store.len(), 2);
}

#[tokio::test]
async fn test_weather_failure_writes_nothing() {
    let store = Arc::new(MemoryKvStore::new());
    let origin = Arc::new(FakeWeather::new(18.2, 3));
    origin.set_failing(true);
    let proxy = weather_proxy(origin.clone(), store.clone(), None);

    let err = proxy.weather_today(coords(48.85, 2.35)).await.unwrap_err();
    assert!(matches!(err, WeatherError::Status { status: 503, .. }));
    assert!(store.is_empty());

    proxy.weather_today(coords(48.85, 2.35)).await.unwrap_err();
    assert_eq!(origin.calls(), 2);
}

#[tokio::test]
async fn test_broken_store_falls_through_to_origin() {
    let origin = Arc::new(CountingCatalog::with_cities([paris()]));
    let proxy = city_proxy(origin.clone(), Arc::new(BrokenKvStore), None);

    assert_eq!(proxy.get_city_by_name("Paris").await.unwrap(), paris());
    assert_eq!(proxy.get_city_by_name("Paris").await.unwrap(), paris());
    assert_eq!(origin.calls(), 2);
}

#[tokio::test]
async fn test_stalled_store_times_out_and_falls_through() {
    let origin = Arc::new(FakeWeather::new(18.2, 3));
    let store = Arc::new(StalledKvStore {
        timeout: Duration::from_millis(20),
    });
    let proxy = weather_proxy(origin.clone(), store, None);

    let snapshot = tokio::time::timeout(
        Duration::from_secs(2),
        proxy.weather_today(coords(48.85, 2.35)),
    )
    .await
    .expect("lookup bounded by the store timeout")
    .unwrap();

    assert_eq!(snapshot.temperature, 18.2);
    assert_eq!(origin.calls(), 1);
}

#[tokio::test]
async fn test_metrics_record_miss_then_hit() {
    let store = Arc::new(MemoryKvStore::new());
    let origin = Arc::new(CountingCatalog::with_cities([paris()]));
    let metrics = Arc::new(RecordingMetrics::default());
    let proxy = city_proxy(origin, store, Some(metrics.clone()));

    proxy.get_city_by_name("Paris").await.unwrap();
    proxy.get_city_by_name("Paris").await.unwrap();

    assert_eq!(
        metrics.events(),
        vec![
            MetricEvent::Miss(CacheType::City),
            MetricEvent::Origin("get_city".into(), Outcome::Success),
            MetricEvent::Lookup("get_city_by_name".into()),
            MetricEvent::Hit(CacheType::City),
            MetricEvent::Lookup("get_city_by_name".into()),
        ]
    );
}

#[tokio::test]
async fn test_metrics_record_weather_failure() {
    let store = Arc::new(MemoryKvStore::new());
    let origin = Arc::new(FakeWeather::new(0.0, 0));
    origin.set_failing(true);
    let metrics = Arc::new(RecordingMetrics::default());
    let proxy = weather_proxy(origin, store, Some(metrics.clone()));

    proxy.weather_today(coords(1.0, 1.0)).await.unwrap_err();

    assert_eq!(
        metrics.events(),
        vec![
            MetricEvent::Miss(CacheType::Weather),
            MetricEvent::Weather(Outcome::Error),
        ]
    );
}

#[tokio::test]
async fn test_proxies_work_without_metrics() {
    let store: Arc<dyn KvStore> = Arc::new(MemoryKvStore::new());
    let cities = city_proxy(
        Arc::new(CountingCatalog::with_cities([paris()])),
        store.clone(),
        None,
    );
    let weather = weather_proxy(Arc::new(FakeWeather::new(1.5, 0)), store, None);

    assert_eq!(cities.get_all_cities().await.unwrap(), vec![paris()]);
    assert_eq!(
        weather.weather_today(coords(0.0, 0.0)).await.unwrap().temperature,
        1.5
    );
}
