mod routes;

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use nimbus_core::{Config, StartupError};
use nimbus_services::{
    CityCacheProxy, CityCacheTtl, KeyBuilder, KvStore, MetricsSink, PgCityCatalog,
    PrometheusMetrics, RedisKvStore, WeatherCacheProxy, WeatherService,
};
use nimbus_weather::OpenMeteoClient;
use prometheus::Registry;

use crate::routes::AppState;

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::load_validated().context("Failed to load configuration")?;
    nimbus_core::init_logging(config.log_level)?;

    let catalog = PgCityCatalog::from_config(&config.postgres)
        .map_err(|e| StartupError::Database(e.to_string()))?;
    catalog
        .wait_until_ready(
            config.postgres.connect_attempts,
            config.postgres.connect_backoff(),
        )
        .await
        .map_err(|e| StartupError::Database(e.to_string()))?;
    catalog
        .init_schema()
        .await
        .map_err(|e| StartupError::Database(e.to_string()))?;

    let store =
        RedisKvStore::new(&config.redis).map_err(|e| StartupError::Cache(e.to_string()))?;
    match store.ping().await {
        Ok(reply) => tracing::info!("Connected to redis: {}", reply),
        Err(e) => tracing::warn!("Redis not answering yet, lookups will bypass the cache: {}", e),
    }
    let store: Arc<dyn KvStore> = Arc::new(store);

    let registry = Registry::new();
    let metrics = Arc::new(
        PrometheusMetrics::register(&registry)
            .map_err(|e| StartupError::Metrics(e.to_string()))?,
    );
    let sink: Arc<dyn MetricsSink> = metrics.clone();

    let keys = KeyBuilder::new(config.cache.key_prefix.clone());
    let cities = CityCacheProxy::new(
        Arc::new(catalog),
        store.clone(),
        Some(sink.clone()),
        keys.clone(),
        CityCacheTtl::from_config(&config.cache),
    );

    let origin = OpenMeteoClient::new(&config.weather_api.url, config.weather_api.timeout())
        .context("Failed to build weather client")?;
    let weather = WeatherCacheProxy::new(
        Arc::new(origin),
        store.clone(),
        Some(sink),
        keys,
        config.cache.weather_ttl(),
    );

    let state = AppState {
        service: Arc::new(WeatherService::new(Arc::new(cities), Arc::new(weather))),
        store,
        metrics,
    };

    let addr = SocketAddr::from(([0, 0, 0, 0], config.server.port));
    let (bound, server) = warp::serve(routes::routes(state))
        .try_bind_with_graceful_shutdown(addr, async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!("Failed to listen for shutdown signal: {}", e);
            }
            tracing::info!("Shutdown signal received");
        })
        .map_err(|e| StartupError::Bind(e.to_string()))?;

    tracing::info!("Nimbus listening on {}", bound);
    server.await;
    tracing::info!("Nimbus stopped");

    Ok(())
}
