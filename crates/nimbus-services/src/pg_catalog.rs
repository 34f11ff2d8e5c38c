//! PostgreSQL-backed city catalog.

use async_trait::async_trait;
use deadpool_postgres::{Config, ManagerConfig, Pool, PoolConfig, RecyclingMethod, Runtime};
use nimbus_core::PostgresConfig;
use tokio_postgres::{NoTls, Row};

use crate::catalog::{CatalogError, CatalogResult, City, CityCatalog};

const SELECT_BY_NAME: &str =
    "SELECT name, latitude, longitude, country FROM cities WHERE name = $1";

const SELECT_ALL: &str = "SELECT name, latitude, longitude, country FROM cities ORDER BY name";

const SCHEMA: &str = r#"
    CREATE TABLE IF NOT EXISTS cities (
        name TEXT PRIMARY KEY,
        latitude DOUBLE PRECISION NOT NULL,
        longitude DOUBLE PRECISION NOT NULL,
        country TEXT NOT NULL
    );
"#;

/// City catalog backed by a `deadpool-postgres` pool.
///
/// The pool is shared and safe for concurrent use; clones share it.
#[derive(Clone)]
pub struct PgCityCatalog {
    pool: Pool,
}

impl PgCityCatalog {
    pub fn new(pool: Pool) -> Self {
        Self { pool }
    }

    /// Build the pool. No connection is opened until first use.
    pub fn from_config(config: &PostgresConfig) -> CatalogResult<Self> {
        let mut cfg = Config::new();
        cfg.host = Some(config.host.clone());
        cfg.port = Some(config.port);
        cfg.dbname = Some(config.dbname.clone());
        cfg.user = Some(config.user.clone());
        cfg.password = Some(config.password.clone());
        cfg.manager = Some(ManagerConfig {
            recycling_method: RecyclingMethod::Fast,
        });
        cfg.pool = Some(PoolConfig::new(config.pool_size));

        let pool = cfg
            .create_pool(Some(Runtime::Tokio1), NoTls)
            .map_err(|e| CatalogError::backend("create_pool", e))?;

        Ok(Self::new(pool))
    }

    pub fn pool(&self) -> &Pool {
        &self.pool
    }

    async fn conn(&self, operation: &'static str) -> CatalogResult<deadpool_postgres::Object> {
        self.pool
            .get()
            .await
            .map_err(|e| CatalogError::backend(operation, e))
    }

    /// Round-trip a trivial query.
    pub async fn ping(&self) -> CatalogResult<()> {
        let conn = self.conn("ping").await?;
        conn.simple_query("SELECT 1")
            .await
            .map_err(|e| CatalogError::backend("ping", e))?;
        Ok(())
    }

    /// Ping until the database answers, sleeping `backoff` between attempts.
    pub async fn wait_until_ready(
        &self,
        attempts: u32,
        backoff: std::time::Duration,
    ) -> CatalogResult<()> {
        for attempt in 1..attempts {
            match self.ping().await {
                Ok(()) => {
                    tracing::info!("Connected to postgres");
                    return Ok(());
                }
                Err(e) => {
                    tracing::warn!(attempt, "Postgres not ready, retrying: {}", e);
                    tokio::time::sleep(backoff).await;
                }
            }
        }
        self.ping().await
    }

    /// Create the `cities` table if it doesn't exist.
    pub async fn init_schema(&self) -> CatalogResult<()> {
        let conn = self.conn("init_schema").await?;
        conn.batch_execute(SCHEMA)
            .await
            .map_err(|e| CatalogError::backend("init_schema", e))
    }

    fn row_to_city(row: &Row) -> Result<City, tokio_postgres::Error> {
        Ok(City {
            name: row.try_get(0)?,
            latitude: row.try_get(1)?,
            longitude: row.try_get(2)?,
            country: row.try_get(3)?,
        })
    }
}

/// An absent row for `name` is `NotFound`, never a backend error.
fn require_row<T>(name: &str, row: Option<T>) -> CatalogResult<T> {
    row.ok_or_else(|| CatalogError::not_found(name))
}

#[async_trait]
impl CityCatalog for PgCityCatalog {
    async fn get_city_by_name(&self, name: &str) -> CatalogResult<City> {
        let conn = self.conn("get_city").await?;
        let stmt = conn
            .prepare_cached(SELECT_BY_NAME)
            .await
            .map_err(|e| CatalogError::backend("get_city", e))?;

        let row = conn
            .query_opt(&stmt, &[&name])
            .await
            .map_err(|e| CatalogError::backend("get_city", e))?;
        let row = require_row(name, row)?;

        Self::row_to_city(&row).map_err(|e| CatalogError::backend("get_city", e))
    }

    async fn get_all_cities(&self) -> CatalogResult<Vec<City>> {
        let conn = self.conn("get_all_cities").await?;
        let stmt = conn
            .prepare_cached(SELECT_ALL)
            .await
            .map_err(|e| CatalogError::backend("get_all_cities", e))?;

        let rows = conn
            .query(&stmt, &[])
            .await
            .map_err(|e| CatalogError::backend("get_all_cities", e))?;

        rows.iter()
            .map(Self::row_to_city)
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| CatalogError::backend("get_all_cities", e))
    }
}
