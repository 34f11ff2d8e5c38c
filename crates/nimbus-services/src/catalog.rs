//! City catalog contract and error types.
//!
//! This module defines the `CityCatalog` trait implemented by the Postgres
//! store and by the caching proxy in front of it.

use async_trait::async_trait;
use nimbus_weather::{CoordinateError, Coordinates};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Boxed error carried by backend failures.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// A known city. Immutable once fetched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct City {
    pub name: String,
    pub latitude: f64,
    pub longitude: f64,
    pub country: String,
}

impl City {
    pub fn coordinates(&self) -> Result<Coordinates, CoordinateError> {
        Coordinates::new(self.latitude, self.longitude)
    }
}

/// Errors that can occur during catalog lookups.
#[derive(Debug, Error)]
pub enum CatalogError {
    /// No city with this name exists.
    #[error("City not found: {name}")]
    NotFound { name: String },

    /// The store itself failed (pool, connection, query, row decoding).
    #[error("{operation} failed: {source}")]
    Backend {
        operation: &'static str,
        #[source]
        source: BoxError,
    },
}

impl CatalogError {
    pub fn not_found(name: impl Into<String>) -> Self {
        Self::NotFound { name: name.into() }
    }

    pub fn backend(operation: &'static str, source: impl Into<BoxError>) -> Self {
        Self::Backend {
            operation,
            source: source.into(),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

/// Result type for catalog operations.
pub type CatalogResult<T> = Result<T, CatalogError>;

/// Read access to the city catalog.
#[async_trait]
pub trait CityCatalog: Send + Sync {
    /// Look up one city by its exact name.
    ///
    /// # Errors
    /// Returns `CatalogError::NotFound` if no row matches.
    async fn get_city_by_name(&self, name: &str) -> CatalogResult<City>;

    /// All cities, ordered by name.
    async fn get_all_cities(&self) -> CatalogResult<Vec<City>>;
}
