//! Weather lookups by coordinate or by city name.
//!
//! Composes a `CityCatalog` and a `WeatherSource`; in the server both are the
//! caching proxies, in tests they are fakes.

use std::sync::Arc;

use nimbus_weather::{
    CoordinateError, Coordinates, WeatherCondition, WeatherError, WeatherSnapshot, WeatherSource,
};
use serde::Serialize;
use thiserror::Error;
use tracing::instrument;

use crate::catalog::{CatalogError, City, CityCatalog};

/// Current conditions with the WMO code resolved to text.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CurrentWeather {
    pub temperature: f64,
    pub weather_code: i32,
    pub condition: WeatherCondition,
    pub description: &'static str,
}

impl From<WeatherSnapshot> for CurrentWeather {
    fn from(snapshot: WeatherSnapshot) -> Self {
        Self {
            temperature: snapshot.temperature,
            weather_code: snapshot.weather_code,
            condition: snapshot.condition(),
            description: snapshot.description(),
        }
    }
}

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error(transparent)]
    InvalidCoordinates(#[from] CoordinateError),

    #[error("city name must not be empty")]
    EmptyCityName,

    #[error("City not found: {0}")]
    CityNotFound(String),

    #[error(transparent)]
    Catalog(CatalogError),

    #[error(transparent)]
    Weather(#[from] WeatherError),
}

impl From<CatalogError> for ServiceError {
    fn from(err: CatalogError) -> Self {
        match err {
            CatalogError::NotFound { name } => Self::CityNotFound(name),
            other => Self::Catalog(other),
        }
    }
}

impl ServiceError {
    /// Message safe to show to an API caller.
    pub fn user_message(&self) -> String {
        match self {
            Self::InvalidCoordinates(e) => e.to_string(),
            Self::EmptyCityName => "City name is required.".to_string(),
            Self::CityNotFound(name) => format!("City not found: {}", name),
            Self::Catalog(_) => {
                "The city catalog is unavailable. Please try again later.".to_string()
            }
            Self::Weather(e) => e.user_message().to_string(),
        }
    }
}

pub struct WeatherService {
    cities: Arc<dyn CityCatalog>,
    weather: Arc<dyn WeatherSource>,
}

impl WeatherService {
    pub fn new(cities: Arc<dyn CityCatalog>, weather: Arc<dyn WeatherSource>) -> Self {
        Self { cities, weather }
    }

    #[instrument(skip(self), level = "debug")]
    pub async fn weather_at(
        &self,
        latitude: f64,
        longitude: f64,
    ) -> Result<CurrentWeather, ServiceError> {
        let coords = Coordinates::new(latitude, longitude)?;
        let snapshot = self.weather.weather_today(coords).await?;
        Ok(snapshot.into())
    }

    #[instrument(skip(self), level = "debug")]
    pub async fn weather_in_city(&self, name: &str) -> Result<CurrentWeather, ServiceError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(ServiceError::EmptyCityName);
        }

        let city = self.cities.get_city_by_name(name).await?;
        let coords = city
            .coordinates()
            .map_err(|e| ServiceError::Catalog(CatalogError::backend("get_city", e)))?;

        let snapshot = self.weather.weather_today(coords).await?;
        Ok(snapshot.into())
    }

    pub async fn cities(&self) -> Result<Vec<City>, ServiceError> {
        Ok(self.cities.get_all_cities().await?)
    }
}
