//! Weather origin: the `WeatherSource` contract and its Open-Meteo client.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use tracing::instrument;

use crate::types::{Coordinates, WeatherError, WeatherSnapshot};

pub const DEFAULT_BASE_URL: &str = "https://api.open-meteo.com";
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Anything that can answer "what is the weather now" for a coordinate.
#[async_trait]
pub trait WeatherSource: Send + Sync {
    async fn weather_today(&self, coords: Coordinates) -> Result<WeatherSnapshot, WeatherError>;
}

#[derive(Debug, Deserialize)]
struct ForecastResponse {
    current_weather: CurrentWeatherBody,
}

#[derive(Debug, Deserialize)]
struct CurrentWeatherBody {
    temperature: f64,
    weathercode: i32,
}

/// Client for the Open-Meteo forecast API.
///
/// Cheap to clone; the inner `reqwest::Client` pools connections.
#[derive(Debug, Clone)]
pub struct OpenMeteoClient {
    client: Client,
    base_url: String,
}

impl OpenMeteoClient {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, WeatherError> {
        let client = Client::builder().timeout(timeout).build()?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

#[async_trait]
impl WeatherSource for OpenMeteoClient {
    #[instrument(skip(self), level = "debug")]
    async fn weather_today(&self, coords: Coordinates) -> Result<WeatherSnapshot, WeatherError> {
        let url = format!("{}/v1/forecast", self.base_url);

        let response = self
            .client
            .get(&url)
            .query(&[
                ("latitude", coords.latitude.to_string()),
                ("longitude", coords.longitude.to_string()),
                ("current_weather", "true".to_string()),
            ])
            .send()
            .await
            .map_err(|e| {
                tracing::error!("Weather request failed: {}", e);
                WeatherError::Network(e)
            })?;

        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            tracing::error!("Weather API returned non-OK status {}: {}", status, body);
            return Err(WeatherError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: ForecastResponse = serde_json::from_str(&body).map_err(|e| {
            tracing::error!("Failed to parse weather response: {}", e);
            WeatherError::Parse(e.to_string())
        })?;

        Ok(WeatherSnapshot {
            temperature: parsed.current_weather.temperature,
            weather_code: parsed.current_weather.weathercode,
        })
    }
}
