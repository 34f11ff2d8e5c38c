//! Weather types and the upstream weather provider client.
//!
//! Provides current conditions via the Open-Meteo API and the static
//! WMO code → description table.

pub mod provider;
pub mod types;

pub use provider::{OpenMeteoClient, WeatherSource};
pub use types::*;
