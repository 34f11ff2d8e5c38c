//! Cache key construction.
//!
//! Keys are deterministic functions of the lookup arguments. Coordinates are
//! rendered with six decimals so that values differing only past the sixth
//! decimal share a key.

use nimbus_weather::Coordinates;

/// Builds namespaced cache keys.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyBuilder {
    prefix: String,
}

impl KeyBuilder {
    /// An empty prefix yields bare keys (`city:all`).
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }

    fn join(&self, key: String) -> String {
        if self.prefix.is_empty() {
            key
        } else {
            format!("{}:{}", self.prefix, key)
        }
    }

    pub fn city_by_name(&self, name: &str) -> String {
        self.join(format!("city:by_name:{}", name))
    }

    pub fn all_cities(&self) -> String {
        self.join("city:all".to_string())
    }

    pub fn weather(&self, coords: Coordinates) -> String {
        self.join(format!(
            "weather:lat:{:.6}:lon:{:.6}",
            normalize(coords.latitude),
            normalize(coords.longitude)
        ))
    }
}

impl Default for KeyBuilder {
    fn default() -> Self {
        Self::new("nimbus")
    }
}

/// Round to six decimals and fold `-0.0` into `0.0`.
fn normalize(value: f64) -> f64 {
    (value * 1e6).round() / 1e6 + 0.0
}
