use serde::{Deserialize, Serialize};

/// Live or cached weather reading for one city.
///
/// Grounded on `original_source/core/providers/weather.py::_fetch_weather`, which
/// normalizes the WeatherAPI.com response into a flat dict keyed on the unit system
/// requested for that city. Numeric fields stay numeric here (never pre-formatted),
/// matching the Open Question resolution for market data in spec.md §9 — the same
/// principle applies to every provider payload, not just bitcoin.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WeatherReading {
    pub city_id: String,
    pub city_label: String,
    pub temp: f64,
    pub feelslike: f64,
    pub condition: String,
    pub wind: f64,
    pub humidity: f64,
    pub units: String,
    pub wind_units: String,
    #[serde(default)]
    pub stale: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct WeatherCacheRow {
    pub city_id: String,
    pub payload_json: String,
    pub fetched_at: String,
    pub expires_at: String,
}
