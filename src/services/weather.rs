//! Weather provider — current conditions per city, with a TTL cache and
//! stale-on-failure fallback.
//!
//! Grounded on `original_source/core/providers/weather.py`. Fan-out across
//! enabled cities runs in parallel (`futures::future::join_all`), mirroring the
//! original's `asyncio.gather(..., return_exceptions=True)` — one city's failure
//! never drops the others.

use crate::config::Config;
use crate::models::{CacheRead, City, WeatherReading};
use chrono::{Duration, Utc};
use serde::Deserialize;
use sqlx::SqlitePool;

const CACHE_TTL_SECONDS: i64 = 600;
const API_BASE: &str = "https://api.weatherapi.com/v1/current.json";

#[derive(Debug, Deserialize)]
struct ApiResponse {
    current: ApiCurrent,
}

#[derive(Debug, Deserialize)]
struct ApiCurrent {
    temp_c: f64,
    temp_f: f64,
    feelslike_c: f64,
    feelslike_f: f64,
    condition: ApiCondition,
    wind_kph: f64,
    wind_mph: f64,
    humidity: f64,
}

#[derive(Debug, Deserialize)]
struct ApiCondition {
    text: String,
}

/// Fetches weather for every enabled city in parallel, using cache when fresh.
/// Per-city errors are isolated: a failed city is simply absent from the result,
/// never aborting the rest (spec.md §4.4).
pub async fn get_weather_for_cities(
    pool: &SqlitePool,
    config: &Config,
    client: &reqwest::Client,
) -> sqlx::Result<Vec<WeatherReading>> {
    let cities: Vec<City> = sqlx::query_as(
        "SELECT id, label, lat, lon, units, priority, enabled FROM cities WHERE enabled = 1 ORDER BY priority",
    )
    .fetch_all(pool)
    .await?;

    let fetches = cities
        .iter()
        .map(|city| get_cached_or_fetch(pool, config, client, city));
    let results = futures::future::join_all(fetches).await;

    Ok(results.into_iter().flatten().collect())
}

async fn get_cached_or_fetch(
    pool: &SqlitePool,
    config: &Config,
    client: &reqwest::Client,
    city: &City,
) -> Option<WeatherReading> {
    match get_cached_or_fetch_inner(pool, config, client, city).await {
        Ok(read) => read.into_option(),
        Err(e) => {
            tracing::warn!(city = %city.id, error = %e, "weather cache query failed");
            None
        }
    }
}

async fn get_cached_or_fetch_inner(
    pool: &SqlitePool,
    config: &Config,
    client: &reqwest::Client,
    city: &City,
) -> sqlx::Result<CacheRead<WeatherReading>> {
    let now = Utc::now();
    let row: Option<(String, String)> = sqlx::query_as(
        "SELECT payload_json, expires_at FROM cache_weather WHERE city_id = ?",
    )
    .bind(&city.id)
    .fetch_optional(pool)
    .await?;

    if let Some((payload_json, expires_at)) = &row {
        if let Ok(expires) = chrono::DateTime::parse_from_rfc3339(expires_at) {
            if expires.with_timezone(&Utc) > now {
                if let Ok(reading) = serde_json::from_str::<WeatherReading>(payload_json) {
                    return Ok(CacheRead::Fresh(reading));
                }
            }
        }
    }

    if let Some(fresh) = fetch_weather(config, client, city).await {
        let expires = now + Duration::seconds(CACHE_TTL_SECONDS);
        let payload_json = serde_json::to_string(&fresh).unwrap_or_default();
        sqlx::query(
            "INSERT INTO cache_weather (city_id, payload_json, fetched_at, expires_at) \
             VALUES (?, ?, ?, ?) \
             ON CONFLICT(city_id) DO UPDATE SET payload_json = excluded.payload_json, \
             fetched_at = excluded.fetched_at, expires_at = excluded.expires_at",
        )
        .bind(&city.id)
        .bind(&payload_json)
        .bind(now.to_rfc3339())
        .bind(expires.to_rfc3339())
        .execute(pool)
        .await?;
        return Ok(CacheRead::Fresh(fresh));
    }

    if let Some((payload_json, _)) = row {
        if let Ok(mut reading) = serde_json::from_str::<WeatherReading>(&payload_json) {
            reading.stale = true;
            return Ok(CacheRead::Stale(reading));
        }
    }

    Ok(CacheRead::Absent)
}

async fn fetch_weather(
    config: &Config,
    client: &reqwest::Client,
    city: &City,
) -> Option<WeatherReading> {
    let api_key = config.weather_api_key.as_ref()?;

    let resp = client
        .get(API_BASE)
        .query(&[
            ("key", api_key.as_str()),
            ("q", &format!("{},{}", city.lat, city.lon)),
            ("aqi", "no"),
        ])
        .timeout(std::time::Duration::from_secs(10))
        .send()
        .await
        .and_then(reqwest::Response::error_for_status);

    let resp = match resp {
        Ok(r) => r,
        Err(e) => {
            tracing::warn!(city = %city.label, error = %e, "weather fetch failed");
            return None;
        }
    };

    let data: ApiResponse = match resp.json().await {
        Ok(d) => d,
        Err(e) => {
            tracing::warn!(city = %city.label, error = %e, "weather response parse failed");
            return None;
        }
    };

    let imperial = city.units == "imperial";
    Some(WeatherReading {
        city_id: city.id.clone(),
        city_label: city.label.clone(),
        temp: if imperial { data.current.temp_f } else { data.current.temp_c },
        feelslike: if imperial { data.current.feelslike_f } else { data.current.feelslike_c },
        condition: data.current.condition.text,
        wind: if imperial { data.current.wind_mph } else { data.current.wind_kph },
        humidity: data.current.humidity,
        units: if imperial { "F".to_string() } else { "C".to_string() },
        wind_units: if imperial { "mph".to_string() } else { "kph".to_string() },
        stale: false,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{test_config, test_pool};

    fn test_city() -> City {
        City {
            id: "buenos_aires".to_string(),
            label: "Buenos Aires".to_string(),
            lat: -34.6037,
            lon: -58.3816,
            units: "metric".to_string(),
            priority: 0,
            enabled: true,
        }
    }

    fn sample_reading(city: &City, stale: bool) -> WeatherReading {
        WeatherReading {
            city_id: city.id.clone(),
            city_label: city.label.clone(),
            temp: 22.0,
            feelslike: 21.0,
            condition: "Clear".to_string(),
            wind: 10.0,
            humidity: 40.0,
            units: "C".to_string(),
            wind_units: "kph".to_string(),
            stale,
        }
    }

    async fn seed_cache(pool: &SqlitePool, city: &City, reading: &WeatherReading, expires_at: chrono::DateTime<Utc>) {
        sqlx::query(
            "INSERT INTO cache_weather (city_id, payload_json, fetched_at, expires_at) VALUES (?, ?, ?, ?)",
        )
        .bind(&city.id)
        .bind(serde_json::to_string(reading).unwrap())
        .bind(Utc::now().to_rfc3339())
        .bind(expires_at.to_rfc3339())
        .execute(pool)
        .await
        .unwrap();
    }

    #[tokio::test]
    async fn fresh_cache_entry_is_returned_without_refetch() {
        let pool = test_pool().await;
        let config = test_config();
        let client = reqwest::Client::new();
        let city = test_city();
        let reading = sample_reading(&city, false);
        seed_cache(&pool, &city, &reading, Utc::now() + Duration::minutes(5)).await;

        let result = get_cached_or_fetch_inner(&pool, &config, &client, &city).await.unwrap();
        match result {
            CacheRead::Fresh(r) => assert_eq!(r.temp, 22.0),
            other => panic!("expected Fresh, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn expired_cache_falls_back_to_stale_when_refetch_has_no_api_key() {
        let pool = test_pool().await;
        let config = test_config();
        let client = reqwest::Client::new();
        let city = test_city();
        let reading = sample_reading(&city, false);
        seed_cache(&pool, &city, &reading, Utc::now() - Duration::minutes(5)).await;

        let result = get_cached_or_fetch_inner(&pool, &config, &client, &city).await.unwrap();
        match result {
            CacheRead::Stale(r) => {
                assert!(r.stale);
                assert_eq!(r.temp, 22.0);
            }
            other => panic!("expected Stale, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn absent_when_no_cache_and_no_api_key() {
        let pool = test_pool().await;
        let config = test_config();
        let client = reqwest::Client::new();
        let city = test_city();

        let result = get_cached_or_fetch_inner(&pool, &config, &client, &city).await.unwrap();
        assert!(matches!(result, CacheRead::Absent));
    }
}
