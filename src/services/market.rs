//! Bitcoin market data provider — Roxom API with a TTL cache, gated behind the
//! `market_enabled`/`market_api_key` settings.
//!
//! Grounded on `original_source/core/providers/bitcoin.py`. Unlike weather's
//! per-city fan-out, there is exactly one cache row (`id = 'btc'`), so this reads
//! as a single-entity version of the same cache-or-fetch shape.

use crate::models::{
    CacheRead, CorporateSection, EtfSection, GovernmentSection, MarketSnapshot, PriceSection,
    Settings,
};
use chrono::{Duration, Utc};
use serde::Deserialize;
use sqlx::SqlitePool;

const API_URL: &str = "https://rtvapi.roxom.com/btc/info";

/// Returns `None` when market data is disabled or unconfigured — callers treat
/// that the same as "no market data for this break" (spec.md §4.2 step 4).
pub async fn get_market_snapshot(
    pool: &SqlitePool,
    settings: &Settings,
    client: &reqwest::Client,
) -> sqlx::Result<Option<MarketSnapshot>> {
    if !settings.market_enabled || settings.market_api_key.is_empty() {
        return Ok(None);
    }

    match get_cached_or_fetch(pool, settings, client).await {
        Ok(read) => Ok(read.into_option()),
        Err(e) => {
            tracing::warn!(error = %e, "market cache query failed");
            Ok(None)
        }
    }
}

async fn get_cached_or_fetch(
    pool: &SqlitePool,
    settings: &Settings,
    client: &reqwest::Client,
) -> sqlx::Result<CacheRead<MarketSnapshot>> {
    let now = Utc::now();
    let row: Option<(String, String)> =
        sqlx::query_as("SELECT payload_json, expires_at FROM cache_bitcoin WHERE id = 'btc'")
            .fetch_optional(pool)
            .await?;

    if let Some((payload_json, expires_at)) = &row {
        if let Ok(expires) = chrono::DateTime::parse_from_rfc3339(expires_at) {
            if expires.with_timezone(&Utc) > now {
                if let Ok(snapshot) = serde_json::from_str::<MarketSnapshot>(payload_json) {
                    return Ok(CacheRead::Fresh(snapshot));
                }
            }
        }
    }

    if let Some(fresh) = fetch_market(settings, client).await {
        let expires = now + Duration::seconds(settings.market_cache_ttl_seconds as i64);
        let payload_json = serde_json::to_string(&fresh).unwrap_or_default();
        sqlx::query(
            "INSERT INTO cache_bitcoin (id, payload_json, fetched_at, expires_at) \
             VALUES ('btc', ?, ?, ?) \
             ON CONFLICT(id) DO UPDATE SET payload_json = excluded.payload_json, \
             fetched_at = excluded.fetched_at, expires_at = excluded.expires_at",
        )
        .bind(&payload_json)
        .bind(now.to_rfc3339())
        .bind(expires.to_rfc3339())
        .execute(pool)
        .await?;
        return Ok(CacheRead::Fresh(fresh));
    }

    if let Some((payload_json, _)) = row {
        if let Ok(mut snapshot) = serde_json::from_str::<MarketSnapshot>(&payload_json) {
            snapshot.stale = true;
            return Ok(CacheRead::Stale(snapshot));
        }
    }

    Ok(CacheRead::Absent)
}

#[derive(Debug, Deserialize, Default)]
struct ApiResponse {
    #[serde(default)]
    price: ApiPrice,
    #[serde(default, rename = "etf_trading_24h")]
    etf_trading_24h: ApiEtf,
    #[serde(default, rename = "corporate_treasuries")]
    corporate_treasuries: ApiCorporate,
    #[serde(default, rename = "government_treasuries")]
    government_treasuries: ApiGovernment,
}

#[derive(Debug, Deserialize, Default)]
struct ApiPrice {
    live_price: Option<serde_json::Value>,
    change_24h: Option<serde_json::Value>,
    change_percentage_24h: Option<serde_json::Value>,
    market_cap: Option<serde_json::Value>,
    sats_per_dollar: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize, Default)]
struct ApiEtf {
    spot_volume: Option<serde_json::Value>,
    total_aum: Option<serde_json::Value>,
    btc_holdings: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize, Default)]
struct ApiCorporate {
    total_btc: Option<serde_json::Value>,
    total_value: Option<serde_json::Value>,
    public_companies: Option<serde_json::Value>,
    private_companies: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize, Default)]
struct ApiGovernment {
    total_countries: Option<serde_json::Value>,
    total_btc: Option<serde_json::Value>,
    total_value: Option<serde_json::Value>,
}

/// The API returns numbers that sometimes arrive as JSON strings; this accepts
/// either and falls back to `None` rather than failing the whole fetch.
fn num(val: &Option<serde_json::Value>) -> Option<f64> {
    match val {
        Some(serde_json::Value::Number(n)) => n.as_f64(),
        Some(serde_json::Value::String(s)) => s.parse().ok(),
        _ => None,
    }
}

fn num_int(val: &Option<serde_json::Value>) -> Option<i64> {
    num(val).map(|f| f as i64)
}

async fn fetch_market(settings: &Settings, client: &reqwest::Client) -> Option<MarketSnapshot> {
    let resp = client
        .get(API_URL)
        .query(&[("apiKey", settings.market_api_key.as_str())])
        .timeout(std::time::Duration::from_secs(10))
        .send()
        .await
        .and_then(reqwest::Response::error_for_status);

    let resp = match resp {
        Ok(r) => r,
        Err(e) => {
            tracing::warn!(error = %e, "market fetch failed");
            return None;
        }
    };

    let data: ApiResponse = match resp.json().await {
        Ok(d) => d,
        Err(e) => {
            tracing::warn!(error = %e, "market response parse failed");
            return None;
        }
    };

    Some(MarketSnapshot {
        price: PriceSection {
            live_price: num(&data.price.live_price),
            change_24h: num(&data.price.change_24h),
            change_pct_24h: num(&data.price.change_percentage_24h),
            market_cap: num(&data.price.market_cap),
            sats_per_dollar: num_int(&data.price.sats_per_dollar),
        },
        etf: EtfSection {
            spot_volume: num(&data.etf_trading_24h.spot_volume),
            total_aum: num(&data.etf_trading_24h.total_aum),
            btc_holdings: num(&data.etf_trading_24h.btc_holdings),
        },
        corporate: CorporateSection {
            total_btc: num(&data.corporate_treasuries.total_btc),
            total_value: num(&data.corporate_treasuries.total_value),
            public_companies: num_int(&data.corporate_treasuries.public_companies),
            private_companies: num_int(&data.corporate_treasuries.private_companies),
        },
        government: GovernmentSection {
            total_countries: num_int(&data.government_treasuries.total_countries),
            total_btc: num(&data.government_treasuries.total_btc),
            total_value: num(&data.government_treasuries.total_value),
        },
        stale: false,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::test_pool;

    fn snapshot() -> MarketSnapshot {
        MarketSnapshot {
            price: PriceSection {
                live_price: Some(65_000.0),
                change_24h: Some(500.0),
                change_pct_24h: Some(0.8),
                market_cap: Some(1.2e12),
                sats_per_dollar: Some(1538),
            },
            etf: EtfSection::default(),
            corporate: CorporateSection::default(),
            government: GovernmentSection::default(),
            stale: false,
        }
    }

    #[tokio::test]
    async fn fresh_cache_entry_short_circuits_before_any_fetch() {
        let pool = test_pool().await;
        let snap = snapshot();
        sqlx::query(
            "INSERT INTO cache_bitcoin (id, payload_json, fetched_at, expires_at) VALUES ('btc', ?, ?, ?)",
        )
        .bind(serde_json::to_string(&snap).unwrap())
        .bind(Utc::now().to_rfc3339())
        .bind((Utc::now() + Duration::minutes(5)).to_rfc3339())
        .execute(&pool)
        .await
        .unwrap();

        let mut settings = crate::models::Settings::load(&pool).await.unwrap();
        settings.market_enabled = true;
        settings.market_api_key = "dummy-key".to_string();

        let client = reqwest::Client::new();
        let result = get_market_snapshot(&pool, &settings, &client).await.unwrap();
        let result = result.expect("fresh cache hit should short-circuit without a live fetch");
        assert_eq!(result.price.live_price, Some(65_000.0));
        assert!(!result.stale);
    }

    #[tokio::test]
    async fn disabled_or_unconfigured_market_returns_none_without_querying_cache() {
        let pool = test_pool().await;
        let client = reqwest::Client::new();

        let mut settings = crate::models::Settings::load(&pool).await.unwrap();
        settings.market_enabled = false;
        assert!(get_market_snapshot(&pool, &settings, &client).await.unwrap().is_none());

        settings.market_enabled = true;
        settings.market_api_key = String::new();
        assert!(get_market_snapshot(&pool, &settings, &client).await.unwrap().is_none());
    }
}
