use serde::{Deserialize, Serialize};

/// Numeric market snapshot. Resolves the Open Question in spec.md §9: the upstream
/// API's "extract" step is ambiguous between pre-formatted strings and numeric
/// fields; this stores numeric (`Option<f64>`/`Option<i64>`) and only formats to a
/// string at the LM prompt boundary (`services::lm::format_context`), mirroring
/// `original_source/core/providers/bitcoin.py::_num`/`_extract`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MarketSnapshot {
    pub price: PriceSection,
    pub etf: EtfSection,
    pub corporate: CorporateSection,
    pub government: GovernmentSection,
    #[serde(default)]
    pub stale: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PriceSection {
    pub live_price: Option<f64>,
    pub change_24h: Option<f64>,
    pub change_pct_24h: Option<f64>,
    pub market_cap: Option<f64>,
    pub sats_per_dollar: Option<i64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EtfSection {
    pub spot_volume: Option<f64>,
    pub total_aum: Option<f64>,
    pub btc_holdings: Option<f64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CorporateSection {
    pub total_btc: Option<f64>,
    pub total_value: Option<f64>,
    pub public_companies: Option<i64>,
    pub private_companies: Option<i64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GovernmentSection {
    pub total_countries: Option<i64>,
    pub total_btc: Option<f64>,
    pub total_value: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct MarketCacheRow {
    pub payload_json: String,
    pub fetched_at: String,
    pub expires_at: String,
}
