use sqlx::SqlitePool;
use std::collections::HashMap;

/// A typed snapshot of the `settings` key/value table, loaded once per break-build run.
///
/// Grounded on `break_builder.py`'s `SELECT key, value FROM settings` loop, which the
/// original re-reads into an untyped dict on every call. Keeping the same semantics
/// (read fresh per build, not cached across builds — settings can change between
/// breaks) but giving every field a real type instead of string-keyed lookups.
#[derive(Debug, Clone)]
pub struct Settings {
    pub master_prompt: String,
    pub break_interval_minutes: u32,
    pub quiet_mode: bool,
    pub news_dedupe_window_minutes: u32,
    pub break_min_words: u32,
    pub break_max_words: u32,
    pub break_max_chars: u32,
    pub breaking_min_words: u32,
    pub breaking_max_words: u32,
    pub tts_default_provider: String,
    pub cloud_a_api_key: String,
    pub cloud_b_api_key: String,
    pub cloud_b_tts_model: String,
    pub market_enabled: bool,
    pub market_api_key: String,
    pub market_cache_ttl_seconds: u64,
    pub prepare_at_track_count: u32,
    pub dialog_mode: bool,
    pub dialog_participants: Vec<String>,
    pub video_enabled: bool,
}

impl Settings {
    pub async fn load(pool: &SqlitePool) -> sqlx::Result<Self> {
        let rows: Vec<(String, String)> =
            sqlx::query_as("SELECT key, value FROM settings").fetch_all(pool).await?;
        let map: HashMap<String, String> = rows.into_iter().collect();

        let get = |key: &str, default: &str| -> String {
            map.get(key).cloned().unwrap_or_else(|| default.to_string())
        };
        let get_u32 = |key: &str, default: u32| -> u32 {
            map.get(key).and_then(|v| v.parse().ok()).unwrap_or(default)
        };
        let get_bool = |key: &str, default: bool| -> bool {
            map.get(key).map(|v| v == "true").unwrap_or(default)
        };

        Ok(Settings {
            master_prompt: get("master_prompt", "You are a radio host."),
            break_interval_minutes: get_u32("break_interval_minutes", 15).max(1),
            quiet_mode: get_bool("quiet_mode", false),
            news_dedupe_window_minutes: get_u32("news_dedupe_window_minutes", 60),
            break_min_words: get_u32("break_min_words", 15),
            break_max_words: get_u32("break_max_words", 100),
            break_max_chars: get_u32("break_max_chars", 600),
            breaking_min_words: get_u32("breaking_min_words", 10),
            breaking_max_words: get_u32("breaking_max_words", 50),
            tts_default_provider: get("tts_default_provider", "local"),
            cloud_a_api_key: get("cloud_a_api_key", ""),
            cloud_b_api_key: get("cloud_b_api_key", ""),
            cloud_b_tts_model: get("cloud_b_tts_model", "tts-1"),
            market_enabled: get_bool("market_enabled", false),
            market_api_key: get("market_api_key", ""),
            market_cache_ttl_seconds: get_u32("market_cache_ttl", 300) as u64,
            prepare_at_track_count: get_u32("prepare_at_track_count", 3),
            dialog_mode: get_bool("dialog_mode", false),
            dialog_participants: get("dialog_participants", "")
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect(),
            video_enabled: get_bool("video_enabled", false),
        })
    }
}
