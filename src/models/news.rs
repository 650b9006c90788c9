use serde::{Deserialize, Serialize};

/// A configured RSS/Atom feed. Grounded on `news_sources` (schema.sql) and
/// `original_source/core/providers/news.py::fetch_all_feeds`'s source query.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct NewsSource {
    pub id: String,
    pub label: String,
    pub url: String,
    pub category: String,
    pub weight: i64,
    pub enabled: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FeedStatus {
    Healthy,
    Unhealthy,
    Dead,
}

impl FeedStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            FeedStatus::Healthy => "healthy",
            FeedStatus::Unhealthy => "unhealthy",
            FeedStatus::Dead => "dead",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "dead" => FeedStatus::Dead,
            "unhealthy" => FeedStatus::Unhealthy,
            _ => FeedStatus::Healthy,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn as_str_and_parse_round_trip_for_known_statuses() {
        for status in [FeedStatus::Healthy, FeedStatus::Unhealthy, FeedStatus::Dead] {
            assert_eq!(FeedStatus::parse(status.as_str()), status);
        }
    }

    #[test]
    fn parse_defaults_unrecognized_values_to_healthy() {
        assert_eq!(FeedStatus::parse("garbage"), FeedStatus::Healthy);
        assert_eq!(FeedStatus::parse(""), FeedStatus::Healthy);
    }
}

/// 1:1 health record for a `NewsSource`. Transition rules per spec.md §3: a success
/// zeroes `consecutive_failures` and sets `healthy`; a failure increments the counter
/// and escalates to `dead` once it reaches 5.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct FeedHealth {
    pub source_id: String,
    pub last_success: Option<String>,
    pub last_failure: Option<String>,
    pub consecutive_failures: i64,
    pub status: String,
}

pub const DEAD_THRESHOLD: i64 = 5;

/// A deduplicated, sanitized headline as stored in `cache_news`.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct CachedHeadline {
    pub id: String,
    pub source_id: String,
    pub title: String,
    pub description: String,
    pub url: String,
    pub published_at: String,
    pub fetched_at: String,
    pub title_hash: String,
    pub category: String,
    pub scored: bool,
    pub score: Option<i64>,
}

/// One scorer response item, tolerant of the LM's two observed JSON shapes
/// (bare array or `{"scores": [...]}` / `{"headlines": [...]}`) per spec.md §9.
#[derive(Debug, Clone, Deserialize)]
pub struct HeadlineScore {
    pub index: i64,
    pub score: i64,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub is_breaking: bool,
}

/// A headline selected for use in a break script, with a flag for whether it was
/// pulled in via dedup backfill (and should be tagged "previously reported" in the
/// LM writer context per spec.md §4.2 step 5e).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SelectedHeadline {
    pub id: String,
    pub title: String,
    pub description: String,
    pub source_id: String,
    pub category: String,
    pub score: i64,
    pub published_at: String,
    pub previously_reported: bool,
}
