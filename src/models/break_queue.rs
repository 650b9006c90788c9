use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BreakType {
    Scheduled,
    Breaking,
}

impl BreakType {
    pub fn as_str(&self) -> &'static str {
        match self {
            BreakType::Scheduled => "scheduled",
            BreakType::Breaking => "breaking",
        }
    }

    pub fn priority(&self) -> i64 {
        match self {
            BreakType::Breaking => 10,
            BreakType::Scheduled => 0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum BreakStatus {
    Preparing,
    Ready,
    Played,
    Failed,
}

impl BreakStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BreakStatus::Preparing => "PREPARING",
            BreakStatus::Ready => "READY",
            BreakStatus::Played => "PLAYED",
            BreakStatus::Failed => "FAILED",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "READY" => BreakStatus::Ready,
            "PLAYED" => BreakStatus::Played,
            "FAILED" => BreakStatus::Failed,
            _ => BreakStatus::Preparing,
        }
    }
}

/// Typed `meta_json` payload for a break-queue row, serialized in exactly one place
/// (`services::break_queue::mark_ready`) per the spec.md §9 Design Note against
/// string-keyed dynamic dicts.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BreakMeta {
    pub host: String,
    pub headlines: usize,
    #[serde(default)]
    pub headline_ids: Vec<String>,
    pub weather_cities: usize,
    pub market: bool,
    #[serde(default)]
    pub dialog: bool,
    #[serde(default)]
    pub video: bool,
    #[serde(default)]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct BreakQueueEntry {
    pub id: String,
    #[sqlx(rename = "type")]
    pub break_type: String,
    pub priority: i64,
    pub host_id: Option<String>,
    pub status: String,
    pub script_text: Option<String>,
    pub audio_path: Option<String>,
    pub video_path: Option<String>,
    pub degradation_level: i64,
    pub duration_ms: Option<i64>,
    pub meta_json: Option<String>,
    pub created_at: String,
    pub ready_at: Option<String>,
    pub played_at: Option<String>,
}

impl BreakQueueEntry {
    pub fn meta(&self) -> Option<BreakMeta> {
        self.meta_json
            .as_deref()
            .and_then(|s| serde_json::from_str(s).ok())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn breaking_outranks_scheduled() {
        assert!(BreakType::Breaking.priority() > BreakType::Scheduled.priority());
    }

    #[test]
    fn break_status_as_str_and_parse_round_trip() {
        for status in [BreakStatus::Preparing, BreakStatus::Ready, BreakStatus::Played, BreakStatus::Failed] {
            assert_eq!(BreakStatus::parse(status.as_str()), status);
        }
    }

    #[test]
    fn break_status_parse_defaults_unrecognized_values_to_preparing() {
        assert_eq!(BreakStatus::parse("nonsense"), BreakStatus::Preparing);
    }

    #[test]
    fn meta_parses_valid_json_and_is_none_on_malformed_or_missing() {
        let mut entry = BreakQueueEntry {
            id: "brk_1".to_string(),
            break_type: "scheduled".to_string(),
            priority: 0,
            host_id: Some("host_a".to_string()),
            status: "READY".to_string(),
            script_text: None,
            audio_path: None,
            video_path: None,
            degradation_level: 0,
            duration_ms: None,
            meta_json: Some(r#"{"host":"host_a","headlines":2,"weather_cities":2,"market":true}"#.to_string()),
            created_at: "2026-01-01T00:00:00Z".to_string(),
            ready_at: None,
            played_at: None,
        };
        let meta = entry.meta().unwrap();
        assert_eq!(meta.host, "host_a");
        assert_eq!(meta.headlines, 2);
        assert!(meta.market);

        entry.meta_json = Some("not json".to_string());
        assert!(entry.meta().is_none());

        entry.meta_json = None;
        assert!(entry.meta().is_none());
    }
}
