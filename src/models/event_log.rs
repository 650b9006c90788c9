use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct EventLogEntry {
    pub id: i64,
    pub event_type: String,
    pub payload_json: Option<String>,
    pub latency_ms: Option<i64>,
    pub created_at: String,
}
