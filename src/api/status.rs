//! Read-only status/health endpoints. Grounded on
//! `original_source/core/routers/status.py`.

use crate::api::middleware::RequireApiKey;
use crate::api::AppState;
use crate::models::{BreakQueueEntry, FeedHealth};
use crate::services::scheduler::SchedulerStatus;
use axum::{extract::State, Json};
use serde::Serialize;
use std::sync::Arc;

/// Unauthenticated liveness probe — `GET /api/health`.
pub async fn health() -> &'static str {
    "ok"
}

#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub scheduler: SchedulerStatus,
    pub playout_reachable: bool,
}

/// `GET /api/status/current` — API-key gated per spec.md §6.
pub async fn status(
    State(state): State<Arc<AppState>>,
    _auth: RequireApiKey,
) -> Json<StatusResponse> {
    let scheduler = state.scheduler.status().await;
    let playout_reachable = state.playout.heartbeat().await;
    Json(StatusResponse { scheduler, playout_reachable })
}

pub async fn feed_health(
    State(state): State<Arc<AppState>>,
    _auth: RequireApiKey,
) -> Json<Vec<FeedHealth>> {
    let rows = sqlx::query_as::<_, FeedHealth>(
        "SELECT source_id, last_success, last_failure, consecutive_failures, status FROM feed_health",
    )
    .fetch_all(&state.pool)
    .await
    .unwrap_or_default();
    Json(rows)
}

pub async fn queue(
    State(state): State<Arc<AppState>>,
    _auth: RequireApiKey,
) -> Json<Vec<BreakQueueEntry>> {
    let rows = sqlx::query_as::<_, BreakQueueEntry>(
        "SELECT id, type, priority, host_id, status, script_text, audio_path, video_path, \
         degradation_level, duration_ms, meta_json, created_at, ready_at, played_at \
         FROM break_queue ORDER BY created_at DESC LIMIT 20",
    )
    .fetch_all(&state.pool)
    .await
    .unwrap_or_default();
    Json(rows)
}
