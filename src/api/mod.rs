//! HTTP surface. Per spec.md §1/§6 the admin CRUD web surface, HTML templates,
//! and session login are external collaborators — only the handful of
//! interfaces pinned down in §6 live here: the breaking-news trigger, the
//! playout track-event webhook, and read-only status/health endpoints.

pub mod breaking;
pub mod middleware;
pub mod playout;
pub mod status;

use crate::config::Config;
use crate::services::{BreakScheduler, PlayoutClient};
use axum::{
    routing::{get, post},
    Router,
};
use sqlx::SqlitePool;
use std::collections::VecDeque;
use std::sync::Arc;
use tokio::sync::Mutex;

/// Bound on the `recent_tracks` ring buffer, mirroring
/// `original_source/core/routers/playout.py`'s `MAX_RECENT`.
pub const MAX_RECENT_TRACKS: usize = 10;

pub struct AppState {
    pub pool: SqlitePool,
    pub config: Config,
    pub http: reqwest::Client,
    pub playout: Arc<PlayoutClient>,
    pub scheduler: Arc<BreakScheduler>,
    /// Last few "Artist - Title" strings seen over `/api/playout/event`, for
    /// light callback material in the next break's script (spec.md §4.2).
    pub recent_tracks: Mutex<VecDeque<String>>,
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/api/health", get(status::health))
        .route("/api/status/current", get(status::status))
        .route("/api/status/feeds", get(status::feed_health))
        .route("/api/status/queue", get(status::queue))
        .route("/api/breaking/trigger", post(breaking::trigger_breaking))
        .route("/api/playout/event", post(playout::track_event))
        .with_state(state)
}
