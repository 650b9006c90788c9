//! Playout track-event webhook — the only inbound signal from the external
//! playout collaborator (spec.md §6). Track-played events are recorded to
//! the event log, folded into a bounded recent-tracks ring buffer, and
//! (outside quiet mode) used to trigger the next break build once enough
//! tracks have elapsed since the last one.
//!
//! Grounded on `original_source/core/routers/playout.py`'s `_recent_tracks`
//! buffer and track-count trigger.

use crate::api::{AppState, MAX_RECENT_TRACKS};
use crate::models::Settings;
use crate::services::break_builder;
use axum::{extract::State, http::StatusCode, Json};
use serde::Deserialize;
use std::sync::Arc;

#[derive(Debug, Deserialize)]
pub struct TrackInfo {
    #[serde(default)]
    pub artist: Option<String>,
    pub title: String,
    #[serde(default)]
    pub filename: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct TrackEvent {
    #[serde(default)]
    pub event: Option<String>,
    #[serde(default)]
    pub track: Option<TrackInfo>,
    #[serde(default)]
    pub tracks_since_last_break: i64,
}

/// `POST /api/playout/event`. Logs the play event, appends a formatted
/// "Artist - Title" entry to the bounded recent-tracks ring buffer, and —
/// when not in quiet mode and the track count matches
/// `prepare_at_track_count` — kicks off the next break build in the
/// background, passing the last few tracks along as light callback
/// material (spec.md §4.2).
pub async fn track_event(State(state): State<Arc<AppState>>, Json(body): Json<TrackEvent>) -> StatusCode {
    let payload = serde_json::json!({
        "event": body.event,
        "tracks_since_last_break": body.tracks_since_last_break,
        "track": body.track.as_ref().map(|t| serde_json::json!({
            "artist": t.artist,
            "title": t.title,
            "filename": t.filename,
        })),
    });
    let result = sqlx::query(
        "INSERT INTO events_log (event_type, payload_json, latency_ms) VALUES ('track_played', ?, NULL)",
    )
    .bind(payload.to_string())
    .execute(&state.pool)
    .await;

    if let Err(e) = result {
        tracing::warn!(error = %e, "failed to log track event");
        return StatusCode::INTERNAL_SERVER_ERROR;
    }

    if let Some(track) = &body.track {
        let entry = match &track.artist {
            Some(artist) if !artist.is_empty() => format!("{artist} - {}", track.title),
            _ => track.title.clone(),
        };
        let mut recent = state.recent_tracks.lock().await;
        recent.push_back(entry);
        while recent.len() > MAX_RECENT_TRACKS {
            recent.pop_front();
        }
    }

    let settings = match Settings::load(&state.pool).await {
        Ok(s) => s,
        Err(e) => {
            tracing::warn!(error = %e, "settings load failed in track_event");
            return StatusCode::NO_CONTENT;
        }
    };

    if !settings.quiet_mode && body.tracks_since_last_break == settings.prepare_at_track_count as i64 {
        let recent_slice: Vec<String> = {
            let recent = state.recent_tracks.lock().await;
            recent.iter().rev().take(4).rev().cloned().collect()
        };

        let pool = state.pool.clone();
        let config = state.config.clone();
        let http = state.http.clone();
        let playout = state.playout.clone();
        tokio::spawn(async move {
            if let Err(e) =
                break_builder::prepare_break(&pool, &config, &http, &playout, false, None, Some(&recent_slice)).await
            {
                tracing::error!(error = %e, "track-count-triggered break build failed");
            }
        });
    }

    StatusCode::NO_CONTENT
}
