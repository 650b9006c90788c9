//! Breaking-news trigger — the secondary path into the break builder that
//! bypasses the scheduler's interval and single-in-flight admission check
//! (spec.md §4.1/§4.2 scenario 5).

use crate::api::middleware::RequireApiKey;
use crate::api::AppState;
use crate::error::AppError;
use crate::services::{break_builder, degradation};
use axum::{extract::State, http::StatusCode, Json};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use validator::Validate;

#[derive(Debug, Deserialize, Validate)]
pub struct BreakingRequest {
    #[validate(length(min = 1, max = 200))]
    pub reason: String,
    #[serde(default)]
    #[validate(length(max = 2000))]
    pub note: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct BreakingAck {
    pub accepted: bool,
    pub reason: String,
    pub sting_injected: bool,
}

/// Fire-and-forget by design (spec.md §6/§7): the response acknowledges
/// receipt, not completion. Before the detached build task is spawned, a
/// short "quick update" sting is pushed to playout synchronously so the
/// audience hears something change immediately rather than waiting out the
/// full build (spec.md §4.2, grounded on
/// `original_source/core/routers/breaking.py`).
pub async fn trigger_breaking(
    State(state): State<Arc<AppState>>,
    _auth: RequireApiKey,
    Json(body): Json<BreakingRequest>,
) -> Result<(StatusCode, Json<BreakingAck>), AppError> {
    body.validate().map_err(|e| AppError::Validation(e.to_string()))?;
    tracing::info!(reason = %body.reason, "breaking trigger received");

    let sting = degradation::sting_path(&state.config.stings_dir, "quick_update")
        .or_else(|| degradation::sting_path(&state.config.stings_dir, "station_id"));
    let sting_injected = match &sting {
        Some(path) => state.playout.push_sting(path.to_string_lossy().as_ref()).await,
        None => false,
    };

    let pool = state.pool.clone();
    let config = state.config.clone();
    let http = state.http.clone();
    let playout = state.playout.clone();
    let note = body.note.clone();

    tokio::spawn(async move {
        if let Err(e) =
            break_builder::prepare_break(&pool, &config, &http, &playout, true, note.as_deref(), None).await
        {
            tracing::error!(error = %e, "breaking break build failed");
        }
    });

    (
        StatusCode::ACCEPTED,
        Json(BreakingAck { accepted: true, reason: body.reason, sting_injected }),
    )
}
