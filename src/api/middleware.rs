//! Breaking-trigger auth guard.
//!
//! Grounded on `original_source/core/routers/breaking.py`'s auth dependency,
//! which accepts either a header API key or a session cookie. The session
//! store backs the admin web surface (out of scope per spec.md §1); this
//! crate owns only the header-key half of that contract.

use crate::api::AppState;
use crate::error::AppError;
use axum::{async_trait, extract::FromRequestParts, http::request::Parts};
use std::sync::Arc;

pub struct RequireApiKey;

#[async_trait]
impl FromRequestParts<Arc<AppState>> for RequireApiKey {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let provided = parts
            .headers
            .get("x-api-key")
            .and_then(|v| v.to_str().ok())
            .or_else(|| {
                parts
                    .headers
                    .get(axum::http::header::AUTHORIZATION)
                    .and_then(|v| v.to_str().ok())
                    .and_then(|v| v.strip_prefix("Bearer "))
            })
            .ok_or(AppError::Unauthorized)?;

        if provided != state.config.api_key {
            return Err(AppError::Unauthorized);
        }

        Ok(RequireApiKey)
    }
}
