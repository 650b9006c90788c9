//! Break queue — CRUD over the `break_queue` table.
//!
//! Grounded on `original_source/core/services/break_queue.py`.

use crate::models::{BreakMeta, BreakQueueEntry, BreakStatus, BreakType};
use chrono::Utc;
use sqlx::SqlitePool;

pub async fn create_break(
    pool: &SqlitePool,
    break_id: &str,
    break_type: BreakType,
    host_id: Option<&str>,
) -> sqlx::Result<()> {
    sqlx::query(
        "INSERT INTO break_queue (id, type, priority, host_id, status) VALUES (?, ?, ?, ?, 'PREPARING')",
    )
    .bind(break_id)
    .bind(break_type.as_str())
    .bind(break_type.priority())
    .bind(host_id)
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn mark_ready(
    pool: &SqlitePool,
    break_id: &str,
    script_text: &str,
    audio_path: &str,
    video_path: Option<&str>,
    degradation_level: i64,
    duration_ms: Option<i64>,
    meta: &BreakMeta,
) -> sqlx::Result<()> {
    let now = Utc::now().to_rfc3339();
    let meta_json = serde_json::to_string(meta).unwrap_or_default();
    sqlx::query(
        "UPDATE break_queue SET status = 'READY', script_text = ?, audio_path = ?, video_path = ?, \
         degradation_level = ?, ready_at = ?, duration_ms = ?, meta_json = ? WHERE id = ?",
    )
    .bind(script_text)
    .bind(audio_path)
    .bind(video_path)
    .bind(degradation_level)
    .bind(&now)
    .bind(duration_ms)
    .bind(&meta_json)
    .bind(break_id)
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn mark_played(pool: &SqlitePool, break_id: &str) -> sqlx::Result<()> {
    let now = Utc::now().to_rfc3339();
    sqlx::query("UPDATE break_queue SET status = 'PLAYED', played_at = ? WHERE id = ?")
        .bind(&now)
        .bind(break_id)
        .execute(pool)
        .await?;
    Ok(())
}

pub async fn mark_failed(pool: &SqlitePool, break_id: &str, reason: &str) -> sqlx::Result<()> {
    let meta_json = serde_json::json!({ "error": reason }).to_string();
    sqlx::query("UPDATE break_queue SET status = 'FAILED', meta_json = ? WHERE id = ?")
        .bind(&meta_json)
        .bind(break_id)
        .execute(pool)
        .await?;
    Ok(())
}

/// Highest-priority READY break (breaking news first, FIFO within a priority tier).
pub async fn get_ready_break(pool: &SqlitePool) -> sqlx::Result<Option<BreakQueueEntry>> {
    sqlx::query_as(
        "SELECT id, type, priority, host_id, status, script_text, audio_path, video_path, \
         degradation_level, duration_ms, meta_json, created_at, ready_at, played_at \
         FROM break_queue WHERE status = 'READY' ORDER BY priority DESC, created_at ASC LIMIT 1",
    )
    .fetch_optional(pool)
    .await
}

/// Checks the admission-gate invariant: at most one PREPARING entry at a time.
pub async fn get_preparing_break(pool: &SqlitePool) -> sqlx::Result<Option<BreakQueueEntry>> {
    sqlx::query_as(
        "SELECT id, type, priority, host_id, status, script_text, audio_path, video_path, \
         degradation_level, duration_ms, meta_json, created_at, ready_at, played_at \
         FROM break_queue WHERE status = 'PREPARING' LIMIT 1",
    )
    .fetch_optional(pool)
    .await
}

pub async fn get_break(pool: &SqlitePool, break_id: &str) -> sqlx::Result<Option<BreakQueueEntry>> {
    sqlx::query_as(
        "SELECT id, type, priority, host_id, status, script_text, audio_path, video_path, \
         degradation_level, duration_ms, meta_json, created_at, ready_at, played_at \
         FROM break_queue WHERE id = ?",
    )
    .bind(break_id)
    .fetch_optional(pool)
    .await
}

/// Headline IDs used in the last `lookback` played/ready breaks, for dedup exclusion
/// when building the next one.
pub async fn get_recent_headline_ids(pool: &SqlitePool, lookback: i64) -> sqlx::Result<Vec<String>> {
    let rows: Vec<(Option<String>,)> = sqlx::query_as(
        "SELECT meta_json FROM break_queue WHERE status IN ('PLAYED', 'READY') \
         AND meta_json IS NOT NULL ORDER BY created_at DESC LIMIT ?",
    )
    .bind(lookback)
    .fetch_all(pool)
    .await?;

    let mut ids = Vec::new();
    for (meta_json,) in rows {
        if let Some(json) = meta_json {
            if let Ok(meta) = serde_json::from_str::<BreakMeta>(&json) {
                ids.extend(meta.headline_ids);
            }
        }
    }
    Ok(ids)
}

pub fn parse_status(entry: &BreakQueueEntry) -> BreakStatus {
    BreakStatus::parse(&entry.status)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::test_pool;

    #[tokio::test]
    async fn admission_gate_sees_own_preparing_entry() {
        let pool = test_pool().await;
        assert!(get_preparing_break(&pool).await.unwrap().is_none());

        create_break(&pool, "brk_1", BreakType::Scheduled, Some("host_a")).await.unwrap();
        let preparing = get_preparing_break(&pool).await.unwrap();
        assert_eq!(preparing.unwrap().id, "brk_1");
    }

    #[tokio::test]
    async fn lifecycle_preparing_to_ready_to_played() {
        let pool = test_pool().await;
        create_break(&pool, "brk_2", BreakType::Scheduled, Some("host_a")).await.unwrap();

        let meta = BreakMeta { headlines: 3, headline_ids: vec!["h1".into(), "h2".into()], ..Default::default() };
        mark_ready(&pool, "brk_2", "hello world", "/tmp/brk_2.mp3", None, 0, Some(12_000), &meta)
            .await
            .unwrap();

        let entry = get_break(&pool, "brk_2").await.unwrap().unwrap();
        assert_eq!(parse_status(&entry), BreakStatus::Ready);
        assert!(get_preparing_break(&pool).await.unwrap().is_none());

        mark_played(&pool, "brk_2").await.unwrap();
        let entry = get_break(&pool, "brk_2").await.unwrap().unwrap();
        assert_eq!(parse_status(&entry), BreakStatus::Played);
    }

    #[tokio::test]
    async fn mark_failed_sets_terminal_status() {
        let pool = test_pool().await;
        create_break(&pool, "brk_3", BreakType::Scheduled, Some("host_a")).await.unwrap();
        mark_failed(&pool, "brk_3", "all fallbacks exhausted").await.unwrap();

        let entry = get_break(&pool, "brk_3").await.unwrap().unwrap();
        assert_eq!(parse_status(&entry), BreakStatus::Failed);
    }

    #[tokio::test]
    async fn recent_headline_ids_flat_maps_across_lookback() {
        let pool = test_pool().await;
        create_break(&pool, "brk_4", BreakType::Scheduled, Some("host_a")).await.unwrap();
        let meta1 = BreakMeta { headline_ids: vec!["a".into(), "b".into()], ..Default::default() };
        mark_ready(&pool, "brk_4", "s", "/tmp/a.mp3", None, 0, None, &meta1).await.unwrap();
        mark_played(&pool, "brk_4").await.unwrap();

        create_break(&pool, "brk_5", BreakType::Scheduled, Some("host_b")).await.unwrap();
        let meta2 = BreakMeta { headline_ids: vec!["c".into()], ..Default::default() };
        mark_ready(&pool, "brk_5", "s", "/tmp/b.mp3", None, 0, None, &meta2).await.unwrap();

        let ids = get_recent_headline_ids(&pool, 2).await.unwrap();
        assert_eq!(ids.len(), 3);
        assert!(ids.contains(&"a".to_string()));
        assert!(ids.contains(&"c".to_string()));
    }
}
