//! Shared test fixtures: an in-memory SQLite pool pre-loaded with `schema.sql`,
//! so service-level unit tests exercise the same schema/seed data the real
//! store runs with instead of hand-rolled fixtures.

use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;
use std::str::FromStr;

/// A single-connection in-memory pool. Single-connection is deliberate: SQLite's
/// `:memory:` databases are per-connection, so a pool with >1 connection would
/// hand different tests a different empty database.
pub async fn test_pool() -> SqlitePool {
    let options = SqliteConnectOptions::from_str("sqlite::memory:")
        .unwrap()
        .foreign_keys(true);

    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect_with(options)
        .await
        .expect("open in-memory sqlite");

    for statement in include_str!("../schema.sql").split(';') {
        let statement = statement.trim();
        if statement.is_empty() {
            continue;
        }
        sqlx::query(statement)
            .execute(&pool)
            .await
            .unwrap_or_else(|e| panic!("schema statement failed: {statement}\n{e}"));
    }

    pool
}

/// A `Config` with every external binary/API pointed at something that will
/// fail fast and deterministically offline (empty API keys, nonexistent
/// binaries) rather than live endpoints, so provider tests can exercise the
/// failure/fallback branches without a mock server.
pub fn test_config() -> crate::config::Config {
    crate::config::Config {
        db_path: std::path::PathBuf::from(":memory:"),
        assets_dir: std::path::PathBuf::from("/nonexistent/assets"),
        breaks_dir: std::path::PathBuf::from("/tmp/break_studio_test/breaks"),
        stings_dir: std::path::PathBuf::from("/tmp/break_studio_test/stings"),
        video_dir: std::path::PathBuf::from("/tmp/break_studio_test/video"),
        weather_api_key: None,
        lm_api_base: "https://example.invalid/lm".to_string(),
        lm_api_key: None,
        lm_model: "test-model".to_string(),
        speech_local_bin: std::path::PathBuf::from("/nonexistent/piper"),
        speech_models_dir: std::path::PathBuf::from("/nonexistent/models"),
        cloud_a_base: "https://example.invalid/cloud_a".to_string(),
        cloud_b_base: "https://example.invalid/cloud_b".to_string(),
        encoder_bin: "/nonexistent/ffmpeg".to_string(),
        probe_bin: "/nonexistent/ffprobe".to_string(),
        playout_socket: std::path::PathBuf::from("/tmp/break_studio_test/playout.sock"),
        api_key: "test-api-key-0123456789".to_string(),
        server_host: "127.0.0.1".to_string(),
        server_port: 8100,
        cors_origins: vec!["http://localhost:3000".to_string()],
    }
}
