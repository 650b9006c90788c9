use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;
use std::str::FromStr;

/// Open the embedded store and make sure its schema is current.
///
/// Mirrors `original_source/core/database.py::get_db`/`init_db`: WAL mode, a busy
/// timeout so concurrent readers/writers don't immediately error out, and foreign keys
/// enforced. Unlike the original's "check for the `settings` table, else run schema.sql
/// once" dance, `executescript`-equivalent here just runs the whole schema with
/// `CREATE TABLE IF NOT EXISTS` / `INSERT OR IGNORE`, which is idempotent on every boot.
pub async fn connect(db_path: &std::path::Path) -> anyhow::Result<SqlitePool> {
    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let options = SqliteConnectOptions::from_str(&format!("sqlite://{}", db_path.display()))?
        .create_if_missing(true)
        .busy_timeout(std::time::Duration::from_millis(5000))
        .foreign_keys(true)
        .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal);

    let pool = SqlitePoolOptions::new()
        .max_connections(8)
        .connect_with(options)
        .await?;

    let schema = include_str!("../schema.sql");
    run_script(&pool, schema).await?;

    Ok(pool)
}

async fn run_script(pool: &SqlitePool, script: &str) -> anyhow::Result<()> {
    for statement in split_statements(script) {
        if statement.trim().is_empty() {
            continue;
        }
        sqlx::query(&statement).execute(pool).await?;
    }
    Ok(())
}

fn split_statements(script: &str) -> Vec<String> {
    script
        .split(';')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

/// Startup recovery: any break stuck in PREPARING from a previous process crash can
/// never be completed (the orchestrator task that owned it is gone), so it is marked
/// FAILED. Mirrors the spec's admission-gate invariant: at most one non-breaking
/// PREPARING entry may exist, which would otherwise wedge forever after a restart.
pub async fn recover_stale_preparing(pool: &SqlitePool) -> anyhow::Result<u64> {
    let result = sqlx::query(
        "UPDATE break_queue SET status = 'FAILED', meta_json = '{\"error\":\"stale_preparing_on_startup\"}' \
         WHERE status = 'PREPARING'",
    )
    .execute(pool)
    .await?;
    Ok(result.rows_affected())
}

/// Retention pruning: events older than 7 days, news cache older than 24h, and FAILED
/// breaks older than 7 days are dropped so the store doesn't grow unbounded.
pub async fn prune_retention(pool: &SqlitePool) -> anyhow::Result<()> {
    sqlx::query("DELETE FROM events_log WHERE created_at < datetime('now', '-7 days')")
        .execute(pool)
        .await?;
    sqlx::query("DELETE FROM cache_news WHERE fetched_at < datetime('now', '-24 hours')")
        .execute(pool)
        .await?;
    sqlx::query(
        "DELETE FROM break_queue WHERE status = 'FAILED' AND created_at < datetime('now', '-7 days')",
    )
    .execute(pool)
    .await?;
    Ok(())
}
