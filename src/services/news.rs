//! News provider — RSS fan-out, sanitization, dedup, LM-assisted scoring and
//! selection.
//!
//! Grounded on `original_source/core/providers/news.py`. Feeds are polled
//! serially in-task (spec.md §5: bounded by feed count, 15s deadline each, kept
//! serial to keep memory pressure predictable) rather than fanned out like
//! weather.

use crate::models::{CachedHeadline, FeedStatus, NewsSource, SelectedHeadline, DEAD_THRESHOLD};
use chrono::Utc;
use once_cell::sync::Lazy;
use regex::Regex;
use sha2::{Digest, Sha256};
use sqlx::SqlitePool;

static TAG_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"<[^>]+>").unwrap());
static CTRL_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"[\x00-\x1f\x7f]").unwrap());

fn sanitize(text: &str, max_len: usize) -> String {
    let stripped = CTRL_RE.replace_all(&TAG_RE.replace_all(text, ""), "");
    let trimmed = stripped.trim();
    trimmed.chars().take(max_len).collect()
}

fn title_hash(title: &str) -> String {
    let normalized = title.to_lowercase();
    let mut hasher = Sha256::new();
    hasher.update(normalized.trim().as_bytes());
    let digest = hasher.finalize();
    digest.iter().take(8).map(|b| format!("{:02x}", b)).collect()
}

/// Polls every enabled, non-dead feed and inserts new (dedup-by-title) rows into
/// `cache_news`. Returns the count of newly inserted headlines, for logging.
pub async fn fetch_all_feeds(pool: &SqlitePool, client: &reqwest::Client) -> sqlx::Result<usize> {
    let sources: Vec<NewsSource> = sqlx::query_as(
        "SELECT ns.id, ns.label, ns.url, ns.category, ns.weight, ns.enabled \
         FROM news_sources ns JOIN feed_health fh ON fh.source_id = ns.id \
         WHERE ns.enabled = 1 AND fh.status != 'dead' ORDER BY ns.weight DESC",
    )
    .fetch_all(pool)
    .await?;

    let mut inserted = 0;
    for source in &sources {
        inserted += fetch_feed(pool, client, source).await?;
    }
    Ok(inserted)
}

async fn fetch_feed(
    pool: &SqlitePool,
    client: &reqwest::Client,
    source: &NewsSource,
) -> sqlx::Result<usize> {
    let now = Utc::now().to_rfc3339();

    let result = fetch_and_parse(client, &source.url).await;

    let channel = match result {
        Ok(channel) => channel,
        Err(e) => {
            tracing::warn!(source = %source.label, error = %e, "news fetch failed");
            mark_feed_failure(pool, &source.id, &now).await?;
            return Ok(0);
        }
    };

    let mut inserted = 0;
    for item in channel.items().iter().take(20) {
        let raw_title = item.title().unwrap_or_default();
        let title = sanitize(raw_title, 200);
        if title.is_empty() {
            continue;
        }

        let th = title_hash(&title);
        let id = format!("{}_{}", source.id, th);
        let description = sanitize(item.description().unwrap_or_default(), 300);
        let url = item.link().unwrap_or_default();
        let published_at = item
            .pub_date()
            .and_then(|s| chrono::DateTime::parse_from_rfc2822(s).ok())
            .map(|dt| dt.to_rfc3339())
            .unwrap_or_else(|| now.clone());

        let result = sqlx::query(
            "INSERT OR IGNORE INTO cache_news \
             (id, source_id, title, description, url, published_at, fetched_at, title_hash, category) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&id)
        .bind(&source.id)
        .bind(&title)
        .bind(&description)
        .bind(url)
        .bind(&published_at)
        .bind(&now)
        .bind(&th)
        .bind(&source.category)
        .execute(pool)
        .await?;

        if result.rows_affected() > 0 {
            inserted += 1;
        }
    }

    mark_feed_success(pool, &source.id, &now).await?;
    Ok(inserted)
}

async fn fetch_and_parse(client: &reqwest::Client, url: &str) -> anyhow::Result<rss::Channel> {
    let bytes = client
        .get(url)
        .timeout(std::time::Duration::from_secs(15))
        .send()
        .await?
        .error_for_status()?
        .bytes()
        .await?;
    Ok(rss::Channel::read_from(&bytes[..])?)
}

async fn mark_feed_success(pool: &SqlitePool, source_id: &str, now: &str) -> sqlx::Result<()> {
    sqlx::query(
        "UPDATE feed_health SET last_success = ?, consecutive_failures = 0, status = 'healthy' \
         WHERE source_id = ?",
    )
    .bind(now)
    .bind(source_id)
    .execute(pool)
    .await?;
    Ok(())
}

async fn mark_feed_failure(pool: &SqlitePool, source_id: &str, now: &str) -> sqlx::Result<()> {
    let row: Option<(i64,)> =
        sqlx::query_as("SELECT consecutive_failures FROM feed_health WHERE source_id = ?")
            .bind(source_id)
            .fetch_optional(pool)
            .await?;
    let failures = row.map(|(f,)| f).unwrap_or(0) + 1;
    let status = if failures >= DEAD_THRESHOLD {
        FeedStatus::Dead
    } else {
        FeedStatus::Unhealthy
    };

    sqlx::query(
        "UPDATE feed_health SET last_failure = ?, consecutive_failures = ?, status = ? \
         WHERE source_id = ?",
    )
    .bind(now)
    .bind(failures)
    .bind(status.as_str())
    .bind(source_id)
    .execute(pool)
    .await?;
    Ok(())
}

/// Pulls up to `limit` unscored recent headlines for LM scoring.
pub async fn get_recent_unscored(pool: &SqlitePool, limit: i64) -> sqlx::Result<Vec<CachedHeadline>> {
    sqlx::query_as(
        "SELECT id, source_id, title, description, url, published_at, fetched_at, title_hash, \
         category, scored, score FROM cache_news WHERE scored = 0 ORDER BY fetched_at DESC LIMIT ?",
    )
    .bind(limit)
    .fetch_all(pool)
    .await
}

pub async fn mark_scored(
    pool: &SqlitePool,
    id: &str,
    score: i64,
    category: Option<&str>,
) -> sqlx::Result<()> {
    sqlx::query(
        "UPDATE cache_news SET scored = 1, score = ?, category = COALESCE(?, category) WHERE id = ?",
    )
    .bind(score)
    .bind(category)
    .bind(id)
    .execute(pool)
    .await?;
    Ok(())
}

/// Selects the top `limit` headlines: scored, `score >= 4`, within the dedup
/// window, excluding `exclude_ids`. If exclusion leaves fewer than `limit`,
/// backfills from the unexcluded set (preserving order, tagging backfilled rows
/// "previously reported") per spec.md §4.2 step 5e / §4.3.
pub async fn get_top_headlines(
    pool: &SqlitePool,
    limit: i64,
    dedup_window_minutes: i64,
    exclude_ids: &[String],
) -> sqlx::Result<Vec<SelectedHeadline>> {
    let window = format!("-{} minutes", dedup_window_minutes);

    let primary: Vec<CachedHeadline> = if exclude_ids.is_empty() {
        sqlx::query_as(
            "SELECT id, source_id, title, description, url, published_at, fetched_at, title_hash, \
             category, scored, score FROM cache_news \
             WHERE scored = 1 AND score >= 4 AND fetched_at > datetime('now', ?) \
             ORDER BY score DESC, fetched_at DESC LIMIT ?",
        )
        .bind(&window)
        .bind(limit)
        .fetch_all(pool)
        .await?
    } else {
        let placeholders = exclude_ids.iter().map(|_| "?").collect::<Vec<_>>().join(",");
        let query = format!(
            "SELECT id, source_id, title, description, url, published_at, fetched_at, title_hash, \
             category, scored, score FROM cache_news \
             WHERE scored = 1 AND score >= 4 AND fetched_at > datetime('now', ?) \
             AND id NOT IN ({placeholders}) \
             ORDER BY score DESC, fetched_at DESC LIMIT ?"
        );
        let mut q = sqlx::query_as::<_, CachedHeadline>(&query).bind(&window);
        for id in exclude_ids {
            q = q.bind(id);
        }
        q = q.bind(limit);
        q.fetch_all(pool).await?
    };

    let mut selected: Vec<SelectedHeadline> = primary
        .into_iter()
        .map(|h| to_selected(h, false))
        .collect();

    if (selected.len() as i64) < limit {
        let backfill: Vec<CachedHeadline> = sqlx::query_as(
            "SELECT id, source_id, title, description, url, published_at, fetched_at, title_hash, \
             category, scored, score FROM cache_news \
             WHERE scored = 1 AND score >= 4 AND fetched_at > datetime('now', ?) \
             ORDER BY score DESC, fetched_at DESC LIMIT ?",
        )
        .bind(&window)
        .bind(limit)
        .fetch_all(pool)
        .await?;

        let seen: std::collections::HashSet<String> =
            selected.iter().map(|h| h.id.clone()).collect();
        for h in backfill {
            if (selected.len() as i64) >= limit {
                break;
            }
            if !seen.contains(&h.id) {
                selected.push(to_selected(h, true));
            }
        }
    }

    Ok(selected)
}

fn to_selected(h: CachedHeadline, previously_reported: bool) -> SelectedHeadline {
    SelectedHeadline {
        id: h.id,
        title: h.title,
        description: h.description,
        source_id: h.source_id,
        category: h.category,
        score: h.score.unwrap_or(0),
        published_at: h.published_at,
        previously_reported,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::test_pool;

    /// Inserts a headline the way `fetch_feed` does: `id = {source}_{title_hash16}`,
    /// `INSERT OR IGNORE` as the dedup serialization point.
    async fn insert_headline(
        pool: &SqlitePool,
        source_id: &str,
        title: &str,
        fetched_at: &str,
    ) -> String {
        let title = sanitize(title, 200);
        let th = title_hash(&title);
        let id = format!("{source_id}_{th}");
        sqlx::query(
            "INSERT OR IGNORE INTO cache_news \
             (id, source_id, title, description, url, published_at, fetched_at, title_hash, category) \
             VALUES (?, ?, ?, '', '', ?, ?, ?, 'general')",
        )
        .bind(&id)
        .bind(source_id)
        .bind(&title)
        .bind(fetched_at)
        .bind(fetched_at)
        .bind(&th)
        .execute(pool)
        .await
        .unwrap();
        id
    }

    #[tokio::test]
    async fn dedup_idempotent_across_repeated_polls() {
        let pool = test_pool().await;
        let now = Utc::now().to_rfc3339();

        let id1 = insert_headline(&pool, "reuters_world", "Markets Rally On Rate Cut", &now).await;
        let id2 = insert_headline(&pool, "reuters_world", "  markets rally ON rate cut  ", &now).await;
        assert_eq!(id1, id2);

        let count: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM cache_news WHERE id = ?")
            .bind(&id1)
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(count.0, 1);
    }

    #[tokio::test]
    async fn distinct_titles_produce_distinct_rows() {
        let pool = test_pool().await;
        let now = Utc::now().to_rfc3339();
        insert_headline(&pool, "reuters_world", "Storm Approaches Coast", &now).await;
        insert_headline(&pool, "reuters_world", "Senate Passes Budget Bill", &now).await;

        let count: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM cache_news")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(count.0, 2);
    }

    async fn score(pool: &SqlitePool, id: &str, score: i64) {
        mark_scored(pool, id, score, None).await.unwrap();
    }

    #[tokio::test]
    async fn exclusion_correctness_with_backfill() {
        let pool = test_pool().await;
        let now = Utc::now().to_rfc3339();

        let a = insert_headline(&pool, "reuters_world", "Headline A", &now).await;
        let b = insert_headline(&pool, "reuters_world", "Headline B", &now).await;
        let c = insert_headline(&pool, "reuters_world", "Headline C", &now).await;
        score(&pool, &a, 9).await;
        score(&pool, &b, 7).await;
        score(&pool, &c, 5).await;

        // Excluding the top-scored id still returns `limit` results via backfill,
        // with the excluded id reappearing as a backfilled, non-excluded-prefix entry.
        let results = get_top_headlines(&pool, 3, 60, &[a.clone()]).await.unwrap();
        assert_eq!(results.len(), 3);
        assert!(results.iter().any(|h| h.id == a));
        let a_entry = results.iter().find(|h| h.id == a).unwrap();
        assert!(a_entry.previously_reported);

        // Ordering within the non-excluded prefix is (score desc, fetched_at desc).
        assert_eq!(results[0].id, b);
        assert_eq!(results[1].id, c);
    }

    #[tokio::test]
    async fn selection_excludes_low_scores_and_respects_window() {
        let pool = test_pool().await;
        let now = Utc::now().to_rfc3339();
        let old = (Utc::now() - chrono::Duration::hours(2)).to_rfc3339();

        let low = insert_headline(&pool, "reuters_world", "Low Score Item", &now).await;
        let stale = insert_headline(&pool, "reuters_world", "Stale Item", &old).await;
        let good = insert_headline(&pool, "reuters_world", "Good Item", &now).await;
        score(&pool, &low, 2).await;
        score(&pool, &stale, 8).await;
        score(&pool, &good, 8).await;

        let results = get_top_headlines(&pool, 5, 60, &[]).await.unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].id, good);
    }

    #[tokio::test]
    async fn feed_health_monotonicity() {
        let pool = test_pool().await;
        let now = Utc::now().to_rfc3339();

        for _ in 0..4 {
            mark_feed_failure(&pool, "reuters_world", &now).await.unwrap();
        }
        let row: FeedHealth = sqlx::query_as(
            "SELECT source_id, last_success, last_failure, consecutive_failures, status \
             FROM feed_health WHERE source_id = 'reuters_world'",
        )
        .fetch_one(&pool)
        .await
        .unwrap();
        assert_eq!(row.consecutive_failures, 4);
        assert_eq!(FeedStatus::parse(&row.status), FeedStatus::Unhealthy);

        // The 5th consecutive failure escalates to dead.
        mark_feed_failure(&pool, "reuters_world", &now).await.unwrap();
        let row: FeedHealth = sqlx::query_as(
            "SELECT source_id, last_success, last_failure, consecutive_failures, status \
             FROM feed_health WHERE source_id = 'reuters_world'",
        )
        .fetch_one(&pool)
        .await
        .unwrap();
        assert_eq!(row.consecutive_failures, 5);
        assert_eq!(FeedStatus::parse(&row.status), FeedStatus::Dead);

        // Any success resets to healthy with a zeroed counter.
        mark_feed_success(&pool, "reuters_world", &now).await.unwrap();
        let row: FeedHealth = sqlx::query_as(
            "SELECT source_id, last_success, last_failure, consecutive_failures, status \
             FROM feed_health WHERE source_id = 'reuters_world'",
        )
        .fetch_one(&pool)
        .await
        .unwrap();
        assert_eq!(row.consecutive_failures, 0);
        assert_eq!(FeedStatus::parse(&row.status), FeedStatus::Healthy);
    }
}
