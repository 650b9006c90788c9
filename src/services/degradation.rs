//! Degradation manager — the 5-level fallback ladder from spec.md §4.5.
//!
//! Grounded on `original_source/core/services/degradation.py`. Level 1 is reserved
//! (template caching is future work, per spec.md §4.5); the ladder implemented here
//! starts substituting at level 2.

use crate::models::WeatherReading;
use sqlx::SqlitePool;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, sqlx::FromRow)]
struct FallbackTemplateRow {
    id: i64,
    template_text: String,
}

/// Attempts the level-2 fallback: fill a least-recently-used template with weather
/// data from (at least) two cities. Returns `None` if fewer than two cities are
/// available — the caller falls through to level 3.
pub async fn fallback_script(
    pool: &SqlitePool,
    weather: &[WeatherReading],
) -> sqlx::Result<Option<String>> {
    if weather.len() < 2 {
        return Ok(None);
    }

    let template = sqlx::query_as::<_, FallbackTemplateRow>(
        "SELECT id, template_text FROM fallback_templates ORDER BY use_count ASC, RANDOM() LIMIT 1",
    )
    .fetch_optional(pool)
    .await?;

    let Some(template) = template else {
        return Ok(None);
    };

    let w1 = &weather[0];
    let w2 = &weather[1];
    let script = template
        .template_text
        .replace("{city1}", &w1.city_label)
        .replace("{temp1}", &format!("{}°{}", w1.temp, w1.units))
        .replace("{condition1}", &w1.condition)
        .replace("{city2}", &w2.city_label)
        .replace("{temp2}", &format!("{}°{}", w2.temp, w2.units))
        .replace("{condition2}", &w2.condition);

    sqlx::query(
        "UPDATE fallback_templates SET use_count = use_count + 1, last_used_at = datetime('now') WHERE id = ?",
    )
    .bind(template.id)
    .execute(pool)
    .await?;

    Ok(Some(script))
}

/// Level-3 fallback: a pre-recorded sting, looked up by name under `stings_dir`.
/// Returns `None` (falling through to level 4) if the file doesn't exist.
pub fn sting_path(stings_dir: &Path, name: &str) -> Option<PathBuf> {
    let path = stings_dir.join(format!("{name}.mp3"));
    path.exists().then_some(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::test_pool;

    fn reading(id: &str, label: &str, temp: f64, condition: &str) -> WeatherReading {
        WeatherReading {
            city_id: id.to_string(),
            city_label: label.to_string(),
            temp,
            feelslike: temp,
            condition: condition.to_string(),
            wind: 5.0,
            humidity: 50.0,
            units: "C".to_string(),
            wind_units: "kph".to_string(),
            stale: false,
        }
    }

    #[tokio::test]
    async fn fewer_than_two_cities_falls_through_to_level_3() {
        let pool = test_pool().await;
        let one_city = [reading("buenos_aires", "Buenos Aires", 22.0, "Clear")];
        assert!(fallback_script(&pool, &one_city).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn fills_template_with_two_cities_and_increments_use_count() {
        let pool = test_pool().await;
        let weather = [
            reading("buenos_aires", "Buenos Aires", 22.0, "Clear"),
            reading("new_york", "New York", 5.0, "Cloudy"),
        ];

        let script = fallback_script(&pool, &weather).await.unwrap().unwrap();
        assert!(script.contains("Buenos Aires"));
        assert!(script.contains("New York"));
        assert!(!script.contains('{'), "no unfilled template placeholders: {script}");

        let (use_count,): (i64,) =
            sqlx::query_as("SELECT use_count FROM fallback_templates ORDER BY use_count DESC LIMIT 1")
                .fetch_one(&pool)
                .await
                .unwrap();
        assert_eq!(use_count, 1);
    }

    #[tokio::test]
    async fn picks_least_recently_used_template() {
        let pool = test_pool().await;
        sqlx::query("UPDATE fallback_templates SET use_count = 5")
            .execute(&pool)
            .await
            .unwrap();
        sqlx::query("UPDATE fallback_templates SET use_count = 0 WHERE id = (SELECT MIN(id) FROM fallback_templates)")
            .execute(&pool)
            .await
            .unwrap();

        let weather = [
            reading("buenos_aires", "Buenos Aires", 22.0, "Clear"),
            reading("new_york", "New York", 5.0, "Cloudy"),
        ];
        fallback_script(&pool, &weather).await.unwrap();

        let (min_id_count,): (i64,) = sqlx::query_as(
            "SELECT use_count FROM fallback_templates WHERE id = (SELECT MIN(id) FROM fallback_templates)",
        )
        .fetch_one(&pool)
        .await
        .unwrap();
        assert_eq!(min_id_count, 1, "the use_count=0 row should have been picked and incremented");
    }
}
