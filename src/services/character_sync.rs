//! Syncs `characters` DB rows to `{assets_dir}/characters/{id}/config.json` so
//! the visual asset pack picks up DB-managed position/scale data unchanged.
//!
//! Grounded on `original_source/core/services/character_sync.py`.

use crate::models::Character;
use serde::Serialize;
use sqlx::SqlitePool;
use std::path::Path;

#[derive(Debug, Serialize)]
struct CharacterConfigFile {
    label: String,
    position_x: f64,
    position_y: f64,
    scale: f64,
    positions: std::collections::HashMap<String, (f64, f64, f64)>,
}

pub async fn sync_character_config(assets_dir: &Path, character: &Character) -> anyhow::Result<()> {
    let char_dir = assets_dir.join("characters").join(&character.id);
    tokio::fs::create_dir_all(&char_dir).await?;

    let config = CharacterConfigFile {
        label: character.label.clone(),
        position_x: character.position_x,
        position_y: character.position_y,
        scale: character.scale,
        positions: character.positions(),
    };

    let json = serde_json::to_string_pretty(&config)?;
    tokio::fs::write(char_dir.join("config.json"), json).await?;
    Ok(())
}

/// Syncs every enabled character row, called on boot and whenever character
/// settings are edited.
pub async fn sync_all(pool: &SqlitePool, assets_dir: &Path) -> anyhow::Result<()> {
    let characters: Vec<Character> = sqlx::query_as(
        "SELECT id, label, gender, age, behavior_prompt, voice_id, host_id, position_x, \
         position_y, scale, positions_json, enabled FROM characters WHERE enabled = 1",
    )
    .fetch_all(pool)
    .await?;

    for character in &characters {
        if let Err(e) = sync_character_config(assets_dir, character).await {
            tracing::warn!(character = %character.id, error = %e, "character config sync failed");
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::test_pool;

    fn alex() -> Character {
        Character {
            id: "alex".to_string(),
            label: "Alex".to_string(),
            gender: "male".to_string(),
            age: 34,
            behavior_prompt: String::new(),
            voice_id: "v1".to_string(),
            host_id: "host_a".to_string(),
            position_x: 0.3,
            position_y: 0.6,
            scale: 1.0,
            positions_json: r#"{"wide": [0.2, 0.7, 0.8], "closeup": [0.5, 0.5, 1.4]}"#.to_string(),
            enabled: true,
        }
    }

    #[tokio::test]
    async fn writes_config_json_with_parsed_positions() {
        let dir = std::env::temp_dir().join(format!("break_studio_charsync_{}", uuid::Uuid::new_v4()));
        let character = alex();

        sync_character_config(&dir, &character).await.unwrap();

        let written = tokio::fs::read_to_string(dir.join("characters").join("alex").join("config.json"))
            .await
            .unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&written).unwrap();
        assert_eq!(parsed["label"], "Alex");
        assert_eq!(parsed["positions"]["closeup"][2], 1.4);

        tokio::fs::remove_dir_all(&dir).await.ok();
    }

    #[tokio::test]
    async fn sync_all_skips_disabled_characters() {
        let pool = test_pool().await;
        let dir = std::env::temp_dir().join(format!("break_studio_charsync_all_{}", uuid::Uuid::new_v4()));

        sqlx::query("UPDATE characters SET enabled = 0 WHERE id = 'maya'")
            .execute(&pool)
            .await
            .unwrap();

        sync_all(&pool, &dir).await.unwrap();

        assert!(dir.join("characters").join("alex").join("config.json").exists());
        assert!(!dir.join("characters").join("maya").join("config.json").exists());

        tokio::fs::remove_dir_all(&dir).await.ok();
    }
}
