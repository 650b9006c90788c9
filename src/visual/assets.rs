//! Asset pack — discovers character PNGs (idle/talking + emotion variants) and
//! background PNGs on disk for a requested set of character ids.
//!
//! Grounded on `original_source/visual/assets.py`.

use crate::visual::models::{CharacterConfig, EmotionPaths};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize)]
struct CharacterConfigFile {
    #[serde(default)]
    label: Option<String>,
    #[serde(default)]
    position_x: Option<f64>,
    #[serde(default)]
    position_y: Option<f64>,
    #[serde(default)]
    scale: Option<f64>,
    #[serde(default)]
    positions: HashMap<String, [f64; 3]>,
}

pub struct AssetPack {
    pub assets_dir: PathBuf,
    pub characters: HashMap<String, CharacterConfig>,
    pub backgrounds: HashMap<String, PathBuf>,
}

impl AssetPack {
    pub fn new(assets_dir: PathBuf) -> Self {
        Self { assets_dir, characters: HashMap::new(), backgrounds: HashMap::new() }
    }

    /// Loads the requested characters and discovers all backgrounds. Fails (rather
    /// than degrading) on a missing character directory or missing `idle.png`/
    /// `talking.png` — visual rendering for this break is abandoned and the
    /// orchestrator falls back to audio-only, per spec.md §4.9/§4.11.
    pub fn load(&mut self, character_ids: &[String]) -> anyhow::Result<()> {
        self.load_characters(character_ids)?;
        self.load_backgrounds()?;
        Ok(())
    }

    fn load_characters(&mut self, character_ids: &[String]) -> anyhow::Result<()> {
        let chars_dir = self.assets_dir.join("characters");
        for cid in character_ids {
            let char_dir = chars_dir.join(cid);
            if !char_dir.is_dir() {
                anyhow::bail!("character directory not found: {}", char_dir.display());
            }

            let idle = char_dir.join("idle.png");
            let talking = char_dir.join("talking.png");
            if !idle.exists() {
                anyhow::bail!("missing idle.png for {cid}");
            }
            if !talking.exists() {
                anyhow::bail!("missing talking.png for {cid}");
            }

            let config_file = char_dir.join("config.json");
            let cfg: CharacterConfigFile = if config_file.exists() {
                let raw = std::fs::read_to_string(&config_file)?;
                serde_json::from_str(&raw).unwrap_or(CharacterConfigFile {
                    label: None,
                    position_x: None,
                    position_y: None,
                    scale: None,
                    positions: HashMap::new(),
                })
            } else {
                CharacterConfigFile {
                    label: None,
                    position_x: None,
                    position_y: None,
                    scale: None,
                    positions: HashMap::new(),
                }
            };

            let positions = cfg
                .positions
                .into_iter()
                .map(|(k, [x, y, s])| (k, (x, y, s)))
                .collect();

            let states = scan_emotion_states(&char_dir, &idle, &talking);

            self.characters.insert(
                cid.clone(),
                CharacterConfig {
                    char_id: cid.clone(),
                    label: cfg.label.unwrap_or_else(|| capitalize(cid)),
                    idle_path: idle,
                    talking_path: talking,
                    position_x: cfg.position_x.unwrap_or(0.5),
                    position_y: cfg.position_y.unwrap_or(0.7),
                    scale: cfg.scale.unwrap_or(1.0),
                    positions,
                    states,
                },
            );
            tracing::info!(character = %cid, "asset pack loaded character");
        }
        Ok(())
    }

    fn load_backgrounds(&mut self) -> anyhow::Result<()> {
        let bg_dir = self.assets_dir.join("backgrounds");
        if !bg_dir.is_dir() {
            anyhow::bail!("backgrounds directory not found: {}", bg_dir.display());
        }

        let mut entries: Vec<PathBuf> = std::fs::read_dir(&bg_dir)?
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .filter(|p| p.extension().and_then(|e| e.to_str()) == Some("png"))
            .collect();
        entries.sort();

        for png in entries {
            if let Some(key) = png.file_stem().and_then(|s| s.to_str()) {
                self.backgrounds.insert(key.to_string(), png.clone());
                tracing::debug!(key, "asset pack loaded background");
            }
        }

        if self.backgrounds.is_empty() {
            anyhow::bail!("no background PNGs found in {}", bg_dir.display());
        }
        Ok(())
    }

    /// `{base}_{shot_type}`, falling back to `{base}_wide`, then first-available.
    pub fn get_background(&self, shot_type: &str, base: &str) -> &Path {
        let key = format!("{base}_{shot_type}");
        if let Some(p) = self.backgrounds.get(&key) {
            return p;
        }
        let fallback = format!("{base}_wide");
        if let Some(p) = self.backgrounds.get(&fallback) {
            return p;
        }
        self.backgrounds.values().next().expect("load() guarantees at least one background")
    }

    /// Emotion-aware PNG lookup with a total fallback to `neutral`, then to the
    /// character's default idle/talking path — callers never branch on presence.
    pub fn get_character_png(&self, char_id: &str, emotion: &str, is_talking: bool) -> &Path {
        let cfg = &self.characters[char_id];
        if let Some(state) = cfg.states.get(emotion) {
            return if is_talking { &state.talking } else { &state.idle };
        }
        if let Some(state) = cfg.states.get("neutral") {
            return if is_talking { &state.talking } else { &state.idle };
        }
        if is_talking { &cfg.talking_path } else { &cfg.idle_path }
    }

    pub fn get_character_position(&self, char_id: &str, shot_type: &str) -> (f64, f64, f64) {
        let cfg = &self.characters[char_id];
        cfg.positions.get(shot_type).copied().unwrap_or((cfg.position_x, cfg.position_y, cfg.scale))
    }
}

/// Discovers `{emotion}_idle.png` + `{emotion}_talking.png` pairs next to the
/// default idle/talking PNGs; a missing talking variant falls back to the
/// character's default talking PNG (spec.md §4.11).
fn scan_emotion_states(
    char_dir: &Path,
    default_idle: &Path,
    default_talking: &Path,
) -> HashMap<String, EmotionPaths> {
    let mut states = HashMap::new();
    states.insert(
        "neutral".to_string(),
        EmotionPaths { idle: default_idle.to_path_buf(), talking: default_talking.to_path_buf() },
    );

    let Ok(entries) = std::fs::read_dir(char_dir) else { return states };
    for entry in entries.filter_map(|e| e.ok()) {
        let path = entry.path();
        let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else { continue };
        let Some(emotion) = stem.strip_suffix("_idle") else { continue };
        if emotion.is_empty() {
            continue;
        }
        let talking_path = char_dir.join(format!("{emotion}_talking.png"));
        let talking = if talking_path.exists() { talking_path } else { default_talking.to_path_buf() };
        states.insert(emotion.to_string(), EmotionPaths { idle: path.clone(), talking });
    }
    states
}

fn capitalize(s: &str) -> String {
    let mut c = s.chars();
    match c.next() {
        None => String::new(),
        Some(f) => f.to_uppercase().collect::<String>() + c.as_str(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scratch_dir(name: &str) -> PathBuf {
        std::env::temp_dir().join(format!("break_studio_assets_{name}_{}", uuid::Uuid::new_v4()))
    }

    fn touch(path: &Path) {
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, b"png").unwrap();
    }

    #[test]
    fn capitalize_uppercases_only_the_first_char() {
        assert_eq!(capitalize("alex"), "Alex");
        assert_eq!(capitalize(""), "");
    }

    #[test]
    fn load_fails_when_character_directory_is_missing() {
        let dir = scratch_dir("missing_char");
        std::fs::create_dir_all(dir.join("backgrounds")).unwrap();
        touch(&dir.join("backgrounds").join("studio_wide.png"));

        let mut pack = AssetPack::new(dir.clone());
        let result = pack.load(&["alex".to_string()]);
        assert!(result.is_err());

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn load_fails_when_no_background_pngs_present() {
        let dir = scratch_dir("no_backgrounds");
        let char_dir = dir.join("characters").join("alex");
        touch(&char_dir.join("idle.png"));
        touch(&char_dir.join("talking.png"));
        std::fs::create_dir_all(dir.join("backgrounds")).unwrap();

        let mut pack = AssetPack::new(dir.clone());
        assert!(pack.load(&["alex".to_string()]).is_err());

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn successful_load_discovers_character_and_backgrounds() {
        let dir = scratch_dir("happy_path");
        let char_dir = dir.join("characters").join("alex");
        touch(&char_dir.join("idle.png"));
        touch(&char_dir.join("talking.png"));
        touch(&dir.join("backgrounds").join("studio_wide.png"));
        touch(&dir.join("backgrounds").join("studio_closeup_left.png"));

        let mut pack = AssetPack::new(dir.clone());
        pack.load(&["alex".to_string()]).unwrap();

        assert!(pack.characters.contains_key("alex"));
        assert_eq!(pack.characters["alex"].label, "Alex");
        assert_eq!(pack.backgrounds.len(), 2);

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn get_background_falls_back_to_wide_then_to_any_entry() {
        let dir = scratch_dir("bg_fallback");
        let char_dir = dir.join("characters").join("alex");
        touch(&char_dir.join("idle.png"));
        touch(&char_dir.join("talking.png"));
        touch(&dir.join("backgrounds").join("studio_wide.png"));

        let mut pack = AssetPack::new(dir.clone());
        pack.load(&["alex".to_string()]).unwrap();

        // Exact key found.
        assert_eq!(pack.get_background("wide", "studio"), pack.backgrounds["studio_wide"].as_path());
        // No "studio_closeup_left" entry, falls back to "studio_wide".
        assert_eq!(pack.get_background("closeup_left", "studio"), pack.backgrounds["studio_wide"].as_path());

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn scan_emotion_states_pairs_idle_and_talking_and_falls_back_on_missing_talking() {
        let dir = scratch_dir("emotions");
        let char_dir = dir.join("characters").join("alex");
        touch(&char_dir.join("idle.png"));
        touch(&char_dir.join("talking.png"));
        touch(&char_dir.join("happy_idle.png"));
        touch(&char_dir.join("happy_talking.png"));
        touch(&char_dir.join("angry_idle.png")); // no angry_talking.png
        touch(&dir.join("backgrounds").join("studio_wide.png"));

        let mut pack = AssetPack::new(dir.clone());
        pack.load(&["alex".to_string()]).unwrap();
        let cfg = &pack.characters["alex"];

        assert!(cfg.states.contains_key("neutral"));
        assert_eq!(cfg.states["happy"].talking, char_dir.join("happy_talking.png"));
        // angry has no talking variant on disk, so it falls back to the default.
        assert_eq!(cfg.states["angry"].talking, char_dir.join("talking.png"));

        assert_eq!(pack.get_character_png("alex", "happy", true), char_dir.join("happy_talking.png"));
        assert_eq!(pack.get_character_png("alex", "unknown_emotion", false), char_dir.join("idle.png"));

        std::fs::remove_dir_all(&dir).ok();
    }
}
