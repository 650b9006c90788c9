//! Visual-pipeline data model: the dialog script the LM emits, and the Edit
//! Decision List the director produces from it.
//!
//! Grounded on `original_source/visual/models.py`.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DialogLine {
    pub character: String,
    pub text: String,
    #[serde(default)]
    pub audio_path: Option<String>,
    #[serde(default)]
    pub duration_ms: i64,
    #[serde(default = "default_emotion")]
    pub emotion: String,
    #[serde(default)]
    pub camera_hint: Option<String>,
}

fn default_emotion() -> String {
    "neutral".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Scene {
    pub scene_id: String,
    pub background: String,
    #[serde(default)]
    pub lines: Vec<DialogLine>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Script {
    pub title: String,
    pub characters: Vec<String>,
    #[serde(default)]
    pub scenes: Vec<Scene>,
}

impl Script {
    /// Builds a single-scene, single-character script out of a monologue so the
    /// same director/compositor path can render a non-dialog break to video.
    pub fn monologue(host_id: &str, text: &str) -> Self {
        Script {
            title: "break".to_string(),
            characters: vec![host_id.to_string()],
            scenes: vec![Scene {
                scene_id: "scene_1".to_string(),
                background: "studio".to_string(),
                lines: vec![DialogLine {
                    character: host_id.to_string(),
                    text: text.to_string(),
                    audio_path: None,
                    duration_ms: 0,
                    emotion: "neutral".to_string(),
                    camera_hint: None,
                }],
            }],
        }
    }

    pub fn total_line_duration_ms(&self) -> i64 {
        self.scenes.iter().flat_map(|s| &s.lines).map(|l| l.duration_ms).sum()
    }
}

/// A loaded character asset bundle (paths resolved, emotion states discovered).
#[derive(Debug, Clone)]
pub struct CharacterConfig {
    pub char_id: String,
    pub label: String,
    pub idle_path: PathBuf,
    pub talking_path: PathBuf,
    pub position_x: f64,
    pub position_y: f64,
    pub scale: f64,
    pub positions: HashMap<String, (f64, f64, f64)>,
    pub states: HashMap<String, EmotionPaths>,
}

#[derive(Debug, Clone)]
pub struct EmotionPaths {
    pub idle: PathBuf,
    pub talking: PathBuf,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ShotType {
    Wide,
    CloseupLeft,
    CloseupRight,
    Twoshot,
}

impl ShotType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ShotType::Wide => "wide",
            ShotType::CloseupLeft => "closeup_left",
            ShotType::CloseupRight => "closeup_right",
            ShotType::Twoshot => "twoshot",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Transition {
    Cut,
    Dissolve,
    FadeBlack,
}

impl Transition {
    pub fn as_str(&self) -> &'static str {
        match self {
            Transition::Cut => "cut",
            Transition::Dissolve => "dissolve",
            Transition::FadeBlack => "fade_black",
        }
    }
}

/// One shot in the rendered plan.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EDLSegment {
    pub segment_id: u32,
    pub shot_type: ShotType,
    pub background_key: String,
    pub characters: Vec<String>,
    pub speaker: Option<String>,
    pub audio_path: Option<String>,
    pub duration_ms: i64,
    #[serde(default)]
    pub dialog_text: String,
    pub transition: Transition,
    pub character_states: HashMap<String, String>,
    #[serde(default)]
    pub listener: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Edl {
    pub segments: Vec<EDLSegment>,
}

impl Edl {
    pub fn total_duration_ms(&self) -> i64 {
        self.segments.iter().map(|s| s.duration_ms).sum()
    }
}
