use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A dialog-mode character row, synced to the on-disk asset pack by
/// `services::character_sync`. Grounded on the `characters` table and
/// `original_source/core/database.py::_seed_characters`.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Character {
    pub id: String,
    pub label: String,
    pub gender: String,
    pub age: i64,
    pub behavior_prompt: String,
    pub voice_id: String,
    pub host_id: String,
    pub position_x: f64,
    pub position_y: f64,
    pub scale: f64,
    pub positions_json: String,
    pub enabled: bool,
}

/// (x_fraction, y_fraction, scale) triple for a given shot type.
pub type ShotPosition = (f64, f64, f64);

impl Character {
    /// Parses `positions_json` into a shot-type → position map, falling back to an
    /// empty map on malformed JSON (mirrors `character_sync.py`'s best-effort parse).
    pub fn positions(&self) -> HashMap<String, ShotPosition> {
        serde_json::from_str::<HashMap<String, [f64; 3]>>(&self.positions_json)
            .unwrap_or_default()
            .into_iter()
            .map(|(k, [x, y, s])| (k, (x, y, s)))
            .collect()
    }

    pub fn default_position(&self) -> ShotPosition {
        (self.position_x, self.position_y, self.scale)
    }
}
