use serde::{Deserialize, Serialize};

/// A radio/TV host. Grounded on the `hosts` table and
/// `original_source/core/services/host_rotation.py`.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Host {
    pub id: String,
    pub label: String,
    pub personality_prompt: String,
    pub is_breaking_host: bool,
    pub tts_provider: String,
    /// Cloud-provider voice id; unused when `tts_provider == "local"`.
    pub tts_voice_id: String,
    /// On-box model file stem (looked up under `SPEECH_MODELS_DIR`); unused by cloud providers.
    pub local_model_name: String,
    pub enabled: bool,
}

/// Singleton rotation state, one row (`id = 1`).
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct HostRotation {
    pub id: i64,
    pub last_host_id: Option<String>,
    pub break_count: i64,
}
