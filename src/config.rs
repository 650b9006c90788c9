use std::env;
use std::path::PathBuf;

#[derive(Debug, Clone)]
pub struct Config {
    pub db_path: PathBuf,
    pub assets_dir: PathBuf,
    pub breaks_dir: PathBuf,
    pub stings_dir: PathBuf,
    pub video_dir: PathBuf,

    pub weather_api_key: Option<String>,
    pub lm_api_base: String,
    pub lm_api_key: Option<String>,
    pub lm_model: String,

    /// Path to the local speech synthesis binary (e.g. a Piper-compatible TTS engine).
    pub speech_local_bin: PathBuf,
    pub speech_models_dir: PathBuf,
    pub cloud_a_base: String,
    pub cloud_b_base: String,

    /// Path to the external encoder/transcoder binary (ffmpeg-compatible).
    pub encoder_bin: String,
    pub probe_bin: String,

    pub playout_socket: PathBuf,

    pub api_key: String,
    pub server_host: String,
    pub server_port: u16,

    pub cors_origins: Vec<String>,
}

impl Config {
    pub fn from_env() -> Result<Self, anyhow::Error> {
        dotenvy::dotenv().ok();

        let base_dir = PathBuf::from(
            env::var("BREAK_STUDIO_BASE_DIR").unwrap_or_else(|_| "/opt/break-studio".into()),
        );
        let data_dir = PathBuf::from(
            env::var("BREAK_STUDIO_DATA_DIR")
                .unwrap_or_else(|_| base_dir.join("data").to_string_lossy().into_owned()),
        );

        let api_key = env::var("BREAK_STUDIO_API_KEY").map_err(|_| {
            anyhow::anyhow!(
                "BREAK_STUDIO_API_KEY environment variable must be set. \
                This key gates the breaking-trigger and status endpoints."
            )
        })?;
        if api_key.len() < 16 {
            return Err(anyhow::anyhow!(
                "BREAK_STUDIO_API_KEY must be at least 16 characters long"
            ));
        }

        let cors_origins = env::var("CORS_ORIGINS")
            .unwrap_or_else(|_| "http://localhost:3000".to_string())
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();

        Ok(Config {
            db_path: PathBuf::from(
                env::var("BREAK_STUDIO_DB_PATH")
                    .unwrap_or_else(|_| data_dir.join("break_studio.db").to_string_lossy().into_owned()),
            ),
            assets_dir: PathBuf::from(
                env::var("BREAK_STUDIO_ASSETS_DIR")
                    .unwrap_or_else(|_| base_dir.join("assets").to_string_lossy().into_owned()),
            ),
            breaks_dir: data_dir.join("breaks"),
            stings_dir: data_dir.join("stings"),
            video_dir: PathBuf::from(
                env::var("BREAK_STUDIO_VIDEO_DIR").unwrap_or_else(|_| "/tmp/break_studio_video".into()),
            ),

            weather_api_key: env::var("WEATHER_API_KEY").ok(),
            lm_api_base: env::var("LM_API_BASE")
                .unwrap_or_else(|_| "https://api.openai.com/v1/chat/completions".to_string()),
            lm_api_key: env::var("LM_API_KEY").ok(),
            lm_model: env::var("LM_MODEL").unwrap_or_else(|_| "gpt-4o-mini".to_string()),

            speech_local_bin: PathBuf::from(
                env::var("SPEECH_LOCAL_BIN").unwrap_or_else(|_| "/usr/local/bin/piper".to_string()),
            ),
            speech_models_dir: PathBuf::from(
                env::var("SPEECH_MODELS_DIR")
                    .unwrap_or_else(|_| base_dir.join("models").to_string_lossy().into_owned()),
            ),
            cloud_a_base: env::var("CLOUD_A_API_BASE")
                .unwrap_or_else(|_| "https://api.elevenlabs.io/v1/text-to-speech".to_string()),
            cloud_b_base: env::var("CLOUD_B_API_BASE")
                .unwrap_or_else(|_| "https://api.openai.com/v1/audio/speech".to_string()),

            encoder_bin: env::var("ENCODER_BIN").unwrap_or_else(|_| "ffmpeg".to_string()),
            probe_bin: env::var("PROBE_BIN").unwrap_or_else(|_| "ffprobe".to_string()),

            playout_socket: PathBuf::from(
                env::var("PLAYOUT_SOCKET").unwrap_or_else(|_| "/run/playout/playout.sock".to_string()),
            ),

            api_key,
            server_host: env::var("SERVER_HOST").unwrap_or_else(|_| "127.0.0.1".to_string()),
            server_port: env::var("SERVER_PORT")
                .unwrap_or_else(|_| "8100".to_string())
                .parse()
                .unwrap_or(8100),
            cors_origins,
        })
    }
}
