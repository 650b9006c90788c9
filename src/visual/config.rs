//! Visual-pipeline constants. Grounded on `original_source/visual/config.py`.

pub const WIDTH: u32 = 1920;
pub const HEIGHT: u32 = 1080;
pub const FPS: u32 = 24;
pub const PIXEL_FMT: &str = "yuv420p";

pub const AUDIO_SAMPLE_RATE: u32 = 44100;
pub const AUDIO_CHANNELS: u32 = 2;

pub const DEFAULT_ENCODER: &str = "libx264";
pub const ENCODER_PRESET: &str = "fast";
pub const CRF: &str = "23";

pub const RMS_THRESHOLD: f32 = 0.02;
pub const RMS_SMOOTHING_FRAMES: usize = 2;

pub const REACTION_PROBABILITY: f64 = 0.20;
pub const REACTION_MIN_MS: i64 = 1500;
pub const REACTION_MAX_MS: i64 = 3000;
pub const WIDE_SHOT_MIN_MS: i64 = 2000;
pub const WIDE_SHOT_MAX_MS: i64 = 4000;
pub const WIDE_SHOT_INTERVAL: u32 = 4;
pub const RAPID_EXCHANGE_MS: i64 = 2000;
pub const WIDE_SHOT_DURATION_MS: i64 = 2000;

pub const TRANSITION_CUT: f64 = 0.85;
pub const TRANSITION_DISSOLVE: f64 = 0.10;
pub const TRANSITION_FADE_BLACK: f64 = 0.05;
pub const DISSOLVE_DURATION_S: f64 = 0.5;
pub const FADE_BLACK_DURATION_S: f64 = 0.5;
