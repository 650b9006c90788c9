//! Video-break rendering: dialog script -> shot list -> composited MP4.
//!
//! Grounded on `original_source/visual/*`. Used by `services::break_builder`
//! when `dialog_mode`/`video_enabled` are on; a rendering failure here is
//! non-fatal to the break itself (the audio-only break still airs).

pub mod assets;
pub mod audio_analysis;
pub mod compositor;
pub mod config;
pub mod director;
pub mod ffmpeg_utils;
pub mod lower_third;
pub mod models;

pub use assets::AssetPack;
pub use compositor::{render_edl, CompositorConfig};
pub use director::generate_edl;
pub use models::{DialogLine, Edl, Scene, Script};
