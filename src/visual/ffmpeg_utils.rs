//! Subprocess wrapper around the external encoder/transcoder (ffmpeg-compatible)
//! and its prober (ffprobe-compatible): run commands, probe durations, detect a
//! hardware encoder once per process.
//!
//! Grounded on `original_source/visual/ffmpeg_utils.py`.

use crate::visual::config::{FPS, HEIGHT, PIXEL_FMT, WIDTH};
use std::path::Path;
use std::time::Duration;
use tokio::process::Command;
use tokio::sync::OnceCell;

static ENCODER: OnceCell<&'static str> = OnceCell::const_new();

/// Runs the encoder binary with the given args off the async event loop (it's a
/// blocking subprocess invocation), raising on a non-zero exit per spec.md §5.
pub async fn run_encoder(encoder_bin: &str, args: &[String], desc: &str) -> anyhow::Result<()> {
    let mut full_args = vec!["-y".to_string(), "-hide_banner".to_string(), "-loglevel".to_string(), "warning".to_string()];
    full_args.extend_from_slice(args);

    let output = Command::new(encoder_bin).args(&full_args).output().await?;
    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        let tail: String = stderr.chars().rev().take(500).collect::<String>().chars().rev().collect();
        anyhow::bail!("encoder failed ({desc}): {tail}");
    }
    Ok(())
}

/// `ffprobe -show_format` duration introspection, in milliseconds.
pub async fn probe_duration_ms(probe_bin: &str, path: &Path) -> anyhow::Result<i64> {
    let output = Command::new(probe_bin)
        .args(["-v", "quiet", "-print_format", "json", "-show_format"])
        .arg(path)
        .output()
        .await?;
    if !output.status.success() {
        anyhow::bail!("probe failed on {}: {}", path.display(), String::from_utf8_lossy(&output.stderr));
    }
    let parsed: serde_json::Value = serde_json::from_slice(&output.stdout)?;
    let duration_s: f64 = parsed["format"]["duration"]
        .as_str()
        .and_then(|s| s.parse().ok())
        .ok_or_else(|| anyhow::anyhow!("no duration in probe output"))?;
    Ok((duration_s * 1000.0) as i64)
}

/// Probes for a hardware H.264 encoder with a trivial test encode; falls back
/// to the software encoder on failure. Cached for the life of the process.
pub async fn detect_encoder(encoder_bin: &str) -> &'static str {
    *ENCODER
        .get_or_init(|| async {
            let probe = Command::new(encoder_bin)
                .args(["-y", "-hide_banner", "-loglevel", "error"])
                .args(["-f", "lavfi", "-i", &format!("color=black:s=64x64:d=0.1:r={FPS}")])
                .args(["-c:v", "h264_v4l2m2m"])
                .args(["-f", "null", "-"])
                .output();

            match tokio::time::timeout(Duration::from_secs(10), probe).await {
                Ok(Ok(out)) if out.status.success() => {
                    tracing::info!("using hardware encoder: h264_v4l2m2m");
                    "h264_v4l2m2m"
                }
                _ => {
                    tracing::info!("using software encoder: libx264");
                    "libx264"
                }
            }
        })
        .await
}

pub fn encoder_args(encoder: &str) -> Vec<String> {
    if encoder == "h264_v4l2m2m" {
        vec![
            "-c:v".into(), "h264_v4l2m2m".into(),
            "-b:v".into(), "4M".into(),
            "-pix_fmt".into(), PIXEL_FMT.into(),
        ]
    } else {
        vec![
            "-c:v".into(), "libx264".into(),
            "-preset".into(), "fast".into(),
            "-crf".into(), "23".into(),
            "-pix_fmt".into(), PIXEL_FMT.into(),
        ]
    }
}

pub const fn frame_size() -> (u32, u32) {
    (WIDTH, HEIGHT)
}

/// Losslessly concatenates MP3 files via the concat demuxer (stream-copy, no
/// re-encode) — used to join per-line dialog audio into one break track.
/// Grounded on `original_source/visual/compositor.py::_concat_cut_only` applied
/// to audio instead of video segments.
pub async fn concat_audio_lossless(encoder_bin: &str, inputs: &[std::path::PathBuf], output: &Path) -> anyhow::Result<()> {
    if inputs.is_empty() {
        anyhow::bail!("no audio segments to concatenate");
    }
    if inputs.len() == 1 {
        tokio::fs::copy(&inputs[0], output).await?;
        return Ok(());
    }

    let list_path = output.with_extension("concat.txt");
    let list = inputs
        .iter()
        .map(|p| format!("file '{}'", p.display().to_string().replace('\'', "'\\''")))
        .collect::<Vec<_>>()
        .join("\n");
    tokio::fs::write(&list_path, list).await?;

    let result = run_encoder(
        encoder_bin,
        &[
            "-f".into(), "concat".into(), "-safe".into(), "0".into(),
            "-i".into(), list_path.display().to_string(),
            "-c".into(), "copy".into(),
            output.display().to_string(),
        ],
        "concat_audio",
    )
    .await;
    let _ = tokio::fs::remove_file(&list_path).await;
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hardware_encoder_args_use_v4l2m2m() {
        let args = encoder_args("h264_v4l2m2m");
        assert!(args.contains(&"h264_v4l2m2m".to_string()));
        assert!(!args.contains(&"libx264".to_string()));
    }

    #[test]
    fn unknown_encoder_falls_back_to_libx264_args() {
        let args = encoder_args("libx264");
        assert!(args.contains(&"libx264".to_string()));
        let args = encoder_args("something_else");
        assert!(args.contains(&"libx264".to_string()));
    }

    #[test]
    fn frame_size_matches_configured_dimensions() {
        assert_eq!(frame_size(), (WIDTH, HEIGHT));
    }

    #[tokio::test]
    async fn concat_audio_lossless_with_single_input_is_a_plain_copy() {
        let dir = std::env::temp_dir().join(format!("break_studio_concataudio_{}", uuid::Uuid::new_v4()));
        tokio::fs::create_dir_all(&dir).await.unwrap();
        let input = dir.join("only.mp3");
        tokio::fs::write(&input, b"fake mp3 bytes").await.unwrap();
        let output = dir.join("out.mp3");

        concat_audio_lossless("ffmpeg-unused", &[input.clone()], &output).await.unwrap();

        let copied = tokio::fs::read(&output).await.unwrap();
        assert_eq!(copied, b"fake mp3 bytes");

        tokio::fs::remove_dir_all(&dir).await.ok();
    }

    #[tokio::test]
    async fn concat_audio_lossless_with_no_inputs_errors() {
        let output = std::env::temp_dir().join(format!("break_studio_concataudio_empty_{}.mp3", uuid::Uuid::new_v4()));
        let result = concat_audio_lossless("ffmpeg-unused", &[], &output).await;
        assert!(result.is_err());
    }
}
