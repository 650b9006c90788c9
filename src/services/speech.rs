//! Speech synthesis router — dispatches to the provider configured for a host,
//! normalizing every output to 44.1kHz stereo MP3 @192kbps via `ffmpeg loudnorm`.
//!
//! Grounded on `original_source/core/providers/tts_router.py` +
//! `tts_piper.py`/`tts_elevenlabs.py`/`tts_openai.py`. Provider names are
//! abstracted to `local` (on-box subprocess engine), `cloud_a` (voice-cloning
//! REST API, ElevenLabs-shaped), and `cloud_b` (OpenAI-shaped TTS endpoint) to
//! match the `cloud_a_*`/`cloud_b_*` settings already in `schema.sql`.

use crate::config::Config;
use crate::models::{Host, Settings};
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

const LOUDNORM_FILTER: &str = "loudnorm=I=-16:TP=-1.5:LRA=11";

/// Synthesizes `text` using the provider configured for `host`, writing
/// `{breaks_dir}/{output_id}.mp3`. Returns `None` on any failure (missing model,
/// missing API key, subprocess/API error, timeout) — callers treat that as a
/// trigger for the next degradation-ladder rung.
pub async fn synthesize(
    config: &Config,
    settings: &Settings,
    client: &reqwest::Client,
    text: &str,
    host: &Host,
    output_id: &str,
) -> Option<PathBuf> {
    let voice_id = host.tts_voice_id.as_str();

    tokio::fs::create_dir_all(&config.breaks_dir).await.ok()?;

    match host.tts_provider.as_str() {
        "cloud_a" => {
            if settings.cloud_a_api_key.is_empty() {
                tracing::warn!("cloud_a TTS selected but no API key configured, falling back to local");
                synthesize_local(config, text, host.local_model_name.as_str(), output_id).await
            } else {
                synthesize_cloud_a(config, client, text, voice_id, output_id, &settings.cloud_a_api_key).await
            }
        }
        "cloud_b" => {
            if settings.cloud_b_api_key.is_empty() {
                tracing::warn!("cloud_b TTS selected but no API key configured, falling back to local");
                synthesize_local(config, text, host.local_model_name.as_str(), output_id).await
            } else {
                synthesize_cloud_b(
                    config,
                    client,
                    text,
                    voice_id,
                    output_id,
                    &settings.cloud_b_api_key,
                    &settings.cloud_b_tts_model,
                )
                .await
            }
        }
        _ => synthesize_local(config, text, host.local_model_name.as_str(), output_id).await,
    }
}

async fn synthesize_local(
    config: &Config,
    text: &str,
    model_name: &str,
    output_id: &str,
) -> Option<PathBuf> {
    let model_path = config.speech_models_dir.join(format!("{model_name}.onnx"));
    if !model_path.exists() {
        tracing::warn!(path = %model_path.display(), "speech model not found");
        return None;
    }

    let wav_path = config.breaks_dir.join(format!("{output_id}.wav"));
    let mp3_path = config.breaks_dir.join(format!("{output_id}.mp3"));

    let result = run_local_synthesis(config, text, &model_path, &wav_path).await;
    if let Err(e) = result {
        tracing::warn!(error = %e, "local speech synthesis failed");
        cleanup(&[&wav_path]).await;
        return None;
    }

    if !wav_path.exists() {
        tracing::warn!("local speech synthesis produced no WAV output");
        return None;
    }

    if let Err(e) = normalize(config, &wav_path, &mp3_path).await {
        tracing::warn!(error = %e, "loudnorm pass failed");
        cleanup(&[&wav_path]).await;
        return None;
    }

    cleanup(&[&wav_path]).await;
    Some(mp3_path)
}

async fn run_local_synthesis(
    config: &Config,
    text: &str,
    model_path: &Path,
    wav_path: &Path,
) -> anyhow::Result<()> {
    let mut child = Command::new(&config.speech_local_bin)
        .arg("--model")
        .arg(model_path)
        .arg("--output_file")
        .arg(wav_path)
        .stdin(std::process::Stdio::piped())
        .stdout(std::process::Stdio::piped())
        .stderr(std::process::Stdio::piped())
        .spawn()?;

    if let Some(mut stdin) = child.stdin.take() {
        stdin.write_all(text.as_bytes()).await?;
    }

    let output = tokio::time::timeout(std::time::Duration::from_secs(60), child.wait_with_output()).await??;
    if !output.status.success() {
        anyhow::bail!("local speech engine exited with {}: {}", output.status, String::from_utf8_lossy(&output.stderr));
    }
    Ok(())
}

async fn synthesize_cloud_a(
    config: &Config,
    client: &reqwest::Client,
    text: &str,
    voice_id: &str,
    output_id: &str,
    api_key: &str,
) -> Option<PathBuf> {
    if voice_id.is_empty() {
        tracing::warn!("cloud_a TTS selected but host has no voice_id");
        return None;
    }

    let raw_path = config.breaks_dir.join(format!("{output_id}_raw.mp3"));
    let mp3_path = config.breaks_dir.join(format!("{output_id}.mp3"));

    let url = format!("{}/{}", config.cloud_a_base, voice_id);
    let resp = client
        .post(&url)
        .header("xi-api-key", api_key)
        .header("accept", "audio/mpeg")
        .json(&serde_json::json!({
            "text": text,
            "model_id": "eleven_monolingual_v1",
            "voice_settings": { "stability": 0.5, "similarity_boost": 0.75 },
        }))
        .timeout(std::time::Duration::from_secs(30))
        .send()
        .await;

    let resp = match resp.and_then(reqwest::Response::error_for_status) {
        Ok(r) => r,
        Err(e) => {
            tracing::warn!(error = %e, "cloud_a TTS request failed");
            return None;
        }
    };

    let bytes = match resp.bytes().await {
        Ok(b) => b,
        Err(e) => {
            tracing::warn!(error = %e, "cloud_a TTS body read failed");
            return None;
        }
    };

    if tokio::fs::write(&raw_path, &bytes).await.is_err() {
        return None;
    }

    if let Err(e) = normalize(config, &raw_path, &mp3_path).await {
        tracing::warn!(error = %e, "cloud_a loudnorm pass failed");
        cleanup(&[&raw_path]).await;
        return None;
    }

    cleanup(&[&raw_path]).await;
    Some(mp3_path)
}

async fn synthesize_cloud_b(
    config: &Config,
    client: &reqwest::Client,
    text: &str,
    voice: &str,
    output_id: &str,
    api_key: &str,
    model: &str,
) -> Option<PathBuf> {
    let voice = if voice.is_empty() { "nova" } else { voice };
    let model = if model == "tts-1-hd" { "tts-1-hd" } else { "tts-1" };

    let raw_path = config.breaks_dir.join(format!("{output_id}_raw.mp3"));
    let mp3_path = config.breaks_dir.join(format!("{output_id}.mp3"));

    let resp = client
        .post(&config.cloud_b_base)
        .bearer_auth(api_key)
        .json(&serde_json::json!({
            "model": model,
            "voice": voice,
            "input": text,
            "response_format": "mp3",
        }))
        .timeout(std::time::Duration::from_secs(30))
        .send()
        .await;

    let resp = match resp.and_then(reqwest::Response::error_for_status) {
        Ok(r) => r,
        Err(e) => {
            tracing::warn!(error = %e, "cloud_b TTS request failed");
            return None;
        }
    };

    let bytes = match resp.bytes().await {
        Ok(b) => b,
        Err(e) => {
            tracing::warn!(error = %e, "cloud_b TTS body read failed");
            return None;
        }
    };

    if tokio::fs::write(&raw_path, &bytes).await.is_err() {
        return None;
    }

    if let Err(e) = normalize(config, &raw_path, &mp3_path).await {
        tracing::warn!(error = %e, "cloud_b loudnorm pass failed");
        cleanup(&[&raw_path]).await;
        return None;
    }

    cleanup(&[&raw_path]).await;
    Some(mp3_path)
}

async fn normalize(config: &Config, input: &Path, output: &Path) -> anyhow::Result<()> {
    let child = Command::new(&config.encoder_bin)
        .arg("-y")
        .arg("-i")
        .arg(input)
        .args(["-af", LOUDNORM_FILTER])
        .args(["-ar", "44100", "-ac", "2"])
        .args(["-c:a", "libmp3lame", "-b:a", "192k"])
        .arg(output)
        .stdout(std::process::Stdio::piped())
        .stderr(std::process::Stdio::piped())
        .spawn()?;

    let output_result = tokio::time::timeout(std::time::Duration::from_secs(30), child.wait_with_output()).await??;
    if !output_result.status.success() {
        anyhow::bail!(
            "ffmpeg normalize exited with {}: {}",
            output_result.status,
            String::from_utf8_lossy(&output_result.stderr)
        );
    }
    Ok(())
}

async fn cleanup(paths: &[&Path]) {
    for path in paths {
        let _ = tokio::fs::remove_file(path).await;
    }
}
