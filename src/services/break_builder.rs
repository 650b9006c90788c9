//! Break builder — orchestrates the full break generation pipeline end to end.
//!
//! Grounded on `original_source/core/services/break_builder.py::prepare_break`.
//! Each numbered step below maps to the original's matching comment.

use crate::config::Config;
use crate::models::{BreakMeta, BreakType, Character, Host, Settings};
use crate::services::{
    break_queue, content_validator::{self, ValidationBounds},
    degradation, host_rotation, lm, market, news, playout_client::PlayoutClient, speech, weather,
};
use crate::visual::ffmpeg_utils::concat_audio_lossless;
use crate::visual::models::Script;
use crate::visual::{self, CompositorConfig};
use chrono::Utc;
use sqlx::SqlitePool;
use std::path::PathBuf;

pub async fn prepare_break(
    pool: &SqlitePool,
    config: &Config,
    client: &reqwest::Client,
    playout: &PlayoutClient,
    is_breaking: bool,
    breaking_note: Option<&str>,
    recent_tracks: Option<&[String]>,
) -> anyhow::Result<()> {
    let t0 = std::time::Instant::now();
    let now = Utc::now();
    let break_id = format!(
        "brk_{}_{:04}",
        now.format("%Y%m%d_%H%M%S"),
        now.timestamp_subsec_micros() / 100
    );

    let settings = Settings::load(pool).await?;

    // Admission gate: at most one non-breaking PREPARING entry at a time.
    if !is_breaking {
        if let Some(existing) = break_queue::get_preparing_break(pool).await? {
            tracing::info!(existing = %existing.id, "already preparing a break, skipping");
            return Ok(());
        }
    }

    let host = match host_rotation::get_next_host(pool, is_breaking).await? {
        Some(h) => h,
        None => {
            tracing::warn!("no host available, aborting break build");
            return Ok(());
        }
    };

    break_queue::create_break(
        pool,
        &break_id,
        if is_breaking { BreakType::Breaking } else { BreakType::Scheduled },
        Some(&host.id),
    )
    .await?;

    // 1. Weather + market, fetched concurrently.
    let (weather_data, market_data) = tokio::join!(
        weather::get_weather_for_cities(pool, config, client),
        market::get_market_snapshot(pool, &settings, client),
    );
    let weather_data = weather_data.unwrap_or_else(|e| {
        tracing::warn!(error = %e, "weather fetch error");
        Vec::new()
    });
    let market_data = market_data.unwrap_or_else(|e| {
        tracing::warn!(error = %e, "market fetch error");
        None
    });

    // 2. News: fetch, score, select.
    let headlines = build_headline_selection(pool, config, client, &settings).await;

    // 3. Generate script.
    let (min_words, max_words) = if is_breaking {
        (settings.breaking_min_words, settings.breaking_max_words)
    } else {
        (settings.break_min_words, settings.break_max_words)
    };

    let use_dialog = settings.dialog_mode && !settings.dialog_participants.is_empty();

    let mut deg_level: i64 = 0;
    let mut dialog_script: Option<Script> = None;
    let mut dialog_characters: Vec<Character> = Vec::new();
    let mut script = if use_dialog {
        dialog_characters = load_characters_ordered(pool, &settings.dialog_participants).await;
        let topic_context =
            lm::format_context(&weather_data, &headlines, market_data.as_ref(), recent_tracks);
        match lm::generate_dialog_script(config, client, &topic_context, &dialog_characters).await {
            Ok(s) => {
                let text = dialog_text(&s);
                dialog_script = Some(s);
                Some(text)
            }
            Err(e) => {
                tracing::warn!(error = %e, "dialog script generation failed, falling back to monologue");
                None
            }
        }
    } else {
        None
    };

    if script.is_none() {
        script = match lm::generate_break_script(
            config,
            client,
            pool,
            &weather_data,
            &headlines,
            market_data.as_ref(),
            &host,
            &settings.master_prompt,
            is_breaking,
            breaking_note,
            recent_tracks,
        )
        .await
        {
            Ok(s) => Some(s),
            Err(e) => {
                tracing::warn!(error = %e, "script generation failed, falling back");
                None
            }
        };
    }

    // 4. Fallback if the LM failed.
    if script.is_none() {
        match degradation::fallback_script(pool, &weather_data).await? {
            Some(fallback) => {
                script = Some(fallback);
                deg_level = 2;
            }
            None => {
                if let Some(sting) = degradation::sting_path(&config.stings_dir, "station_id") {
                    return finish_with_sting(pool, playout, &break_id, &sting, t0).await;
                }
                break_queue::mark_failed(pool, &break_id, "all fallbacks exhausted").await?;
                log_break(pool, &break_id, t0, 4, Some("all_fallbacks_failed")).await?;
                return Ok(());
            }
        }
    }
    let mut script = script.unwrap();

    // 5. Content filter.
    let bounds = ValidationBounds { min_words, max_words, max_chars: settings.break_max_chars };
    if let Err(rejection) = content_validator::validate(&script, is_breaking, &bounds) {
        tracing::warn!(reason = %rejection.reason(), "content filter rejected script, falling back");
        match degradation::fallback_script(pool, &weather_data).await? {
            Some(fallback) => {
                script = fallback;
                dialog_script = None;
                deg_level = 2;
            }
            None => {
                break_queue::mark_failed(pool, &break_id, &format!("filter: {}", rejection.reason())).await?;
                log_break(pool, &break_id, t0, deg_level, Some(&rejection.reason())).await?;
                return Ok(());
            }
        }
    }

    // 6. Speech synthesis. Dialog mode synthesizes per line then concatenates
    // losslessly (spec.md §4.2 step 8); monologue mode synthesizes once.
    let audio_path = if let Some(ref mut dscript) = dialog_script {
        synthesize_dialog_audio(config, &settings, client, dscript, &host, &break_id, &dialog_characters).await
    } else {
        speech::synthesize(config, &settings, client, &script, &host, &break_id).await
    };
    let Some(audio_path) = audio_path else {
        tracing::warn!("TTS failed, trying sting fallback");
        if let Some(sting) = degradation::sting_path(&config.stings_dir, "station_id") {
            return finish_with_sting(pool, playout, &break_id, &sting, t0).await;
        }
        break_queue::mark_failed(pool, &break_id, "TTS failed, no sting").await?;
        log_break(pool, &break_id, t0, 4, Some("tts_failed")).await?;
        return Ok(());
    };

    // 7. Optional video render. Non-fatal: a render failure still airs the
    // audio-only break (spec.md §4.2 step 9).
    let video_path = if settings.video_enabled {
        let render_script = match dialog_script.clone() {
            Some(s) => Some(s),
            None => {
                let mut s = Script::monologue(&host.id, &script);
                match crate::visual::ffmpeg_utils::probe_duration_ms(&config.probe_bin, &audio_path).await {
                    Ok(ms) => {
                        let line = &mut s.scenes[0].lines[0];
                        line.audio_path = Some(audio_path.to_string_lossy().into_owned());
                        line.duration_ms = ms;
                        Some(s)
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, "couldn't probe monologue audio duration, skipping video");
                        None
                    }
                }
            }
        };
        match render_script {
            Some(s) => render_video(config, &s, &break_id).await,
            None => None,
        }
    } else {
        None
    };

    // 8. Mark ready + push to playout.
    let elapsed_ms = t0.elapsed().as_millis() as i64;
    let meta = BreakMeta {
        host: host.id.clone(),
        headlines: headlines.len(),
        headline_ids: headlines.iter().map(|h| h.id.clone()).collect(),
        weather_cities: weather_data.len(),
        market: market_data.is_some(),
        dialog: dialog_script.is_some(),
        video: video_path.is_some(),
        error: None,
    };

    break_queue::mark_ready(
        pool,
        &break_id,
        &script,
        audio_path.to_string_lossy().as_ref(),
        video_path.as_ref().map(|p| p.to_string_lossy()).as_deref(),
        deg_level,
        Some(elapsed_ms),
        &meta,
    )
    .await?;

    let pushed = playout.push_break(audio_path.to_string_lossy().as_ref()).await;
    playout.reset_counter().await;

    if pushed {
        break_queue::mark_played(pool, &break_id).await?;
    }

    log_break(pool, &break_id, t0, deg_level, None).await?;
    tracing::info!(
        break_id = %break_id,
        pushed,
        elapsed_ms,
        deg_level,
        "break build finished"
    );

    Ok(())
}

async fn build_headline_selection(
    pool: &SqlitePool,
    config: &Config,
    client: &reqwest::Client,
    settings: &Settings,
) -> Vec<crate::models::SelectedHeadline> {
    if let Err(e) = news::fetch_all_feeds(pool, client).await {
        tracing::warn!(error = %e, "news feed fetch error");
    }

    let unscored = match news::get_recent_unscored(pool, 20).await {
        Ok(u) => u,
        Err(e) => {
            tracing::warn!(error = %e, "unscored headline query failed");
            Vec::new()
        }
    };

    if !unscored.is_empty() {
        let scores = lm::score_headlines(config, client, pool, &unscored).await;
        for (idx, score, category, _is_breaking) in scores {
            if let Some(h) = unscored.get(idx) {
                if let Err(e) = news::mark_scored(pool, &h.id, score, category.as_deref()).await {
                    tracing::warn!(error = %e, "mark_scored failed");
                }
            }
        }
    }

    let recent_ids = break_queue::get_recent_headline_ids(pool, 2).await.unwrap_or_default();

    news::get_top_headlines(pool, 3, settings.news_dedupe_window_minutes as i64, &recent_ids)
        .await
        .unwrap_or_default()
}

/// Flattens a dialog script into the plain text the content validator and
/// `break_queue.script_text` column see, in speaking order.
fn dialog_text(script: &Script) -> String {
    script
        .scenes
        .iter()
        .flat_map(|s| &s.lines)
        .map(|l| l.text.as_str())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Synthesizes each dialog line with its character's voice, then concatenates
/// the per-line MP3s losslessly into one break track. Fills in `audio_path`/
/// `duration_ms` on each line in place so `render_video` can build segments
/// from them directly. Grounded on spec.md §4.2 step 8.
async fn synthesize_dialog_audio(
    config: &Config,
    settings: &Settings,
    client: &reqwest::Client,
    script: &mut Script,
    host: &Host,
    break_id: &str,
    characters: &[Character],
) -> Option<PathBuf> {
    let characters: std::collections::HashMap<String, &Character> =
        characters.iter().map(|c| (c.id.clone(), c)).collect();
    let line_dir = config.breaks_dir.join(format!("{break_id}_lines"));
    if tokio::fs::create_dir_all(&line_dir).await.is_err() {
        return None;
    }

    let mut line_paths = Vec::new();
    let mut idx = 0usize;
    for scene in script.scenes.iter_mut() {
        for line in scene.lines.iter_mut() {
            let voice_id = characters
                .get(&line.character)
                .map(|c| c.voice_id.as_str())
                .unwrap_or(host.tts_voice_id.as_str());
            let line_host = Host {
                id: host.id.clone(),
                label: host.label.clone(),
                personality_prompt: String::new(),
                is_breaking_host: host.is_breaking_host,
                tts_provider: host.tts_provider.clone(),
                tts_voice_id: voice_id.to_string(),
                local_model_name: host.local_model_name.clone(),
                enabled: host.enabled,
            };
            let output_id = format!("{break_id}_lines/line_{idx:03}");
            let path = speech::synthesize(config, settings, client, &line.text, &line_host, &output_id).await?;

            let duration_ms = crate::visual::ffmpeg_utils::probe_duration_ms(&config.probe_bin, &path)
                .await
                .unwrap_or(0);
            line.audio_path = Some(path.to_string_lossy().into_owned());
            line.duration_ms = duration_ms;
            line_paths.push(path);
            idx += 1;
        }
    }

    if line_paths.is_empty() {
        return None;
    }

    let final_path = config.breaks_dir.join(format!("{break_id}.mp3"));
    let result = concat_audio_lossless(&config.encoder_bin, &line_paths, &final_path).await;

    for path in &line_paths {
        let _ = tokio::fs::remove_file(path).await;
    }
    let _ = tokio::fs::remove_dir(&line_dir).await;

    match result {
        Ok(()) => Some(final_path),
        Err(e) => {
            tracing::warn!(error = %e, "dialog audio concat failed");
            None
        }
    }
}

/// Loads the characters named by `ids`, preserving `ids`' order, so dialog
/// generation and per-line voice lookup see participants in the configured
/// speaking order. A name with no matching `characters` row still gets a
/// seat at the table — with a neutral, empty-`behavior_prompt` placeholder —
/// rather than silently dropping the participant.
async fn load_characters_ordered(pool: &SqlitePool, ids: &[String]) -> Vec<Character> {
    if ids.is_empty() {
        return Vec::new();
    }
    let placeholders = ids.iter().map(|_| "?").collect::<Vec<_>>().join(",");
    let query = format!(
        "SELECT id, label, gender, age, behavior_prompt, voice_id, host_id, position_x, \
         position_y, scale, positions_json, enabled FROM characters WHERE id IN ({placeholders})"
    );
    let mut q = sqlx::query_as::<_, Character>(&query);
    for id in ids {
        q = q.bind(id);
    }
    let found: std::collections::HashMap<String, Character> = match q.fetch_all(pool).await {
        Ok(rows) => rows.into_iter().map(|c| (c.id.clone(), c)).collect(),
        Err(e) => {
            tracing::warn!(error = %e, "character lookup failed");
            Default::default()
        }
    };

    ids.iter()
        .map(|id| {
            found.get(id).cloned().unwrap_or_else(|| Character {
                id: id.clone(),
                label: id.clone(),
                gender: String::new(),
                age: 0,
                behavior_prompt: String::new(),
                voice_id: String::new(),
                host_id: String::new(),
                position_x: 0.5,
                position_y: 0.85,
                scale: 0.9,
                positions_json: "{}".to_string(),
                enabled: true,
            })
        })
        .collect()
}

/// Builds the EDL from a duration-filled dialog/monologue script and renders
/// it to MP4 via the compositor. Any failure here (missing assets, encoder
/// error) is logged and swallowed — video is best-effort, the audio-only
/// break still airs (spec.md §4.2 step 9).
async fn render_video(config: &Config, script: &Script, break_id: &str) -> Option<PathBuf> {
    let mut assets = visual::AssetPack::new(config.assets_dir.clone());
    if let Err(e) = assets.load(&script.characters) {
        tracing::warn!(error = %e, "asset pack load failed, skipping video");
        return None;
    }

    let mut rng = rand::thread_rng();
    let edl = visual::generate_edl(script, &mut rng);

    let work_dir = config.video_dir.join(break_id);
    let output = config.video_dir.join(format!("{break_id}.mp4"));
    let compositor_config = CompositorConfig {
        encoder_bin: config.encoder_bin.clone(),
        probe_bin: config.probe_bin.clone(),
    };

    let result = visual::render_edl(&edl, &assets, &work_dir, &output, &compositor_config).await;
    let _ = tokio::fs::remove_dir_all(&work_dir).await;

    match result {
        Ok(()) => Some(output),
        Err(e) => {
            tracing::warn!(error = %e, "video render failed");
            None
        }
    }
}

async fn finish_with_sting(
    pool: &SqlitePool,
    playout: &PlayoutClient,
    break_id: &str,
    sting: &std::path::Path,
    t0: std::time::Instant,
) -> anyhow::Result<()> {
    let meta = BreakMeta::default();
    break_queue::mark_ready(pool, break_id, "", sting.to_string_lossy().as_ref(), None, 3, None, &meta).await?;
    playout.push_break(sting.to_string_lossy().as_ref()).await;
    log_break(pool, break_id, t0, 3, None).await?;
    Ok(())
}

async fn log_break(
    pool: &SqlitePool,
    break_id: &str,
    t0: std::time::Instant,
    deg_level: i64,
    error: Option<&str>,
) -> anyhow::Result<()> {
    let elapsed_ms = t0.elapsed().as_millis() as i64;
    let event_type = if error.is_some() { "break_failed" } else { "break_ready" };
    let mut payload = serde_json::json!({ "break_id": break_id, "degradation_level": deg_level });
    if let Some(e) = error {
        payload["error"] = serde_json::Value::String(e.to_string());
    }

    sqlx::query("INSERT INTO events_log (event_type, payload_json, latency_ms) VALUES (?, ?, ?)")
        .bind(event_type)
        .bind(payload.to_string())
        .bind(elapsed_ms)
        .execute(pool)
        .await?;
    Ok(())
}
