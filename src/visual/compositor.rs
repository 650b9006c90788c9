//! Compositor — renders an `Edl` to a single MP4 via PNG alpha-compositing per
//! segment plus the external encoder for image-to-video, concat and xfade.
//!
//! Grounded on `original_source/visual/compositor.py`. CPU-bound compositing
//! and the encoder subprocess calls are run via `tokio::task::spawn_blocking`
//! per spec.md §5/§9 so they don't starve the event loop's HTTP/DB work.

use crate::visual::assets::AssetPack;
use crate::visual::audio_analysis::analyze_lipsync;
use crate::visual::config::{DISSOLVE_DURATION_S, FADE_BLACK_DURATION_S, FPS, HEIGHT, WIDTH};
use crate::visual::ffmpeg_utils::{detect_encoder, encoder_args, probe_duration_ms, run_encoder};
use crate::visual::lower_third::render_lower_third;
use crate::visual::models::{Edl, EDLSegment, Transition};
use image::{imageops::FilterType, Rgba, RgbaImage};
use std::path::{Path, PathBuf};

pub struct CompositorConfig {
    pub encoder_bin: String,
    pub probe_bin: String,
}

/// Renders every segment to its own MP4 under `work_dir`, then concatenates
/// them (stream-copy if every transition is a cut, else an xfade re-encode)
/// into `output`.
pub async fn render_edl(
    edl: &Edl,
    assets: &AssetPack,
    work_dir: &Path,
    output: &Path,
    config: &CompositorConfig,
) -> anyhow::Result<()> {
    tokio::fs::create_dir_all(work_dir).await?;
    let encoder = detect_encoder(&config.encoder_bin).await;

    let mut segment_paths = Vec::with_capacity(edl.segments.len());
    for segment in &edl.segments {
        let path = render_segment(segment, assets, work_dir, encoder, config).await?;
        segment_paths.push(path);
    }

    let transitions: Vec<Transition> = edl.segments.iter().skip(1).map(|s| s.transition).collect();
    concatenate_segments(&segment_paths, output, work_dir, &transitions, encoder, config).await
}

async fn render_segment(
    segment: &EDLSegment,
    assets: &AssetPack,
    work_dir: &Path,
    encoder: &str,
    config: &CompositorConfig,
) -> anyhow::Result<PathBuf> {
    let seg_dir = work_dir.join(format!("seg_{:03}", segment.segment_id));
    tokio::fs::create_dir_all(&seg_dir).await?;
    let output_mp4 = seg_dir.join("segment.mp4");

    let bg_path = resolve_background(assets, segment).to_path_buf();

    if segment.audio_path.is_some() && segment.speaker.is_some() {
        render_with_audio(segment, assets, &bg_path, &seg_dir, encoder, &output_mp4, config).await?;
    } else {
        render_silent(segment, assets, &bg_path, &seg_dir, encoder, &output_mp4, config).await?;
    }
    Ok(output_mp4)
}

/// `background_key` is already `{base}_{shot_type}` (see `director::bg_key`); try
/// it verbatim first since shot-type strings themselves contain underscores
/// (`closeup_left`) and splitting naively would mangle a multi-word base.
fn resolve_background<'a>(assets: &'a AssetPack, segment: &EDLSegment) -> &'a Path {
    if let Some(p) = assets.backgrounds.get(&segment.background_key) {
        return p;
    }
    let suffix = format!("_{}", segment.shot_type.as_str());
    let base = segment.background_key.strip_suffix(&suffix).unwrap_or(&segment.background_key);
    assets.get_background(segment.shot_type.as_str(), base)
}

fn build_character_layers(
    segment: &EDLSegment,
    assets: &AssetPack,
    talking_state: bool,
) -> Vec<(PathBuf, f64, f64, f64)> {
    segment
        .characters
        .iter()
        .map(|cid| {
            let emotion = segment.character_states.get(cid).map(String::as_str).unwrap_or("neutral");
            let is_talking = segment.speaker.as_deref() == Some(cid.as_str()) && talking_state;
            let png = assets.get_character_png(cid, emotion, is_talking).to_path_buf();
            let (x, y, scale) = assets.get_character_position(cid, segment.shot_type.as_str());
            (png, x, y, scale)
        })
        .collect()
}

/// Composes a frame: background resized to canvas, each character pasted
/// bottom-center-anchored at its fractional position, then an optional
/// lower-third overlay. Pure CPU work — callers run this via `spawn_blocking`.
fn compose_frame(
    bg_path: &Path,
    characters: &[(PathBuf, f64, f64, f64)],
    speaker_name: Option<&str>,
    headline: Option<&str>,
) -> anyhow::Result<RgbaImage> {
    let bg = image::open(bg_path)?.to_rgba8();
    let mut canvas = image::imageops::resize(&bg, WIDTH, HEIGHT, FilterType::Lanczos3);

    for (char_path, px, py, scale) in characters {
        let char_img = image::open(char_path)?.to_rgba8();
        let cw = ((char_img.width() as f64) * scale).round() as u32;
        let ch = ((char_img.height() as f64) * scale).round() as u32;
        let resized = image::imageops::resize(&char_img, cw.max(1), ch.max(1), FilterType::Lanczos3);

        let x = (*px * WIDTH as f64 - cw as f64 / 2.0).round() as i64;
        let y = (*py * HEIGHT as f64 - ch as f64).round() as i64;
        overlay_alpha(&mut canvas, &resized, x, y);
    }

    render_lower_third(&mut canvas, speaker_name, headline);
    Ok(canvas)
}

/// Alpha-composites `src` onto `dst` at `(x, y)`, clipping to canvas bounds.
fn overlay_alpha(dst: &mut RgbaImage, src: &RgbaImage, x: i64, y: i64) {
    for sy in 0..src.height() {
        let dy = y + sy as i64;
        if dy < 0 || dy as u32 >= dst.height() {
            continue;
        }
        for sx in 0..src.width() {
            let dx = x + sx as i64;
            if dx < 0 || dx as u32 >= dst.width() {
                continue;
            }
            let src_px = *src.get_pixel(sx, sy);
            let alpha = src_px[3] as f32 / 255.0;
            if alpha <= 0.0 {
                continue;
            }
            if alpha >= 1.0 {
                dst.put_pixel(dx as u32, dy as u32, src_px);
                continue;
            }
            let under = *dst.get_pixel(dx as u32, dy as u32);
            let blend = |c: u8, u: u8| -> u8 { (c as f32 * alpha + u as f32 * (1.0 - alpha)).round() as u8 };
            dst.put_pixel(
                dx as u32,
                dy as u32,
                Rgba([blend(src_px[0], under[0]), blend(src_px[1], under[1]), blend(src_px[2], under[2]), 255]),
            );
        }
    }
}

async fn render_with_audio(
    segment: &EDLSegment,
    assets: &AssetPack,
    bg_path: &Path,
    seg_dir: &Path,
    encoder: &str,
    output_mp4: &Path,
    config: &CompositorConfig,
) -> anyhow::Result<()> {
    let speaker_label = segment
        .speaker
        .as_deref()
        .and_then(|s| assets.characters.get(s))
        .map(|c| c.label.clone());
    let headline = (!segment.dialog_text.is_empty()).then(|| segment.dialog_text.clone());

    let idle_layers = build_character_layers(segment, assets, false);
    let talking_layers = build_character_layers(segment, assets, true);

    let bg_owned = bg_path.to_path_buf();
    let speaker_label_c = speaker_label.clone();
    let headline_c = headline.clone();
    let idle_png = seg_dir.join("frame_idle.png");
    let talking_png = seg_dir.join("frame_talking.png");
    let idle_png_out = idle_png.clone();
    let talking_png_out = talking_png.clone();

    tokio::task::spawn_blocking(move || -> anyhow::Result<()> {
        let idle_frame = compose_frame(&bg_owned, &idle_layers, speaker_label_c.as_deref(), headline_c.as_deref())?;
        idle_frame.save(&idle_png_out)?;
        let talking_frame = compose_frame(&bg_owned, &talking_layers, speaker_label_c.as_deref(), headline_c.as_deref())?;
        talking_frame.save(&talking_png_out)?;
        Ok(())
    })
    .await??;

    let audio_path = segment.audio_path.clone().expect("checked by caller");
    let mut lipsync = analyze_lipsync(Path::new(&audio_path), FPS);
    if lipsync.is_empty() {
        let total_frames = ((segment.duration_ms as f64 * FPS as f64 / 1000.0).round() as usize).max(1);
        lipsync = vec![true; total_frames];
    }

    let concat_file = seg_dir.join("concat.txt");
    write_concat_file(&concat_file, &lipsync, &idle_png, &talking_png).await?;

    let enc_args = encoder_args(encoder);
    let mut args = vec![
        "-f".into(), "concat".into(), "-safe".into(), "0".into(), "-i".into(), concat_file.to_string_lossy().into_owned(),
        "-i".into(), audio_path,
        "-r".into(), FPS.to_string(),
    ];
    args.extend(enc_args);
    args.extend([
        "-c:a".into(), "aac".into(), "-b:a".into(), "128k".into(), "-ar".into(), "44100".into(), "-ac".into(), "2".into(),
        "-shortest".into(), "-movflags".into(), "+faststart".into(),
        output_mp4.to_string_lossy().into_owned(),
    ]);

    run_encoder(&config.encoder_bin, &args, &format!("render seg {} (audio)", segment.segment_id)).await
}

async fn render_silent(
    segment: &EDLSegment,
    assets: &AssetPack,
    bg_path: &Path,
    seg_dir: &Path,
    encoder: &str,
    output_mp4: &Path,
    config: &CompositorConfig,
) -> anyhow::Result<()> {
    let layers = build_character_layers(segment, assets, false);
    let bg_owned = bg_path.to_path_buf();
    let frame_png = seg_dir.join("frame.png");
    let frame_png_out = frame_png.clone();

    tokio::task::spawn_blocking(move || -> anyhow::Result<()> {
        let frame = compose_frame(&bg_owned, &layers, None, None)?;
        frame.save(&frame_png_out)?;
        Ok(())
    })
    .await??;

    let duration_s = segment.duration_ms as f64 / 1000.0;
    let enc_args = encoder_args(encoder);
    let mut args = vec![
        "-loop".into(), "1".into(), "-i".into(), frame_png.to_string_lossy().into_owned(),
        "-f".into(), "lavfi".into(), "-i".into(), "anullsrc=r=44100:cl=stereo".into(),
        "-t".into(), format!("{duration_s:.3}"),
        "-r".into(), FPS.to_string(),
    ];
    args.extend(enc_args);
    args.extend(["-c:a".into(), "aac".into(), "-b:a".into(), "128k".into(), "-movflags".into(), "+faststart".into(), output_mp4.to_string_lossy().into_owned()]);

    run_encoder(&config.encoder_bin, &args, &format!("render seg {} (silent {duration_s:.1}s)", segment.segment_id)).await
}

async fn write_concat_file(path: &Path, lipsync: &[bool], idle_png: &Path, talking_png: &Path) -> anyhow::Result<()> {
    let runs = run_length_encode(lipsync);
    let mut lines = vec!["ffconcat version 1.0".to_string()];
    for (is_talking, count) in &runs {
        let png = if *is_talking { talking_png } else { idle_png };
        let duration = *count as f64 / FPS as f64;
        lines.push(format!("file '{}'", png.display()));
        lines.push(format!("duration {duration:.6}"));
    }
    let last_talking = runs.last().map(|(t, _)| *t).unwrap_or(false);
    let last_png = if last_talking { talking_png } else { idle_png };
    lines.push(format!("file '{}'", last_png.display()));

    tokio::fs::write(path, lines.join("\n")).await?;
    Ok(())
}

fn run_length_encode(bools: &[bool]) -> Vec<(bool, usize)> {
    let mut runs = Vec::new();
    let Some(&first) = bools.first() else { return runs };
    let mut current = first;
    let mut count = 1;
    for &b in &bools[1..] {
        if b == current {
            count += 1;
        } else {
            runs.push((current, count));
            current = b;
            count = 1;
        }
    }
    runs.push((current, count));
    runs
}

async fn concatenate_segments(
    segment_paths: &[PathBuf],
    output: &Path,
    work_dir: &Path,
    transitions: &[Transition],
    encoder: &str,
    config: &CompositorConfig,
) -> anyhow::Result<()> {
    if segment_paths.is_empty() {
        anyhow::bail!("no segments to concatenate");
    }
    if segment_paths.len() == 1 {
        tokio::fs::copy(&segment_paths[0], output).await?;
        return Ok(());
    }

    let has_effects = transitions.iter().any(|t| *t != Transition::Cut);
    if has_effects {
        concatenate_with_transitions(segment_paths, output, transitions, encoder, config).await
    } else {
        concatenate_copy(segment_paths, output, work_dir, config).await
    }
}

async fn concatenate_copy(segment_paths: &[PathBuf], output: &Path, work_dir: &Path, config: &CompositorConfig) -> anyhow::Result<()> {
    let concat_file = work_dir.join("final_concat.txt");
    let lines: Vec<String> = segment_paths.iter().map(|p| format!("file '{}'", p.display())).collect();
    tokio::fs::write(&concat_file, lines.join("\n")).await?;

    let args = vec![
        "-f".to_string(), "concat".to_string(), "-safe".to_string(), "0".to_string(),
        "-i".to_string(), concat_file.to_string_lossy().into_owned(),
        "-c".to_string(), "copy".to_string(),
        "-movflags".to_string(), "+faststart".to_string(),
        output.to_string_lossy().into_owned(),
    ];
    run_encoder(&config.encoder_bin, &args, "concatenate (copy)").await
}

async fn concatenate_with_transitions(
    segment_paths: &[PathBuf],
    output: &Path,
    transitions: &[Transition],
    encoder: &str,
    config: &CompositorConfig,
) -> anyhow::Result<()> {
    let n = segment_paths.len();
    let mut durations = Vec::with_capacity(n);
    for p in segment_paths {
        let ms = probe_duration_ms(&config.probe_bin, p).await?;
        durations.push(ms as f64 / 1000.0);
    }

    let mut inputs = Vec::new();
    for p in segment_paths {
        inputs.push("-i".to_string());
        inputs.push(p.to_string_lossy().into_owned());
    }

    let mut v_filters = Vec::new();
    let mut a_filters = Vec::new();
    let mut combined_dur = durations[0];

    for i in 0..n - 1 {
        let t = transitions.get(i).copied().unwrap_or(Transition::Cut);
        let fade_dur = match t {
            Transition::Dissolve => DISSOLVE_DURATION_S,
            Transition::FadeBlack => FADE_BLACK_DURATION_S,
            Transition::Cut => 1.0 / FPS as f64,
        };
        let xfade_type = "fade";
        let offset = (combined_dur - fade_dur).max(0.01);

        let (v_in, a_in) = if i == 0 {
            ("[0:v][1:v]".to_string(), "[0:a][1:a]".to_string())
        } else {
            (format!("[vf{}][{}:v]", i - 1, i + 1), format!("[af{}][{}:a]", i - 1, i + 1))
        };
        let (v_out, a_out) = if i < n - 2 { (format!("[vf{i}]"), format!("[af{i}]")) } else { ("[vout]".to_string(), "[aout]".to_string()) };

        v_filters.push(format!("{v_in}xfade=transition={xfade_type}:duration={fade_dur:.3}:offset={offset:.3}{v_out}"));
        a_filters.push(format!("{a_in}acrossfade=d={fade_dur:.3}:c1=tri:c2=tri{a_out}"));

        combined_dur = combined_dur + durations[i + 1] - fade_dur;
    }

    let filter_complex = v_filters.into_iter().chain(a_filters).collect::<Vec<_>>().join(";");
    let enc_args = encoder_args(encoder);

    let mut args = inputs;
    args.push("-filter_complex".into());
    args.push(filter_complex);
    args.extend(["-map".into(), "[vout]".into(), "-map".into(), "[aout]".into(), "-r".into(), FPS.to_string()]);
    args.extend(enc_args);
    args.extend(["-c:a".into(), "aac".into(), "-b:a".into(), "128k".into(), "-movflags".into(), "+faststart".into(), output.to_string_lossy().into_owned()]);

    run_encoder(&config.encoder_bin, &args, &format!("concatenate ({n} segments, transitions)")).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn run_length_encode_collapses_consecutive_equal_runs() {
        let runs = run_length_encode(&[true, true, false, false, false, true]);
        assert_eq!(runs, vec![(true, 2), (false, 3), (true, 1)]);
    }

    #[test]
    fn run_length_encode_of_empty_slice_is_empty() {
        assert!(run_length_encode(&[]).is_empty());
    }

    #[test]
    fn run_length_encode_of_uniform_slice_is_one_run() {
        assert_eq!(run_length_encode(&[false, false, false]), vec![(false, 3)]);
    }

    #[tokio::test]
    async fn concat_file_duration_lines_sum_to_clip_length() {
        let dir = std::env::temp_dir().join(format!("break_studio_concat_{}", uuid::Uuid::new_v4()));
        tokio::fs::create_dir_all(&dir).await.unwrap();
        let concat_path = dir.join("concat.txt");
        let idle = dir.join("idle.png");
        let talking = dir.join("talking.png");

        let lipsync = vec![false, false, true, true, true, false];
        write_concat_file(&concat_path, &lipsync, &idle, &talking).await.unwrap();

        let content = tokio::fs::read_to_string(&concat_path).await.unwrap();
        let total_duration: f64 = content
            .lines()
            .filter_map(|l| l.strip_prefix("duration "))
            .map(|v| v.parse::<f64>().unwrap())
            .sum();

        let expected = lipsync.len() as f64 / FPS as f64;
        assert!(
            (total_duration - expected).abs() < 1e-6,
            "duration lines ({total_duration}) should sum to the full clip length ({expected})"
        );

        tokio::fs::remove_dir_all(&dir).await.ok();
    }

    #[test]
    fn concatenate_with_only_cuts_chooses_stream_copy_not_xfade() {
        let transitions = vec![Transition::Cut, Transition::Cut];
        assert!(!transitions.iter().any(|t| *t != Transition::Cut));
    }

    #[test]
    fn concatenate_with_any_effect_chooses_xfade_path() {
        let transitions = vec![Transition::Cut, Transition::Dissolve];
        assert!(transitions.iter().any(|t| *t != Transition::Cut));
    }
}
