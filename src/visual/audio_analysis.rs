//! Audio lip-sync — decode a line's audio, compute a per-frame talking/idle
//! bool mask from RMS energy.
//!
//! Grounded on `original_source/visual/audio_analysis.py`. Decoding reuses the
//! teacher's Symphonia probe/decode shape
//! (`examples/ethanbarclay-navidrome-radio/backend/src/services/audio_pipeline.rs::decode_audio`)
//! repurposed to mono output; like the original, the decoded mono signal is
//! resampled to a fixed 16kHz before RMS windowing (spec.md §4.13), via the
//! `rubato::FastFixedIn` converter pattern from
//! `examples/SinergaOptima-Dictum/dictum-core/src/audio/resample.rs`, run as a
//! single full-buffer call since this is offline, one-shot processing of a
//! complete clip rather than a streaming pipeline.

use crate::visual::config::{FPS, RMS_SMOOTHING_FRAMES, RMS_THRESHOLD};
use rubato::{FastFixedIn, PolynomialDegree, Resampler};
use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use std::fs::File;
use std::path::Path;

const TARGET_SAMPLE_RATE: u32 = 16_000;

/// Returns one bool per video frame at `fps` for the audio at `path`: `true`
/// means the mouth should be in the "talking" state. Empty on any decode
/// failure — callers fall back to an all-talking mask.
pub fn analyze_lipsync(path: &Path, fps: u32) -> Vec<bool> {
    let samples = match decode_mono(path) {
        Ok(s) => s,
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "lip-sync decode failed");
            return Vec::new();
        }
    };
    if samples.mono.is_empty() {
        return Vec::new();
    }

    let samples_per_frame = (TARGET_SAMPLE_RATE as f64 / fps as f64).round() as usize;
    if samples_per_frame == 0 {
        return Vec::new();
    }

    let total_frames = samples.mono.len() / samples_per_frame;
    if total_frames == 0 {
        return Vec::new();
    }

    let mut rms = Vec::with_capacity(total_frames);
    let mut max_rms: f32 = 0.0;
    for frame in 0..total_frames {
        let start = frame * samples_per_frame;
        let window = &samples.mono[start..start + samples_per_frame];
        let sum_sq: f32 = window.iter().map(|s| s * s).sum();
        let value = (sum_sq / samples_per_frame as f32).sqrt();
        max_rms = max_rms.max(value);
        rms.push(value);
    }

    if max_rms <= 0.0 {
        return vec![false; total_frames];
    }

    let talking: Vec<bool> = rms.iter().map(|v| (v / max_rms) > RMS_THRESHOLD).collect();
    smooth(talking, RMS_SMOOTHING_FRAMES)
}

/// Flips any run shorter than `min_run` frames (other than a leading run) to
/// match its predecessor, per spec.md §4.13/§8 ("no run of length 1 except
/// possibly at the first frame").
fn smooth(frames: Vec<bool>, min_run: usize) -> Vec<bool> {
    if frames.len() < 3 || min_run < 1 {
        return frames;
    }
    let mut result = frames.clone();
    let mut i = 0;
    while i < result.len() {
        let mut j = i + 1;
        while j < result.len() && result[j] == result[i] {
            j += 1;
        }
        let run_len = j - i;
        if run_len < min_run && i > 0 {
            let predecessor = result[i - 1];
            for slot in result.iter_mut().take(j).skip(i) {
                *slot = predecessor;
            }
        }
        i = j;
    }
    result
}

struct DecodedMono {
    mono: Vec<f32>,
}

/// Resamples a full mono buffer to [`TARGET_SAMPLE_RATE`] in one shot.
/// Passthrough when `source_rate` already matches.
fn resample_to_target(mono: Vec<f32>, source_rate: u32) -> anyhow::Result<Vec<f32>> {
    if source_rate == TARGET_SAMPLE_RATE || mono.is_empty() {
        return Ok(mono);
    }

    let ratio = TARGET_SAMPLE_RATE as f64 / source_rate as f64;
    let mut resampler = FastFixedIn::<f32>::new(ratio, 1.0, PolynomialDegree::Cubic, mono.len(), 1)?;
    let max_out = resampler.output_frames_max();
    let mut output_buf = vec![vec![0f32; max_out]; 1];

    let (_consumed, produced) = resampler.process_into_buffer(&[&mono[..]], &mut output_buf, None)?;
    output_buf[0].truncate(produced);
    Ok(output_buf.remove(0))
}

fn decode_mono(path: &Path) -> anyhow::Result<DecodedMono> {
    let file = File::open(path)?;
    let mss = MediaSourceStream::new(Box::new(file), Default::default());

    let probed = symphonia::default::get_probe().format(
        &Hint::new(),
        mss,
        &FormatOptions::default(),
        &MetadataOptions::default(),
    )?;
    let mut format = probed.format;

    let track = format
        .tracks()
        .iter()
        .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
        .ok_or_else(|| anyhow::anyhow!("no audio track found"))?;
    let track_id = track.id;
    let codec_params = track.codec_params.clone();
    let source_channels = codec_params.channels.map(|c| c.count()).unwrap_or(1);
    let sample_rate = codec_params.sample_rate.unwrap_or(44100);

    let mut decoder = symphonia::default::get_codecs().make(&codec_params, &DecoderOptions::default())?;

    let mut mono = Vec::new();
    loop {
        let packet = match format.next_packet() {
            Ok(p) => p,
            Err(symphonia::core::errors::Error::IoError(e))
                if e.kind() == std::io::ErrorKind::UnexpectedEof =>
            {
                break;
            }
            Err(e) => {
                tracing::warn!(error = %e, "error reading audio packet");
                break;
            }
        };
        if packet.track_id() != track_id {
            continue;
        }
        let decoded = match decoder.decode(&packet) {
            Ok(d) => d,
            Err(e) => {
                tracing::warn!(error = %e, "error decoding audio packet");
                continue;
            }
        };
        let spec = *decoded.spec();
        let mut buf = SampleBuffer::<f32>::new(decoded.capacity() as u64, spec);
        buf.copy_interleaved_ref(decoded);
        let interleaved = buf.samples();

        if source_channels <= 1 {
            mono.extend_from_slice(interleaved);
        } else {
            for chunk in interleaved.chunks(source_channels) {
                let sum: f32 = chunk.iter().sum();
                mono.push(sum / source_channels as f32);
            }
        }
    }

    let mono = resample_to_target(mono, sample_rate)?;
    Ok(DecodedMono { mono })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn smoothing_removes_short_runs_except_leading() {
        let input = vec![true, false, true, true, true, false, false, true, true];
        let result = smooth(input, RMS_SMOOTHING_FRAMES);
        // index 1 ("false" run of length 1 after a leading run) is flipped to match predecessor.
        assert_eq!(result[1], result[0]);
        // no run of length 1 remains except possibly at index 0.
        let mut i = 1;
        while i < result.len() {
            let mut j = i + 1;
            while j < result.len() && result[j] == result[i] {
                j += 1;
            }
            assert!(j - i >= RMS_SMOOTHING_FRAMES || j == result.len());
            i = j;
        }
    }

    #[test]
    fn fps_default_is_24() {
        assert_eq!(FPS, 24);
    }
}
