//! Director — converts a timed `Script` into an `Edl` (shot selection,
//! emotions, transitions).
//!
//! Grounded on `original_source/visual/director.py`. Randomness (transition
//! choice, reaction-shot roll, listener pick, reaction emotion) is factored
//! behind an injectable `rand::RngCore` per spec.md §9 so tests can seed
//! determinism instead of depending on thread-local randomness.

use crate::visual::config::*;
use crate::visual::models::{DialogLine, Edl, EDLSegment, Script, ShotType, Transition};
use rand::Rng;
use std::collections::HashMap;

pub fn generate_edl(script: &Script, rng: &mut impl Rng) -> Edl {
    let mut edl = Edl::default();
    let mut seg_id: u32 = 0;
    let mut is_first_scene = true;

    for scene in &script.scenes {
        let chars = &script.characters;
        let mut lines_since_wide: u32 = 0;

        let wide_ms = WIDE_SHOT_DURATION_MS;
        let transition = if is_first_scene { Transition::FadeBlack } else { pick_transition(rng) };
        let char_states: HashMap<String, String> =
            chars.iter().map(|c| (c.clone(), "neutral".to_string())).collect();

        edl.segments.push(EDLSegment {
            segment_id: seg_id,
            shot_type: ShotType::Wide,
            background_key: bg_key(&scene.background, "wide"),
            characters: chars.clone(),
            speaker: None,
            audio_path: None,
            duration_ms: wide_ms,
            dialog_text: String::new(),
            transition,
            character_states: char_states,
            listener: None,
        });
        seg_id += 1;
        is_first_scene = false;

        let mut prev_line: Option<&DialogLine> = None;

        for line in &scene.lines {
            if line.duration_ms <= 0 {
                continue;
            }

            let char_states: HashMap<String, String> = chars
                .iter()
                .map(|c| (c.clone(), if *c == line.character { line.emotion.clone() } else { "neutral".to_string() }))
                .collect();

            let shot_type = if let Some(hint) = line.camera_hint.as_deref() {
                match hint {
                    "closeup" => closeup_shot_type(&line.character, chars),
                    "twoshot" => ShotType::Twoshot,
                    "wide" => ShotType::Wide,
                    _ => closeup_shot_type(&line.character, chars),
                }
            } else if is_rapid_exchange(line, prev_line) {
                ShotType::Twoshot
            } else if lines_since_wide >= WIDE_SHOT_INTERVAL {
                let wide_dur = rng.gen_range(WIDE_SHOT_MIN_MS..=WIDE_SHOT_MAX_MS);
                edl.segments.push(EDLSegment {
                    segment_id: seg_id,
                    shot_type: ShotType::Wide,
                    background_key: bg_key(&scene.background, "wide"),
                    characters: chars.clone(),
                    speaker: None,
                    audio_path: None,
                    duration_ms: wide_dur,
                    dialog_text: String::new(),
                    transition: pick_transition(rng),
                    character_states: chars.iter().map(|c| (c.clone(), "neutral".to_string())).collect(),
                    listener: None,
                });
                seg_id += 1;
                lines_since_wide = 0;
                closeup_shot_type(&line.character, chars)
            } else {
                closeup_shot_type(&line.character, chars)
            };

            if shot_type == ShotType::Wide {
                lines_since_wide = 0;
            } else {
                lines_since_wide += 1;
            }

            let visible_chars = chars_for_shot(shot_type, &line.character, chars);
            let transition = pick_transition(rng);

            edl.segments.push(EDLSegment {
                segment_id: seg_id,
                shot_type,
                background_key: bg_key(&scene.background, shot_type.as_str()),
                characters: visible_chars,
                speaker: Some(line.character.clone()),
                audio_path: line.audio_path.clone(),
                duration_ms: line.duration_ms,
                dialog_text: line.text.clone(),
                transition,
                character_states: char_states,
                listener: None,
            });
            seg_id += 1;

            if should_insert_reaction(line, chars, rng) {
                if let Some(listener) = pick_listener(&line.character, chars, rng) {
                    let react_dur = rng.gen_range(REACTION_MIN_MS..=REACTION_MAX_MS);
                    let react_emotion = reaction_emotion(&line.emotion, rng);
                    let react_shot = closeup_shot_type(&listener, chars);
                    let mut react_states: HashMap<String, String> =
                        chars.iter().map(|c| (c.clone(), "neutral".to_string())).collect();
                    react_states.insert(listener.clone(), react_emotion);

                    edl.segments.push(EDLSegment {
                        segment_id: seg_id,
                        shot_type: react_shot,
                        background_key: bg_key(&scene.background, react_shot.as_str()),
                        characters: vec![listener.clone()],
                        speaker: None,
                        audio_path: None,
                        duration_ms: react_dur,
                        dialog_text: String::new(),
                        transition: Transition::Cut,
                        character_states: react_states,
                        listener: Some(listener),
                    });
                    seg_id += 1;
                }
            }

            prev_line = Some(line);
        }
    }

    tracing::info!(segments = edl.segments.len(), total_ms = edl.total_duration_ms(), "director produced EDL");
    edl
}

fn closeup_shot_type(character: &str, characters: &[String]) -> ShotType {
    if characters.len() < 2 {
        return ShotType::CloseupLeft;
    }
    let idx = characters.iter().position(|c| c == character).unwrap_or(0);
    if idx == 0 { ShotType::CloseupLeft } else { ShotType::CloseupRight }
}

fn pick_transition(rng: &mut impl Rng) -> Transition {
    let r: f64 = rng.gen();
    if r < TRANSITION_CUT {
        Transition::Cut
    } else if r < TRANSITION_CUT + TRANSITION_DISSOLVE {
        Transition::Dissolve
    } else {
        Transition::FadeBlack
    }
}

fn is_rapid_exchange(current: &DialogLine, prev: Option<&DialogLine>) -> bool {
    let Some(prev) = prev else { return false };
    if current.character == prev.character {
        return false;
    }
    prev.duration_ms <= RAPID_EXCHANGE_MS
}

fn should_insert_reaction(line: &DialogLine, characters: &[String], rng: &mut impl Rng) -> bool {
    if characters.len() < 2 {
        return false;
    }
    if line.duration_ms < 3000 {
        return false;
    }
    rng.gen::<f64>() < REACTION_PROBABILITY
}

fn pick_listener(speaker: &str, characters: &[String], rng: &mut impl Rng) -> Option<String> {
    let others: Vec<&String> = characters.iter().filter(|c| c.as_str() != speaker).collect();
    if others.is_empty() {
        return None;
    }
    Some(others[rng.gen_range(0..others.len())].clone())
}

fn reaction_emotion(speaker_emotion: &str, rng: &mut impl Rng) -> String {
    let options: &[&str] = match speaker_emotion {
        "excited" => &["surprised", "neutral", "excited"],
        "concerned" => &["concerned", "neutral"],
        "surprised" => &["surprised", "neutral"],
        "sad" => &["concerned", "sad", "neutral"],
        _ => &["neutral"],
    };
    options[rng.gen_range(0..options.len())].to_string()
}

fn bg_key(base: &str, shot_type: &str) -> String {
    format!("{base}_{shot_type}")
}

fn chars_for_shot(shot_type: ShotType, speaker: &str, characters: &[String]) -> Vec<String> {
    match shot_type {
        ShotType::Wide | ShotType::Twoshot => characters.to_vec(),
        _ => vec![speaker.to_string()],
    }
}
