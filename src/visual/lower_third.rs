//! Lower-third text overlays: speaker name tag + optional headline bar.
//!
//! Grounded on `original_source/visual/lower_third.py`. `ab_glyph` replaces
//! Pillow's `ImageFont`/`ImageDraw.text` — this crate rasterizes glyphs
//! directly onto the `image::RgbaImage` buffer instead of delegating to a
//! font-drawing helper, since `image` alone has no text layout support.

use crate::visual::config::{HEIGHT, WIDTH};
use ab_glyph::{Font, FontRef, Glyph, Point, ScaleFont};
use image::{Rgba, RgbaImage};

const MARGIN_LEFT: i64 = 80;
const MARGIN_BOTTOM: i64 = 100;
const BAR_HEIGHT: i64 = 70;
const NAME_BAR_WIDTH: i64 = 350;
const HEADLINE_BAR_WIDTH: i64 = 900;
const HEADLINE_BAR_HEIGHT: i64 = 45;
const BAR_RADIUS: i64 = 8;
const BAR_COLOR: Rgba<u8> = Rgba([20, 20, 40, 200]);
const ACCENT_COLOR: Rgba<u8> = Rgba([220, 50, 50, 255]);
const ACCENT_WIDTH: i64 = 6;
const NAME_COLOR: Rgba<u8> = Rgba([255, 255, 255, 255]);
const HEADLINE_COLOR: Rgba<u8> = Rgba([200, 200, 200, 255]);
const FONT_SIZE_NAME: f32 = 30.0;
const FONT_SIZE_HEADLINE: f32 = 22.0;
const MAX_HEADLINE_CHARS: usize = 60;

/// System font candidates, tried in order; mirrors
/// `original_source/visual/lower_third.py::_get_font`'s DejaVu/FreeSans search.
const FONT_CANDIDATES: &[&str] = &[
    "/usr/share/fonts/truetype/dejavu/DejaVuSans.ttf",
    "/usr/share/fonts/truetype/freefont/FreeSans.ttf",
];
const FONT_BOLD_CANDIDATES: &[&str] = &[
    "/usr/share/fonts/truetype/dejavu/DejaVuSans-Bold.ttf",
    "/usr/share/fonts/truetype/freefont/FreeSansBold.ttf",
];

fn load_font(candidates: &[&str]) -> Option<Vec<u8>> {
    candidates.iter().find_map(|path| std::fs::read(path).ok())
}

/// Draws the name tag and/or headline bar onto `frame` in place. A no-op if
/// neither is present, or if none of the system font candidates are installed
/// (the frame still renders — just without the text layer).
pub fn render_lower_third(frame: &mut RgbaImage, speaker_name: Option<&str>, headline: Option<&str>) {
    if speaker_name.is_none() && headline.is_none() {
        return;
    }

    let y_base = HEIGHT as i64 - MARGIN_BOTTOM - BAR_HEIGHT;

    if let Some(name) = speaker_name {
        draw_name_bar(frame, name, y_base);
    }
    if let Some(text) = headline {
        let y_headline = y_base + BAR_HEIGHT + 8;
        draw_headline_bar(frame, text, y_headline);
    }
}

fn draw_name_bar(frame: &mut RgbaImage, name: &str, y: i64) {
    let x = MARGIN_LEFT;
    fill_rect(frame, x, y, x + ACCENT_WIDTH, y + BAR_HEIGHT, ACCENT_COLOR);
    fill_rounded_rect(frame, x + ACCENT_WIDTH, y, x + NAME_BAR_WIDTH, y + BAR_HEIGHT, BAR_RADIUS, BAR_COLOR);

    let Some(bytes) = load_font(FONT_BOLD_CANDIDATES) else {
        tracing::warn!("no bold system font found, skipping name-tag text");
        return;
    };
    let Ok(font) = FontRef::try_from_slice(&bytes) else { return };
    let text_y = y + (BAR_HEIGHT - FONT_SIZE_NAME as i64) / 2;
    draw_text(frame, &font, &name.to_uppercase(), x + ACCENT_WIDTH + 20, text_y, FONT_SIZE_NAME, NAME_COLOR);
}

fn draw_headline_bar(frame: &mut RgbaImage, text: &str, y: i64) {
    let x = MARGIN_LEFT;
    fill_rounded_rect(frame, x, y, x + HEADLINE_BAR_WIDTH, y + HEADLINE_BAR_HEIGHT, BAR_RADIUS, BAR_COLOR);

    let display_text: String = if text.chars().count() > MAX_HEADLINE_CHARS {
        format!("{}...", text.chars().take(MAX_HEADLINE_CHARS).collect::<String>())
    } else {
        text.to_string()
    };

    let Some(bytes) = load_font(FONT_CANDIDATES) else {
        tracing::warn!("no system font found, skipping headline text");
        return;
    };
    let Ok(font) = FontRef::try_from_slice(&bytes) else { return };
    let text_y = y + (HEADLINE_BAR_HEIGHT - FONT_SIZE_HEADLINE as i64) / 2;
    draw_text(frame, &font, &display_text, x + 20, text_y, FONT_SIZE_HEADLINE, HEADLINE_COLOR);
}

fn fill_rect(frame: &mut RgbaImage, x0: i64, y0: i64, x1: i64, y1: i64, color: Rgba<u8>) {
    blend_rect(frame, x0, y0, x1, y1, color, |_, _| true);
}

fn fill_rounded_rect(frame: &mut RgbaImage, x0: i64, y0: i64, x1: i64, y1: i64, radius: i64, color: Rgba<u8>) {
    blend_rect(frame, x0, y0, x1, y1, color, move |px, py| {
        in_rounded_rect(px, py, x0, y0, x1, y1, radius)
    });
}

fn in_rounded_rect(px: i64, py: i64, x0: i64, y0: i64, x1: i64, y1: i64, radius: i64) -> bool {
    let corners = [(x0 + radius, y0 + radius), (x1 - radius, y0 + radius), (x0 + radius, y1 - radius), (x1 - radius, y1 - radius)];
    let in_corner_box = |cx: i64, cy: i64| -> bool {
        let dx = px - cx;
        let dy = py - cy;
        (dx * dx + dy * dy) as f64 <= (radius * radius) as f64
    };

    let near_left = px < x0 + radius;
    let near_right = px > x1 - radius;
    let near_top = py < y0 + radius;
    let near_bottom = py > y1 - radius;

    if near_left && near_top {
        return in_corner_box(corners[0].0, corners[0].1);
    }
    if near_right && near_top {
        return in_corner_box(corners[1].0, corners[1].1);
    }
    if near_left && near_bottom {
        return in_corner_box(corners[2].0, corners[2].1);
    }
    if near_right && near_bottom {
        return in_corner_box(corners[3].0, corners[3].1);
    }
    true
}

fn blend_rect(
    frame: &mut RgbaImage,
    x0: i64,
    y0: i64,
    x1: i64,
    y1: i64,
    color: Rgba<u8>,
    mask: impl Fn(i64, i64) -> bool,
) {
    let (w, h) = (frame.width() as i64, frame.height() as i64);
    for py in y0.max(0)..y1.min(h) {
        for px in x0.max(0)..x1.min(w) {
            if mask(px, py) {
                blend_pixel(frame, px as u32, py as u32, color);
            }
        }
    }
}

fn blend_pixel(frame: &mut RgbaImage, x: u32, y: u32, color: Rgba<u8>) {
    let alpha = color[3] as f32 / 255.0;
    if alpha >= 1.0 {
        frame.put_pixel(x, y, color);
        return;
    }
    let under = *frame.get_pixel(x, y);
    let blend = |c: u8, u: u8| -> u8 { (c as f32 * alpha + u as f32 * (1.0 - alpha)).round() as u8 };
    frame.put_pixel(
        x,
        y,
        Rgba([blend(color[0], under[0]), blend(color[1], under[1]), blend(color[2], under[2]), 255]),
    );
}

fn draw_text(frame: &mut RgbaImage, font: &FontRef, text: &str, x: i64, y: i64, size: f32, color: Rgba<u8>) {
    let scaled = font.as_scaled(size);
    let mut cursor_x = x as f32;
    let baseline_y = y as f32 + scaled.ascent();

    for ch in text.chars() {
        let glyph_id = font.glyph_id(ch);
        let glyph: Glyph = glyph_id.with_scale_and_position(size, Point { x: cursor_x, y: baseline_y });
        if let Some(outlined) = font.outline_glyph(glyph) {
            let bounds = outlined.px_bounds();
            outlined.draw(|gx, gy, coverage| {
                if coverage <= 0.0 {
                    return;
                }
                let px = bounds.min.x as i64 + gx as i64;
                let py = bounds.min.y as i64 + gy as i64;
                if px < 0 || py < 0 || px as u32 >= frame.width() || py as u32 >= frame.height() {
                    return;
                }
                let a = (color[3] as f32 * coverage) as u8;
                blend_pixel(frame, px as u32, py as u32, Rgba([color[0], color[1], color[2], a]));
            });
        }
        cursor_x += scaled.h_advance(glyph_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn render_is_a_no_op_when_nothing_to_draw() {
        let mut frame = RgbaImage::from_pixel(WIDTH, HEIGHT, Rgba([0, 0, 0, 0]));
        let before = frame.as_raw().clone();
        render_lower_third(&mut frame, None, None);
        assert_eq!(frame.as_raw(), &before);
    }

    #[test]
    fn render_with_name_only_draws_into_the_frame() {
        let mut frame = RgbaImage::from_pixel(WIDTH, HEIGHT, Rgba([0, 0, 0, 0]));
        let before = frame.as_raw().clone();
        render_lower_third(&mut frame, Some("Alex"), None);
        assert_ne!(frame.as_raw(), &before);
    }

    #[test]
    fn rounded_rect_includes_center_but_excludes_corner_pixels() {
        // 40x40 rect at origin with an 8px corner radius.
        assert!(in_rounded_rect(20, 20, 0, 0, 40, 40, 8));
        assert!(!in_rounded_rect(0, 0, 0, 0, 40, 40, 8));
    }

    #[test]
    fn blend_pixel_with_opaque_color_overwrites_destination() {
        let mut frame = RgbaImage::from_pixel(4, 4, Rgba([10, 10, 10, 255]));
        blend_pixel(&mut frame, 1, 1, Rgba([200, 0, 0, 255]));
        assert_eq!(*frame.get_pixel(1, 1), Rgba([200, 0, 0, 255]));
    }

    #[test]
    fn blend_pixel_with_transparent_color_leaves_destination_mostly_unchanged() {
        let mut frame = RgbaImage::from_pixel(4, 4, Rgba([10, 10, 10, 255]));
        blend_pixel(&mut frame, 1, 1, Rgba([200, 0, 0, 0]));
        assert_eq!(*frame.get_pixel(1, 1), Rgba([10, 10, 10, 255]));
    }

    #[test]
    fn headline_longer_than_max_chars_is_truncated_with_ellipsis() {
        let long = "x".repeat(MAX_HEADLINE_CHARS + 10);
        let truncated: String = if long.chars().count() > MAX_HEADLINE_CHARS {
            format!("{}...", long.chars().take(MAX_HEADLINE_CHARS).collect::<String>())
        } else {
            long.clone()
        };
        assert_eq!(truncated.chars().count(), MAX_HEADLINE_CHARS + 3);
        assert!(truncated.ends_with("..."));
    }
}
