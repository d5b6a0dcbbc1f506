//! Minimal raster drawing on [`Frame`]s: rectangles and bitmap text.
//!
//! All coordinates are signed and clipped to the frame, so callers can
//! draw partially off-screen shapes without checking bounds.
use crate::shared::frame::Frame;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Color(pub u8, pub u8, pub u8);

impl Color {
    pub const BLACK: Color = Color(0, 0, 0);
    pub const WHITE: Color = Color(255, 255, 255);
    pub const RED: Color = Color(255, 0, 0);
    pub const GREEN: Color = Color(0, 255, 0);
    pub const YELLOW: Color = Color(255, 255, 0);
}

const GLYPH_W: i32 = 5;
const GLYPH_H: i32 = 7;
/// Horizontal advance per character, in unscaled pixels.
const ADVANCE: i32 = GLYPH_W + 1;

fn set_pixel(frame: &mut Frame, x: i32, y: i32, color: Color) {
    let (w, h) = frame.bounds();
    if x < 0 || y < 0 || x >= w || y >= h {
        return;
    }
    let c = frame.channels() as usize;
    let i = (y as usize * w as usize + x as usize) * c;
    let data = frame.data_mut();
    if c >= 3 {
        data[i] = color.0;
        data[i + 1] = color.1;
        data[i + 2] = color.2;
    } else if c > 0 {
        let luma = 0.299 * color.0 as f32 + 0.587 * color.1 as f32 + 0.114 * color.2 as f32;
        data[i] = luma.round() as u8;
    }
}

/// Fills `[x0, x1) x [y0, y1)`.
pub fn fill_rect(frame: &mut Frame, x0: i32, y0: i32, x1: i32, y1: i32, color: Color) {
    let (w, h) = frame.bounds();
    let (xa, xb) = (x0.max(0), x1.min(w));
    let (ya, yb) = (y0.max(0), y1.min(h));
    for y in ya..yb {
        for x in xa..xb {
            set_pixel(frame, x, y, color);
        }
    }
}

/// Outlines `[x0, x1) x [y0, y1)` with lines `thickness` pixels wide,
/// drawn inward from the edge.
pub fn stroke_rect(
    frame: &mut Frame,
    x0: i32,
    y0: i32,
    x1: i32,
    y1: i32,
    color: Color,
    thickness: i32,
) {
    let t = thickness.max(1);
    fill_rect(frame, x0, y0, x1, (y0 + t).min(y1), color);
    fill_rect(frame, x0, (y1 - t).max(y0), x1, y1, color);
    fill_rect(frame, x0, y0, (x0 + t).min(x1), y1, color);
    fill_rect(frame, (x1 - t).max(x0), y0, x1, y1, color);
}

/// Pixel size of `text` rendered at `scale`.
pub fn text_size(text: &str, scale: i32) -> (i32, i32) {
    let n = text.chars().count() as i32;
    if n == 0 {
        return (0, 0);
    }
    ((n * ADVANCE - 1) * scale, GLYPH_H * scale)
}

/// Renders `text` with its top-left corner at `(x, y)`.
///
/// Lowercase letters are drawn as uppercase; characters without a glyph
/// are drawn as `?`.
pub fn draw_text(frame: &mut Frame, x: i32, y: i32, text: &str, color: Color, scale: i32) {
    let s = scale.max(1);
    for (i, ch) in text.chars().enumerate() {
        let rows = glyph(ch);
        let gx = x + i as i32 * ADVANCE * s;
        for (row, bits) in rows.iter().enumerate() {
            for col in 0..GLYPH_W {
                if bits & (0x10 >> col) != 0 {
                    let px = gx + col * s;
                    let py = y + row as i32 * s;
                    fill_rect(frame, px, py, px + s, py + s, color);
                }
            }
        }
    }
}

fn glyph(ch: char) -> [u8; 7] {
    match ch.to_ascii_uppercase() {
        'A' => [0x0E, 0x11, 0x11, 0x1F, 0x11, 0x11, 0x11],
        'B' => [0x1E, 0x11, 0x11, 0x1E, 0x11, 0x11, 0x1E],
        'C' => [0x0E, 0x11, 0x10, 0x10, 0x10, 0x11, 0x0E],
        'D' => [0x1C, 0x12, 0x11, 0x11, 0x11, 0x12, 0x1C],
        'E' => [0x1F, 0x10, 0x10, 0x1E, 0x10, 0x10, 0x1F],
        'F' => [0x1F, 0x10, 0x10, 0x1E, 0x10, 0x10, 0x10],
        'G' => [0x0E, 0x11, 0x10, 0x17, 0x11, 0x11, 0x0F],
        'H' => [0x11, 0x11, 0x11, 0x1F, 0x11, 0x11, 0x11],
        'I' => [0x0E, 0x04, 0x04, 0x04, 0x04, 0x04, 0x0E],
        'J' => [0x07, 0x02, 0x02, 0x02, 0x02, 0x12, 0x0C],
        'K' => [0x11, 0x12, 0x14, 0x18, 0x14, 0x12, 0x11],
        'L' => [0x10, 0x10, 0x10, 0x10, 0x10, 0x10, 0x1F],
        'M' => [0x11, 0x1B, 0x15, 0x15, 0x11, 0x11, 0x11],
        'N' => [0x11, 0x11, 0x19, 0x15, 0x13, 0x11, 0x11],
        'O' => [0x0E, 0x11, 0x11, 0x11, 0x11, 0x11, 0x0E],
        'P' => [0x1E, 0x11, 0x11, 0x1E, 0x10, 0x10, 0x10],
        'Q' => [0x0E, 0x11, 0x11, 0x11, 0x15, 0x12, 0x0D],
        'R' => [0x1E, 0x11, 0x11, 0x1E, 0x14, 0x12, 0x11],
        'S' => [0x0F, 0x10, 0x10, 0x0E, 0x01, 0x01, 0x1E],
        'T' => [0x1F, 0x04, 0x04, 0x04, 0x04, 0x04, 0x04],
        'U' => [0x11, 0x11, 0x11, 0x11, 0x11, 0x11, 0x0E],
        'V' => [0x11, 0x11, 0x11, 0x11, 0x11, 0x0A, 0x04],
        'W' => [0x11, 0x11, 0x11, 0x15, 0x15, 0x15, 0x0A],
        'X' => [0x11, 0x11, 0x0A, 0x04, 0x0A, 0x11, 0x11],
        'Y' => [0x11, 0x11, 0x11, 0x0A, 0x04, 0x04, 0x04],
        'Z' => [0x1F, 0x01, 0x02, 0x04, 0x08, 0x10, 0x1F],
        '0' => [0x0E, 0x11, 0x13, 0x15, 0x19, 0x11, 0x0E],
        '1' => [0x04, 0x0C, 0x04, 0x04, 0x04, 0x04, 0x0E],
        '2' => [0x0E, 0x11, 0x01, 0x02, 0x04, 0x08, 0x1F],
        '3' => [0x1F, 0x02, 0x04, 0x02, 0x01, 0x11, 0x0E],
        '4' => [0x02, 0x06, 0x0A, 0x12, 0x1F, 0x02, 0x02],
        '5' => [0x1F, 0x10, 0x1E, 0x01, 0x01, 0x11, 0x0E],
        '6' => [0x06, 0x08, 0x10, 0x1E, 0x11, 0x11, 0x0E],
        '7' => [0x1F, 0x01, 0x02, 0x04, 0x08, 0x08, 0x08],
        '8' => [0x0E, 0x11, 0x11, 0x0E, 0x11, 0x11, 0x0E],
        '9' => [0x0E, 0x11, 0x11, 0x0F, 0x01, 0x02, 0x0C],
        ' ' => [0x00; 7],
        ':' => [0x00, 0x0C, 0x0C, 0x00, 0x0C, 0x0C, 0x00],
        '.' => [0x00, 0x00, 0x00, 0x00, 0x00, 0x0C, 0x0C],
        ',' => [0x00, 0x00, 0x00, 0x00, 0x0C, 0x04, 0x08],
        '!' => [0x04, 0x04, 0x04, 0x04, 0x04, 0x00, 0x04],
        '-' => [0x00, 0x00, 0x00, 0x1F, 0x00, 0x00, 0x00],
        '_' => [0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x1F],
        '/' => [0x00, 0x01, 0x02, 0x04, 0x08, 0x10, 0x00],
        '(' => [0x02, 0x04, 0x08, 0x08, 0x08, 0x04, 0x02],
        ')' => [0x08, 0x04, 0x02, 0x02, 0x02, 0x04, 0x08],
        '%' => [0x18, 0x19, 0x02, 0x04, 0x08, 0x13, 0x03],
        '\'' => [0x04, 0x04, 0x08, 0x00, 0x00, 0x00, 0x00],
        _ => [0x0E, 0x11, 0x01, 0x02, 0x04, 0x00, 0x04],
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pixel(frame: &Frame, x: u32, y: u32) -> [u8; 3] {
        let i = ((y * frame.width() + x) * 3) as usize;
        let d = frame.data();
        [d[i], d[i + 1], d[i + 2]]
    }

    fn count_color(frame: &Frame, color: Color) -> usize {
        frame
            .data()
            .chunks_exact(3)
            .filter(|p| p[0] == color.0 && p[1] == color.1 && p[2] == color.2)
            .count()
    }

    #[test]
    fn test_fill_rect_is_clipped() {
        let mut frame = Frame::filled(10, 10, [0, 0, 0], 0);
        fill_rect(&mut frame, -5, -5, 3, 2, Color::WHITE);
        assert_eq!(count_color(&frame, Color::WHITE), 6);
        assert_eq!(pixel(&frame, 2, 1), [255, 255, 255]);
        assert_eq!(pixel(&frame, 3, 1), [0, 0, 0]);
    }

    #[test]
    fn test_stroke_rect_leaves_interior() {
        let mut frame = Frame::filled(20, 20, [0, 0, 0], 0);
        stroke_rect(&mut frame, 2, 2, 12, 12, Color::GREEN, 2);
        assert_eq!(pixel(&frame, 2, 2), [0, 255, 0]);
        assert_eq!(pixel(&frame, 11, 7), [0, 255, 0]);
        assert_eq!(pixel(&frame, 7, 7), [0, 0, 0]);
        // 10x10 outer minus 6x6 inner
        assert_eq!(count_color(&frame, Color::GREEN), 64);
    }

    #[test]
    fn test_text_size_scales() {
        assert_eq!(text_size("FPS", 1), (17, 7));
        assert_eq!(text_size("FPS", 2), (34, 14));
        assert_eq!(text_size("", 2), (0, 0));
    }

    #[test]
    fn test_draw_text_stays_inside_its_box() {
        let mut frame = Frame::filled(60, 20, [0, 0, 0], 0);
        draw_text(&mut frame, 1, 1, "No Mask", Color::RED, 1);
        let (tw, th) = text_size("No Mask", 1);
        assert!(count_color(&frame, Color::RED) > 0);
        for y in 0..20 {
            for x in 0..60 {
                let inside = (1..1 + tw).contains(&(x as i32)) && (1..1 + th).contains(&(y as i32));
                if !inside {
                    assert_eq!(pixel(&frame, x, y), [0, 0, 0], "stray pixel at ({x}, {y})");
                }
            }
        }
    }

    #[test]
    fn test_lowercase_matches_uppercase() {
        let mut a = Frame::filled(40, 10, [0, 0, 0], 0);
        let mut b = a.clone();
        draw_text(&mut a, 0, 0, "mask", Color::WHITE, 1);
        draw_text(&mut b, 0, 0, "MASK", Color::WHITE, 1);
        assert_eq!(a, b);
    }

    #[test]
    fn test_draw_off_frame_is_ignored() {
        let mut frame = Frame::filled(10, 10, [0, 0, 0], 0);
        draw_text(&mut frame, 100, 100, "X", Color::WHITE, 3);
        assert_eq!(count_color(&frame, Color::WHITE), 0);
    }
}
