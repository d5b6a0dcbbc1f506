use chrono::NaiveDateTime;

use crate::classification::domain::mask_classifier::MaskLabel;
use crate::monitoring::domain::alert_manager::Alert;
use crate::shared::frame::Frame;
use crate::shared::region::FaceRegion;

use super::canvas::{draw_text, fill_rect, stroke_rect, text_size, Color};

const TEXT_SCALE: i32 = 2;
const BOX_THICKNESS: i32 = 2;

const ALERT_ORIGIN: (i32, i32) = (50, 50);
const ALERT_SPACING: i32 = 40;

const PANEL_WIDTH: i32 = 300;
const PANEL_LINE_SPACING: i32 = 25;
const PANEL_MARGIN: i32 = 10;

/// Values shown in the bottom-left status panel.
#[derive(Clone, Debug, PartialEq)]
pub struct InfoPanel {
    pub fps: f64,
    pub violations: u64,
    pub model_active: bool,
    pub time: NaiveDateTime,
}

impl InfoPanel {
    fn lines(&self) -> [String; 4] {
        [
            format!("FPS: {:.1}", self.fps),
            format!("VIOLATIONS: {}", self.violations),
            format!(
                "MODEL: {}",
                if self.model_active { "ACTIVE" } else { "INACTIVE" }
            ),
            format!("TIME: {}", self.time.format("%H:%M:%S")),
        ]
    }
}

pub fn label_color(label: MaskLabel) -> Color {
    match label {
        MaskLabel::WithMask => Color::GREEN,
        MaskLabel::NoMask => Color::RED,
        MaskLabel::Unknown => Color::YELLOW,
    }
}

/// Outlines a face and writes `LABEL: 0.87` on a filled tab above it.
pub fn draw_face(frame: &mut Frame, region: &FaceRegion, label: MaskLabel, confidence: f64) {
    let color = label_color(label);
    let (x, y) = (region.x, region.y);
    stroke_rect(
        frame,
        x,
        y,
        x + region.width,
        y + region.height,
        color,
        BOX_THICKNESS,
    );

    let caption = format!("{label}: {confidence:.2}");
    let (tw, th) = text_size(&caption, TEXT_SCALE);
    // Tab flips inside the box when there is no room above it.
    let top = if y - th - 10 >= 0 { y - th - 10 } else { y };
    fill_rect(frame, x, top, x + tw + 4, top + th + 10, color);
    draw_text(frame, x + 2, top + 5, &caption, Color::WHITE, TEXT_SCALE);
}

/// Stacks alert banners from the top-left corner, one per alert.
pub fn draw_alerts(frame: &mut Frame, alerts: &[Alert]) {
    for (i, alert) in alerts.iter().enumerate() {
        let x = ALERT_ORIGIN.0;
        let y = ALERT_ORIGIN.1 + i as i32 * ALERT_SPACING;
        let (tw, th) = text_size(&alert.message, TEXT_SCALE);
        fill_rect(frame, x - 10, y - th - 10, x + tw + 10, y + 10, Color::BLACK);
        stroke_rect(frame, x - 10, y - th - 10, x + tw + 10, y + 10, Color::RED, 2);
        draw_text(frame, x, y - th, &alert.message, Color::RED, TEXT_SCALE);
    }
}

pub fn draw_info_panel(frame: &mut Frame, info: &InfoPanel) {
    let (_, h) = frame.bounds();
    let lines = info.lines();
    let panel_h = lines.len() as i32 * PANEL_LINE_SPACING + PANEL_MARGIN;
    let top = h - PANEL_MARGIN - panel_h;
    fill_rect(frame, PANEL_MARGIN, top, PANEL_WIDTH, h - PANEL_MARGIN, Color::BLACK);
    for (i, line) in lines.iter().enumerate() {
        let y = top + PANEL_MARGIN + i as i32 * PANEL_LINE_SPACING;
        draw_text(frame, PANEL_MARGIN + 10, y, line, Color::WHITE, TEXT_SCALE);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shared::clock::{Clock, ManualClock};
    use std::time::Instant;

    fn pixel(frame: &Frame, x: i32, y: i32) -> [u8; 3] {
        let i = ((y * frame.width() as i32 + x) * 3) as usize;
        let d = frame.data();
        [d[i], d[i + 1], d[i + 2]]
    }

    #[test]
    fn test_face_box_uses_label_color() {
        let mut frame = Frame::filled(200, 200, [0, 0, 0], 0);
        let region = FaceRegion::new(50, 80, 60, 60);
        draw_face(&mut frame, &region, MaskLabel::NoMask, 0.9);
        assert_eq!(pixel(&frame, 50, 139), [255, 0, 0]);
        assert_eq!(pixel(&frame, 109, 110), [255, 0, 0]);
        // interior untouched
        assert_eq!(pixel(&frame, 80, 120), [0, 0, 0]);
    }

    #[test]
    fn test_caption_tab_sits_above_box() {
        let mut frame = Frame::filled(200, 200, [0, 0, 0], 0);
        draw_face(&mut frame, &FaceRegion::new(50, 80, 60, 60), MaskLabel::WithMask, 0.87);
        assert_eq!(pixel(&frame, 51, 80 - 14 - 9), [0, 255, 0]);
    }

    #[test]
    fn test_caption_moves_inside_at_top_edge() {
        let mut frame = Frame::filled(200, 200, [0, 0, 0], 0);
        draw_face(&mut frame, &FaceRegion::new(10, 0, 60, 60), MaskLabel::Unknown, 0.0);
        assert_eq!(pixel(&frame, 11, 1), [255, 255, 0]);
    }

    #[test]
    fn test_alerts_stack_downwards() {
        let mut frame = Frame::filled(640, 480, [90, 90, 90], 0);
        let now = Instant::now();
        let alerts: Vec<Alert> = ["a", "b"]
            .iter()
            .map(|id| Alert {
                id: id.to_string(),
                message: "MASK VIOLATION DETECTED!".into(),
                started: now,
            })
            .collect();
        draw_alerts(&mut frame, &alerts);
        // Border top-left corners of both banners
        assert_eq!(pixel(&frame, 40, 50 - 14 - 10), [255, 0, 0]);
        assert_eq!(pixel(&frame, 40, 90 - 14 - 10), [255, 0, 0]);
        // Fill just inside the first banner
        assert_eq!(pixel(&frame, 43, 55), [0, 0, 0]);
    }

    #[test]
    fn test_info_panel_occupies_bottom_left() {
        let mut frame = Frame::filled(640, 480, [90, 90, 90], 0);
        let info = InfoPanel {
            fps: 29.97,
            violations: 3,
            model_active: false,
            time: ManualClock::default().local_now(),
        };
        draw_info_panel(&mut frame, &info);
        assert_eq!(pixel(&frame, 12, 478 - 10), [0, 0, 0]);
        assert_eq!(pixel(&frame, 320, 470), [90, 90, 90]);
        assert_eq!(pixel(&frame, 12, 300), [90, 90, 90]);
        assert_eq!(
            info.lines(),
            [
                "FPS: 30.0".to_string(),
                "VIOLATIONS: 3".to_string(),
                "MODEL: INACTIVE".to_string(),
                "TIME: 12:00:00".to_string(),
            ]
        );
    }
}
