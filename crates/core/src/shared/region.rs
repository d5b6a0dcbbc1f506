use serde::Serialize;

use super::constants::{MAX_ASPECT_RATIO, MIN_ASPECT_RATIO};

/// Axis-aligned bounding box of a detected face, in pixel coordinates.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
pub struct FaceRegion {
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
}

impl FaceRegion {
    pub fn new(x: i32, y: i32, width: i32, height: i32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Integer midpoint, used as the spatial key for cooldowns and alerts.
    pub fn center(&self) -> (i32, i32) {
        (self.x + self.width / 2, self.y + self.height / 2)
    }

    pub fn aspect_ratio(&self) -> f64 {
        if self.height == 0 {
            return f64::INFINITY;
        }
        self.width as f64 / self.height as f64
    }

    /// A region is usable when it lies fully inside the frame, is at least
    /// `min_size` in both dimensions, and is roughly square.
    pub fn is_valid(&self, frame_width: i32, frame_height: i32, min_size: (u32, u32)) -> bool {
        if self.x < 0
            || self.y < 0
            || self.x + self.width > frame_width
            || self.y + self.height > frame_height
        {
            return false;
        }
        if self.width < min_size.0 as i32 || self.height < min_size.1 as i32 {
            return false;
        }
        if self.width <= 0 || self.height <= 0 {
            return false;
        }
        (MIN_ASPECT_RATIO..=MAX_ASPECT_RATIO).contains(&self.aspect_ratio())
    }
}
