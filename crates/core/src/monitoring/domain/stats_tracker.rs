use std::time::Instant;

use serde::Serialize;

use crate::classification::domain::mask_classifier::MaskLabel;

/// Point-in-time copy of the session counters.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize)]
pub struct StatisticsSnapshot {
    pub total_faces: u64,
    pub masked_faces: u64,
    pub unmasked_faces: u64,
    pub violations: u64,
    pub fps: f64,
}

/// Frames per second since `start`; `0.0` when no time has passed.
pub fn fps(frame_count: u64, start: Instant, now: Instant) -> f64 {
    let elapsed = now.saturating_duration_since(start).as_secs_f64();
    if elapsed <= 0.0 {
        return 0.0;
    }
    frame_count as f64 / elapsed
}

/// Per-session counters. Only reset between sessions.
pub struct StatsTracker {
    total_faces: u64,
    masked_faces: u64,
    unmasked_faces: u64,
    violations: u64,
    frame_count: u64,
    started: Instant,
}

impl StatsTracker {
    pub fn new(now: Instant) -> Self {
        Self {
            total_faces: 0,
            masked_faces: 0,
            unmasked_faces: 0,
            violations: 0,
            frame_count: 0,
            started: now,
        }
    }

    /// Counts an accepted face. `Unknown` is not a compliance outcome and
    /// is ignored.
    pub fn record(&mut self, label: MaskLabel) {
        match label {
            MaskLabel::WithMask => {
                self.total_faces += 1;
                self.masked_faces += 1;
            }
            MaskLabel::NoMask => {
                self.total_faces += 1;
                self.unmasked_faces += 1;
            }
            MaskLabel::Unknown => {}
        }
    }

    pub fn record_violation(&mut self) {
        self.violations += 1;
    }

    pub fn frame_processed(&mut self) {
        self.frame_count += 1;
    }

    pub fn frame_count(&self) -> u64 {
        self.frame_count
    }

    pub fn violations(&self) -> u64 {
        self.violations
    }

    pub fn fps(&self, now: Instant) -> f64 {
        fps(self.frame_count, self.started, now)
    }

    pub fn snapshot(&self, now: Instant) -> StatisticsSnapshot {
        StatisticsSnapshot {
            total_faces: self.total_faces,
            masked_faces: self.masked_faces,
            unmasked_faces: self.unmasked_faces,
            violations: self.violations,
            fps: self.fps(now),
        }
    }

    pub fn reset(&mut self, now: Instant) {
        *self = Self::new(now);
    }
}
