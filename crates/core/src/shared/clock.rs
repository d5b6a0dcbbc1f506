use std::sync::Mutex;
use std::time::{Duration, Instant};

use chrono::NaiveDateTime;

/// Source of time for cooldowns, alert expiry, FPS and log timestamps.
///
/// `now` is monotonic and drives every duration comparison; `local_now`
/// is wall-clock time and is only ever written to or compared against
/// persisted records.
pub trait Clock: Send + Sync {
    fn now(&self) -> Instant;
    fn local_now(&self) -> NaiveDateTime;
}

pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    fn local_now(&self) -> NaiveDateTime {
        chrono::Local::now().naive_local()
    }
}

/// Clock that only moves when told to. Both readings advance together.
pub struct ManualClock {
    origin: Instant,
    wall_origin: NaiveDateTime,
    offset: Mutex<Duration>,
}

impl ManualClock {
    pub fn new(wall_origin: NaiveDateTime) -> Self {
        Self {
            origin: Instant::now(),
            wall_origin,
            offset: Mutex::new(Duration::ZERO),
        }
    }

    pub fn advance(&self, by: Duration) {
        let mut offset = self.offset.lock().unwrap_or_else(|e| e.into_inner());
        *offset += by;
    }

    pub fn advance_secs(&self, secs: f64) {
        self.advance(Duration::from_secs_f64(secs));
    }

    fn offset(&self) -> Duration {
        *self.offset.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        let wall_origin = chrono::NaiveDate::from_ymd_opt(2024, 1, 1)
            .and_then(|d| d.and_hms_opt(12, 0, 0))
            .unwrap_or_default();
        Self::new(wall_origin)
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        self.origin + self.offset()
    }

    fn local_now(&self) -> NaiveDateTime {
        let offset =
            chrono::Duration::from_std(self.offset()).unwrap_or_else(|_| chrono::Duration::zero());
        self.wall_origin + offset
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_manual_clock_advances_both_readings() {
        let clock = ManualClock::default();
        let t0 = clock.now();
        let w0 = clock.local_now();
        clock.advance_secs(2.5);
        assert_eq!(clock.now() - t0, Duration::from_millis(2500));
        assert_eq!((clock.local_now() - w0).num_milliseconds(), 2500);
    }

    #[test]
    fn test_manual_clock_default_origin() {
        let clock = ManualClock::default();
        assert_eq!(
            clock.local_now().format("%Y-%m-%d %H:%M:%S").to_string(),
            "2024-01-01 12:00:00"
        );
    }

    #[test]
    fn test_system_clock_is_monotonic() {
        let clock = SystemClock;
        let a = clock.now();
        let b = clock.now();
        assert!(b >= a);
    }
}
