use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::NaiveDateTime;
use thiserror::Error;

use crate::shared::clock::Clock;
use crate::shared::constants::LOG_TIMESTAMP_FORMAT;

#[derive(Error, Debug)]
pub enum ViolationLogError {
    #[error("failed to open violation log {path}: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to append to violation log {path}: {source}")]
    Append {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to read violation log {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("malformed violation row {row:?}: {reason}")]
    Malformed { row: String, reason: String },
}

/// One persisted non-compliance event.
#[derive(Clone, Debug, PartialEq)]
pub struct ViolationRecord {
    pub timestamp: NaiveDateTime,
    pub violation_type: String,
    pub confidence: f64,
    pub face_position: (i32, i32),
    /// Seconds the violation lasted, when known.
    pub duration: Option<f64>,
}

impl ViolationRecord {
    /// Encodes the record as one delimited line (no trailing newline).
    ///
    /// `2024-01-01 12:00:00,No Mask,0.730,"120,85",N/A`
    pub fn to_row(&self) -> String {
        let duration = match self.duration {
            Some(d) => d.to_string(),
            None => "N/A".to_string(),
        };
        [
            self.timestamp.format(LOG_TIMESTAMP_FORMAT).to_string(),
            quote(&self.violation_type),
            format!("{:.3}", self.confidence),
            quote(&format!("{},{}", self.face_position.0, self.face_position.1)),
            duration,
        ]
        .join(",")
    }

    pub fn from_row(row: &str) -> Result<Self, ViolationLogError> {
        let malformed = |reason: &str| ViolationLogError::Malformed {
            row: row.to_string(),
            reason: reason.to_string(),
        };

        let fields = split_row(row);
        if fields.len() != 5 {
            return Err(malformed(&format!("expected 5 fields, found {}", fields.len())));
        }
        let timestamp = NaiveDateTime::parse_from_str(fields[0].trim(), LOG_TIMESTAMP_FORMAT)
            .map_err(|e| malformed(&format!("bad timestamp: {e}")))?;
        let confidence = fields[2]
            .trim()
            .parse::<f64>()
            .map_err(|e| malformed(&format!("bad confidence: {e}")))?;
        let face_position = fields[3]
            .split_once(',')
            .and_then(|(x, y)| Some((x.trim().parse().ok()?, y.trim().parse().ok()?)))
            .ok_or_else(|| malformed("bad face position"))?;
        let duration = match fields[4].trim() {
            "" | "N/A" => None,
            d => Some(
                d.parse::<f64>()
                    .map_err(|e| malformed(&format!("bad duration: {e}")))?,
            ),
        };

        Ok(Self {
            timestamp,
            violation_type: fields[1].trim().to_string(),
            confidence,
            face_position,
            duration,
        })
    }
}

fn quote(field: &str) -> String {
    if field.contains([',', '"', '\n']) {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}

/// Splits one delimited line, honoring double-quoted fields.
fn split_row(row: &str) -> Vec<String> {
    let mut fields = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;
    let mut chars = row.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '"' if in_quotes && chars.peek() == Some(&'"') => {
                current.push('"');
                chars.next();
            }
            '"' => in_quotes = !in_quotes,
            ',' if !in_quotes => fields.push(std::mem::take(&mut current)),
            _ => current.push(c),
        }
    }
    fields.push(current);
    fields
}

/// Durable, append-only home for violation records.
pub trait ViolationStore: Send {
    fn append(&mut self, record: &ViolationRecord) -> Result<(), ViolationLogError>;

    /// Every stored record in insertion order. Rows that cannot be decoded
    /// are skipped.
    fn records(&self) -> Result<Vec<ViolationRecord>, ViolationLogError>;
}

/// What [`ViolationLogger::log_violation`] did with a violation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LogOutcome {
    Written,
    /// Same position was logged less than one cooldown ago.
    Suppressed,
    /// The store rejected the record; the cooldown still started.
    Failed,
}

/// Deduplicating front end to a [`ViolationStore`].
///
/// The cooldown key is the face position as given: two detections of the
/// same person a few pixels apart are different keys.
pub struct ViolationLogger {
    store: Box<dyn ViolationStore>,
    cooldown: Duration,
    last_logged: HashMap<(i32, i32), Instant>,
    clock: Arc<dyn Clock>,
}

impl ViolationLogger {
    pub fn new(store: Box<dyn ViolationStore>, cooldown: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            store,
            cooldown,
            last_logged: HashMap::new(),
            clock,
        }
    }

    pub fn log_violation(
        &mut self,
        violation_type: &str,
        confidence: f64,
        position: (i32, i32),
        duration: Option<f64>,
    ) -> LogOutcome {
        let now = self.clock.now();
        if let Some(&last) = self.last_logged.get(&position) {
            if now.saturating_duration_since(last) < self.cooldown {
                log::trace!("Violation at {position:?} suppressed by cooldown");
                return LogOutcome::Suppressed;
            }
        }
        let cooldown = self.cooldown;
        self.last_logged
            .retain(|_, t| now.saturating_duration_since(*t) < cooldown);
        self.last_logged.insert(position, now);

        let record = ViolationRecord {
            timestamp: self.clock.local_now(),
            violation_type: violation_type.to_string(),
            confidence,
            face_position: position,
            duration,
        };
        match self.store.append(&record) {
            Ok(()) => {
                log::info!("Violation logged: {violation_type} at {position:?}");
                LogOutcome::Written
            }
            Err(e) => {
                log::error!("Error logging violation: {e}");
                LogOutcome::Failed
            }
        }
    }

    /// Counts records no older than `hours`. Scans the whole store.
    pub fn count_since(&self, hours: f64) -> Result<usize, ViolationLogError> {
        let now = self.clock.local_now();
        let records = self.store.records()?;
        Ok(records
            .iter()
            .filter(|r| (now - r.timestamp).num_seconds() as f64 / 3600.0 <= hours)
            .count())
    }

    pub fn records(&self) -> Result<Vec<ViolationRecord>, ViolationLogError> {
        self.store.records()
    }

    /// Positions still inside their cooldown window.
    pub fn tracked_positions(&self) -> usize {
        self.last_logged.len()
    }

    /// Forgets every cooldown, e.g. when a new session starts.
    pub fn reset_cooldowns(&mut self) {
        self.last_logged.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::monitoring::infrastructure::memory_violation_store::MemoryViolationStore;
    use crate::shared::clock::ManualClock;
    use approx::assert_relative_eq;

    fn logger(cooldown_secs: u64) -> (ViolationLogger, Arc<ManualClock>, MemoryViolationStore) {
        let clock = Arc::new(ManualClock::default());
        let store = MemoryViolationStore::new();
        let logger = ViolationLogger::new(
            Box::new(store.clone()),
            Duration::from_secs(cooldown_secs),
            clock.clone(),
        );
        (logger, clock, store)
    }

    struct FailingStore;

    impl ViolationStore for FailingStore {
        fn append(&mut self, _record: &ViolationRecord) -> Result<(), ViolationLogError> {
            Err(ViolationLogError::Append {
                path: PathBuf::from("/dev/full"),
                source: std::io::Error::other("disk full"),
            })
        }

        fn records(&self) -> Result<Vec<ViolationRecord>, ViolationLogError> {
            Ok(Vec::new())
        }
    }

    #[test]
    fn test_row_format() {
        let record = ViolationRecord {
            timestamp: ManualClock::default().local_now(),
            violation_type: "No Mask".into(),
            confidence: 0.73,
            face_position: (120, 85),
            duration: None,
        };
        assert_eq!(record.to_row(), "2024-01-01 12:00:00,No Mask,0.730,\"120,85\",N/A");
    }

    #[test]
    fn test_row_decode_accepts_spaced_fields() {
        let record =
            ViolationRecord::from_row("2024-01-01 12:00:00, No Mask, 0.730, \"120,85\", 4.5")
                .unwrap();
        assert_eq!(record.violation_type, "No Mask");
        assert_relative_eq!(record.confidence, 0.73);
        assert_eq!(record.face_position, (120, 85));
        assert_eq!(record.duration, Some(4.5));
    }

    #[test]
    fn test_row_decode_rejects_garbage() {
        assert!(matches!(
            ViolationRecord::from_row("yesterday,No Mask,0.7,\"1,2\",N/A"),
            Err(ViolationLogError::Malformed { .. })
        ));
        assert!(ViolationRecord::from_row("2024-01-01 12:00:00,No Mask").is_err());
    }

    #[test]
    fn test_type_with_comma_is_quoted() {
        let record = ViolationRecord {
            timestamp: ManualClock::default().local_now(),
            violation_type: "No Mask, crowd".into(),
            confidence: 1.0,
            face_position: (1, 2),
            duration: Some(2.0),
        };
        let row = record.to_row();
        assert!(row.contains("\"No Mask, crowd\""));
        assert_eq!(ViolationRecord::from_row(&row).unwrap(), record);
    }

    #[test]
    fn test_second_call_within_cooldown_is_suppressed() {
        let (mut logger, clock, store) = logger(5);
        assert_eq!(logger.log_violation("No Mask", 0.7, (100, 100), None), LogOutcome::Written);
        clock.advance_secs(4.0);
        assert_eq!(logger.log_violation("No Mask", 0.7, (100, 100), None), LogOutcome::Suppressed);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_second_call_after_cooldown_is_written() {
        let (mut logger, clock, store) = logger(5);
        logger.log_violation("No Mask", 0.7, (100, 100), None);
        clock.advance_secs(6.0);
        assert_eq!(logger.log_violation("No Mask", 0.7, (100, 100), None), LogOutcome::Written);
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn test_cooldown_boundary_is_written() {
        let (mut logger, clock, store) = logger(5);
        logger.log_violation("No Mask", 0.7, (100, 100), None);
        clock.advance_secs(5.0);
        assert_eq!(logger.log_violation("No Mask", 0.7, (100, 100), None), LogOutcome::Written);
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn test_cooldown_is_per_exact_position() {
        let (mut logger, _clock, store) = logger(5);
        logger.log_violation("No Mask", 0.7, (100, 100), None);
        assert_eq!(logger.log_violation("No Mask", 0.7, (101, 100), None), LogOutcome::Written);
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn test_failed_append_still_starts_cooldown() {
        let clock = Arc::new(ManualClock::default());
        let mut logger =
            ViolationLogger::new(Box::new(FailingStore), Duration::from_secs(5), clock.clone());
        assert_eq!(logger.log_violation("No Mask", 0.9, (5, 5), None), LogOutcome::Failed);
        assert_eq!(logger.log_violation("No Mask", 0.9, (5, 5), None), LogOutcome::Suppressed);
    }

    #[test]
    fn test_expired_positions_are_forgotten() {
        let (mut logger, clock, store) = logger(5);
        for i in 0..1_000 {
            logger.log_violation("No Mask", 0.7, (i, i % 7), None);
            clock.advance_secs(10.0);
        }
        assert_eq!(store.len(), 1_000);
        assert_eq!(logger.tracked_positions(), 1);
    }

    #[test]
    fn test_live_cooldowns_survive_pruning() {
        let (mut logger, clock, _store) = logger(5);
        logger.log_violation("No Mask", 0.7, (100, 100), None);
        clock.advance_secs(2.0);
        logger.log_violation("No Mask", 0.7, (300, 300), None);
        clock.advance_secs(2.0);
        logger.log_violation("No Mask", 0.7, (500, 500), None);
        assert_eq!(logger.tracked_positions(), 3);
        assert_eq!(logger.log_violation("No Mask", 0.7, (100, 100), None), LogOutcome::Suppressed);

        clock.advance_secs(2.0);
        logger.log_violation("No Mask", 0.7, (700, 700), None);
        assert_eq!(logger.tracked_positions(), 3);
    }

    #[test]
    fn test_reset_cooldowns() {
        let (mut logger, _clock, store) = logger(5);
        logger.log_violation("No Mask", 0.7, (100, 100), None);
        logger.reset_cooldowns();
        assert_eq!(logger.log_violation("No Mask", 0.7, (100, 100), None), LogOutcome::Written);
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn test_count_since_window_and_idempotence() {
        let (mut logger, clock, _store) = logger(0);
        logger.log_violation("No Mask", 0.7, (1, 1), None);
        clock.advance_secs(2.0 * 3600.0);
        logger.log_violation("No Mask", 0.8, (2, 2), None);
        clock.advance_secs(60.0);

        assert_eq!(logger.count_since(1.0).unwrap(), 1);
        assert_eq!(logger.count_since(24.0).unwrap(), 2);
        assert_eq!(logger.count_since(24.0).unwrap(), 2);
    }
}
