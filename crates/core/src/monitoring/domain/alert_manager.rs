use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::shared::clock::Clock;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Alert {
    pub id: String,
    pub message: String,
    pub started: Instant,
}

/// Time-bounded alerts keyed by id.
///
/// An alert is active while its age is at most the configured duration.
/// Expiry is only acted on by [`AlertManager::trigger`] and
/// [`AlertManager::cleanup_expired`]; reads never prune.
pub struct AlertManager {
    alerts: HashMap<String, Alert>,
    duration: Duration,
    clock: Arc<dyn Clock>,
}

impl AlertManager {
    pub fn new(duration: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            alerts: HashMap::new(),
            duration,
            clock,
        }
    }

    /// Raises `id`. Returns `true` if a new alert was started.
    ///
    /// A still-active alert keeps its original message and start time.
    pub fn trigger(&mut self, id: &str, message: &str) -> bool {
        let now = self.clock.now();
        if let Some(existing) = self.alerts.get(id) {
            if !self.expired(existing, now) {
                return false;
            }
            self.clear(id);
        }

        self.alerts.insert(
            id.to_string(),
            Alert {
                id: id.to_string(),
                message: message.to_string(),
                started: now,
            },
        );
        log::warn!("Alert triggered: {message}");
        true
    }

    pub fn clear(&mut self, id: &str) {
        self.alerts.remove(id);
    }

    /// Copy of every stored alert, oldest first (ties broken by id).
    pub fn active_snapshot(&self) -> Vec<Alert> {
        let mut alerts: Vec<Alert> = self.alerts.values().cloned().collect();
        alerts.sort_by(|a, b| a.started.cmp(&b.started).then_with(|| a.id.cmp(&b.id)));
        alerts
    }

    /// Drops every expired alert and returns how many were removed.
    pub fn cleanup_expired(&mut self) -> usize {
        let now = self.clock.now();
        let duration = self.duration;
        let before = self.alerts.len();
        self.alerts
            .retain(|_, a| now.saturating_duration_since(a.started) <= duration);
        before - self.alerts.len()
    }

    pub fn is_active(&self, id: &str) -> bool {
        self.alerts
            .get(id)
            .is_some_and(|a| !self.expired(a, self.clock.now()))
    }

    pub fn len(&self) -> usize {
        self.alerts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.alerts.is_empty()
    }

    pub fn reset(&mut self) {
        self.alerts.clear();
    }

    fn expired(&self, alert: &Alert, now: Instant) -> bool {
        now.saturating_duration_since(alert.started) > self.duration
    }
}
