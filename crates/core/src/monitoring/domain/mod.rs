pub mod alert_manager;
pub mod stats_tracker;
pub mod violation_log;
