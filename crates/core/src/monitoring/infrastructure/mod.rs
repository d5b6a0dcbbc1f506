pub mod csv_violation_store;
pub mod memory_violation_store;
