use std::sync::{Arc, Mutex};

use crate::monitoring::domain::violation_log::{
    ViolationLogError, ViolationRecord, ViolationStore,
};

/// In-process store. Clones share the same records, so a caller can keep a
/// handle to inspect what a logger wrote.
#[derive(Clone, Default)]
pub struct MemoryViolationStore {
    records: Arc<Mutex<Vec<ViolationRecord>>>,
}

impl MemoryViolationStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<ViolationRecord>> {
        self.records.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl ViolationStore for MemoryViolationStore {
    fn append(&mut self, record: &ViolationRecord) -> Result<(), ViolationLogError> {
        self.lock().push(record.clone());
        Ok(())
    }

    fn records(&self) -> Result<Vec<ViolationRecord>, ViolationLogError> {
        Ok(self.lock().clone())
    }
}
