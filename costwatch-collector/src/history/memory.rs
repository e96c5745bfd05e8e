use std::sync::{Arc, Mutex};

use super::HistoryStore;
use crate::error::HistoryError;
use crate::lifecycle::EphemeralRecord;
use crate::snapshot::ScanHistoryEntry;

#[derive(Default)]
struct Inner {
    scans: Vec<ScanHistoryEntry>,
    ephemeral: Vec<EphemeralRecord>,
    fail_writes: bool,
}

/// Process-local history for mock mode and tests. Clones share state.
#[derive(Clone, Default)]
pub struct MemoryHistoryStore {
    inner: Arc<Mutex<Inner>>,
}

impl MemoryHistoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// A store whose scan appends always fail.
    pub fn failing() -> Self {
        let store = Self::default();
        if let Ok(mut inner) = store.inner.lock() {
            inner.fail_writes = true;
        }
        store
    }

    pub fn scans(&self) -> Vec<ScanHistoryEntry> {
        self.inner.lock().map(|i| i.scans.clone()).unwrap_or_default()
    }

    pub fn ephemeral(&self) -> Vec<EphemeralRecord> {
        self.inner.lock().map(|i| i.ephemeral.clone()).unwrap_or_default()
    }
}

impl HistoryStore for MemoryHistoryStore {
    fn append(&self, entry: &ScanHistoryEntry) -> Result<(), HistoryError> {
        let mut inner = self.inner.lock().map_err(|_| HistoryError::Poisoned)?;
        if inner.fail_writes {
            return Err(HistoryError::Unavailable("writes disabled".into()));
        }
        inner.scans.push(entry.clone());
        Ok(())
    }

    fn recent(&self, n: usize) -> Result<Vec<ScanHistoryEntry>, HistoryError> {
        let inner = self.inner.lock().map_err(|_| HistoryError::Poisoned)?;
        let skip = inner.scans.len().saturating_sub(n);
        Ok(inner.scans[skip..].to_vec())
    }

    fn append_ephemeral(&self, record: &EphemeralRecord) -> Result<bool, HistoryError> {
        let mut inner = self.inner.lock().map_err(|_| HistoryError::Poisoned)?;
        let dup = inner.ephemeral.iter().any(|e| {
            e.resource_id == record.resource_id && e.created == record.created && e.deleted == record.deleted
        });
        if !dup {
            inner.ephemeral.push(record.clone());
        }
        Ok(!dup)
    }
}
