//! Append-only persistence for scan totals and short-lived resources.

mod memory;
mod sqlite;

pub use memory::MemoryHistoryStore;
pub use sqlite::SqliteHistoryStore;

use crate::error::HistoryError;
use crate::lifecycle::EphemeralRecord;
use crate::snapshot::ScanHistoryEntry;

pub trait HistoryStore: Send {
    fn append(&self, entry: &ScanHistoryEntry) -> Result<(), HistoryError>;

    /// Up to `n` most recent entries, oldest first.
    fn recent(&self, n: usize) -> Result<Vec<ScanHistoryEntry>, HistoryError>;

    /// Returns false when an identical record (same id, created and deleted
    /// times) was already stored.
    fn append_ephemeral(&self, record: &EphemeralRecord) -> Result<bool, HistoryError>;
}

impl<S: HistoryStore + ?Sized> HistoryStore for Box<S> {
    fn append(&self, entry: &ScanHistoryEntry) -> Result<(), HistoryError> {
        (**self).append(entry)
    }

    fn recent(&self, n: usize) -> Result<Vec<ScanHistoryEntry>, HistoryError> {
        (**self).recent(n)
    }

    fn append_ephemeral(&self, record: &EphemeralRecord) -> Result<bool, HistoryError> {
        (**self).append_ephemeral(record)
    }
}
