use thiserror::Error;

use crate::snapshot::Snapshot;

#[derive(Debug, Error)]
pub enum HistoryError {
    #[error("history database error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("history store lock poisoned")]
    Poisoned,
    #[error("invalid timestamp in history row: {0}")]
    Timestamp(String),
    #[error("history store unavailable: {0}")]
    Unavailable(String),
}

#[derive(Debug, Error)]
pub enum ScanError {
    /// The scan completed but its history row could not be written.
    /// The computed snapshot is still usable.
    #[error("scan {} completed but history write failed: {source}", .snapshot.sequence)]
    History {
        snapshot: Box<Snapshot>,
        #[source]
        source: HistoryError,
    },
    #[error("cannot authenticate with provider: {0}")]
    Authentication(String),
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{key}: cannot parse {value:?} as a number")]
    InvalidNumber { key: String, value: String },
    #[error("{key} must be greater than zero")]
    NotPositive { key: String },
    #[error("{key} must be at most {max}")]
    TooLarge { key: String, max: String },
}
