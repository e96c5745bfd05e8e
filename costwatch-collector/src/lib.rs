pub mod anomaly;
pub mod collector_core;
pub mod collectors;
pub mod config;
pub mod cost;
pub mod engine;
pub mod error;
pub mod history;
pub mod lifecycle;
pub mod mock;
pub mod out;
pub mod pricing;
pub mod snapshot;
pub mod trend;
pub mod utils;

pub use engine::{ScanEngine, ScanEngineBuilder};
pub use error::{ConfigError, HistoryError, ScanError};
pub use snapshot::Snapshot;
