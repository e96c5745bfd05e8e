use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection};

use super::HistoryStore;
use crate::error::HistoryError;
use crate::lifecycle::EphemeralRecord;
use crate::snapshot::ScanHistoryEntry;

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS scans (
    id               INTEGER PRIMARY KEY AUTOINCREMENT,
    timestamp        TEXT NOT NULL,
    total_resources  INTEGER NOT NULL,
    total_monthly    REAL NOT NULL,
    north_south      REAL NOT NULL,
    east_west        REAL NOT NULL,
    anomaly_count    INTEGER NOT NULL,
    ephemeral_count  INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS ephemeral_events (
    id               INTEGER PRIMARY KEY AUTOINCREMENT,
    resource_id      TEXT NOT NULL,
    service          TEXT NOT NULL,
    region           TEXT NOT NULL,
    user             TEXT NOT NULL,
    created          TEXT NOT NULL,
    deleted          TEXT NOT NULL,
    lifetime_seconds INTEGER NOT NULL,
    UNIQUE (resource_id, created, deleted)
);
"#;

/// SQLite-backed history. One connection, locked per statement.
#[derive(Clone)]
pub struct SqliteHistoryStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteHistoryStore {
    pub fn open(path: &Path) -> Result<Self, HistoryError> {
        let conn = Connection::open(path)?;
        Self::init_connection(&conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    pub fn memory() -> Result<Self, HistoryError> {
        let conn = Connection::open_in_memory()?;
        Self::init_connection(&conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn init_connection(conn: &Connection) -> Result<(), HistoryError> {
        // no-op for in-memory databases
        let _ = conn.pragma_update(None, "journal_mode", "WAL");
        conn.execute_batch(SCHEMA)?;
        Ok(())
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>, HistoryError> {
        self.conn.lock().map_err(|_| HistoryError::Poisoned)
    }

    pub fn ephemeral_count(&self) -> Result<u64, HistoryError> {
        let conn = self.lock()?;
        let n: i64 = conn.query_row("SELECT COUNT(*) FROM ephemeral_events", [], |r| r.get(0))?;
        Ok(n as u64)
    }
}

fn parse_ts(s: &str) -> Result<DateTime<Utc>, HistoryError> {
    DateTime::parse_from_rfc3339(s)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|_| HistoryError::Timestamp(s.to_string()))
}

impl HistoryStore for SqliteHistoryStore {
    fn append(&self, entry: &ScanHistoryEntry) -> Result<(), HistoryError> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO scans (timestamp, total_resources, total_monthly, north_south, east_west, anomaly_count, ephemeral_count)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                entry.timestamp.to_rfc3339(),
                entry.total_resources as i64,
                entry.total_monthly,
                entry.north_south,
                entry.east_west,
                entry.anomaly_count as i64,
                entry.ephemeral_count as i64,
            ],
        )?;
        Ok(())
    }

    fn recent(&self, n: usize) -> Result<Vec<ScanHistoryEntry>, HistoryError> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT timestamp, total_resources, total_monthly, north_south, east_west, anomaly_count, ephemeral_count
             FROM scans ORDER BY id DESC LIMIT ?1",
        )?;
        let rows = stmt.query_map(params![n as i64], |r| {
            Ok((
                r.get::<_, String>(0)?,
                r.get::<_, i64>(1)?,
                r.get::<_, f64>(2)?,
                r.get::<_, f64>(3)?,
                r.get::<_, f64>(4)?,
                r.get::<_, i64>(5)?,
                r.get::<_, i64>(6)?,
            ))
        })?;

        let mut out = Vec::new();
        for row in rows {
            let (ts, total_resources, total_monthly, north_south, east_west, anomalies, ephemeral) = row?;
            out.push(ScanHistoryEntry {
                timestamp: parse_ts(&ts)?,
                total_resources: total_resources as u64,
                total_monthly,
                north_south,
                east_west,
                anomaly_count: anomalies as u64,
                ephemeral_count: ephemeral as u64,
            });
        }
        out.reverse();
        Ok(out)
    }

    fn append_ephemeral(&self, record: &EphemeralRecord) -> Result<bool, HistoryError> {
        let conn = self.lock()?;
        let inserted = conn.execute(
            "INSERT OR IGNORE INTO ephemeral_events (resource_id, service, region, user, created, deleted, lifetime_seconds)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                record.resource_id,
                record.service,
                record.partition,
                record.actor,
                record.created.to_rfc3339(),
                record.deleted.to_rfc3339(),
                record.lifetime_secs,
            ],
        )?;
        Ok(inserted > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn entry(minute: u32, total_monthly: f64) -> ScanHistoryEntry {
        ScanHistoryEntry {
            timestamp: Utc.with_ymd_and_hms(2024, 5, 1, 12, minute, 0).unwrap(),
            total_resources: 3,
            total_monthly,
            north_south: 0.5,
            east_west: 0.25,
            anomaly_count: 1,
            ephemeral_count: 0,
        }
    }

    fn ephemeral(id: &str) -> EphemeralRecord {
        let created = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
        EphemeralRecord {
            resource_id: id.into(),
            service: "ec2.amazonaws.com".into(),
            partition: "r1".into(),
            actor: "alice".into(),
            created,
            deleted: created + Duration::seconds(120),
            lifetime_secs: 120,
        }
    }

    #[test]
    fn recent_returns_oldest_first() {
        let store = SqliteHistoryStore::memory().unwrap();
        for (i, v) in [10.0, 20.0, 5.0, 7.0].into_iter().enumerate() {
            store.append(&entry(i as u32, v)).unwrap();
        }
        let last3: Vec<f64> = store.recent(3).unwrap().iter().map(|e| e.total_monthly).collect();
        assert_eq!(last3, vec![20.0, 5.0, 7.0]);
    }

    #[test]
    fn recent_on_empty_store() {
        let store = SqliteHistoryStore::memory().unwrap();
        assert!(store.recent(7).unwrap().is_empty());
    }

    #[test]
    fn duplicate_ephemeral_rows_are_ignored() {
        let store = SqliteHistoryStore::memory().unwrap();
        assert!(store.append_ephemeral(&ephemeral("i-1")).unwrap());
        assert!(!store.append_ephemeral(&ephemeral("i-1")).unwrap());
        assert!(store.append_ephemeral(&ephemeral("i-2")).unwrap());
        assert_eq!(store.ephemeral_count().unwrap(), 2);
    }

    #[test]
    fn file_backed_store_persists_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("history.db");
        {
            let store = SqliteHistoryStore::open(&path).unwrap();
            store.append(&entry(0, 1.5)).unwrap();
        }
        let store = SqliteHistoryStore::open(&path).unwrap();
        let rows = store.recent(10).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0], entry(0, 1.5));
    }
}
