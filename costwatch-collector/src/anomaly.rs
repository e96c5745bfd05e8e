//! Anomaly passes over a collected inventory.
//!
//! Each pass is an [`AnomalyStage`]; the engine runs every registered stage
//! and concatenates their output. A resource may be flagged by several stages.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use futures::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::collector_core::{
    InventoryProvider, MetricTarget, MetricWindow, ResourceKind, ResourceRecord, TimeWindow,
    COMPUTE_RUNNING,
};
use crate::collectors::Inventory;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AnomalyReason {
    NotRunning,
    Unattached,
    LowUtilization,
    OrphanedSnapshot,
    StaleSnapshot,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnomalyRecord {
    pub resource_id: String,
    pub kind: ResourceKind,
    pub partition: String,
    pub reason: AnomalyReason,
    /// Mean CPU for LowUtilization, age in days for StaleSnapshot.
    pub metric: Option<f64>,
}

impl AnomalyRecord {
    fn new(rec: &ResourceRecord, reason: AnomalyReason, metric: Option<f64>) -> Self {
        Self {
            resource_id: rec.id.clone(),
            kind: rec.kind,
            partition: rec.partition.clone(),
            reason,
            metric,
        }
    }
}

#[async_trait]
pub trait AnomalyStage: Send + Sync {
    fn name(&self) -> &'static str;
    async fn evaluate(
        &self,
        inventory: &Inventory,
        provider: &dyn InventoryProvider,
        now: DateTime<Utc>,
    ) -> Vec<AnomalyRecord>;
}

/// Stopped compute still holding storage, and volumes attached to nothing.
#[derive(Debug, Default, Clone)]
pub struct ZombieStage;

impl ZombieStage {
    pub fn classify(rec: &ResourceRecord) -> Option<AnomalyRecord> {
        match rec.kind {
            ResourceKind::Compute if rec.state != COMPUTE_RUNNING => {
                Some(AnomalyRecord::new(rec, AnomalyReason::NotRunning, None))
            }
            ResourceKind::StorageVolume if rec.attachments.is_empty() => {
                Some(AnomalyRecord::new(rec, AnomalyReason::Unattached, None))
            }
            _ => None,
        }
    }
}

#[async_trait]
impl AnomalyStage for ZombieStage {
    fn name(&self) -> &'static str {
        "zombie"
    }

    async fn evaluate(&self, inventory: &Inventory, _: &dyn InventoryProvider, _: DateTime<Utc>) -> Vec<AnomalyRecord> {
        inventory
            .records(ResourceKind::Compute)
            .iter()
            .chain(inventory.records(ResourceKind::StorageVolume))
            .filter_map(Self::classify)
            .collect()
    }
}

/// Serving resources whose average CPU stays under a threshold.
#[derive(Debug, Clone)]
pub struct IdleStage {
    pub threshold_pct: f64,
    pub window_hours: i64,
    pub period_secs: u32,
    pub concurrency: usize,
}

impl Default for IdleStage {
    fn default() -> Self {
        Self {
            threshold_pct: 5.0,
            window_hours: 3,
            period_secs: 300,
            concurrency: 10,
        }
    }
}

impl IdleStage {
    fn candidates(inventory: &Inventory) -> impl Iterator<Item = &ResourceRecord> {
        inventory
            .records(ResourceKind::Compute)
            .iter()
            .chain(inventory.records(ResourceKind::Database))
            .filter(|r| r.is_active())
    }
}

pub fn mean(samples: &[f64]) -> Option<f64> {
    if samples.is_empty() {
        None
    } else {
        Some(samples.iter().sum::<f64>() / samples.len() as f64)
    }
}

#[async_trait]
impl AnomalyStage for IdleStage {
    fn name(&self) -> &'static str {
        "idle"
    }

    async fn evaluate(
        &self,
        inventory: &Inventory,
        provider: &dyn InventoryProvider,
        now: DateTime<Utc>,
    ) -> Vec<AnomalyRecord> {
        let window = MetricWindow {
            window: TimeWindow {
                start: now - Duration::hours(self.window_hours),
                end: now,
            },
            period_secs: self.period_secs,
        };

        stream::iter(Self::candidates(inventory))
            .map(|rec| async move {
                let target = MetricTarget {
                    kind: rec.kind,
                    id: rec.id.clone(),
                    partition: rec.partition.clone(),
                };
                match provider.query_metric(&target, &window).await {
                    Ok(samples) => match mean(&samples) {
                        Some(avg) if avg < self.threshold_pct => {
                            Some(AnomalyRecord::new(rec, AnomalyReason::LowUtilization, Some(avg)))
                        }
                        Some(_) => None,
                        None => {
                            debug!(id = %rec.id, "no metric samples");
                            None
                        }
                    },
                    Err(e) => {
                        debug!(id = %rec.id, error = %e, "metric query skipped");
                        None
                    }
                }
            })
            .buffer_unordered(self.concurrency.max(1))
            .filter_map(|r| async move { r })
            .collect()
            .await
    }
}

/// Snapshots whose source volume is gone or that have outlived the retention age.
#[derive(Debug, Clone)]
pub struct SnapshotCleanupStage {
    pub max_age_days: i64,
}

impl Default for SnapshotCleanupStage {
    fn default() -> Self {
        Self { max_age_days: 30 }
    }
}

impl SnapshotCleanupStage {
    pub fn classify(&self, rec: &ResourceRecord, now: DateTime<Utc>) -> Option<AnomalyRecord> {
        if rec.attachments.is_empty() {
            return Some(AnomalyRecord::new(rec, AnomalyReason::OrphanedSnapshot, None));
        }
        let age_days = (now - rec.created_at?).num_days();
        (age_days > self.max_age_days)
            .then(|| AnomalyRecord::new(rec, AnomalyReason::StaleSnapshot, Some(age_days as f64)))
    }
}

#[async_trait]
impl AnomalyStage for SnapshotCleanupStage {
    fn name(&self) -> &'static str {
        "snapshot-cleanup"
    }

    async fn evaluate(&self, inventory: &Inventory, _: &dyn InventoryProvider, now: DateTime<Utc>) -> Vec<AnomalyRecord> {
        inventory
            .records(ResourceKind::VolumeSnapshot)
            .iter()
            .filter_map(|r| self.classify(r, now))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collector_core::DiscoveredResource;
    use crate::mock::MockInventory;
    use crate::pricing::RateCard;

    fn record(kind: ResourceKind, id: &str, state: &str) -> ResourceRecord {
        let mut r = DiscoveredResource::new(kind, id, "r1");
        r.state = state.into();
        RateCard::default().price(r, Utc::now())
    }

    fn inventory(records: Vec<ResourceRecord>) -> Inventory {
        let mut inv = Inventory::default();
        for r in records {
            inv.push(r);
        }
        inv
    }

    // -----------------------------------------------------------------------
    // zombie
    // -----------------------------------------------------------------------

    #[test]
    fn running_compute_is_never_zombie() {
        assert!(ZombieStage::classify(&record(ResourceKind::Compute, "i-1", "running")).is_none());
    }

    #[test]
    fn stopped_compute_is_always_zombie() {
        let a = ZombieStage::classify(&record(ResourceKind::Compute, "i-1", "stopped")).unwrap();
        assert_eq!(a.reason, AnomalyReason::NotRunning);
    }

    #[test]
    fn unattached_volume_is_zombie() {
        let free = record(ResourceKind::StorageVolume, "vol-1", "available");
        let mut used = record(ResourceKind::StorageVolume, "vol-2", "in-use");
        used.attachments.push("i-1".into());
        assert_eq!(ZombieStage::classify(&free).unwrap().reason, AnomalyReason::Unattached);
        assert!(ZombieStage::classify(&used).is_none());
    }

    #[test]
    fn stopped_database_is_not_a_zombie() {
        assert!(ZombieStage::classify(&record(ResourceKind::Database, "db-1", "stopped")).is_none());
    }

    // -----------------------------------------------------------------------
    // idle
    // -----------------------------------------------------------------------

    #[tokio::test]
    async fn low_mean_cpu_is_flagged_with_value() {
        let provider = MockInventory::new().with_metric("i-1", vec![1.0, 2.0, 3.0]);
        let inv = inventory(vec![record(ResourceKind::Compute, "i-1", "running")]);
        let out = IdleStage::default().evaluate(&inv, &provider, Utc::now()).await;
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].reason, AnomalyReason::LowUtilization);
        assert_eq!(out[0].metric, Some(2.0));
    }

    #[tokio::test]
    async fn busy_or_silent_resources_are_not_flagged() {
        let provider = MockInventory::new()
            .with_metric("i-busy", vec![40.0, 60.0])
            .with_metric("db-quiet", vec![]);
        let inv = inventory(vec![
            record(ResourceKind::Compute, "i-busy", "running"),
            record(ResourceKind::Database, "db-quiet", "available"),
            record(ResourceKind::Compute, "i-unknown", "running"),
        ]);
        let out = IdleStage::default().evaluate(&inv, &provider, Utc::now()).await;
        assert!(out.is_empty());
    }

    #[tokio::test]
    async fn stopped_compute_is_not_queried() {
        let provider = MockInventory::new().with_metric("i-1", vec![0.0]);
        let inv = inventory(vec![record(ResourceKind::Compute, "i-1", "stopped")]);
        let out = IdleStage::default().evaluate(&inv, &provider, Utc::now()).await;
        assert!(out.is_empty());
    }

    #[tokio::test]
    async fn metric_failures_are_skipped() {
        let provider = MockInventory::new()
            .with_metric("i-1", vec![0.5])
            .failing_metrics();
        let inv = inventory(vec![record(ResourceKind::Compute, "i-1", "running")]);
        let out = IdleStage::default().evaluate(&inv, &provider, Utc::now()).await;
        assert!(out.is_empty());
    }

    // -----------------------------------------------------------------------
    // snapshots
    // -----------------------------------------------------------------------

    #[test]
    fn snapshot_without_source_volume_is_orphaned() {
        let snap = record(ResourceKind::VolumeSnapshot, "snap-1", "completed");
        let a = SnapshotCleanupStage::default().classify(&snap, Utc::now()).unwrap();
        assert_eq!(a.reason, AnomalyReason::OrphanedSnapshot);
    }

    #[test]
    fn old_snapshot_is_stale() {
        let now = Utc::now();
        let mut snap = record(ResourceKind::VolumeSnapshot, "snap-1", "completed");
        snap.attachments.push("vol-1".into());
        snap.created_at = Some(now - Duration::days(45));
        let a = SnapshotCleanupStage::default().classify(&snap, now).unwrap();
        assert_eq!(a.reason, AnomalyReason::StaleSnapshot);
        assert_eq!(a.metric, Some(45.0));

        snap.created_at = Some(now - Duration::days(3));
        assert!(SnapshotCleanupStage::default().classify(&snap, now).is_none());
    }

    #[test]
    fn mean_of_empty_is_none() {
        assert_eq!(mean(&[]), None);
        assert_eq!(mean(&[2.0, 4.0]), Some(3.0));
    }
}
