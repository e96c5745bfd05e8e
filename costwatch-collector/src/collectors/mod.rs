pub mod aws;
mod billing;
mod cloudtrail;
mod cloudwatch;
mod ebs;
mod ec2;
mod lambda;
mod rds;
mod s3;

use std::collections::{BTreeMap, BTreeSet};
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use anyhow::{anyhow, Result};
use chrono::{DateTime, Utc};
use futures::FutureExt;
use serde::Serialize;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, warn};

use crate::collector_core::{DiscoveredResource, InventoryProvider, ResourceKind, ResourceRecord};
use crate::pricing::RateCard;

/// Partition label used for failures of account-global listings.
pub const GLOBAL_PARTITION: &str = "global";

/// Dispatch one listing call for `kind`. Global kinds ignore `partition`.
pub async fn list_kind(
    provider: &dyn InventoryProvider,
    kind: ResourceKind,
    partition: Option<&str>,
) -> Result<Vec<DiscoveredResource>> {
    let region = || partition.ok_or_else(|| anyhow!("{} listing needs a partition", kind.label()));
    match kind {
        ResourceKind::Compute => provider.list_compute(region()?).await,
        ResourceKind::Database => provider.list_databases(region()?).await,
        ResourceKind::StorageVolume => provider.list_volumes(region()?).await,
        ResourceKind::VolumeSnapshot => provider.list_snapshots(region()?).await,
        ResourceKind::Function => provider.list_functions(region()?).await,
        ResourceKind::StorageBucket => provider.list_buckets().await,
    }
}

/// Merged result of one collection pass. Every kind has an entry, possibly empty.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Inventory {
    records: BTreeMap<ResourceKind, Vec<ResourceRecord>>,
    failed_partitions: BTreeMap<ResourceKind, Vec<String>>,
}

impl Default for Inventory {
    fn default() -> Self {
        Self {
            records: ResourceKind::ALL.iter().map(|k| (*k, Vec::new())).collect(),
            failed_partitions: ResourceKind::ALL.iter().map(|k| (*k, Vec::new())).collect(),
        }
    }
}

impl Inventory {
    pub fn records(&self, kind: ResourceKind) -> &[ResourceRecord] {
        self.records.get(&kind).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn by_kind(&self) -> &BTreeMap<ResourceKind, Vec<ResourceRecord>> {
        &self.records
    }

    pub fn iter(&self) -> impl Iterator<Item = &ResourceRecord> {
        self.records.values().flatten()
    }

    pub fn total_count(&self) -> usize {
        self.records.values().map(Vec::len).sum()
    }

    pub fn total_monthly(&self) -> f64 {
        self.iter().map(|r| r.monthly_estimate).sum()
    }

    pub fn failure_count(&self, kind: ResourceKind) -> usize {
        self.failed_partitions.get(&kind).map_or(0, Vec::len)
    }

    pub fn failed_partitions(&self) -> &BTreeMap<ResourceKind, Vec<String>> {
        &self.failed_partitions
    }

    pub fn push(&mut self, record: ResourceRecord) {
        self.records.entry(record.kind).or_default().push(record);
    }

    pub fn record_failure(&mut self, kind: ResourceKind, partition: impl Into<String>) {
        self.failed_partitions.entry(kind).or_default().push(partition.into());
    }

    /// Count calls whose task never reported back (cancelled or aborted) as failures.
    fn record_unfinished(&mut self, pending: BTreeSet<(ResourceKind, Option<String>)>) {
        for (kind, partition) in pending {
            let partition = partition.unwrap_or_else(|| GLOBAL_PARTITION.to_string());
            warn!(kind = kind.label(), %partition, "listing task did not complete");
            self.record_failure(kind, partition);
        }
    }
}

/// Fans listing calls across partitions with a fixed concurrency ceiling.
#[derive(Debug, Clone)]
pub struct PartitionedCollector {
    rates: RateCard,
    concurrency: usize,
}

impl PartitionedCollector {
    pub fn new(rates: RateCard, concurrency: usize) -> Self {
        Self {
            rates,
            concurrency: concurrency.max(1),
        }
    }

    pub fn rates(&self) -> &RateCard {
        &self.rates
    }

    pub fn concurrency(&self) -> usize {
        self.concurrency
    }

    /// One task per (partition, regional kind) plus one per global kind.
    /// Returns after every task finished; failed calls contribute nothing.
    pub async fn collect(
        &self,
        provider: Arc<dyn InventoryProvider>,
        partitions: &[String],
        now: DateTime<Utc>,
    ) -> Inventory {
        let sem = Arc::new(Semaphore::new(self.concurrency));
        let mut join_set = JoinSet::new();
        let mut pending = BTreeSet::new();

        for kind in ResourceKind::ALL {
            let targets: Vec<Option<String>> = if kind.is_regional() {
                partitions.iter().cloned().map(Some).collect()
            } else {
                vec![None]
            };
            for partition in targets {
                pending.insert((kind, partition.clone()));
                let sem = sem.clone();
                let provider = provider.clone();
                join_set.spawn(async move {
                    let _permit = sem.acquire_owned().await.ok();
                    let result = AssertUnwindSafe(list_kind(provider.as_ref(), kind, partition.as_deref()))
                        .catch_unwind()
                        .await
                        .unwrap_or_else(|_| Err(anyhow!("listing task panicked")));
                    (kind, partition, result)
                });
            }
        }

        let mut inventory = Inventory::default();
        while let Some(joined) = join_set.join_next().await {
            let (kind, partition, result) = match joined {
                Ok(done) => done,
                Err(e) => {
                    debug!(error = %e, "collection task join failed");
                    continue;
                }
            };
            pending.remove(&(kind, partition.clone()));
            match result {
                Ok(rows) => {
                    for row in rows {
                        inventory.push(self.rates.price(row, now));
                    }
                }
                Err(e) => {
                    let partition = partition.unwrap_or_else(|| GLOBAL_PARTITION.to_string());
                    warn!(kind = kind.label(), %partition, error = %e, "listing failed");
                    inventory.record_failure(kind, partition);
                }
            }
        }
        inventory.record_unfinished(pending);

        for (kind, rows) in inventory.by_kind() {
            debug!(kind = kind.label(), count = rows.len(), failed = inventory.failure_count(*kind), "collected");
        }
        debug!(total = inventory.total_count(), "inventory complete");
        inventory
    }
}
