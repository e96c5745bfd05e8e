//! The immutable per-scan result published to sinks.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::anomaly::AnomalyRecord;
use crate::collector_core::{BudgetStatus, CallerIdentity, ResourceKind, ResourceRecord};
use crate::collectors::{Inventory, GLOBAL_PARTITION};
use crate::cost::{CostBreakdown, Forecast};
use crate::lifecycle::EphemeralRecord;
use crate::trend::Trend;

/// One row of scan history, appended after every scan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanHistoryEntry {
    pub timestamp: DateTime<Utc>,
    pub total_resources: u64,
    pub total_monthly: f64,
    pub north_south: f64,
    pub east_west: f64,
    pub anomaly_count: u64,
    pub ephemeral_count: u64,
}

/// Which parts of a scan ran on partial data.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Coverage {
    pub failed_partitions: BTreeMap<ResourceKind, Vec<String>>,
    pub audit_degraded: bool,
    pub billing_degraded: bool,
    pub budgets_degraded: bool,
}

impl Coverage {
    pub fn from_inventory(inventory: &Inventory) -> Self {
        Self {
            failed_partitions: inventory.failed_partitions().clone(),
            ..Self::default()
        }
    }

    pub fn failure_count(&self, kind: ResourceKind) -> usize {
        self.failed_partitions.get(&kind).map_or(0, Vec::len)
    }

    /// Distinct regional partitions with at least one failed listing.
    pub fn unreachable_partitions(&self) -> BTreeSet<&str> {
        self.failed_partitions
            .values()
            .flatten()
            .map(String::as_str)
            .filter(|p| *p != GLOBAL_PARTITION)
            .collect()
    }

    pub fn is_complete(&self) -> bool {
        self.failed_partitions.values().all(Vec::is_empty)
            && !self.audit_degraded
            && !self.billing_degraded
            && !self.budgets_degraded
    }

    pub fn summary(&self) -> Option<String> {
        let n = self.unreachable_partitions().len();
        match n {
            0 => None,
            1 => Some("1 region unreachable".to_string()),
            n => Some(format!("{n} regions unreachable")),
        }
    }
}

/// A resource billing right now and what it costs per day.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActiveResource {
    pub kind: ResourceKind,
    pub id: String,
    pub name: String,
    pub class: Option<String>,
    pub partition: String,
    pub daily_cost: f64,
}

/// Running compute, available databases and functions, most expensive first.
pub fn active_resources(inventory: &Inventory) -> Vec<ActiveResource> {
    let mut out: Vec<ActiveResource> = [ResourceKind::Compute, ResourceKind::Database, ResourceKind::Function]
        .into_iter()
        .flat_map(|k| inventory.records(k))
        .filter(|r| r.is_active())
        .map(|r: &ResourceRecord| ActiveResource {
            kind: r.kind,
            id: r.id.clone(),
            name: r.display_name().to_string(),
            class: r.class.clone(),
            partition: r.partition.clone(),
            daily_cost: r.hourly_rate * 24.0,
        })
        .collect();
    out.sort_by(|a, b| b.daily_cost.partial_cmp(&a.daily_cost).unwrap_or(std::cmp::Ordering::Equal));
    out
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot {
    pub sequence: u64,
    pub timestamp: DateTime<Utc>,
    pub duration_ms: u64,
    pub identity: CallerIdentity,
    pub partitions: Vec<String>,
    pub resources: BTreeMap<ResourceKind, Vec<ResourceRecord>>,
    pub active: Vec<ActiveResource>,
    pub ephemeral: Vec<EphemeralRecord>,
    pub anomalies: Vec<AnomalyRecord>,
    pub cost: CostBreakdown,
    pub budgets: Vec<BudgetStatus>,
    pub forecasts: Vec<Forecast>,
    pub burn_rate: f64,
    pub trend: Trend,
    pub coverage: Coverage,
}

impl Snapshot {
    pub fn resource_count(&self) -> usize {
        self.resources.values().map(Vec::len).sum()
    }

    pub fn count(&self, kind: ResourceKind) -> usize {
        self.resources.get(&kind).map_or(0, Vec::len)
    }

    pub fn total_monthly(&self) -> f64 {
        self.resources.values().flatten().map(|r| r.monthly_estimate).sum()
    }

    pub fn history_entry(&self) -> ScanHistoryEntry {
        ScanHistoryEntry {
            timestamp: self.timestamp,
            total_resources: self.resource_count() as u64,
            total_monthly: self.total_monthly(),
            north_south: self.cost.north_south,
            east_west: self.cost.east_west,
            anomaly_count: self.anomalies.len() as u64,
            ephemeral_count: self.ephemeral.len() as u64,
        }
    }
}
