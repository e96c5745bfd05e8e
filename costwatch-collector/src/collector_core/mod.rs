use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Datelike, Months, NaiveDate, Utc};

/// State string a compute instance reports while it is serving and billing.
pub const COMPUTE_RUNNING: &str = "running";
/// State string a database instance reports while it is serving and billing.
pub const DATABASE_AVAILABLE: &str = "available";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ResourceKind {
    Compute,
    Database,
    StorageVolume,
    StorageBucket,
    Function,
    VolumeSnapshot,
}

impl ResourceKind {
    pub const ALL: [ResourceKind; 6] = [
        ResourceKind::Compute,
        ResourceKind::Database,
        ResourceKind::StorageVolume,
        ResourceKind::StorageBucket,
        ResourceKind::Function,
        ResourceKind::VolumeSnapshot,
    ];

    /// Object storage is listed once per account; everything else per partition.
    pub fn is_regional(self) -> bool {
        !matches!(self, ResourceKind::StorageBucket)
    }

    pub fn label(self) -> &'static str {
        match self {
            ResourceKind::Compute => "compute",
            ResourceKind::Database => "database",
            ResourceKind::StorageVolume => "volume",
            ResourceKind::StorageBucket => "bucket",
            ResourceKind::Function => "function",
            ResourceKind::VolumeSnapshot => "snapshot",
        }
    }
}

/// Whether a cost figure comes from a measured size or a placeholder assumption.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CostBasis {
    Estimated,
    Measured,
}

/// Unpriced listing row as returned by an inventory provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiscoveredResource {
    pub kind: ResourceKind,
    pub id: String,
    pub name: Option<String>,
    pub partition: String,
    pub state: String,
    /// Instance class for compute/database (`t3.micro`, `db.m5.large`).
    pub class: Option<String>,
    pub created_at: Option<DateTime<Utc>>,
    pub size_gb: Option<f64>,
    /// Attached instance ids (volumes) or source volume id (snapshots).
    pub attachments: Vec<String>,
    pub free_tier_eligible: bool,
    pub attributes: HashMap<String, serde_json::Value>,
}

impl DiscoveredResource {
    pub fn new(kind: ResourceKind, id: impl Into<String>, partition: impl Into<String>) -> Self {
        Self {
            kind,
            id: id.into(),
            name: None,
            partition: partition.into(),
            state: String::new(),
            class: None,
            created_at: None,
            size_gb: None,
            attachments: Vec::new(),
            free_tier_eligible: false,
            attributes: HashMap::new(),
        }
    }
}

/// A priced resource, built once per scan by the collector.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceRecord {
    pub kind: ResourceKind,
    pub id: String,
    pub name: Option<String>,
    pub partition: String,
    pub state: String,
    pub class: Option<String>,
    pub created_at: Option<DateTime<Utc>>,
    pub hourly_rate: f64,
    pub monthly_estimate: f64,
    pub cumulative_estimate: f64,
    pub cost_basis: CostBasis,
    pub size_gb: Option<f64>,
    pub attachments: Vec<String>,
    pub free_tier_eligible: bool,
    pub attributes: HashMap<String, serde_json::Value>,
}

impl ResourceRecord {
    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.id)
    }

    /// Serving traffic right now: running instances, available databases.
    /// Storage and functions have no stopped state and count as active.
    pub fn is_active(&self) -> bool {
        match self.kind {
            ResourceKind::Compute => self.state == COMPUTE_RUNNING,
            ResourceKind::Database => self.state == DATABASE_AVAILABLE,
            _ => true,
        }
    }

    /// Hourly cost contribution to the current burn rate.
    pub fn burn_rate(&self) -> f64 {
        if self.is_active() {
            self.hourly_rate
        } else {
            0.0
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallerIdentity {
    pub account_id: String,
    pub alias: Option<String>,
    pub arn: Option<String>,
}

impl CallerIdentity {
    pub fn display_name(&self) -> &str {
        self.alias.as_deref().unwrap_or(&self.account_id)
    }
}

/// Raw audit-trail entry; classification into create/delete happens in `lifecycle`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditEvent {
    pub event_name: String,
    pub resource_id: Option<String>,
    pub timestamp: DateTime<Utc>,
    pub actor: String,
    pub service: String,
    pub partition: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl TimeWindow {
    pub fn lookback(end: DateTime<Utc>, secs: u64) -> Self {
        Self {
            start: end - chrono::Duration::seconds(secs as i64),
            end,
        }
    }
}

/// Which series a metric query addresses.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetricTarget {
    pub kind: ResourceKind,
    pub id: String,
    pub partition: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MetricWindow {
    pub window: TimeWindow,
    pub period_secs: u32,
}

/// Calendar date range, end exclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BillingPeriod {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl BillingPeriod {
    /// First of this month up to and including `today`.
    pub fn month_to_date(today: NaiveDate) -> Self {
        let start = today.with_day(1).unwrap_or(today);
        let end = today.succ_opt().unwrap_or(today);
        Self { start, end }
    }

    /// The whole calendar month before `today`'s month.
    pub fn previous_month(today: NaiveDate) -> Self {
        let end = today.with_day(1).unwrap_or(today);
        let start = end.checked_sub_months(Months::new(1)).unwrap_or(end);
        Self { start, end }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BudgetLevel {
    Ok,
    Warning,
    Critical,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BudgetStatus {
    pub name: String,
    pub limit: f64,
    pub actual: f64,
}

impl BudgetStatus {
    pub fn utilization_pct(&self) -> f64 {
        if self.limit > 0.0 {
            self.actual / self.limit * 100.0
        } else {
            0.0
        }
    }

    pub fn level(&self) -> BudgetLevel {
        let pct = self.utilization_pct();
        if pct > 90.0 {
            BudgetLevel::Critical
        } else if pct > 75.0 {
            BudgetLevel::Warning
        } else {
            BudgetLevel::Ok
        }
    }
}

/// Read-only inventory capability. Every call may fail independently.
#[async_trait]
pub trait InventoryProvider: Send + Sync {
    fn name(&self) -> &'static str;
    async fn identity(&self) -> Result<CallerIdentity>;
    async fn partitions(&self) -> Result<Vec<String>>;
    async fn list_compute(&self, partition: &str) -> Result<Vec<DiscoveredResource>>;
    async fn list_databases(&self, partition: &str) -> Result<Vec<DiscoveredResource>>;
    async fn list_volumes(&self, partition: &str) -> Result<Vec<DiscoveredResource>>;
    async fn list_snapshots(&self, partition: &str) -> Result<Vec<DiscoveredResource>>;
    async fn list_functions(&self, partition: &str) -> Result<Vec<DiscoveredResource>>;
    async fn list_buckets(&self) -> Result<Vec<DiscoveredResource>>;
    async fn list_audit_events(&self, window: TimeWindow) -> Result<Vec<AuditEvent>>;
    /// Samples of the target's utilization metric (percent) inside the window.
    async fn query_metric(&self, target: &MetricTarget, window: &MetricWindow) -> Result<Vec<f64>>;
}

/// Read-only billing capability.
#[async_trait]
pub trait BillingProvider: Send + Sync {
    async fn cost_by_service(&self, period: BillingPeriod) -> Result<BTreeMap<String, f64>>;
    async fn cost_by_usage_type(&self, period: BillingPeriod) -> Result<BTreeMap<String, f64>>;
    async fn budgets(&self) -> Result<Vec<BudgetStatus>>;
}
