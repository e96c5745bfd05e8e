//! In-memory providers for `MOCK_MODE` and tests.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, NaiveDate, Utc};
use serde_json::json;

use crate::collector_core::{
    AuditEvent, BillingPeriod, BillingProvider, BudgetStatus, CallerIdentity, DiscoveredResource,
    InventoryProvider, MetricTarget, MetricWindow, ResourceKind, TimeWindow,
};
use crate::collectors::GLOBAL_PARTITION;

#[derive(Default)]
pub struct MockInventory {
    identity: Option<CallerIdentity>,
    partitions: Vec<String>,
    resources: Vec<DiscoveredResource>,
    failing: HashSet<(String, ResourceKind)>,
    metrics: HashMap<String, Vec<f64>>,
    fail_metrics: bool,
    events: Vec<AuditEvent>,
    recurring: Vec<(String, i64)>,
    fail_audit: bool,
    latency: Option<Duration>,
    in_flight: AtomicUsize,
    peak: AtomicUsize,
}

impl MockInventory {
    pub fn new() -> Self {
        Self {
            identity: Some(CallerIdentity {
                account_id: "123456789012".into(),
                alias: Some("mock-account".into()),
                arn: Some("arn:aws:iam::123456789012:user/mock".into()),
            }),
            partitions: vec!["us-east-1".into()],
            ..Self::default()
        }
    }

    /// A small account spread across two regions.
    pub fn demo() -> Self {
        let now = Utc::now();
        let mut web = DiscoveredResource::new(ResourceKind::Compute, "i-0a1b2c3d", "us-east-1");
        web.name = Some("web-1".into());
        web.state = "running".into();
        web.class = Some("t3.micro".into());
        web.created_at = Some(now - ChronoDuration::days(12));

        let mut batch = DiscoveredResource::new(ResourceKind::Compute, "i-9f8e7d6c", "ap-northeast-2");
        batch.name = Some("batch-old".into());
        batch.state = "stopped".into();
        batch.class = Some("m5.large".into());
        batch.created_at = Some(now - ChronoDuration::days(90));

        let mut db = DiscoveredResource::new(ResourceKind::Database, "demo-db", "ap-northeast-2");
        db.state = "available".into();
        db.class = Some("db.t3.micro".into());
        db.created_at = Some(now - ChronoDuration::days(40));
        db.free_tier_eligible = true;
        db.attributes.insert("engine".into(), json!("postgres"));

        let mut root_vol = DiscoveredResource::new(ResourceKind::StorageVolume, "vol-0001", "us-east-1");
        root_vol.state = "in-use".into();
        root_vol.size_gb = Some(8.0);
        root_vol.attachments.push("i-0a1b2c3d".into());

        let mut loose_vol = DiscoveredResource::new(ResourceKind::StorageVolume, "vol-0002", "ap-northeast-2");
        loose_vol.state = "available".into();
        loose_vol.size_gb = Some(100.0);

        let mut snap = DiscoveredResource::new(ResourceKind::VolumeSnapshot, "snap-0001", "us-east-1");
        snap.state = "completed".into();
        snap.size_gb = Some(8.0);
        snap.created_at = Some(now - ChronoDuration::days(60));
        snap.attachments.push("vol-0001".into());

        let mut bucket = DiscoveredResource::new(ResourceKind::StorageBucket, "demo-bucket", "ap-northeast-2");
        bucket.created_at = Some(now - ChronoDuration::days(200));

        let mut func = DiscoveredResource::new(ResourceKind::Function, "thumbnailer", "us-east-1");
        func.state = "Active".into();
        func.attributes.insert("runtime".into(), json!("python3.12"));

        let mut inv = Self::new();
        inv.partitions = vec!["us-east-1".into(), "ap-northeast-2".into()];
        inv.with(web)
            .with(batch)
            .with(db)
            .with(root_vol)
            .with(loose_vol)
            .with(snap)
            .with(bucket)
            .with(func)
            .with_metric("i-0a1b2c3d", vec![1.2, 0.8, 2.1])
            .with_metric("demo-db", vec![22.0, 31.5])
            .with_recurring_pair("i-ephemeral", 180)
    }

    pub fn with(mut self, res: DiscoveredResource) -> Self {
        if res.kind.is_regional() && !self.partitions.contains(&res.partition) {
            self.partitions.push(res.partition.clone());
        }
        self.resources.push(res);
        self
    }

    pub fn with_partitions(mut self, partitions: &[&str]) -> Self {
        self.partitions = partitions.iter().map(|s| s.to_string()).collect();
        self
    }

    /// Listing `kind` in `partition` fails. Use [`GLOBAL_PARTITION`] for buckets.
    pub fn failing(mut self, partition: &str, kind: ResourceKind) -> Self {
        self.failing.insert((partition.to_string(), kind));
        self
    }

    pub fn with_metric(mut self, id: &str, samples: Vec<f64>) -> Self {
        self.metrics.insert(id.to_string(), samples);
        self
    }

    pub fn failing_metrics(mut self) -> Self {
        self.fail_metrics = true;
        self
    }

    pub fn with_event(mut self, event: AuditEvent) -> Self {
        self.events.push(event);
        self
    }

    /// A create/delete pair `lifetime_secs` apart, placed just before the end
    /// of whatever window is queried.
    pub fn with_recurring_pair(mut self, id: &str, lifetime_secs: i64) -> Self {
        self.recurring.push((id.to_string(), lifetime_secs));
        self
    }

    pub fn failing_audit(mut self) -> Self {
        self.fail_audit = true;
        self
    }

    pub fn unauthenticated(mut self) -> Self {
        self.identity = None;
        self
    }

    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Highest number of listing calls observed running at once.
    pub fn peak_in_flight(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }

    async fn list(&self, kind: ResourceKind, partition: Option<&str>) -> Result<Vec<DiscoveredResource>> {
        let current = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(current, Ordering::SeqCst);
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        let label = partition.unwrap_or(GLOBAL_PARTITION);
        if self.failing.contains(&(label.to_string(), kind)) {
            bail!("mock {} listing failed in {label}", kind.label());
        }
        Ok(self
            .resources
            .iter()
            .filter(|r| r.kind == kind && partition.map_or(true, |p| r.partition == p))
            .cloned()
            .collect())
    }
}

#[async_trait]
impl InventoryProvider for MockInventory {
    fn name(&self) -> &'static str {
        "mock"
    }

    async fn identity(&self) -> Result<CallerIdentity> {
        self.identity.clone().ok_or_else(|| anyhow!("no credentials configured"))
    }

    async fn partitions(&self) -> Result<Vec<String>> {
        Ok(self.partitions.clone())
    }

    async fn list_compute(&self, partition: &str) -> Result<Vec<DiscoveredResource>> {
        self.list(ResourceKind::Compute, Some(partition)).await
    }

    async fn list_databases(&self, partition: &str) -> Result<Vec<DiscoveredResource>> {
        self.list(ResourceKind::Database, Some(partition)).await
    }

    async fn list_volumes(&self, partition: &str) -> Result<Vec<DiscoveredResource>> {
        self.list(ResourceKind::StorageVolume, Some(partition)).await
    }

    async fn list_snapshots(&self, partition: &str) -> Result<Vec<DiscoveredResource>> {
        self.list(ResourceKind::VolumeSnapshot, Some(partition)).await
    }

    async fn list_functions(&self, partition: &str) -> Result<Vec<DiscoveredResource>> {
        self.list(ResourceKind::Function, Some(partition)).await
    }

    async fn list_buckets(&self) -> Result<Vec<DiscoveredResource>> {
        self.list(ResourceKind::StorageBucket, None).await
    }

    async fn list_audit_events(&self, window: TimeWindow) -> Result<Vec<AuditEvent>> {
        if self.fail_audit {
            bail!("mock audit trail unavailable");
        }
        let mut out: Vec<AuditEvent> = self
            .events
            .iter()
            .filter(|e| e.timestamp >= window.start && e.timestamp <= window.end)
            .cloned()
            .collect();
        for (id, lifetime) in &self.recurring {
            let deleted = window.end - ChronoDuration::seconds(1);
            let created = deleted - ChronoDuration::seconds(*lifetime);
            for (event_name, timestamp) in [("RunInstances", created), ("TerminateInstances", deleted)] {
                out.push(AuditEvent {
                    event_name: event_name.into(),
                    resource_id: Some(id.clone()),
                    timestamp,
                    actor: "mock-user".into(),
                    service: "ec2.amazonaws.com".into(),
                    partition: self.partitions.first().cloned().unwrap_or_default(),
                });
            }
        }
        Ok(out)
    }

    async fn query_metric(&self, target: &MetricTarget, _window: &MetricWindow) -> Result<Vec<f64>> {
        if self.fail_metrics {
            bail!("mock metrics unavailable");
        }
        Ok(self.metrics.get(&target.id).cloned().unwrap_or_default())
    }
}

#[derive(Default)]
pub struct MockBilling {
    current: BTreeMap<String, f64>,
    prior: BTreeMap<String, f64>,
    usage: BTreeMap<String, f64>,
    budgets: Vec<BudgetStatus>,
    fail_costs: bool,
    fail_budgets: bool,
    today: Option<NaiveDate>,
}

impl MockBilling {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn demo() -> Self {
        Self::new()
            .with_service("Amazon Elastic Compute Cloud - Compute", 18.40)
            .with_service("Amazon Relational Database Service", 11.52)
            .with_service("Amazon Simple Storage Service", 0.23)
            .with_prior("Amazon Elastic Compute Cloud - Compute", 42.0)
            .with_prior("Amazon Relational Database Service", 24.0)
            .with_usage("USE1-DataTransfer-Out-Bytes", 1.75)
            .with_usage("APN2-USE1-AWS-Out-Bytes-Transfer", 0.40)
            .with_usage("USE1-DataTransfer-Regional-Bytes", 0.12)
            .with_budget("monthly", 50.0, 30.15)
    }

    pub fn with_service(mut self, service: &str, amount: f64) -> Self {
        self.current.insert(service.to_string(), amount);
        self
    }

    pub fn with_prior(mut self, service: &str, amount: f64) -> Self {
        self.prior.insert(service.to_string(), amount);
        self
    }

    pub fn with_usage(mut self, usage_type: &str, amount: f64) -> Self {
        self.usage.insert(usage_type.to_string(), amount);
        self
    }

    pub fn with_budget(mut self, name: &str, limit: f64, actual: f64) -> Self {
        self.budgets.push(BudgetStatus {
            name: name.to_string(),
            limit,
            actual,
        });
        self
    }

    /// Date that decides which period is "current". Defaults to today (UTC).
    pub fn anchored(mut self, today: NaiveDate) -> Self {
        self.today = Some(today);
        self
    }

    pub fn failing_costs(mut self) -> Self {
        self.fail_costs = true;
        self
    }

    pub fn failing_budgets(mut self) -> Self {
        self.fail_budgets = true;
        self
    }
}

#[async_trait]
impl BillingProvider for MockBilling {
    async fn cost_by_service(&self, period: BillingPeriod) -> Result<BTreeMap<String, f64>> {
        if self.fail_costs {
            bail!("mock billing unavailable");
        }
        let today = self.today.unwrap_or_else(|| Utc::now().date_naive());
        if period.start == BillingPeriod::month_to_date(today).start {
            Ok(self.current.clone())
        } else {
            Ok(self.prior.clone())
        }
    }

    async fn cost_by_usage_type(&self, _period: BillingPeriod) -> Result<BTreeMap<String, f64>> {
        if self.fail_costs {
            bail!("mock billing unavailable");
        }
        Ok(self.usage.clone())
    }

    async fn budgets(&self) -> Result<Vec<BudgetStatus>> {
        if self.fail_budgets {
            bail!("mock budgets unavailable");
        }
        Ok(self.budgets.clone())
    }
}
