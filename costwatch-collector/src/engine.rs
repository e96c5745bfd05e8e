//! The scan loop: collect, correlate, classify, price, persist, publish.

use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

use crate::anomaly::{AnomalyRecord, AnomalyStage, IdleStage, SnapshotCleanupStage, ZombieStage};
use crate::collector_core::{
    BillingPeriod, BillingProvider, BudgetStatus, CallerIdentity, InventoryProvider, TimeWindow,
};
use crate::collectors::{Inventory, PartitionedCollector};
use crate::config::EngineConfig;
use crate::cost::{CostBreakdown, Forecast, Horizon};
use crate::error::{HistoryError, ScanError};
use crate::history::HistoryStore;
use crate::lifecycle::{self, EphemeralRecord};
use crate::out::SnapshotSink;
use crate::pricing::RateCard;
use crate::snapshot::{active_resources, Coverage, Snapshot};
use crate::trend::Trend;

pub type Clock = Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;

pub struct ScanEngineBuilder {
    inventory: Arc<dyn InventoryProvider>,
    billing: Arc<dyn BillingProvider>,
    history: Box<dyn HistoryStore>,
    stages: Vec<Box<dyn AnomalyStage>>,
    rates: RateCard,
    config: EngineConfig,
    clock: Clock,
}

impl ScanEngineBuilder {
    pub fn new(
        inventory: Arc<dyn InventoryProvider>,
        billing: Arc<dyn BillingProvider>,
        history: impl HistoryStore + 'static,
    ) -> Self {
        Self {
            inventory,
            billing,
            history: Box::new(history),
            stages: Vec::new(),
            rates: RateCard::default(),
            config: EngineConfig::default(),
            clock: Arc::new(Utc::now),
        }
    }

    pub fn config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    pub fn rates(mut self, rates: RateCard) -> Self {
        self.rates = rates;
        self
    }

    pub fn stage(mut self, stage: impl AnomalyStage + 'static) -> Self {
        self.stages.push(Box::new(stage));
        self
    }

    /// Zombie, idle and snapshot-cleanup passes with thresholds from the
    /// current config. Call after [`config`](Self::config).
    pub fn default_stages(self) -> Self {
        let idle = IdleStage {
            threshold_pct: self.config.idle_cpu_pct,
            window_hours: self.config.idle_window_hours,
            period_secs: self.config.idle_period_secs,
            concurrency: self.config.concurrency,
        };
        let snapshots = SnapshotCleanupStage {
            max_age_days: self.config.snapshot_max_age_days,
        };
        self.stage(ZombieStage).stage(idle).stage(snapshots)
    }

    pub fn clock(mut self, clock: impl Fn() -> DateTime<Utc> + Send + Sync + 'static) -> Self {
        self.clock = Arc::new(clock);
        self
    }

    pub fn build(self) -> ScanEngine {
        let rates = self.rates.with_days_per_month(self.config.days_per_month);
        ScanEngine {
            collector: PartitionedCollector::new(rates, self.config.concurrency),
            inventory: self.inventory,
            billing: self.billing,
            history: self.history,
            stages: self.stages,
            config: self.config,
            clock: self.clock,
            identity: None,
            partitions: Vec::new(),
            sequence: 0,
        }
    }
}

pub struct ScanEngine {
    inventory: Arc<dyn InventoryProvider>,
    billing: Arc<dyn BillingProvider>,
    history: Box<dyn HistoryStore>,
    stages: Vec<Box<dyn AnomalyStage>>,
    collector: PartitionedCollector,
    config: EngineConfig,
    clock: Clock,
    identity: Option<CallerIdentity>,
    partitions: Vec<String>,
    sequence: u64,
}

/// Billing figures for one scan plus which queries degraded.
struct BillingView {
    cost: CostBreakdown,
    budgets: Vec<BudgetStatus>,
    billing_degraded: bool,
    budgets_degraded: bool,
}

impl ScanEngine {
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn partitions(&self) -> &[String] {
        &self.partitions
    }

    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    /// Verify credentials and resolve partitions. Idempotent.
    pub async fn start(&mut self) -> Result<&CallerIdentity, ScanError> {
        if self.identity.is_none() {
            let identity = self
                .inventory
                .identity()
                .await
                .map_err(|e| ScanError::Authentication(format!("{e:#}")))?;
            info!(account = %identity.account_id, alias = identity.display_name(), provider = self.inventory.name(), "authenticated");

            self.partitions = match &self.config.regions {
                Some(regions) => regions.clone(),
                None => match self.inventory.partitions().await {
                    Ok(found) if !found.is_empty() => found,
                    Ok(_) => vec![self.config.home_region.clone()],
                    Err(e) => {
                        warn!(error = %e, home = %self.config.home_region, "partition discovery failed, using home region");
                        vec![self.config.home_region.clone()]
                    }
                },
            };
            info!(count = self.partitions.len(), "partitions resolved");
            self.identity = Some(identity);
        }
        self.identity
            .as_ref()
            .ok_or_else(|| ScanError::Authentication("identity unavailable".into()))
    }

    async fn billing_view(&self, now: DateTime<Utc>) -> BillingView {
        let today = now.date_naive();
        let current = BillingPeriod::month_to_date(today);
        let prior = BillingPeriod::previous_month(today);

        let (services, prior_services, usage, budgets) = tokio::join!(
            self.billing.cost_by_service(current),
            self.billing.cost_by_service(prior),
            self.billing.cost_by_usage_type(current),
            self.billing.budgets(),
        );

        let mut billing_degraded = false;
        let mut or_empty = |name: &str, r: anyhow::Result<std::collections::BTreeMap<String, f64>>| {
            r.unwrap_or_else(|e| {
                warn!(query = name, error = %e, "billing query failed");
                billing_degraded = true;
                Default::default()
            })
        };
        let services = or_empty("cost_by_service", services);
        let prior_services = or_empty("cost_by_service_prior", prior_services);
        let usage = or_empty("cost_by_usage_type", usage);

        let (budgets, budgets_degraded) = match budgets {
            Ok(b) => (b, false),
            Err(e) => {
                warn!(error = %e, "budget query failed");
                (Vec::new(), true)
            }
        };

        BillingView {
            cost: CostBreakdown::build(services, &prior_services, &usage),
            budgets,
            billing_degraded,
            budgets_degraded,
        }
    }

    async fn anomalies(&self, inventory: &Inventory, now: DateTime<Utc>) -> Vec<AnomalyRecord> {
        let mut out = Vec::new();
        for stage in &self.stages {
            let found = stage.evaluate(inventory, self.inventory.as_ref(), now).await;
            debug!(stage = stage.name(), count = found.len(), "anomaly stage finished");
            out.extend(found);
        }
        out
    }

    /// Returns the first write error; later records are still attempted.
    fn persist_ephemeral(&self, records: &[EphemeralRecord]) -> Result<(), HistoryError> {
        let mut first_err = None;
        for rec in records {
            match self.history.append_ephemeral(rec) {
                Ok(true) => debug!(id = %rec.resource_id, lifetime = rec.lifetime_secs, "ephemeral resource recorded"),
                Ok(false) => {}
                Err(e) => {
                    first_err.get_or_insert(e);
                }
            }
        }
        first_err.map_or(Ok(()), Err)
    }

    /// Run one full scan. All collection finishes before the snapshot is built.
    pub async fn scan_once(&mut self) -> Result<Snapshot, ScanError> {
        let identity = self.start().await?.clone();
        self.sequence += 1;
        let sequence = self.sequence;
        let now = (self.clock)();
        let started = Instant::now();
        info!(sequence, partitions = self.partitions.len(), "scan started");

        let window = TimeWindow::lookback(now, self.config.lookback_secs);
        let (inventory, audit, billing) = tokio::join!(
            self.collector.collect(self.inventory.clone(), &self.partitions, now),
            self.inventory.list_audit_events(window),
            self.billing_view(now),
        );

        let mut coverage = Coverage::from_inventory(&inventory);
        coverage.billing_degraded = billing.billing_degraded;
        coverage.budgets_degraded = billing.budgets_degraded;

        let events = match audit {
            Ok(events) => lifecycle::classify(&events),
            Err(e) => {
                warn!(error = %e, "audit query failed");
                coverage.audit_degraded = true;
                Vec::new()
            }
        };
        let ephemeral = lifecycle::correlate(&events, self.config.ephemeral_secs);
        let anomalies = self.anomalies(&inventory, now).await;

        let burn_rate: f64 = inventory.iter().map(|r| r.burn_rate()).sum();
        let spent = billing.cost.current_total;
        let forecasts = vec![
            Forecast::project(spent, burn_rate, now, Horizon::Day),
            Forecast::project(spent, burn_rate, now, Horizon::Month),
        ];

        let mut snapshot = Snapshot {
            sequence,
            timestamp: now,
            duration_ms: 0,
            identity,
            partitions: self.partitions.clone(),
            active: active_resources(&inventory),
            resources: inventory.by_kind().clone(),
            ephemeral,
            anomalies,
            cost: billing.cost,
            budgets: billing.budgets,
            forecasts,
            burn_rate,
            trend: Trend::from_values(&[], self.config.trend_width),
            coverage,
        };

        let write = self
            .persist_ephemeral(&snapshot.ephemeral)
            .and(self.history.append(&snapshot.history_entry()));
        snapshot.trend = match self.history.recent(self.config.trend_len) {
            Ok(rows) => Trend::from_history(&rows, self.config.trend_width),
            Err(e) => {
                warn!(error = %e, "history read failed");
                snapshot.trend
            }
        };
        snapshot.duration_ms = started.elapsed().as_millis() as u64;

        info!(
            sequence,
            resources = snapshot.resource_count(),
            anomalies = snapshot.anomalies.len(),
            ephemeral = snapshot.ephemeral.len(),
            duration_ms = snapshot.duration_ms,
            "scan finished"
        );
        if !snapshot.coverage.is_complete() {
            let coverage = &snapshot.coverage;
            warn!(
                sequence,
                partitions = coverage.summary().unwrap_or_default(),
                audit_degraded = coverage.audit_degraded,
                billing_degraded = coverage.billing_degraded,
                budgets_degraded = coverage.budgets_degraded,
                "scan coverage incomplete"
            );
        }

        match write {
            Ok(()) => Ok(snapshot),
            Err(source) => Err(ScanError::History {
                snapshot: Box::new(snapshot),
                source,
            }),
        }
    }

    /// Scan on every interval tick until `shutdown` turns true or its sender
    /// is dropped. A scan in progress is always finished first.
    pub async fn run(&mut self, sink: &dyn SnapshotSink, mut shutdown: watch::Receiver<bool>) -> Result<(), ScanError> {
        self.start().await?;

        let mut ticker = tokio::time::interval(self.config.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                    continue;
                }
                _ = ticker.tick() => {}
            }

            let snapshot = match self.scan_once().await {
                Ok(s) => s,
                Err(ScanError::History { snapshot, source }) => {
                    error!(sequence = snapshot.sequence, error = %source, "history write failed");
                    *snapshot
                }
                Err(e) => return Err(e),
            };
            if let Err(e) = sink.publish(&snapshot).await {
                warn!(sequence = snapshot.sequence, error = %e, "snapshot publish failed");
            }
            if self.config.once {
                break;
            }
        }
        info!(scans = self.sequence, "scan loop stopped");
        Ok(())
    }
}
