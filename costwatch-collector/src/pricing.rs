//! Static rate card and per-resource cost estimates.
//!
//! Figures are list-price approximations; billing data from the provider is
//! the ground truth and arrives with up to a day of lag.

use chrono::{DateTime, Utc};
use maplit::hashmap;
use std::collections::HashMap;

use crate::collector_core::{CostBasis, DiscoveredResource, ResourceKind, ResourceRecord};

#[derive(Debug, Clone)]
pub struct RateCard {
    pub compute_hourly: HashMap<String, f64>,
    pub database_hourly: HashMap<String, f64>,
    /// Used for any class missing from the tables. Never zero.
    pub default_hourly: f64,
    pub bucket_gb_month: f64,
    pub bucket_assumed_gb: f64,
    pub volume_gb_month: f64,
    pub snapshot_gb_month: f64,
    pub function_monthly: f64,
    pub days_per_month: f64,
}

impl Default for RateCard {
    fn default() -> Self {
        Self {
            compute_hourly: hashmap! {
                "t3.micro".to_string() => 0.0104,
                "t3.small".to_string() => 0.0208,
                "t3.medium".to_string() => 0.0416,
                "m5.large".to_string() => 0.096,
                "c5.large".to_string() => 0.085,
            },
            database_hourly: hashmap! {
                "db.t3.micro".to_string() => 0.016,
                "db.t3.small".to_string() => 0.032,
                "db.t3.medium".to_string() => 0.064,
                "db.m5.large".to_string() => 0.171,
            },
            default_hourly: 0.05,
            bucket_gb_month: 0.023,
            bucket_assumed_gb: 10.0,
            volume_gb_month: 0.10,
            snapshot_gb_month: 0.05,
            // 100k invocations at $0.0000002 each
            function_monthly: 0.0000002 * 100_000.0,
            days_per_month: 30.0,
        }
    }
}

impl RateCard {
    pub fn with_days_per_month(mut self, days: f64) -> Self {
        self.days_per_month = days;
        self
    }

    pub fn month_hours(&self) -> f64 {
        24.0 * self.days_per_month
    }

    fn class_rate(&self, table: &HashMap<String, f64>, class: Option<&str>) -> f64 {
        let rate = class.and_then(|c| table.get(c)).copied().unwrap_or(self.default_hourly);
        if rate > 0.0 {
            rate
        } else {
            self.default_hourly
        }
    }

    pub fn compute_hourly(&self, class: Option<&str>) -> f64 {
        self.class_rate(&self.compute_hourly, class)
    }

    pub fn database_hourly(&self, class: Option<&str>) -> f64 {
        self.class_rate(&self.database_hourly, class)
    }

    pub fn monthly_from_hourly(&self, hourly: f64) -> f64 {
        hourly * self.month_hours()
    }

    /// Per-GB-month storage estimate; falls back to `assumed_gb` when size is unknown.
    fn storage_monthly(gb_month: f64, size_gb: Option<f64>, assumed_gb: f64) -> (f64, CostBasis) {
        match size_gb {
            Some(gb) => (gb_month * gb, CostBasis::Measured),
            None => (gb_month * assumed_gb, CostBasis::Estimated),
        }
    }

    /// Hourly rate, monthly estimate and basis for a discovered resource.
    pub fn rate(&self, res: &DiscoveredResource) -> (f64, f64, CostBasis) {
        let class = res.class.as_deref();
        match res.kind {
            ResourceKind::Compute => {
                let hourly = self.compute_hourly(class);
                (hourly, self.monthly_from_hourly(hourly), CostBasis::Estimated)
            }
            ResourceKind::Database => {
                let hourly = self.database_hourly(class);
                (hourly, self.monthly_from_hourly(hourly), CostBasis::Estimated)
            }
            ResourceKind::StorageBucket => {
                let (monthly, basis) =
                    Self::storage_monthly(self.bucket_gb_month, res.size_gb, self.bucket_assumed_gb);
                (monthly / self.month_hours(), monthly, basis)
            }
            ResourceKind::StorageVolume => {
                let (monthly, basis) = Self::storage_monthly(self.volume_gb_month, res.size_gb, 0.0);
                (monthly / self.month_hours(), monthly, basis)
            }
            ResourceKind::VolumeSnapshot => {
                let (monthly, basis) =
                    Self::storage_monthly(self.snapshot_gb_month, res.size_gb, 0.0);
                (monthly / self.month_hours(), monthly, basis)
            }
            ResourceKind::Function => {
                let monthly = self.function_monthly;
                (monthly / self.month_hours(), monthly, CostBasis::Estimated)
            }
        }
    }

    /// Turn a listing row into an immutable priced record as of `now`.
    pub fn price(&self, res: DiscoveredResource, now: DateTime<Utc>) -> ResourceRecord {
        let (hourly_rate, monthly_estimate, cost_basis) = self.rate(&res);
        let cumulative_estimate = hourly_rate * hours_since(res.created_at, now);
        ResourceRecord {
            kind: res.kind,
            id: res.id,
            name: res.name,
            partition: res.partition,
            state: res.state,
            class: res.class,
            created_at: res.created_at,
            hourly_rate,
            monthly_estimate,
            cumulative_estimate,
            cost_basis,
            size_gb: res.size_gb,
            attachments: res.attachments,
            free_tier_eligible: res.free_tier_eligible,
            attributes: res.attributes,
        }
    }
}

/// Hours between `created` and `now`; zero when unknown or in the future.
pub fn hours_since(created: Option<DateTime<Utc>>, now: DateTime<Utc>) -> f64 {
    match created {
        Some(t) if t < now => (now - t).num_milliseconds() as f64 / 3_600_000.0,
        _ => 0.0,
    }
}
