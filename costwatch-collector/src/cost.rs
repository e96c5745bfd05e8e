//! Billing aggregation: per-service totals, data-transfer split and forecasts.
//!
//! Transfer classification matches substrings of provider usage-type names
//! (`USE1-DataTransfer-Out-Bytes`, `EUC1-USW2-AWS-Out-Bytes`, ...). It is a
//! heuristic and misfiles usage types that follow other conventions.

use std::collections::BTreeMap;

use chrono::{DateTime, Datelike, Duration, Months, TimeZone, Utc};
use serde::{Deserialize, Serialize};

const TRANSFER_MARKERS: [&str; 2] = ["DataTransfer", "Transfer"];
const NORTH_SOUTH_MARKERS: [&str; 2] = ["Out", "Internet"];

pub fn is_transfer_usage(usage_type: &str) -> bool {
    TRANSFER_MARKERS.iter().any(|m| usage_type.contains(m))
}

/// Traffic leaving the provider network. Only meaningful for transfer usage.
pub fn is_north_south(usage_type: &str) -> bool {
    NORTH_SOUTH_MARKERS.iter().any(|m| usage_type.contains(m))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransferDirection {
    NorthSouth,
    EastWest,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransferLine {
    pub source: String,
    pub destination: String,
    pub direction: TransferDirection,
    pub cost: f64,
}

impl TransferLine {
    pub fn parse(usage_type: &str, cost: f64) -> Option<Self> {
        if cost <= 0.0 || !is_transfer_usage(usage_type) {
            return None;
        }
        let parts: Vec<&str> = usage_type.split('-').collect();
        let source = parts.first().copied().unwrap_or("unknown").to_string();
        let destination = if usage_type.contains("Internet") {
            "Internet".to_string()
        } else {
            parts.get(2).copied().unwrap_or("internal").to_string()
        };
        let direction = if is_north_south(usage_type) {
            TransferDirection::NorthSouth
        } else {
            TransferDirection::EastWest
        };
        Some(Self {
            source,
            destination,
            direction,
            cost,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CostLevel {
    Normal,
    Medium,
    High,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CostBreakdown {
    pub current_total: f64,
    pub prior_total: f64,
    pub by_service: BTreeMap<String, f64>,
    pub north_south: f64,
    pub east_west: f64,
    pub transfer_lines: Vec<TransferLine>,
}

impl CostBreakdown {
    pub fn build(
        by_service: BTreeMap<String, f64>,
        prior_by_service: &BTreeMap<String, f64>,
        by_usage_type: &BTreeMap<String, f64>,
    ) -> Self {
        let mut out = Self {
            current_total: by_service.values().sum(),
            prior_total: prior_by_service.values().sum(),
            by_service,
            ..Self::default()
        };
        for (usage_type, cost) in by_usage_type {
            if !is_transfer_usage(usage_type) {
                continue;
            }
            if is_north_south(usage_type) {
                out.north_south += cost;
            } else {
                out.east_west += cost;
            }
            out.transfer_lines.extend(TransferLine::parse(usage_type, *cost));
        }
        out.transfer_lines
            .sort_by(|a, b| b.cost.partial_cmp(&a.cost).unwrap_or(std::cmp::Ordering::Equal));
        out
    }

    /// Month-to-date spend including both transfer directions.
    pub fn total_with_transfer(&self) -> f64 {
        self.current_total + self.north_south + self.east_west
    }

    pub fn level(&self) -> CostLevel {
        let total = self.total_with_transfer();
        if total > 100.0 {
            CostLevel::High
        } else if total > 50.0 {
            CostLevel::Medium
        } else {
            CostLevel::Normal
        }
    }

    /// Services ordered by descending spend.
    pub fn top_services(&self, n: usize) -> Vec<(&str, f64)> {
        let mut v: Vec<(&str, f64)> = self.by_service.iter().map(|(k, v)| (k.as_str(), *v)).collect();
        v.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        v.truncate(n);
        v
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Horizon {
    Day,
    Month,
}

impl Horizon {
    /// UTC start and exclusive end of the period containing `now`.
    pub fn bounds(self, now: DateTime<Utc>) -> (DateTime<Utc>, DateTime<Utc>) {
        let today = now.date_naive();
        let (start, end) = match self {
            Horizon::Day => (today, today + Duration::days(1)),
            Horizon::Month => {
                let first = today.with_day(1).unwrap_or(today);
                (first, first.checked_add_months(Months::new(1)).unwrap_or(first))
            }
        };
        let midnight = |d: chrono::NaiveDate| Utc.from_utc_datetime(&d.and_time(chrono::NaiveTime::MIN));
        (midnight(start), midnight(end))
    }

    pub fn hours_remaining(self, now: DateTime<Utc>) -> f64 {
        let (_, end) = self.bounds(now);
        ((end - now).num_milliseconds() as f64 / 3_600_000.0).max(0.0)
    }

    pub fn elapsed_fraction(self, now: DateTime<Utc>) -> f64 {
        let (start, end) = self.bounds(now);
        let total = (end - start).num_milliseconds() as f64;
        if total <= 0.0 {
            return 0.0;
        }
        ((now - start).num_milliseconds() as f64 / total).clamp(0.0, 1.0)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Forecast {
    pub horizon: Horizon,
    pub spent: f64,
    pub burn_rate: f64,
    pub hours_remaining: f64,
    pub projected: f64,
    /// `spent` scaled up by how much of the period has elapsed.
    pub run_rate_projection: Option<f64>,
}

impl Forecast {
    pub fn project(spent: f64, burn_rate: f64, now: DateTime<Utc>, horizon: Horizon) -> Self {
        let hours_remaining = horizon.hours_remaining(now);
        let projected = if burn_rate == 0.0 {
            spent
        } else {
            spent + burn_rate * hours_remaining
        };
        let elapsed = horizon.elapsed_fraction(now);
        let run_rate_projection = (elapsed > 0.0).then(|| spent / elapsed);
        Self {
            horizon,
            spent,
            burn_rate,
            hours_remaining,
            projected,
            run_rate_projection,
        }
    }
}
