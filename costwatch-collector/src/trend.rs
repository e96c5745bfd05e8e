use serde::{Deserialize, Serialize};

use crate::snapshot::ScanHistoryEntry;

pub const EMPTY_PLACEHOLDER: &str = "No history yet";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrendBar {
    pub label: String,
    pub value: f64,
    pub len: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum Trend {
    Empty { message: String },
    Bars { width: usize, bars: Vec<TrendBar> },
}

impl Trend {
    /// Bars scaled to the largest value in `points`, oldest first.
    pub fn from_values(points: &[(String, f64)], width: usize) -> Self {
        if points.is_empty() {
            return Trend::Empty {
                message: EMPTY_PLACEHOLDER.to_string(),
            };
        }
        let max = points.iter().map(|(_, v)| *v).fold(0.0_f64, f64::max);
        let bars = points
            .iter()
            .map(|(label, value)| {
                let len = if max > 0.0 {
                    ((value.max(0.0) / max) * width as f64) as usize
                } else {
                    0
                };
                TrendBar {
                    label: label.clone(),
                    value: *value,
                    len,
                }
            })
            .collect();
        Trend::Bars { width, bars }
    }

    /// Monthly-estimate trend over history rows ordered oldest to newest.
    pub fn from_history(entries: &[ScanHistoryEntry], width: usize) -> Self {
        let points: Vec<(String, f64)> = entries
            .iter()
            .map(|e| (e.timestamp.format("%H:%M").to_string(), e.total_monthly))
            .collect();
        Self::from_values(&points, width)
    }

    pub fn render(&self) -> String {
        match self {
            Trend::Empty { message } => message.clone(),
            Trend::Bars { bars, .. } => bars
                .iter()
                .map(|b| format!("{} {} ${:.2}", b.label, "█".repeat(b.len), b.value))
                .collect::<Vec<_>>()
                .join("\n"),
        }
    }
}
