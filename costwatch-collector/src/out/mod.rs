use std::io::Write;

use anyhow::Result;
use async_trait::async_trait;
use tracing::{debug, info, warn};

use crate::snapshot::Snapshot;

pub mod http;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OutMode {
    Stdout,
    Http,
}

impl OutMode {
    pub fn parse(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "http" => OutMode::Http,
            _ => OutMode::Stdout,
        }
    }
}

/// Where finished snapshots go.
#[async_trait]
pub trait SnapshotSink: Send + Sync {
    async fn publish(&self, snapshot: &Snapshot) -> Result<()>;
}

pub struct StdoutSink;

#[async_trait]
impl SnapshotSink for StdoutSink {
    async fn publish(&self, snapshot: &Snapshot) -> Result<()> {
        emit_stdout(snapshot)
    }
}

/// Writes the snapshot as one pretty JSON document; the summary goes to the log.
pub fn emit_stdout(snapshot: &Snapshot) -> Result<()> {
    log_summary(snapshot);
    let stdout = std::io::stdout();
    write_json(&mut stdout.lock(), snapshot)
}

pub fn write_json(w: &mut impl Write, snapshot: &Snapshot) -> Result<()> {
    serde_json::to_writer_pretty(&mut *w, snapshot)?;
    writeln!(w)?;
    w.flush()?;
    Ok(())
}

fn log_summary(snapshot: &Snapshot) {
    let top: Vec<String> = snapshot
        .cost
        .top_services(3)
        .into_iter()
        .map(|(service, amount)| format!("{service}=${amount:.2}"))
        .collect();
    info!(
        sequence = snapshot.sequence,
        account = snapshot.identity.display_name(),
        resources = snapshot.resource_count(),
        monthly = %format!("{:.2}", snapshot.total_monthly()),
        month_to_date = %format!("{:.2}", snapshot.cost.current_total),
        level = ?snapshot.cost.level(),
        top_services = %top.join(", "),
        "snapshot"
    );
    if let Some(summary) = snapshot.coverage.summary() {
        warn!(sequence = snapshot.sequence, "{summary}");
    }
    debug!("trend\n{}", snapshot.trend.render());
}

pub fn sink_for(mode: OutMode, endpoint: &str) -> Result<Box<dyn SnapshotSink>> {
    Ok(match mode {
        OutMode::Stdout => Box::new(StdoutSink),
        OutMode::Http => Box::new(http::HttpSink::new(endpoint)?),
    })
}
