use anyhow::{anyhow, Result};
use async_trait::async_trait;
use reqwest::Client;
use std::time::Duration;
use tracing::warn;

use super::SnapshotSink;
use crate::snapshot::Snapshot;

const CONNECT_TIMEOUT: u64 = 5;
const READ_TIMEOUT: u64 = 60;
const RETRIES: usize = 3;

pub struct HttpSink {
    client: Client,
    endpoint: String,
}

impl HttpSink {
    pub fn new(endpoint: &str) -> Result<Self> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(CONNECT_TIMEOUT))
            .timeout(Duration::from_secs(READ_TIMEOUT))
            .build()?;
        Ok(Self {
            client,
            endpoint: endpoint.to_string(),
        })
    }
}

#[async_trait]
impl SnapshotSink for HttpSink {
    async fn publish(&self, snapshot: &Snapshot) -> Result<()> {
        post_snapshot(&self.client, &self.endpoint, snapshot).await
    }
}

/// POST with linear backoff between attempts.
pub async fn post_snapshot(client: &Client, endpoint: &str, snapshot: &Snapshot) -> Result<()> {
    let mut last = None;
    for attempt in 1..=RETRIES {
        let res = client.post(endpoint).json(snapshot).send().await;
        match res {
            Ok(r) if r.status().is_success() => return Ok(()),
            Ok(r) => last = Some(anyhow!("HTTP {} {}", r.status(), r.text().await.unwrap_or_default())),
            Err(e) => last = Some(anyhow!(e)),
        }
        if attempt < RETRIES {
            warn!(attempt, endpoint, "snapshot post failed, retrying");
            tokio::time::sleep(Duration::from_millis(300 * attempt as u64)).await;
        }
    }
    Err(last.unwrap_or_else(|| anyhow!("snapshot post failed")))
}
