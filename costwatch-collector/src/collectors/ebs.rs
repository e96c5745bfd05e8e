use anyhow::Result;
use aws_sdk_ec2 as ec2;
use aws_types::SdkConfig;
use serde_json::json;

use super::aws::{name_tag, to_chrono};
use crate::collector_core::{DiscoveredResource, ResourceKind};

pub async fn list_volumes(conf: &SdkConfig, region: &str) -> Result<Vec<DiscoveredResource>> {
    let client = ec2::Client::new(conf);
    let mut out = Vec::new();

    let mut next: Option<String> = None;
    loop {
        let resp = client.describe_volumes().set_next_token(next.clone()).send().await?;

        for vol in resp.volumes() {
            let Some(vol_id) = vol.volume_id() else { continue };

            let mut r = DiscoveredResource::new(ResourceKind::StorageVolume, vol_id, region);
            r.name = name_tag(vol.tags().iter().map(|t| (t.key(), t.value())));
            if let Some(st) = vol.state() {
                r.state = st.as_str().to_string();
            }
            r.size_gb = vol.size().map(|gib| gib as f64);
            r.created_at = vol.create_time().and_then(to_chrono);
            r.attachments = vol
                .attachments()
                .iter()
                .filter_map(|a| a.instance_id().map(|s| s.to_string()))
                .collect();
            if let Some(tp) = vol.volume_type() {
                r.attributes.insert("volume_type".into(), json!(tp.as_str()));
            }
            if let Some(iops) = vol.iops() {
                r.attributes.insert("iops".into(), json!(iops));
            }
            out.push(r);
        }

        next = resp.next_token().map(|s| s.to_string());
        if next.is_none() {
            break;
        }
    }

    Ok(out)
}

/// Snapshots owned by the calling account. `attachments` holds the source volume, if any.
pub async fn list_snapshots(conf: &SdkConfig, region: &str) -> Result<Vec<DiscoveredResource>> {
    let client = ec2::Client::new(conf);
    let mut out = Vec::new();

    let mut next: Option<String> = None;
    loop {
        let resp = client
            .describe_snapshots()
            .owner_ids("self")
            .set_next_token(next.clone())
            .send()
            .await?;

        for snap in resp.snapshots() {
            let Some(snap_id) = snap.snapshot_id() else { continue };

            let mut r = DiscoveredResource::new(ResourceKind::VolumeSnapshot, snap_id, region);
            r.name = name_tag(snap.tags().iter().map(|t| (t.key(), t.value())));
            if let Some(st) = snap.state() {
                r.state = st.as_str().to_string();
            }
            r.size_gb = snap.volume_size().map(|gib| gib as f64);
            r.created_at = snap.start_time().and_then(to_chrono);
            if let Some(vol) = snap.volume_id().filter(|v| !v.is_empty()) {
                r.attachments.push(vol.to_string());
            }
            if let Some(desc) = snap.description().filter(|d| !d.is_empty()) {
                r.attributes.insert("description".into(), json!(desc));
            }
            out.push(r);
        }

        next = resp.next_token().map(|s| s.to_string());
        if next.is_none() {
            break;
        }
    }

    Ok(out)
}
