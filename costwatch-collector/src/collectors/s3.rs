use anyhow::Result;
use aws_sdk_s3 as s3;
use aws_types::SdkConfig;
use tracing::debug;

use super::aws::to_chrono;
use crate::collector_core::{DiscoveredResource, ResourceKind};

/// Buckets in the account, tagged with their home region. Size is left
/// unknown so pricing falls back to the assumed-size placeholder.
pub async fn list_buckets(conf: &SdkConfig) -> Result<Vec<DiscoveredResource>> {
    let client = s3::Client::new(conf);
    let resp = client.list_buckets().send().await?;

    let mut out = Vec::new();
    for b in resp.buckets() {
        let Some(name) = b.name() else { continue };

        // an empty location constraint means us-east-1
        let region = match client.get_bucket_location().bucket(name).send().await {
            Ok(loc) => loc
                .location_constraint()
                .map(|v| v.as_str().to_string())
                .filter(|s| !s.is_empty())
                .unwrap_or_else(|| "us-east-1".to_string()),
            Err(e) => {
                debug!(bucket = name, error = %e, "bucket location unavailable");
                "unknown".to_string()
            }
        };

        let mut r = DiscoveredResource::new(ResourceKind::StorageBucket, name, region);
        r.state = "available".into();
        r.created_at = b.creation_date().and_then(to_chrono);
        out.push(r);
    }

    Ok(out)
}
