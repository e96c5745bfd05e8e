use anyhow::Result;
use aws_sdk_rds as rds;
use aws_types::SdkConfig;

use super::aws::to_chrono;
use crate::collector_core::{DiscoveredResource, ResourceKind};

const FREE_TIER_CLASSES: [&str; 2] = ["db.t2.micro", "db.t3.micro"];

pub async fn list_instances(conf: &SdkConfig, region: &str) -> Result<Vec<DiscoveredResource>> {
    let client = rds::Client::new(conf);
    let mut out = Vec::new();

    let mut marker: Option<String> = None;
    loop {
        let resp = client.describe_db_instances().set_marker(marker.clone()).send().await?;

        for db in resp.db_instances() {
            let Some(id) = db.db_instance_identifier() else { continue };

            let mut r = DiscoveredResource::new(ResourceKind::Database, id, region);
            r.state = db.db_instance_status().unwrap_or_default().to_string();
            r.class = db.db_instance_class().map(|s| s.to_string());
            r.created_at = db.instance_create_time().and_then(to_chrono);
            r.free_tier_eligible = r
                .class
                .as_deref()
                .is_some_and(|c| FREE_TIER_CLASSES.contains(&c));
            r.attributes = maplit::hashmap! {
                "engine".into() => serde_json::json!(db.engine()),
                "engine_version".into() => serde_json::json!(db.engine_version()),
                "allocated_storage_gb".into() => serde_json::json!(db.allocated_storage()),
                "multi_az".into() => serde_json::json!(db.multi_az()),
            };
            out.push(r);
        }

        marker = resp.marker().map(|s| s.to_string());
        if marker.is_none() {
            break;
        }
    }

    Ok(out)
}
