use anyhow::Result;
use aws_sdk_ec2 as ec2;
use aws_types::SdkConfig;
use serde_json::json;

use super::aws::{name_tag, to_chrono};
use crate::collector_core::{DiscoveredResource, ResourceKind};

const FREE_TIER_CLASSES: [&str; 2] = ["t2.micro", "t3.micro"];

pub async fn list_instances(conf: &SdkConfig, region: &str) -> Result<Vec<DiscoveredResource>> {
    let client = ec2::Client::new(conf);
    let mut out = Vec::new();

    let mut token: Option<String> = None;
    loop {
        let mut req = client.describe_instances();
        if let Some(t) = token.as_deref() {
            req = req.next_token(t);
        }
        let resp = req.send().await?;

        for res in resp.reservations() {
            for inst in res.instances() {
                let Some(instance_id) = inst.instance_id() else { continue };

                let mut r = DiscoveredResource::new(ResourceKind::Compute, instance_id, region);
                r.name = name_tag(inst.tags().iter().map(|t| (t.key(), t.value())));
                if let Some(st) = inst.state().and_then(|s| s.name()) {
                    r.state = st.as_str().to_string();
                }
                r.class = inst.instance_type().map(|t| t.as_str().to_string());
                r.created_at = inst.launch_time().and_then(to_chrono);
                r.free_tier_eligible = r
                    .class
                    .as_deref()
                    .is_some_and(|c| FREE_TIER_CLASSES.contains(&c));
                if let Some(plat) = inst.platform_details() {
                    r.attributes.insert("platform".into(), json!(plat));
                }
                if let Some(vpc) = inst.vpc_id() {
                    r.attributes.insert("vpc_id".into(), json!(vpc));
                }
                if let Some(pub_ip) = inst.public_ip_address() {
                    r.attributes.insert("public_ip".into(), json!(pub_ip));
                }
                out.push(r);
            }
        }

        token = resp.next_token().map(|s| s.to_string());
        if token.is_none() {
            break;
        }
    }

    Ok(out)
}

/// Enabled regions as seen from `conf`'s region.
pub async fn enabled_regions(conf: &SdkConfig) -> Result<Vec<String>> {
    let client = ec2::Client::new(conf);
    let resp = client.describe_regions().all_regions(false).send().await?;
    let mut regions: Vec<String> = resp
        .regions()
        .iter()
        .filter_map(|r| r.region_name().map(|s| s.to_string()))
        .collect();
    regions.sort();
    Ok(regions)
}
