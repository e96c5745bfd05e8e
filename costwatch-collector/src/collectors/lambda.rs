use anyhow::Result;
use aws_sdk_lambda as lambda;
use aws_types::SdkConfig;
use serde_json::json;

use crate::collector_core::{DiscoveredResource, ResourceKind};

pub async fn list_functions(conf: &SdkConfig, region: &str) -> Result<Vec<DiscoveredResource>> {
    let client = lambda::Client::new(conf);
    let mut out = Vec::new();

    let mut marker: Option<String> = None;
    loop {
        let resp = client.list_functions().set_marker(marker.clone()).send().await?;

        for f in resp.functions() {
            let Some(name) = f.function_name() else { continue };

            let mut r = DiscoveredResource::new(ResourceKind::Function, name, region);
            r.state = f.state().map(|s| s.as_str().to_string()).unwrap_or_else(|| "Active".into());
            r.size_gb = Some(f.code_size() as f64 / (1024.0 * 1024.0 * 1024.0));
            // the API only reports last-modified, so age is unknown
            if let Some(runtime) = f.runtime() {
                r.attributes.insert("runtime".into(), json!(runtime.as_str()));
            }
            if let Some(mem) = f.memory_size() {
                r.attributes.insert("memory_mb".into(), json!(mem));
            }
            if let Some(modified) = f.last_modified() {
                r.attributes.insert("last_modified".into(), json!(modified));
            }
            out.push(r);
        }

        marker = resp.next_marker().map(|s| s.to_string());
        if marker.is_none() {
            break;
        }
    }

    Ok(out)
}
