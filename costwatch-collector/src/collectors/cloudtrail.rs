use anyhow::Result;
use aws_sdk_cloudtrail as ct;
use aws_types::SdkConfig;

use super::aws::{to_chrono, to_smithy};
use crate::collector_core::{AuditEvent, TimeWindow};

/// Management events inside `window`, as recorded by the trail in `conf`'s region.
pub async fn lookup_events(conf: &SdkConfig, home_region: &str, window: TimeWindow) -> Result<Vec<AuditEvent>> {
    let client = ct::Client::new(conf);
    let mut out = Vec::new();

    let mut token: Option<String> = None;
    loop {
        let resp = client
            .lookup_events()
            .start_time(to_smithy(window.start))
            .end_time(to_smithy(window.end))
            .set_next_token(token.clone())
            .send()
            .await?;

        for ev in resp.events() {
            let (Some(name), Some(ts)) = (ev.event_name(), ev.event_time().and_then(to_chrono)) else {
                continue;
            };
            let partition = ev
                .cloud_trail_event()
                .and_then(event_region)
                .unwrap_or_else(|| home_region.to_string());
            out.push(AuditEvent {
                event_name: name.to_string(),
                resource_id: ev
                    .resources()
                    .first()
                    .and_then(|r| r.resource_name())
                    .map(|s| s.to_string()),
                timestamp: ts,
                actor: ev.username().unwrap_or_default().to_string(),
                service: ev.event_source().unwrap_or("unknown").to_string(),
                partition,
            });
        }

        token = resp.next_token().map(|s| s.to_string());
        if token.is_none() {
            break;
        }
    }

    Ok(out)
}

/// `awsRegion` from the raw event document.
fn event_region(raw: &str) -> Option<String> {
    let doc: serde_json::Value = serde_json::from_str(raw).ok()?;
    doc.get("awsRegion")?.as_str().map(|s| s.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn region_is_read_from_event_document() {
        let raw = r#"{"eventVersion":"1.08","awsRegion":"eu-west-1","eventName":"RunInstances"}"#;
        assert_eq!(event_region(raw).as_deref(), Some("eu-west-1"));
        assert_eq!(event_region("not json"), None);
        assert_eq!(event_region("{}"), None);
    }
}
