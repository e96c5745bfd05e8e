//! Pairs create/delete audit events into short-lived resource records.
//!
//! Classification matches a fixed list of lifecycle API names. Calls that
//! only touch a resource (tags, attributes, snapshots of it) never match,
//! and lifecycle APIs outside the list are missed, which is accepted.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::collector_core::AuditEvent;

const CREATE_EVENTS: [&str; 5] = [
    "RunInstances",
    "CreateFunction",
    "CreateBucket",
    "CreateVolume",
    "CreateDBInstance",
];
const DELETE_EVENTS: [&str; 5] = [
    "TerminateInstances",
    "DeleteFunction",
    "DeleteBucket",
    "DeleteVolume",
    "DeleteDBInstance",
];

/// Lambda records versioned names such as `CreateFunction20150331`.
fn api_name(event_name: &str) -> &str {
    event_name.trim_end_matches(|c: char| c.is_ascii_digit())
}

pub fn is_create_event(event_name: &str) -> bool {
    CREATE_EVENTS.contains(&api_name(event_name))
}

pub fn is_delete_event(event_name: &str) -> bool {
    DELETE_EVENTS.contains(&api_name(event_name))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LifecycleAction {
    Create,
    Delete,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LifecycleEvent {
    pub resource_id: String,
    pub action: LifecycleAction,
    pub timestamp: DateTime<Utc>,
    pub actor: String,
    pub event_name: String,
    pub service: String,
    pub partition: String,
}

impl LifecycleEvent {
    /// `None` when the event has no resource id or is neither a create nor a delete.
    pub fn from_audit(ev: &AuditEvent) -> Option<Self> {
        let resource_id = ev.resource_id.as_deref().filter(|s| !s.is_empty())?;
        let action = if is_delete_event(&ev.event_name) {
            LifecycleAction::Delete
        } else if is_create_event(&ev.event_name) {
            LifecycleAction::Create
        } else {
            return None;
        };
        Some(Self {
            resource_id: resource_id.to_string(),
            action,
            timestamp: ev.timestamp,
            actor: ev.actor.clone(),
            event_name: ev.event_name.clone(),
            service: ev.service.clone(),
            partition: ev.partition.clone(),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EphemeralRecord {
    pub resource_id: String,
    pub service: String,
    pub partition: String,
    pub actor: String,
    pub created: DateTime<Utc>,
    pub deleted: DateTime<Utc>,
    pub lifetime_secs: i64,
}

pub fn classify(events: &[AuditEvent]) -> Vec<LifecycleEvent> {
    events.iter().filter_map(LifecycleEvent::from_audit).collect()
}

/// Resources created and deleted within `threshold_secs` of each other.
///
/// The last event per resource and action wins. Output is ordered by resource id.
pub fn correlate(events: &[LifecycleEvent], threshold_secs: i64) -> Vec<EphemeralRecord> {
    let mut creates: BTreeMap<&str, &LifecycleEvent> = BTreeMap::new();
    let mut deletes: BTreeMap<&str, &LifecycleEvent> = BTreeMap::new();
    for ev in events {
        let map = match ev.action {
            LifecycleAction::Create => &mut creates,
            LifecycleAction::Delete => &mut deletes,
        };
        map.insert(ev.resource_id.as_str(), ev);
    }

    creates
        .into_iter()
        .filter_map(|(id, created)| {
            let deleted = deletes.get(id)?;
            let lifetime = (deleted.timestamp - created.timestamp).num_seconds();
            if lifetime < 0 || lifetime >= threshold_secs {
                return None;
            }
            Some(EphemeralRecord {
                resource_id: id.to_string(),
                service: created.service.clone(),
                partition: created.partition.clone(),
                actor: created.actor.clone(),
                created: created.timestamp,
                deleted: deleted.timestamp,
                lifetime_secs: lifetime,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap()
    }

    fn ev(id: &str, action: LifecycleAction, offset_secs: i64) -> LifecycleEvent {
        LifecycleEvent {
            resource_id: id.into(),
            action,
            timestamp: t0() + Duration::seconds(offset_secs),
            actor: "alice".into(),
            event_name: match action {
                LifecycleAction::Create => "RunInstances".into(),
                LifecycleAction::Delete => "TerminateInstances".into(),
            },
            service: "ec2.amazonaws.com".into(),
            partition: "r1".into(),
        }
    }

    #[test]
    fn keyword_predicates() {
        assert!(is_create_event("RunInstances"));
        assert!(is_create_event("CreateBucket"));
        assert!(is_create_event("CreateFunction20150331"));
        assert!(is_delete_event("TerminateInstances"));
        assert!(is_delete_event("DeleteBucket"));
        assert!(!is_create_event("StartInstances"));
        assert!(!is_delete_event("StopInstances"));
        assert!(is_delete_event("DeleteFunction20150331"));
        assert!(!is_create_event("CreateFunctionUrlConfig"));
    }

    #[test]
    fn tag_and_attribute_calls_are_not_lifecycle_events() {
        for name in ["CreateTags", "DeleteTags", "CreateSnapshot", "DeleteNetworkInterface"] {
            assert!(!is_create_event(name), "{name}");
            assert!(!is_delete_event(name), "{name}");
        }
    }

    fn audit(name: &str, id: &str, offset_secs: i64) -> AuditEvent {
        AuditEvent {
            event_name: name.into(),
            resource_id: Some(id.into()),
            timestamp: t0() + Duration::seconds(offset_secs),
            actor: "carol".into(),
            service: "ec2.amazonaws.com".into(),
            partition: "r1".into(),
        }
    }

    #[test]
    fn tagging_does_not_fake_a_lifetime() {
        let tagged_then_terminated = vec![audit("CreateTags", "i-old", 0), audit("TerminateInstances", "i-old", 120)];
        assert!(correlate(&classify(&tagged_then_terminated), 600).is_empty());

        let launched_then_untagged = vec![audit("RunInstances", "i-new", 0), audit("DeleteTags", "i-new", 60)];
        assert!(correlate(&classify(&launched_then_untagged), 600).is_empty());
    }

    #[test]
    fn short_lived_pair_is_reported() {
        let events = vec![ev("X", LifecycleAction::Create, 0), ev("X", LifecycleAction::Delete, 300)];
        let out = correlate(&events, 600);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].lifetime_secs, 300);
        assert_eq!(out[0].resource_id, "X");
    }

    #[test]
    fn lifetime_at_or_above_threshold_is_not_reported() {
        let events = vec![ev("X", LifecycleAction::Create, 0), ev("X", LifecycleAction::Delete, 300)];
        assert!(correlate(&events, 100).is_empty());
        assert!(correlate(&events, 300).is_empty());
    }

    #[test]
    fn negative_lifetime_is_rejected() {
        let events = vec![ev("X", LifecycleAction::Create, 200), ev("X", LifecycleAction::Delete, 100)];
        assert!(correlate(&events, 600).is_empty());
    }

    #[test]
    fn one_sided_ids_are_dropped() {
        let events = vec![ev("A", LifecycleAction::Create, 0), ev("B", LifecycleAction::Delete, 10)];
        assert!(correlate(&events, 600).is_empty());
    }

    #[test]
    fn last_event_per_action_wins() {
        let events = vec![
            ev("X", LifecycleAction::Create, 0),
            ev("X", LifecycleAction::Create, 250),
            ev("X", LifecycleAction::Delete, 300),
        ];
        let out = correlate(&events, 600);
        assert_eq!(out[0].lifetime_secs, 50);
    }

    #[test]
    fn replay_is_idempotent_and_sorted() {
        let events = vec![
            ev("b", LifecycleAction::Delete, 20),
            ev("a", LifecycleAction::Create, 0),
            ev("b", LifecycleAction::Create, 5),
            ev("a", LifecycleAction::Delete, 30),
        ];
        let first = correlate(&events, 600);
        let second = correlate(&events, 600);
        assert_eq!(first, second);
        let ids: Vec<_> = first.iter().map(|r| r.resource_id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b"]);
    }

    #[test]
    fn audit_events_without_id_are_dropped() {
        let audit = vec![
            AuditEvent {
                event_name: "RunInstances".into(),
                resource_id: None,
                timestamp: t0(),
                actor: "bob".into(),
                service: "ec2.amazonaws.com".into(),
                partition: "r1".into(),
            },
            AuditEvent {
                event_name: "DescribeInstances".into(),
                resource_id: Some("i-1".into()),
                timestamp: t0(),
                actor: "bob".into(),
                service: "ec2.amazonaws.com".into(),
                partition: "r1".into(),
            },
            AuditEvent {
                event_name: "DeleteBucket".into(),
                resource_id: Some("logs".into()),
                timestamp: t0(),
                actor: "bob".into(),
                service: "s3.amazonaws.com".into(),
                partition: "us-east-1".into(),
            },
        ];
        let classified = classify(&audit);
        assert_eq!(classified.len(), 1);
        assert_eq!(classified[0].action, LifecycleAction::Delete);
    }
}
