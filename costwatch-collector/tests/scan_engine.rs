use std::sync::Arc;

use chrono::{DateTime, Duration, TimeZone, Utc};

use costwatch_collector::anomaly::{AnomalyReason, IdleStage, ZombieStage};
use costwatch_collector::collector_core::{AuditEvent, DiscoveredResource, ResourceKind};
use costwatch_collector::config::EngineConfig;
use costwatch_collector::history::{HistoryStore, SqliteHistoryStore};
use costwatch_collector::mock::{MockBilling, MockInventory};
use costwatch_collector::pricing::RateCard;
use costwatch_collector::trend::Trend;
use costwatch_collector::{ScanEngineBuilder, ScanError};

fn now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 6, 12, 9, 30, 0).unwrap()
}

fn config(regions: &[&str]) -> EngineConfig {
    EngineConfig {
        regions: Some(regions.iter().map(|s| s.to_string()).collect()),
        ..EngineConfig::default()
    }
}

fn running(id: &str, partition: &str, class: &str, age_hours: i64) -> DiscoveredResource {
    let mut r = DiscoveredResource::new(ResourceKind::Compute, id, partition);
    r.state = "running".into();
    r.class = Some(class.into());
    r.created_at = Some(now() - Duration::hours(age_hours));
    r
}

fn audit(name: &str, id: &str, offset_secs: i64) -> AuditEvent {
    AuditEvent {
        event_name: name.into(),
        resource_id: Some(id.into()),
        timestamp: now() - Duration::seconds(500) + Duration::seconds(offset_secs),
        actor: "ci-bot".into(),
        service: "ec2.amazonaws.com".into(),
        partition: "r1".into(),
    }
}

#[tokio::test]
async fn failed_partition_scenario() {
    let dir = tempfile::tempdir().unwrap();
    let history = SqliteHistoryStore::open(&dir.path().join("history.db")).unwrap();

    let inventory = MockInventory::new()
        .with(running("i-1", "r1", "test.tiny", 10))
        .failing("r2", ResourceKind::Compute);
    let mut rates = RateCard::default();
    rates.compute_hourly.insert("test.tiny".into(), 0.01);

    let mut engine = ScanEngineBuilder::new(Arc::new(inventory), Arc::new(MockBilling::new()), history.clone())
        .config(config(&["r1", "r2"]))
        .rates(rates)
        .stage(ZombieStage)
        .clock(now)
        .build();

    let snap = engine.scan_once().await.unwrap();
    assert_eq!(snap.count(ResourceKind::Compute), 1);
    let rec = &snap.resources[&ResourceKind::Compute][0];
    assert!((rec.monthly_estimate - 7.2).abs() < 1e-9);
    assert!((rec.cumulative_estimate - 0.10).abs() < 1e-9);
    assert!(snap.anomalies.is_empty());
    assert_eq!(snap.coverage.failure_count(ResourceKind::Compute), 1);
    assert_eq!(snap.coverage.summary().as_deref(), Some("1 region unreachable"));

    let rows = history.recent(10).unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].total_resources, 1);
}

#[tokio::test]
async fn ephemeral_pairs_are_detected_and_not_duplicated() {
    let dir = tempfile::tempdir().unwrap();
    let history = SqliteHistoryStore::open(&dir.path().join("history.db")).unwrap();

    let inventory = MockInventory::new()
        .with_event(audit("RunInstances", "i-short", 0))
        .with_event(audit("TerminateInstances", "i-short", 300))
        .with_event(audit("CreateBucket", "only-created", 10));

    let mut engine = ScanEngineBuilder::new(Arc::new(inventory), Arc::new(MockBilling::new()), history.clone())
        .config(config(&["r1"]))
        .clock(now)
        .build();

    let first = engine.scan_once().await.unwrap();
    assert_eq!(first.ephemeral.len(), 1);
    assert_eq!(first.ephemeral[0].resource_id, "i-short");
    assert_eq!(first.ephemeral[0].lifetime_secs, 300);

    // same lookback window again: the stored row is not repeated
    let second = engine.scan_once().await.unwrap();
    assert_eq!(second.ephemeral, first.ephemeral);
    assert_eq!(history.ephemeral_count().unwrap(), 1);
}

#[tokio::test]
async fn short_threshold_reports_nothing() {
    let inventory = MockInventory::new()
        .with_event(audit("RunInstances", "i-short", 0))
        .with_event(audit("TerminateInstances", "i-short", 300));
    let mut cfg = config(&["r1"]);
    cfg.ephemeral_secs = 100;

    let mut engine = ScanEngineBuilder::new(
        Arc::new(inventory),
        Arc::new(MockBilling::new()),
        SqliteHistoryStore::memory().unwrap(),
    )
    .config(cfg)
    .clock(now)
    .build();

    assert!(engine.scan_once().await.unwrap().ephemeral.is_empty());
}

#[tokio::test]
async fn stages_run_in_registration_order_and_may_overlap() {
    let mut stopped = running("i-stopped", "r1", "t3.micro", 5);
    stopped.state = "stopped".into();
    let inventory = MockInventory::new()
        .with(stopped)
        .with(running("i-idle", "r1", "t3.micro", 5))
        .with_metric("i-idle", vec![0.5, 1.5]);

    let mut engine = ScanEngineBuilder::new(
        Arc::new(inventory),
        Arc::new(MockBilling::new()),
        SqliteHistoryStore::memory().unwrap(),
    )
    .config(config(&["r1"]))
    .stage(ZombieStage)
    .stage(IdleStage::default())
    .clock(now)
    .build();

    let snap = engine.scan_once().await.unwrap();
    let reasons: Vec<_> = snap.anomalies.iter().map(|a| (a.resource_id.as_str(), a.reason)).collect();
    assert_eq!(
        reasons,
        vec![("i-stopped", AnomalyReason::NotRunning), ("i-idle", AnomalyReason::LowUtilization)]
    );
    assert_eq!(snap.anomalies[1].metric, Some(1.0));
}

#[tokio::test]
async fn trend_follows_history_oldest_first() {
    let dir = tempfile::tempdir().unwrap();
    let history = SqliteHistoryStore::open(&dir.path().join("history.db")).unwrap();

    let mut cfg = config(&["r1"]);
    cfg.trend_len = 2;
    let mut engine = ScanEngineBuilder::new(
        Arc::new(MockInventory::new().with(running("i-1", "r1", "m5.large", 1))),
        Arc::new(MockBilling::new()),
        history,
    )
    .config(cfg)
    .clock(now)
    .build();

    engine.scan_once().await.unwrap();
    engine.scan_once().await.unwrap();
    let third = engine.scan_once().await.unwrap();
    match third.trend {
        Trend::Bars { bars, width } => {
            assert_eq!(bars.len(), 2);
            assert!(bars.iter().all(|b| b.len == width));
        }
        Trend::Empty { .. } => panic!("expected bars"),
    }
}

#[tokio::test]
async fn billing_feeds_cost_budgets_and_forecast() {
    let billing = MockBilling::new()
        .anchored(now().date_naive())
        .with_service("Amazon Elastic Compute Cloud - Compute", 40.0)
        .with_prior("Amazon Elastic Compute Cloud - Compute", 90.0)
        .with_usage("USE1-DataTransfer-Out-Bytes", 3.0)
        .with_usage("USE1-USW2-AWS-In-Bytes-Transfer", 1.0)
        .with_budget("team", 50.0, 46.0);

    let mut engine = ScanEngineBuilder::new(
        Arc::new(MockInventory::new().with(running("i-1", "r1", "m5.large", 1))),
        Arc::new(billing),
        SqliteHistoryStore::memory().unwrap(),
    )
    .config(config(&["r1"]))
    .clock(now)
    .build();

    let snap = engine.scan_once().await.unwrap();
    assert_eq!(snap.cost.current_total, 40.0);
    assert_eq!(snap.cost.prior_total, 90.0);
    assert_eq!(snap.cost.north_south, 3.0);
    assert_eq!(snap.cost.east_west, 1.0);
    assert_eq!(snap.budgets.len(), 1);
    assert_eq!(snap.budgets[0].level(), costwatch_collector::collector_core::BudgetLevel::Critical);

    assert!((snap.burn_rate - 0.096).abs() < 1e-12);
    let day = &snap.forecasts[0];
    assert_eq!(day.hours_remaining, 14.5);
    assert!((day.projected - (40.0 + 0.096 * 14.5)).abs() < 1e-9);
}

#[tokio::test]
async fn missing_credentials_stop_the_engine() {
    let mut engine = ScanEngineBuilder::new(
        Arc::new(MockInventory::new().unauthenticated()),
        Arc::new(MockBilling::new()),
        SqliteHistoryStore::memory().unwrap(),
    )
    .config(config(&["r1"]))
    .build();
    assert!(matches!(engine.start().await, Err(ScanError::Authentication(_))));
}

#[tokio::test]
async fn discovered_partitions_are_used_when_not_configured() {
    let inventory = MockInventory::new()
        .with_partitions(&["a", "b"])
        .with(running("i-a", "a", "t3.micro", 1))
        .with(running("i-b", "b", "t3.micro", 1));
    let mut engine = ScanEngineBuilder::new(
        Arc::new(inventory),
        Arc::new(MockBilling::new()),
        SqliteHistoryStore::memory().unwrap(),
    )
    .clock(now)
    .build();

    let snap = engine.scan_once().await.unwrap();
    assert_eq!(snap.partitions, vec!["a".to_string(), "b".to_string()]);
    assert_eq!(snap.count(ResourceKind::Compute), 2);
}

#[tokio::test]
async fn snapshot_serializes_to_json() {
    let mut engine = ScanEngineBuilder::new(
        Arc::new(MockInventory::demo()),
        Arc::new(MockBilling::demo()),
        SqliteHistoryStore::memory().unwrap(),
    )
    .config(config(&["us-east-1", "ap-northeast-2"]))
    .default_stages()
    .build();

    let snap = engine.scan_once().await.unwrap();
    let json = serde_json::to_value(&snap).unwrap();
    assert_eq!(json["sequence"], 1);
    assert!(json["resources"]["Compute"].is_array());
    assert!(json["coverage"]["failedPartitions"].is_object());
    assert!(!snap.anomalies.is_empty());
    assert_eq!(snap.ephemeral.len(), 1);
}
