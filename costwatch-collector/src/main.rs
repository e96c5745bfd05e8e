use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::sync::watch;
use tracing::info;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

use costwatch_collector::collector_core::{BillingProvider, InventoryProvider};
use costwatch_collector::collectors::aws::{load_config, AwsBilling, AwsInventory};
use costwatch_collector::config::{EngineConfig, LogFormat};
use costwatch_collector::history::{HistoryStore, MemoryHistoryStore, SqliteHistoryStore};
use costwatch_collector::mock::{MockBilling, MockInventory};
use costwatch_collector::{out, ScanEngineBuilder};

fn init_logging(format: LogFormat) -> Result<()> {
    let env_filter = EnvFilter::builder()
        .with_default_directive(tracing::level_filters::LevelFilter::INFO.into())
        .from_env_lossy();
    let registry = tracing_subscriber::registry().with(env_filter);
    match format {
        LogFormat::Json => registry.with(fmt::layer().json().with_target(true)).try_init()?,
        LogFormat::Text => registry.with(fmt::layer().with_target(false)).try_init()?,
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let config = EngineConfig::from_env()?;
    init_logging(config.log_format)?;

    let (inventory, billing, history): (Arc<dyn InventoryProvider>, Arc<dyn BillingProvider>, Box<dyn HistoryStore>) =
        if config.mock {
            info!("MOCK_MODE enabled, using in-memory providers");
            (
                Arc::new(MockInventory::demo()),
                Arc::new(MockBilling::demo()),
                Box::new(MemoryHistoryStore::new()),
            )
        } else {
            let base = load_config(&config.home_region).await;
            let history = SqliteHistoryStore::open(&config.db_path)
                .with_context(|| format!("opening history database {}", config.db_path.display()))?;
            (
                Arc::new(AwsInventory::new(base.clone(), &config.home_region)),
                Arc::new(AwsBilling::new(&base)),
                Box::new(history),
            )
        };

    let sink = out::sink_for(config.out, &config.endpoint)?;
    let mut engine = ScanEngineBuilder::new(inventory, billing, history)
        .config(config)
        .default_stages()
        .build();

    let (tx, rx) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("shutdown requested, finishing current scan");
            let _ = tx.send(true);
        }
    });

    engine.run(sink.as_ref(), rx).await?;
    Ok(())
}
