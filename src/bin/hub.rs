use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use tracing::{debug, error, info, level_filters::LevelFilter, trace, warn};
use tracing_subscriber::{filter, layer::SubscriberExt, util::SubscriberInitExt};
use uptime_monitor::{
    EventBus, MonitorManager, RunnerContext, StorageBackend,
    config::{Config, StorageConfig, read_config_file},
    notifications::{ChannelRegistry, NotificationDispatcher},
    probes::ProbeRegistry,
    storage::{memory::MemoryBackend, retention::RetentionHandle},
};

#[derive(Debug, Clone, Parser)]
struct Args {
    /// Config file
    #[arg(short)]
    file: String,

    /// Log level for the engine (error, warn, info, debug, trace)
    #[arg(long, default_value = "info")]
    log_level: LevelFilter,
}

fn init(level: LevelFilter) {
    let filter = filter::Targets::new().with_targets(vec![("uptime_monitor", level), ("uptime_hub", level)]);
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .compact()
                .with_ansi(false),
        )
        .with(filter)
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    let args = Args::parse();
    init(args.log_level);
    trace!("started with args: {args:?}");

    let config = read_config_file(&args.file)?;

    let (store, retention) = open_store(&config.storage).await?;

    let probes = Arc::new(ProbeRegistry::with_defaults());
    let dispatcher = NotificationDispatcher::new(Arc::new(ChannelRegistry::with_defaults()));
    let event_bus = EventBus::new(config.event_bus.capacity);
    let ctx = RunnerContext::new(store.clone(), dispatcher, event_bus)
        .with_probe_deadline(Duration::from_secs(config.runner.probe_deadline_secs));
    let manager = MonitorManager::new(ctx, probes).with_min_interval(config.runner.min_interval_secs);

    apply_seeds(&manager, &config).await;

    let started = manager.bootstrap().await?;
    info!("{started} monitors running");

    tokio::signal::ctrl_c().await.context("failed to listen for shutdown signal")?;
    info!("shutting down");

    manager.shutdown().await;
    if let Some(retention) = retention {
        retention.shutdown().await;
    }
    if let Err(e) = store.close().await {
        warn!("failed to close storage: {e}");
    }

    Ok(())
}

async fn open_store(config: &StorageConfig) -> anyhow::Result<(Arc<dyn StorageBackend>, Option<RetentionHandle>)> {
    match config {
        StorageConfig::None => {
            info!("using in-memory storage");
            Ok((Arc::new(MemoryBackend::new()), None))
        }
        #[cfg(feature = "storage-sqlite")]
        StorageConfig::Sqlite { path, retention_days } => {
            info!("using sqlite storage at {}", path.display());
            let backend = uptime_monitor::storage::sqlite::SqliteBackend::new(path).await?;
            let store: Arc<dyn StorageBackend> = Arc::new(backend);
            let retention = RetentionHandle::spawn(store.clone(), *retention_days);
            Ok((store, Some(retention)))
        }
        #[cfg(not(feature = "storage-sqlite"))]
        StorageConfig::Sqlite { .. } => {
            anyhow::bail!("sqlite storage requested but the storage-sqlite feature is disabled")
        }
    }
}

/// Writes the notifications and monitors listed in the config file before
/// the stored active monitors are started.
async fn apply_seeds(manager: &MonitorManager, config: &Config) {
    for notification in &config.notifications {
        match manager.upsert_notification(notification.clone()).await {
            Ok(record) => debug!("seeded notification {} ({})", record.name, record.id),
            Err(e) => error!("failed to seed notification {}: {e}", notification.name),
        }
    }

    for monitor in &config.monitors {
        match manager.upsert_monitor(monitor.clone()).await {
            Ok(record) => debug!("seeded monitor {} ({})", record.name, record.id),
            Err(e) => error!("failed to seed monitor {}: {e}", monitor.name),
        }
    }
}
