//! Periodic sample retention
//!
//! Samples are append-only and would grow without bound, so a background
//! task deletes samples older than the configured number of days. It runs
//! once at startup and then every `CLEANUP_INTERVAL`. Events are kept.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time;
use tracing::{debug, error, info, trace};

use super::StorageBackend;

/// Cleanup interval - run retention cleanup daily
pub const CLEANUP_INTERVAL: Duration = Duration::from_secs(24 * 60 * 60);

/// Handle for the retention task
pub struct RetentionHandle {
    shutdown_tx: Option<oneshot::Sender<()>>,
    task: JoinHandle<()>,
}

impl RetentionHandle {
    /// Spawn the retention loop for `store`
    pub fn spawn(store: Arc<dyn StorageBackend>, retention_days: u32) -> Self {
        Self::spawn_with_interval(store, retention_days, CLEANUP_INTERVAL)
    }

    pub fn spawn_with_interval(store: Arc<dyn StorageBackend>, retention_days: u32, every: Duration) -> Self {
        let (shutdown_tx, mut shutdown_rx) = oneshot::channel();

        let task = tokio::spawn(async move {
            debug!("retention cleanup enabled: {} days", retention_days);
            // First tick fires immediately
            let mut cleanup_interval = time::interval(every);

            loop {
                tokio::select! {
                    _ = &mut shutdown_rx => break,
                    _ = cleanup_interval.tick() => {
                        run_cleanup(store.as_ref(), retention_days).await;
                    }
                }
            }

            debug!("retention task stopped");
        });

        Self {
            shutdown_tx: Some(shutdown_tx),
            task,
        }
    }

    /// Stop the loop and wait for it to exit
    pub async fn shutdown(mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        let _ = self.task.await;
    }
}

/// Delete samples older than `retention_days`, returning how many went
pub async fn run_cleanup(store: &dyn StorageBackend, retention_days: u32) -> usize {
    let cutoff = chrono::Utc::now() - chrono::Duration::days(retention_days as i64);
    debug!("running retention cleanup (deleting samples before {})", cutoff);

    match store.cleanup_old_samples(cutoff).await {
        Ok(0) => {
            trace!("retention cleanup: no old samples to delete");
            0
        }
        Ok(deleted) => {
            info!("retention cleanup complete: deleted {} old samples", deleted);
            deleted
        }
        Err(e) => {
            // Retried on the next tick
            error!("failed to cleanup old samples: {}", e);
            0
        }
    }
}
