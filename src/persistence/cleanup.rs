//! Periodic sweep of expired checkpoints

use crate::persistence::CheckpointStorage;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// How often the sweep runs unless configured otherwise (one hour)
pub const DEFAULT_CLEANUP_INTERVAL: Duration = Duration::from_secs(60 * 60);

/// Background task deleting expired checkpoint rows
///
/// The only mutation it performs is `delete_expired`, so it is safe to run
/// alongside active runs writing checkpoints. Storage failures are logged and
/// the next tick runs as scheduled.
pub struct CheckpointCleanupTask {
    storage: Arc<dyn CheckpointStorage>,
    interval: Duration,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl CheckpointCleanupTask {
    pub fn new(storage: Arc<dyn CheckpointStorage>) -> Self {
        Self::with_interval(storage, DEFAULT_CLEANUP_INTERVAL)
    }

    pub fn with_interval(storage: Arc<dyn CheckpointStorage>, interval: Duration) -> Self {
        Self {
            storage,
            interval,
            handle: Mutex::new(None),
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Start sweeping on the configured interval
    ///
    /// Must be called from within a tokio runtime. Calling it again while the
    /// task is running logs a warning and does nothing.
    pub fn start(&self) {
        let mut handle = self.handle.lock().unwrap_or_else(PoisonError::into_inner);
        if handle.as_ref().is_some_and(|h| !h.is_finished()) {
            warn!("Checkpoint cleanup task already running");
            return;
        }

        let storage = self.storage.clone();
        let period = self.interval;
        info!(interval_secs = period.as_secs(), "Starting checkpoint cleanup task");

        *handle = Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.tick().await; // First tick completes immediately, skip it

            loop {
                ticker.tick().await;
                Self::sweep(storage.as_ref()).await;
            }
        }));
    }

    /// Stop the periodic sweep; a no-op when not running
    pub fn stop(&self) {
        let mut handle = self.handle.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(handle) = handle.take() {
            handle.abort();
            info!("Stopped checkpoint cleanup task");
        }
    }

    pub fn is_running(&self) -> bool {
        self.handle
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .is_some_and(|h| !h.is_finished())
    }

    /// Run one sweep now, returning the number of rows deleted
    ///
    /// Never fails: storage errors are logged and reported as zero deletions.
    pub async fn run_once(&self) -> u64 {
        Self::sweep(self.storage.as_ref()).await
    }

    async fn sweep(storage: &dyn CheckpointStorage) -> u64 {
        match storage.delete_expired().await {
            Ok(0) => {
                debug!("Checkpoint cleanup found nothing to delete");
                0
            }
            Ok(deleted) => {
                info!(deleted, "Deleted expired checkpoints");
                deleted
            }
            Err(e) => {
                error!(error = %e, "Checkpoint cleanup failed");
                0
            }
        }
    }
}

impl Drop for CheckpointCleanupTask {
    fn drop(&mut self) {
        if let Some(handle) = self
            .handle
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        {
            handle.abort();
        }
    }
}
