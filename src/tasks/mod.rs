//! Background Tasks Module
//!
//! Contains background tasks that run periodically for the lifetime of the
//! client, each with an explicit stop.
//!
//! # Tasks
//! - Cache cleanup: evicts expired entries from both cache tiers
//! - Telemetry flush: ships buffered metrics, interactions and errors
//! - Log flush: ships buffered log entries

mod cleanup;
mod flush;

use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{info, warn};

pub use cleanup::spawn_cleanup_task;
pub use flush::{spawn_log_flush_task, spawn_telemetry_flush_task};

// == Task Handle ==
/// Handle to a periodic background task.
///
/// `stop` lets the task finish its current tick (and run its shutdown work,
/// such as a final flush); `abort` cancels it immediately.
#[derive(Debug)]
pub struct TaskHandle {
    name: &'static str,
    shutdown: watch::Sender<bool>,
    join: JoinHandle<()>,
}

impl TaskHandle {
    pub(crate) fn new(name: &'static str, shutdown: watch::Sender<bool>, join: JoinHandle<()>) -> Self {
        Self {
            name,
            shutdown,
            join,
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn is_finished(&self) -> bool {
        self.join.is_finished()
    }

    /// Signals the task to stop and waits for it to exit.
    pub async fn stop(self) {
        let _ = self.shutdown.send(true);
        match self.join.await {
            Ok(()) => info!("Background task '{}' stopped", self.name),
            Err(e) if e.is_cancelled() => info!("Background task '{}' was cancelled", self.name),
            Err(e) => warn!("Background task '{}' ended abnormally: {}", self.name, e),
        }
    }

    /// Cancels the task without running its shutdown work.
    pub fn abort(&self) {
        self.join.abort();
    }
}

/// Creates the shutdown channel used by every periodic task.
pub(crate) fn shutdown_channel() -> (watch::Sender<bool>, watch::Receiver<bool>) {
    watch::channel(false)
}

/// Sleeps for `interval` unless shutdown is requested first.
///
/// Returns false when the task should exit.
pub(crate) async fn tick(interval: Duration, shutdown: &mut watch::Receiver<bool>) -> bool {
    if *shutdown.borrow() {
        return false;
    }
    tokio::select! {
        _ = tokio::time::sleep(interval) => true,
        // A dropped sender also means stop
        _ = shutdown.changed() => false,
    }
}
