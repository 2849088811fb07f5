//! Cache Cleanup Task
//!
//! Background task that periodically removes expired cache entries from both
//! tiers.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info};

use super::{shutdown_channel, tick, TaskHandle};
use crate::cache::CacheManager;

/// Spawns a background task that periodically sweeps expired cache entries.
///
/// The task loops until stopped, sleeping for `interval` between sweeps.
/// Each sweep snapshots expired keys under a read lock, then removes them
/// one write lock at a time. Readers are never blocked; a writer can wait
/// for the snapshot scan.
///
/// # Example
/// ```ignore
/// let cleanup = spawn_cleanup_task(cache.clone(), Duration::from_secs(60));
/// // Later, during shutdown:
/// cleanup.stop().await;
/// ```
pub fn spawn_cleanup_task(cache: Arc<CacheManager>, interval: Duration) -> TaskHandle {
    let (shutdown_tx, mut shutdown_rx) = shutdown_channel();

    let join = tokio::spawn(async move {
        info!("Starting cache cleanup task with interval of {:?}", interval);

        while tick(interval, &mut shutdown_rx).await {
            let report = cache.sweep().await;

            if report.total() > 0 {
                info!(
                    "Cache cleanup: removed {} memory and {} durable expired entries",
                    report.memory, report.durable
                );
            } else {
                debug!("Cache cleanup: no expired entries found");
            }
        }
    });

    TaskHandle::new("cache-cleanup", shutdown_tx, join)
}
