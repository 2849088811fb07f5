//! Flush Tasks
//!
//! Background tasks that periodically ship buffered telemetry and logs to the
//! remote collector. Both run one last flush when stopped.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info};

use super::{shutdown_channel, tick, TaskHandle};
use crate::logger::Logger;
use crate::monitoring::Monitoring;

/// Spawns the telemetry flush loop.
///
/// Each tick drains the passive metrics source into the sink, then flushes.
pub fn spawn_telemetry_flush_task(monitoring: Arc<Monitoring>, interval: Duration) -> TaskHandle {
    let (shutdown_tx, mut shutdown_rx) = shutdown_channel();

    let join = tokio::spawn(async move {
        info!("Starting telemetry flush task with interval of {:?}", interval);

        while tick(interval, &mut shutdown_rx).await {
            monitoring.collect_passive();
            let shipped = monitoring.flush().await;
            debug!("Telemetry flush tick shipped {} items", shipped);
        }

        monitoring.collect_passive();
        monitoring.flush().await;
    });

    TaskHandle::new("telemetry-flush", shutdown_tx, join)
}

/// Spawns the log flush loop.
pub fn spawn_log_flush_task(logger: Arc<Logger>, interval: Duration) -> TaskHandle {
    let (shutdown_tx, mut shutdown_rx) = shutdown_channel();

    let join = tokio::spawn(async move {
        info!("Starting log flush task with interval of {:?}", interval);

        while tick(interval, &mut shutdown_rx).await {
            let shipped = logger.flush().await;
            debug!("Log flush tick shipped {} entries", shipped);
        }

        logger.flush().await;
    });

    TaskHandle::new("log-flush", shutdown_tx, join)
}
