//! Passive performance sources
//!
//! Optional producers of metrics the host runtime exposes on its own. The
//! sink drains the configured source on every flush tick; without one it
//! falls back to [`NoopSource`].

use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::time::Instant;
use tracing::debug;

use crate::models::PerformanceMetric;
use crate::tasks::{shutdown_channel, tick, TaskHandle};

/// Observations held by a probe between drains.
const PENDING_LIMIT: usize = 100;

pub trait MetricsSource: Send + Sync {
    fn name(&self) -> &'static str;

    /// Returns and forgets everything observed since the last call.
    fn collect(&self) -> Vec<PerformanceMetric>;
}

/// Source for hosts without performance signals.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopSource;

impl MetricsSource for NoopSource {
    fn name(&self) -> &'static str {
        "noop"
    }

    fn collect(&self) -> Vec<PerformanceMetric> {
        Vec::new()
    }
}

// == Loop Lag Probe ==
/// Detects long blocking sections on the async runtime.
///
/// A timer is armed every `interval`; when it fires late by at least
/// `threshold`, something held the scheduler and a `long_task` metric with
/// the lag in milliseconds is recorded.
#[derive(Debug)]
pub struct LoopLagProbe {
    interval: Duration,
    threshold: Duration,
    pending: Mutex<Vec<PerformanceMetric>>,
}

impl LoopLagProbe {
    pub fn new(interval: Duration, threshold: Duration) -> Arc<Self> {
        Arc::new(Self {
            interval,
            threshold,
            pending: Mutex::new(Vec::new()),
        })
    }

    /// Starts sampling on the current runtime.
    pub fn spawn(self: &Arc<Self>) -> TaskHandle {
        let probe = Arc::clone(self);
        let (shutdown_tx, mut shutdown_rx) = shutdown_channel();

        let join = tokio::spawn(async move {
            debug!("Starting loop lag probe every {:?}", probe.interval);
            loop {
                let armed = Instant::now();
                if !tick(probe.interval, &mut shutdown_rx).await {
                    break;
                }
                let lag = armed.elapsed().saturating_sub(probe.interval);
                probe.observe(lag);
            }
        });

        TaskHandle::new("loop-lag-probe", shutdown_tx, join)
    }

    /// Records `lag` if it reaches the threshold.
    pub fn observe(&self, lag: Duration) {
        if lag < self.threshold {
            return;
        }
        let metric = PerformanceMetric::new("long_task", lag.as_secs_f64() * 1000.0)
            .with_tag("source", "runtime");
        let mut pending = self
            .pending
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if pending.len() < PENDING_LIMIT {
            pending.push(metric);
        }
    }
}

impl MetricsSource for LoopLagProbe {
    fn name(&self) -> &'static str {
        "loop-lag"
    }

    fn collect(&self) -> Vec<PerformanceMetric> {
        std::mem::take(
            &mut *self
                .pending
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner()),
        )
    }
}
