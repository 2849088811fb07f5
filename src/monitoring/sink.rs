//! Observability Sink
//!
//! Collects performance metrics, interactions and error reports in bounded
//! in-memory buffers and ships them to the remote collector on flush.

use std::collections::VecDeque;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use serde_json::Value;
use tracing::{debug, warn};

use super::sources::{MetricsSource, NoopSource};
use crate::collector::Collector;
use crate::config::Config;
use crate::logger::Logger;
use crate::models::{
    CollectorPayload, ErrorReport, Interaction, LogLevel, PerformanceMetric, TelemetryBatch,
    UserIdentity,
};

/// Error reports kept between flushes.
const ERROR_BUFFER_SIZE: usize = 100;

// == Monitoring ==
/// Best-effort telemetry sink. Recording never blocks on I/O and never fails.
pub struct Monitoring {
    metrics: Mutex<VecDeque<PerformanceMetric>>,
    interactions: Mutex<VecDeque<Interaction>>,
    errors: Mutex<VecDeque<ErrorReport>>,
    user: Mutex<Option<UserIdentity>>,
    metrics_capacity: usize,
    interaction_capacity: usize,
    collector: Arc<dyn Collector>,
    logger: Arc<Logger>,
    source: Arc<dyn MetricsSource>,
    panic_hook: AtomicBool,
}

impl Monitoring {
    pub fn new(
        metrics_capacity: usize,
        interaction_capacity: usize,
        collector: Arc<dyn Collector>,
        logger: Arc<Logger>,
    ) -> Self {
        Self {
            metrics: Mutex::new(VecDeque::new()),
            interactions: Mutex::new(VecDeque::new()),
            errors: Mutex::new(VecDeque::new()),
            user: Mutex::new(None),
            metrics_capacity,
            interaction_capacity,
            collector,
            logger,
            source: Arc::new(NoopSource),
            panic_hook: AtomicBool::new(false),
        }
    }

    pub fn from_config(config: &Config, collector: Arc<dyn Collector>, logger: Arc<Logger>) -> Self {
        Self::new(
            config.metrics_buffer_size,
            config.interaction_buffer_size,
            collector,
            logger,
        )
    }

    /// Attaches a passive performance source, drained on every flush tick.
    pub fn with_source(mut self, source: Arc<dyn MetricsSource>) -> Self {
        self.source = source;
        self
    }

    // == Recording ==
    pub fn record_metric(&self, metric: PerformanceMetric) {
        push_bounded(&self.metrics, self.metrics_capacity, metric);
    }

    pub fn record_interaction(&self, interaction: Interaction) {
        push_bounded(&self.interactions, self.interaction_capacity, interaction);
    }

    /// Logs the failure right away and buffers it for the next flush.
    ///
    /// Reports without a user get the current user, if one is set.
    pub fn report_error(&self, mut report: ErrorReport) {
        if report.user.is_none() {
            report.user = lock(&self.user).clone();
        }

        self.logger.log(
            LogLevel::Error,
            format!("Error reported: {}", report.kind),
            Some(Value::Object(report.context.clone())),
            Some(report.error.clone()),
        );

        push_bounded(&self.errors, ERROR_BUFFER_SIZE, report);
    }

    /// Sets (or clears) the user attached to later error reports.
    pub fn set_user(&self, user: Option<UserIdentity>) {
        *lock(&self.user) = user;
    }

    /// Moves pending observations from the passive source into the buffer.
    pub fn collect_passive(&self) -> usize {
        let observed = self.source.collect();
        let count = observed.len();
        for metric in observed {
            self.record_metric(metric);
        }
        if count > 0 {
            debug!("Collected {} passive metrics from {}", count, self.source.name());
        }
        count
    }

    // == Flush ==
    /// Ships buffered telemetry to the collector.
    ///
    /// The buffers are emptied whether or not delivery succeeds; a failed
    /// batch is logged and dropped. Returns the number of items delivered.
    pub async fn flush(&self) -> usize {
        let batch = TelemetryBatch {
            metrics: lock(&self.metrics).drain(..).collect(),
            interactions: lock(&self.interactions).drain(..).collect(),
            errors: lock(&self.errors).drain(..).collect(),
        };
        if batch.is_empty() {
            return 0;
        }

        let count = batch.len();
        match self.collector.submit(&CollectorPayload::Telemetry(batch)).await {
            Ok(()) => {
                debug!("Flushed {} telemetry items", count);
                count
            }
            Err(err) => {
                warn!("Telemetry flush failed, dropping {} items: {:#}", count, err);
                self.logger.warn(
                    "Telemetry flush failed",
                    Some(serde_json::json!({ "dropped": count, "reason": format!("{:#}", err) })),
                );
                0
            }
        }
    }

    // == Inspection ==
    pub fn metrics(&self) -> Vec<PerformanceMetric> {
        lock(&self.metrics).iter().cloned().collect()
    }

    pub fn interactions(&self) -> Vec<Interaction> {
        lock(&self.interactions).iter().cloned().collect()
    }

    pub fn errors(&self) -> Vec<ErrorReport> {
        lock(&self.errors).iter().cloned().collect()
    }

    pub fn logger(&self) -> &Arc<Logger> {
        &self.logger
    }

    pub(crate) fn mark_panic_hook_installed(&self) {
        self.panic_hook.store(true, Ordering::SeqCst);
    }

    pub(crate) fn panic_hook_installed(&self) -> bool {
        self.panic_hook.load(Ordering::SeqCst)
    }
}

impl fmt::Debug for Monitoring {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Monitoring")
            .field("metrics", &lock(&self.metrics).len())
            .field("interactions", &lock(&self.interactions).len())
            .field("errors", &lock(&self.errors).len())
            .field("source", &self.source.name())
            .finish()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn push_bounded<T>(buffer: &Mutex<VecDeque<T>>, capacity: usize, item: T) {
    if capacity == 0 {
        return;
    }
    let mut buffer = lock(buffer);
    while buffer.len() >= capacity {
        buffer.pop_front();
    }
    buffer.push_back(item);
}
