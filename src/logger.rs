//! Structured Logger
//!
//! Buffers leveled log entries in a bounded ring and ships them to the remote
//! collector on flush. In development every entry is also echoed through
//! `tracing` as soon as it is written.

use std::collections::VecDeque;
use std::fmt;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Instant;

use chrono::Utc;
use serde_json::{json, Value};
use tracing::{debug, error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::collector::Collector;
use crate::config::{Config, Environment};
use crate::error::describe_error;
use crate::models::{CollectorPayload, LogBatch, LogEntry, LogLevel};

/// Installs the global tracing subscriber.
///
/// Defaults to `default_filter`, can be overridden with the `RUST_LOG` env var.
/// Returns false when a subscriber was already installed.
pub fn init_tracing(default_filter: &str) -> bool {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .try_init()
        .is_ok()
}

// == Logger ==
/// Structured, buffered logger shared by every component.
pub struct Logger {
    /// Echo entries to the console (development only)
    echo: bool,
    /// Maximum buffered entries; the oldest is dropped beyond this
    capacity: usize,
    buffer: Mutex<VecDeque<LogEntry>>,
    collector: Arc<dyn Collector>,
}

impl Logger {
    pub fn new(environment: Environment, capacity: usize, collector: Arc<dyn Collector>) -> Self {
        Self {
            echo: environment.is_development(),
            capacity,
            buffer: Mutex::new(VecDeque::with_capacity(capacity)),
            collector,
        }
    }

    pub fn from_config(config: &Config, collector: Arc<dyn Collector>) -> Self {
        Self::new(config.environment, config.log_buffer_size, collector)
    }

    pub fn debug(&self, message: impl Into<String>, context: Option<Value>) {
        self.write(LogLevel::Debug, message.into(), context, None);
    }

    pub fn info(&self, message: impl Into<String>, context: Option<Value>) {
        self.write(LogLevel::Info, message.into(), context, None);
    }

    pub fn warn(&self, message: impl Into<String>, context: Option<Value>) {
        self.write(LogLevel::Warn, message.into(), context, None);
    }

    pub fn error(
        &self,
        message: impl Into<String>,
        context: Option<Value>,
        error: Option<&(dyn std::error::Error + 'static)>,
    ) {
        self.write(LogLevel::Error, message.into(), context, error.map(describe_error));
    }

    pub fn fatal(
        &self,
        message: impl Into<String>,
        context: Option<Value>,
        error: Option<&(dyn std::error::Error + 'static)>,
    ) {
        self.write(LogLevel::Fatal, message.into(), context, error.map(describe_error));
    }

    /// Appends an entry whose error has already been rendered.
    pub fn log(
        &self,
        level: LogLevel,
        message: impl Into<String>,
        context: Option<Value>,
        error: Option<String>,
    ) {
        self.write(level, message.into(), context, error);
    }

    fn write(&self, level: LogLevel, message: String, context: Option<Value>, error: Option<String>) {
        let entry = LogEntry {
            timestamp: Utc::now(),
            level,
            message,
            context,
            error,
        };

        if self.echo {
            echo(&entry);
        }

        if self.capacity == 0 {
            return;
        }
        let mut buffer = self.lock();
        if buffer.len() >= self.capacity {
            buffer.pop_front();
        }
        buffer.push_back(entry);
    }

    /// Times `operation` and logs its duration; the result passes through unchanged.
    pub async fn measure<F, T, E>(&self, name: &str, operation: F, context: Option<Value>) -> Result<T, E>
    where
        F: Future<Output = Result<T, E>>,
        E: fmt::Display,
    {
        let start = Instant::now();
        let result = operation.await;
        let duration_ms = start.elapsed().as_secs_f64() * 1000.0;

        let mut fields = match context {
            Some(Value::Object(map)) => map,
            Some(other) => {
                let mut map = serde_json::Map::new();
                map.insert("context".to_string(), other);
                map
            }
            None => serde_json::Map::new(),
        };
        fields.insert("duration_ms".to_string(), json!(duration_ms));

        match &result {
            Ok(_) => self.write(
                LogLevel::Info,
                format!("{} completed", name),
                Some(Value::Object(fields)),
                None,
            ),
            Err(err) => self.write(
                LogLevel::Error,
                format!("{} failed", name),
                Some(Value::Object(fields)),
                Some(format!("{:#}", err)),
            ),
        }

        result
    }

    /// Snapshot of the buffered entries, oldest first.
    pub fn entries(&self) -> Vec<LogEntry> {
        self.lock().iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Ships buffered entries to the collector.
    ///
    /// The buffer is emptied whether or not delivery succeeds. Returns the
    /// number of entries delivered.
    pub async fn flush(&self) -> usize {
        let logs: Vec<LogEntry> = self.lock().drain(..).collect();
        if logs.is_empty() {
            return 0;
        }

        let count = logs.len();
        let payload = CollectorPayload::Logs(LogBatch { logs });
        match self.collector.submit(&payload).await {
            Ok(()) => {
                debug!("Flushed {} log entries", count);
                count
            }
            Err(err) => {
                warn!("Log flush failed, dropping {} entries: {:#}", count, err);
                0
            }
        }
    }

    fn lock(&self) -> MutexGuard<'_, VecDeque<LogEntry>> {
        self.buffer
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl fmt::Debug for Logger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Logger")
            .field("echo", &self.echo)
            .field("capacity", &self.capacity)
            .field("buffered", &self.len())
            .finish()
    }
}

fn echo(entry: &LogEntry) {
    let context = entry
        .context
        .as_ref()
        .map(Value::to_string)
        .unwrap_or_default();
    let err = entry.error.as_deref().unwrap_or_default();

    match entry.level {
        LogLevel::Debug => debug!(context = %context, "{}", entry.message),
        LogLevel::Info => info!(context = %context, "{}", entry.message),
        LogLevel::Warn => warn!(context = %context, error = %err, "{}", entry.message),
        LogLevel::Error => error!(context = %context, error = %err, "{}", entry.message),
        LogLevel::Fatal => {
            error!(fatal = true, context = %context, error = %err, "{}", entry.message)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collector::MemoryCollector;
    use crate::error::RequestError;

    fn logger(capacity: usize) -> (Logger, Arc<MemoryCollector>) {
        let collector = Arc::new(MemoryCollector::new());
        let logger = Logger::new(Environment::Production, capacity, collector.clone());
        (logger, collector)
    }

    #[test]
    fn test_entries_are_structured() {
        let (logger, _) = logger(10);
        let err = RequestError::Transport("connection refused".into());

        logger.info("Loaded clients", Some(json!({"count": 3})));
        logger.error("Request failed", None, Some(&err));

        let entries = logger.entries();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].level, LogLevel::Info);
        assert_eq!(entries[0].context, Some(json!({"count": 3})));
        assert_eq!(entries[1].level, LogLevel::Error);
        assert_eq!(
            entries[1].error.as_deref(),
            Some("Transport error: connection refused")
        );
    }

    #[test]
    fn test_buffer_drops_oldest_beyond_capacity() {
        let (logger, _) = logger(3);
        for i in 0..5 {
            logger.debug(format!("entry {}", i), None);
        }

        let messages: Vec<String> = logger.entries().into_iter().map(|e| e.message).collect();
        assert_eq!(messages, vec!["entry 2", "entry 3", "entry 4"]);
    }

    #[test]
    fn test_zero_capacity_buffers_nothing() {
        let (logger, _) = logger(0);
        logger.warn("ignored", None);
        assert!(logger.is_empty());
    }

    #[tokio::test]
    async fn test_flush_ships_and_clears() {
        let (logger, collector) = logger(10);
        logger.info("one", None);
        logger.fatal("two", None, None);

        assert_eq!(logger.flush().await, 2);
        assert!(logger.is_empty());

        let received = collector.received();
        assert_eq!(received.len(), 1);
        match &received[0] {
            CollectorPayload::Logs(batch) => {
                assert_eq!(batch.logs.len(), 2);
                assert_eq!(batch.logs[1].level, LogLevel::Fatal);
            }
            other => panic!("unexpected payload {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_flush_failure_drops_batch() {
        let (logger, collector) = logger(10);
        collector.set_failing(true);
        logger.info("lost", None);

        assert_eq!(logger.flush().await, 0);
        assert!(logger.is_empty());
        assert!(collector.received().is_empty());
    }

    #[tokio::test]
    async fn test_flush_empty_buffer_skips_collector() {
        let (logger, collector) = logger(10);
        assert_eq!(logger.flush().await, 0);
        assert!(collector.received().is_empty());
    }

    #[tokio::test]
    async fn test_measure_success_passes_result_through() {
        let (logger, _) = logger(10);

        let result: Result<u32, RequestError> = logger
            .measure("load_clients", async { Ok(42) }, Some(json!({"page": 1})))
            .await;

        assert_eq!(result.unwrap(), 42);
        let entry = &logger.entries()[0];
        assert_eq!(entry.level, LogLevel::Info);
        assert_eq!(entry.message, "load_clients completed");
        let context = entry.context.as_ref().unwrap();
        assert_eq!(context["page"], 1);
        assert!(context["duration_ms"].as_f64().unwrap() >= 0.0);
    }

    #[tokio::test]
    async fn test_measure_failure_passes_error_through() {
        let (logger, _) = logger(10);

        let result: Result<u32, RequestError> = logger
            .measure(
                "save_task",
                async { Err(RequestError::InvalidRequest("missing title".into())) },
                None,
            )
            .await;

        assert!(matches!(result, Err(RequestError::InvalidRequest(_))));
        let entry = &logger.entries()[0];
        assert_eq!(entry.level, LogLevel::Error);
        assert_eq!(entry.message, "save_task failed");
        assert_eq!(
            entry.error.as_deref(),
            Some("Invalid request: missing title")
        );
        assert!(entry.context.as_ref().unwrap().get("duration_ms").is_some());
    }
}
