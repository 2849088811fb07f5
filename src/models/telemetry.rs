//! Telemetry DTOs
//!
//! Metrics, interactions, error reports and log entries, plus the batch
//! payloads shipped to the remote collector.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

// == Performance Metric ==
/// A single observed measurement. Immutable once recorded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PerformanceMetric {
    pub name: String,
    pub value: f64,
    #[serde(default)]
    pub tags: BTreeMap<String, String>,
    pub timestamp: DateTime<Utc>,
}

impl PerformanceMetric {
    pub fn new(name: impl Into<String>, value: f64) -> Self {
        Self {
            name: name.into(),
            value,
            tags: BTreeMap::new(),
            timestamp: Utc::now(),
        }
    }

    pub fn with_tag(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.tags.insert(key.into(), value.into());
        self
    }
}

// == User Identity ==
/// The user a failure happened for.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserIdentity {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
}

// == Error Report ==
/// One failure, emitted once.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorReport {
    /// Rendered error message including its source chain
    pub error: String,
    /// Machine-readable error class
    pub kind: String,
    #[serde(default)]
    pub context: Map<String, Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<UserIdentity>,
    pub timestamp: DateTime<Utc>,
}

impl ErrorReport {
    pub fn new(kind: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            kind: kind.into(),
            context: Map::new(),
            user: None,
            timestamp: Utc::now(),
        }
    }

    pub fn with_context(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.context.insert(key.into(), value.into());
        self
    }

    pub fn with_user(mut self, user: UserIdentity) -> Self {
        self.user = Some(user);
        self
    }
}

// == Interaction ==
/// A user or system interaction worth keeping as breadcrumb context.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Interaction {
    pub kind: String,
    pub target: String,
    #[serde(default)]
    pub metadata: Map<String, Value>,
    pub timestamp: DateTime<Utc>,
}

impl Interaction {
    pub fn new(kind: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            target: target.into(),
            metadata: Map::new(),
            timestamp: Utc::now(),
        }
    }
}

// == Log Level ==
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Debug,
    Info,
    Warn,
    Error,
    Fatal,
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
            LogLevel::Fatal => "fatal",
        };
        f.write_str(name)
    }
}

// == Log Entry ==
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEntry {
    pub timestamp: DateTime<Utc>,
    pub level: LogLevel,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

// == Collector Payloads ==
/// Batch of buffered observability data.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TelemetryBatch {
    pub metrics: Vec<PerformanceMetric>,
    pub interactions: Vec<Interaction>,
    #[serde(default)]
    pub errors: Vec<ErrorReport>,
}

impl TelemetryBatch {
    pub fn is_empty(&self) -> bool {
        self.metrics.is_empty() && self.interactions.is_empty() && self.errors.is_empty()
    }

    pub fn len(&self) -> usize {
        self.metrics.len() + self.interactions.len() + self.errors.len()
    }
}

/// Batch of buffered log entries.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LogBatch {
    pub logs: Vec<LogEntry>,
}

/// Everything the remote collector accepts.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum CollectorPayload {
    Telemetry(TelemetryBatch),
    Logs(LogBatch),
}

impl CollectorPayload {
    /// Collector path segment for this payload.
    pub fn endpoint(&self) -> &'static str {
        match self {
            CollectorPayload::Telemetry(_) => "metrics",
            CollectorPayload::Logs(_) => "logs",
        }
    }

    pub fn len(&self) -> usize {
        match self {
            CollectorPayload::Telemetry(batch) => batch.len(),
            CollectorPayload::Logs(batch) => batch.logs.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
