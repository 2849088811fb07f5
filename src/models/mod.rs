//! Request, response and telemetry models
//!
//! This module defines the DTOs (Data Transfer Objects) exchanged with the
//! API, the cache tiers and the remote collector.

pub mod requests;
pub mod responses;
pub mod telemetry;

// Re-export commonly used types
pub use requests::RequestOptions;
pub use responses::ApiResponse;
pub use telemetry::{
    CollectorPayload, ErrorReport, Interaction, LogBatch, LogEntry, LogLevel, PerformanceMetric,
    TelemetryBatch, UserIdentity,
};
