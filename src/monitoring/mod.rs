//! Monitoring Module
//!
//! Observability sink for metrics, interactions and error reports, global
//! failure capture and optional passive performance sources.

mod capture;
mod sink;
mod sources;

pub use capture::{install_panic_hook, spawn_monitored};
pub use sink::Monitoring;
pub use sources::{LoopLagProbe, MetricsSource, NoopSource};
