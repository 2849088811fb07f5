//! Resilient Cache - a request/cache layer for API clients
//!
//! Provides a two-tier TTL cache, an HTTP client with retry and exponential
//! backoff, a best-effort observability sink and a structured logger.

pub mod cache;
pub mod client;
pub mod collector;
pub mod config;
pub mod error;
pub mod logger;
pub mod models;
pub mod monitoring;
pub mod services;
pub mod tasks;

pub use cache::{CacheManager, Persistence};
pub use client::ApiClient;
pub use config::Config;
pub use error::{CacheError, RequestError};
pub use logger::{init_tracing, Logger};
pub use models::{ApiResponse, RequestOptions};
pub use monitoring::Monitoring;
pub use services::{Dependencies, Services};
pub use tasks::{spawn_cleanup_task, TaskHandle};
