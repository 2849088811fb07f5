//! Remote Collector
//!
//! Destination for flushed telemetry and log batches. Delivery is best-effort:
//! callers log a failed submission and drop the batch.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use tracing::debug;

use crate::models::CollectorPayload;

/// Accepts batches of telemetry or logs.
#[async_trait]
pub trait Collector: Send + Sync {
    async fn submit(&self, payload: &CollectorPayload) -> anyhow::Result<()>;
}

// == HTTP Collector ==
/// POSTs `{metrics, interactions, errors}` to `{base}/metrics` and
/// `{logs}` to `{base}/logs`.
#[derive(Debug, Clone)]
pub struct HttpCollector {
    client: reqwest::Client,
    base_url: String,
}

impl HttpCollector {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("failed to build collector HTTP client")?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    fn url_for(&self, payload: &CollectorPayload) -> String {
        format!("{}/{}", self.base_url, payload.endpoint())
    }
}

#[async_trait]
impl Collector for HttpCollector {
    async fn submit(&self, payload: &CollectorPayload) -> anyhow::Result<()> {
        let url = self.url_for(payload);
        self.client
            .post(&url)
            .json(payload)
            .send()
            .await
            .with_context(|| format!("collector unreachable at {}", url))?
            .error_for_status()
            .with_context(|| format!("collector rejected batch at {}", url))?;
        Ok(())
    }
}

// == Null Collector ==
/// Discards every batch. Used when no collector URL is configured.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullCollector;

#[async_trait]
impl Collector for NullCollector {
    async fn submit(&self, payload: &CollectorPayload) -> anyhow::Result<()> {
        debug!(
            "No collector configured, discarding {} {} item(s)",
            payload.len(),
            payload.endpoint()
        );
        Ok(())
    }
}

// == Memory Collector ==
/// Keeps submitted batches in memory. Can be switched to reject batches.
#[derive(Debug, Default)]
pub struct MemoryCollector {
    received: Mutex<Vec<CollectorPayload>>,
    failing: AtomicBool,
}

impl MemoryCollector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every following submission fail (or succeed again).
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Batches accepted so far.
    pub fn received(&self) -> Vec<CollectorPayload> {
        self.received
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }
}

#[async_trait]
impl Collector for MemoryCollector {
    async fn submit(&self, payload: &CollectorPayload) -> anyhow::Result<()> {
        if self.failing.load(Ordering::SeqCst) {
            anyhow::bail!("collector unavailable");
        }
        self.received
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(payload.clone());
        Ok(())
    }
}
