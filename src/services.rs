//! Composition root
//!
//! Builds the logger, monitoring sink, cache and API client once and owns the
//! background tasks that keep them maintained.
//!
//! # Startup Sequence
//! 1. Build the collector, logger and monitoring sink
//! 2. Open the durable store and create the cache manager
//! 3. Create the API client over the transport
//! 4. `start()` spawns cleanup, telemetry flush and log flush tasks
//! 5. `shutdown()` stops them, running a final flush

use std::fmt;
use std::sync::Arc;

use anyhow::Context;
use serde_json::json;
use tracing::{info, warn};

use crate::cache::{CacheManager, DurableStore, FileStore, MemoryStore};
use crate::client::{ApiClient, HttpTransport, Transport};
use crate::collector::{Collector, HttpCollector, NullCollector};
use crate::config::Config;
use crate::logger::Logger;
use crate::monitoring::{MetricsSource, Monitoring};
use crate::tasks::{
    spawn_cleanup_task, spawn_log_flush_task, spawn_telemetry_flush_task, TaskHandle,
};

/// External collaborators the services are built on.
pub struct Dependencies {
    pub durable: Arc<dyn DurableStore>,
    pub transport: Arc<dyn Transport>,
    pub collector: Arc<dyn Collector>,
    pub source: Option<Arc<dyn MetricsSource>>,
}

// == Services ==
pub struct Services {
    config: Config,
    logger: Arc<Logger>,
    monitoring: Arc<Monitoring>,
    cache: Arc<CacheManager>,
    client: Arc<ApiClient>,
    tasks: Vec<TaskHandle>,
}

impl Services {
    pub fn new(config: Config, deps: Dependencies) -> Self {
        let logger = Arc::new(Logger::from_config(&config, Arc::clone(&deps.collector)));

        let mut monitoring = Monitoring::from_config(&config, deps.collector, Arc::clone(&logger));
        if let Some(source) = deps.source {
            monitoring = monitoring.with_source(source);
        }
        let monitoring = Arc::new(monitoring);

        let cache = Arc::new(CacheManager::new(
            deps.durable,
            config.cache_key_prefix.clone(),
            Arc::clone(&logger),
        ));
        let client = Arc::new(ApiClient::new(
            &config,
            deps.transport,
            Arc::clone(&cache),
            Arc::clone(&monitoring),
        ));

        Self {
            config,
            logger,
            monitoring,
            cache,
            client,
            tasks: Vec::new(),
        }
    }

    /// Builds the production stack described by `config`.
    ///
    /// A durable file that cannot be opened degrades to an in-process store
    /// with a warning.
    pub async fn from_config(config: Config) -> anyhow::Result<Self> {
        let collector: Arc<dyn Collector> = match &config.collector_url {
            Some(url) => Arc::new(HttpCollector::new(url.as_str(), config.request_timeout)?),
            None => Arc::new(NullCollector),
        };

        let mut open_failure = None;
        let durable: Arc<dyn DurableStore> = match &config.cache_storage_path {
            Some(path) => match FileStore::open(path.clone()).await {
                Ok(store) => Arc::new(store),
                Err(err) => {
                    warn!("Durable cache unavailable at {}: {}", path.display(), err);
                    open_failure = Some((path.display().to_string(), err.to_string()));
                    Arc::new(MemoryStore::new())
                }
            },
            None => Arc::new(MemoryStore::new()),
        };

        let transport = HttpTransport::new(Some(config.request_timeout))
            .context("failed to build API transport")?;

        let services = Self::new(
            config,
            Dependencies {
                durable,
                transport: Arc::new(transport),
                collector,
                source: None,
            },
        );

        if let Some((path, reason)) = open_failure {
            services.logger.warn(
                "Durable cache unavailable, using process memory",
                Some(json!({ "path": path, "reason": reason })),
            );
        }
        Ok(services)
    }

    // == Lifecycle ==
    /// Spawns the background tasks. Calling it again while running is a no-op.
    pub fn start(&mut self) {
        if !self.tasks.is_empty() {
            return;
        }

        self.tasks.push(spawn_cleanup_task(
            Arc::clone(&self.cache),
            self.config.cleanup_interval,
        ));
        self.tasks.push(spawn_telemetry_flush_task(
            Arc::clone(&self.monitoring),
            self.config.flush_interval,
        ));
        self.tasks.push(spawn_log_flush_task(
            Arc::clone(&self.logger),
            self.config.flush_interval,
        ));
        info!("Started {} background tasks", self.tasks.len());
    }

    /// Stops every background task, letting each finish its shutdown work.
    ///
    /// Telemetry is flushed before logs so that warnings raised by the final
    /// telemetry flush are still shipped.
    pub async fn shutdown(&mut self) {
        for task in self.tasks.drain(..) {
            task.stop().await;
        }
        info!("Background tasks stopped");
    }

    pub fn is_running(&self) -> bool {
        !self.tasks.is_empty()
    }

    // == Accessors ==
    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn logger(&self) -> &Arc<Logger> {
        &self.logger
    }

    pub fn monitoring(&self) -> &Arc<Monitoring> {
        &self.monitoring
    }

    pub fn cache(&self) -> &Arc<CacheManager> {
        &self.cache
    }

    pub fn client(&self) -> &Arc<ApiClient> {
        &self.client
    }
}

impl fmt::Debug for Services {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Services")
            .field("config", &self.config)
            .field("client", &self.client)
            .field("tasks", &self.tasks.iter().map(|t| t.name()).collect::<Vec<_>>())
            .finish()
    }
}
