//! Cache Manager Module
//!
//! Two-tier cache: a process-memory tier in front of a durable tier. Reads
//! fall through memory to durable storage and promote durable hits; every
//! tier failure is logged and treated as a miss.

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{json, Value};
use tokio::sync::RwLock;

use crate::cache::memory::{Lookup, MemoryTier};
use crate::cache::{CacheEntry, CacheStats, DurableStore};
use crate::error::{CacheError, CacheResult};
use crate::logger::Logger;

/// Where `CacheManager::set` writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Persistence {
    /// Memory tier only
    MemoryOnly,
    /// Memory tier and durable tier
    Durable,
}

/// Entries removed by one cleanup sweep, per tier.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub memory: usize,
    pub durable: usize,
}

impl SweepReport {
    pub fn total(&self) -> usize {
        self.memory + self.durable
    }
}

enum DurableLookup {
    Valid(CacheEntry<Value>),
    Expired,
    Corrupted,
    Missing,
}

// == Cache Manager ==
/// Two-tier cache with TTL expiration.
pub struct CacheManager {
    memory: RwLock<MemoryTier>,
    durable: Arc<dyn DurableStore>,
    /// Prefix of every key this cache owns in the durable store
    prefix: String,
    stats: Mutex<CacheStats>,
    logger: Arc<Logger>,
}

impl CacheManager {
    // == Constructor ==
    pub fn new(durable: Arc<dyn DurableStore>, prefix: impl Into<String>, logger: Arc<Logger>) -> Self {
        Self {
            memory: RwLock::new(MemoryTier::new()),
            durable,
            prefix: prefix.into(),
            stats: Mutex::new(CacheStats::new()),
            logger,
        }
    }

    /// Key under which `key` is stored in the durable tier.
    pub fn storage_key(&self, key: &str) -> String {
        format!("{}{}", self.prefix, key)
    }

    // == Get ==
    /// Retrieves a live value from memory, falling back to the durable tier.
    pub async fn get(&self, key: &str) -> Option<Value> {
        let lookup = self.memory.read().await.lookup(key);
        match lookup {
            Lookup::Hit(value) => {
                self.stats().record_hit();
                return Some(value);
            }
            Lookup::Expired => {
                if self.memory.write().await.remove_if_expired(key) {
                    self.stats().record_expirations(1);
                }
            }
            Lookup::Missing => {}
        }

        match self.read_durable(key).await {
            DurableLookup::Valid(entry) => {
                let promoted = self.memory.write().await.promote(key.to_string(), entry);
                let mut stats = self.stats();
                match promoted {
                    Lookup::Hit(value) => {
                        stats.record_promotion();
                        stats.record_hit();
                        Some(value)
                    }
                    Lookup::Expired | Lookup::Missing => {
                        stats.record_miss();
                        None
                    }
                }
            }
            DurableLookup::Expired | DurableLookup::Corrupted | DurableLookup::Missing => {
                self.stats().record_miss();
                None
            }
        }
    }

    /// Typed `get`; a value that does not decode as `T` counts as absent.
    pub async fn get_as<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let value = self.get(key).await?;
        match serde_json::from_value(value) {
            Ok(typed) => Some(typed),
            Err(e) => {
                self.logger.warn(
                    "Cached value has unexpected shape",
                    Some(json!({ "key": key, "reason": e.to_string() })),
                );
                None
            }
        }
    }

    // == Set ==
    /// Stores a value, replacing any prior entry. `ttl = None` never expires.
    ///
    /// A memory-only write also drops any durable entry for the key so an
    /// older persisted value cannot resurface once the new one expires.
    pub async fn set(&self, key: &str, value: Value, ttl: Option<Duration>, persistence: Persistence) {
        let entry = CacheEntry::new(value, ttl);

        match persistence {
            Persistence::Durable => {
                if let Err(err) = self.write_durable(key, &entry).await {
                    self.logger.warn(
                        "Durable cache write failed",
                        Some(json!({ "key": key, "reason": err.to_string() })),
                    );
                }
            }
            Persistence::MemoryOnly => self.remove_durable(key).await,
        }

        self.memory.write().await.insert(key.to_string(), entry);
    }

    /// Typed `set`. Values that fail to serialize are logged and not cached.
    pub async fn set_as<T: Serialize>(
        &self,
        key: &str,
        value: &T,
        ttl: Option<Duration>,
        persistence: Persistence,
    ) {
        match serde_json::to_value(value) {
            Ok(value) => self.set(key, value, ttl, persistence).await,
            Err(e) => self.logger.warn(
                "Value could not be cached",
                Some(json!({ "key": key, "reason": e.to_string() })),
            ),
        }
    }

    // == Delete ==
    /// Removes `key` from both tiers.
    pub async fn delete(&self, key: &str) {
        self.memory.write().await.remove(key);
        self.remove_durable(key).await;
    }

    // == Clear ==
    /// Removes every entry owned by this cache from both tiers.
    ///
    /// Durable keys without the cache prefix are left untouched.
    pub async fn clear(&self) {
        self.memory.write().await.clear();

        match self.durable.keys().await {
            Ok(keys) => {
                for key in keys.iter().filter(|k| k.starts_with(&self.prefix)) {
                    if let Err(err) = self.durable.remove(key).await {
                        self.logger.warn(
                            "Durable cache remove failed",
                            Some(json!({ "key": key, "reason": err.to_string() })),
                        );
                    }
                }
            }
            Err(err) => self.logger.warn(
                "Durable cache clear failed",
                Some(json!({ "reason": err.to_string() })),
            ),
        }
    }

    // == Cleanup Sweep ==
    /// Evicts every expired entry from both tiers.
    ///
    /// Expired memory keys are snapshotted in one scan under the read lock,
    /// which blocks writers (not readers) for the length of that scan. Each
    /// removal then takes its own short write lock and re-checks expiry.
    pub async fn sweep(&self) -> SweepReport {
        let mut report = SweepReport::default();

        let expired = self.memory.read().await.expired_keys();
        for key in expired {
            if self.memory.write().await.remove_if_expired(&key) {
                report.memory += 1;
            }
        }

        match self.durable.keys().await {
            Ok(keys) => {
                for storage_key in keys.iter().filter(|k| k.starts_with(&self.prefix)) {
                    let key = &storage_key[self.prefix.len()..];
                    match self.read_durable(key).await {
                        DurableLookup::Expired => report.durable += 1,
                        DurableLookup::Valid(_)
                        | DurableLookup::Corrupted
                        | DurableLookup::Missing => {}
                    }
                }
            }
            Err(err) => self.logger.warn(
                "Durable cache sweep failed",
                Some(json!({ "reason": err.to_string() })),
            ),
        }

        self.stats().record_expirations(report.total());
        report
    }

    // == Stats ==
    /// Returns current cache statistics.
    pub async fn stats_snapshot(&self) -> CacheStats {
        let total_entries = self.memory.read().await.len();
        let mut stats = self.stats().clone();
        stats.total_entries = total_entries;
        stats
    }

    /// Number of entries in the memory tier, expired ones included until swept.
    pub async fn len(&self) -> usize {
        self.memory.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.memory.read().await.is_empty()
    }

    /// True when the memory tier holds an entry for `key`, live or not.
    pub async fn in_memory(&self, key: &str) -> bool {
        self.memory.read().await.contains(key)
    }

    // == Durable Tier Helpers ==
    /// Reads and validates a durable entry. Expired and corrupted entries are
    /// removed from the durable tier as a side effect.
    async fn read_durable(&self, key: &str) -> DurableLookup {
        let storage_key = self.storage_key(key);
        let raw = match self.durable.read(&storage_key).await {
            Ok(Some(raw)) => raw,
            Ok(None) => return DurableLookup::Missing,
            Err(err) => {
                self.logger.warn(
                    "Durable cache read failed",
                    Some(json!({ "key": key, "reason": err.to_string() })),
                );
                return DurableLookup::Missing;
            }
        };

        match serde_json::from_str::<CacheEntry<Value>>(&raw) {
            Ok(entry) if entry.is_expired() => {
                self.remove_durable(key).await;
                DurableLookup::Expired
            }
            Ok(entry) => DurableLookup::Valid(entry),
            Err(e) => {
                let err = CacheError::Corruption {
                    key: key.to_string(),
                    reason: e.to_string(),
                };
                self.logger.warn(
                    "Evicting corrupted durable cache entry",
                    Some(json!({ "key": key, "reason": err.to_string() })),
                );
                self.stats().record_corruption();
                self.remove_durable(key).await;
                DurableLookup::Corrupted
            }
        }
    }

    async fn write_durable(&self, key: &str, entry: &CacheEntry<Value>) -> CacheResult<()> {
        let raw =
            serde_json::to_string(entry).map_err(|e| CacheError::Serialization(e.to_string()))?;
        self.durable.write(&self.storage_key(key), raw).await
    }

    async fn remove_durable(&self, key: &str) {
        if let Err(err) = self.durable.remove(&self.storage_key(key)).await {
            self.logger.warn(
                "Durable cache remove failed",
                Some(json!({ "key": key, "reason": err.to_string() })),
            );
        }
    }

    fn stats(&self) -> MutexGuard<'_, CacheStats> {
        self.stats
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl std::fmt::Debug for CacheManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheManager")
            .field("prefix", &self.prefix)
            .finish_non_exhaustive()
    }
}
