//! Memory Tier Module
//!
//! Process-local HashMap storage of cache entries.

use std::collections::HashMap;

use serde_json::Value;

use crate::cache::entry::current_timestamp_ms;
use crate::cache::CacheEntry;

/// Outcome of a memory tier lookup.
#[derive(Debug, Clone, PartialEq)]
pub enum Lookup {
    Hit(Value),
    Expired,
    Missing,
}

// == Memory Tier ==
/// Process-memory cache tier. Keys are unique, iteration order is unspecified.
#[derive(Debug, Default)]
pub struct MemoryTier {
    entries: HashMap<String, CacheEntry<Value>>,
}

impl MemoryTier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Looks up a key without mutating the tier.
    pub fn lookup(&self, key: &str) -> Lookup {
        match self.entries.get(key) {
            Some(entry) if entry.is_expired() => Lookup::Expired,
            Some(entry) => Lookup::Hit(entry.value.clone()),
            None => Lookup::Missing,
        }
    }

    /// Stores an entry, replacing any previous entry for the key.
    pub fn insert(&mut self, key: String, entry: CacheEntry<Value>) {
        self.entries.insert(key, entry);
    }

    /// Installs an entry read from the durable tier and returns what the
    /// tier now holds for `key`.
    ///
    /// A live entry written at or after the incoming one is kept, so a
    /// `set` that lands while the durable read is in flight is not undone.
    pub fn promote(&mut self, key: String, entry: CacheEntry<Value>) -> Lookup {
        let keep_existing = matches!(
            self.entries.get(&key),
            Some(existing) if !existing.is_expired() && existing.written_at >= entry.written_at
        );
        if !keep_existing {
            self.entries.insert(key.clone(), entry);
        }
        self.lookup(&key)
    }

    pub fn remove(&mut self, key: &str) -> bool {
        self.entries.remove(key).is_some()
    }

    /// Removes the entry only if it is (still) expired.
    pub fn remove_if_expired(&mut self, key: &str) -> bool {
        let now = current_timestamp_ms();
        match self.entries.get(key) {
            Some(entry) if entry.is_expired_at(now) => {
                self.entries.remove(key);
                true
            }
            _ => false,
        }
    }

    /// Keys whose TTL has elapsed.
    pub fn expired_keys(&self) -> Vec<String> {
        let now = current_timestamp_ms();
        self.entries
            .iter()
            .filter(|(_, entry)| entry.is_expired_at(now))
            .map(|(key, _)| key.clone())
            .collect()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
