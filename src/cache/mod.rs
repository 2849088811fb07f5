//! Cache Module
//!
//! Two-tier caching: a process-memory tier backed by a durable key-value
//! store, with TTL expiration checked on read and by a periodic sweep.

mod durable;
pub(crate) mod entry;
mod manager;
mod memory;
mod stats;


// Re-export public types
pub use durable::{DurableStore, FileStore, MemoryStore};
pub use entry::CacheEntry;
pub use manager::{CacheManager, Persistence, SweepReport};
pub use memory::{Lookup, MemoryTier};
pub use stats::CacheStats;

// == Public Constants ==
/// Default prefix of cache keys in the durable tier
pub const DEFAULT_KEY_PREFIX: &str = "cache_";
