//! Byte-budgeted chunk cache shared by every loader in the process.
//!
//! Chunks are addressed by volume store, channel, time, resolution level and
//! pixel region. The budget is global: a busy volume can evict chunks of an
//! idle one. Entries are immutable once inserted and eviction only ever
//! removes whole entries.
//!
//! # Example
//!
//! ```ignore
//! use bytes::Bytes;
//! use volstream::cache::{CacheConfig, ChunkAddress, ChunkCache};
//! use volstream::multiscale::PixelRegion;
//!
//! let cache = ChunkCache::new(CacheConfig::default());
//! let store = cache.add_volume(1, 1, vec![[8, 64, 64]]);
//! let addr = ChunkAddress::new(PixelRegion::of_shape([8, 64, 64]), 0, 0);
//!
//! assert!(cache.get(&store, 0, &addr).is_none());
//! cache.insert(&store, 0, &addr, Bytes::from(vec![0u8; 8 * 64 * 64]))?;
//! assert!(cache.get(&store, 0, &addr).is_some());
//! ```

mod chunk_cache;
mod store;

use thiserror::Error;

use crate::config::ConfigError;

pub use chunk_cache::ChunkCache;
pub use store::{CacheStore, ChunkAddress, StoreId};

/// Default total cache budget (1 GiB).
pub const DEFAULT_CACHE_SIZE: u64 = 1024 * 1024 * 1024;

/// Errors raised by the chunk cache.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CacheError {
    /// The address does not exist in the store it was used with.
    #[error("store {store}: {what} {value} out of range (limit {limit})")]
    AddressOutOfRange {
        store: StoreId,
        what: &'static str,
        value: usize,
        limit: usize,
    },

    /// The region is empty or extends past its level's shape.
    #[error("store {store}: region {start:?}..{end:?} invalid for level {level}")]
    RegionOutOfBounds {
        store: StoreId,
        level: usize,
        start: [usize; 3],
        end: [usize; 3],
    },
}

/// Cache sizing.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CacheConfig {
    /// Total byte budget across all stores.
    pub max_size_bytes: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_size_bytes: DEFAULT_CACHE_SIZE,
        }
    }
}

impl CacheConfig {
    /// Creates a config with the given budget.
    pub fn new(max_size_bytes: u64) -> Self {
        Self { max_size_bytes }
    }

    /// Checks the budget is non-zero.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_size_bytes == 0 {
            return Err(ConfigError::Invalid(
                "cache max_size must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

/// Cache statistics.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Lookups that found an entry.
    pub hits: u64,
    /// Lookups that found nothing.
    pub misses: u64,
    /// Entries removed to stay within the byte budget.
    pub evictions: u64,
    /// Current weighted size in bytes.
    pub size_bytes: u64,
    /// Current number of entries.
    pub entry_count: u64,
    /// Configured budget.
    pub max_size_bytes: u64,
}

impl CacheStats {
    /// Fraction of lookups that hit, or 0.0 before any lookup.
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}
