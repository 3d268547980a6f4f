//! Process-wide chunk cache using moka.
//!
//! Entries are weighted by their byte length and evicted least-recently-used
//! first once the total weight exceeds the budget. Reads never block on
//! writers and never trigger loading.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};

use bytes::Bytes;
use moka::notification::RemovalCause;
use moka::policy::EvictionPolicy;
use moka::sync::Cache;
use tracing::{debug, warn};

use super::store::{CacheStore, ChunkAddress, StoreId};
use super::{CacheConfig, CacheError, CacheStats};

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
struct EntryKey {
    store: StoreId,
    channel: usize,
    addr: ChunkAddress,
}

/// Byte-budgeted LRU cache of raw chunk bytes.
///
/// One instance is normally shared by every loader in the process, see
/// [`ChunkCache::shared`]. All methods take `&self`.
pub struct ChunkCache {
    cache: Cache<EntryKey, Bytes>,
    max_size_bytes: u64,
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: Arc<AtomicU64>,
}

impl ChunkCache {
    /// Create a cache with the given budget.
    pub fn new(config: CacheConfig) -> Self {
        let evictions = Arc::new(AtomicU64::new(0));
        let listener_evictions = Arc::clone(&evictions);

        let cache = Cache::builder()
            // moka weights are u32; chunks larger than 4 GiB are capped
            .weigher(|_key: &EntryKey, value: &Bytes| -> u32 {
                value.len().min(u32::MAX as usize) as u32
            })
            .max_capacity(config.max_size_bytes)
            .eviction_policy(EvictionPolicy::lru())
            .eviction_listener(move |_key: Arc<EntryKey>, _value: Bytes, cause| {
                if cause == RemovalCause::Size {
                    listener_evictions.fetch_add(1, Ordering::Relaxed);
                }
            })
            .support_invalidation_closures()
            .build();

        Self {
            cache,
            max_size_bytes: config.max_size_bytes,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            evictions,
        }
    }

    /// The process-wide cache, created on first use with the default budget.
    pub fn shared() -> Arc<ChunkCache> {
        static SHARED: OnceLock<Arc<ChunkCache>> = OnceLock::new();
        Arc::clone(SHARED.get_or_init(|| Arc::new(ChunkCache::new(CacheConfig::default()))))
    }

    /// Register a volume and get its namespace.
    ///
    /// `level_sizes` holds the spatial (z, y, x) size of each resolution level.
    pub fn add_volume(
        &self,
        channel_count: usize,
        time_count: usize,
        level_sizes: Vec<[usize; 3]>,
    ) -> CacheStore {
        let store = CacheStore::new(channel_count, time_count, level_sizes);
        debug!(
            store = %store.id(),
            channels = channel_count,
            times = time_count,
            levels = store.level_sizes().len(),
            "Registered volume with chunk cache"
        );
        store
    }

    /// Look up a chunk. A miss is `None`, never an error.
    pub fn get(&self, store: &CacheStore, channel: usize, addr: &ChunkAddress) -> Option<Bytes> {
        let key = EntryKey {
            store: store.id(),
            channel,
            addr: *addr,
        };
        match self.cache.get(&key) {
            Some(data) => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                Some(data)
            }
            None => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    /// Check for a chunk without touching statistics or recency.
    pub fn contains(&self, store: &CacheStore, channel: usize, addr: &ChunkAddress) -> bool {
        self.cache.contains_key(&EntryKey {
            store: store.id(),
            channel,
            addr: *addr,
        })
    }

    /// Store a chunk.
    ///
    /// Returns `Ok(false)` if the address was already cached; the existing
    /// bytes are kept. Eviction runs before returning.
    pub fn insert(
        &self,
        store: &CacheStore,
        channel: usize,
        addr: &ChunkAddress,
        data: Bytes,
    ) -> Result<bool, CacheError> {
        store.check(channel, addr)?;

        let len = data.len();
        if len as u64 > self.max_size_bytes {
            warn!(
                store = %store.id(),
                bytes = len,
                budget = self.max_size_bytes,
                "Chunk larger than cache budget"
            );
        }

        let key = EntryKey {
            store: store.id(),
            channel,
            addr: *addr,
        };
        let inserted = self.cache.entry(key).or_insert(data).is_fresh();
        self.cache.run_pending_tasks();

        if inserted {
            debug!(
                store = %store.id(),
                channel,
                level = addr.level,
                time = addr.time,
                bytes = len,
                "Cached chunk"
            );
        }
        Ok(inserted)
    }

    /// Drop every entry belonging to a store.
    pub fn remove_volume(&self, store: &CacheStore) {
        let id = store.id();
        if let Err(e) = self.cache.invalidate_entries_if(move |key, _| key.store == id) {
            warn!(store = %id, error = %e, "Failed to invalidate volume entries");
            return;
        }
        self.cache.run_pending_tasks();
        debug!(store = %id, "Removed volume from chunk cache");
    }

    /// Drop every entry.
    pub fn clear(&self) {
        self.cache.invalidate_all();
        self.cache.run_pending_tasks();
    }

    /// Current weighted size in bytes.
    pub fn size_bytes(&self) -> u64 {
        self.cache.weighted_size()
    }

    /// Current number of entries.
    pub fn entry_count(&self) -> u64 {
        self.cache.entry_count()
    }

    /// Configured budget.
    pub fn max_size_bytes(&self) -> u64 {
        self.max_size_bytes
    }

    /// Snapshot of cache statistics.
    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
            size_bytes: self.size_bytes(),
            entry_count: self.entry_count(),
            max_size_bytes: self.max_size_bytes,
        }
    }
}

impl std::fmt::Debug for ChunkCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChunkCache")
            .field("size_bytes", &self.size_bytes())
            .field("max_size_bytes", &self.max_size_bytes)
            .finish()
    }
}
