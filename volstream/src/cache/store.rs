//! Per-volume namespaces and chunk addresses.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use super::CacheError;
use crate::multiscale::PixelRegion;

static STORE_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Identity of one volume's namespace in the cache.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StoreId(u64);

impl StoreId {
    fn next() -> Self {
        Self(STORE_COUNTER.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for StoreId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// A volume registered with the cache.
///
/// Created by [`ChunkCache::add_volume`](super::ChunkCache::add_volume).
/// Every address used with the store is checked against its dimensions.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CacheStore {
    id: StoreId,
    channel_count: usize,
    time_count: usize,
    level_sizes: Vec<[usize; 3]>,
}

impl CacheStore {
    pub(super) fn new(channel_count: usize, time_count: usize, level_sizes: Vec<[usize; 3]>) -> Self {
        Self {
            id: StoreId::next(),
            channel_count,
            time_count,
            level_sizes,
        }
    }

    /// Store identity.
    pub fn id(&self) -> StoreId {
        self.id
    }

    /// Number of channels.
    pub fn channel_count(&self) -> usize {
        self.channel_count
    }

    /// Number of time points.
    pub fn time_count(&self) -> usize {
        self.time_count
    }

    /// Spatial (z, y, x) size of each level.
    pub fn level_sizes(&self) -> &[[usize; 3]] {
        &self.level_sizes
    }

    pub(super) fn check(&self, channel: usize, addr: &ChunkAddress) -> Result<(), CacheError> {
        let out_of_range = |what, value, limit| CacheError::AddressOutOfRange {
            store: self.id,
            what,
            value,
            limit,
        };
        if channel >= self.channel_count {
            return Err(out_of_range("channel", channel, self.channel_count));
        }
        if addr.time >= self.time_count {
            return Err(out_of_range("time", addr.time, self.time_count));
        }
        let size = self
            .level_sizes
            .get(addr.level)
            .ok_or_else(|| out_of_range("level", addr.level, self.level_sizes.len()))?;

        let region = &addr.region;
        let fits = (0..3).all(|axis| region.end[axis] <= size[axis]);
        if region.is_empty() || !fits {
            return Err(CacheError::RegionOutOfBounds {
                store: self.id,
                level: addr.level,
                start: region.start,
                end: region.end,
            });
        }
        Ok(())
    }
}

/// Location of a chunk within a store, excluding the channel.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ChunkAddress {
    /// Pixel bounds at `level`.
    pub region: PixelRegion,
    /// Time index.
    pub time: usize,
    /// Resolution level.
    pub level: usize,
}

impl ChunkAddress {
    /// Creates an address.
    pub fn new(region: PixelRegion, time: usize, level: usize) -> Self {
        Self {
            region,
            time,
            level,
        }
    }
}
