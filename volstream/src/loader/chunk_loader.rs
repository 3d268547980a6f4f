//! Chunk-loader orchestration.
//!
//! A [`ChunkLoader`] turns a [`LoadSpec`] into per-channel region buffers:
//!
//! 1. plan: pick the level, convert the subregion to pixels, find the chunks
//! 2. for every (channel, chunk): cache lookup, else a scheduler request
//! 3. crop the chunks into one buffer per channel and normalize to 8 bits
//! 4. hand each finished channel to the [`ChannelSink`]
//!
//! Chunk requests are keyed by [`ChunkKey`], so overlapping loads (for example
//! two quick steps through a time series) share in-flight fetches.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use futures::future::{self, Either};
use futures::stream::{FuturesUnordered, StreamExt};
use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use super::assemble::{copy_chunk_into, samples_as_f64, stretch_to_u8, value_range};
use super::plan::{plan_load, LoadPlan};
use super::{ChunkRequest, ChunkSource, LoadError, LoadSpec};
use crate::cache::{CacheStore, ChunkAddress, ChunkCache, StoreId};
use crate::multiscale::{validate_levels, AtlasTileDims, LevelShape, PixelRegion};
use crate::scheduler::{RequestContext, RequestHandle, RequestScheduler};

/// Scheduler key of one chunk fetch.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ChunkKey {
    pub store: StoreId,
    pub level: usize,
    pub time: usize,
    pub channel: usize,
    pub chunk: [usize; 3],
}

impl ChunkKey {
    /// The source request this key fetches.
    pub fn request(&self) -> ChunkRequest {
        ChunkRequest {
            level: self.level,
            channel: self.channel,
            time: self.time,
            chunk: self.chunk,
        }
    }
}

/// Scheduler type used by chunk loaders.
pub type ChunkScheduler = RequestScheduler<ChunkKey, Bytes>;

/// One loaded channel.
#[derive(Clone, Debug)]
pub struct ChannelData {
    /// Channel index.
    pub channel: usize,
    /// Time index.
    pub time: usize,
    /// Resolution level the data came from.
    pub level: usize,
    /// Pixel bounds of the data at `level`.
    pub region: PixelRegion,
    /// Data extent (z, y, x).
    pub dims: [usize; 3],
    /// Slice tiling for an atlas of this data.
    pub atlas: AtlasTileDims,
    /// One byte per voxel, C order (z, y, x).
    pub data: Bytes,
    /// Source value range mapped onto 0..=255, `None` for u8 sources.
    pub range: Option<(f64, f64)>,
}

/// Receives channels as they finish loading.
pub trait ChannelSink: Send + Sync {
    /// Called once per successfully loaded channel.
    fn channel_loaded(&self, data: ChannelData);
}

impl<F> ChannelSink for F
where
    F: Fn(ChannelData) + Send + Sync,
{
    fn channel_loaded(&self, data: ChannelData) {
        self(data)
    }
}

/// A channel that could not be loaded.
#[derive(Debug)]
pub struct ChannelFailure {
    pub channel: usize,
    pub error: LoadError,
}

/// Summary of one load.
#[derive(Debug)]
pub struct LoadReport {
    /// Level that was loaded.
    pub level: usize,
    /// Pixel bounds at that level.
    pub region: PixelRegion,
    /// Slice tiling.
    pub atlas: AtlasTileDims,
    /// Chunks covering the region, per channel.
    pub chunks_per_channel: usize,
    /// Chunk lookups answered by the cache.
    pub cache_hits: usize,
    /// Channels delivered to the sink, in completion order.
    pub channels_loaded: Vec<usize>,
    /// Channels that failed.
    pub failures: Vec<ChannelFailure>,
}

impl LoadReport {
    fn new(plan: &LoadPlan) -> Self {
        Self {
            level: plan.level,
            region: plan.region,
            atlas: plan.atlas,
            chunks_per_channel: plan.chunks.len(),
            cache_hits: 0,
            channels_loaded: Vec::new(),
            failures: Vec::new(),
        }
    }

    /// Returns true if every requested channel was delivered.
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Loads subsets of one multiscale volume.
pub struct ChunkLoader {
    source: Arc<dyn ChunkSource>,
    cache: Arc<ChunkCache>,
    scheduler: ChunkScheduler,
    store: Arc<CacheStore>,
    closed: CancellationToken,
    ranges: Mutex<HashMap<usize, (f64, f64)>>,
}

impl ChunkLoader {
    /// Creates a loader and registers its volume with the cache.
    ///
    /// # Errors
    ///
    /// Returns `LoadError::InvalidLevels` if the source's level list is
    /// empty, has zero-sized dimensions, or grows from one level to the next.
    pub fn new(
        source: Arc<dyn ChunkSource>,
        cache: Arc<ChunkCache>,
        scheduler: ChunkScheduler,
    ) -> Result<Self, LoadError> {
        let levels = source.levels();
        validate_levels(levels)?;

        let first = levels[0];
        let store = cache.add_volume(
            first.channel_count(),
            first.time_count(),
            levels.iter().map(LevelShape::zyx).collect(),
        );
        info!(
            store = %store.id(),
            levels = levels.len(),
            channels = first.channel_count(),
            times = first.time_count(),
            sample_type = ?source.sample_type(),
            "Chunk loader created"
        );

        Ok(Self {
            source,
            cache,
            scheduler,
            store: Arc::new(store),
            closed: CancellationToken::new(),
            ranges: Mutex::new(HashMap::new()),
        })
    }

    /// The volume's cache namespace.
    pub fn store(&self) -> &CacheStore {
        &self.store
    }

    /// Level shapes of the source.
    pub fn levels(&self) -> &[LevelShape] {
        self.source.levels()
    }

    /// Plans a load without fetching anything.
    pub fn plan(&self, spec: &LoadSpec) -> Result<LoadPlan, LoadError> {
        plan_load(spec, self.source.levels())
    }

    /// Loads every requested channel and hands each to `sink` as it completes.
    ///
    /// Channels load concurrently. A failing channel is logged and listed in
    /// the report; it does not stop the others.
    ///
    /// # Errors
    ///
    /// Fails fast with `InvalidSpec`/`InvalidRegion` before anything is
    /// fetched if `spec` does not fit the volume.
    #[instrument(skip(self, spec, sink), fields(store = %self.store.id(), time = spec.time))]
    pub async fn load<S>(&self, spec: &LoadSpec, sink: &S) -> Result<LoadReport, LoadError>
    where
        S: ChannelSink + ?Sized,
    {
        let plan = self.plan(spec)?;
        debug!(
            level = plan.level,
            region = ?plan.region,
            chunks = plan.chunks.len(),
            channels = plan.channels.len(),
            "Load planned"
        );

        let mut report = LoadReport::new(&plan);
        let plan_ref = &plan;
        let mut pending: FuturesUnordered<_> = plan
            .channels
            .iter()
            .map(|&channel| async move {
                (channel, self.load_channel(plan_ref, spec, channel).await)
            })
            .collect();

        while let Some((channel, (hits, result))) = pending.next().await {
            report.cache_hits += hits;
            match result {
                Ok(data) => {
                    report.channels_loaded.push(channel);
                    sink.channel_loaded(data);
                }
                Err(error) => {
                    warn!(channel, error = %error, "Channel load failed");
                    report.failures.push(ChannelFailure { channel, error });
                }
            }
        }

        info!(
            level = report.level,
            loaded = report.channels_loaded.len(),
            failed = report.failures.len(),
            cache_hits = report.cache_hits,
            "Load finished"
        );
        Ok(report)
    }

    /// Warms the cache for `spec` through the low-priority lane.
    ///
    /// Returns the number of chunk requests issued; cached chunks are skipped.
    /// Nothing is delivered to any sink.
    pub fn prefetch(&self, spec: &LoadSpec) -> Result<usize, LoadError> {
        let plan = self.plan(spec)?;
        let mut requested = 0;
        for &channel in &plan.channels {
            for &chunk in &plan.chunks {
                let addr = self.chunk_address(&plan, spec.time, chunk);
                if self.cache.contains(&self.store, channel, &addr) {
                    continue;
                }
                let key = self.chunk_key(&plan, spec.time, channel, chunk);
                self.request_chunk(&plan, key, addr, true);
                requested += 1;
            }
        }
        debug!(time = spec.time, level = plan.level, requested, "Prefetch issued");
        Ok(requested)
    }

    /// Cancels the in-flight chunk requests of a spec's footprint.
    ///
    /// Returns how many requests were cancelled. Waiters see
    /// `RequestError::Cancelled` with `reason`.
    pub fn cancel_load(&self, spec: &LoadSpec, reason: Option<&str>) -> Result<usize, LoadError> {
        let plan = self.plan(spec)?;
        let mut cancelled = 0;
        for &channel in &plan.channels {
            for &chunk in &plan.chunks {
                let key = self.chunk_key(&plan, spec.time, channel, chunk);
                if self.scheduler.has_request(&key) {
                    self.scheduler.cancel_request(&key, reason);
                    cancelled += 1;
                }
            }
        }
        if cancelled > 0 {
            debug!(time = spec.time, cancelled, "Load cancelled");
        }
        Ok(cancelled)
    }

    /// Normalization range stored for a channel, if any.
    pub fn channel_range(&self, channel: usize) -> Option<(f64, f64)> {
        self.ranges.lock().get(&channel).copied()
    }

    /// Forgets stored normalization ranges; the next load measures them again.
    pub fn reset_channel_ranges(&self) {
        self.ranges.lock().clear();
    }

    /// Loads one channel; the hit count is returned even when loading fails.
    async fn load_channel(
        &self,
        plan: &LoadPlan,
        spec: &LoadSpec,
        channel: usize,
    ) -> (usize, Result<ChannelData, LoadError>) {
        let mut hits = 0;
        let fetches: Vec<_> = plan
            .chunks
            .iter()
            .map(|&chunk| {
                let addr = self.chunk_address(plan, spec.time, chunk);
                match self.cache.get(&self.store, channel, &addr) {
                    Some(data) => {
                        hits += 1;
                        Either::Left(future::ready(Ok(data)))
                    }
                    None => {
                        let key = self.chunk_key(plan, spec.time, channel, chunk);
                        Either::Right(self.request_chunk(plan, key, addr, spec.low_priority))
                    }
                }
            })
            .collect();
        let chunks = match future::try_join_all(fetches).await {
            Ok(chunks) => chunks,
            Err(e) => return (hits, Err(e.into())),
        };

        let bps = self.source.sample_type().bytes_per_sample();
        let mut buffer = vec![0u8; plan.region.num_elements() * bps];
        for (chunk, data) in plan.chunks.iter().zip(&chunks) {
            let origin = [
                chunk[0] * plan.chunk_shape[0],
                chunk[1] * plan.chunk_shape[1],
                chunk[2] * plan.chunk_shape[2],
            ];
            copy_chunk_into(&mut buffer, &plan.region, data, origin, plan.chunk_shape, bps);
        }

        let (data, range) = self.normalize(channel, buffer);
        debug!(channel, bytes = data.len(), cache_hits = hits, "Channel assembled");

        (
            hits,
            Ok(ChannelData {
                channel,
                time: spec.time,
                level: plan.level,
                region: plan.region,
                dims: plan.region.shape(),
                atlas: plan.atlas,
                data,
                range,
            }),
        )
    }

    fn normalize(&self, channel: usize, raw: Vec<u8>) -> (Bytes, Option<(f64, f64)>) {
        let sample_type = self.source.sample_type();
        if sample_type.is_u8() {
            return (Bytes::from(raw), None);
        }

        let values = samples_as_f64(&raw, sample_type);
        let range = {
            let mut ranges = self.ranges.lock();
            match ranges.get(&channel) {
                Some(&stored) => stored,
                None => {
                    let measured = value_range(&values).unwrap_or((0.0, 0.0));
                    // Only a range with contrast is kept for later loads.
                    if measured.1 > measured.0 {
                        ranges.insert(channel, measured);
                    }
                    measured
                }
            }
        };
        (Bytes::from(stretch_to_u8(&values, range)), Some(range))
    }

    fn chunk_key(&self, plan: &LoadPlan, time: usize, channel: usize, chunk: [usize; 3]) -> ChunkKey {
        ChunkKey {
            store: self.store.id(),
            level: plan.level,
            time,
            channel,
            chunk,
        }
    }

    fn chunk_address(&self, plan: &LoadPlan, time: usize, chunk: [usize; 3]) -> ChunkAddress {
        let region = super::grid::chunk_region(chunk, plan.chunk_shape, plan.level_shape);
        ChunkAddress::new(region, time, plan.level)
    }

    fn request_chunk(
        &self,
        plan: &LoadPlan,
        key: ChunkKey,
        addr: ChunkAddress,
        low_priority: bool,
    ) -> RequestHandle<Bytes> {
        let job = FetchJob {
            source: Arc::clone(&self.source),
            cache: Arc::clone(&self.cache),
            store: Arc::clone(&self.store),
            closed: self.closed.clone(),
            addr,
            expected_len: plan.chunk_shape.iter().product::<usize>()
                * self.source.sample_type().bytes_per_sample(),
        };
        self.scheduler
            .add_request(key, move |ctx| job.run(ctx), low_priority, Duration::ZERO)
    }
}

impl Drop for ChunkLoader {
    fn drop(&mut self) {
        self.closed.cancel();
        self.cache.remove_volume(&self.store);
        debug!(store = %self.store.id(), "Chunk loader dropped");
    }
}

impl std::fmt::Debug for ChunkLoader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChunkLoader")
            .field("store", &self.store.id())
            .field("levels", &self.source.levels().len())
            .finish()
    }
}

/// Everything a chunk fetch needs, moved into the scheduled action.
struct FetchJob {
    source: Arc<dyn ChunkSource>,
    cache: Arc<ChunkCache>,
    store: Arc<CacheStore>,
    closed: CancellationToken,
    addr: ChunkAddress,
    expected_len: usize,
}

impl FetchJob {
    async fn run(self, ctx: RequestContext<ChunkKey>) -> Result<Bytes, LoadError> {
        let key = *ctx.key();
        let data = self.source.fetch_chunk(key.request()).await?;
        if data.len() != self.expected_len {
            return Err(LoadError::ChunkSize {
                chunk: key.chunk,
                expected: self.expected_len,
                found: data.len(),
            });
        }

        // Results of cancelled requests are handed back but never cached.
        if ctx.is_cancelled() || self.closed.is_cancelled() {
            debug!(key = ?key, "Fetch finished after cancellation, not caching");
            return Ok(data);
        }
        self.cache
            .insert(&self.store, key.channel, &self.addr, data.clone())?;
        Ok(data)
    }
}
