//! Integration tests for the chunk loading pipeline.
//!
//! These tests drive the loader, scheduler and cache together:
//! - overlapping loads sharing in-flight fetches
//! - cancelling a time step mid-flight
//! - prefetch waiting behind visible loads
//! - several volumes sharing one cache budget
//!
//! Run with: `cargo test --test chunk_loader_integration`

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use futures::future::{BoxFuture, FutureExt};
use parking_lot::Mutex;

use volstream::cache::{CacheConfig, ChunkAddress, ChunkCache};
use volstream::loader::{
    chunk_region, ChannelData, ChunkLoader, ChunkRequest, ChunkScheduler, ChunkSource, LoadSpec,
    MemorySource, SampleType, SourceError,
};
use volstream::multiscale::LevelShape;
use volstream::scheduler::SchedulerConfig;

// ============================================================================
// Helper Functions
// ============================================================================

/// 3 time points, 1 channel, 2x8x8 u8 volume in 1x4x4 chunks (8 chunks).
fn time_series() -> Arc<MemorySource> {
    let shape = LevelShape::new([3, 1, 2, 8, 8], [1, 1, 1, 4, 4]);
    let data: Vec<u8> = (0..3 * 128).map(|i| (i % 251) as u8).collect();
    Arc::new(MemorySource::new(SampleType::U8, vec![(shape, Bytes::from(data))]).unwrap())
}

/// Delays every fetch and records the order fetches started in.
struct SlowSource {
    inner: Arc<MemorySource>,
    delay: Duration,
    started: Mutex<Vec<ChunkRequest>>,
}

impl SlowSource {
    fn new(inner: Arc<MemorySource>, delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            inner,
            delay,
            started: Mutex::new(Vec::new()),
        })
    }

    fn started(&self) -> Vec<ChunkRequest> {
        self.started.lock().clone()
    }
}

impl ChunkSource for SlowSource {
    fn levels(&self) -> &[LevelShape] {
        self.inner.levels()
    }

    fn sample_type(&self) -> SampleType {
        self.inner.sample_type()
    }

    fn fetch_chunk(&self, request: ChunkRequest) -> BoxFuture<'_, Result<Bytes, SourceError>> {
        self.started.lock().push(request);
        async move {
            tokio::time::sleep(self.delay).await;
            self.inner.fetch_chunk(request).await
        }
        .boxed()
    }
}

fn pipeline(
    source: Arc<dyn ChunkSource>,
    cache_bytes: u64,
    scheduler: SchedulerConfig,
) -> (ChunkLoader, Arc<ChunkCache>) {
    let cache = Arc::new(ChunkCache::new(CacheConfig::new(cache_bytes)));
    let scheduler = ChunkScheduler::new(scheduler).unwrap();
    let loader = ChunkLoader::new(source, Arc::clone(&cache), scheduler).unwrap();
    (loader, cache)
}

fn discard(_: ChannelData) {}

// ============================================================================
// Integration Tests
// ============================================================================

/// Two loads of the same time point issued together fetch each chunk once.
#[tokio::test]
async fn test_overlapping_loads_share_fetches() {
    let source = SlowSource::new(time_series(), Duration::from_millis(20));
    let (loader, _) = pipeline(source.clone(), 1 << 20, SchedulerConfig::default());
    let spec = LoadSpec::new(0);

    let (first, second) = tokio::join!(loader.load(&spec, &discard), loader.load(&spec, &discard));

    assert!(first.unwrap().is_complete());
    assert!(second.unwrap().is_complete());
    assert_eq!(source.started().len(), 8);
}

/// Stepping to the next time point cancels the previous one without caching it.
#[tokio::test]
async fn test_time_step_cancels_previous_load() {
    let source = SlowSource::new(time_series(), Duration::from_millis(50));
    let (loader, cache) = pipeline(source.clone(), 1 << 20, SchedulerConfig::default());
    let t0 = LoadSpec::new(0);

    let cancel_soon = async {
        tokio::time::sleep(Duration::from_millis(10)).await;
        loader.cancel_load(&t0, Some("stepped to t=1")).unwrap()
    };
    let (report, cancelled) = tokio::join!(loader.load(&t0, &discard), cancel_soon);
    let report = report.unwrap();

    assert_eq!(cancelled, 8);
    assert_eq!(report.failures.len(), 1);
    assert!(report.failures[0].error.is_cancelled());
    assert!(report.failures[0].error.to_string().contains("stepped to t=1"));

    // Let the abandoned fetches finish; none of them may reach the cache.
    tokio::time::sleep(Duration::from_millis(100)).await;
    let plan = loader.plan(&t0).unwrap();
    for &chunk in &plan.chunks {
        let region = chunk_region(chunk, plan.chunk_shape, plan.level_shape);
        let addr = ChunkAddress::new(region, 0, plan.level);
        assert!(!cache.contains(loader.store(), 0, &addr));
    }

    let next = loader.load(&LoadSpec::new(1), &discard).await.unwrap();
    assert!(next.is_complete());
}

/// Prefetch runs in the low-priority lane and yields to a visible load.
#[tokio::test]
async fn test_prefetch_yields_to_visible_load() {
    let source = SlowSource::new(time_series(), Duration::from_millis(10));
    let (loader, _) = pipeline(source.clone(), 1 << 20, SchedulerConfig::new(1, 1));

    assert_eq!(loader.prefetch(&LoadSpec::new(1)).unwrap(), 8);
    let report = loader.load(&LoadSpec::new(0), &discard).await.unwrap();
    assert!(report.is_complete());

    // One prefetch chunk was already running; every visible chunk follows it
    // before the rest of the prefetch.
    let times: Vec<usize> = source.started().iter().map(|r| r.time).collect();
    assert_eq!(times[0], 1);
    assert!(times[1..9].iter().all(|&t| t == 0), "order: {:?}", times);
}

/// Volumes share the cache budget; loading one evicts the other.
#[tokio::test]
async fn test_volumes_share_cache_budget() {
    // Room for 8 chunks of 16 bytes: exactly one full time point.
    let cache = Arc::new(ChunkCache::new(CacheConfig::new(8 * 16)));
    let scheduler = ChunkScheduler::new(SchedulerConfig::default()).unwrap();
    let first = ChunkLoader::new(time_series(), Arc::clone(&cache), scheduler.clone()).unwrap();
    let second = ChunkLoader::new(time_series(), Arc::clone(&cache), scheduler).unwrap();

    first.load(&LoadSpec::new(0), &discard).await.unwrap();
    assert_eq!(cache.stats().evictions, 0);

    second.load(&LoadSpec::new(0), &discard).await.unwrap();
    assert!(cache.stats().evictions > 0);

    // The first volume lost chunks to the second and refetches them.
    let again = first.load(&LoadSpec::new(0), &discard).await.unwrap();
    assert!(again.is_complete());
    assert!(again.cache_hits < 8);
}

/// Delivered data matches the source for a cropped, multi-chunk region.
#[tokio::test]
async fn test_delivered_region_matches_source() {
    let (loader, _) = pipeline(time_series(), 1 << 20, SchedulerConfig::default());
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink_seen = Arc::clone(&seen);
    let sink = move |data: ChannelData| sink_seen.lock().push(data);

    // z 1..2, y 2..6, x 3..5 at t=2.
    let spec = LoadSpec::new(2).with_subregion(volstream::Subregion::new(
        [0.5, 0.25, 0.375],
        [1.0, 0.75, 0.625],
    ));
    loader.load(&spec, &sink).await.unwrap();

    let data = seen.lock()[0].clone();
    assert_eq!(data.dims, [1, 4, 2]);
    let expected: Vec<u8> = (2..6)
        .flat_map(|y| (3..5).map(move |x| ((2 * 128 + 64 + y * 8 + x) % 251) as u8))
        .collect();
    assert_eq!(&data.data[..], &expected[..]);
}
