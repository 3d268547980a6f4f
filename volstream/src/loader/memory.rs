//! In-memory chunk source.

use std::sync::atomic::{AtomicUsize, Ordering};

use bytes::Bytes;
use futures::future::{self, BoxFuture, FutureExt};

use super::assemble::copy_chunk_into;
use super::grid::chunk_grid_shape;
use super::{ChunkRequest, ChunkSource, SampleType, SourceError};
use crate::multiscale::{LevelShape, PixelRegion};

/// A multiscale volume held entirely in memory.
///
/// Each level is one TCZYX array in C order. Chunks are cut out on request
/// and padded with zeros at the far edges of the grid. Useful for tests and
/// for volumes computed on the fly.
pub struct MemorySource {
    levels: Vec<LevelShape>,
    arrays: Vec<Bytes>,
    sample_type: SampleType,
    fetches: AtomicUsize,
}

impl MemorySource {
    /// Creates a source from `(shape, data)` pairs, finest level first.
    pub fn new(
        sample_type: SampleType,
        levels: Vec<(LevelShape, Bytes)>,
    ) -> Result<Self, SourceError> {
        let bps = sample_type.bytes_per_sample();
        for (level, (shape, data)) in levels.iter().enumerate() {
            let expected = shape.shape.iter().product::<usize>() * bps;
            if data.len() != expected {
                return Err(SourceError::Other(format!(
                    "level {level} holds {} bytes, shape {:?} needs {expected}",
                    data.len(),
                    shape.shape
                )));
            }
        }
        let (levels, arrays) = levels.into_iter().unzip();
        Ok(Self {
            levels,
            arrays,
            sample_type,
            fetches: AtomicUsize::new(0),
        })
    }

    /// Number of chunks fetched so far.
    pub fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::Relaxed)
    }

    fn cut_chunk(&self, request: ChunkRequest) -> Result<Bytes, SourceError> {
        let not_found = || SourceError::NotFound {
            level: request.level,
            chunk: request.chunk,
        };
        let shape = self.levels.get(request.level).ok_or_else(not_found)?;
        let [t, c, z, y, x] = shape.shape;
        let chunk_zyx = shape.chunk_zyx();
        let grid = chunk_grid_shape(shape.zyx(), chunk_zyx);
        if request.time >= t
            || request.channel >= c
            || (0..3).any(|axis| request.chunk[axis] >= grid[axis])
        {
            return Err(not_found());
        }

        let bps = self.sample_type.bytes_per_sample();
        let volume_bytes = z * y * x * bps;
        let offset = (request.time * c + request.channel) * volume_bytes;
        let volume = &self.arrays[request.level][offset..offset + volume_bytes];

        // Copy the volume into the chunk by treating the chunk box as the
        // destination region and the whole volume as one big source chunk.
        let origin = [
            request.chunk[0] * chunk_zyx[0],
            request.chunk[1] * chunk_zyx[1],
            request.chunk[2] * chunk_zyx[2],
        ];
        let chunk_box = PixelRegion::new(
            origin,
            [
                origin[0] + chunk_zyx[0],
                origin[1] + chunk_zyx[1],
                origin[2] + chunk_zyx[2],
            ],
        );
        let mut out = vec![0u8; chunk_box.num_elements() * bps];
        copy_chunk_into(&mut out, &chunk_box, volume, [0, 0, 0], [z, y, x], bps);
        Ok(Bytes::from(out))
    }
}

impl ChunkSource for MemorySource {
    fn levels(&self) -> &[LevelShape] {
        &self.levels
    }

    fn sample_type(&self) -> SampleType {
        self.sample_type
    }

    fn fetch_chunk(&self, request: ChunkRequest) -> BoxFuture<'_, Result<Bytes, SourceError>> {
        self.fetches.fetch_add(1, Ordering::Relaxed);
        future::ready(self.cut_chunk(request)).boxed()
    }
}
