//! The per-format collaborator that actually fetches chunks.

use bytes::Bytes;
use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};

use super::SourceError;
use crate::multiscale::LevelShape;

/// Storage sample type of a volume. Samples are native endian.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SampleType {
    U8,
    U16,
    U32,
    I8,
    I16,
    I32,
    F32,
    F64,
}

impl SampleType {
    /// Size of one sample in bytes.
    pub fn bytes_per_sample(self) -> usize {
        match self {
            Self::U8 | Self::I8 => 1,
            Self::U16 | Self::I16 => 2,
            Self::U32 | Self::I32 | Self::F32 => 4,
            Self::F64 => 8,
        }
    }

    /// Returns true if samples are delivered without normalization.
    pub fn is_u8(self) -> bool {
        self == Self::U8
    }
}

/// One chunk of one channel at one time point.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ChunkRequest {
    /// Resolution level.
    pub level: usize,
    /// Channel index.
    pub channel: usize,
    /// Time index.
    pub time: usize,
    /// Chunk grid coordinate (z, y, x).
    pub chunk: [usize; 3],
}

/// A chunked multiscale store.
///
/// Implementations wrap a concrete format (a Zarr HTTP store, a TIFF reader,
/// an in-memory array). `fetch_chunk` returns one **full** chunk in C order
/// (z, y, x): chunks on the far edge of the grid are padded to the level's
/// chunk shape, as Zarr stores them.
pub trait ChunkSource: Send + Sync + 'static {
    /// Level shapes, finest first.
    fn levels(&self) -> &[LevelShape];

    /// Sample type shared by every level.
    fn sample_type(&self) -> SampleType;

    /// Fetch one chunk.
    fn fetch_chunk(&self, request: ChunkRequest) -> BoxFuture<'_, Result<Bytes, SourceError>>;
}
