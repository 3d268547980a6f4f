//! Loader and chunk source errors.

use thiserror::Error;

use crate::cache::CacheError;
use crate::multiscale::{LevelError, RegionError};
use crate::scheduler::RequestError;

/// Errors reported by a [`ChunkSource`](super::ChunkSource).
#[derive(Debug, Error)]
pub enum SourceError {
    /// The requested chunk does not exist in the store.
    #[error("chunk {chunk:?} of level {level} not found")]
    NotFound { level: usize, chunk: [usize; 3] },

    /// Reading the underlying storage failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Decoding or transport failure described by the source.
    #[error("{0}")]
    Other(String),
}

/// Errors from planning or running a load.
#[derive(Debug, Error)]
pub enum LoadError {
    /// The spec asks for something the volume does not have.
    #[error("invalid load spec: {0}")]
    InvalidSpec(String),

    /// The spec's subregion is malformed.
    #[error("invalid subregion: {0}")]
    InvalidRegion(#[from] RegionError),

    /// The source's level list is unusable.
    #[error("invalid multiscale levels: {0}")]
    InvalidLevels(#[from] LevelError),

    /// A chunk request was cancelled or its fetch failed.
    #[error(transparent)]
    Request(#[from] RequestError),

    /// The source failed to produce a chunk.
    #[error("chunk source error: {0}")]
    Source(#[from] SourceError),

    /// The cache rejected a chunk address.
    #[error("cache error: {0}")]
    Cache(#[from] CacheError),

    /// A fetched chunk has the wrong byte length.
    #[error("chunk {chunk:?} has {found} bytes, expected {expected}")]
    ChunkSize {
        chunk: [usize; 3],
        expected: usize,
        found: usize,
    },
}

impl LoadError {
    /// Returns true if the failure came from a cancelled request.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Request(e) if e.is_cancelled())
    }
}
