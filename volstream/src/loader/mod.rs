//! Loading subsets of multiscale volumes.
//!
//! This module ties the pipeline together:
//!
//! - [`LoadSpec`] - what to load (time, channels, subregion, level limits)
//! - [`ChunkSource`] - the per-format collaborator that fetches chunks
//! - [`plan_load`] - level, pixel region and chunk set for a spec
//! - [`ChunkLoader`] - cache + scheduler orchestration, reassembly, callback
//! - [`MemorySource`] - in-memory source for tests and generated data
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use volstream::cache::ChunkCache;
//! use volstream::loader::{ChunkLoader, ChunkScheduler, LoadSpec};
//! use volstream::scheduler::SchedulerConfig;
//!
//! let scheduler = ChunkScheduler::new(SchedulerConfig::default())?;
//! let loader = ChunkLoader::new(source, ChunkCache::shared(), scheduler)?;
//!
//! let report = loader
//!     .load(&LoadSpec::new(0).with_channels([0, 1]), &|channel| upload(channel))
//!     .await?;
//! ```

mod assemble;
mod chunk_loader;
mod error;
mod grid;
mod memory;
mod plan;
mod source;
mod spec;

pub use assemble::{copy_chunk_into, samples_as_f64, stretch_to_u8, value_range};
pub use chunk_loader::{
    ChannelData, ChannelFailure, ChannelSink, ChunkKey, ChunkLoader, ChunkScheduler, LoadReport,
};
pub use error::{LoadError, SourceError};
pub use grid::{chunk_grid_shape, chunk_region, covering_chunks};
pub use memory::MemorySource;
pub use plan::{plan_load, LoadPlan};
pub use source::{ChunkRequest, ChunkSource, SampleType};
pub use spec::LoadSpec;
