//! volstream - streaming of chunked multiscale volumes into bounded memory
//!
//! This library provides the data-loading pipeline of a volume viewer: it
//! decides which resolution level of a pyramidal store to load, fetches the
//! covering chunks through a deduplicating, priority-aware scheduler, keeps
//! them in a byte-budgeted cache shared by every volume, and reassembles them
//! into per-channel 8-bit buffers.
//!
//! # Modules
//!
//! - [`multiscale`] - level selection, atlas packing, region math (pure)
//! - [`scheduler`] - keyed two-lane async request queue with cancellation
//! - [`cache`] - process-wide LRU chunk cache
//! - [`loader`] - chunk-loader orchestration over a [`loader::ChunkSource`]
//! - [`config`] - pipeline settings and INI config file
//! - [`logging`] - `tracing` subscriber setup for binaries

pub mod cache;
pub mod config;
pub mod loader;
pub mod logging;
pub mod multiscale;
pub mod scheduler;

pub use cache::{CacheConfig, ChunkCache};
pub use config::{ConfigError, PipelineConfig};
pub use loader::{ChannelData, ChunkLoader, ChunkSource, LoadError, LoadSpec};
pub use multiscale::{compute_packed_atlas_dims, pick_level_to_load, Subregion};
pub use scheduler::{RequestError, RequestScheduler, SchedulerConfig};

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
