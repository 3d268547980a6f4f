//! Pipeline configuration.
//!
//! [`PipelineConfig`] bundles the settings of every pipeline component so
//! they are configured consistently. It can be built in code with the
//! `with_*` builders or loaded from an INI file through [`ConfigFile`]:
//!
//! ```ini
//! [scheduler]
//! max_active = 10
//! max_low_priority_active = 5
//!
//! [cache]
//! max_size = 1GB
//!
//! [atlas]
//! max_edge = 2048
//! ```

mod file;
mod size;

use std::path::PathBuf;

use thiserror::Error;

use crate::cache::CacheConfig;
use crate::multiscale::DEFAULT_MAX_ATLAS_EDGE;
use crate::scheduler::SchedulerConfig;

pub use file::ConfigFile;
pub use size::{format_size, parse_size};

/// Errors raised while building or loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A setting is out of its valid range.
    #[error("invalid configuration: {0}")]
    Invalid(String),

    /// The config file could not be read or parsed.
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: ini::Error,
    },

    /// The config file could not be written.
    #[error("failed to write config file {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A value in the config file could not be parsed.
    #[error("invalid value for {section}.{key}: {value:?}")]
    Value {
        section: &'static str,
        key: &'static str,
        value: String,
    },
}

/// Settings for the whole loading pipeline.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PipelineConfig {
    /// Request scheduler ceilings.
    pub scheduler: SchedulerConfig,

    /// Chunk cache budget.
    pub cache: CacheConfig,

    /// Default maximum atlas edge used for level selection.
    pub max_atlas_edge: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            scheduler: SchedulerConfig::default(),
            cache: CacheConfig::default(),
            max_atlas_edge: DEFAULT_MAX_ATLAS_EDGE,
        }
    }
}

impl PipelineConfig {
    /// Set the scheduler config.
    pub fn with_scheduler(mut self, scheduler: SchedulerConfig) -> Self {
        self.scheduler = scheduler;
        self
    }

    /// Set the cache config.
    pub fn with_cache(mut self, cache: CacheConfig) -> Self {
        self.cache = cache;
        self
    }

    /// Set the default maximum atlas edge.
    pub fn with_max_atlas_edge(mut self, edge: usize) -> Self {
        self.max_atlas_edge = edge;
        self
    }

    /// Checks every component's settings.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.scheduler.validate()?;
        self.cache.validate()?;
        if self.max_atlas_edge == 0 {
            return Err(ConfigError::Invalid(
                "atlas max_edge must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}
