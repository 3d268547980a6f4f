//! Concurrency limits for the request scheduler.

use crate::config::ConfigError;

/// Default ceiling on concurrently running requests.
pub const DEFAULT_MAX_ACTIVE: usize = 10;

/// Default ceiling on concurrently running low-priority requests.
pub const DEFAULT_MAX_LOW_PRIORITY_ACTIVE: usize = 5;

/// Configuration for [`RequestScheduler`](super::RequestScheduler).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SchedulerConfig {
    /// Maximum number of actions running at once, across both lanes.
    pub max_active: usize,

    /// Maximum number of low-priority actions running at once.
    ///
    /// Must not exceed `max_active`.
    pub max_low_priority_active: usize,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            max_active: DEFAULT_MAX_ACTIVE,
            max_low_priority_active: DEFAULT_MAX_LOW_PRIORITY_ACTIVE,
        }
    }
}

impl SchedulerConfig {
    /// Creates a config with the given ceilings.
    pub fn new(max_active: usize, max_low_priority_active: usize) -> Self {
        Self {
            max_active,
            max_low_priority_active,
        }
    }

    /// Set the overall ceiling.
    pub fn with_max_active(mut self, max_active: usize) -> Self {
        self.max_active = max_active;
        self
    }

    /// Set the low-priority ceiling.
    pub fn with_max_low_priority_active(mut self, max: usize) -> Self {
        self.max_low_priority_active = max;
        self
    }

    /// Checks the ceilings are usable.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_active == 0 {
            return Err(ConfigError::Invalid(
                "scheduler max_active must be at least 1".to_string(),
            ));
        }
        if self.max_low_priority_active > self.max_active {
            return Err(ConfigError::Invalid(format!(
                "scheduler max_low_priority_active ({}) exceeds max_active ({})",
                self.max_low_priority_active, self.max_active
            )));
        }
        Ok(())
    }
}
