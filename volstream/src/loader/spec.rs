//! Description of one load request.

use serde::{Deserialize, Serialize};

use crate::multiscale::{Subregion, DEFAULT_MAX_ATLAS_EDGE};

/// What subset of a volume to load.
///
/// A spec is cloned into the loader when a load starts and never changes
/// afterwards; issue a new spec to load something else.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoadSpec {
    /// Time index.
    pub time: usize,

    /// Channels to load; empty means every channel.
    pub channels: Vec<usize>,

    /// Normalized region of the volume to load.
    pub subregion: Subregion,

    /// Finest level allowed (lower index = finer). `None` allows level 0.
    pub multiscale_level: Option<usize>,

    /// Levels added to the estimated level; negative values load finer data.
    pub level_bias: i32,

    /// Maximum atlas edge in pixels used for level selection.
    pub max_atlas_edge: usize,

    /// Route chunk fetches through the low-priority lane.
    pub low_priority: bool,
}

impl Default for LoadSpec {
    fn default() -> Self {
        Self {
            time: 0,
            channels: Vec::new(),
            subregion: Subregion::full(),
            multiscale_level: None,
            level_bias: 0,
            max_atlas_edge: DEFAULT_MAX_ATLAS_EDGE,
            low_priority: false,
        }
    }
}

impl LoadSpec {
    /// Creates a spec loading every channel of the whole volume at `time`.
    pub fn new(time: usize) -> Self {
        Self {
            time,
            ..Default::default()
        }
    }

    /// Restrict the load to the given channels.
    pub fn with_channels(mut self, channels: impl IntoIterator<Item = usize>) -> Self {
        self.channels = channels.into_iter().collect();
        self
    }

    /// Set the subregion.
    pub fn with_subregion(mut self, subregion: Subregion) -> Self {
        self.subregion = subregion;
        self
    }

    /// Set the finest level allowed.
    pub fn with_min_level(mut self, level: usize) -> Self {
        self.multiscale_level = Some(level);
        self
    }

    /// Set the level bias.
    pub fn with_level_bias(mut self, bias: i32) -> Self {
        self.level_bias = bias;
        self
    }

    /// Set the maximum atlas edge.
    pub fn with_max_atlas_edge(mut self, edge: usize) -> Self {
        self.max_atlas_edge = edge;
        self
    }

    /// Mark the load as low priority.
    pub fn with_low_priority(mut self, low_priority: bool) -> Self {
        self.low_priority = low_priority;
        self
    }

    /// Same spec at another time point.
    pub fn at_time(&self, time: usize) -> Self {
        Self {
            time,
            ..self.clone()
        }
    }

    /// Channels to load given the volume's channel count.
    pub fn resolved_channels(&self, channel_count: usize) -> Vec<usize> {
        if self.channels.is_empty() {
            (0..channel_count).collect()
        } else {
            self.channels.clone()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let spec = LoadSpec::default();
        assert_eq!(spec.time, 0);
        assert!(spec.channels.is_empty());
        assert_eq!(spec.subregion, Subregion::full());
        assert_eq!(spec.max_atlas_edge, DEFAULT_MAX_ATLAS_EDGE);
        assert!(!spec.low_priority);
    }

    #[test]
    fn test_builder() {
        let spec = LoadSpec::new(3)
            .with_channels([0, 2])
            .with_min_level(1)
            .with_level_bias(-1)
            .with_max_atlas_edge(4096)
            .with_low_priority(true);
        assert_eq!(spec.time, 3);
        assert_eq!(spec.channels, vec![0, 2]);
        assert_eq!(spec.multiscale_level, Some(1));
        assert_eq!(spec.level_bias, -1);
        assert_eq!(spec.max_atlas_edge, 4096);
        assert!(spec.low_priority);
    }

    #[test]
    fn test_resolved_channels() {
        assert_eq!(LoadSpec::new(0).resolved_channels(3), vec![0, 1, 2]);
        assert_eq!(
            LoadSpec::new(0).with_channels([1]).resolved_channels(3),
            vec![1]
        );
    }

    #[test]
    fn test_at_time_keeps_everything_else() {
        let spec = LoadSpec::new(0).with_channels([1]).with_min_level(2);
        let next = spec.at_time(5);
        assert_eq!(next.time, 5);
        assert_eq!(next.channels, spec.channels);
        assert_eq!(next.multiscale_level, spec.multiscale_level);
    }

    #[test]
    fn test_deserialize_partial_json() {
        let spec: LoadSpec =
            serde_json::from_str(r#"{"time": 2, "channels": [1], "multiscale_level": 1}"#).unwrap();
        assert_eq!(spec.time, 2);
        assert_eq!(spec.channels, vec![1]);
        assert_eq!(spec.multiscale_level, Some(1));
        assert_eq!(spec.max_atlas_edge, DEFAULT_MAX_ATLAS_EDGE);
        assert_eq!(spec.subregion, Subregion::full());
    }
}
