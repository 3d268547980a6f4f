//! Resolution level shapes and level selection.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::loader::LoadSpec;

/// Errors for malformed level lists.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LevelError {
    /// No levels were supplied.
    #[error("multiscale store has no levels")]
    Empty,

    /// A shape or chunk shape has a zero dimension.
    #[error("level {level} has a zero-sized dimension")]
    ZeroDimension { level: usize },

    /// A level is larger than the one before it.
    #[error("level {level} is larger than level {} on axis {axis}", .level - 1)]
    NotDecreasing { level: usize, axis: usize },

    /// Levels disagree on time or channel count.
    #[error("level {level} has {found} {what}, level 0 has {expected}")]
    Mismatch {
        level: usize,
        what: &'static str,
        expected: usize,
        found: usize,
    },
}

/// Shape of one resolution level of a multiscale store.
///
/// Both shapes are TCZYX; index 0 of a level list is the finest level.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LevelShape {
    /// Array shape (t, c, z, y, x).
    pub shape: [usize; 5],
    /// Storage chunk shape (t, c, z, y, x).
    pub chunk_shape: [usize; 5],
}

impl LevelShape {
    /// Creates a level shape.
    pub const fn new(shape: [usize; 5], chunk_shape: [usize; 5]) -> Self {
        Self { shape, chunk_shape }
    }

    /// Number of time points.
    pub fn time_count(&self) -> usize {
        self.shape[0]
    }

    /// Number of channels.
    pub fn channel_count(&self) -> usize {
        self.shape[1]
    }

    /// Spatial shape (z, y, x).
    pub fn zyx(&self) -> [usize; 3] {
        [self.shape[2], self.shape[3], self.shape[4]]
    }

    /// Spatial chunk shape (z, y, x).
    pub fn chunk_zyx(&self) -> [usize; 3] {
        [self.chunk_shape[2], self.chunk_shape[3], self.chunk_shape[4]]
    }
}

/// Checks a level list is usable for loading.
///
/// Levels must be non-empty, have no zero dimensions, agree on time and
/// channel counts, and never grow spatially from one level to the next.
pub fn validate_levels(levels: &[LevelShape]) -> Result<(), LevelError> {
    let first = levels.first().ok_or(LevelError::Empty)?;

    for (level, shape) in levels.iter().enumerate() {
        if shape.shape.contains(&0) || shape.chunk_shape.contains(&0) {
            return Err(LevelError::ZeroDimension { level });
        }
        for (what, expected, found) in [
            ("time points", first.time_count(), shape.time_count()),
            ("channels", first.channel_count(), shape.channel_count()),
        ] {
            if expected != found {
                return Err(LevelError::Mismatch {
                    level,
                    what,
                    expected,
                    found,
                });
            }
        }
        if level > 0 {
            let previous = levels[level - 1].zyx();
            let current = shape.zyx();
            if let Some(axis) = (0..3).find(|&axis| current[axis] > previous[axis]) {
                return Err(LevelError::NotDecreasing { level, axis });
            }
        }
    }
    Ok(())
}

/// Picks the finest level whose slices fit in a square atlas.
///
/// A level fits when `floor(edge / x) * floor(edge / y) >= z`, i.e. all of its
/// Z slices can be tiled into an `edge` x `edge` atlas. Levels are tried from
/// finest (index 0) to coarsest; if none fits, the coarsest level is returned
/// and its atlas is allowed to exceed the edge.
pub fn estimate_level_for_atlas(levels_zyx: &[[usize; 3]], max_atlas_edge: usize) -> usize {
    if levels_zyx.len() <= 1 {
        return 0;
    }

    for (level, &[z, y, x]) in levels_zyx.iter().enumerate() {
        let x_tiles = max_atlas_edge / x.max(1);
        let y_tiles = max_atlas_edge / y.max(1);
        if x_tiles.saturating_mul(y_tiles) >= z {
            return level;
        }
    }
    levels_zyx.len() - 1
}

/// Picks the level to load for a spec.
///
/// Each level's extent is scaled by the subregion's fractional size before
/// estimating, so a small subregion can be loaded at a finer level. The
/// estimate is shifted by `level_bias`, then never finer than the
/// `multiscale_level` floor, and finally clamped to the available levels.
pub fn pick_level_to_load(spec: &LoadSpec, levels_zyx: &[[usize; 3]]) -> usize {
    if levels_zyx.is_empty() {
        return 0;
    }

    let fraction = spec.subregion.size();
    let scaled: Vec<[usize; 3]> = levels_zyx
        .iter()
        .map(|dims| {
            let mut out = [0; 3];
            for axis in 0..3 {
                out[axis] = ((dims[axis] as f64 * fraction[axis]).ceil() as usize).max(1);
            }
            out
        })
        .collect();

    let estimate = estimate_level_for_atlas(&scaled, spec.max_atlas_edge) as i64;
    let biased = (estimate + i64::from(spec.level_bias)).max(0) as usize;
    let floored = biased.max(spec.multiscale_level.unwrap_or(0));
    floored.min(levels_zyx.len() - 1)
}
