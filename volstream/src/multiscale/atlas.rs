//! Packing Z slices into a 2D atlas.

use serde::{Deserialize, Serialize};

/// Row/column tiling of the Z slices of one load.
///
/// Recomputed for every load; a tiling is only meaningful for the slice
/// count and tile size it was computed from.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AtlasTileDims {
    /// Number of tile rows.
    pub rows: usize,
    /// Number of tile columns.
    pub cols: usize,
}

impl AtlasTileDims {
    /// Creates a tiling.
    pub const fn new(rows: usize, cols: usize) -> Self {
        Self { rows, cols }
    }

    /// Number of tile cells (some may be unused), saturating at `usize::MAX`.
    pub fn cells(&self) -> usize {
        self.rows.saturating_mul(self.cols)
    }

    /// Pixel size (width, height) of the atlas for tiles of the given size,
    /// saturating at `usize::MAX`.
    pub fn atlas_size(&self, tile_w: usize, tile_h: usize) -> (usize, usize) {
        (
            self.cols.saturating_mul(tile_w),
            self.rows.saturating_mul(tile_h),
        )
    }
}

/// Computes the squarest tiling of `z` slices of `tile_w` x `tile_h` pixels.
///
/// Starting from a single row, columns are removed one at a time while the
/// atlas stays wider than tall; the last tiling that was still wider than tall
/// wins. A single slice packs as (1, 1).
///
/// ```ignore
/// let dims = compute_packed_atlas_dims(8, 10, 10);
/// assert_eq!((dims.rows, dims.cols), (2, 4));
/// ```
pub fn compute_packed_atlas_dims(z: usize, tile_w: usize, tile_h: usize) -> AtlasTileDims {
    if z <= 1 {
        return AtlasTileDims::new(1, 1);
    }

    let aspect = |rows: usize, cols: usize| {
        (cols as f64 * tile_w as f64) / (rows as f64 * tile_h as f64)
    };

    let mut next_rows = 1;
    let mut next_cols = z;
    let mut packed = AtlasTileDims::new(next_rows, next_cols);
    while aspect(next_rows, next_cols) > 1.0 {
        packed = AtlasTileDims::new(next_rows, next_cols);
        if next_cols == 1 {
            break;
        }
        next_cols -= 1;
        next_rows = z.div_ceil(next_cols);
    }
    packed
}
