//! Pure multiscale geometry: level selection, atlas packing, region math.
//!
//! Nothing here does I/O. The loader uses these functions to decide which
//! resolution level of a pyramid to fetch and how its Z slices will be laid
//! out in a 2D atlas.
//!
//! # Example
//!
//! ```ignore
//! use volstream::multiscale::{compute_packed_atlas_dims, estimate_level_for_atlas};
//!
//! let level = estimate_level_for_atlas(&[[4, 4, 4], [2, 2, 2], [1, 1, 1]], 2);
//! assert_eq!(level, 2);
//!
//! let tiling = compute_packed_atlas_dims(8, 10, 10);
//! assert_eq!((tiling.rows, tiling.cols), (2, 4));
//! ```

mod atlas;
mod level;
mod region;

pub use atlas::{compute_packed_atlas_dims, AtlasTileDims};
pub use level::{
    estimate_level_for_atlas, pick_level_to_load, validate_levels, LevelError, LevelShape,
};
pub use region::{PixelRegion, RegionError, Subregion};

/// Default maximum atlas edge in pixels.
pub const DEFAULT_MAX_ATLAS_EDGE: usize = 2048;
