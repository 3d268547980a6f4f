//! Normalized subregions and their pixel bounds.
//!
//! All 3D quantities are ordered (z, y, x), matching the trailing axes of the
//! TCZYX shapes used by multiscale stores.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors for malformed subregions.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum RegionError {
    /// A bound is NaN or infinite.
    #[error("subregion bound is not finite: {0}")]
    NonFinite(f64),

    /// A bound lies outside [0, 1].
    #[error("subregion bound {value} on axis {axis} outside [0, 1]")]
    OutOfRange { axis: usize, value: f64 },

    /// min > max on an axis.
    #[error("subregion inverted on axis {axis}: min {min} > max {max}")]
    Inverted { axis: usize, min: f64, max: f64 },
}

/// Axis-aligned box selecting part of a volume, in normalized coordinates.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Subregion {
    /// Lower corner (z, y, x), each in [0, 1].
    pub min: [f64; 3],
    /// Upper corner (z, y, x), each in [0, 1].
    pub max: [f64; 3],
}

impl Default for Subregion {
    fn default() -> Self {
        Self::full()
    }
}

impl Subregion {
    /// The whole volume.
    pub const fn full() -> Self {
        Self {
            min: [0.0; 3],
            max: [1.0; 3],
        }
    }

    /// Creates a subregion from its corners.
    pub fn new(min: [f64; 3], max: [f64; 3]) -> Self {
        Self { min, max }
    }

    /// Checks bounds are finite, within [0, 1], and not inverted.
    pub fn validate(&self) -> Result<(), RegionError> {
        for axis in 0..3 {
            let (min, max) = (self.min[axis], self.max[axis]);
            for value in [min, max] {
                if !value.is_finite() {
                    return Err(RegionError::NonFinite(value));
                }
                if !(0.0..=1.0).contains(&value) {
                    return Err(RegionError::OutOfRange { axis, value });
                }
            }
            if min > max {
                return Err(RegionError::Inverted { axis, min, max });
            }
        }
        Ok(())
    }

    /// Fractional extent per axis.
    pub fn size(&self) -> [f64; 3] {
        [
            self.max[0] - self.min[0],
            self.max[1] - self.min[1],
            self.max[2] - self.min[2],
        ]
    }

    /// Converts to pixel bounds for a level of the given (z, y, x) shape.
    ///
    /// The lower corner is floored and the upper corner ceiled, so partially
    /// covered pixels are included. An axis of zero width still selects one
    /// pixel. The result is clamped to the shape.
    pub fn to_pixels(&self, shape_zyx: [usize; 3]) -> PixelRegion {
        let mut start = [0; 3];
        let mut end = [0; 3];
        for axis in 0..3 {
            let size = shape_zyx[axis].max(1);
            let lo = (self.min[axis] * size as f64).floor().max(0.0) as usize;
            let hi = (self.max[axis] * size as f64).ceil().max(0.0) as usize;
            start[axis] = lo.min(size - 1);
            end[axis] = hi.min(size).max(start[axis] + 1);
        }
        PixelRegion { start, end }
    }
}

/// Half-open pixel box `[start, end)` on each (z, y, x) axis.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PixelRegion {
    /// Inclusive lower corner.
    pub start: [usize; 3],
    /// Exclusive upper corner.
    pub end: [usize; 3],
}

impl PixelRegion {
    /// Creates a region from its corners.
    pub fn new(start: [usize; 3], end: [usize; 3]) -> Self {
        Self { start, end }
    }

    /// Region covering a whole shape.
    pub fn of_shape(shape_zyx: [usize; 3]) -> Self {
        Self {
            start: [0; 3],
            end: shape_zyx,
        }
    }

    /// Extent per axis.
    pub fn shape(&self) -> [usize; 3] {
        [
            self.end[0].saturating_sub(self.start[0]),
            self.end[1].saturating_sub(self.start[1]),
            self.end[2].saturating_sub(self.start[2]),
        ]
    }

    /// Number of voxels inside.
    pub fn num_elements(&self) -> usize {
        self.shape().iter().product()
    }

    /// Returns true if the region holds no voxels.
    pub fn is_empty(&self) -> bool {
        self.num_elements() == 0
    }

    /// Overlap with another region, if any.
    pub fn intersect(&self, other: &PixelRegion) -> Option<PixelRegion> {
        let mut start = [0; 3];
        let mut end = [0; 3];
        for axis in 0..3 {
            start[axis] = self.start[axis].max(other.start[axis]);
            end[axis] = self.end[axis].min(other.end[axis]);
            if start[axis] >= end[axis] {
                return None;
            }
        }
        Some(PixelRegion { start, end })
    }
}
