//! Turning a [`LoadSpec`] into concrete level, region and chunk choices.

use serde::Serialize;

use super::grid::covering_chunks;
use super::{LoadError, LoadSpec};
use crate::multiscale::{
    compute_packed_atlas_dims, pick_level_to_load, validate_levels, AtlasTileDims, LevelShape,
    PixelRegion,
};

/// Everything decided before any chunk is fetched.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct LoadPlan {
    /// Chosen resolution level.
    pub level: usize,
    /// Spatial (z, y, x) size of that level.
    pub level_shape: [usize; 3],
    /// Pixel bounds of the requested subregion at that level.
    pub region: PixelRegion,
    /// Slice tiling of the region.
    pub atlas: AtlasTileDims,
    /// Atlas size in pixels (width, height).
    pub atlas_size: (usize, usize),
    /// Channels to load.
    pub channels: Vec<usize>,
    /// Chunk coordinates covering the region.
    pub chunks: Vec<[usize; 3]>,
    /// Storage chunk shape (z, y, x) at that level.
    pub chunk_shape: [usize; 3],
}

/// Validates `spec` against `levels` and plans the load.
pub fn plan_load(spec: &LoadSpec, levels: &[LevelShape]) -> Result<LoadPlan, LoadError> {
    validate_levels(levels)?;
    spec.subregion.validate()?;

    let first = &levels[0];
    if spec.time >= first.time_count() {
        return Err(LoadError::InvalidSpec(format!(
            "time {} out of range ({} time points)",
            spec.time,
            first.time_count()
        )));
    }
    let channels = spec.resolved_channels(first.channel_count());
    if let Some(&bad) = channels.iter().find(|&&c| c >= first.channel_count()) {
        return Err(LoadError::InvalidSpec(format!(
            "channel {bad} out of range ({} channels)",
            first.channel_count()
        )));
    }
    if spec.max_atlas_edge == 0 {
        return Err(LoadError::InvalidSpec(
            "max_atlas_edge must be at least 1".to_string(),
        ));
    }

    let levels_zyx: Vec<[usize; 3]> = levels.iter().map(LevelShape::zyx).collect();
    let level = pick_level_to_load(spec, &levels_zyx);
    let level_shape = levels_zyx[level];
    let chunk_shape = levels[level].chunk_zyx();

    let region = spec.subregion.to_pixels(level_shape);
    let [z, y, x] = region.shape();
    let atlas = compute_packed_atlas_dims(z, x, y);

    Ok(LoadPlan {
        level,
        level_shape,
        region,
        atlas,
        atlas_size: atlas.atlas_size(x, y),
        channels,
        chunks: covering_chunks(&region, chunk_shape),
        chunk_shape,
    })
}
