//! Chunk grid arithmetic.

use crate::multiscale::PixelRegion;

/// Number of chunks along each axis of a level.
pub fn chunk_grid_shape(shape_zyx: [usize; 3], chunk_zyx: [usize; 3]) -> [usize; 3] {
    let mut grid = [0; 3];
    for axis in 0..3 {
        grid[axis] = shape_zyx[axis].div_ceil(chunk_zyx[axis].max(1));
    }
    grid
}

/// Minimal set of chunk coordinates covering `region`, in z, y, x order.
pub fn covering_chunks(region: &PixelRegion, chunk_zyx: [usize; 3]) -> Vec<[usize; 3]> {
    if region.is_empty() {
        return Vec::new();
    }

    let mut first = [0; 3];
    let mut last = [0; 3];
    for axis in 0..3 {
        let size = chunk_zyx[axis].max(1);
        first[axis] = region.start[axis] / size;
        last[axis] = region.end[axis].div_ceil(size);
    }

    let mut chunks = Vec::with_capacity((0..3).map(|a| last[a] - first[a]).product());
    for z in first[0]..last[0] {
        for y in first[1]..last[1] {
            for x in first[2]..last[2] {
                chunks.push([z, y, x]);
            }
        }
    }
    chunks
}

/// Pixel bounds of a chunk, clipped to the level shape.
pub fn chunk_region(chunk: [usize; 3], chunk_zyx: [usize; 3], shape_zyx: [usize; 3]) -> PixelRegion {
    let mut start = [0; 3];
    let mut end = [0; 3];
    for axis in 0..3 {
        start[axis] = chunk[axis] * chunk_zyx[axis];
        end[axis] = (start[axis] + chunk_zyx[axis]).min(shape_zyx[axis]);
    }
    PixelRegion::new(start, end)
}
