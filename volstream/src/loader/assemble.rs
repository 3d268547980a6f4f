//! Reassembly of fetched chunks into one region buffer, and 8-bit normalization.

use bytemuck::pod_collect_to_vec;

use super::SampleType;
use crate::multiscale::PixelRegion;

/// Copies the part of a chunk that overlaps `region` into `dst`.
///
/// `dst` holds `region` in C order; `chunk` holds a full chunk of shape
/// `chunk_zyx` whose first voxel sits at `origin`. Voxels of the chunk
/// outside `region` (grid overhang or edge padding) are skipped.
pub fn copy_chunk_into(
    dst: &mut [u8],
    region: &PixelRegion,
    chunk: &[u8],
    origin: [usize; 3],
    chunk_zyx: [usize; 3],
    bytes_per_sample: usize,
) {
    let chunk_box = PixelRegion::new(
        origin,
        [
            origin[0] + chunk_zyx[0],
            origin[1] + chunk_zyx[1],
            origin[2] + chunk_zyx[2],
        ],
    );
    let Some(overlap) = region.intersect(&chunk_box) else {
        return;
    };

    let [_, region_y, region_x] = region.shape();
    let row_bytes = (overlap.end[2] - overlap.start[2]) * bytes_per_sample;

    for z in overlap.start[0]..overlap.end[0] {
        for y in overlap.start[1]..overlap.end[1] {
            let src = (((z - origin[0]) * chunk_zyx[1] + (y - origin[1])) * chunk_zyx[2]
                + (overlap.start[2] - origin[2]))
                * bytes_per_sample;
            let dst_at = (((z - region.start[0]) * region_y + (y - region.start[1])) * region_x
                + (overlap.start[2] - region.start[2]))
                * bytes_per_sample;
            dst[dst_at..dst_at + row_bytes].copy_from_slice(&chunk[src..src + row_bytes]);
        }
    }
}

/// Widens raw native-endian samples to `f64`.
pub fn samples_as_f64(data: &[u8], sample_type: SampleType) -> Vec<f64> {
    fn widen<T: bytemuck::AnyBitPattern + bytemuck::NoUninit + Into<f64>>(data: &[u8]) -> Vec<f64> {
        pod_collect_to_vec::<u8, T>(data)
            .into_iter()
            .map(Into::into)
            .collect()
    }

    match sample_type {
        SampleType::U8 => data.iter().map(|&v| f64::from(v)).collect(),
        SampleType::I8 => data.iter().map(|&v| f64::from(v as i8)).collect(),
        SampleType::U16 => widen::<u16>(data),
        SampleType::I16 => widen::<i16>(data),
        SampleType::U32 => widen::<u32>(data),
        SampleType::I32 => widen::<i32>(data),
        SampleType::F32 => widen::<f32>(data),
        SampleType::F64 => pod_collect_to_vec::<u8, f64>(data),
    }
}

/// Min and max of the finite values, or `None` if there are none.
pub fn value_range(values: &[f64]) -> Option<(f64, f64)> {
    values
        .iter()
        .filter(|v| v.is_finite())
        .fold(None, |acc, &v| match acc {
            None => Some((v, v)),
            Some((lo, hi)) => Some((lo.min(v), hi.max(v))),
        })
}

/// Linearly stretches `values` from `range` onto 0..=255.
///
/// Values outside the range saturate; non-finite values map to 0. A
/// degenerate range maps everything to 0.
pub fn stretch_to_u8(values: &[f64], range: (f64, f64)) -> Vec<u8> {
    let (lo, hi) = range;
    let span = hi - lo;
    values
        .iter()
        .map(|&v| {
            if !v.is_finite() || span <= 0.0 {
                return 0;
            }
            (((v - lo) / span) * 255.0).round().clamp(0.0, 255.0) as u8
        })
        .collect()
}
