//! Pixel-buffer kernels: box reductions, fills, copies, premultiplication
//! and float conversion.
//!
//! Buffers are byte slices of interleaved little-endian samples. Kernels take
//! the sample type and channel count explicitly so they can run over any face
//! layout without generics leaking into the face model.

use crate::format::DataType;
use half::f16;

/// Reduce a `ures` x `vres` block of texels into `dst`.
///
/// Arguments: source, source stride (bytes), source width, source height,
/// destination, destination stride (bytes), sample type, channel count.
/// The destination dimensions are implied by the kind of reduction.
pub type ReduceFn = fn(&[u8], usize, usize, usize, &mut [u8], usize, DataType, usize);

/// The reductions a reader needs to synthesize lower resolutions.
#[derive(Clone, Copy, Debug)]
pub struct Reducer {
    /// Halve both dimensions.
    pub reduce: ReduceFn,
    /// Halve width only.
    pub reduce_u: ReduceFn,
    /// Halve height only.
    pub reduce_v: ReduceFn,
    /// Halve both dimensions of a triangle face.
    pub reduce_tri: ReduceFn,
}

impl Default for Reducer {
    /// Box filters with round-to-nearest for integer samples.
    fn default() -> Self {
        Self { reduce: box_reduce, reduce_u: box_reduce_u, reduce_v: box_reduce_v, reduce_tri: tri_reduce }
    }
}

#[allow(clippy::too_many_arguments)]
pub fn box_reduce(
    src: &[u8],
    sstride: usize,
    ures: usize,
    vres: usize,
    dst: &mut [u8],
    dstride: usize,
    dt: DataType,
    nchan: usize,
) {
    box_filter(src, sstride, ures, vres, dst, dstride, dt, nchan, 2, 2);
}

#[allow(clippy::too_many_arguments)]
pub fn box_reduce_u(
    src: &[u8],
    sstride: usize,
    ures: usize,
    vres: usize,
    dst: &mut [u8],
    dstride: usize,
    dt: DataType,
    nchan: usize,
) {
    box_filter(src, sstride, ures, vres, dst, dstride, dt, nchan, 2, 1);
}

#[allow(clippy::too_many_arguments)]
pub fn box_reduce_v(
    src: &[u8],
    sstride: usize,
    ures: usize,
    vres: usize,
    dst: &mut [u8],
    dstride: usize,
    dt: DataType,
    nchan: usize,
) {
    box_filter(src, sstride, ures, vres, dst, dstride, dt, nchan, 1, 2);
}

/// Halve a square triangle face. The face stores two triangles: texels
/// below the diagonal belong to the face and the rest mirror them. Each
/// output texel averages three texels of its own 2x2 quad with the texel
/// mirrored across the diagonal, so the result keeps the same layout.
#[allow(clippy::too_many_arguments)]
pub fn tri_reduce(
    src: &[u8],
    sstride: usize,
    ures: usize,
    _vres: usize,
    dst: &mut [u8],
    dstride: usize,
    dt: DataType,
    nchan: usize,
) {
    let ss = dt.size();
    let ps = ss * nchan;
    let w = ures;
    for y in 0..w / 2 {
        for x in 0..w / 2 {
            for c in 0..nchan {
                let at = |u: usize, v: usize| v * sstride + u * ps + c * ss;
                let taps = [
                    at(2 * x, 2 * y),
                    at(2 * x + 1, 2 * y),
                    at(2 * x, 2 * y + 1),
                    at(w - 1 - 2 * y, w - 1 - 2 * x),
                ];
                let out = y * dstride + x * ps + c * ss;
                average(src, taps, 4, dt, &mut dst[out..out + ss]);
            }
        }
    }
}

#[allow(clippy::too_many_arguments)]
fn box_filter(
    src: &[u8],
    sstride: usize,
    ures: usize,
    vres: usize,
    dst: &mut [u8],
    dstride: usize,
    dt: DataType,
    nchan: usize,
    fu: usize,
    fv: usize,
) {
    let ss = dt.size();
    let ps = ss * nchan;
    for y in 0..vres / fv {
        for x in 0..ures / fu {
            for c in 0..nchan {
                let out = y * dstride + x * ps + c * ss;
                let at = |i: usize, j: usize| (y * fv + j) * sstride + (x * fu + i) * ps + c * ss;
                let taps = (0..fv).flat_map(|j| (0..fu).map(move |i| at(i, j)));
                average(src, taps, fu * fv, dt, &mut dst[out..out + ss]);
            }
        }
    }
}

/// Mean of the samples starting at each tap offset; integers round to nearest.
fn average(src: &[u8], taps: impl IntoIterator<Item = usize>, count: usize, dt: DataType, out: &mut [u8]) {
    let ss = dt.size();
    match dt {
        DataType::U8 | DataType::U16 => {
            let sum: u64 = taps.into_iter().map(|at| load_int(dt, &src[at..at + ss])).sum();
            let count = count as u64;
            store_int(dt, (sum + count / 2) / count, out);
        },
        DataType::Half | DataType::Float => {
            let sum: f32 = taps.into_iter().map(|at| load_float(dt, &src[at..at + ss])).sum();
            store_float(dt, sum / count as f32, out);
        },
    }
}

fn load_int(dt: DataType, bytes: &[u8]) -> u64 {
    match dt {
        DataType::U8 => bytes[0] as u64,
        _ => u16::from_le_bytes([bytes[0], bytes[1]]) as u64,
    }
}

fn store_int(dt: DataType, value: u64, out: &mut [u8]) {
    match dt {
        DataType::U8 => out[0] = value.min(u8::MAX as u64) as u8,
        _ => out.copy_from_slice(&(value.min(u16::MAX as u64) as u16).to_le_bytes()),
    }
}

fn load_float(dt: DataType, bytes: &[u8]) -> f32 {
    match dt {
        DataType::Half => f16::from_le_bytes([bytes[0], bytes[1]]).to_f32(),
        DataType::Float => f32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]),
        _ => load_int(dt, bytes) as f32,
    }
}

fn store_float(dt: DataType, value: f32, out: &mut [u8]) {
    match dt {
        DataType::Half => out.copy_from_slice(&f16::from_f32(value).to_le_bytes()),
        DataType::Float => out.copy_from_slice(&value.to_le_bytes()),
        DataType::U8 => out[0] = value as u8,
        DataType::U16 => out.copy_from_slice(&(value as u16).to_le_bytes()),
    }
}

/// Fill a `ures` x `vres` region with one pixel.
pub fn fill(pixel: &[u8], dst: &mut [u8], dstride: usize, ures: usize, vres: usize) {
    let ps = pixel.len();
    for row in dst.chunks_mut(dstride.max(1)).take(vres) {
        for texel in row[..ures * ps].chunks_exact_mut(ps) {
            texel.copy_from_slice(pixel);
        }
    }
}

/// Copy `vres` rows of `rowlen` bytes between strided buffers.
pub fn copy(src: &[u8], sstride: usize, dst: &mut [u8], dstride: usize, vres: usize, rowlen: usize) {
    if sstride == rowlen && dstride == rowlen {
        let len = rowlen * vres;
        dst[..len].copy_from_slice(&src[..len]);
        return;
    }
    for row in 0..vres {
        let (s, d) = (row * sstride, row * dstride);
        dst[d..d + rowlen].copy_from_slice(&src[s..s + rowlen]);
    }
}

/// Multiply colour channels by alpha in place.
///
/// With alpha in channel 0 every later channel is scaled; otherwise the
/// channels before alpha are. Integer results truncate.
pub fn premultiply(data: &mut [u8], dt: DataType, nchan: usize, alpha: usize) {
    let ss = dt.size();
    let scale = 1.0 / dt.one_value();
    let channels = if alpha == 0 { 1..nchan } else { 0..alpha };
    for texel in data.chunks_exact_mut(ss * nchan) {
        let a = load_float(dt, &texel[alpha * ss..alpha * ss + ss]) * scale;
        for c in channels.clone() {
            let sample = &mut texel[c * ss..c * ss + ss];
            let value = load_float(dt, sample) * a;
            store_float(dt, value, sample);
        }
    }
}

/// Convert `out.len()` samples starting at `first` to floats in `[0, 1]`
/// (integer types) or their stored value (float types).
pub fn to_float(texel: &[u8], dt: DataType, first: usize, out: &mut [f32]) {
    let ss = dt.size();
    let nchan = texel.len() / ss;
    let scale = 1.0 / dt.one_value();
    for (i, value) in out.iter_mut().enumerate() {
        let c = first + i;
        *value = if c < nchan {
            let sample = &texel[c * ss..c * ss + ss];
            match dt {
                DataType::U8 | DataType::U16 => load_int(dt, sample) as f32 * scale,
                DataType::Half | DataType::Float => load_float(dt, sample),
            }
        } else {
            0.0
        };
    }
}
