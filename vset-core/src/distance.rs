//! Distance kernels (§4.A).
//!
//! All three kernels return a value in `[0, 2]`: 0 identical direction,
//! 1 orthogonal, 2 antipodal. Inputs are assumed already normalized (in
//! their respective quantized space), so `1 - dot` is a monotonic distance
//! transform of cosine similarity.

use crate::quantize::VectorData;

/// Computes the distance between two same-mode vectors.
///
/// # Panics
///
/// Panics if `a` and `b` are encoded in different quantization modes —
/// callers within this crate never mix modes inside one index, and mixing
/// them is a programming error rather than a reachable runtime condition.
pub fn distance(a: &VectorData, b: &VectorData) -> f32 {
    match (a, b) {
        (VectorData::Fp32(x), VectorData::Fp32(y)) => fp32_distance(x, y),
        (VectorData::Q8 { data: x, range: rx }, VectorData::Q8 { data: y, range: ry }) => {
            q8_distance(x, *rx, y, *ry)
        }
        (VectorData::Binary { words: x, dim }, VectorData::Binary { words: y, .. }) => {
            binary_distance(x, y, *dim)
        }
        _ => panic!("distance() called across mismatched quantization modes"),
    }
}

/// Scalar two-accumulator dot product, widened pairwise to curb rounding
/// error versus a single running sum. A SIMD backend may replace this body
/// as long as results agree with the scalar path up to rounding.
#[inline]
fn dot_fp32(x: &[f32], y: &[f32]) -> f32 {
    let mut acc0 = 0.0f32;
    let mut acc1 = 0.0f32;
    let x_chunks = x.chunks_exact(2);
    let y_chunks = y.chunks_exact(2);
    let rem_x = x_chunks.remainder();
    let rem_y = y_chunks.remainder();
    for (cx, cy) in x_chunks.zip(y_chunks) {
        acc0 += cx[0] * cy[0];
        acc1 += cx[1] * cy[1];
    }
    let mut tail = 0.0f32;
    for i in 0..rem_x.len() {
        tail += rem_x[i] * rem_y[i];
    }
    acc0 + acc1 + tail
}

fn fp32_distance(x: &[f32], y: &[f32]) -> f32 {
    (1.0 - dot_fp32(x, y)).clamp(0.0, 2.0)
}

fn q8_distance(x: &[i8], range_x: f32, y: &[i8], range_y: f32) -> f32 {
    if range_x == 0.0 || range_y == 0.0 {
        return 1.0;
    }
    let dot: i32 = x
        .iter()
        .zip(y.iter())
        .map(|(&a, &b)| i32::from(a) * i32::from(b))
        .sum();
    let scale = (range_x / 127.0) * (range_y / 127.0);
    let similarity = dot as f32 * scale;
    (1.0 - similarity).clamp(0.0, 2.0)
}

fn binary_distance(x: &[u64], y: &[u64], dim: usize) -> f32 {
    let hamming: u32 = x
        .iter()
        .zip(y.iter())
        .map(|(&a, &b)| (a ^ b).count_ones())
        .sum();
    (2.0 * hamming as f32 / dim as f32).clamp(0.0, 2.0)
}
