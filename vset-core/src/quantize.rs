//! Quantizer / normalizer (§4.B) and the stored-vector representation.

use serde::{Deserialize, Serialize};

/// Storage format selected for an index at creation time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum QuantMode {
    /// Full fp32 precision, normalized.
    None,
    /// Signed 8-bit per-component quantization with a per-vector range.
    Q8,
    /// 1 bit per component (sign), Hamming-distance search.
    Binary,
}

/// The vector payload a node owns, in whichever format `QuantMode` selected.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum VectorData {
    Fp32(Vec<f32>),
    Q8 { data: Vec<i8>, range: f32 },
    Binary { words: Vec<u64>, dim: usize },
}

impl VectorData {
    pub fn mode(&self) -> QuantMode {
        match self {
            VectorData::Fp32(_) => QuantMode::None,
            VectorData::Q8 { .. } => QuantMode::Q8,
            VectorData::Binary { .. } => QuantMode::Binary,
        }
    }
}

/// Number of 64-bit words needed to pack `dim` sign bits.
pub fn binary_words(dim: usize) -> usize {
    dim.div_ceil(64)
}

/// L2-normalizes `v` in place, returning the pre-normalization magnitude.
/// A zero vector is left untouched and reports magnitude 0.
pub fn l2_normalize(v: &mut [f32]) -> f32 {
    let mag = (v.iter().map(|x| x * x).sum::<f32>()).sqrt();
    if mag > 0.0 {
        for x in v.iter_mut() {
            *x /= mag;
        }
    }
    mag
}

/// Quantizes an already-normalized vector to signed 8-bit components plus
/// a per-vector range (`max |component|`). An all-zero vector yields zeros
/// and range 0.
pub fn quantize_q8(v: &[f32]) -> (Vec<i8>, f32) {
    let max_abs = v.iter().fold(0.0f32, |acc, x| acc.max(x.abs()));
    if max_abs == 0.0 {
        return (vec![0i8; v.len()], 0.0);
    }
    let scale = 127.0 / max_abs;
    let data = v
        .iter()
        .map(|x| (x * scale).round().clamp(-127.0, 127.0) as i8)
        .collect();
    (data, max_abs)
}

/// Quantizes a vector to 1 bit per component: 1 for strictly positive
/// components, 0 otherwise. Unused tail bits in the last word are zero.
pub fn quantize_binary(v: &[f32]) -> Vec<u64> {
    let mut words = vec![0u64; binary_words(v.len())];
    for (i, &x) in v.iter().enumerate() {
        if x > 0.0 {
            words[i / 64] |= 1u64 << (i % 64);
        }
    }
    words
}

/// Normalizes and encodes a raw fp32 vector per `mode`, returning the
/// encoded payload and the pre-normalization magnitude (needed for
/// approximate reconstruction via [`crate::VectorSet::get_vector`]).
pub fn encode(mode: QuantMode, mut v: Vec<f32>) -> (VectorData, f32) {
    match mode {
        QuantMode::None => {
            let mag = l2_normalize(&mut v);
            (VectorData::Fp32(v), mag)
        }
        QuantMode::Q8 => {
            let mag = l2_normalize(&mut v);
            let (data, range) = quantize_q8(&v);
            (VectorData::Q8 { data, range }, mag)
        }
        QuantMode::Binary => {
            let mag = l2_normalize(&mut v);
            let dim = v.len();
            let words = quantize_binary(&v);
            (VectorData::Binary { words, dim }, mag)
        }
    }
}

/// Approximately reconstructs the original (pre-normalization) vector from
/// its stored encoding and magnitude.
pub fn reconstruct(data: &VectorData, magnitude: f32) -> Vec<f32> {
    match data {
        VectorData::Fp32(v) => v.iter().map(|x| x * magnitude).collect(),
        VectorData::Q8 { data, range } => {
            if *range == 0.0 {
                return vec![0.0; data.len()];
            }
            let scale = range / 127.0;
            data.iter().map(|&b| b as f32 * scale * magnitude).collect()
        }
        VectorData::Binary { words, dim } => (0..*dim)
            .map(|i| {
                let bit = (words[i / 64] >> (i % 64)) & 1;
                if bit == 1 { magnitude } else { -magnitude }
            })
            .collect(),
    }
}
