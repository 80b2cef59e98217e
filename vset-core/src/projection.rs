//! Optional random projection (§4.I).
//!
//! A deterministic Hadamard-like projection matrix reduces an input vector
//! of `input_dim` to `output_dim` before it ever reaches insert/search.
//! The fill pattern is part of the on-disk contract (DESIGN NOTES §9(a)):
//! reloading a serialized index must reproduce bit-identical projected
//! vectors, so the pattern itself is never allowed to change.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectionMatrix {
    pub input_dim: usize,
    pub output_dim: usize,
    /// Row-major `output_dim x input_dim` matrix.
    pub data: Vec<f32>,
}

impl ProjectionMatrix {
    /// Builds the matrix: entry `(i, j)` is `+1/sqrt(input_dim)` if
    /// `popcount(i & j)` is even, `-1/sqrt(input_dim)` if odd.
    pub fn new(input_dim: usize, output_dim: usize) -> Self {
        let scale = 1.0 / (input_dim as f32).sqrt();
        let mut data = Vec::with_capacity(output_dim * input_dim);
        for i in 0..output_dim {
            for j in 0..input_dim {
                let sign = if (i as u64 & j as u64).count_ones() % 2 == 0 {
                    1.0
                } else {
                    -1.0
                };
                data.push(sign * scale);
            }
        }
        Self {
            input_dim,
            output_dim,
            data,
        }
    }

    /// Projects `v` (length `input_dim`) into a vector of length
    /// `output_dim`.
    pub fn project(&self, v: &[f32]) -> Vec<f32> {
        debug_assert_eq!(v.len(), self.input_dim);
        let mut out = vec![0.0f32; self.output_dim];
        for (i, slot) in out.iter_mut().enumerate() {
            let row = &self.data[i * self.input_dim..(i + 1) * self.input_dim];
            *slot = row.iter().zip(v.iter()).map(|(a, b)| a * b).sum();
        }
        out
    }
}
