//! Index-wide configuration.

use crate::quantize::QuantMode;
use serde::{Deserialize, Serialize};

/// Minimum and maximum allowed values for `max_links` (M), per spec.
pub const MIN_LINKS: usize = 4;
pub const MAX_LINKS: usize = 4096;

/// Cap on the number of layers a node may occupy (L <= MAX_LEVEL).
pub const MAX_LEVEL: usize = 16;

/// Number of concurrent reader epoch slots.
pub const DEFAULT_S_MAX: usize = 32;

/// Construction and search parameters for a [`crate::VectorSet`].
///
/// Mirrors the teacher's `HnswConfig`, generalized to cover quantization
/// mode and the reader-slot count the spec's concurrency layer needs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexParams {
    /// Vector dimensionality (D).
    pub dim: usize,
    /// Quantization mode applied to stored vectors.
    pub quant: QuantMode,
    /// Maximum bidirectional links per node per layer above 0 (M).
    /// Clamped to `[MIN_LINKS, MAX_LINKS]`.
    pub max_links: usize,
    /// Candidate list size used while inserting (`ef_construction`).
    pub ef_construction: usize,
    /// Default candidate list size used while searching (`ef_search`).
    pub ef_search: usize,
    /// Number of concurrent reader epoch slots (S_MAX).
    pub s_max: usize,
    /// Optional output dimension for random projection (§4.I). `None`
    /// disables projection.
    pub reduced_dim: Option<usize>,
}

impl IndexParams {
    /// Creates parameters with the default (`balanced`) preset.
    pub fn new(dim: usize, quant: QuantMode) -> Self {
        Self::balanced(dim, quant)
    }

    /// Fewer links, smaller ef: faster insert/search, lower recall.
    pub fn fast(dim: usize, quant: QuantMode) -> Self {
        Self {
            dim,
            quant,
            max_links: 8,
            ef_construction: 100,
            ef_search: 50,
            s_max: DEFAULT_S_MAX,
            reduced_dim: None,
        }
    }

    /// Default preset (M=16, ef_construction=200, ef_search=100).
    pub fn balanced(dim: usize, quant: QuantMode) -> Self {
        Self {
            dim,
            quant,
            max_links: 16,
            ef_construction: 200,
            ef_search: 100,
            s_max: DEFAULT_S_MAX,
            reduced_dim: None,
        }
    }

    /// More links, larger ef: slower insert/search, higher recall.
    pub fn high_quality(dim: usize, quant: QuantMode) -> Self {
        Self {
            dim,
            quant,
            max_links: 32,
            ef_construction: 400,
            ef_search: 200,
            s_max: DEFAULT_S_MAX,
            reduced_dim: None,
        }
    }

    /// Enables random projection to `reduced_dim` (§4.I).
    pub fn with_projection(mut self, reduced_dim: usize) -> Self {
        self.reduced_dim = Some(reduced_dim);
        self
    }

    /// Capacity of a layer-0 neighbor array at allocation time (2M).
    pub fn layer0_capacity(&self) -> usize {
        self.max_links * 2
    }

    /// Capacity of an above-0 layer neighbor array at allocation time (M).
    pub fn upper_capacity(&self) -> usize {
        self.max_links
    }

    /// Upper bound a layer-0 neighbor array may grow to under forced
    /// reconnection (3M, §4.F pass 3 / §9(b)).
    pub fn layer0_growth_cap(&self) -> usize {
        self.max_links * 3
    }

    /// Upper bound an above-0 neighbor array may grow to under forced
    /// reconnection (2M, §4.F pass 3 / §9(b)).
    pub fn upper_growth_cap(&self) -> usize {
        self.max_links * 2
    }

    /// Validates and clamps `max_links`, checking the rest of the
    /// parameters are usable. Called by every constructor path.
    pub fn validate(&mut self) -> crate::error::Result<()> {
        if self.dim == 0 {
            return Err(crate::error::VectorError::InvalidParams(
                "dimension must be > 0".into(),
            ));
        }
        self.max_links = self.max_links.clamp(MIN_LINKS, MAX_LINKS);
        if self.ef_search < 1 {
            self.ef_search = 1;
        }
        if let Some(rd) = self.reduced_dim
            && rd == 0
        {
            return Err(crate::error::VectorError::InvalidParams(
                "reduced_dim must be > 0".into(),
            ));
        }
        Ok(())
    }
}
