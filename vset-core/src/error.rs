//! Error taxonomy for the vector set engine.

use crate::node::NodeId;
use crate::quantize::QuantMode;

/// Errors surfaced by [`crate::VectorSet`] operations.
#[derive(Debug, thiserror::Error)]
pub enum VectorError {
    #[error("invalid vector dimension: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("invalid index parameters: {0}")]
    InvalidParams(String),

    #[error("quantization mode mismatch: expected {expected:?}, got {actual:?}")]
    QuantizationMismatch {
        expected: QuantMode,
        actual: QuantMode,
    },

    #[error("node not found: {0:?}")]
    NotFound(NodeId),

    #[error("corrupt serialized graph: {0}")]
    Corrupt(String),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("optimistic insert lost to a concurrent writer, retry with the blocking path")]
    Contention,
}

pub type Result<T> = std::result::Result<T, VectorError>;
