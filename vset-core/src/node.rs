//! Node representation (§3 "Node").
//!
//! Nodes live in an arena (`graph::Arena`) addressed by this stable,
//! monotonically increasing `NodeId` rather than by raw pointer — the
//! "arena of nodes with stable integer indices" alternative DESIGN NOTES
//! §9 recommends over the source's hand-rolled pointer discipline.

use crate::layer::Layer;
use crate::quantize::VectorData;
use serde::{Deserialize, Serialize};
use std::sync::atomic::AtomicU64;

/// Stable, monotonically assigned node identifier. Doubles as the on-disk
/// link representation in §4.K (`link_id`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct NodeId(pub u64);

impl NodeId {
    pub fn new(id: impl Into<u64>) -> Self {
        Self(id.into())
    }

    pub fn index(self) -> usize {
        self.0 as usize
    }

    pub fn raw(self) -> u64 {
        self.0
    }
}

/// A node in the graph: its vector payload, per-layer neighbor lists, the
/// doubly-linked-list pointers threading every live node, and the
/// caller-owned associated value.
pub struct Node<V> {
    pub id: NodeId,
    /// Maximum layer this node occupies (L, in `[0, MAX_LEVEL]`).
    pub level: usize,
    pub vector: VectorData,
    /// Pre-normalization L2 magnitude, kept for approximate
    /// reconstruction (§4.B).
    pub magnitude: f32,
    /// Per-reader-slot "last visited epoch" (invariant 6, §3). `AtomicU64`
    /// because distinct reader slots write distinct indices concurrently
    /// while only holding a *shared* read lock on the graph.
    pub visited_epoch: Vec<AtomicU64>,
    pub value: V,
    pub prev: Option<NodeId>,
    pub next: Option<NodeId>,
    /// One record per layer, `0..=level`.
    pub layers: Vec<Layer>,
}

impl<V> Node<V> {
    pub fn new(
        id: NodeId,
        level: usize,
        vector: VectorData,
        magnitude: f32,
        value: V,
        s_max: usize,
        layer0_capacity: usize,
        upper_capacity: usize,
    ) -> Self {
        let layers = (0..=level)
            .map(|l| {
                if l == 0 {
                    Layer::new(layer0_capacity)
                } else {
                    Layer::new(upper_capacity)
                }
            })
            .collect();
        Self {
            id,
            level,
            vector,
            magnitude,
            visited_epoch: (0..s_max).map(|_| AtomicU64::new(0)).collect(),
            value,
            prev: None,
            next: None,
            layers,
        }
    }

    /// Marks this node visited in reader slot `s` for the scan tagged
    /// `epoch`.
    pub fn mark_visited(&self, slot: usize, epoch: u64) {
        self.visited_epoch[slot].store(epoch, std::sync::atomic::Ordering::Relaxed);
    }

    /// Whether this node was already visited in reader slot `s` during the
    /// scan tagged `epoch` (invariant 6, §3).
    pub fn is_visited(&self, slot: usize, epoch: u64) -> bool {
        self.visited_epoch[slot].load(std::sync::atomic::Ordering::Relaxed) == epoch
    }

    pub fn layer(&self, l: usize) -> &Layer {
        &self.layers[l]
    }

    pub fn layer_mut(&mut self, l: usize) -> &mut Layer {
        &mut self.layers[l]
    }
}
