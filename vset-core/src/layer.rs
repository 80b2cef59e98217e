//! Per-node layer records (§3 "Layer record", §4.D worst-neighbor cache).

use crate::node::NodeId;

/// One node's neighbor list at a single graph layer, plus a cached
/// "farthest neighbor" so "admit if closer than worst" is O(1).
///
/// Invariant 4 (spec §3): for `n > 0`, `worst_distance` equals the maximum
/// distance among current neighbors and `worst_index` points at one such
/// neighbor; for `n == 0` both are zero.
#[derive(Debug, Clone)]
pub struct Layer {
    pub neighbors: Vec<NodeId>,
    pub capacity: usize,
    pub worst_distance: f32,
    pub worst_index: usize,
}

impl Layer {
    pub fn new(capacity: usize) -> Self {
        Self {
            neighbors: Vec::with_capacity(capacity),
            capacity,
            worst_distance: 0.0,
            worst_index: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.neighbors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.neighbors.is_empty()
    }

    pub fn has_free_capacity(&self) -> bool {
        self.neighbors.len() < self.capacity
    }

    pub fn contains(&self, id: NodeId) -> bool {
        self.neighbors.contains(&id)
    }

    pub fn position(&self, id: NodeId) -> Option<usize> {
        self.neighbors.iter().position(|&n| n == id)
    }

    /// The currently cached worst neighbor, if any.
    pub fn worst_neighbor(&self) -> Option<NodeId> {
        self.neighbors.get(self.worst_index).copied()
    }

    /// Appends `id` and updates the worst-neighbor cache given its
    /// distance to the owning node ("on-add" mode, §4.D).
    pub fn push_with_distance(&mut self, id: NodeId, dist: f32) {
        self.neighbors.push(id);
        let idx = self.neighbors.len() - 1;
        if idx == 0 || dist > self.worst_distance {
            self.worst_distance = dist;
            self.worst_index = idx;
        }
    }

    /// Removes `id` if present (shift-left, per spec). Returns the index it
    /// occupied. Does **not** fix up the worst-neighbor cache — callers
    /// must call [`Layer::rescan_worst`] when the removed index was the
    /// cached worst, or [`Layer::shift_worst_index_down`] otherwise.
    pub fn remove(&mut self, id: NodeId) -> Option<usize> {
        let idx = self.position(id)?;
        self.neighbors.remove(idx);
        Some(idx)
    }

    /// "On-remove" cache fix-up (§4.D): call after `remove` with the index
    /// it returned. If that index was before the cached worst, the worst
    /// index shifts down by one (same neighbor, new position); if it *was*
    /// the worst, a full rescan is required — the caller supplies freshly
    /// computed distances (1:1 with the current, already-shifted neighbor
    /// list) via `distances`.
    pub fn fix_up_after_remove(&mut self, removed_idx: usize, distances: impl Fn() -> Vec<f32>) {
        if self.neighbors.is_empty() {
            self.worst_distance = 0.0;
            self.worst_index = 0;
            return;
        }
        if removed_idx == self.worst_index {
            self.rescan_worst(&distances());
        } else if removed_idx < self.worst_index {
            self.worst_index -= 1;
        }
    }

    /// Full rescan of the worst-neighbor cache given a distance for every
    /// current neighbor, in order.
    pub fn rescan_worst(&mut self, distances: &[f32]) {
        debug_assert_eq!(distances.len(), self.neighbors.len());
        if distances.is_empty() {
            self.worst_distance = 0.0;
            self.worst_index = 0;
            return;
        }
        let (idx, &d) = distances
            .iter()
            .enumerate()
            .max_by(|a, b| a.1.total_cmp(b.1))
            .expect("non-empty checked above");
        self.worst_index = idx;
        self.worst_distance = d;
    }
}
