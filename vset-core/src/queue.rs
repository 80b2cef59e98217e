//! Bounded priority queue (§4.C).
//!
//! A fixed-capacity sorted array, nearest-first. Used both as the
//! "results" queue (during search/insert, capacity `ef`) and as the
//! "candidates" frontier (capacity bounded, e.g. 256). `push` is O(n) but
//! outperforms a heap at these small capacities — see DESIGN NOTES §9.

use crate::node::NodeId;

#[derive(Debug, Clone)]
pub struct BoundedQueue {
    items: Vec<(f32, NodeId)>,
    capacity: usize,
}

impl BoundedQueue {
    pub fn new(capacity: usize) -> Self {
        Self {
            items: Vec::with_capacity(capacity.min(4096)),
            capacity: capacity.max(1),
        }
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.items.len() >= self.capacity
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Distance of the farthest item currently held, or `+inf` if empty.
    pub fn max_distance(&self) -> f32 {
        self.items.last().map(|&(d, _)| d).unwrap_or(f32::INFINITY)
    }

    pub fn contains(&self, id: NodeId) -> bool {
        self.items.iter().any(|&(_, n)| n == id)
    }

    /// Inserts `(id, dist)` if there is free capacity, or if it is closer
    /// than the current farthest item (which is then evicted). Returns
    /// `true` if the item was admitted.
    pub fn push(&mut self, id: NodeId, dist: f32) -> bool {
        if self.items.len() < self.capacity {
            let pos = self
                .items
                .partition_point(|&(d, _)| d <= dist);
            self.items.insert(pos, (dist, id));
            true
        } else if dist < self.max_distance() {
            self.items.pop();
            let pos = self
                .items
                .partition_point(|&(d, _)| d <= dist);
            self.items.insert(pos, (dist, id));
            true
        } else {
            false
        }
    }

    /// Removes and returns the nearest item (for draining the candidate
    /// frontier in nearest-first order).
    pub fn pop_nearest(&mut self) -> Option<(NodeId, f32)> {
        if self.items.is_empty() {
            None
        } else {
            let (d, id) = self.items.remove(0);
            Some((id, d))
        }
    }

    /// Iterates items in nearest-first order without consuming the queue.
    pub fn iter(&self) -> impl Iterator<Item = (NodeId, f32)> + '_ {
        self.items.iter().map(|&(d, id)| (id, d))
    }

    pub fn into_sorted_vec(self) -> Vec<(NodeId, f32)> {
        self.items.into_iter().map(|(d, id)| (id, d)).collect()
    }
}
