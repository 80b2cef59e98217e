//! Node & layer store (§4.D) plus the index-level data model (§3).
//!
//! `GraphInner` owns the node arena, the doubly-linked list threading every
//! live node (`head` is the most recently inserted node), the entry point,
//! and the live-cursor list. It has no locking of its own — `VectorSet`
//! (`lib.rs`) wraps it in the single `parking_lot::RwLock` the concurrency
//! model (§4.H) describes.

use crate::cursor::CursorShared;
use crate::node::{Node, NodeId};
use crate::projection::ProjectionMatrix;
use parking_lot::Mutex;
use std::sync::Arc;

pub struct GraphInner<V> {
    pub arena: Vec<Option<Node<V>>>,
    pub head: Option<NodeId>,
    pub entry_point: Option<NodeId>,
    pub max_level: usize,
    pub node_count: usize,
    pub last_id: u64,
    /// Bumped on delete and on entry-point change (§4.H version fence).
    pub version: u64,
    pub projection: Option<ProjectionMatrix>,
    pub cursors: Vec<Arc<Mutex<CursorShared>>>,
}

impl<V> GraphInner<V> {
    pub fn new(projection: Option<ProjectionMatrix>) -> Self {
        Self {
            arena: Vec::new(),
            head: None,
            entry_point: None,
            max_level: 0,
            node_count: 0,
            last_id: 0,
            version: 0,
            projection,
            cursors: Vec::new(),
        }
    }

    pub fn get(&self, id: NodeId) -> Option<&Node<V>> {
        self.arena.get(id.index()).and_then(|n| n.as_ref())
    }

    pub fn get_mut(&mut self, id: NodeId) -> Option<&mut Node<V>> {
        self.arena.get_mut(id.index()).and_then(|n| n.as_mut())
    }

    /// Allocates the next monotonic node ID and reserves its arena slot.
    /// The caller installs the populated node with [`GraphInner::install`].
    pub fn next_id(&mut self) -> NodeId {
        let id = NodeId(self.last_id);
        self.last_id += 1;
        id
    }

    /// Installs a fully constructed node, splicing it at the head of the
    /// doubly linked list and bumping `node_count` (§4.F step 7).
    pub fn install(&mut self, mut node: Node<V>) {
        let id = node.id;
        while self.arena.len() <= id.index() {
            self.arena.push(None);
        }
        node.next = self.head;
        node.prev = None;
        if let Some(old_head) = self.head
            && let Some(old) = self.get_mut(old_head)
        {
            old.prev = Some(id);
        }
        self.head = Some(id);
        self.arena[id.index()] = Some(node);
        self.node_count += 1;
    }

    /// Splices `id` out of the doubly linked list and frees its arena
    /// slot, returning the removed node.
    pub fn unlink_and_free(&mut self, id: NodeId) -> Option<Node<V>> {
        let (prev, next) = {
            let node = self.get(id)?;
            (node.prev, node.next)
        };
        match prev {
            Some(p) => {
                if let Some(n) = self.get_mut(p) {
                    n.next = next;
                }
            }
            None => self.head = next,
        }
        if let Some(n) = next
            && let Some(n) = self.get_mut(n)
        {
            n.prev = prev;
        }
        let removed = self.arena[id.index()].take();
        if removed.is_some() {
            self.node_count -= 1;
        }
        removed
    }

    pub fn bump_version(&mut self) {
        self.version = self.version.wrapping_add(1);
    }

    /// Notifies every live cursor whose `current` equals `id`, advancing it
    /// to that node's `next` (§4.J). Must run before the node is unlinked.
    pub fn notify_cursors_of_delete(&mut self, id: NodeId) {
        let next = self.get(id).and_then(|n| n.next);
        for cursor in &self.cursors {
            let mut c = cursor.lock();
            if c.current == Some(id) {
                c.current = next;
            }
        }
    }

    /// Linear scan for the highest-level surviving node (entry-point
    /// fallback, §4.G step 1).
    pub fn highest_level_node(&self) -> Option<NodeId> {
        self.arena
            .iter()
            .filter_map(|n| n.as_ref())
            .max_by_key(|n| n.level)
            .map(|n| n.id)
    }

    /// Doubly-linked list length, for invariant 5 (§8).
    pub fn list_len(&self) -> usize {
        let mut count = 0;
        let mut cur = self.head;
        while let Some(id) = cur {
            count += 1;
            cur = self.get(id).and_then(|n| n.next);
        }
        count
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::quantize::VectorData;

    fn mk_node(inner: &mut GraphInner<()>, s_max: usize) -> NodeId {
        let id = inner.next_id();
        let node = Node::new(id, 0, VectorData::Fp32(vec![0.0]), 0.0, (), s_max, 4, 4);
        inner.install(node);
        id
    }

    #[test]
    fn install_splices_at_head() {
        let mut g: GraphInner<()> = GraphInner::new(None);
        let a = mk_node(&mut g, 1);
        let b = mk_node(&mut g, 1);
        assert_eq!(g.head, Some(b));
        assert_eq!(g.get(b).unwrap().next, Some(a));
        assert_eq!(g.get(a).unwrap().prev, Some(b));
        assert_eq!(g.list_len(), 2);
    }

    #[test]
    fn unlink_and_free_fixes_neighbors() {
        let mut g: GraphInner<()> = GraphInner::new(None);
        let a = mk_node(&mut g, 1);
        let b = mk_node(&mut g, 1);
        let c = mk_node(&mut g, 1); // head: c -> b -> a
        g.unlink_and_free(b);
        assert_eq!(g.get(c).unwrap().next, Some(a));
        assert_eq!(g.get(a).unwrap().prev, Some(c));
        assert_eq!(g.list_len(), 2);
        assert!(g.get(b).is_none());
    }

    #[test]
    fn list_len_matches_node_count_after_many_ops() {
        let mut g: GraphInner<()> = GraphInner::new(None);
        let ids: Vec<_> = (0..5).map(|_| mk_node(&mut g, 1)).collect();
        g.unlink_and_free(ids[2]);
        g.unlink_and_free(ids[0]);
        assert_eq!(g.list_len(), g.node_count);
        assert_eq!(g.node_count, 3);
    }
}
