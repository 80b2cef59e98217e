//! Iteration cursor surviving concurrent deletions (§4.J).

use crate::graph::GraphInner;
use crate::node::NodeId;
use parking_lot::lock_api::ArcRwLockReadGuard;
use parking_lot::{Mutex, RawRwLock, RwLock};
use std::sync::Arc;

/// Shared mutable state a cursor exposes to the delete path: just the
/// node it currently points at. Wrapped in `Arc<Mutex<_>>` and registered
/// on `GraphInner::cursors` so deletes can notify it without knowing its
/// concrete type.
pub struct CursorShared {
    pub current: Option<NodeId>,
}

/// A lazy linked-list cursor over every node present at creation time.
/// Guarantee (§4.J): every node present at creation and not deleted before
/// being reached is visited exactly once; nodes inserted afterward may or
/// may not be visited.
pub struct Cursor<V> {
    graph: Arc<RwLock<GraphInner<V>>>,
    shared: Arc<Mutex<CursorShared>>,
    guard: Option<ArcRwLockReadGuard<RawRwLock, GraphInner<V>>>,
}

impl<V> Cursor<V> {
    /// Registers the cursor under the write lock and seeds `current` at
    /// the list head.
    pub(crate) fn init(graph: Arc<RwLock<GraphInner<V>>>) -> Self {
        let shared = Arc::new(Mutex::new(CursorShared { current: None }));
        {
            let mut g = graph.write();
            shared.lock().current = g.head;
            g.cursors.push(Arc::clone(&shared));
        }
        Self {
            graph,
            shared,
            guard: None,
        }
    }

    /// Returns the current node and advances to its successor. Returns
    /// `None` once the list is exhausted. Callers must hold a read lock
    /// (via [`Cursor::acquire_lock`]) while dereferencing the returned id
    /// through the owning [`crate::VectorSet`].
    pub fn next(&mut self) -> Option<NodeId> {
        let had_lock = self.guard.is_some();
        if !had_lock {
            self.acquire_lock();
        }
        let current = self.shared.lock().current;
        let advance_to = current.and_then(|id| {
            self.graph
                .read_recursive()
                .get(id)
                .and_then(|n| n.next)
        });
        if let Some(id) = current {
            self.shared.lock().current = advance_to;
            if !had_lock {
                self.release_lock();
            }
            Some(id)
        } else {
            if !had_lock {
                self.release_lock();
            }
            None
        }
    }

    /// Acquires a shared read lock on the graph, held until
    /// [`Cursor::release_lock`] — allows a caller to dereference several
    /// node ids returned by repeated `next()` calls under one lock span.
    pub fn acquire_lock(&mut self) {
        if self.guard.is_none() {
            self.guard = Some(self.graph.read_arc());
        }
    }

    pub fn release_lock(&mut self) {
        self.guard = None;
    }

    /// Deregisters the cursor. Called automatically on drop.
    pub fn free(self) {
        drop(self);
    }
}

impl<V> Drop for Cursor<V> {
    fn drop(&mut self) {
        self.guard = None;
        let mut g = self.graph.write();
        g.cursors.retain(|c| !Arc::ptr_eq(c, &self.shared));
    }
}
