//! Per-reader epoch slots (§4.H).
//!
//! `GraphInner`'s global lock lives in `lib.rs` (it wraps `GraphInner`
//! directly so cursors can hold an owned `ArcRwLockReadGuard`); this module
//! owns the other half of the concurrency model: the `S_MAX` per-slot
//! mutexes and epoch counters that make "visited in this scan" O(1)
//! without per-scan allocation.

use parking_lot::{Mutex, MutexGuard};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

pub struct ReaderSlots {
    slot_mutexes: Vec<Mutex<()>>,
    current_epoch: Vec<AtomicU64>,
    next_slot: AtomicUsize,
}

/// A held reader slot: the slot index (for `Node::is_visited`/`mark_visited`)
/// and the epoch value tagging the current scan. Dropping it releases the
/// slot mutex — the `ReleaseReadSlot` half of §6's `AcquireReadSlot` /
/// `ReleaseReadSlot` pair.
pub struct SlotGuard<'a> {
    pub slot: usize,
    pub epoch: u64,
    _guard: MutexGuard<'a, ()>,
}

impl ReaderSlots {
    pub fn new(s_max: usize) -> Self {
        let s_max = s_max.max(1);
        Self {
            slot_mutexes: (0..s_max).map(|_| Mutex::new(())).collect(),
            current_epoch: (0..s_max).map(|_| AtomicU64::new(0)).collect(),
            next_slot: AtomicUsize::new(0),
        }
    }

    pub fn s_max(&self) -> usize {
        self.slot_mutexes.len()
    }

    /// Acquires a reader slot (§4.H): tries every slot non-blocking first;
    /// on failure, falls back to a round-robin pick and blocks. Bumps that
    /// slot's epoch counter, which constitutes a global reset of its
    /// "visited" marks.
    pub fn acquire(&self) -> SlotGuard<'_> {
        for (i, m) in self.slot_mutexes.iter().enumerate() {
            if let Some(guard) = m.try_lock() {
                return self.make_guard(i, guard);
            }
        }
        let i = self.next_slot.fetch_add(1, Ordering::Relaxed) % self.slot_mutexes.len();
        let guard = self.slot_mutexes[i].lock();
        self.make_guard(i, guard)
    }

    fn make_guard<'a>(&'a self, slot: usize, guard: MutexGuard<'a, ()>) -> SlotGuard<'a> {
        let epoch = self.bump_epoch(slot);
        SlotGuard {
            slot,
            epoch,
            _guard: guard,
        }
    }

    /// Bumps `slot`'s epoch counter without (re)acquiring its mutex, for a
    /// caller that already holds the slot (via [`ReaderSlots::acquire`]) and
    /// needs a fresh "scan reset" partway through its held span — e.g. one
    /// independent visited-set per HNSW layer during a single insert.
    pub fn bump_epoch(&self, slot: usize) -> u64 {
        self.current_epoch[slot].fetch_add(1, Ordering::AcqRel) + 1
    }
}
