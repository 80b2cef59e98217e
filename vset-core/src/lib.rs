//! In-memory HNSW vector set: graph index, quantization, filtered search,
//! and serialization (§6 external interfaces).
//!
//! [`VectorSet`] is the crate's public facade. It owns the graph behind a
//! single `parking_lot::RwLock` (one writer, many readers, §4.H) plus the
//! per-reader epoch slots in [`concurrency::ReaderSlots`]. Every mutating
//! path (insert, delete) takes the write lock; every read path (search,
//! cursor) acquires a reader slot and then the shared read lock, in that
//! order, released in reverse.

pub mod concurrency;
pub mod cursor;
pub mod delete;
pub mod distance;
pub mod error;
pub mod graph;
pub mod insert;
pub mod layer;
pub mod node;
pub mod params;
pub mod projection;
pub mod quantize;
pub mod queue;
pub mod search;
pub mod serialize;

pub use cursor::Cursor;
pub use error::{Result, VectorError};
pub use node::NodeId;
pub use params::IndexParams;
pub use quantize::QuantMode;
pub use serialize::{IndexRecord, NodeRecord};

use concurrency::ReaderSlots;
use graph::GraphInner;
use parking_lot::RwLock;
use projection::ProjectionMatrix;
use quantize::{quantize_binary, quantize_q8, VectorData};
use std::collections::HashSet;
use std::sync::Arc;

struct Shared<V> {
    graph: Arc<RwLock<GraphInner<V>>>,
    slots: ReaderSlots,
    params: IndexParams,
}

/// A handle to an in-memory vector set. Cloning shares the same underlying
/// index (all clones observe the same writes); the last clone dropped runs
/// the index's teardown.
pub struct VectorSet<V> {
    inner: Arc<Shared<V>>,
}

impl<V> Clone for VectorSet<V> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<V> VectorSet<V> {
    /// Creates an empty index (§6 `Create index`).
    pub fn create(mut params: IndexParams) -> Result<Self> {
        params.validate()?;
        let projection = params.reduced_dim.map(|rd| ProjectionMatrix::new(params.dim, rd));
        Ok(Self::from_parts(GraphInner::new(projection), params))
    }

    fn from_parts(graph: GraphInner<V>, params: IndexParams) -> Self {
        let slots = ReaderSlots::new(params.s_max);
        Self {
            inner: Arc::new(Shared {
                graph: Arc::new(RwLock::new(graph)),
                slots,
                params,
            }),
        }
    }

    pub fn len(&self) -> usize {
        self.inner.graph.read().node_count
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn params(&self) -> &IndexParams {
        &self.inner.params
    }

    fn validate_dim(&self, len: usize) -> Result<()> {
        if len != self.inner.params.dim {
            return Err(VectorError::DimensionMismatch {
                expected: self.inner.params.dim,
                actual: len,
            });
        }
        Ok(())
    }

    fn encode_query(&self, graph: &GraphInner<V>, raw: Vec<f32>, is_normalized: bool) -> VectorData {
        let projected = match &graph.projection {
            Some(p) => p.project(&raw),
            None => raw,
        };
        if is_normalized {
            match self.inner.params.quant {
                QuantMode::None => VectorData::Fp32(projected),
                QuantMode::Q8 => {
                    let (data, range) = quantize_q8(&projected);
                    VectorData::Q8 { data, range }
                }
                QuantMode::Binary => {
                    let dim = projected.len();
                    VectorData::Binary {
                        words: quantize_binary(&projected),
                        dim,
                    }
                }
            }
        } else {
            quantize::encode(self.inner.params.quant, projected).0
        }
    }

    /// Blocking insert (§6 `Insert`): always takes the write lock for the
    /// whole operation.
    pub fn insert(&self, vector: Vec<f32>, value: V) -> Result<NodeId> {
        self.validate_dim(vector.len())?;
        let slot = self.inner.slots.acquire();
        let mut rng = rand::rng();
        let mut graph = self.inner.graph.write();
        let id = insert::insert(
            &mut graph,
            &self.inner.params,
            vector,
            value,
            self.inner.params.ef_construction,
            slot.slot,
            &self.inner.slots,
            &mut rng,
        );
        tracing::debug!(node = id.raw(), "inserted node");
        Ok(id)
    }

    /// Read-only half of the optimistic insert (§6 `Prepare`): builds the
    /// node and its per-layer candidate sets under a shared read lock.
    pub fn prepare_insert(&self, vector: Vec<f32>, value: V) -> Result<insert::PreparedInsert<V>> {
        self.validate_dim(vector.len())?;
        let slot = self.inner.slots.acquire();
        let mut rng = rand::rng();
        let graph = self.inner.graph.read();
        Ok(insert::prepare(
            &graph,
            &self.inner.params,
            vector,
            value,
            self.inner.params.ef_construction,
            slot.slot,
            &self.inner.slots,
            &mut rng,
        ))
    }

    /// Write-locked half of the optimistic insert (§6 `TryCommit`). Returns
    /// [`VectorError::Contention`] if the graph changed since `prepared` was
    /// built; the caller should retry with [`VectorSet::insert`].
    pub fn try_commit(&self, prepared: insert::PreparedInsert<V>) -> Result<NodeId> {
        let mut graph = self.inner.graph.write();
        let id = insert::try_commit(&mut graph, &self.inner.params, prepared)?;
        tracing::debug!(node = id.raw(), "committed optimistic insert");
        Ok(id)
    }

    /// Unfiltered K-NN search (§6 `Search`).
    pub fn search(&self, query: Vec<f32>, k: usize, is_normalized: bool) -> Result<Vec<(NodeId, f32)>> {
        self.validate_dim(query.len())?;
        let slot = self.inner.slots.acquire();
        let graph = self.inner.graph.read();
        let q = self.encode_query(&graph, query, is_normalized);
        Ok(search::search_knn(
            &graph,
            graph.entry_point,
            graph.max_level,
            &q,
            k,
            self.inner.params.ef_search,
            slot.slot,
            slot.epoch,
        ))
    }

    /// Predicate-filtered K-NN search (§6 `SearchFiltered`). `max_candidates`
    /// is the evaluation budget `B`.
    pub fn search_filtered(
        &self,
        query: Vec<f32>,
        k: usize,
        is_normalized: bool,
        predicate: &dyn Fn(&V) -> bool,
        max_candidates: usize,
    ) -> Result<Vec<(NodeId, f32)>> {
        self.validate_dim(query.len())?;
        let slot = self.inner.slots.acquire();
        let graph = self.inner.graph.read();
        let q = self.encode_query(&graph, query, is_normalized);
        Ok(search::search_filtered(
            &graph,
            graph.entry_point,
            graph.max_level,
            &q,
            k,
            self.inner.params.ef_search,
            slot.slot,
            slot.epoch,
            predicate,
            max_candidates,
        ))
    }

    /// Linear-scan recall oracle (§6 `GroundTruth`). Per DESIGN NOTES
    /// §9(c), `ef` is not meaningful here.
    pub fn ground_truth(
        &self,
        query: Vec<f32>,
        k: usize,
        is_normalized: bool,
        predicate: Option<&dyn Fn(&V) -> bool>,
    ) -> Result<Vec<(NodeId, f32)>> {
        self.validate_dim(query.len())?;
        let graph = self.inner.graph.read();
        let q = self.encode_query(&graph, query, is_normalized);
        Ok(search::ground_truth(&graph, &q, k, predicate))
    }

    /// Deletes a node, returning its owned value (§6 `Delete`). Acquires a
    /// reader slot for the re-entry reconnection fallback's searches (§4.G
    /// step 2), each of which needs its own freshly bumped epoch.
    pub fn delete(&self, id: NodeId) -> Option<V> {
        let slot = self.inner.slots.acquire();
        let mut rng = rand::rng();
        let mut graph = self.inner.graph.write();
        let value = delete::delete(&mut graph, &self.inner.params, id, slot.slot, &self.inner.slots, &mut rng);
        if value.is_some() {
            tracing::debug!(node = id.raw(), "deleted node");
        }
        value
    }

    /// Drops this handle (§6 `Free`). Provided for interface parity with
    /// the spec's explicit destructor call; ordinary `drop` does the same.
    pub fn free(self) {
        drop(self);
    }

    /// Acquires a reader slot (§6 `AcquireReadSlot`). Dropping the guard
    /// releases it (`ReleaseReadSlot`).
    pub fn acquire_read_slot(&self) -> concurrency::SlotGuard<'_> {
        self.inner.slots.acquire()
    }

    /// Opens a cursor over every node present right now (§6 `Cursor.Init`).
    pub fn cursor(&self) -> Cursor<V> {
        Cursor::init(Arc::clone(&self.inner.graph))
    }

    /// Approximate reconstruction of a node's original vector (§6
    /// `GetNodeVector`).
    pub fn get_vector(&self, id: NodeId) -> Result<Vec<f32>> {
        let graph = self.inner.graph.read();
        let node = graph.get(id).ok_or(VectorError::NotFound(id))?;
        Ok(quantize::reconstruct(&node.vector, node.magnitude))
    }

    /// Layered random descent for sampling (§6 `RandomNode`, component K).
    pub fn random_node(&self) -> Option<NodeId> {
        let graph = self.inner.graph.read();
        let mut rng = rand::rng();
        search::random_node(&graph, graph.entry_point, graph.max_level, &mut rng)
    }

    /// Exports one node's on-disk record (§6 `SerializeNode`).
    pub fn serialize_node(&self, id: NodeId) -> Result<NodeRecord>
    where
        V: serde::Serialize,
    {
        let graph = self.inner.graph.read();
        let node = graph.get(id).ok_or(VectorError::NotFound(id))?;
        serialize::serialize_node(node)
    }

    /// Installs a pre-quantized, pre-linked node record (§6
    /// `InsertSerialized`).
    pub fn insert_serialized(&self, record: &NodeRecord) -> Result<NodeId>
    where
        V: for<'de> serde::Deserialize<'de>,
    {
        let mut graph = self.inner.graph.write();
        serialize::insert_serialized(&mut graph, &self.inner.params, record)
    }

    /// Serializes the whole index to bytes.
    pub fn serialize(&self) -> Result<Vec<u8>>
    where
        V: serde::Serialize,
    {
        let graph = self.inner.graph.read();
        serialize::serialize_index(&graph, &self.inner.params)
    }

    /// Loads a whole index, running the §4.K fix-up/reciprocity pass (§6
    /// `Deserialize`).
    pub fn deserialize(bytes: &[u8], mut params: IndexParams, salt0: u64, salt1: u64) -> Result<Self>
    where
        V: for<'de> serde::Deserialize<'de>,
    {
        params.validate()?;
        match serialize::deserialize_index(bytes, &params, salt0, salt1) {
            Ok(graph) => Ok(Self::from_parts(graph, params)),
            Err(e) => {
                tracing::warn!(error = %e, "rejected corrupt serialized index");
                Err(e)
            }
        }
    }

    /// Graph consistency check for tests (§6 `ValidateGraph`): the number
    /// of nodes reachable from the entry point via layer-0 links, and
    /// whether every link is reciprocated.
    pub fn validate_graph(&self) -> (usize, bool) {
        let graph = self.inner.graph.read();
        (reachable_count(&graph), check_reciprocity(&graph))
    }
}

fn reachable_count<V>(graph: &GraphInner<V>) -> usize {
    let Some(entry) = graph.entry_point else {
        return 0;
    };
    let mut seen = HashSet::new();
    let mut stack = vec![entry];
    seen.insert(entry);
    while let Some(cur) = stack.pop() {
        if let Some(node) = graph.get(cur) {
            for &nb in &node.layer(0).neighbors {
                if seen.insert(nb) {
                    stack.push(nb);
                }
            }
        }
    }
    seen.len()
}

fn check_reciprocity<V>(graph: &GraphInner<V>) -> bool {
    for node in graph.arena.iter().filter_map(|n| n.as_ref()) {
        for layer in 0..=node.level {
            for &nb in &node.layer(layer).neighbors {
                let reciprocated = graph
                    .get(nb)
                    .is_some_and(|nb_node| layer <= nb_node.level && nb_node.layer(layer).contains(node.id));
                if !reciprocated {
                    return false;
                }
            }
        }
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_then_insert_sets_entry_point() {
        let vs: VectorSet<&'static str> = VectorSet::create(IndexParams::balanced(3, QuantMode::None)).unwrap();
        let id = vs.insert(vec![1.0, 0.0, 0.0], "a").unwrap();
        assert_eq!(vs.len(), 1);
        let (reachable, reciprocal) = vs.validate_graph();
        assert_eq!(reachable, 1);
        assert!(reciprocal);
        assert_eq!(vs.get_vector(id).unwrap().len(), 3);
    }

    #[test]
    fn search_on_empty_index_is_empty_not_an_error() {
        let vs: VectorSet<&'static str> = VectorSet::create(IndexParams::balanced(4, QuantMode::None)).unwrap();
        let results = vs.search(vec![1.0, 0.0, 0.0, 0.0], 5, false).unwrap();
        assert!(results.is_empty());
    }

    #[test]
    fn dimension_mismatch_is_rejected() {
        let vs: VectorSet<&'static str> = VectorSet::create(IndexParams::balanced(3, QuantMode::None)).unwrap();
        let err = vs.insert(vec![1.0, 0.0], "a").unwrap_err();
        assert!(matches!(err, VectorError::DimensionMismatch { expected: 3, actual: 2 }));
    }

    #[test]
    fn scenario_three_fixed_vectors_return_all_three() {
        let vs: VectorSet<&'static str> = VectorSet::create(IndexParams::balanced(3, QuantMode::None)).unwrap();
        vs.insert(vec![1.0, 0.0, 1.0], "a").unwrap();
        vs.insert(vec![-1.0, -1.0, -1.0], "b").unwrap();
        vs.insert(vec![0.0, 1.0, 0.0], "c").unwrap();
        let results = vs.search(vec![0.0, 0.0, 0.0], 10, false).unwrap();
        assert_eq!(results.len(), 3);
    }

    #[test]
    fn scenario_filtered_search_by_year() {
        let vs: VectorSet<i32> = VectorSet::create(IndexParams::balanced(2, QuantMode::None)).unwrap();
        vs.insert(vec![1.0, 0.0], 1950).unwrap();
        vs.insert(vec![1.0, 0.1], 1951).unwrap();
        vs.insert(vec![1.0, 0.2], 1952).unwrap();
        let predicate: &dyn Fn(&i32) -> bool = &|year: &i32| *year > 1950;
        let results = vs
            .search_filtered(vec![1.0, 0.0], 10, false, predicate, 1000)
            .unwrap();
        assert_eq!(results.len(), 2);
    }

    #[test]
    fn delete_then_free_node_count() {
        let vs: VectorSet<i32> = VectorSet::create(IndexParams::balanced(2, QuantMode::None)).unwrap();
        let a = vs.insert(vec![1.0, 0.0], 1).unwrap();
        vs.insert(vec![0.0, 1.0], 2).unwrap();
        assert_eq!(vs.delete(a), Some(1));
        assert_eq!(vs.len(), 1);
    }
}
