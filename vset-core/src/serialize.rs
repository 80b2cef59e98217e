//! Serialization (§4.K): per-node records with ID-based links, whole-index
//! save/load, and the reciprocity-audit fix-up pass.
//!
//! `NodeId` already plays the role of the spec's arena "pointer", so the
//! fix-up pass here validates and resolves links by indexing the arena
//! directly rather than building a separate id→pointer hash table; the
//! duplicate-link check, dangling-reference check, and xor-accumulator
//! reciprocity audit it describes are all still enforced.

use crate::distance::distance;
use crate::error::{Result, VectorError};
use crate::graph::GraphInner;
use crate::node::{Node, NodeId};
use crate::params::IndexParams;
use crate::projection::ProjectionMatrix;
use crate::quantize::{binary_words, QuantMode, VectorData};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
struct LinkRecord {
    link_ids: Vec<u64>,
    capacity: usize,
}

/// A single node's on-disk record (§6 `SerializeNode` / `InsertSerialized`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeRecord {
    pub id: u64,
    pub level: usize,
    vector_bytes: Vec<u8>,
    vector_dim: usize,
    range_bits: u32,
    magnitude_bits: u32,
    layers: Vec<LinkRecord>,
    value_bytes: Vec<u8>,
}

/// Whole-index on-disk record (§4.K index-level record).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexRecord {
    pub dim: usize,
    pub quant: QuantMode,
    pub max_links: usize,
    pub node_count: usize,
    pub entry_point: Option<u64>,
    pub max_level: usize,
    pub version: u64,
    pub projection: Option<ProjectionMatrix>,
    pub nodes: Vec<NodeRecord>,
}

fn encode_vector_bytes(v: &VectorData) -> (Vec<u8>, usize, f32) {
    match v {
        VectorData::Fp32(data) => {
            let mut bytes = Vec::with_capacity(data.len() * 4);
            for &x in data {
                bytes.extend_from_slice(&x.to_bits().to_le_bytes());
            }
            (bytes, data.len(), 0.0)
        }
        VectorData::Q8 { data, range } => (data.iter().map(|&b| b as u8).collect(), data.len(), *range),
        VectorData::Binary { words, dim } => {
            let mut bytes = Vec::with_capacity(words.len() * 8);
            for &w in words {
                bytes.extend_from_slice(&w.to_le_bytes());
            }
            (bytes, *dim, 0.0)
        }
    }
}

fn decode_vector_bytes(mode: QuantMode, bytes: &[u8], dim: usize, range: f32) -> Result<VectorData> {
    match mode {
        QuantMode::None => {
            if bytes.len() != dim * 4 {
                return Err(VectorError::Corrupt("fp32 vector byte length mismatch".into()));
            }
            let data = bytes
                .chunks_exact(4)
                .map(|c| f32::from_bits(u32::from_le_bytes(c.try_into().unwrap())))
                .collect();
            Ok(VectorData::Fp32(data))
        }
        QuantMode::Q8 => {
            if bytes.len() != dim {
                return Err(VectorError::Corrupt("q8 vector byte length mismatch".into()));
            }
            Ok(VectorData::Q8 {
                data: bytes.iter().map(|&b| b as i8).collect(),
                range,
            })
        }
        QuantMode::Binary => {
            let expected = binary_words(dim) * 8;
            if bytes.len() != expected {
                return Err(VectorError::Corrupt("binary vector byte length mismatch".into()));
            }
            let words = bytes
                .chunks_exact(8)
                .map(|c| u64::from_le_bytes(c.try_into().unwrap()))
                .collect();
            Ok(VectorData::Binary { words, dim })
        }
    }
}

/// Exports one node's on-disk record (§6 `SerializeNode`).
pub fn serialize_node<V: Serialize>(node: &Node<V>) -> Result<NodeRecord> {
    let (vector_bytes, vector_dim, range) = encode_vector_bytes(&node.vector);
    let value_bytes =
        bincode::serialize(&node.value).map_err(|e| VectorError::Serialization(e.to_string()))?;
    let layers = node
        .layers
        .iter()
        .map(|l| LinkRecord {
            link_ids: l.neighbors.iter().map(|n| n.raw()).collect(),
            capacity: l.capacity,
        })
        .collect();
    Ok(NodeRecord {
        id: node.id.raw(),
        level: node.level,
        vector_bytes,
        vector_dim,
        range_bits: range.to_bits(),
        magnitude_bits: node.magnitude.to_bits(),
        layers,
        value_bytes,
    })
}

fn node_from_record<V: for<'de> Deserialize<'de>>(
    record: &NodeRecord,
    quant: QuantMode,
    s_max: usize,
) -> Result<Node<V>> {
    let vector = decode_vector_bytes(quant, &record.vector_bytes, record.vector_dim, f32::from_bits(record.range_bits))?;
    let value: V =
        bincode::deserialize(&record.value_bytes).map_err(|e| VectorError::Serialization(e.to_string()))?;
    if record.layers.len() != record.level + 1 {
        return Err(VectorError::Corrupt(format!(
            "node {} has {} layer records for level {}",
            record.id,
            record.layers.len(),
            record.level
        )));
    }
    let mut node = Node::new(
        NodeId(record.id),
        record.level,
        vector,
        f32::from_bits(record.magnitude_bits),
        value,
        s_max,
        record.layers.first().map(|l| l.capacity).unwrap_or(0),
        record.layers.get(1).map(|l| l.capacity).unwrap_or(0),
    );
    for (layer, link_record) in record.layers.iter().enumerate() {
        let l = node.layer_mut(layer);
        l.capacity = link_record.capacity;
        l.neighbors = link_record.link_ids.iter().map(|&id| NodeId(id)).collect();
    }
    Ok(node)
}

/// Installs a node from a pre-quantized, pre-linked on-disk record without
/// running neighbor selection (§6 `InsertSerialized`, §4.F step 2 note on
/// accepting a pre-quantized vector for reloads).
pub fn insert_serialized<V: for<'de> Deserialize<'de>>(
    graph: &mut GraphInner<V>,
    params: &IndexParams,
    record: &NodeRecord,
) -> Result<NodeId> {
    let node = node_from_record(record, params.quant, params.s_max)?;
    let id = node.id;
    let level = node.level;
    if graph.last_id <= id.raw() {
        graph.last_id = id.raw() + 1;
    }
    if graph.entry_point.is_none() || level > graph.max_level {
        graph.entry_point = Some(id);
        graph.max_level = level;
        graph.bump_version();
    }
    graph.install(node);
    Ok(id)
}

/// Serializes the whole index (§4.K index-level record).
pub fn serialize_index<V: Serialize>(graph: &GraphInner<V>, params: &IndexParams) -> Result<Vec<u8>> {
    let mut nodes = Vec::with_capacity(graph.node_count);
    for node in graph.arena.iter().filter_map(|n| n.as_ref()) {
        nodes.push(serialize_node(node)?);
    }
    let record = IndexRecord {
        dim: params.dim,
        quant: params.quant,
        max_links: params.max_links,
        node_count: graph.node_count,
        entry_point: graph.entry_point.map(|n| n.raw()),
        max_level: graph.max_level,
        version: graph.version,
        projection: graph.projection.clone(),
        nodes,
    };
    bincode::serialize(&record).map_err(|e| VectorError::Serialization(e.to_string()))
}

/// Loads a whole index, running the fix-up pass described in §4.K: duplicate
/// and dangling link detection, an xor-accumulator reciprocity audit salted
/// with `salt0`/`salt1`, and worst-neighbor cache recomputation. On any
/// corruption, the partially built graph is dropped and an error returned.
pub fn deserialize_index<V: for<'de> Deserialize<'de>>(
    bytes: &[u8],
    params: &IndexParams,
    salt0: u64,
    salt1: u64,
) -> Result<GraphInner<V>> {
    let record: IndexRecord =
        bincode::deserialize(bytes).map_err(|e| VectorError::Serialization(e.to_string()))?;
    if record.dim != params.dim {
        return Err(VectorError::DimensionMismatch {
            expected: params.dim,
            actual: record.dim,
        });
    }
    if record.quant != params.quant {
        return Err(VectorError::QuantizationMismatch {
            expected: params.quant,
            actual: record.quant,
        });
    }

    let mut graph: GraphInner<V> = GraphInner::new(record.projection.clone());
    for node_record in &record.nodes {
        let node = node_from_record(node_record, record.quant, params.s_max)?;
        graph.install(node);
    }
    graph.last_id = record.nodes.iter().map(|r| r.id).max().map(|m| m + 1).unwrap_or(0);
    graph.entry_point = record.entry_point.map(NodeId);
    graph.max_level = record.max_level;
    graph.version = record.version;

    let ids: Vec<NodeId> = graph.arena.iter().filter_map(|n| n.as_ref()).map(|n| n.id).collect();
    verify_links(&graph, &ids, salt0, salt1)?;
    recompute_worst_caches(&mut graph, &ids);

    tracing::info!(nodes = graph.node_count, "loaded vector set index");
    Ok(graph)
}

fn mix(salt0: u64, salt1: u64, a: u64, b: u64, layer: usize) -> u128 {
    let mut h = (salt0 as u128) ^ ((salt1 as u128) << 64);
    h = h.wrapping_mul(0x9E3779B97F4A7C15FF51AFD7ED558CCDu128 | 1);
    h ^= a as u128;
    h = h.wrapping_mul(0xC4CEB9FE1A85EC53FF51AFD7ED558CCDu128 | 1);
    h ^= (b as u128) << 1;
    h = h.wrapping_mul(0x9E3779B97F4A7C15C4CEB9FE1A85EC53u128 | 1);
    h ^= layer as u128;
    h ^ (h >> 33)
}

fn verify_links<V>(graph: &GraphInner<V>, ids: &[NodeId], salt0: u64, salt1: u64) -> Result<()> {
    let mut acc: u128 = 0;
    for &id in ids {
        let node = graph.get(id).expect("id collected from this graph");
        for layer in 0..=node.level {
            let neighbors = &node.layer(layer).neighbors;
            let mut sorted = neighbors.clone();
            sorted.sort_by_key(|n| n.raw());
            if sorted.windows(2).any(|w| w[0] == w[1]) {
                return Err(VectorError::Corrupt(format!(
                    "duplicate link in node {} layer {layer}",
                    id.raw()
                )));
            }
            for &nb in neighbors {
                let Some(nb_node) = graph.get(nb) else {
                    return Err(VectorError::Corrupt(format!(
                        "node {} links to nonexistent node {}",
                        id.raw(),
                        nb.raw()
                    )));
                };
                if nb_node.level < layer {
                    return Err(VectorError::Corrupt(format!(
                        "node {} layer {layer} links to node {} with level {}",
                        id.raw(),
                        nb.raw(),
                        nb_node.level
                    )));
                }
                acc ^= mix(salt0, salt1, id.raw().min(nb.raw()), id.raw().max(nb.raw()), layer);
            }
        }
    }
    if acc != 0 {
        return Err(VectorError::Corrupt("reciprocity audit failed".into()));
    }
    Ok(())
}

fn recompute_worst_caches<V>(graph: &mut GraphInner<V>, ids: &[NodeId]) {
    for &id in ids {
        let Some(vector) = graph.get(id).map(|n| n.vector.clone()) else {
            continue;
        };
        let level = graph.get(id).map(|n| n.level).unwrap_or(0);
        for layer in 0..=level {
            let neighbor_ids = graph
                .get(id)
                .map(|n| n.layer(layer).neighbors.clone())
                .unwrap_or_default();
            let dists: Vec<f32> = neighbor_ids
                .iter()
                .map(|&nb| graph.get(nb).map(|n| distance(&vector, &n.vector)).unwrap_or(0.0))
                .collect();
            if let Some(node) = graph.get_mut(id) {
                node.layer_mut(layer).rescan_worst(&dists);
            }
        }
    }
}
