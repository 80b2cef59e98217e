//! Insert path (§4.F): level sampling, candidate collection, three-pass
//! neighbor selection, and the optimistic Prepare/TryCommit variant.

use crate::concurrency::ReaderSlots;
use crate::distance::distance;
use crate::error::{Result, VectorError};
use crate::graph::GraphInner;
use crate::node::{Node, NodeId};
use crate::params::{IndexParams, MAX_LEVEL};
use crate::quantize::{encode, VectorData};
use crate::search::{greedy_descend, layer_search};
use rand::Rng;

/// Draws a level via a biased coin (p = 0.25 per level), capped at
/// [`MAX_LEVEL`].
pub fn sample_level(rng: &mut impl Rng) -> usize {
    let mut level = 0;
    while level < MAX_LEVEL && rng.random::<f32>() < 0.25 {
        level += 1;
    }
    level
}

/// A node built and searched against a version snapshot, not yet linked
/// into the graph. Produced by [`prepare`], consumed by [`try_commit`].
pub struct PreparedInsert<V> {
    node: Node<V>,
    candidates: Vec<(usize, Vec<(NodeId, f32)>)>,
    snapshot_version: u64,
}

/// Builds the new node (normalize, project, quantize) and gathers one
/// candidate set per layer via greedy descent + best-first search,
/// without mutating the graph (§4.F steps 1-4). Safe to call under a
/// shared read lock, exactly like a search.
///
/// `slot` must already be held by the caller (via [`ReaderSlots::acquire`]);
/// each layer's search draws its own fresh epoch from `slots` (§4.E: one
/// "increment current_epoch[s]" per search) so a layer's result nodes never
/// arrive at the next layer's search pre-marked as visited.
pub fn prepare<V>(
    graph: &GraphInner<V>,
    params: &IndexParams,
    vector: Vec<f32>,
    value: V,
    ef_insert: usize,
    slot: usize,
    slots: &ReaderSlots,
    rng: &mut impl Rng,
) -> PreparedInsert<V> {
    let level = sample_level(rng);
    let projected = match &graph.projection {
        Some(p) => p.project(&vector),
        None => vector,
    };
    let (vdata, magnitude) = encode(params.quant, projected);
    let node = Node::new(
        NodeId(u64::MAX),
        level,
        vdata.clone(),
        magnitude,
        value,
        params.s_max,
        params.layer0_capacity(),
        params.upper_capacity(),
    );
    let candidates = collect_candidates(graph, &vdata, level, ef_insert, slot, slots);
    PreparedInsert {
        node,
        candidates,
        snapshot_version: graph.version,
    }
}

fn collect_candidates<V>(
    graph: &GraphInner<V>,
    query: &VectorData,
    level: usize,
    ef_insert: usize,
    slot: usize,
    slots: &ReaderSlots,
) -> Vec<(usize, Vec<(NodeId, f32)>)> {
    let Some(entry) = graph.entry_point else {
        return Vec::new();
    };
    let mut cur = entry;
    for layer in (level + 1..=graph.max_level).rev() {
        cur = greedy_descend(graph, cur, query, layer).0;
    }
    let mut entry_points = vec![cur];
    let top = level.min(graph.max_level);
    let mut out = Vec::new();
    for layer in (0..=top).rev() {
        let epoch = slots.bump_epoch(slot);
        let sorted = layer_search(graph, layer, &entry_points, query, ef_insert, slot, epoch, None, None)
            .into_sorted_vec();
        entry_points = sorted.iter().map(|&(id, _)| id).collect();
        out.push((layer, sorted));
    }
    out
}

/// Links the prepared node into the graph (§4.F steps 5-7), unconditionally.
/// Requires exclusive (write-lock) access to `graph`.
fn finish_insert<V>(graph: &mut GraphInner<V>, params: &IndexParams, mut prepared: PreparedInsert<V>) -> NodeId {
    let id = graph.next_id();
    prepared.node.id = id;
    for (layer, candidates) in &prepared.candidates {
        select_neighbors(graph, params, &mut prepared.node, id, *layer, candidates);
    }
    let level = prepared.node.level;
    if graph.entry_point.is_none() || level > graph.max_level {
        graph.entry_point = Some(id);
        graph.max_level = level;
        graph.bump_version();
    }
    graph.install(prepared.node);
    id
}

/// Blocking insert: prepare and finish in one step under the write lock.
/// Dimension validation against `params.dim` is the caller's
/// responsibility (the facade checks before ever reaching here).
pub fn insert<V>(
    graph: &mut GraphInner<V>,
    params: &IndexParams,
    vector: Vec<f32>,
    value: V,
    ef_insert: usize,
    slot: usize,
    slots: &ReaderSlots,
    rng: &mut impl Rng,
) -> NodeId {
    let prepared = prepare(graph, params, vector, value, ef_insert, slot, slots, rng);
    finish_insert(graph, params, prepared)
}

/// Commits a prepared insert if `graph.version` has not advanced since
/// [`prepare`] snapshotted it. On a version mismatch the prepared node is
/// dropped and the caller must retry with [`insert`].
pub fn try_commit<V>(graph: &mut GraphInner<V>, params: &IndexParams, prepared: PreparedInsert<V>) -> Result<NodeId> {
    if prepared.snapshot_version != graph.version {
        return Err(VectorError::Contention);
    }
    Ok(finish_insert(graph, params, prepared))
}

fn link_bidirectional<V>(
    graph: &mut GraphInner<V>,
    new_node: &mut Node<V>,
    new_id: NodeId,
    other: NodeId,
    layer: usize,
    dist: f32,
) {
    new_node.layer_mut(layer).push_with_distance(other, dist);
    if let Some(o) = graph.get_mut(other) {
        o.layer_mut(layer).push_with_distance(new_id, dist);
    }
}

/// Removes the bidirectional link `a <-> b` at `layer`, fixing up each
/// side's worst-neighbor cache. Also used by the delete path to sever a
/// demoted link.
pub(crate) fn unlink_bidirectional<V>(graph: &mut GraphInner<V>, a: NodeId, b: NodeId, layer: usize) {
    remove_backlink(graph, a, b, layer);
    remove_backlink(graph, b, a, layer);
}

/// Removes `owner`'s link to `target` at `layer`, fixing up the
/// worst-neighbor cache. Also used by the delete path to remove a single
/// backlink to a node being deleted.
pub(crate) fn remove_backlink<V>(graph: &mut GraphInner<V>, owner: NodeId, target: NodeId, layer: usize) {
    let Some(owner_vector) = graph.get(owner).map(|n| n.vector.clone()) else {
        return;
    };
    let Some(idx) = graph
        .get_mut(owner)
        .and_then(|n| n.layer_mut(layer).remove(target))
    else {
        return;
    };
    let neighbor_ids: Vec<NodeId> = graph
        .get(owner)
        .map(|n| n.layer(layer).neighbors.clone())
        .unwrap_or_default();
    let distances: Vec<f32> = neighbor_ids
        .iter()
        .map(|&nid| {
            graph
                .get(nid)
                .map(|n| distance(&owner_vector, &n.vector))
                .unwrap_or(f32::INFINITY)
        })
        .collect();
    if let Some(n) = graph.get_mut(owner) {
        n.layer_mut(layer).fix_up_after_remove(idx, || distances.clone());
    }
}

/// Runs neighbor selection for one layer (§4.F step 5), escalating through
/// passes 2 and 3 at layer 0 only, and only as far as needed.
fn select_neighbors<V>(
    graph: &mut GraphInner<V>,
    params: &IndexParams,
    new_node: &mut Node<V>,
    new_id: NodeId,
    layer: usize,
    candidates: &[(NodeId, f32)],
) {
    let required = params.max_links;
    let mut accepted = pass1(graph, new_node, new_id, layer, candidates, required);
    if layer == 0 {
        if accepted.len() < required / 2 {
            pass2(graph, new_node, new_id, layer, candidates, required, &mut accepted);
        }
        if accepted.len() < required / 4 {
            pass3(graph, params, new_node, new_id, layer, candidates, required, &mut accepted);
        }
    }
}

/// Aggressiveness 0: full diversity check, demotion requires the evicted
/// neighbor to retain at least `required / 2` links.
fn pass1<V>(
    graph: &mut GraphInner<V>,
    new_node: &mut Node<V>,
    new_id: NodeId,
    layer: usize,
    candidates: &[(NodeId, f32)],
    required: usize,
) -> Vec<NodeId> {
    let mut accepted: Vec<NodeId> = Vec::new();
    for &(c, dist_new_c) in candidates {
        if accepted.len() >= required {
            break;
        }
        if c == new_id {
            continue;
        }
        let diversity_violated = accepted.iter().any(|&a| match (graph.get(a), graph.get(c)) {
            (Some(na), Some(nc)) => distance(&na.vector, &nc.vector) < dist_new_c,
            _ => false,
        });
        if diversity_violated {
            continue;
        }
        if !admit_or_demote(graph, new_node, new_id, layer, c, dist_new_c, required / 2) {
            continue;
        }
        accepted.push(c);
    }
    accepted
}

/// Aggressiveness 1: no diversity check, demotion threshold relaxed to
/// `required / 4`. Invoked at layer 0 only, when pass 1 under-filled.
fn pass2<V>(
    graph: &mut GraphInner<V>,
    new_node: &mut Node<V>,
    new_id: NodeId,
    layer: usize,
    candidates: &[(NodeId, f32)],
    required: usize,
    accepted: &mut Vec<NodeId>,
) {
    for &(c, dist_new_c) in candidates {
        if accepted.len() >= required {
            break;
        }
        if c == new_id || accepted.contains(&c) {
            continue;
        }
        if admit_or_demote(graph, new_node, new_id, layer, c, dist_new_c, required / 4) {
            accepted.push(c);
        }
    }
}

/// Shared admission logic for passes 1 and 2: link directly if `c` has
/// free capacity, otherwise demote its cached worst neighbor if doing so
/// would leave that neighbor with at least `min_after` links.
fn admit_or_demote<V>(
    graph: &mut GraphInner<V>,
    new_node: &mut Node<V>,
    new_id: NodeId,
    layer: usize,
    c: NodeId,
    dist_new_c: f32,
    min_after: usize,
) -> bool {
    let Some(c_node) = graph.get(c) else { return false };
    if layer > c_node.level {
        return false;
    }
    let c_layer = c_node.layer(layer);
    if c_layer.has_free_capacity() {
        link_bidirectional(graph, new_node, new_id, c, layer, dist_new_c);
        return true;
    }
    let Some(w) = c_layer.worst_neighbor() else {
        return false;
    };
    if dist_new_c >= c_layer.worst_distance {
        return false;
    }
    let w_links_after = graph
        .get(w)
        .map(|n| n.layer(layer).len())
        .unwrap_or(0)
        .saturating_sub(1);
    if w_links_after < min_after {
        return false;
    }
    unlink_bidirectional(graph, c, w, layer);
    link_bidirectional(graph, new_node, new_id, c, layer, dist_new_c);
    true
}

/// Aggressiveness 2: prefer evicting the farthest eligible neighbor of `c`
/// rather than always its cached worst; fall back to growing `c`'s layer
/// capacity (bounded) and linking without eviction.
#[allow(clippy::too_many_arguments)]
fn pass3<V>(
    graph: &mut GraphInner<V>,
    params: &IndexParams,
    new_node: &mut Node<V>,
    new_id: NodeId,
    layer: usize,
    candidates: &[(NodeId, f32)],
    required: usize,
    accepted: &mut Vec<NodeId>,
) {
    for &(c, dist_new_c) in candidates {
        if accepted.len() >= required {
            break;
        }
        if c == new_id || accepted.contains(&c) {
            continue;
        }
        let Some(c_node) = graph.get(c) else { continue };
        if layer > c_node.level {
            continue;
        }
        if c_node.layer(layer).has_free_capacity() {
            link_bidirectional(graph, new_node, new_id, c, layer, dist_new_c);
            accepted.push(c);
            continue;
        }
        let c_vector = c_node.vector.clone();
        let neighbor_ids = c_node.layer(layer).neighbors.clone();
        let mut farthest: Option<(NodeId, f32)> = None;
        for &f in &neighbor_ids {
            let f_links_after = graph
                .get(f)
                .map(|n| n.layer(layer).len())
                .unwrap_or(0)
                .saturating_sub(1);
            if f_links_after <= required / 4 {
                continue;
            }
            let Some(d) = graph.get(f).map(|n| distance(&c_vector, &n.vector)) else {
                continue;
            };
            if farthest.is_none_or(|(_, bd)| d > bd) {
                farthest = Some((f, d));
            }
        }
        if let Some((f, _)) = farthest {
            unlink_bidirectional(graph, c, f, layer);
            link_bidirectional(graph, new_node, new_id, c, layer, dist_new_c);
            accepted.push(c);
            continue;
        }
        let cap_limit = if layer == 0 {
            params.layer0_growth_cap()
        } else {
            params.upper_growth_cap()
        };
        let grew_with_room = {
            if let Some(cn) = graph.get_mut(c) {
                let lyr = cn.layer_mut(layer);
                if lyr.capacity < cap_limit {
                    lyr.capacity += 1;
                }
                lyr.has_free_capacity()
            } else {
                false
            }
        };
        if grew_with_room {
            link_bidirectional(graph, new_node, new_id, c, layer, dist_new_c);
            accepted.push(c);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::quantize::QuantMode;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    fn params() -> IndexParams {
        IndexParams::balanced(3, QuantMode::None)
    }

    #[test]
    fn sample_level_never_exceeds_max() {
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..10_000 {
            assert!(sample_level(&mut rng) <= MAX_LEVEL);
        }
    }

    #[test]
    fn first_insert_becomes_entry_point() {
        let mut g: GraphInner<&'static str> = GraphInner::new(None);
        let mut rng = StdRng::seed_from_u64(1);
        let slots = ReaderSlots::new(1);
        let id = insert(&mut g, &params(), vec![1.0, 0.0, 0.0], "a", 50, 0, &slots, &mut rng);
        assert_eq!(g.entry_point, Some(id));
        assert_eq!(g.max_level, g.get(id).unwrap().level);
        assert_eq!(g.node_count, 1);
    }

    #[test]
    fn second_insert_links_bidirectionally_at_layer_zero() {
        let mut g: GraphInner<&'static str> = GraphInner::new(None);
        let mut rng = StdRng::seed_from_u64(2);
        let slots = ReaderSlots::new(1);
        let a = insert(&mut g, &params(), vec![1.0, 0.0, 0.0], "a", 50, 0, &slots, &mut rng);
        let b = insert(&mut g, &params(), vec![0.9, 0.1, 0.0], "b", 50, 0, &slots, &mut rng);
        assert!(g.get(a).unwrap().layer(0).contains(b));
        assert!(g.get(b).unwrap().layer(0).contains(a));
    }

    #[test]
    fn bidirectionality_holds_after_many_inserts() {
        let mut g: GraphInner<usize> = GraphInner::new(None);
        let mut rng = StdRng::seed_from_u64(42);
        let slots = ReaderSlots::new(1);
        let mut ids = Vec::new();
        for i in 0..50 {
            let v: Vec<f32> = (0..8)
                .map(|d| ((i * 7 + d * 3) % 11) as f32 - 5.0)
                .collect();
            ids.push(insert(
                &mut g,
                &IndexParams::balanced(8, QuantMode::None),
                v,
                i,
                50,
                0,
                &slots,
                &mut rng,
            ));
        }
        for &id in &ids {
            let node = g.get(id).unwrap();
            for layer in 0..node.layers.len() {
                for &nb in &node.layer(layer).neighbors {
                    let nb_node = g.get(nb).expect("neighbor must exist");
                    assert!(
                        nb_node.layer(layer).contains(id),
                        "missing backlink {:?} -> {:?} at layer {}",
                        nb,
                        id,
                        layer
                    );
                }
            }
        }
    }

    #[test]
    fn try_commit_fails_after_concurrent_version_bump() {
        let mut g: GraphInner<&'static str> = GraphInner::new(None);
        let mut rng = StdRng::seed_from_u64(3);
        let slots = ReaderSlots::new(1);
        let prepared = prepare(&g, &params(), vec![1.0, 0.0, 0.0], "a", 50, 0, &slots, &mut rng);
        g.bump_version();
        let result = try_commit(&mut g, &params(), prepared);
        assert!(matches!(result, Err(VectorError::Contention)));
    }

    #[test]
    fn try_commit_succeeds_when_version_unchanged() {
        let mut g: GraphInner<&'static str> = GraphInner::new(None);
        let mut rng = StdRng::seed_from_u64(4);
        let slots = ReaderSlots::new(1);
        let prepared = prepare(&g, &params(), vec![1.0, 0.0, 0.0], "a", 50, 0, &slots, &mut rng);
        let result = try_commit(&mut g, &params(), prepared);
        assert!(result.is_ok());
        assert_eq!(g.node_count, 1);
    }
}
