//! Graph search (§4.E) and random-walk sampling (component K).

use crate::distance::distance;
use crate::graph::GraphInner;
use crate::node::NodeId;
use crate::quantize::VectorData;
use crate::queue::BoundedQueue;
use rand::Rng;

/// Width of the candidate frontier used during best-first expansion,
/// independent of the (usually smaller) results queue capacity `ef`.
const CANDIDATE_FRONTIER_CAPACITY: usize = 256;

/// Greedy single-best descent with an effective `ef = 1`, used to walk
/// from `entry` down to a good entry point at `layer` (§4.E upper-layer
/// descent, §4.F step 3).
pub fn greedy_descend<V>(
    graph: &GraphInner<V>,
    entry: NodeId,
    query: &VectorData,
    layer: usize,
) -> (NodeId, f32) {
    let mut best = entry;
    let mut best_dist = graph
        .get(entry)
        .map(|n| distance(query, &n.vector))
        .unwrap_or(f32::INFINITY);
    loop {
        let mut improved = false;
        if let Some(node) = graph.get(best)
            && layer <= node.level
        {
            for &nb_id in &node.layer(layer).neighbors {
                if let Some(nb) = graph.get(nb_id) {
                    let d = distance(query, &nb.vector);
                    if d < best_dist {
                        best_dist = d;
                        best = nb_id;
                        improved = true;
                    }
                }
            }
        }
        if !improved {
            break;
        }
    }
    (best, best_dist)
}

/// Best-first expansion at a single layer (§4.E). Seeds the frontier with
/// `entry_points`, expands nearest-first, and stops once the results
/// queue is full and the closest remaining candidate is farther than its
/// worst member. When `predicate` is set, every visited node still feeds
/// the frontier (to keep exploring graph topology) but only predicate-true
/// nodes enter `results`; `budget` caps the number of nodes whose distance
/// and predicate get evaluated.
#[allow(clippy::too_many_arguments)]
pub fn layer_search<V>(
    graph: &GraphInner<V>,
    layer: usize,
    entry_points: &[NodeId],
    query: &VectorData,
    ef: usize,
    slot: usize,
    epoch: u64,
    predicate: Option<&dyn Fn(&V) -> bool>,
    budget: Option<usize>,
) -> BoundedQueue {
    let mut results = BoundedQueue::new(ef);
    let mut frontier = BoundedQueue::new(CANDIDATE_FRONTIER_CAPACITY.max(ef));
    let mut evaluated = 0usize;

    let mut visit = |id: NodeId,
                      frontier: &mut BoundedQueue,
                      results: &mut BoundedQueue,
                      evaluated: &mut usize| {
        let Some(node) = graph.get(id) else { return };
        if node.is_visited(slot, epoch) {
            return;
        }
        node.mark_visited(slot, epoch);
        let d = distance(query, &node.vector);
        *evaluated += 1;
        frontier.push(id, d);
        if predicate.is_none_or(|f| f(&node.value)) {
            results.push(id, d);
        }
    };

    for &ep in entry_points {
        visit(ep, &mut frontier, &mut results, &mut evaluated);
    }

    loop {
        if let Some(b) = budget
            && evaluated >= b
        {
            break;
        }
        let Some((cur, cur_dist)) = frontier.pop_nearest() else {
            break;
        };
        if results.is_full() && cur_dist > results.max_distance() {
            break;
        }
        let Some(node) = graph.get(cur) else { continue };
        if layer > node.level {
            continue;
        }
        let neighbor_ids = node.layer(layer).neighbors.clone();
        for nb_id in neighbor_ids {
            visit(nb_id, &mut frontier, &mut results, &mut evaluated);
            if let Some(b) = budget
                && evaluated >= b
            {
                break;
            }
        }
    }

    results
}

/// Full K-NN search: upper-layer greedy descent down to layer 1, then a
/// best-first expansion at layer 0 (§4.E).
pub fn search_knn<V>(
    graph: &GraphInner<V>,
    entry_point: Option<NodeId>,
    max_level: usize,
    query: &VectorData,
    k: usize,
    ef: usize,
    slot: usize,
    epoch: u64,
) -> Vec<(NodeId, f32)> {
    let Some(entry) = entry_point else {
        return Vec::new();
    };
    let ef = ef.max(k);
    let mut cur = entry;
    for layer in (1..=max_level).rev() {
        cur = greedy_descend(graph, cur, query, layer).0;
    }
    let mut results = layer_search(graph, 0, &[cur], query, ef, slot, epoch, None, None)
        .into_sorted_vec();
    results.truncate(k);
    results
}

/// Predicate-filtered K-NN search (§4.E, §6 `SearchFiltered`). `max_candidates`
/// is the evaluation budget `B`.
#[allow(clippy::too_many_arguments)]
pub fn search_filtered<V>(
    graph: &GraphInner<V>,
    entry_point: Option<NodeId>,
    max_level: usize,
    query: &VectorData,
    k: usize,
    ef: usize,
    slot: usize,
    epoch: u64,
    predicate: &dyn Fn(&V) -> bool,
    max_candidates: usize,
) -> Vec<(NodeId, f32)> {
    let Some(entry) = entry_point else {
        return Vec::new();
    };
    let ef = ef.max(k);
    let mut cur = entry;
    for layer in (1..=max_level).rev() {
        cur = greedy_descend(graph, cur, query, layer).0;
    }
    let mut results = layer_search(
        graph,
        0,
        &[cur],
        query,
        ef,
        slot,
        epoch,
        Some(predicate),
        Some(max_candidates),
    )
    .into_sorted_vec();
    results.truncate(k);
    results
}

/// Oracle for recall testing: a linear scan over every live node. Per
/// DESIGN NOTES §9(c), `ef` is not meaningful here — only `k` and the
/// predicate are honored.
pub fn ground_truth<V>(
    graph: &GraphInner<V>,
    query: &VectorData,
    k: usize,
    predicate: Option<&dyn Fn(&V) -> bool>,
) -> Vec<(NodeId, f32)> {
    let mut results = BoundedQueue::new(k.max(1));
    for node in graph.arena.iter().filter_map(|n| n.as_ref()) {
        if predicate.is_none_or(|f| f(&node.value)) {
            results.push(node.id, distance(query, &node.vector));
        }
    }
    results.into_sorted_vec()
}

/// Layered random descent (component K): walks down from the entry point
/// picking a uniformly random neighbor at each layer, then takes a short
/// random walk within layer 0 so the result isn't biased toward hub nodes
/// directly reachable from the entry point.
pub fn random_node<V>(
    graph: &GraphInner<V>,
    entry_point: Option<NodeId>,
    max_level: usize,
    rng: &mut impl Rng,
) -> Option<NodeId> {
    let mut cur = entry_point?;
    for layer in (1..=max_level).rev() {
        let Some(node) = graph.get(cur) else { continue };
        if layer > node.level {
            continue;
        }
        let neighbors = &node.layer(layer).neighbors;
        if !neighbors.is_empty() {
            cur = neighbors[rng.random_range(0..neighbors.len())];
        }
    }
    let steps = rng.random_range(0..4);
    for _ in 0..steps {
        let Some(node) = graph.get(cur) else { break };
        let neighbors = &node.layer(0).neighbors;
        if neighbors.is_empty() {
            break;
        }
        cur = neighbors[rng.random_range(0..neighbors.len())];
    }
    Some(cur)
}
