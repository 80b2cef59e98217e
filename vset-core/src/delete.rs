//! Delete path (§4.G): unlink plus neighborhood reconnection.

use crate::concurrency::ReaderSlots;
use crate::distance::distance;
use crate::graph::GraphInner;
use crate::insert::{remove_backlink, unlink_bidirectional};
use crate::node::NodeId;
use crate::params::IndexParams;
use crate::quantize::VectorData;
use crate::search::{greedy_descend, layer_search};
use rand::Rng;

/// Deletes `id`, unlinking every backlink, repairing the entry point and
/// doubly-linked list, reconnecting each layer's orphaned former
/// neighbors, and returning the node's owned value. `None` if `id` does
/// not exist. Requires exclusive (write-lock) access to `graph`.
///
/// `slot`/`slots` back the re-entry fallback's `layer_search` calls — each
/// gets its own freshly bumped epoch, the same discipline insert uses per
/// layer (see `insert::collect_candidates`).
pub fn delete<V>(
    graph: &mut GraphInner<V>,
    params: &IndexParams,
    id: NodeId,
    slot: usize,
    slots: &ReaderSlots,
    rng: &mut impl Rng,
) -> Option<V> {
    let (level, former_neighbors) = {
        let node = graph.get(id)?;
        let level = node.level;
        let former = (0..=level).map(|l| node.layer(l).neighbors.clone()).collect::<Vec<_>>();
        (level, former)
    };

    for (l, neighbors) in former_neighbors.iter().enumerate() {
        for &nb in neighbors {
            remove_backlink(graph, nb, id, l);
        }
    }
    graph.notify_cursors_of_delete(id);
    replace_entry_point_if_needed(graph, id, level, &former_neighbors);
    graph.bump_version();

    for (l, neighbors) in former_neighbors.iter().enumerate() {
        reconnect_orphans(graph, params, l, neighbors, slot, slots, rng);
    }

    let removed = graph.unlink_and_free(id)?;
    Some(removed.value)
}

fn replace_entry_point_if_needed<V>(
    graph: &mut GraphInner<V>,
    id: NodeId,
    level: usize,
    former_neighbors: &[Vec<NodeId>],
) {
    if graph.entry_point != Some(id) {
        return;
    }
    let replacement = (0..=level)
        .rev()
        .find_map(|l| former_neighbors[l].first().copied())
        .or_else(|| {
            graph
                .arena
                .iter()
                .filter_map(|n| n.as_ref())
                .filter(|n| n.id != id)
                .max_by_key(|n| n.level)
                .map(|n| n.id)
        });
    match replacement {
        Some(e) => {
            graph.max_level = graph.get(e).map(|n| n.level).unwrap_or(0);
            graph.entry_point = Some(e);
        }
        None => {
            graph.entry_point = None;
            graph.max_level = 0;
        }
    }
}

fn link_pair<V>(graph: &mut GraphInner<V>, a: NodeId, b: NodeId, layer: usize, dist: f32) {
    if let Some(na) = graph.get_mut(a) {
        na.layer_mut(layer).push_with_distance(b, dist);
    }
    if let Some(nb) = graph.get_mut(b) {
        nb.layer_mut(layer).push_with_distance(a, dist);
    }
}

fn has_link<V>(graph: &GraphInner<V>, a: NodeId, b: NodeId, layer: usize) -> bool {
    graph
        .get(a)
        .map(|n| layer <= n.level && n.layer(layer).contains(b))
        .unwrap_or(false)
}

fn has_free_capacity<V>(graph: &GraphInner<V>, a: NodeId, layer: usize) -> bool {
    graph
        .get(a)
        .map(|n| layer <= n.level && n.layer(layer).has_free_capacity())
        .unwrap_or(false)
}

/// Reconnects the former neighbors of a deleted node at one layer (§4.G
/// step 2): greedy score-matrix pairing, a relaxed same-set retry pass,
/// then a fallback that re-enters the graph from the entry point for any
/// node still short of capacity.
fn reconnect_orphans<V>(
    graph: &mut GraphInner<V>,
    params: &IndexParams,
    layer: usize,
    orphans: &[NodeId],
    slot: usize,
    slots: &ReaderSlots,
    rng: &mut impl Rng,
) {
    let n = orphans.len();
    if n < 2 {
        reconnect_via_reentry(graph, params, layer, orphans, slot, slots);
        return;
    }
    let Some(vectors) = orphans
        .iter()
        .map(|&id| graph.get(id).map(|n| n.vector.clone()))
        .collect::<Option<Vec<VectorData>>>()
    else {
        return;
    };

    let mut dmat = vec![vec![0.0f32; n]; n];
    for i in 0..n {
        for j in 0..n {
            if i != j {
                dmat[i][j] = distance(&vectors[i], &vectors[j]);
            }
        }
    }
    let mut avg = vec![0.0f32; n];
    for (i, row) in avg.iter_mut().enumerate() {
        let sum: f32 = (0..n).filter(|&j| j != i).map(|j| dmat[i][j]).sum();
        *row = if n > 1 { sum / (n - 1) as f32 } else { 0.0 };
    }

    let mut used = vec![false; n];
    loop {
        let mut best: Option<(usize, usize, f32)> = None;
        for i in 0..n {
            if used[i] {
                continue;
            }
            for j in (i + 1)..n {
                if used[j] || has_link(graph, orphans[i], orphans[j], layer) {
                    continue;
                }
                if !has_free_capacity(graph, orphans[i], layer) || !has_free_capacity(graph, orphans[j], layer) {
                    continue;
                }
                let avg_i_excl = if n > 2 {
                    (avg[i] * (n - 1) as f32 - dmat[i][j]) / (n - 2) as f32
                } else {
                    0.0
                };
                let avg_j_excl = if n > 2 {
                    (avg[j] * (n - 1) as f32 - dmat[j][i]) / (n - 2) as f32
                } else {
                    0.0
                };
                let score = 0.7 * (2.0 - dmat[i][j]) + 0.3 * ((avg_i_excl + avg_j_excl) / 2.0);
                if best.is_none_or(|(_, _, b)| score > b) {
                    best = Some((i, j, score));
                }
            }
        }
        let Some((i, j, _)) = best else { break };
        link_pair(graph, orphans[i], orphans[j], layer, dmat[i][j]);
        used[i] = true;
        used[j] = true;
    }

    // Relaxed retry within the same orphan set (aggressiveness 1): drop the
    // score ranking, just pair any two still-free, not-yet-linked orphans.
    let mut shuffled: Vec<usize> = (0..n).collect();
    shuffle(&mut shuffled, rng);
    for &i in &shuffled {
        if used[i] || !has_free_capacity(graph, orphans[i], layer) {
            continue;
        }
        for &j in &shuffled {
            if i == j || used[j] || !has_free_capacity(graph, orphans[j], layer) {
                continue;
            }
            if has_link(graph, orphans[i], orphans[j], layer) {
                continue;
            }
            link_pair(graph, orphans[i], orphans[j], layer, dmat[i][j]);
            used[i] = true;
            used[j] = true;
            break;
        }
    }

    let still_unpaired: Vec<NodeId> = (0..n)
        .filter(|&i| !used[i] && has_free_capacity(graph, orphans[i], layer))
        .map(|i| orphans[i])
        .collect();
    reconnect_via_reentry(graph, params, layer, &still_unpaired, slot, slots);
}

fn shuffle(items: &mut [usize], rng: &mut impl Rng) {
    for i in (1..items.len()).rev() {
        let j = rng.random_range(0..=i);
        items.swap(i, j);
    }
}

/// Final fallback (§4.G step 2, third bullet): re-enter the graph from the
/// entry point and run a single-node neighbor admission pass.
fn reconnect_via_reentry<V>(
    graph: &mut GraphInner<V>,
    params: &IndexParams,
    layer: usize,
    unpaired: &[NodeId],
    slot: usize,
    slots: &ReaderSlots,
) {
    let Some(entry) = graph.entry_point else { return };
    for &u in unpaired {
        if !has_free_capacity(graph, u, layer) {
            continue;
        }
        let Some(query) = graph.get(u).map(|n| n.vector.clone()) else {
            continue;
        };
        let mut cur = entry;
        for l in (layer + 1..=graph.max_level).rev() {
            cur = greedy_descend(graph, cur, &query, l).0;
        }
        let epoch = slots.bump_epoch(slot);
        let candidates = layer_search(graph, layer, &[cur], &query, params.ef_search, slot, epoch, None, None)
            .into_sorted_vec();
        reconnect_single(graph, params, u, layer, &candidates);
    }
}

fn reconnect_single<V>(
    graph: &mut GraphInner<V>,
    params: &IndexParams,
    u: NodeId,
    layer: usize,
    candidates: &[(NodeId, f32)],
) {
    let required = params.max_links;
    for &(c, dist) in candidates {
        if c == u {
            continue;
        }
        let Some(u_node) = graph.get(u) else { break };
        if !u_node.layer(layer).has_free_capacity() {
            break;
        }
        if u_node.layer(layer).contains(c) {
            continue;
        }
        let Some(c_node) = graph.get(c) else { continue };
        if layer > c_node.level {
            continue;
        }
        if c_node.layer(layer).has_free_capacity() {
            link_pair(graph, u, c, layer, dist);
            continue;
        }
        let Some(w) = c_node.layer(layer).worst_neighbor() else {
            continue;
        };
        if dist >= c_node.layer(layer).worst_distance {
            continue;
        }
        let w_links_after = graph
            .get(w)
            .map(|n| n.layer(layer).len())
            .unwrap_or(0)
            .saturating_sub(1);
        if w_links_after < required / 4 {
            continue;
        }
        unlink_bidirectional(graph, c, w, layer);
        link_pair(graph, u, c, layer, dist);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::insert::insert;
    use crate::quantize::QuantMode;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn params() -> IndexParams {
        IndexParams::balanced(6, QuantMode::None)
    }

    fn seeded_graph(n: usize, seed: u64) -> (GraphInner<usize>, Vec<NodeId>, ReaderSlots) {
        let mut g: GraphInner<usize> = GraphInner::new(None);
        let mut rng = StdRng::seed_from_u64(seed);
        let slots = ReaderSlots::new(1);
        let mut ids = Vec::new();
        for i in 0..n {
            let v: Vec<f32> = (0..6).map(|d| ((i * 13 + d * 5) % 17) as f32 - 8.0).collect();
            ids.push(insert(&mut g, &params(), v, i, 100, 0, &slots, &mut rng));
        }
        (g, ids, slots)
    }

    #[test]
    fn delete_last_node_leaves_empty_consistent_index() {
        let (mut g, ids, slots) = seeded_graph(1, 1);
        let mut rng = StdRng::seed_from_u64(99);
        let val = delete(&mut g, &params(), ids[0], 0, &slots, &mut rng);
        assert_eq!(val, Some(0));
        assert_eq!(g.node_count, 0);
        assert_eq!(g.entry_point, None);
        assert_eq!(g.max_level, 0);
        assert_eq!(g.list_len(), 0);
    }

    #[test]
    fn bidirectionality_holds_after_delete() {
        let (mut g, ids, slots) = seeded_graph(40, 11);
        let mut rng = StdRng::seed_from_u64(5);
        for &victim in ids.iter().step_by(3) {
            delete(&mut g, &params(), victim, 0, &slots, &mut rng);
        }
        for node in g.arena.iter().filter_map(|n| n.as_ref()) {
            for layer in 0..node.layers.len() {
                for &nb in &node.layer(layer).neighbors {
                    let nb_node = g.get(nb).expect("neighbor must still exist");
                    assert!(nb_node.layer(layer).contains(node.id));
                }
            }
        }
    }

    #[test]
    fn entry_point_always_at_max_level() {
        let (mut g, ids, slots) = seeded_graph(30, 21);
        let mut rng = StdRng::seed_from_u64(6);
        for &victim in ids.iter().take(15) {
            delete(&mut g, &params(), victim, 0, &slots, &mut rng);
        }
        if let Some(ep) = g.entry_point {
            assert_eq!(g.get(ep).unwrap().level, g.max_level);
        }
        assert_eq!(g.list_len(), g.node_count);
    }

    #[test]
    fn delete_unknown_node_returns_none() {
        let (mut g, _ids, slots) = seeded_graph(3, 2);
        let mut rng = StdRng::seed_from_u64(7);
        assert_eq!(
            delete(&mut g, &params(), NodeId::new(9_999u64), 0, &slots, &mut rng),
            None
        );
    }
}
