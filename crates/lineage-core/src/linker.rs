//! Constraint-based link selector (C8).
//!
//! Candidate links are turned into a min-cost flow network and solved by
//! successive shortest augmenting paths (Bellman-Ford, since edge costs
//! can be negative): each unit of flow from a global source to a global
//! sink corresponds to "detecting" one position, and the cheapest
//! augmenting path is repeatedly pushed until no negative-cost path
//! remains. The resulting flow decodes into the selected links. A
//! dividing mother is one unit of detection that must fan out into two
//! daughter links; its `SOURCE -> in_node` supply edge gets capacity 2
//! instead of 1 so the parallel plain-detection and division arcs between
//! `in_node` and `out_node` can both carry flow at once.

use std::collections::HashMap;

use crate::geometry::{ImageResolution, Position};
use crate::links::Links;

#[derive(Debug, Clone, Copy)]
pub struct LinkerWeights {
    pub w_link: f64,
    pub w_detect: f64,
    pub w_div: f64,
    pub w_app: f64,
    pub w_disapp: f64,
}

struct Edge {
    to: usize,
    cap: i32,
    cost: f64,
    flow: i32,
}

/// A small from-scratch min-cost-flow graph: adjacency list of edge
/// indices, edges stored in pairs (forward, reverse) so the residual graph
/// is implicit.
struct FlowGraph {
    edges: Vec<Edge>,
    adj: Vec<Vec<usize>>,
}

impl FlowGraph {
    fn new(node_count: usize) -> Self {
        FlowGraph { edges: Vec::new(), adj: vec![Vec::new(); node_count] }
    }

    fn add_edge(&mut self, from: usize, to: usize, cap: i32, cost: f64) -> usize {
        let fwd = self.edges.len();
        self.edges.push(Edge { to, cap, cost, flow: 0 });
        self.adj[from].push(fwd);
        let rev = self.edges.len();
        self.edges.push(Edge { to: from, cap: 0, cost: -cost, flow: 0 });
        self.adj[to].push(rev);
        fwd
    }

    fn residual(&self, edge_idx: usize) -> i32 {
        self.edges[edge_idx].cap - self.edges[edge_idx].flow
    }

    /// Bellman-Ford shortest path by cost from `source`; returns the
    /// predecessor edge used to reach each node, if reachable with finite
    /// cost along edges with positive residual capacity.
    fn shortest_path(&self, source: usize, sink: usize) -> Option<Vec<usize>> {
        let n = self.adj.len();
        let mut dist = vec![f64::INFINITY; n];
        let mut pred_edge: Vec<Option<usize>> = vec![None; n];
        dist[source] = 0.0;

        for _ in 0..n {
            let mut updated = false;
            for u in 0..n {
                if !dist[u].is_finite() {
                    continue;
                }
                for &edge_idx in &self.adj[u] {
                    if self.residual(edge_idx) <= 0 {
                        continue;
                    }
                    let edge = &self.edges[edge_idx];
                    let nd = dist[u] + edge.cost;
                    if nd < dist[edge.to] - 1e-12 {
                        dist[edge.to] = nd;
                        pred_edge[edge.to] = Some(edge_idx);
                        updated = true;
                    }
                }
            }
            if !updated {
                break;
            }
        }

        if !dist[sink].is_finite() {
            return None;
        }

        let mut path = Vec::new();
        let mut cur = sink;
        while cur != source {
            let edge_idx = pred_edge[cur]?;
            path.push(edge_idx);
            cur = self.edge_from(edge_idx);
        }
        path.reverse();
        Some(path)
    }

    /// Recovers the source node of `edge_idx` by scanning which node's
    /// adjacency list contains it (each forward/reverse edge is registered
    /// under exactly one node, its own origin). Graphs here are small
    /// enough that this linear scan is cheap relative to Bellman-Ford
    /// itself.
    fn edge_from(&self, edge_idx: usize) -> usize {
        self.adj
            .iter()
            .position(|edges| edges.contains(&edge_idx))
            .expect("every edge belongs to exactly one node's adjacency list")
    }

    fn augment(&mut self, path: &[usize]) {
        for &edge_idx in path {
            self.edges[edge_idx].flow += 1;
            self.edges[edge_idx ^ 1].flow -= 1;
        }
    }

    fn path_cost(&self, path: &[usize]) -> f64 {
        path.iter().map(|&e| self.edges[e].cost).sum()
    }

    /// Runs successive shortest augmenting paths until no negative-cost
    /// path from `source` to `sink` remains.
    fn solve(&mut self, source: usize, sink: usize) {
        loop {
            let Some(path) = self.shortest_path(source, sink) else { break };
            if self.path_cost(&path) >= -1e-9 {
                break;
            }
            self.augment(&path);
        }
    }
}

fn cube_root(volume: f64) -> f64 {
    volume.cbrt()
}

/// Selects a globally consistent subset of `candidate_links` forming a
/// lineage graph in which every position is used at most once and
/// divisions only happen where a position has a positive mother score.
pub fn select_links(
    positions: &[Position],
    candidate_links: &[(Position, Position)],
    mother_scores: &HashMap<Position, f64>,
    volumes: &HashMap<Position, f64>,
    res: &ImageResolution,
    weights: LinkerWeights,
) -> Links {
    let first_t = positions.iter().filter_map(|p| p.t).min();
    let last_t = positions.iter().filter_map(|p| p.t).max();

    let index_of: HashMap<Position, usize> =
        positions.iter().enumerate().map(|(i, p)| (*p, i)).collect();

    const SOURCE: usize = 0;
    const SINK: usize = 1;
    let node_count = 2 + 2 * positions.len();
    let mut graph = FlowGraph::new(node_count);
    let in_node = |i: usize| 2 + 2 * i;
    let out_node = |i: usize| 2 + 2 * i + 1;

    for (i, pos) in positions.iter().enumerate() {
        let app_cost = if pos.t == first_t { 0.0 } else { weights.w_app };
        let disapp_cost = if pos.t == last_t { 0.0 } else { weights.w_disapp };
        let mother_score = mother_scores.get(pos).copied().unwrap_or(0.0);

        // A dividing mother sends two units downstream (one per daughter
        // link) out of a single detection. `in_node`/`out_node` are shared
        // by both units, so the source supply feeding them must carry 2
        // units of capacity whenever division is possible here, or the
        // division edge below could never carry flow alongside the plain
        // detection edge (both draw from the same 1-unit `in_node`).
        let supply = if mother_score > 0.0 { 2 } else { 1 };
        graph.add_edge(SOURCE, in_node(i), supply, app_cost);
        graph.add_edge(out_node(i), SINK, 1, disapp_cost);

        // Using the detection saves the otherwise-incurred w_detect
        // "unused" cost — an equivalent reformulation that differs from
        // the literal per-position constant only by an additive term that
        // does not change which solution is optimal.
        graph.add_edge(in_node(i), out_node(i), 1, -weights.w_detect);

        if mother_score > 0.0 {
            graph.add_edge(in_node(i), out_node(i), 1, -weights.w_detect - weights.w_div * mother_score);
        }
    }

    let mut seen_links = std::collections::HashSet::new();
    let mut link_edges = Vec::new();
    for &(a, b) in candidate_links {
        let (ta, tb) = match (a.t, b.t) {
            (Some(ta), Some(tb)) => (ta, tb),
            _ => continue,
        };
        let (early, late) = if ta < tb { (a, b) } else { (b, a) };
        let (Some(&i), Some(&j)) = (index_of.get(&early), index_of.get(&late)) else { continue };
        if !seen_links.insert((i, j)) {
            continue;
        }
        let distance = early.distance_um(&late, res);
        let vol_term = match (volumes.get(&early), volumes.get(&late)) {
            (Some(&va), Some(&vb)) => (cube_root(va) - cube_root(vb)).abs() * res.px_x_um,
            _ => 0.0,
        };
        let mut cost = weights.w_link * (distance + vol_term);
        if mother_scores.get(&early).copied().unwrap_or(0.0) > 0.0 {
            cost /= 2.0;
        }
        let edge_idx = graph.add_edge(out_node(i), in_node(j), 1, cost);
        link_edges.push((edge_idx, early, late));
    }

    graph.solve(SOURCE, SINK);

    let mut selected = Links::new();
    for (edge_idx, early, late) in link_edges {
        if graph.edges[edge_idx].flow > 0 {
            let _ = selected.add_link(early, late);
        }
    }
    selected
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::ImageResolution;

    fn p(x: f64, t: i32) -> Position {
        Position::new(x, 0.0, 0.0, t)
    }

    fn weights() -> LinkerWeights {
        LinkerWeights { w_link: 20.0, w_detect: 150.0, w_div: 30.0, w_app: 150.0, w_disapp: 100.0 }
    }

    #[test]
    fn selector_prefers_identity_links_over_crossing() {
        let res = ImageResolution::new(1.0, 1.0, 1.0, 1.0).unwrap();
        let positions = vec![p(0.0, 0), p(10.0, 0), p(20.0, 0), p(0.0, 1), p(10.0, 1), p(20.0, 1)];
        let candidates = vec![
            (p(0.0, 0), p(0.0, 1)),
            (p(10.0, 0), p(10.0, 1)),
            (p(20.0, 0), p(20.0, 1)),
            (p(0.0, 0), p(20.0, 1)),
        ];
        let selected = select_links(
            &positions,
            &candidates,
            &HashMap::new(),
            &HashMap::new(),
            &res,
            weights(),
        );
        assert!(selected.contains_link(&p(0.0, 0), &p(0.0, 1)));
        assert!(selected.contains_link(&p(10.0, 0), &p(10.0, 1)));
        assert!(selected.contains_link(&p(20.0, 0), &p(20.0, 1)));
        assert!(!selected.contains_link(&p(0.0, 0), &p(20.0, 1)));
    }

    #[test]
    fn selector_allows_division_with_positive_mother_score() {
        let res = ImageResolution::new(1.0, 1.0, 1.0, 1.0).unwrap();
        let mother = p(0.0, 0);
        let positions = vec![mother, p(0.0, 1), p(1.0, 1)];
        let candidates = vec![(mother, p(0.0, 1)), (mother, p(1.0, 1))];
        let mut scores = HashMap::new();
        scores.insert(mother, 5.0);
        let selected =
            select_links(&positions, &candidates, &scores, &HashMap::new(), &res, weights());
        assert!(selected.contains_link(&mother, &p(0.0, 1)));
        assert!(selected.contains_link(&mother, &p(1.0, 1)));
    }

    #[test]
    fn duplicate_candidate_links_are_deduplicated() {
        let res = ImageResolution::new(1.0, 1.0, 1.0, 1.0).unwrap();
        let positions = vec![p(0.0, 0), p(0.0, 1)];
        let candidates = vec![(p(0.0, 0), p(0.0, 1)), (p(0.0, 1), p(0.0, 0))];
        let selected =
            select_links(&positions, &candidates, &HashMap::new(), &HashMap::new(), &res, weights());
        assert_eq!(selected.find_all_links().len(), 1);
    }
}
