//! Per-time-point connection graph (C5): an undirected neighbor graph used
//! to record which nearby cells an annotator believes are genuinely
//! adjacent, independent of the lineage graph.

use std::collections::{HashMap, HashSet, VecDeque};

use crate::error::{LineageError, Result};
use crate::geometry::Position;

#[derive(Debug, Clone, Default)]
pub struct Connections {
    by_time_point: HashMap<i32, HashMap<Position, HashSet<Position>>>,
}

impl Connections {
    pub fn new() -> Self {
        Connections::default()
    }

    /// Adds an undirected edge. Both endpoints must be at the same time
    /// point and distinct.
    pub fn add(&mut self, a: Position, b: Position) -> Result<()> {
        let ta = a.require_t()?;
        let tb = b.require_t()?;
        if ta != tb {
            return Err(LineageError::TimePointMismatch { expected: ta, actual: tb });
        }
        if a == b {
            return Err(LineageError::SameTimePoint { t: ta });
        }
        let graph = self.by_time_point.entry(ta).or_default();
        graph.entry(a).or_default().insert(b);
        graph.entry(b).or_default().insert(a);
        Ok(())
    }

    pub fn remove(&mut self, a: &Position, b: &Position) -> bool {
        let Some(t) = a.t else { return false };
        let Some(graph) = self.by_time_point.get_mut(&t) else { return false };
        let removed_a = graph.get_mut(a).map(|s| s.remove(b)).unwrap_or(false);
        if let Some(s) = graph.get_mut(b) {
            s.remove(a);
        }
        removed_a
    }

    pub fn remove_connections_of(&mut self, pos: &Position) {
        let Some(t) = pos.t else { return };
        let Some(graph) = self.by_time_point.get_mut(&t) else { return };
        if let Some(neighbors) = graph.remove(pos) {
            for n in neighbors {
                if let Some(s) = graph.get_mut(&n) {
                    s.remove(pos);
                }
            }
        }
    }

    pub fn find_connections(&self, pos: &Position) -> HashSet<Position> {
        let Some(t) = pos.t else { return HashSet::new() };
        self.by_time_point
            .get(&t)
            .and_then(|g| g.get(pos))
            .cloned()
            .unwrap_or_default()
    }

    /// Dijkstra with uniform edge weights (plain BFS) from `sources`,
    /// returning hop count to every reachable position in that time point.
    pub fn calculate_distances(&self, sources: &[Position]) -> HashMap<Position, u32> {
        let mut distances = HashMap::new();
        let Some(t) = sources.first().and_then(|p| p.t) else { return distances };
        let Some(graph) = self.by_time_point.get(&t) else { return distances };

        let mut queue = VecDeque::new();
        for s in sources {
            if distances.insert(*s, 0).is_none() {
                queue.push_back(*s);
            }
        }
        while let Some(current) = queue.pop_front() {
            let d = distances[&current];
            if let Some(neighbors) = graph.get(&current) {
                for &n in neighbors {
                    if !distances.contains_key(&n) {
                        distances.insert(n, d + 1);
                        queue.push_back(n);
                    }
                }
            }
        }
        distances
    }

    /// True iff the neighbors of `pos` form a cycle among themselves (or,
    /// with exactly three neighbors, a triangle) — i.e. the annotator has
    /// drawn a closed ring of connections around `pos`.
    pub fn has_full_neighbors(&self, pos: &Position) -> bool {
        let neighbors: Vec<Position> = self.find_connections(pos).into_iter().collect();
        if neighbors.len() < 3 {
            return false;
        }
        let Some(t) = pos.t else { return false };
        let Some(graph) = self.by_time_point.get(&t) else { return false };
        let neighbor_set: HashSet<Position> = neighbors.iter().copied().collect();

        // Cycle detection restricted to the induced subgraph on `neighbors`.
        let mut visited = HashSet::new();
        for &start in &neighbors {
            if visited.contains(&start) {
                continue;
            }
            if Self::induced_subgraph_has_cycle(graph, &neighbor_set, start, &mut visited) {
                return true;
            }
        }
        false
    }

    fn induced_subgraph_has_cycle(
        graph: &HashMap<Position, HashSet<Position>>,
        allowed: &HashSet<Position>,
        start: Position,
        visited: &mut HashSet<Position>,
    ) -> bool {
        let mut stack = vec![(start, None::<Position>)];
        while let Some((node, parent)) = stack.pop() {
            if !visited.insert(node) {
                continue;
            }
            let Some(neighbors) = graph.get(&node) else { continue };
            for &n in neighbors {
                if !allowed.contains(&n) {
                    continue;
                }
                if Some(n) == parent {
                    continue;
                }
                if visited.contains(&n) {
                    return true;
                }
                stack.push((n, Some(node)));
            }
        }
        false
    }

    /// Shifts every time index by `dt` (used when splicing in an
    /// externally-offset experiment).
    pub fn move_in_time(&mut self, dt: i32) {
        let shifted: HashMap<i32, HashMap<Position, HashSet<Position>>> = self
            .by_time_point
            .drain()
            .map(|(t, graph)| {
                let new_graph = graph
                    .into_iter()
                    .map(|(p, ns)| {
                        let new_p = p.with_time(p.t.unwrap() + dt);
                        let new_ns = ns.into_iter().map(|n| n.with_time(n.t.unwrap() + dt)).collect();
                        (new_p, new_ns)
                    })
                    .collect();
                (t + dt, new_graph)
            })
            .collect();
        self.by_time_point = shifted;
    }

    pub fn copy(&self) -> Self {
        self.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn p(x: f64, t: i32) -> Position {
        Position::new(x, 0.0, 0.0, t)
    }

    #[test]
    fn add_requires_same_time_point() {
        let mut c = Connections::new();
        assert!(c.add(p(0.0, 0), p(0.0, 1)).is_err());
    }

    #[test]
    fn add_rejects_self_loop() {
        let mut c = Connections::new();
        assert!(c.add(p(0.0, 0), p(0.0, 0)).is_err());
    }

    #[test]
    fn adding_both_directions_leaves_one_edge() {
        let mut c = Connections::new();
        let a = p(0.0, 0);
        let b = p(1.0, 0);
        c.add(a, b).unwrap();
        c.add(b, a).unwrap();
        assert_eq!(c.find_connections(&a).len(), 1);
        assert_eq!(c.find_connections(&b).len(), 1);
    }

    #[test]
    fn remove_connections_of_drops_all_edges() {
        let mut c = Connections::new();
        let center = p(0.0, 0);
        let a = p(1.0, 0);
        let b = p(2.0, 0);
        c.add(center, a).unwrap();
        c.add(center, b).unwrap();
        c.remove_connections_of(&center);
        assert!(c.find_connections(&center).is_empty());
        assert!(c.find_connections(&a).is_empty());
    }

    #[test]
    fn calculate_distances_bfs_hop_counts() {
        let mut c = Connections::new();
        let a = p(0.0, 0);
        let b = p(1.0, 0);
        let d = p(2.0, 0);
        c.add(a, b).unwrap();
        c.add(b, d).unwrap();
        let distances = c.calculate_distances(&[a]);
        assert_eq!(distances[&a], 0);
        assert_eq!(distances[&b], 1);
        assert_eq!(distances[&d], 2);
    }

    #[test]
    fn has_full_neighbors_detects_triangle() {
        let mut c = Connections::new();
        let center = p(0.0, 0);
        let a = p(1.0, 0);
        let b = p(2.0, 0);
        let d = p(3.0, 0);
        c.add(center, a).unwrap();
        c.add(center, b).unwrap();
        c.add(center, d).unwrap();
        c.add(a, b).unwrap();
        c.add(b, d).unwrap();
        c.add(d, a).unwrap();
        assert!(c.has_full_neighbors(&center));
    }

    #[test]
    fn has_full_neighbors_false_without_enclosing_ring() {
        let mut c = Connections::new();
        let center = p(0.0, 0);
        let a = p(1.0, 0);
        let b = p(2.0, 0);
        c.add(center, a).unwrap();
        c.add(center, b).unwrap();
        assert!(!c.has_full_neighbors(&center));
    }

    #[test]
    fn move_in_time_shifts_all_positions() {
        let mut c = Connections::new();
        let a = p(0.0, 0);
        let b = p(1.0, 0);
        c.add(a, b).unwrap();
        c.move_in_time(5);
        let shifted_a = p(0.0, 5);
        assert_eq!(c.find_connections(&shifted_a).len(), 1);
    }
}
