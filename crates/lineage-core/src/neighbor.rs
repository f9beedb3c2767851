//! Spatial-neighbor queries (C6): nearest-position lookups over a
//! [`PositionCollection`](crate::position_store::PositionCollection),
//! plus the k-nearest-neighbor graph builder used by automatic connection
//! generation.

use crate::connections::Connections;
use crate::geometry::{ImageResolution, Position};

/// Linear-scan nearest neighbor. Ties are broken by squared time-point
/// difference (closer in time wins). `max_um`, if set, excludes candidates
/// further than that.
pub fn find_closest<'a>(
    candidates: impl IntoIterator<Item = &'a Position>,
    around: &Position,
    res: &ImageResolution,
    ignore_z: bool,
    max_um: Option<f64>,
) -> Option<&'a Position> {
    let mut best: Option<(&Position, f64)> = None;
    for candidate in candidates {
        if candidate == around {
            continue;
        }
        let d2 = squared_distance(candidate, around, res, ignore_z);
        if let Some(max) = max_um {
            if d2 > max * max {
                continue;
            }
        }
        let time_penalty = time_diff_penalty(candidate, around);
        let score = d2 + time_penalty;
        match &best {
            None => best = Some((candidate, score)),
            Some((_, best_score)) if score < *best_score => best = Some((candidate, score)),
            _ => {}
        }
    }
    best.map(|(p, _)| p)
}

fn squared_distance(a: &Position, b: &Position, res: &ImageResolution, ignore_z: bool) -> f64 {
    if ignore_z {
        let dx = (a.x - b.x) * res.px_x_um;
        let dy = (a.y - b.y) * res.px_y_um;
        dx * dx + dy * dy
    } else {
        a.distance_um_squared(b, res)
    }
}

fn time_diff_penalty(a: &Position, b: &Position) -> f64 {
    let dt = (a.t.unwrap_or(0) - b.t.unwrap_or(0)) as f64;
    dt * dt
}

/// Bounded sorted buffer of the `n` best candidates by distance.
pub fn find_closest_n<'a>(
    candidates: impl IntoIterator<Item = &'a Position>,
    around: &Position,
    n: usize,
    res: &ImageResolution,
    max_um: Option<f64>,
    ignore_self: bool,
) -> Vec<&'a Position> {
    if n == 0 {
        return Vec::new();
    }
    let mut buffer: Vec<(&Position, f64)> = Vec::with_capacity(n + 1);
    for candidate in candidates {
        if ignore_self && candidate == around {
            continue;
        }
        let d2 = candidate.distance_um_squared(around, res);
        if let Some(max) = max_um {
            if d2 > max * max {
                continue;
            }
        }
        let pos = buffer.partition_point(|(_, score)| *score < d2);
        buffer.insert(pos, (candidate, d2));
        buffer.truncate(n);
    }
    buffer.into_iter().map(|(p, _)| p).collect()
}

/// All positions within `tolerance * d_min` of `around`, ordered by
/// distance and capped at `max_n`. `tolerance` must be `>= 1`.
pub fn find_close<'a>(
    candidates: impl IntoIterator<Item = &'a Position>,
    around: &Position,
    tolerance: f64,
    res: &ImageResolution,
    max_n: usize,
    max_um: Option<f64>,
) -> Vec<&'a Position> {
    debug_assert!(tolerance >= 1.0);
    let mut scored: Vec<(&Position, f64)> = candidates
        .into_iter()
        .filter(|c| *c != around)
        .map(|c| (c, c.distance_um_squared(around, res)))
        .filter(|(_, d2)| max_um.map(|m| *d2 <= m * m).unwrap_or(true))
        .collect();
    scored.sort_by(|a, b| a.1.partial_cmp(&b.1).unwrap());
    let Some(&(_, d_min_sq)) = scored.first() else { return Vec::new() };
    let threshold = d_min_sq * tolerance * tolerance;
    scored.into_iter().filter(|(_, d2)| *d2 <= threshold).take(max_n).map(|(p, _)| p).collect()
}

/// Builds an undirected graph connecting every position to its `neighbors`
/// nearest positions in the same time point.
pub fn make_nearby_graph(positions: &[Position], neighbors: usize, res: &ImageResolution) -> Connections {
    let mut graph = Connections::new();
    for &pos in positions {
        let same_time: Vec<&Position> = positions.iter().filter(|p| p.t == pos.t).collect();
        let closest = find_closest_n(same_time, &pos, neighbors, res, None, true);
        for &other in &closest {
            let _ = graph.add(pos, *other);
        }
    }
    graph
}

#[cfg(test)]
mod tests {
    use super::*;

    fn p(x: f64, t: i32) -> Position {
        Position::new(x, 0.0, 0.0, t)
    }

    fn res() -> ImageResolution {
        ImageResolution::new(1.0, 1.0, 1.0, 1.0).unwrap()
    }

    #[test]
    fn find_closest_picks_nearest() {
        let candidates = vec![p(5.0, 0), p(1.0, 0), p(10.0, 0)];
        let around = p(0.0, 0);
        let closest = find_closest(&candidates, &around, &res(), false, None).unwrap();
        assert_eq!(closest.x, 1.0);
    }

    #[test]
    fn find_closest_respects_max_distance() {
        let candidates = vec![p(5.0, 0)];
        let around = p(0.0, 0);
        assert!(find_closest(&candidates, &around, &res(), false, Some(1.0)).is_none());
    }

    #[test]
    fn find_closest_n_returns_sorted_bounded_buffer() {
        let candidates = vec![p(5.0, 0), p(1.0, 0), p(3.0, 0), p(10.0, 0)];
        let around = p(0.0, 0);
        let closest = find_closest_n(&candidates, &around, 2, &res(), None, true);
        assert_eq!(closest.len(), 2);
        assert_eq!(closest[0].x, 1.0);
        assert_eq!(closest[1].x, 3.0);
    }

    #[test]
    fn find_close_scales_with_tolerance() {
        let candidates = vec![p(1.0, 0), p(1.5, 0), p(10.0, 0)];
        let around = p(0.0, 0);
        let close = find_close(&candidates, &around, 2.0, &res(), 10, None);
        assert_eq!(close.len(), 2);
    }

    #[test]
    fn make_nearby_graph_connects_k_nearest() {
        let positions = vec![p(0.0, 0), p(1.0, 0), p(2.0, 0), p(3.0, 0)];
        let graph = make_nearby_graph(&positions, 1, &res());
        assert_eq!(graph.find_connections(&p(1.0, 0)).len(), 1);
    }
}
