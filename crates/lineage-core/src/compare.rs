//! Comparison engine (C10): scores one tracking result ("scratch") against
//! a ground truth, producing precision/recall/F1 for detections and links.

use std::collections::HashSet;

use crate::geometry::{ImageResolution, Position};
use crate::links::Links;
use crate::neighbor::find_closest;
use crate::position_store::PositionCollection;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Counts {
    pub true_positives: u32,
    pub false_positives: u32,
    pub false_negatives: u32,
}

impl Counts {
    pub fn precision(&self) -> f64 {
        ratio(self.true_positives, self.true_positives + self.false_positives)
    }

    pub fn recall(&self) -> f64 {
        ratio(self.true_positives, self.true_positives + self.false_negatives)
    }

    pub fn f1(&self) -> f64 {
        let p = self.precision();
        let r = self.recall();
        if p + r == 0.0 { 0.0 } else { 2.0 * p * r / (p + r) }
    }

    fn merge(&mut self, other: &Counts) {
        self.true_positives += other.true_positives;
        self.false_positives += other.false_positives;
        self.false_negatives += other.false_negatives;
    }
}

fn ratio(numerator: u32, denominator: u32) -> f64 {
    if denominator == 0 {
        0.0
    } else {
        numerator as f64 / denominator as f64
    }
}

#[derive(Debug, Clone, Default)]
pub struct PositionsComparisonReport {
    pub overall: Counts,
    pub rejected: u32,
    pub by_time_point: std::collections::BTreeMap<i32, Counts>,
}

/// Compares detected positions to ground truth: every ground-truth
/// position is matched to its closest unclaimed scratch position within
/// `max_distance_um`; leftover scratch positions within
/// `rejection_distance_um` of some ground-truth position are false
/// positives, further ones are rejected (outside the annotated region).
pub fn compare_positions(
    ground_truth: &PositionCollection,
    scratch: &PositionCollection,
    res: &ImageResolution,
    max_distance_um: f64,
    rejection_distance_um: f64,
) -> PositionsComparisonReport {
    let mut report = PositionsComparisonReport::default();

    let time_points: Vec<i32> = {
        let mut ts: HashSet<i32> = ground_truth.time_points().collect();
        ts.extend(scratch.time_points());
        let mut v: Vec<i32> = ts.into_iter().collect();
        v.sort_unstable();
        v
    };

    for t in time_points {
        let mut remaining: Vec<Position> = scratch.of_time_point(t).copied().collect();
        let mut counts = Counts::default();

        for g in ground_truth.of_time_point(t) {
            match find_closest(&remaining, g, res, false, Some(max_distance_um)) {
                Some(&matched) => {
                    remaining.retain(|p| p != &matched);
                    counts.true_positives += 1;
                }
                None => counts.false_negatives += 1,
            }
        }

        let gt_positions: Vec<Position> = ground_truth.of_time_point(t).copied().collect();
        for s in remaining {
            match find_closest(&gt_positions, &s, res, false, Some(rejection_distance_um)) {
                Some(_) => counts.false_positives += 1,
                None => report.rejected += 1,
            }
        }

        report.overall.merge(&counts);
        report.by_time_point.insert(t, counts);
    }

    report
}

#[derive(Debug, Clone, Default)]
pub struct LinksComparisonReport {
    pub overall: Counts,
    pub rejected: u32,
    pub by_time_point: std::collections::BTreeMap<i32, Counts>,
}

/// Compares two lineage graphs' links. For every ground-truth link, finds
/// candidate scratch positions near each endpoint and checks whether a
/// matching, not-yet-consumed scratch link exists; the symmetric pass over
/// scratch links yields false positives and rejects.
pub fn compare_links(
    ground_truth: &Links,
    scratch: &Links,
    ground_truth_positions: &PositionCollection,
    scratch_positions: &PositionCollection,
    res: &ImageResolution,
    max_distance_um: f64,
) -> LinksComparisonReport {
    let mut report = LinksComparisonReport::default();
    let mut consumed: HashSet<(Position, Position)> = HashSet::new();

    let gt_links = ground_truth.find_all_links();
    for (g1, g2) in &gt_links {
        let t = g1.t.unwrap_or(0);
        let counts_entry = report.by_time_point.entry(t).or_insert_with(Counts::default);

        let scratch_near_1 = nearest_n(scratch_positions, g1, res, max_distance_um, 3);
        let scratch_near_2 = nearest_n(scratch_positions, g2, res, max_distance_um, 3);

        let mut matched = false;
        for &s1 in &scratch_near_1 {
            for &s2 in &scratch_near_2 {
                if consumed.contains(&(s1, s2)) {
                    continue;
                }
                if scratch.contains_link(&s1, &s2) {
                    consumed.insert((s1, s2));
                    matched = true;
                    break;
                }
            }
            if matched {
                break;
            }
        }

        if matched {
            counts_entry.true_positives += 1;
        } else {
            counts_entry.false_negatives += 1;
        }
    }

    let scratch_links = scratch.find_all_links();
    for (s1, s2) in &scratch_links {
        if consumed.contains(&(*s1, *s2)) {
            continue;
        }
        let t = s1.t.unwrap_or(0);
        let counts_entry = report.by_time_point.entry(t).or_insert_with(Counts::default);

        let gt_near_1 = nearest_n(ground_truth_positions, s1, res, max_distance_um, 3);
        let gt_near_2 = nearest_n(ground_truth_positions, s2, res, max_distance_um, 3);

        if gt_near_1.is_empty() || gt_near_2.is_empty() {
            report.rejected += 1;
            continue;
        }

        let mut matched = false;
        for &g1 in &gt_near_1 {
            for &g2 in &gt_near_2 {
                if ground_truth.contains_link(&g1, &g2) {
                    matched = true;
                    break;
                }
            }
            if matched {
                break;
            }
        }
        if !matched {
            counts_entry.false_positives += 1;
        }
    }

    for counts in report.by_time_point.values() {
        report.overall.merge(counts);
    }
    report
}

fn nearest_n(
    positions: &PositionCollection,
    around: &Position,
    res: &ImageResolution,
    max_um: f64,
    n: usize,
) -> Vec<Position> {
    let Some(t) = around.t else { return Vec::new() };
    let candidates: Vec<Position> = positions.of_time_point(t).copied().collect();
    crate::neighbor::find_closest_n(&candidates, around, n, res, Some(max_um), false)
        .into_iter()
        .copied()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn p(x: f64, y: f64, z: f64, t: i32) -> Position {
        Position::new(x, y, z, t)
    }

    fn res() -> ImageResolution {
        ImageResolution::new(1.0, 1.0, 1.0, 1.0).unwrap()
    }

    #[test]
    fn positions_comparison_counts_exact_match_as_tp() {
        let mut gt = PositionCollection::new();
        gt.add(p(10.0, 10.0, 5.0, 0)).unwrap();
        gt.add(p(10.0, 10.0, 5.0, 1)).unwrap();

        let mut scratch = PositionCollection::new();
        scratch.add(p(10.3, 10.0, 5.0, 0)).unwrap();
        scratch.add(p(10.0, 10.1, 5.0, 1)).unwrap();

        let report = compare_positions(&gt, &scratch, &res(), 5.0, 5.0);
        assert_eq!(report.overall.true_positives, 2);
        assert_eq!(report.overall.false_negatives, 0);
        assert_eq!(report.overall.false_positives, 0);
        assert_eq!(report.overall.f1(), 1.0);
    }

    #[test]
    fn links_comparison_matches_scenario_five() {
        let mut gt = PositionCollection::new();
        let g0 = p(10.0, 10.0, 5.0, 0);
        let g1 = p(10.0, 10.0, 5.0, 1);
        gt.add(g0).unwrap();
        gt.add(g1).unwrap();
        let mut gt_links = Links::new();
        gt_links.add_link(g0, g1).unwrap();

        let mut scratch = PositionCollection::new();
        let s0 = p(10.3, 10.0, 5.0, 0);
        let s1 = p(10.0, 10.1, 5.0, 1);
        scratch.add(s0).unwrap();
        scratch.add(s1).unwrap();
        let mut scratch_links = Links::new();
        scratch_links.add_link(s0, s1).unwrap();

        let report = compare_links(&gt_links, &scratch_links, &gt, &scratch, &res(), 5.0);
        assert_eq!(report.overall.true_positives, 1);
        assert_eq!(report.overall.false_negatives, 0);
        assert_eq!(report.overall.false_positives, 0);
        assert_eq!(report.overall.f1(), 1.0);
    }

    #[test]
    fn missed_detection_counts_as_false_negative() {
        let mut gt = PositionCollection::new();
        gt.add(p(0.0, 0.0, 0.0, 0)).unwrap();
        let scratch = PositionCollection::new();
        let report = compare_positions(&gt, &scratch, &res(), 5.0, 5.0);
        assert_eq!(report.overall.false_negatives, 1);
    }
}
