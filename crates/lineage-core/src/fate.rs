//! Cell-cycle and fate analyses (C13).

use crate::geometry::Position;
use crate::links::Links;
use crate::metadata::{DataValue, PositionData};
use crate::track::TrackId;

/// Outcome of following a track forward from a given position.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CellFate {
    Unknown,
    JustMoving,
    WillDivide,
    WillDie,
    WillShed,
}

/// Accumulated fate counts across a lineage subtree.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LineageFateCounts {
    pub divisions: u32,
    pub deaths: u32,
    pub sheds: u32,
    pub errors: u32,
    pub lineage_ends: u32,
}

fn end_marker(position_data: &PositionData, pos: &Position) -> Option<String> {
    match position_data.get(pos, "ending") {
        Some(DataValue::Str(s)) => Some(s.clone()),
        _ => None,
    }
}

fn has_error(position_data: &PositionData, pos: &Position) -> bool {
    position_data.get(pos, "error").is_some()
}

/// Age of `pos` within its lineage: the position's index within its own
/// track plus the summed lengths of ancestor tracks back to the last
/// division. `None` if the lineage can't be traced that far (a track with
/// no previous tracks starting exactly at `pos`'s track is still a valid,
/// fully-known age of just the local index).
pub fn age_in_time_points(links: &Links, pos: &Position) -> Option<i32> {
    let track_id = links.get_track(pos)?;
    let track = links.track_of(track_id);
    let local_index = track.index_of(pos)? as i32;

    let mut age = local_index;
    let mut current_id = track_id;
    loop {
        let current = links.track_of(current_id);
        if current.prev.len() != 1 {
            break;
        }
        let prev_id = current.prev[0];
        let prev = links.track_of(prev_id);
        if prev.next.len() != 1 {
            // The mother divided to produce this track: age resets here.
            break;
        }
        age += prev.len() as i32;
        current_id = prev_id;
    }
    Some(age)
}

/// Walks forward from `pos` along its track and divisions to determine its
/// fate, per §4.13: a track ending in `DEAD` dies; ending in `SHED` is
/// shed; ending with no marker but followed for at least
/// `lookahead_time_points` is just moving; followed too little is
/// unknown; two or more next tracks from the end position means the
/// position will divide.
pub fn fate(links: &Links, position_data: &PositionData, pos: &Position, lookahead_time_points: i32) -> CellFate {
    let Some(track_id) = links.get_track(pos) else { return CellFate::Unknown };
    let track = links.track_of(track_id);
    let Some(idx) = track.index_of(pos) else { return CellFate::Unknown };

    let followed = (track.len() - 1 - idx) as i32;
    let end_pos = track.last_position();

    if track.next.len() >= 2 {
        return CellFate::WillDivide;
    }

    if track.next.is_empty() {
        return match end_marker(position_data, &end_pos).as_deref() {
            Some("dead") => CellFate::WillDie,
            Some("shed") => CellFate::WillShed,
            _ => {
                if followed >= lookahead_time_points {
                    CellFate::JustMoving
                } else {
                    CellFate::Unknown
                }
            }
        };
    }

    // Track continues into exactly one successor: recurse, accounting for
    // the time points already followed within this track.
    let next_track = links.track_of(track.next[0]);
    let remaining_lookahead = lookahead_time_points - followed;
    if remaining_lookahead <= 0 {
        return CellFate::JustMoving;
    }
    fate(links, position_data, &next_track.first_position(), remaining_lookahead)
}

/// Accumulates fate-derived statistics across the subtree rooted at
/// `root`. `last_time_point_number` is the last time point the data
/// actually covers: a track that stops there simply ran out of observed
/// data and is not counted as a real lineage end.
pub fn lineage_fate(
    links: &Links,
    position_data: &PositionData,
    root: TrackId,
    last_time_point_number: i32,
) -> LineageFateCounts {
    let mut counts = LineageFateCounts::default();
    let mut stack = vec![root];
    while let Some(track_id) = stack.pop() {
        let track = links.track_of(track_id);
        for pos in &track.positions {
            if has_error(position_data, pos) {
                counts.errors += 1;
            }
        }
        if track.next.len() >= 2 {
            counts.divisions += 1;
            for &n in &track.next {
                stack.push(n);
            }
        } else if track.next.is_empty() {
            let end_pos = track.last_position();
            match end_marker(position_data, &end_pos).as_deref() {
                Some("dead") => counts.deaths += 1,
                Some("shed") => counts.sheds += 1,
                _ => {
                    let is_end = match end_pos.t {
                        Some(t) => t < last_time_point_number,
                        None => true,
                    };
                    if is_end {
                        counts.lineage_ends += 1;
                    }
                }
            }
        } else {
            stack.push(track.next[0]);
        }
    }
    counts
}

#[cfg(test)]
mod tests {
    use super::*;

    fn p(x: f64, t: i32) -> Position {
        Position::new(x, 0.0, 0.0, t)
    }

    #[test]
    fn age_in_time_points_counts_within_track() {
        let mut links = Links::new();
        for i in 0..4 {
            links.add_link(p(0.0, i), p(0.0, i + 1)).unwrap();
        }
        assert_eq!(age_in_time_points(&links, &p(0.0, 4)), Some(4));
    }

    #[test]
    fn fate_detects_division() {
        let mut links = Links::new();
        links.add_link(p(0.0, 0), p(0.0, 1)).unwrap();
        links.add_link(p(0.0, 1), p(1.0, 2)).unwrap();
        links.add_link(p(0.0, 1), p(2.0, 2)).unwrap();
        let data = PositionData::new();
        assert_eq!(fate(&links, &data, &p(0.0, 0), 10), CellFate::WillDivide);
    }

    #[test]
    fn fate_detects_death_marker() {
        let mut links = Links::new();
        links.add_link(p(0.0, 0), p(0.0, 1)).unwrap();
        let mut data = PositionData::new();
        data.set(p(0.0, 1), "ending", Some(DataValue::Str("dead".to_string()))).unwrap();
        assert_eq!(fate(&links, &data, &p(0.0, 0), 10), CellFate::WillDie);
    }

    #[test]
    fn fate_unknown_when_lookahead_too_short() {
        let mut links = Links::new();
        links.add_link(p(0.0, 0), p(0.0, 1)).unwrap();
        let data = PositionData::new();
        assert_eq!(fate(&links, &data, &p(0.0, 0), 10), CellFate::Unknown);
    }

    #[test]
    fn lineage_fate_counts_divisions_and_ends() {
        let mut links = Links::new();
        links.add_link(p(0.0, 0), p(0.0, 1)).unwrap();
        links.add_link(p(0.0, 1), p(1.0, 2)).unwrap();
        links.add_link(p(0.0, 1), p(2.0, 2)).unwrap();
        let data = PositionData::new();
        let root = links.get_track(&p(0.0, 0)).unwrap();
        let counts = lineage_fate(&links, &data, root, 10);
        assert_eq!(counts.divisions, 1);
        assert_eq!(counts.lineage_ends, 2);
    }

    #[test]
    fn lineage_fate_ignores_ends_at_the_last_observed_time_point() {
        let mut links = Links::new();
        links.add_link(p(0.0, 0), p(0.0, 1)).unwrap();
        let data = PositionData::new();
        let root = links.get_track(&p(0.0, 0)).unwrap();
        // The track stops at t=1, which is also the last time point we
        // have data for: this isn't a real lineage end, just missing data.
        let counts = lineage_fate(&links, &data, root, 1);
        assert_eq!(counts.lineage_ends, 0);
    }
}
