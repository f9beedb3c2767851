//! Error detector (C9): scans every position and flags biologically
//! implausible configurations, in the exact top-down priority order below
//! (first match wins).

use crate::connections::Connections;
use crate::experiment::Experiment;
use crate::fate::age_in_time_points;
use crate::geometry::{ImageResolution, Position};
use crate::links::Links;
use crate::metadata::{DataValue, PositionData};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PositionError {
    UncertainPosition,
    TooManyDaughterCells,
    NoFuturePosition,
    LowMotherScore,
    YoungMother,
    NoPastPosition,
    CellMerge,
    ShrunkALot,
    MovedTooFast,
}

impl PositionError {
    pub fn as_str(&self) -> &'static str {
        match self {
            PositionError::UncertainPosition => "UNCERTAIN_POSITION",
            PositionError::TooManyDaughterCells => "TOO_MANY_DAUGHTER_CELLS",
            PositionError::NoFuturePosition => "NO_FUTURE_POSITION",
            PositionError::LowMotherScore => "LOW_MOTHER_SCORE",
            PositionError::YoungMother => "YOUNG_MOTHER",
            PositionError::NoPastPosition => "NO_PAST_POSITION",
            PositionError::CellMerge => "CELL_MERGE",
            PositionError::ShrunkALot => "SHRUNK_A_LOT",
            PositionError::MovedTooFast => "MOVED_TOO_FAST",
        }
    }
}

const YOUNG_MOTHER_AGE_HOURS: f64 = 10.0;
const SHRUNK_VOLUME_RATIO: f64 = 2.0;
const MOVED_TOO_FAST_UM: f64 = 10.0;
const WINDOW: usize = 5;

fn volume_of(position_data: &PositionData, pos: &Position) -> Option<f64> {
    match position_data.get(pos, "intensity_volume") {
        Some(DataValue::Float(v)) => Some(*v),
        Some(DataValue::Int(v)) => Some(*v as f64),
        _ => None,
    }
}

fn mother_score_of(position_data: &PositionData, pos: &Position) -> f64 {
    match position_data.get(pos, "mother_score") {
        Some(DataValue::Float(v)) => *v,
        Some(DataValue::Int(v)) => *v as f64,
        _ => 0.0,
    }
}

fn end_marker(position_data: &PositionData, pos: &Position) -> Option<String> {
    match position_data.get(pos, "ending") {
        Some(DataValue::Str(s)) => Some(s.clone()),
        _ => None,
    }
}

fn start_marker(position_data: &PositionData, pos: &Position) -> Option<String> {
    match position_data.get(pos, "starting") {
        Some(DataValue::Str(s)) => Some(s.clone()),
        _ => None,
    }
}

fn is_uncertain(position_data: &PositionData, pos: &Position) -> bool {
    matches!(position_data.get(pos, "uncertain"), Some(DataValue::Bool(true)))
}

/// Mean volume over up to `WINDOW` positions walking strictly backward (or
/// forward) along a single-predecessor/single-successor chain starting at
/// (and including) `pos`. Stops early at a branch or track boundary.
fn windowed_mean_volume(links: &Links, position_data: &PositionData, pos: &Position, forward: bool) -> Option<f64> {
    let mut values = Vec::with_capacity(WINDOW);
    let mut current = *pos;
    loop {
        if let Some(v) = volume_of(position_data, &current) {
            values.push(v);
        }
        if values.len() >= WINDOW {
            break;
        }
        let neighbors = if forward { links.find_futures(&current) } else { links.find_pasts(&current) };
        if neighbors.len() != 1 {
            break;
        }
        current = *neighbors.iter().next().unwrap();
    }
    if values.is_empty() {
        None
    } else {
        Some(values.iter().sum::<f64>() / values.len() as f64)
    }
}

/// Evaluates the error rules for a single position and returns the raw
/// (unsuppressed) error, if any.
pub fn detect_error(
    links: &Links,
    position_data: &PositionData,
    _connections: &Connections,
    res: &ImageResolution,
    pos: &Position,
    first_t: i32,
    last_t: i32,
) -> Option<PositionError> {
    if is_uncertain(position_data, pos) {
        return Some(PositionError::UncertainPosition);
    }

    let futures = links.find_futures(pos);
    let pasts = links.find_pasts(pos);
    let t = pos.t?;

    if futures.len() > 2 {
        return Some(PositionError::TooManyDaughterCells);
    }
    if futures.is_empty() && t < last_t && end_marker(position_data, pos).is_none() {
        return Some(PositionError::NoFuturePosition);
    }
    if futures.len() == 2 {
        let mother_score = mother_score_of(position_data, pos);
        if mother_score <= 0.0 {
            return Some(PositionError::LowMotherScore);
        }
        if let Some(age) = age_in_time_points(links, pos) {
            let age_hours = age as f64 * res.time_point_interval_minutes / 60.0;
            if age_hours <= YOUNG_MOTHER_AGE_HOURS {
                return Some(PositionError::YoungMother);
            }
        }
    }
    if pasts.is_empty() && t > first_t && start_marker(position_data, pos).is_none() {
        return Some(PositionError::NoPastPosition);
    }
    if pasts.len() >= 2 {
        return Some(PositionError::CellMerge);
    }
    if pasts.len() == 1 {
        let past = *pasts.iter().next().unwrap();
        if let (Some(past_volume), Some(current_volume)) =
            (volume_of(position_data, &past), volume_of(position_data, pos))
        {
            if current_volume > 0.0 && past_volume / current_volume > SHRUNK_VOLUME_RATIO {
                let past_mean = windowed_mean_volume(links, position_data, &past, false);
                let next_mean = windowed_mean_volume(links, position_data, pos, true);
                if let (Some(pm), Some(nm)) = (past_mean, next_mean) {
                    if nm > 0.0 && pm / nm > SHRUNK_VOLUME_RATIO {
                        return Some(PositionError::ShrunkALot);
                    }
                }
            }
        }
        let distance = past.distance_um(pos, res);
        let end = end_marker(position_data, pos);
        let excused = matches!(end.as_deref(), Some("dead") | Some("shed"));
        if distance > MOVED_TOO_FAST_UM && !excused {
            return Some(PositionError::MovedTooFast);
        }
    }

    None
}

/// Re-scans every position of `experiment` and writes (or clears) the
/// `error` metadata slot. A position whose `suppressed_error` equals the
/// freshly-detected error's name keeps the raw marker but is not reported
/// by [`crate::experiment::Experiment`] query helpers built atop this.
///
/// The per-position rule evaluation only reads `links`/`position_data`, so
/// with the `rayon` feature enabled the scan itself runs across a thread
/// pool; the results are applied back sequentially afterward.
pub fn scan_experiment(experiment: &mut Experiment) {
    let Some(first_t) = experiment.positions.first_t() else { return };
    let Some(last_t) = experiment.positions.last_t() else { return };
    let resolution = experiment.resolution.unwrap_or(ImageResolution {
        px_x_um: 1.0,
        px_y_um: 1.0,
        px_z_um: 1.0,
        time_point_interval_minutes: 1.0,
    });

    let all_positions: Vec<Position> = experiment.positions.iter().copied().collect();
    let findings = evaluate_all(
        &experiment.links,
        experiment.links.position_data(),
        &experiment.connections,
        &resolution,
        &all_positions,
        first_t,
        last_t,
    );

    for (pos, found) in all_positions.into_iter().zip(findings) {
        match found {
            Some(err) => {
                let _ = experiment.set_position_data(
                    pos,
                    "error",
                    Some(DataValue::Str(err.as_str().to_string())),
                );
            }
            None => {
                let _ = experiment.set_position_data(pos, "error", None);
            }
        }
    }
}

#[cfg(feature = "rayon")]
fn evaluate_all(
    links: &Links,
    position_data: &PositionData,
    connections: &Connections,
    res: &ImageResolution,
    positions: &[Position],
    first_t: i32,
    last_t: i32,
) -> Vec<Option<PositionError>> {
    use rayon::prelude::*;
    positions
        .par_iter()
        .map(|pos| detect_error(links, position_data, connections, res, pos, first_t, last_t))
        .collect()
}

#[cfg(not(feature = "rayon"))]
fn evaluate_all(
    links: &Links,
    position_data: &PositionData,
    connections: &Connections,
    res: &ImageResolution,
    positions: &[Position],
    first_t: i32,
    last_t: i32,
) -> Vec<Option<PositionError>> {
    positions
        .iter()
        .map(|pos| detect_error(links, position_data, connections, res, pos, first_t, last_t))
        .collect()
}

/// Whether `pos` currently has a *reported* error: a raw error is present
/// and does not match the suppressed-error marker.
pub fn has_reported_error(position_data: &PositionData, pos: &Position) -> bool {
    let Some(DataValue::Str(error)) = position_data.get(pos, "error") else { return false };
    match position_data.get(pos, "suppressed_error") {
        Some(DataValue::Str(suppressed)) => suppressed != error,
        _ => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn p(x: f64, t: i32) -> Position {
        Position::new(x, 0.0, 0.0, t)
    }

    fn res() -> ImageResolution {
        ImageResolution::new(1.0, 1.0, 1.0, 10.0).unwrap()
    }

    #[test]
    fn cell_merge_detected_on_two_pasts() {
        let mut links = Links::new();
        links.add_link(p(0.0, 0), p(0.0, 1)).unwrap();
        links.add_link(p(0.0, 1), p(0.0, 2)).unwrap();
        links.add_link(p(10.0, 0), p(10.0, 1)).unwrap();
        links.add_link(p(10.0, 1), p(10.0, 2)).unwrap();
        links.add_link(p(0.0, 2), p(5.0, 3)).unwrap();
        links.add_link(p(10.0, 2), p(5.0, 3)).unwrap();

        let data = PositionData::new();
        let connections = Connections::new();
        let found = detect_error(&links, &data, &connections, &res(), &p(5.0, 3), 0, 4);
        assert_eq!(found, Some(PositionError::CellMerge));
    }

    #[test]
    fn too_many_daughters_detected() {
        let mut links = Links::new();
        links.add_link(p(0.0, 0), p(1.0, 1)).unwrap();
        links.add_link(p(0.0, 0), p(2.0, 1)).unwrap();
        links.add_link(p(0.0, 0), p(3.0, 1)).unwrap();

        let data = PositionData::new();
        let connections = Connections::new();
        let found = detect_error(&links, &data, &connections, &res(), &p(0.0, 0), 0, 2);
        assert_eq!(found, Some(PositionError::TooManyDaughterCells));
    }

    #[test]
    fn no_future_position_flagged_when_track_ends_early() {
        let mut links = Links::new();
        links.add_link(p(0.0, 0), p(0.0, 1)).unwrap();
        let data = PositionData::new();
        let connections = Connections::new();
        let found = detect_error(&links, &data, &connections, &res(), &p(0.0, 1), 0, 5);
        assert_eq!(found, Some(PositionError::NoFuturePosition));
    }

    #[test]
    fn uncertain_flag_wins_over_other_rules() {
        let mut links = Links::new();
        links.add_link(p(0.0, 0), p(1.0, 1)).unwrap();
        links.add_link(p(0.0, 0), p(2.0, 1)).unwrap();
        links.add_link(p(0.0, 0), p(3.0, 1)).unwrap();
        let mut data = PositionData::new();
        data.set(p(0.0, 0), "uncertain", Some(DataValue::Bool(true))).unwrap();
        let connections = Connections::new();
        let found = detect_error(&links, &data, &connections, &res(), &p(0.0, 0), 0, 2);
        assert_eq!(found, Some(PositionError::UncertainPosition));
    }

    #[test]
    fn moved_too_fast_excused_by_death_marker() {
        let mut links = Links::new();
        links.add_link(p(0.0, 0), p(100.0, 1)).unwrap();
        let mut data = PositionData::new();
        data.set(p(100.0, 1), "ending", Some(DataValue::Str("dead".to_string()))).unwrap();
        let connections = Connections::new();
        let found = detect_error(&links, &data, &connections, &res(), &p(100.0, 1), 0, 1);
        assert_ne!(found, Some(PositionError::MovedTooFast));
    }
}
