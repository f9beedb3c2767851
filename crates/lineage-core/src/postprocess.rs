//! Post-processors (C12): edge-of-view cleanup, spur removal, and
//! camera-motion annotation. These run once over a fully-linked experiment,
//! typically right after the link selector (C8).

use crate::experiment::Experiment;
use crate::image::ImageOffset;
use crate::metadata::DataValue;

const SPUR_MAX_LENGTH: usize = 3;

/// Removes every position outside the image margin in xy. Before removal,
/// annotates the future-linked position (if any) with
/// `starting = goes_into_view` and the past-linked position with
/// `ending = out_of_view`.
pub fn remove_edge_positions(experiment: &mut Experiment, margin_xy: f64, margin_z: f64) {
    let candidates: Vec<_> = experiment
        .positions
        .iter()
        .copied()
        .filter(|pos| {
            let t = pos.t.unwrap_or(0);
            experiment
                .images
                .is_inside_image(pos.x, pos.y, pos.z, t, margin_xy, margin_z)
                .map(|inside| !inside)
                .unwrap_or(false)
        })
        .collect();

    for pos in candidates {
        for future in experiment.links.find_futures(&pos) {
            let _ = experiment.set_position_data(
                future,
                "starting",
                Some(DataValue::Str("goes_into_view".to_string())),
            );
        }
        for past in experiment.links.find_pasts(&pos) {
            let _ = experiment.set_position_data(
                past,
                "ending",
                Some(DataValue::Str("out_of_view".to_string())),
            );
        }
        let _ = experiment.remove_position(&pos);
    }
}

/// Deletes every starting track shorter than [`SPUR_MAX_LENGTH`] time
/// points that ends without a division — a short, unresolved thread that
/// is most likely a detection artifact rather than a real lineage.
pub fn remove_spurs(experiment: &mut Experiment) {
    let starting_tracks = experiment.links.find_starting_tracks();
    for track_id in starting_tracks {
        let track = experiment.links.track_of(track_id);
        if track.len() < SPUR_MAX_LENGTH && track.next.len() <= 1 {
            let positions: Vec<_> = track.positions.clone();
            for pos in positions {
                let _ = experiment.remove_position(&pos);
            }
        }
    }
}

/// When the per-time-point image offset changes between consecutive time
/// points, positions that fall outside the *other* time point's image
/// footprint are annotated with the same in/out-of-view markers edge
/// removal uses, without actually removing them (the camera moved, not
/// the cell).
pub fn annotate_camera_motion(experiment: &mut Experiment, margin_xy: f64, margin_z: f64) {
    let Some(first_t) = experiment.positions.first_t() else { return };
    let Some(last_t) = experiment.positions.last_t() else { return };

    for t in first_t..last_t {
        let offset_here: ImageOffset = experiment.images.offset(t);
        let offset_next: ImageOffset = experiment.images.offset(t + 1);
        if offset_here == offset_next {
            continue;
        }

        let positions_here: Vec<_> = experiment.positions.of_time_point(t).copied().collect();
        for pos in positions_here {
            let inside_next =
                experiment.images.is_inside_image(pos.x, pos.y, pos.z, t + 1, margin_xy, margin_z);
            if inside_next == Some(false) {
                let _ = experiment.set_position_data(
                    pos,
                    "ending",
                    Some(DataValue::Str("out_of_view".to_string())),
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::Position;

    fn p(x: f64, t: i32) -> Position {
        Position::new(x, 0.0, 0.0, t)
    }

    #[test]
    fn remove_spurs_deletes_short_undivided_tracks() {
        let mut exp = Experiment::new("test");
        exp.links.add_link(p(0.0, 0), p(0.0, 1)).unwrap();
        exp.positions.add(p(0.0, 0)).unwrap();
        exp.positions.add(p(0.0, 1)).unwrap();

        remove_spurs(&mut exp);
        assert!(exp.links.get_track(&p(0.0, 0)).is_none());
    }

    #[test]
    fn remove_spurs_keeps_long_tracks() {
        let mut exp = Experiment::new("test");
        for i in 0..5 {
            exp.links.add_link(p(0.0, i), p(0.0, i + 1)).unwrap();
            exp.positions.add(p(0.0, i)).unwrap();
        }
        exp.positions.add(p(0.0, 5)).unwrap();

        remove_spurs(&mut exp);
        assert!(exp.links.get_track(&p(0.0, 0)).is_some());
    }

    #[test]
    fn remove_spurs_keeps_tracks_ending_in_division() {
        let mut exp = Experiment::new("test");
        exp.links.add_link(p(0.0, 0), p(1.0, 1)).unwrap();
        exp.links.add_link(p(0.0, 0), p(2.0, 1)).unwrap();
        exp.positions.add(p(0.0, 0)).unwrap();
        exp.positions.add(p(1.0, 1)).unwrap();
        exp.positions.add(p(2.0, 1)).unwrap();

        remove_spurs(&mut exp);
        assert!(exp.links.get_track(&p(0.0, 0)).is_some());
    }
}
