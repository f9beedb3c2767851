//! The `Experiment` aggregate (C7): owns every per-experiment store and
//! exposes the operations that cut across them (position removal, merging
//! two experiments, first/last time point bookkeeping).

use crate::connections::Connections;
use crate::error::{LineageError, Result};
use crate::geometry::{ImageResolution, Position};
use crate::image::ImageFacade;
use crate::links::Links;
use crate::metadata::{DataValue, PositionData};
use crate::position_store::PositionCollection;

/// Default look-ahead horizon (in time points) used when building a
/// lineage tree preview.
pub const DEFAULT_LINEAGE_LOOKAHEAD: i32 = 80;

/// Owns every per-experiment store except position/link metadata, which
/// lives on [`Links`] (its sole owner, per C4) — `Experiment::position_data`
/// delegates there rather than keeping a second, separately-populated copy.
#[derive(Debug)]
pub struct Experiment {
    pub name: String,
    pub positions: PositionCollection,
    pub links: Links,
    pub connections: Connections,
    pub resolution: Option<ImageResolution>,
    pub images: ImageFacade,
    pub lineage_lookahead_time_points: i32,
}

impl Default for Experiment {
    fn default() -> Self {
        Experiment {
            name: String::new(),
            positions: PositionCollection::new(),
            links: Links::new(),
            connections: Connections::new(),
            resolution: None,
            images: ImageFacade::empty(),
            lineage_lookahead_time_points: DEFAULT_LINEAGE_LOOKAHEAD,
        }
    }
}

impl Experiment {
    pub fn new(name: impl Into<String>) -> Self {
        Experiment { name: name.into(), ..Default::default() }
    }

    /// Removes `pos` from every store that can reference it. Splines are
    /// out of scope for the core; a caller integrating a spline-origin
    /// updater should do so after this returns (see
    /// [`Experiment::remove_position`] doc).
    ///
    /// `Links::remove_position` already drops the position's and its
    /// adjacent links' metadata, since [`Links`] is the sole owner of that
    /// store (see [`Experiment::position_data`]).
    pub fn remove_position(&mut self, pos: &Position) -> Result<()> {
        self.positions.remove(pos)?;
        self.links.remove_position(pos)?;
        self.connections.remove_connections_of(pos);
        Ok(())
    }

    pub fn move_position(&mut self, old: &Position, new: Position) -> Result<()> {
        let old_t = old.require_t()?;
        let new_t = new.require_t()?;
        if old_t != new_t {
            return Err(LineageError::TimePointMismatch { expected: old_t, actual: new_t });
        }
        self.positions.move_position(old, new)?;
        self.links.replace_position(old, new)?;
        Ok(())
    }

    /// Read-only view of the position metadata store. [`Links`] is the
    /// sole owner (C4 delegates to C3 with the extra `name == "id"` rule);
    /// this accessor exists so callers reading `Experiment` don't need to
    /// reach into `experiment.links` directly.
    pub fn position_data(&self) -> &PositionData {
        self.links.position_data()
    }

    /// Sets (or, with `value = None`, clears) a position metadata entry,
    /// delegating to [`Links::set_position_data`].
    pub fn set_position_data(
        &mut self,
        pos: Position,
        name: &str,
        value: Option<DataValue>,
    ) -> Result<()> {
        self.links.set_position_data(pos, name, value)
    }

    /// Minimum time point across positions and images, whichever are
    /// populated.
    pub fn first_time_point_number(&self) -> Option<i32> {
        [self.positions.first_t(), self.images.first_time_point()].into_iter().flatten().min()
    }

    pub fn last_time_point_number(&self) -> Option<i32> {
        [self.positions.last_t(), self.images.last_time_point()].into_iter().flatten().max()
    }

    /// Merges `other` into `self`. Positions, position data, links and
    /// connections are unioned. If resolutions differ, `other` is rescaled
    /// (xy, then implicitly z) to match `self`'s resolution first; a time
    /// scale (`time_point_interval_minutes`) difference beyond 10% is
    /// rejected.
    ///
    /// Order of operations (an explicit choice where the source material
    /// was ambiguous): rescale `other` fully, then union every store, then
    /// the caller recomputes any spline origins (out of core scope).
    pub fn merge(&mut self, other: &Experiment) -> Result<()> {
        let factor = match (&self.resolution, &other.resolution) {
            (Some(ours), Some(theirs)) => {
                let scale_ratio = if ours.time_point_interval_minutes > 0.0 {
                    theirs.time_point_interval_minutes / ours.time_point_interval_minutes
                } else {
                    1.0
                };
                if (scale_ratio - 1.0).abs() > 0.10 {
                    return Err(LineageError::ScaleMismatch {
                        ours: ours.time_point_interval_minutes,
                        theirs: theirs.time_point_interval_minutes,
                    });
                }
                if ours.px_x_um > 0.0 { theirs.px_x_um / ours.px_x_um } else { 1.0 }
            }
            _ => 1.0,
        };

        let rescale = |p: &Position| -> Position {
            if (factor - 1.0).abs() < f64::EPSILON {
                *p
            } else {
                Position { x: p.x * factor, y: p.y * factor, z: p.z * factor, t: p.t }
            }
        };

        for p in other.positions.iter() {
            let _ = self.positions.add(rescale(p));
        }
        self.links = merge_links(&self.links, &other.links, &rescale);
        for link in other.connections_edges() {
            let _ = self.connections.add(rescale(&link.0), rescale(&link.1));
        }
        Ok(())
    }

    fn connections_edges(&self) -> Vec<(Position, Position)> {
        // Connections doesn't expose a flat edge iterator; reconstructed
        // here from per-time-point positions for merge purposes only.
        let mut out = Vec::new();
        for t in self.positions.time_points() {
            for p in self.positions.of_time_point(t) {
                for n in self.connections.find_connections(p) {
                    out.push((*p, n));
                }
            }
        }
        out
    }

    pub fn copy(&self) -> Self {
        Experiment {
            name: self.name.clone(),
            positions: self.positions.copy(),
            links: self.links.copy(),
            connections: self.connections.copy(),
            resolution: self.resolution,
            images: ImageFacade::empty(),
            lineage_lookahead_time_points: self.lineage_lookahead_time_points,
        }
    }
}

/// Unions two lineage graphs by replaying every link of `other` (rescaled)
/// into a copy of `ours`, then replaying `other`'s position/link metadata
/// (`Links` is the sole owner of both, see [`Experiment::position_data`]).
/// Simpler than reconstructing arenas directly and keeps every invariant
/// enforced by `add_link`/`set_position_data`/`set_link_data` themselves.
fn merge_links(ours: &Links, other: &Links, rescale: &dyn Fn(&Position) -> Position) -> Links {
    let mut merged = ours.copy();
    for (a, b) in other.find_all_links() {
        let _ = merged.add_link(rescale(&a), rescale(&b));
    }
    for name in other.position_data().names() {
        for (pos, value) in other.position_data().of_name(name) {
            let _ = merged.set_position_data(rescale(pos), name, Some(value.clone()));
        }
    }
    for name in other.link_data().names() {
        for (key, value) in other.link_data().of_name(name) {
            let _ = merged.set_link_data(
                rescale(key.earlier()),
                rescale(key.later()),
                name,
                Some(value.clone()),
            );
        }
    }
    merged
}
