//! Spatial position store (C2): all positions of an experiment, indexed by
//! `(t, round(z))` so z-slice and time-point scans don't walk the whole set.

use std::collections::{HashMap, HashSet};

use crate::error::{LineageError, Result};
use crate::geometry::Position;

/// A set of positions, bucketed by time point and rounded z for fast
/// slice/time-point iteration. Every stored position must have a defined
/// time point.
#[derive(Debug, Clone, Default)]
pub struct PositionCollection {
    by_time_point: HashMap<i32, HashSet<Position>>,
    by_z: HashMap<i64, HashSet<Position>>,
    len: usize,
}

impl PositionCollection {
    pub fn new() -> Self {
        PositionCollection::default()
    }

    fn z_bucket(pos: &Position) -> i64 {
        pos.z.round() as i64
    }

    /// Adds a position. Requires the position to carry a time point.
    /// Adding an already-present position is a no-op.
    pub fn add(&mut self, pos: Position) -> Result<()> {
        let t = pos.require_t()?;
        let inserted = self.by_time_point.entry(t).or_default().insert(pos);
        if inserted {
            self.by_z.entry(Self::z_bucket(&pos)).or_default().insert(pos);
            self.len += 1;
        }
        Ok(())
    }

    /// Removes a position. Returns whether it was present. Cleans up empty
    /// time-point and z buckets.
    pub fn remove(&mut self, pos: &Position) -> Result<bool> {
        let t = pos.require_t()?;
        let removed = if let Some(set) = self.by_time_point.get_mut(&t) {
            let removed = set.remove(pos);
            if set.is_empty() {
                self.by_time_point.remove(&t);
            }
            removed
        } else {
            false
        };
        if removed {
            let z = Self::z_bucket(pos);
            if let Some(set) = self.by_z.get_mut(&z) {
                set.remove(pos);
                if set.is_empty() {
                    self.by_z.remove(&z);
                }
            }
            self.len -= 1;
        }
        Ok(removed)
    }

    pub fn contains(&self, pos: &Position) -> bool {
        match pos.t {
            Some(t) => self.by_time_point.get(&t).map(|s| s.contains(pos)).unwrap_or(false),
            None => false,
        }
    }

    /// Moves a position in place; the time point must be unchanged.
    pub fn move_position(&mut self, old: &Position, new: Position) -> Result<()> {
        let old_t = old.require_t()?;
        let new_t = new.require_t()?;
        if old_t != new_t {
            return Err(LineageError::TimePointMismatch { expected: old_t, actual: new_t });
        }
        self.remove(old)?;
        self.add(new)?;
        Ok(())
    }

    pub fn of_time_point(&self, t: i32) -> impl Iterator<Item = &Position> {
        self.by_time_point.get(&t).into_iter().flatten()
    }

    /// Positions whose rounded z equals `round(z)`, across all time points.
    pub fn nearby_z(&self, z: f64) -> impl Iterator<Item = &Position> {
        self.by_z.get(&(z.round() as i64)).into_iter().flatten()
    }

    pub fn first_t(&self) -> Option<i32> {
        self.by_time_point.keys().copied().min()
    }

    pub fn last_t(&self) -> Option<i32> {
        self.by_time_point.keys().copied().max()
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn time_points(&self) -> impl Iterator<Item = i32> + '_ {
        let mut ts: Vec<i32> = self.by_time_point.keys().copied().collect();
        ts.sort_unstable();
        ts.into_iter()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Position> {
        self.by_time_point.values().flatten()
    }

    /// Deep copy; positions are `Copy`, so this is a structural clone of
    /// the indices.
    pub fn copy(&self) -> Self {
        self.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn add_and_query_by_time_point() {
        let mut store = PositionCollection::new();
        store.add(Position::new(1.0, 1.0, 1.0, 0)).unwrap();
        store.add(Position::new(2.0, 2.0, 2.0, 0)).unwrap();
        store.add(Position::new(3.0, 3.0, 3.0, 1)).unwrap();

        assert_eq!(store.of_time_point(0).count(), 2);
        assert_eq!(store.of_time_point(1).count(), 1);
        assert_eq!(store.len(), 3);
        assert_eq!(store.first_t(), Some(0));
        assert_eq!(store.last_t(), Some(1));
    }

    #[test]
    fn remove_cleans_up_empty_buckets() {
        let mut store = PositionCollection::new();
        let p = Position::new(1.0, 1.0, 1.0, 5);
        store.add(p).unwrap();
        assert!(store.remove(&p).unwrap());
        assert_eq!(store.first_t(), None);
        assert_eq!(store.last_t(), None);
        assert_eq!(store.len(), 0);
        assert!(!store.remove(&p).unwrap());
    }

    #[test]
    fn removing_boundary_position_recomputes_first_last() {
        let mut store = PositionCollection::new();
        store.add(Position::new(0.0, 0.0, 0.0, 0)).unwrap();
        store.add(Position::new(0.0, 0.0, 0.0, 1)).unwrap();
        store.add(Position::new(0.0, 0.0, 0.0, 2)).unwrap();
        store.remove(&Position::new(0.0, 0.0, 0.0, 2)).unwrap();
        assert_eq!(store.last_t(), Some(1));
    }

    #[test]
    fn move_requires_same_time_point() {
        let mut store = PositionCollection::new();
        let p = Position::new(0.0, 0.0, 0.0, 0);
        store.add(p).unwrap();
        let bad = Position::new(1.0, 1.0, 1.0, 1);
        assert!(store.move_position(&p, bad).is_err());
    }

    #[test]
    fn nearby_z_buckets_by_rounded_z() {
        let mut store = PositionCollection::new();
        store.add(Position::new(0.0, 0.0, 5.4, 0)).unwrap();
        store.add(Position::new(1.0, 1.0, 5.2, 1)).unwrap();
        assert_eq!(store.nearby_z(5.3).count(), 2);
    }

    #[test]
    fn copy_is_independent() {
        let mut store = PositionCollection::new();
        store.add(Position::new(0.0, 0.0, 0.0, 0)).unwrap();
        let copy = store.copy();
        store.add(Position::new(1.0, 1.0, 1.0, 1)).unwrap();
        assert_eq!(copy.len(), 1);
        assert_eq!(store.len(), 2);
    }
}
