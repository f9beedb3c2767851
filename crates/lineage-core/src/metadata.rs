//! Per-position and per-link metadata stores (C3): two-level
//! `data_name -> (key -> value)` maps holding loosely-typed annotations
//! (error flags, mother scores, CTC ids, ...) alongside the positions and
//! links they describe.

use std::collections::HashMap;

use crate::error::{LineageError, Result};
use crate::geometry::Position;

/// A metadata value: a scalar or a homogeneous list of scalars. Kept as a
/// tagged variant (rather than, say, `serde_json::Value`) so integer vs.
/// float distinction survives a JSON round-trip.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(untagged)]
pub enum DataValue {
    Int(i64),
    Float(f64),
    Bool(bool),
    Str(String),
    List(Vec<DataValue>),
}

impl From<i64> for DataValue {
    fn from(v: i64) -> Self {
        DataValue::Int(v)
    }
}
impl From<f64> for DataValue {
    fn from(v: f64) -> Self {
        DataValue::Float(v)
    }
}
impl From<bool> for DataValue {
    fn from(v: bool) -> Self {
        DataValue::Bool(v)
    }
}
impl From<String> for DataValue {
    fn from(v: String) -> Self {
        DataValue::Str(v)
    }
}
impl From<&str> for DataValue {
    fn from(v: &str) -> Self {
        DataValue::Str(v.to_string())
    }
}

fn reject_reserved_name(name: &str) -> Result<()> {
    if name.starts_with("__") {
        return Err(LineageError::ReservedDataName(name.to_string()));
    }
    Ok(())
}

/// `data_name -> (position -> value)`.
#[derive(Debug, Clone, Default)]
pub struct PositionData {
    by_name: HashMap<String, HashMap<Position, DataValue>>,
}

impl PositionData {
    pub fn new() -> Self {
        PositionData::default()
    }

    pub fn get(&self, pos: &Position, name: &str) -> Option<&DataValue> {
        self.by_name.get(name)?.get(pos)
    }

    /// Sets (or, with `value = None`, clears) `name` on `pos`. Clearing the
    /// last entry for a name drops the outer map too.
    pub fn set(&mut self, pos: Position, name: &str, value: Option<DataValue>) -> Result<()> {
        reject_reserved_name(name)?;
        match value {
            Some(v) => {
                self.by_name.entry(name.to_string()).or_default().insert(pos, v);
            }
            None => {
                if let Some(map) = self.by_name.get_mut(name) {
                    map.remove(&pos);
                    if map.is_empty() {
                        self.by_name.remove(name);
                    }
                }
            }
        }
        Ok(())
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.by_name.keys().map(|s| s.as_str())
    }

    pub fn of_name(&self, name: &str) -> impl Iterator<Item = (&Position, &DataValue)> {
        self.by_name.get(name).into_iter().flat_map(|m| m.iter())
    }

    /// Moves every entry keyed by `old` to `new`, across all names.
    pub fn replace_position(&mut self, old: &Position, new: Position) {
        for map in self.by_name.values_mut() {
            if let Some(v) = map.remove(old) {
                map.insert(new, v);
            }
        }
    }

    pub fn remove_position(&mut self, pos: &Position) {
        for map in self.by_name.values_mut() {
            map.remove(pos);
        }
        self.by_name.retain(|_, m| !m.is_empty());
    }

    /// Overwrites entries from `other` on key collision.
    pub fn merge(&mut self, other: &PositionData) {
        for (name, map) in &other.by_name {
            let entry = self.by_name.entry(name.clone()).or_default();
            for (pos, value) in map {
                entry.insert(*pos, value.clone());
            }
        }
    }

    pub fn copy(&self) -> Self {
        self.clone()
    }
}

/// Canonical, order-independent identity of a link for use as a map key:
/// `(A, B)` and `(B, A)` hash and compare identically.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LinkKey(Position, Position);

impl LinkKey {
    pub fn new(a: Position, b: Position) -> Self {
        // Order by time point, then by coordinates, so the key is
        // independent of argument order. Positions don't implement Ord
        // (float fields), so compare the fields we need directly.
        if Self::canonical_order(&a, &b) {
            LinkKey(a, b)
        } else {
            LinkKey(b, a)
        }
    }

    fn canonical_order(a: &Position, b: &Position) -> bool {
        let ta = a.t.unwrap_or(i32::MIN);
        let tb = b.t.unwrap_or(i32::MIN);
        if ta != tb {
            return ta < tb;
        }
        (a.x, a.y, a.z) <= (b.x, b.y, b.z)
    }

    pub fn earlier(&self) -> &Position {
        &self.0
    }

    pub fn later(&self) -> &Position {
        &self.1
    }
}

/// `data_name -> (link-key -> value)`. Reserved link-data names `source`
/// and `target` are rejected in addition to the `__` prefix.
#[derive(Debug, Clone, Default)]
pub struct LinkData {
    by_name: HashMap<String, HashMap<LinkKey, DataValue>>,
}

impl LinkData {
    pub fn new() -> Self {
        LinkData::default()
    }

    fn check_link(a: &Position, b: &Position) -> Result<()> {
        let ta = a.require_t()?;
        let tb = b.require_t()?;
        if (ta - tb).abs() != 1 {
            return Err(LineageError::BadLink { t1: ta, t2: tb });
        }
        Ok(())
    }

    fn reject_name(name: &str) -> Result<()> {
        reject_reserved_name(name)?;
        if name == "source" || name == "target" {
            return Err(LineageError::ReservedDataName(name.to_string()));
        }
        Ok(())
    }

    pub fn get(&self, a: &Position, b: &Position, name: &str) -> Option<&DataValue> {
        self.by_name.get(name)?.get(&LinkKey::new(*a, *b))
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.by_name.keys().map(|s| s.as_str())
    }

    pub fn set(&mut self, a: Position, b: Position, name: &str, value: Option<DataValue>) -> Result<()> {
        Self::reject_name(name)?;
        Self::check_link(&a, &b)?;
        let key = LinkKey::new(a, b);
        match value {
            Some(v) => {
                self.by_name.entry(name.to_string()).or_default().insert(key, v);
            }
            None => {
                if let Some(map) = self.by_name.get_mut(name) {
                    map.remove(&key);
                    if map.is_empty() {
                        self.by_name.remove(name);
                    }
                }
            }
        }
        Ok(())
    }

    pub fn of_name(&self, name: &str) -> impl Iterator<Item = (&LinkKey, &DataValue)> {
        self.by_name.get(name).into_iter().flat_map(|m| m.iter())
    }

    /// Moves every entry whose key touches `old` so it instead touches
    /// `new`, across all names. Used when a position is replaced in place.
    pub fn replace_position(&mut self, old: &Position, new: Position) {
        for map in self.by_name.values_mut() {
            let stale: Vec<LinkKey> =
                map.keys().filter(|k| k.0 == *old || k.1 == *old).copied().collect();
            for key in stale {
                if let Some(v) = map.remove(&key) {
                    let other = if key.0 == *old { key.1 } else { key.0 };
                    map.insert(LinkKey::new(new, other), v);
                }
            }
        }
    }

    pub fn remove_link(&mut self, a: &Position, b: &Position) {
        let key = LinkKey::new(*a, *b);
        for map in self.by_name.values_mut() {
            map.remove(&key);
        }
        self.by_name.retain(|_, m| !m.is_empty());
    }

    pub fn merge(&mut self, other: &LinkData) {
        for (name, map) in &other.by_name {
            let entry = self.by_name.entry(name.clone()).or_default();
            for (key, value) in map {
                entry.insert(*key, value.clone());
            }
        }
    }

    pub fn copy(&self) -> Self {
        self.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_then_get_then_clear() {
        let mut data = PositionData::new();
        let p = Position::new(0.0, 0.0, 0.0, 0);
        data.set(p, "mother_score", Some(DataValue::Float(0.9))).unwrap();
        assert_eq!(data.get(&p, "mother_score"), Some(&DataValue::Float(0.9)));
        data.set(p, "mother_score", None).unwrap();
        assert_eq!(data.get(&p, "mother_score"), None);
        assert_eq!(data.names().count(), 0);
    }

    #[test]
    fn reserved_names_are_rejected() {
        let mut data = PositionData::new();
        let p = Position::new(0.0, 0.0, 0.0, 0);
        assert!(data.set(p, "__internal", Some(DataValue::Bool(true))).is_err());
    }

    #[test]
    fn link_key_is_order_independent() {
        let a = Position::new(0.0, 0.0, 0.0, 0);
        let b = Position::new(1.0, 1.0, 1.0, 1);
        assert_eq!(LinkKey::new(a, b), LinkKey::new(b, a));
    }

    #[test]
    fn link_data_rejects_non_consecutive_time_points() {
        let mut data = LinkData::new();
        let a = Position::new(0.0, 0.0, 0.0, 0);
        let b = Position::new(0.0, 0.0, 0.0, 2);
        assert!(data.set(a, b, "weight", Some(DataValue::Float(1.0))).is_err());
    }

    #[test]
    fn link_data_rejects_source_and_target_names() {
        let mut data = LinkData::new();
        let a = Position::new(0.0, 0.0, 0.0, 0);
        let b = Position::new(0.0, 0.0, 0.0, 1);
        assert!(data.set(a, b, "source", Some(DataValue::Bool(true))).is_err());
        assert!(data.set(a, b, "target", Some(DataValue::Bool(true))).is_err());
    }

    #[test]
    fn merge_overwrites_on_collision() {
        let mut a = PositionData::new();
        let mut b = PositionData::new();
        let p = Position::new(0.0, 0.0, 0.0, 0);
        a.set(p, "type", Some(DataValue::Str("UNKNOWN".into()))).unwrap();
        b.set(p, "type", Some(DataValue::Str("KNOWN".into()))).unwrap();
        a.merge(&b);
        assert_eq!(a.get(&p, "type"), Some(&DataValue::Str("KNOWN".into())));
    }
}
