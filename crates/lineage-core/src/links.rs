//! The lineage graph (C4): the set of all `LinkingTrack`s plus the
//! position-to-track index and the position/link metadata stores.

use std::collections::{HashMap, HashSet};

use crate::error::{LineageError, Result};
use crate::geometry::Position;
use crate::metadata::{DataValue, LinkData, PositionData};
use crate::track::{LinkingTrack, TrackId};

#[derive(Debug, Clone, Default)]
pub struct Links {
    arena: Vec<Option<LinkingTrack>>,
    position_index: HashMap<Position, TrackId>,
    position_data: PositionData,
    link_data: LinkData,
    id_order: Vec<TrackId>,
    dense_ids: HashMap<TrackId, usize>,
}

impl Links {
    pub fn new() -> Self {
        Links::default()
    }

    fn track(&self, id: TrackId) -> &LinkingTrack {
        self.arena[id.0].as_ref().expect("track id refers to a removed slot")
    }

    fn track_mut(&mut self, id: TrackId) -> &mut LinkingTrack {
        self.arena[id.0].as_mut().expect("track id refers to a removed slot")
    }

    fn alloc_track(&mut self, track: LinkingTrack) -> TrackId {
        let positions = track.positions.clone();
        let id = if let Some(slot) = self.arena.iter().position(|s| s.is_none()) {
            self.arena[slot] = Some(track);
            TrackId(slot)
        } else {
            self.arena.push(Some(track));
            TrackId(self.arena.len() - 1)
        };
        for p in positions {
            self.position_index.insert(p, id);
        }
        self.dense_ids.insert(id, self.id_order.len());
        self.id_order.push(id);
        id
    }

    fn free_track(&mut self, id: TrackId) {
        self.arena[id.0] = None;
        if let Some(pos) = self.id_order.iter().position(|x| *x == id) {
            self.id_order.remove(pos);
        }
        self.dense_ids.remove(&id);
        for (i, tid) in self.id_order.iter().enumerate() {
            self.dense_ids.insert(*tid, i);
        }
    }

    fn get_or_create_track(&mut self, pos: Position) -> TrackId {
        if let Some(id) = self.position_index.get(&pos) {
            return *id;
        }
        self.alloc_track(LinkingTrack::singleton(pos))
    }

    /// Splits the track at `split_index`: `[0, split_index)` stays in
    /// `id`, `[split_index, len)` moves to a freshly allocated track.
    /// Requires `0 < split_index < track.len()`.
    fn split_track(&mut self, id: TrackId, split_index: usize) -> TrackId {
        let (new_positions, next, new_min_t) = {
            let track = self.track_mut(id);
            let new_min_t = track.min_time_point_number + split_index as i32;
            let new_positions = track.positions.split_off(split_index);
            let next = std::mem::take(&mut track.next);
            (new_positions, next, new_min_t)
        };

        let new_track = LinkingTrack {
            min_time_point_number: new_min_t,
            positions: new_positions,
            prev: vec![id],
            next,
            lineage_data: HashMap::new(),
        };
        let new_id = self.alloc_track(new_track);

        for nxt in self.track(new_id).next.clone() {
            let nxt_track = self.track_mut(nxt);
            for p in nxt_track.prev.iter_mut() {
                if *p == id {
                    *p = new_id;
                }
            }
        }

        self.track_mut(id).next = vec![new_id];
        new_id
    }

    /// Splices `succ_id` onto the end of `id`, assuming `id.next == [succ_id]`
    /// and `succ_id.prev == [id]`. Pads across any time-point gap with
    /// sentinel positions (NaN coordinates) that are not added to the index.
    fn merge_step(&mut self, id: TrackId, succ_id: TrackId) {
        let succ = self.arena[succ_id.0].take().expect("successor track missing");

        let track = self.track_mut(id);
        let gap_start = track.max_time_point_number() + 1;
        for t in gap_start..succ.min_time_point_number {
            track.positions.push(Position::untimed(f64::NAN, f64::NAN, f64::NAN).with_time(t));
        }
        track.positions.extend(succ.positions.iter().copied());
        track.next = succ.next.clone();

        for p in &succ.positions {
            self.position_index.insert(*p, id);
        }
        for nxt in succ.next {
            let nxt_track = self.track_mut(nxt);
            for p in nxt_track.prev.iter_mut() {
                if *p == succ_id {
                    *p = id;
                }
            }
        }
        if let Some(pos) = self.id_order.iter().position(|x| *x == succ_id) {
            self.id_order.remove(pos);
        }
        self.dense_ids.remove(&succ_id);
        for (i, tid) in self.id_order.iter().enumerate() {
            self.dense_ids.insert(*tid, i);
        }
    }

    /// Repeatedly merges `id` with its sole successor for as long as that
    /// successor has no other predecessor, per the no-mid-track-split
    /// invariant.
    fn attempt_merge(&mut self, id: TrackId) {
        loop {
            if self.arena[id.0].is_none() {
                return;
            }
            let track = self.track(id);
            if track.next.len() != 1 {
                return;
            }
            let succ_id = track.next[0];
            if self.track(succ_id).prev.len() != 1 {
                return;
            }
            self.merge_step(id, succ_id);
        }
    }

    fn sweep_merges(&mut self, ids: impl IntoIterator<Item = TrackId>) {
        for id in ids {
            if self.arena.get(id.0).map(|s| s.is_some()).unwrap_or(false) {
                self.attempt_merge(id);
            }
        }
    }

    // ---- public API -----------------------------------------------------

    pub fn get_track(&self, pos: &Position) -> Option<TrackId> {
        self.position_index.get(pos).copied()
    }

    pub fn track_of(&self, id: TrackId) -> &LinkingTrack {
        self.track(id)
    }

    pub fn contains_link(&self, a: &Position, b: &Position) -> bool {
        let (early, late) = match Self::order(a, b) {
            Some(x) => x,
            None => return false,
        };
        let (Some(&ta), Some(&tb)) = (self.position_index.get(&early), self.position_index.get(&late)) else {
            return false;
        };
        if ta == tb {
            let track = self.track(ta);
            let (Some(ie), Some(il)) = (track.index_of(&early), track.index_of(&late)) else {
                return false;
            };
            il == ie + 1
        } else {
            let early_track = self.track(ta);
            let late_track = self.track(tb);
            early_track.next.contains(&tb)
                && early_track.last_position() == early
                && late_track.first_position() == late
        }
    }

    fn order(a: &Position, b: &Position) -> Option<(Position, Position)> {
        let ta = a.t?;
        let tb = b.t?;
        if (ta - tb).abs() != 1 {
            return None;
        }
        if ta < tb {
            Some((*a, *b))
        } else {
            Some((*b, *a))
        }
    }

    pub fn add_link(&mut self, a: Position, b: Position) -> Result<()> {
        let ta = a.require_t()?;
        let tb = b.require_t()?;
        if ta == tb {
            return Err(LineageError::SameTimePoint { t: ta });
        }
        if (ta - tb).abs() != 1 {
            return Err(LineageError::BadLink { t1: ta, t2: tb });
        }
        let (early, late) = if ta < tb { (a, b) } else { (b, a) };

        if self.contains_link(&early, &late) {
            return Ok(());
        }

        // Fast path: appending a brand-new position to an endless track.
        if let Some(&early_id) = self.position_index.get(&early) {
            let early_track = self.track(early_id);
            if early_track.last_position() == early
                && !self.position_index.contains_key(&late)
                && early_track.next.is_empty()
            {
                self.track_mut(early_id).positions.push(late);
                self.position_index.insert(late, early_id);
                return Ok(());
            }
        }

        let early_id = self.get_or_create_track(early);
        let late_id = self.get_or_create_track(late);

        let early_id = {
            let track = self.track(early_id);
            let idx = track.index_of(&early).expect("early indexed into its own track");
            if idx + 1 < track.len() {
                self.split_track(early_id, idx + 1);
                self.position_index[&early]
            } else {
                early_id
            }
        };
        let late_id = {
            let track = self.track(late_id);
            let idx = track.index_of(&late).expect("late indexed into its own track");
            if idx > 0 {
                self.split_track(late_id, idx);
                self.position_index[&late]
            } else {
                late_id
            }
        };

        if early_id != late_id {
            self.track_mut(early_id).next.push(late_id);
            self.track_mut(late_id).prev.push(early_id);
        }

        self.sweep_merges([early_id, late_id]);
        #[cfg(debug_assertions)]
        self.debug_sanity_check();
        Ok(())
    }

    /// Removes the link between `a` and `b` if one exists. Returns whether
    /// a link was actually removed.
    pub fn remove_link(&mut self, a: &Position, b: &Position) -> Result<bool> {
        let Some((early, late)) = Self::order(a, b) else { return Ok(false) };
        if !self.contains_link(&early, &late) {
            return Ok(false);
        }
        let early_id = self.position_index[&early];
        let late_id = self.position_index[&late];

        if early_id == late_id {
            let idx = self.track(early_id).index_of(&early).unwrap();
            let new_id = self.split_track(early_id, idx + 1);
            self.track_mut(early_id).next.clear();
            self.track_mut(new_id).prev.clear();
        } else {
            self.track_mut(early_id).next.retain(|x| *x != late_id);
            self.track_mut(late_id).prev.retain(|x| *x != early_id);
        }
        #[cfg(debug_assertions)]
        self.debug_sanity_check();
        Ok(true)
    }

    pub fn remove_position(&mut self, pos: &Position) -> Result<()> {
        let Some(&track_id) = self.position_index.get(pos) else { return Ok(()) };

        for f in self.find_futures(pos) {
            self.link_data.remove_link(pos, &f);
        }
        for p in self.find_pasts(pos) {
            self.link_data.remove_link(&p, pos);
        }
        self.position_data.remove_position(pos);

        let track = self.track(track_id);
        let idx = track.index_of(pos).expect("position indexed into its own track");
        let len = track.len();

        if len == 1 {
            let prevs = track.prev.clone();
            let nexts = track.next.clone();
            for p in &prevs {
                self.track_mut(*p).next.retain(|x| x != &track_id);
            }
            for n in &nexts {
                self.track_mut(*n).prev.retain(|x| x != &track_id);
            }
            self.position_index.remove(pos);
            self.free_track(track_id);
            self.sweep_merges(prevs);
        } else if idx == 0 {
            let prevs = track.prev.clone();
            for p in &prevs {
                self.track_mut(*p).next.retain(|x| x != &track_id);
            }
            let track = self.track_mut(track_id);
            track.prev.clear();
            track.positions.remove(0);
            track.min_time_point_number += 1;
            self.position_index.remove(pos);
        } else if idx == len - 1 {
            let nexts = track.next.clone();
            for n in &nexts {
                self.track_mut(*n).prev.retain(|x| x != &track_id);
            }
            let track = self.track_mut(track_id);
            track.next.clear();
            track.positions.pop();
            self.position_index.remove(pos);
        } else {
            let new_id = self.split_track(track_id, idx + 1);
            self.track_mut(track_id).next.clear();
            self.track_mut(new_id).prev.clear();
            self.track_mut(track_id).positions.pop();
            self.position_index.remove(pos);
        }
        #[cfg(debug_assertions)]
        self.debug_sanity_check();
        Ok(())
    }

    pub fn replace_position(&mut self, old: &Position, new: Position) -> Result<()> {
        let old_t = old.require_t()?;
        let new_t = new.require_t()?;
        if old_t != new_t {
            return Err(LineageError::TimePointMismatch { expected: old_t, actual: new_t });
        }
        let Some(&track_id) = self.position_index.get(old) else { return Ok(()) };
        let track = self.track_mut(track_id);
        let idx = track.index_of(old).expect("position indexed into its own track");
        track.positions[idx] = new;
        self.position_index.remove(old);
        self.position_index.insert(new, track_id);
        self.position_data.replace_position(old, new);
        self.link_data.replace_position(old, new);
        #[cfg(debug_assertions)]
        self.debug_sanity_check();
        Ok(())
    }

    pub fn find_futures(&self, pos: &Position) -> HashSet<Position> {
        let mut out = HashSet::new();
        let Some(&id) = self.position_index.get(pos) else { return out };
        let track = self.track(id);
        let Some(idx) = track.index_of(pos) else { return out };
        if idx + 1 < track.len() {
            out.insert(track.positions[idx + 1]);
        } else {
            for n in &track.next {
                out.insert(self.track(*n).first_position());
            }
        }
        out
    }

    pub fn find_pasts(&self, pos: &Position) -> HashSet<Position> {
        let mut out = HashSet::new();
        let Some(&id) = self.position_index.get(pos) else { return out };
        let track = self.track(id);
        let Some(idx) = track.index_of(pos) else { return out };
        if idx > 0 {
            out.insert(track.positions[idx - 1]);
        } else {
            for p in &track.prev {
                out.insert(self.track(*p).last_position());
            }
        }
        out
    }

    pub fn find_links_of(&self, pos: &Position) -> Vec<(Position, Position)> {
        let mut out: Vec<(Position, Position)> =
            self.find_pasts(pos).into_iter().map(|p| (p, *pos)).collect();
        out.extend(self.find_futures(pos).into_iter().map(|f| (*pos, f)));
        out
    }

    pub fn find_all_links(&self) -> Vec<(Position, Position)> {
        let mut out = Vec::new();
        for slot in &self.arena {
            let Some(track) = slot else { continue };
            for w in track.positions.windows(2) {
                out.push((w[0], w[1]));
            }
            for &next_id in &track.next {
                let next = self.track(next_id);
                out.push((track.last_position(), next.first_position()));
            }
        }
        out
    }

    pub fn len_links(&self) -> usize {
        self.find_all_links().len()
    }

    pub fn find_starting_tracks(&self) -> Vec<TrackId> {
        self.id_order.iter().copied().filter(|id| self.track(*id).is_root()).collect()
    }

    pub fn find_all_tracks(&self) -> Vec<TrackId> {
        self.id_order.clone()
    }

    pub fn find_all_tracks_in_time_point(&self, t: i32) -> Vec<TrackId> {
        self.id_order
            .iter()
            .copied()
            .filter(|id| {
                let track = self.track(*id);
                t >= track.min_time_point_number && t <= track.max_time_point_number()
            })
            .collect()
    }

    pub fn get_position_near_time_point(&self, pos: &Position, target_t: i32) -> Option<Position> {
        let t0 = pos.t?;
        let forward = target_t >= t0;
        let mut current = *pos;
        let mut best = current;
        let mut best_diff = (t0 - target_t).abs();
        loop {
            let id = *self.position_index.get(&current)?;
            let track = self.track(id);
            let cur_t = current.t.unwrap();
            let next = if forward {
                track.position_at(cur_t + 1)
            } else {
                track.position_at(cur_t - 1)
            };
            let candidate = match next {
                Some(p) => Some(p),
                None if forward => track.next.first().map(|n| self.track(*n).first_position()),
                None => track.prev.first().map(|p| self.track(*p).last_position()),
            };
            match candidate {
                None => break,
                Some(c) => {
                    let diff = (c.t.unwrap() - target_t).abs();
                    current = c;
                    if diff < best_diff {
                        best = c;
                        best_diff = diff;
                    }
                    if diff == 0 {
                        break;
                    }
                }
            }
        }
        Some(best)
    }

    pub fn iterate_to_past(&self, pos: &Position) -> Vec<Position> {
        let mut out = vec![*pos];
        let mut current = *pos;
        loop {
            let Some(&id) = self.position_index.get(&current) else { break };
            let track = self.track(id);
            let Some(idx) = track.index_of(&current) else { break };
            let prev = if idx > 0 {
                Some(track.positions[idx - 1])
            } else if track.prev.len() == 1 {
                Some(self.track(track.prev[0]).last_position())
            } else {
                None
            };
            match prev {
                Some(p) => {
                    out.push(p);
                    current = p;
                }
                None => break,
            }
        }
        out
    }

    /// Finds the root of the lineage containing `track` and reads its
    /// lineage-wide metadata (empty if the track has no ancestry yet).
    pub fn lineage_data(&self, mut id: TrackId) -> &HashMap<String, DataValue> {
        loop {
            let track = self.track(id);
            if track.prev.is_empty() {
                return &track.lineage_data;
            }
            id = track.prev[0];
        }
    }

    /// Sets a lineage-wide metadata entry on the root of `track`'s lineage.
    pub fn set_lineage_data(&mut self, mut id: TrackId, name: &str, value: DataValue) {
        loop {
            if self.track(id).prev.is_empty() {
                self.track_mut(id).lineage_data.insert(name.to_string(), value);
                return;
            }
            id = self.track(id).prev[0];
        }
    }

    pub fn get_position_data(&self, pos: &Position, name: &str) -> Option<&DataValue> {
        self.position_data.get(pos, name)
    }

    pub fn set_position_data(&mut self, pos: Position, name: &str, value: Option<DataValue>) -> Result<()> {
        if name == "id" {
            return Err(LineageError::ReservedDataName(name.to_string()));
        }
        self.position_data.set(pos, name, value)
    }

    pub fn get_link_data(&self, a: &Position, b: &Position, name: &str) -> Option<&DataValue> {
        self.link_data.get(a, b, name)
    }

    pub fn set_link_data(
        &mut self,
        a: Position,
        b: Position,
        name: &str,
        value: Option<DataValue>,
    ) -> Result<()> {
        self.link_data.set(a, b, name, value)
    }

    pub fn position_data(&self) -> &PositionData {
        &self.position_data
    }

    pub fn link_data(&self) -> &LinkData {
        &self.link_data
    }

    /// Stable order used for iteration and id assignment; sorts tracks by
    /// the x coordinate of their first position.
    pub fn sort_tracks_by_x(&mut self) {
        let mut order = self.id_order.clone();
        order.sort_by(|a, b| {
            self.track(*a).first_position().x.partial_cmp(&self.track(*b).first_position().x).unwrap()
        });
        self.id_order = order;
        self.dense_ids.clear();
        for (i, id) in self.id_order.iter().enumerate() {
            self.dense_ids.insert(*id, i);
        }
    }

    pub fn get_track_id(&self, id: TrackId) -> usize {
        self.dense_ids[&id]
    }

    pub fn find_all_tracks_and_ids(&self) -> Vec<(TrackId, usize)> {
        self.id_order.iter().enumerate().map(|(i, id)| (*id, i)).collect()
    }

    pub fn copy(&self) -> Self {
        self.clone()
    }

    /// Debug-only invariant checker (§4.4's sanity check); callable
    /// directly in tests, and run after every public mutator in debug
    /// builds via [`Self::debug_sanity_check`].
    pub fn sanity_check(&self) -> std::result::Result<(), String> {
        for (slot_idx, slot) in self.arena.iter().enumerate() {
            let Some(track) = slot else { continue };
            let this_id = TrackId(slot_idx);
            if track.is_empty() {
                return Err("empty track in arena".to_string());
            }
            for (i, pos) in track.positions.iter().enumerate() {
                if pos.x.is_nan() {
                    continue; // gap-padding sentinel, not indexed
                }
                let expected_t = track.min_time_point_number + i as i32;
                if pos.t != Some(expected_t) {
                    return Err(format!("position {pos:?} at wrong slot in its track"));
                }
                if self.position_index.get(pos) != Some(&this_id) {
                    return Err(format!("position {pos:?} not indexed to its own track"));
                }
            }
            if !track.prev.is_empty() && !track.lineage_data.is_empty() {
                return Err("non-root track carries lineage data".to_string());
            }
            for &next_id in &track.next {
                let Some(next) = self.arena.get(next_id.0).and_then(|s| s.as_ref()) else {
                    return Err("dangling next pointer".to_string());
                };
                if !next.prev.contains(&this_id) {
                    return Err("next link not mirrored by a prev link".to_string());
                }
            }
            for &prev_id in &track.prev {
                let Some(prev) = self.arena.get(prev_id.0).and_then(|s| s.as_ref()) else {
                    return Err("dangling prev pointer".to_string());
                };
                if !prev.next.contains(&this_id) {
                    return Err("prev link not mirrored by a next link".to_string());
                }
            }
            if track.next.len() == 1 {
                let succ = self.track(track.next[0]);
                if succ.prev.len() == 1 {
                    return Err("mergeable tracks were left unmerged".to_string());
                }
            }
        }
        Ok(())
    }

    #[cfg(debug_assertions)]
    fn debug_sanity_check(&self) {
        if let Err(e) = self.sanity_check() {
            panic!("internal lineage graph invariant violated: {e}");
        }
    }
}
