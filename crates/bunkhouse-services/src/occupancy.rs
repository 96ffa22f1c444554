//! Occupancy snapshot for one date range

use bunkhouse_core::models::{BedSelection, GenderPolicy, Room, RoomId, StayRange};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};

/// Merged view of bookings, live holds and calendar blocks over a range
#[derive(Debug, Clone, Default, Serialize)]
pub struct OccupancySnapshot {
    pub range: Option<StayRange>,

    /// Occupied bed numbers per room
    pub occupied: BTreeMap<RoomId, BTreeSet<u32>>,

    /// Peak number of beds blocked per night by calendar blocks without a bed mapping
    pub blocked_capacity: BTreeMap<RoomId, u32>,

    /// Rooms holding a women-only booking in the range
    pub restricted_rooms: BTreeSet<RoomId>,

    /// Effective gender policy per room
    pub policies: BTreeMap<RoomId, GenderPolicy>,
}

impl OccupancySnapshot {
    pub fn new(range: StayRange) -> Self {
        Self {
            range: Some(range),
            ..Default::default()
        }
    }

    /// Mark a bed occupied. Returns `false` if it already was.
    pub fn occupy(&mut self, bed: BedSelection) -> bool {
        self.occupied
            .entry(bed.room_id)
            .or_default()
            .insert(bed.bed_number)
    }

    pub fn is_occupied(&self, bed: &BedSelection) -> bool {
        self.occupied
            .get(&bed.room_id)
            .map(|beds| beds.contains(&bed.bed_number))
            .unwrap_or(false)
    }

    pub fn occupied_in(&self, room_id: RoomId) -> usize {
        self.occupied.get(&room_id).map(BTreeSet::len).unwrap_or(0)
    }

    pub fn blocked_in(&self, room_id: RoomId) -> u32 {
        self.blocked_capacity.get(&room_id).copied().unwrap_or(0)
    }

    /// Beds still bookable in `room`
    pub fn available_count(&self, room: &Room) -> u32 {
        room.capacity
            .saturating_sub(self.occupied_in(room.id) as u32)
            .saturating_sub(self.blocked_in(room.id))
    }

    /// Unoccupied bed numbers, lowest first
    pub fn free_beds(&self, room: &Room) -> Vec<u32> {
        room.beds()
            .filter(|bed| !self.is_occupied(&BedSelection::new(room.id, *bed)))
            .collect()
    }

    /// Effective policy, falling back to the configured one
    pub fn policy(&self, room: &Room) -> GenderPolicy {
        self.policies
            .get(&room.id)
            .copied()
            .unwrap_or(room.gender_policy)
    }

    /// Occupied beds per room as sorted lists
    pub fn occupied_lists(&self) -> BTreeMap<RoomId, Vec<u32>> {
        self.occupied
            .iter()
            .filter(|(_, beds)| !beds.is_empty())
            .map(|(room, beds)| (*room, beds.iter().copied().collect()))
            .collect()
    }
}
