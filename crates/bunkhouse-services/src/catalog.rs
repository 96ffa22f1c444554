//! Room catalog
//!
//! Static per-room configuration plus the derived flexible-room policy.
//! A flexible room is female-only by default and opens to mixed groups once
//! check-in is close enough, provided no women-only group is booked into it
//! for the same dates. The effective policy is recomputed on every read.

use bunkhouse_core::config::AppConfig;
use bunkhouse_core::models::{GenderPolicy, Room, RoomId};
use bunkhouse_core::{AppError, AppResult};
use chrono::{DateTime, Duration, NaiveDate, NaiveTime, TimeZone, Utc};
use std::collections::{BTreeMap, BTreeSet};
use tracing::debug;

/// Rooms keyed by id
#[derive(Debug, Clone)]
pub struct RoomCatalog {
    rooms: BTreeMap<RoomId, Room>,
    check_in_hour: u32,
}

impl RoomCatalog {
    /// Build a catalog, rejecting duplicate ids and empty rooms
    pub fn new(rooms: Vec<Room>, check_in_hour: u32) -> AppResult<Self> {
        if check_in_hour > 23 {
            return Err(AppError::Config(format!(
                "check-in hour {} is not a valid hour",
                check_in_hour
            )));
        }

        let mut by_id = BTreeMap::new();
        for room in rooms {
            if room.capacity == 0 {
                return Err(AppError::Config(format!("room {} has no beds", room.id)));
            }
            if room.base_price.is_sign_negative() {
                return Err(AppError::Config(format!(
                    "room {} has a negative base price",
                    room.id
                )));
            }
            let id = room.id;
            if by_id.insert(id, room).is_some() {
                return Err(AppError::Config(format!("room {} is defined twice", id)));
            }
        }

        Ok(Self {
            rooms: by_id,
            check_in_hour,
        })
    }

    pub fn from_config(config: &AppConfig) -> AppResult<Self> {
        Self::new(config.rooms.clone(), config.booking.check_in_hour)
    }

    pub fn get(&self, id: RoomId) -> Option<&Room> {
        self.rooms.get(&id)
    }

    /// Look up a room or fail with `RoomNotFound`
    pub fn require(&self, id: RoomId) -> AppResult<&Room> {
        self.rooms.get(&id).ok_or(AppError::RoomNotFound(id))
    }

    /// Rooms in ascending id order
    pub fn rooms(&self) -> impl Iterator<Item = &Room> {
        self.rooms.values()
    }

    pub fn len(&self) -> usize {
        self.rooms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rooms.is_empty()
    }

    pub fn total_capacity(&self) -> u32 {
        self.rooms.values().map(|r| r.capacity).sum()
    }

    /// Instant a stay starting on `date` checks in
    pub fn check_in_instant(&self, date: NaiveDate) -> DateTime<Utc> {
        let time = NaiveTime::from_hms_opt(self.check_in_hour, 0, 0).unwrap_or(NaiveTime::MIN);
        Utc.from_utc_datetime(&date.and_time(time))
    }

    /// Policy of `room` for a stay starting on `check_in`, as seen at `now`
    pub fn effective_policy(
        &self,
        room: &Room,
        check_in: NaiveDate,
        now: DateTime<Utc>,
        has_restricted_booking: bool,
    ) -> GenderPolicy {
        if !room.is_flexible {
            return room.gender_policy;
        }
        if has_restricted_booking {
            return GenderPolicy::FemaleOnly;
        }

        let opens_at =
            self.check_in_instant(check_in) - Duration::hours(i64::from(room.auto_convert_hours));
        if now >= opens_at {
            debug!("Flexible room {} open to mixed groups since {}", room.id, opens_at);
            GenderPolicy::Mixed
        } else {
            GenderPolicy::FemaleOnly
        }
    }

    /// Effective policy of every room
    pub fn effective_policies(
        &self,
        check_in: NaiveDate,
        now: DateTime<Utc>,
        restricted_booked_rooms: &BTreeSet<RoomId>,
    ) -> BTreeMap<RoomId, GenderPolicy> {
        self.rooms
            .values()
            .map(|room| {
                let policy = self.effective_policy(
                    room,
                    check_in,
                    now,
                    restricted_booked_rooms.contains(&room.id),
                );
                (room.id, policy)
            })
            .collect()
    }
}
