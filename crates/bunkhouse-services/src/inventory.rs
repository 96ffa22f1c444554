//! Inventory resolver
//!
//! Answers "which beds are taken for these nights" by merging three sources:
//! 1. Durable bookings in an occupying status
//! 2. Live holds from the lock store
//! 3. Blocks imported from external calendars
//!
//! The sources are read concurrently. A bed reported by more than one source
//! is a double booking; it is logged and counted once.

use bunkhouse_core::{
    config::CalendarConfig,
    models::{BedSelection, GenderPolicy, RoomId, StayRange},
    traits::{BookingRepository, ShadowBlockSource},
    AppError, AppResult, Clock,
};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use tracing::{debug, instrument, warn};
use uuid::Uuid;

use crate::catalog::RoomCatalog;
use crate::holds::HoldStore;
use crate::occupancy::OccupancySnapshot;

/// Per-room availability over a range
#[derive(Debug, Clone, Serialize)]
pub struct RoomAvailability {
    pub room_id: RoomId,
    pub name: Option<String>,
    pub capacity: u32,
    pub occupied: Vec<u32>,
    pub blocked: u32,
    pub free_beds: Vec<u32>,
    pub available: u32,
    pub policy: GenderPolicy,
}

pub struct InventoryResolver {
    catalog: Arc<RoomCatalog>,
    bookings: Arc<dyn BookingRepository>,
    holds: HoldStore,
    blocks: Arc<dyn ShadowBlockSource>,
    clock: Arc<dyn Clock>,
    config: CalendarConfig,
}

impl InventoryResolver {
    pub fn new(
        catalog: Arc<RoomCatalog>,
        bookings: Arc<dyn BookingRepository>,
        holds: HoldStore,
        blocks: Arc<dyn ShadowBlockSource>,
        clock: Arc<dyn Clock>,
        config: CalendarConfig,
    ) -> Self {
        Self {
            catalog,
            bookings,
            holds,
            blocks,
            clock,
            config,
        }
    }

    /// Full occupancy of `range`, ignoring the hold `exclude_hold`
    #[instrument(skip(self), fields(range = %range))]
    pub async fn occupancy(&self, range: StayRange, exclude_hold: Option<Uuid>) -> AppResult<OccupancySnapshot> {
        if !range.is_valid() {
            return Err(AppError::Validation(format!(
                "check-out must be after check-in, got {}",
                range
            )));
        }

        let now = self.clock.now();
        let (bookings, holds, blocks) = tokio::try_join!(
            self.bookings.find_active_overlapping(range),
            self.holds.list_live(range, now),
            self.blocks.blocks_overlapping(range),
        )?;

        let mut snapshot = OccupancySnapshot::new(range);

        for booking in bookings
            .iter()
            .filter(|b| b.is_occupying() && b.stay().overlaps(&range))
        {
            for bed in &booking.beds {
                if !snapshot.occupy(*bed) {
                    warn!("Double booking: {} appears twice (booking {})", bed, booking.id);
                }
                if booking.is_restricted_group() {
                    snapshot.restricted_rooms.insert(bed.room_id);
                }
            }
        }

        for hold in holds.iter().filter(|h| Some(h.id) != exclude_hold) {
            for bed in &hold.beds {
                if !snapshot.occupy(*bed) {
                    warn!("Double booking: {} held by {} is already occupied", bed, hold.id);
                }
            }
        }

        // Per-room, per-night blocked bed counts for blocks without a bed mapping
        let mut nightly: BTreeMap<RoomId, BTreeMap<chrono::NaiveDate, u32>> = BTreeMap::new();
        for block in &blocks {
            if block.stale && !self.config.honor_stale_blocks {
                debug!("Ignoring stale block {} from {}", block.uid, block.source);
                continue;
            }
            let Some(room) = block.room_id.and_then(|id| self.catalog.get(id)) else {
                warn!(
                    "Calendar block {} from {} has no known room, ignoring",
                    block.uid, block.source
                );
                continue;
            };

            if block.is_bed_level() {
                for bed_number in block.beds.iter().flatten() {
                    if !room.has_bed(*bed_number) {
                        warn!("Calendar block {} names missing bed {}", block.uid, bed_number);
                        continue;
                    }
                    if !snapshot.occupy(BedSelection::new(room.id, *bed_number)) {
                        warn!(
                            "Double booking: calendar block {} overlaps room {} bed {}",
                            block.uid, room.id, bed_number
                        );
                    }
                }
            } else {
                let per_night = nightly.entry(room.id).or_default();
                for night in range.nights_iter().filter(|n| block.stay().contains_night(*n)) {
                    *per_night.entry(night).or_default() += block.bed_count;
                }
            }
        }

        for (room_id, nights) in nightly {
            if let Some(peak) = nights.values().copied().max() {
                snapshot.blocked_capacity.insert(room_id, peak);
            }
        }

        snapshot.policies =
            self.catalog
                .effective_policies(range.check_in, now, &snapshot.restricted_rooms);

        debug!(
            "Occupancy {}: {} bookings, {} holds, {} blocks",
            range,
            bookings.len(),
            holds.len(),
            blocks.len()
        );
        Ok(snapshot)
    }

    /// Occupied beds per room, sorted and deduplicated
    pub async fn get_occupied_beds(&self, range: StayRange) -> AppResult<BTreeMap<RoomId, Vec<u32>>> {
        Ok(self.occupancy(range, None).await?.occupied_lists())
    }

    /// Final guard before a commit: none of `beds` is taken and blocked
    /// capacity still leaves room for them
    #[instrument(skip(self, beds), fields(beds = beds.len(), range = %range))]
    pub async fn verify_beds_available(
        &self,
        beds: &[BedSelection],
        range: StayRange,
        exclude_hold: Option<Uuid>,
    ) -> AppResult<bool> {
        let snapshot = self.occupancy(range, exclude_hold).await?;

        if let Some(bed) = beds.iter().find(|bed| snapshot.is_occupied(bed)) {
            debug!("{} is no longer available", bed);
            return Ok(false);
        }

        let mut per_room: BTreeMap<RoomId, u32> = BTreeMap::new();
        for bed in beds {
            *per_room.entry(bed.room_id).or_default() += 1;
        }
        for (room_id, requested) in per_room {
            let room = self.catalog.require(room_id)?;
            if requested > snapshot.available_count(room) {
                debug!("{} lacks capacity for {} beds", room.label(), requested);
                return Ok(false);
            }
        }
        Ok(true)
    }

    /// Availability of every room
    pub async fn check_availability(&self, range: StayRange) -> AppResult<Vec<RoomAvailability>> {
        let snapshot = self.occupancy(range, None).await?;

        Ok(self
            .catalog
            .rooms()
            .map(|room| RoomAvailability {
                room_id: room.id,
                name: room.name.clone(),
                capacity: room.capacity,
                occupied: snapshot
                    .occupied
                    .get(&room.id)
                    .map(|beds| beds.iter().copied().collect())
                    .unwrap_or_default(),
                blocked: snapshot.blocked_in(room.id),
                free_beds: snapshot.free_beds(room),
                available: snapshot.available_count(room),
                policy: snapshot.policy(room),
            })
            .collect())
    }

    /// Rooms holding a women-only booking in `range`
    pub async fn restricted_rooms(&self, range: StayRange) -> AppResult<BTreeSet<RoomId>> {
        Ok(self.occupancy(range, None).await?.restricted_rooms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bunkhouse_cache::MemoryLockStore;
    use bunkhouse_core::models::{ExternalBlock, Room};
    use bunkhouse_core::FixedClock;
    use bunkhouse_db::{MemoryBookingRepository, StaticBlockSource};
    use chrono::{NaiveDate, TimeZone, Utc};
    use rust_decimal_macros::dec;

    fn d(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 8, day).unwrap()
    }

    fn block(uid: &str, from: u32, to: u32, room_id: Option<RoomId>, beds: Option<Vec<u32>>, count: u32) -> ExternalBlock {
        ExternalBlock {
            uid: uid.to_string(),
            check_in: d(from),
            check_out: d(to),
            source: "hostelworld".to_string(),
            stale: false,
            room_id,
            beds,
            bed_count: count,
        }
    }

    fn resolver(blocks: Vec<ExternalBlock>, honor_stale: bool) -> InventoryResolver {
        let clock = Arc::new(FixedClock::new(Utc.with_ymd_and_hms(2025, 7, 1, 9, 0, 0).unwrap()));
        let catalog = RoomCatalog::new(
            vec![Room {
                id: 1,
                name: Some("Garden".to_string()),
                capacity: 6,
                gender_policy: GenderPolicy::Mixed,
                is_flexible: false,
                auto_convert_hours: 0,
                base_price: dec!(45),
            }],
            14,
        )
        .unwrap();
        InventoryResolver::new(
            Arc::new(catalog),
            Arc::new(MemoryBookingRepository::new()),
            HoldStore::new(Arc::new(MemoryLockStore::new(clock.clone()))),
            Arc::new(StaticBlockSource::new(blocks)),
            clock,
            CalendarConfig {
                honor_stale_blocks: honor_stale,
            },
        )
    }

    #[tokio::test]
    async fn test_bed_level_and_aggregate_blocks() {
        let resolver = resolver(
            vec![
                block("a", 1, 3, Some(1), Some(vec![2, 3]), 2),
                block("b", 1, 2, Some(1), None, 1),
                block("c", 2, 4, Some(1), None, 2),
                block("d", 3, 4, Some(1), None, 2),
                block("unmapped", 1, 4, None, None, 5),
            ],
            true,
        );

        let range = StayRange::new(d(1), d(4));
        let snapshot = resolver.occupancy(range, None).await.unwrap();
        assert_eq!(snapshot.occupied_lists()[&1], vec![2, 3]);
        // Night 1: 1, night 2: 2, night 3: 4
        assert_eq!(snapshot.blocked_in(1), 4);

        let availability = resolver.check_availability(range).await.unwrap();
        assert_eq!(availability[0].free_beds, vec![1, 4, 5, 6]);
        assert_eq!(availability[0].available, 0);

        assert!(!resolver
            .verify_beds_available(&[BedSelection::new(1, 1)], range, None)
            .await
            .unwrap());
        assert!(resolver
            .verify_beds_available(&[BedSelection::new(1, 1)], StayRange::new(d(1), d(3)), None)
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn test_stale_blocks_follow_config() {
        let mut stale = block("s", 1, 3, Some(1), Some(vec![1]), 1);
        stale.stale = true;
        let range = StayRange::new(d(1), d(3));

        let honoring = resolver(vec![stale.clone()], true);
        assert_eq!(honoring.get_occupied_beds(range).await.unwrap()[&1], vec![1]);

        let ignoring = resolver(vec![stale], false);
        assert!(ignoring.get_occupied_beds(range).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_rejects_empty_range() {
        let resolver = resolver(vec![], true);
        assert!(resolver
            .occupancy(StayRange::new(d(3), d(3)), None)
            .await
            .is_err());
    }
}
