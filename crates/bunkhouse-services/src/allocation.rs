//! Allocation validator
//!
//! Gender rules, bed-selection checks and the greedy bed suggestion.
//! All checks run against an [`OccupancySnapshot`] taken by the inventory
//! resolver, so the validator itself never touches a store.

use bunkhouse_core::models::{BedSelection, GenderPolicy, RoomId};
use bunkhouse_core::{AppError, AppResult};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use tracing::debug;

use crate::catalog::RoomCatalog;
use crate::occupancy::OccupancySnapshot;

/// Outcome of a group/room compatibility check
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AccommodationCheck {
    pub allowed: bool,
    pub reason: Option<String>,
}

impl AccommodationCheck {
    fn allowed() -> Self {
        Self {
            allowed: true,
            reason: None,
        }
    }

    fn denied(reason: impl Into<String>) -> Self {
        Self {
            allowed: false,
            reason: Some(reason.into()),
        }
    }
}

/// Every problem found in a bed selection
#[derive(Debug, Clone, Default, Serialize)]
pub struct SelectionReport {
    pub errors: Vec<String>,

    /// Requested beds that are already taken
    pub unavailable: Vec<BedSelection>,
}

impl SelectionReport {
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    fn push(&mut self, error: String) {
        self.errors.push(error);
    }

    fn push_unavailable(&mut self, bed: BedSelection) {
        self.errors.push(format!("{} is already occupied", bed));
        self.unavailable.push(bed);
    }

    /// `Ok` for a valid selection. A selection whose only problem is taken
    /// beds is a conflict, anything else is a validation failure.
    pub fn into_result(self) -> AppResult<()> {
        if self.errors.is_empty() {
            return Ok(());
        }
        if self.errors.len() == self.unavailable.len() {
            if let Some(bed) = self.unavailable.first() {
                return Err(AppError::BedUnavailable { bed: *bed });
            }
        }
        Err(AppError::InvalidSelection(self.errors))
    }
}

/// Room-level checks on a group of guests
pub struct AllocationValidator {
    catalog: Arc<RoomCatalog>,
    mixed_group_threshold: u32,
}

impl AllocationValidator {
    pub fn new(catalog: Arc<RoomCatalog>, mixed_group_threshold: u32) -> Self {
        Self {
            catalog,
            mixed_group_threshold,
        }
    }

    pub fn mixed_group_threshold(&self) -> u32 {
        self.mixed_group_threshold
    }

    /// Whether a group of `men` and `women` may sleep in a room with `policy`
    ///
    /// Women-only groups fit anywhere. Groups with men fit a female-only room
    /// only when the whole group is larger than the mixed-group threshold.
    pub fn check_policy(&self, policy: GenderPolicy, men: u32, women: u32) -> AccommodationCheck {
        match policy {
            GenderPolicy::Mixed => AccommodationCheck::allowed(),
            GenderPolicy::FemaleOnly if men == 0 => AccommodationCheck::allowed(),
            GenderPolicy::FemaleOnly if men + women > self.mixed_group_threshold => {
                AccommodationCheck::allowed()
            }
            GenderPolicy::FemaleOnly => AccommodationCheck::denied(format!(
                "female-only room accepts mixed groups only above {} guests",
                self.mixed_group_threshold
            )),
        }
    }

    /// Gender check of one room, using its effective policy in `snapshot`
    pub fn can_accommodate_group(
        &self,
        room_id: RoomId,
        men: u32,
        women: u32,
        snapshot: &OccupancySnapshot,
    ) -> AppResult<AccommodationCheck> {
        let room = self.catalog.require(room_id)?;
        Ok(self.check_policy(snapshot.policy(room), men, women))
    }

    /// Check a requested bed list, collecting every error
    pub fn validate_bed_selection(
        &self,
        beds: &[BedSelection],
        men: u32,
        women: u32,
        snapshot: &OccupancySnapshot,
    ) -> SelectionReport {
        let mut report = SelectionReport::default();
        let guests = men + women;

        if guests == 0 {
            report.push("group must contain at least one guest".to_string());
        }
        if beds.len() != guests as usize {
            report.push(format!(
                "{} beds selected for {} guests",
                beds.len(),
                guests
            ));
        }

        let mut seen = BTreeSet::new();
        let mut per_room: BTreeMap<RoomId, u32> = BTreeMap::new();

        for bed in beds {
            let Some(room) = self.catalog.get(bed.room_id) else {
                report.push(format!("room {} does not exist", bed.room_id));
                continue;
            };
            if !room.has_bed(bed.bed_number) {
                report.push(format!(
                    "{} is out of range (room has {} beds)",
                    bed, room.capacity
                ));
                continue;
            }
            if !seen.insert(*bed) {
                report.push(format!("{} is selected more than once", bed));
                continue;
            }
            if snapshot.is_occupied(bed) {
                report.push_unavailable(*bed);
                continue;
            }
            *per_room.entry(bed.room_id).or_default() += 1;
        }

        for (room_id, requested) in &per_room {
            let Some(room) = self.catalog.get(*room_id) else {
                continue;
            };
            let policy = snapshot.policy(room);

            let check = self.check_policy(policy, men, women);
            if let Some(reason) = check.reason {
                report.push(format!("{}: {}", room.label(), reason));
            }

            if policy.is_restricted() && guests <= self.mixed_group_threshold && *requested > women {
                report.push(format!(
                    "{}: {} beds requested but only {} women in the group",
                    room.label(),
                    requested,
                    women
                ));
            }

            let available = snapshot.available_count(room);
            if *requested > available {
                report.push(format!(
                    "{}: {} beds requested but only {} available",
                    room.label(),
                    requested,
                    available
                ));
            }
        }

        debug!(
            "Validated {} beds for {} men / {} women: {} errors",
            beds.len(),
            men,
            women,
            report.errors.len()
        );
        report
    }

    /// Greedy suggestion: roomiest eligible rooms first, lowest free beds first
    pub fn suggest_bed_distribution(
        &self,
        men: u32,
        women: u32,
        snapshot: &OccupancySnapshot,
    ) -> AppResult<Vec<BedSelection>> {
        let demand = men + women;
        if demand == 0 {
            return Err(AppError::Validation(
                "group must contain at least one guest".to_string(),
            ));
        }

        let mut candidates: Vec<(u32, RoomId, Vec<u32>)> = self
            .catalog
            .rooms()
            .filter(|room| self.check_policy(snapshot.policy(room), men, women).allowed)
            .map(|room| {
                let available = snapshot.available_count(room);
                let mut free = snapshot.free_beds(room);
                free.truncate(available as usize);
                (available, room.id, free)
            })
            .filter(|(available, _, _)| *available > 0)
            .collect();

        candidates.sort_by(|a, b| b.0.cmp(&a.0).then(a.1.cmp(&b.1)));

        let total_available: u32 = candidates.iter().map(|(available, _, _)| available).sum();
        if total_available < demand {
            return Err(AppError::InsufficientBeds {
                requested: demand,
                available: total_available,
            });
        }

        let mut remaining = demand as usize;
        let mut selection = Vec::with_capacity(remaining);
        for (_, room_id, free) in candidates {
            if remaining == 0 {
                break;
            }
            let take = free.len().min(remaining);
            selection.extend(free.into_iter().take(take).map(|bed| BedSelection::new(room_id, bed)));
            remaining -= take;
        }

        Ok(selection)
    }
}
