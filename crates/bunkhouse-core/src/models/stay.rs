//! Stay ranges and bed selections

use chrono::{Duration, NaiveDate};
use serde::{Deserialize, Serialize};
use std::fmt;

use super::room::RoomId;

/// Half-open date interval `[check_in, check_out)`
///
/// The check-out night is not part of the stay, so a bed freed on a
/// check-out morning can be taken by a guest arriving the same day.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StayRange {
    pub check_in: NaiveDate,
    pub check_out: NaiveDate,
}

impl StayRange {
    pub fn new(check_in: NaiveDate, check_out: NaiveDate) -> Self {
        Self {
            check_in,
            check_out,
        }
    }

    /// Range is non-empty
    pub fn is_valid(&self) -> bool {
        self.check_in < self.check_out
    }

    /// Number of nights; zero for an inverted or empty range
    pub fn nights(&self) -> u32 {
        (self.check_out - self.check_in).num_days().max(0) as u32
    }

    /// Half-open overlap: `a.start < b.end && b.start < a.end`
    pub fn overlaps(&self, other: &StayRange) -> bool {
        self.check_in < other.check_out && other.check_in < self.check_out
    }

    pub fn overlaps_dates(&self, check_in: NaiveDate, check_out: NaiveDate) -> bool {
        self.overlaps(&StayRange::new(check_in, check_out))
    }

    /// Whether the night starting on `date` belongs to the stay
    pub fn contains_night(&self, date: NaiveDate) -> bool {
        self.check_in <= date && date < self.check_out
    }

    /// Every night of the stay, in order
    pub fn nights_iter(&self) -> impl Iterator<Item = NaiveDate> {
        let start = self.check_in;
        (0..self.nights() as i64).map(move |offset| start + Duration::days(offset))
    }
}

impl fmt::Display for StayRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {})", self.check_in, self.check_out)
    }
}

/// One physical sleeping slot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct BedSelection {
    pub room_id: RoomId,
    pub bed_number: u32,
}

impl BedSelection {
    pub fn new(room_id: RoomId, bed_number: u32) -> Self {
        Self {
            room_id,
            bed_number,
        }
    }
}

impl fmt::Display for BedSelection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "room {} bed {}", self.room_id, self.bed_number)
    }
}
