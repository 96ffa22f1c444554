//! Shadow occupancy imported from third-party calendars

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use super::room::RoomId;
use super::stay::StayRange;

/// Read-only block taken from an external calendar feed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExternalBlock {
    pub uid: String,
    pub check_in: NaiveDate,
    pub check_out: NaiveDate,

    /// Feed the block came from (e.g. "booking.com")
    pub source: String,

    /// Feed has not refreshed this block recently
    #[serde(default)]
    pub stale: bool,

    /// Room the listing maps to; unmapped blocks cannot be placed
    #[serde(default)]
    pub room_id: Option<RoomId>,

    /// Explicit bed numbers, when the listing maps to beds
    #[serde(default)]
    pub beds: Option<Vec<u32>>,

    /// Beds taken when no explicit bed mapping exists
    #[serde(default = "default_bed_count")]
    pub bed_count: u32,
}

fn default_bed_count() -> u32 {
    1
}

impl ExternalBlock {
    pub fn stay(&self) -> StayRange {
        StayRange::new(self.check_in, self.check_out)
    }

    /// Blocks specific beds rather than room capacity
    pub fn is_bed_level(&self) -> bool {
        matches!(&self.beds, Some(beds) if !beds.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_from_json() {
        let block: ExternalBlock = serde_json::from_str(
            r#"{"uid":"abc","check_in":"2025-02-01","check_out":"2025-02-03","source":"airbnb","room_id":2}"#,
        )
        .unwrap();
        assert_eq!(block.bed_count, 1);
        assert!(!block.stale);
        assert!(!block.is_bed_level());
        assert_eq!(block.stay().nights(), 2);
    }

    #[test]
    fn test_bed_level() {
        let block = ExternalBlock {
            uid: "x".to_string(),
            check_in: NaiveDate::from_ymd_opt(2025, 2, 1).unwrap(),
            check_out: NaiveDate::from_ymd_opt(2025, 2, 2).unwrap(),
            source: "hostelworld".to_string(),
            stale: false,
            room_id: Some(1),
            beds: Some(vec![3, 4]),
            bed_count: 2,
        };
        assert!(block.is_bed_level());
    }
}
