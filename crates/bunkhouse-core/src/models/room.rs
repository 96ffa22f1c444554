//! Room catalog entries

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Room identifier
pub type RoomId = u32;

/// Who may sleep in a room
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum GenderPolicy {
    /// Any guest
    #[default]
    Mixed,
    /// Women only (unless the group is above the mixed-group threshold)
    FemaleOnly,
}

impl fmt::Display for GenderPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GenderPolicy::Mixed => write!(f, "mixed"),
            GenderPolicy::FemaleOnly => write!(f, "female_only"),
        }
    }
}

impl GenderPolicy {
    /// Parse from string
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "mixed" => Some(GenderPolicy::Mixed),
            "female_only" | "female" => Some(GenderPolicy::FemaleOnly),
            _ => None,
        }
    }

    pub fn is_restricted(&self) -> bool {
        matches!(self, GenderPolicy::FemaleOnly)
    }
}

/// Static per-room configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Room {
    pub id: RoomId,

    /// Display name
    #[serde(default)]
    pub name: Option<String>,

    /// Number of beds, numbered 1..=capacity
    pub capacity: u32,

    /// Configured policy. Flexible rooms store their restricted default here.
    #[serde(default)]
    pub gender_policy: GenderPolicy,

    /// Whether the room may open up to mixed groups close to check-in
    #[serde(default)]
    pub is_flexible: bool,

    /// Hours before check-in at which a flexible room opens up
    #[serde(default)]
    pub auto_convert_hours: u32,

    /// Nightly price per bed
    pub base_price: Decimal,
}

impl Room {
    pub fn has_bed(&self, bed_number: u32) -> bool {
        bed_number >= 1 && bed_number <= self.capacity
    }

    /// All bed numbers in ascending order
    pub fn beds(&self) -> impl Iterator<Item = u32> {
        1..=self.capacity
    }

    pub fn label(&self) -> String {
        match &self.name {
            Some(name) => format!("{} ({})", name, self.id),
            None => format!("room {}", self.id),
        }
    }
}
