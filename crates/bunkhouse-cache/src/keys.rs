//! Lock store key constants and builders for Bunkhouse
//!
//! # Key Patterns
//!
//! - `hold:{hold_id}` - Serialized hold record
//! - `bed_claim:{room_id}:{bed_number}:{night}` - Hold id owning one bed for one night
//!
//! # Example
//!
//! ```
//! use bunkhouse_cache::keys;
//! use chrono::NaiveDate;
//!
//! let night = NaiveDate::from_ymd_opt(2025, 7, 1).unwrap();
//! assert_eq!(keys::bed_claim_key(3, 2, night), "bed_claim:3:2:2025-07-01");
//! ```

use chrono::NaiveDate;
use uuid::Uuid;

/// Prefix for hold records
///
/// Format: `hold:{hold_id}`
pub const HOLD_PREFIX: &str = "hold";

/// Prefix for per-night bed claims
///
/// Format: `bed_claim:{room_id}:{bed_number}:{night}`
pub const BED_CLAIM_PREFIX: &str = "bed_claim";

/// Build the key of a hold record
pub fn hold_key(hold_id: Uuid) -> String {
    format!("{}:{}", HOLD_PREFIX, hold_id)
}

/// Build the key claiming one bed for one night
///
/// Nights use ISO dates so keys sort chronologically per bed.
pub fn bed_claim_key(room_id: u32, bed_number: u32, night: NaiveDate) -> String {
    format!(
        "{}:{}:{}:{}",
        BED_CLAIM_PREFIX,
        room_id,
        bed_number,
        night.format("%Y-%m-%d")
    )
}

/// Build the listing prefix for a key family, e.g. `hold:`
pub fn prefix(family: &str) -> String {
    format!("{}:", family)
}

/// Build a SCAN pattern matching every key under `prefix`
///
/// Glob metacharacters in the prefix are escaped.
pub fn scan_pattern(prefix: &str) -> String {
    let mut pattern = String::with_capacity(prefix.len() + 1);
    for c in prefix.chars() {
        if matches!(c, '*' | '?' | '[' | ']' | '\\') {
            pattern.push('\\');
        }
        pattern.push(c);
    }
    pattern.push('*');
    pattern
}
