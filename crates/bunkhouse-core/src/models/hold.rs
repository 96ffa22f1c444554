//! Temporary bed holds
//!
//! A hold reserves specific beds for specific nights while a guest completes
//! payment. It starts `active` and moves exactly once to a terminal state.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use super::booking::PaymentStatus;
use super::stay::{BedSelection, StayRange};

/// Hold status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum HoldStatus {
    /// Beds are reserved until `expires_at`
    #[default]
    Active,
    /// Converted into a durable booking
    Confirmed,
    /// Given up by the caller
    Released,
    /// Reached `expires_at` without confirmation
    Expired,
}

impl fmt::Display for HoldStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HoldStatus::Active => write!(f, "active"),
            HoldStatus::Confirmed => write!(f, "confirmed"),
            HoldStatus::Released => write!(f, "released"),
            HoldStatus::Expired => write!(f, "expired"),
        }
    }
}

impl HoldStatus {
    /// Parse from string
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "active" => Some(HoldStatus::Active),
            "confirmed" => Some(HoldStatus::Confirmed),
            "released" => Some(HoldStatus::Released),
            "expired" => Some(HoldStatus::Expired),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, HoldStatus::Active)
    }
}

/// Advisory reservation of beds
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Hold {
    pub id: Uuid,
    pub beds: Vec<BedSelection>,
    pub check_in: NaiveDate,
    pub check_out: NaiveDate,
    pub status: HoldStatus,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,

    /// Caller-supplied context (guest details, cart, ...)
    #[serde(default)]
    pub payload: serde_json::Value,

    /// Terminal payment status recorded on confirmation
    #[serde(default)]
    pub payment_status: Option<PaymentStatus>,
}

impl Hold {
    pub fn stay(&self) -> StayRange {
        StayRange::new(self.check_in, self.check_out)
    }

    /// Past its expiry instant
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }

    /// Active and not yet expired; only live holds occupy beds
    pub fn is_live(&self, now: DateTime<Utc>) -> bool {
        self.status == HoldStatus::Active && !self.is_expired_at(now)
    }
}
