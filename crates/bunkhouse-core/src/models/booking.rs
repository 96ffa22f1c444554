//! Booking models
//!
//! A booking moves through `pending -> confirmed -> checked_in -> checked_out`,
//! with `cancelled` reachable from `pending` and `confirmed`. Payment runs as a
//! sub-state; a successful payment forces the booking to `confirmed`.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;
use validator::Validate;

use super::stay::{BedSelection, StayRange};
use crate::error::AppError;

/// Booking lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum BookingStatus {
    #[default]
    Pending,
    Confirmed,
    CheckedIn,
    CheckedOut,
    Cancelled,
}

impl fmt::Display for BookingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BookingStatus::Pending => write!(f, "pending"),
            BookingStatus::Confirmed => write!(f, "confirmed"),
            BookingStatus::CheckedIn => write!(f, "checked_in"),
            BookingStatus::CheckedOut => write!(f, "checked_out"),
            BookingStatus::Cancelled => write!(f, "cancelled"),
        }
    }
}

impl BookingStatus {
    /// Parse from string
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "pending" => Some(BookingStatus::Pending),
            "confirmed" => Some(BookingStatus::Confirmed),
            "checked_in" => Some(BookingStatus::CheckedIn),
            "checked_out" => Some(BookingStatus::CheckedOut),
            "cancelled" => Some(BookingStatus::Cancelled),
            _ => None,
        }
    }

    /// Statuses whose beds count as occupied
    pub const OCCUPYING: [BookingStatus; 3] = [
        BookingStatus::Pending,
        BookingStatus::Confirmed,
        BookingStatus::CheckedIn,
    ];

    pub fn is_occupying(&self) -> bool {
        Self::OCCUPYING.contains(self)
    }

    pub fn can_transition_to(&self, next: BookingStatus) -> bool {
        use BookingStatus::*;
        matches!(
            (self, next),
            (Pending, Confirmed)
                | (Pending, Cancelled)
                | (Confirmed, CheckedIn)
                | (Confirmed, Cancelled)
                | (CheckedIn, CheckedOut)
        )
    }
}

/// Payment sub-state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    #[default]
    Pending,
    Paid,
    Failed,
    Refunded,
}

impl fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PaymentStatus::Pending => write!(f, "pending"),
            PaymentStatus::Paid => write!(f, "paid"),
            PaymentStatus::Failed => write!(f, "failed"),
            PaymentStatus::Refunded => write!(f, "refunded"),
        }
    }
}

impl PaymentStatus {
    /// Parse from string
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "pending" => Some(PaymentStatus::Pending),
            "paid" => Some(PaymentStatus::Paid),
            "failed" => Some(PaymentStatus::Failed),
            "refunded" => Some(PaymentStatus::Refunded),
            _ => None,
        }
    }

    /// Payment states whose bookings still occupy beds
    pub const OCCUPYING: [PaymentStatus; 2] = [PaymentStatus::Paid, PaymentStatus::Pending];

    pub fn is_occupying(&self) -> bool {
        Self::OCCUPYING.contains(self)
    }

    /// A failed attempt may be retried; refunds only follow a payment.
    pub fn can_transition_to(&self, next: PaymentStatus) -> bool {
        use PaymentStatus::*;
        matches!(
            (self, next),
            (Pending, Paid) | (Pending, Failed) | (Failed, Paid) | (Paid, Refunded)
        )
    }
}

/// Durable booking record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Booking {
    pub id: Uuid,
    pub guest_id: Uuid,
    pub check_in: NaiveDate,
    pub check_out: NaiveDate,
    pub beds: Vec<BedSelection>,

    /// Group composition, needed to derive flexible-room state
    pub men: u32,
    pub women: u32,

    pub total_price: Decimal,
    pub deposit_amount: Decimal,
    pub remaining_amount: Decimal,

    /// Date the remaining balance is auto-charged
    pub remaining_due_on: NaiveDate,

    pub amount_paid: Decimal,
    pub refund_amount: Decimal,

    pub status: BookingStatus,
    pub payment_status: PaymentStatus,

    /// Hold this booking was converted from
    pub hold_id: Option<Uuid>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Booking {
    pub fn stay(&self) -> StayRange {
        StayRange::new(self.check_in, self.check_out)
    }

    pub fn nights(&self) -> u32 {
        self.stay().nights()
    }

    pub fn guest_count(&self) -> u32 {
        self.men + self.women
    }

    /// Beds of this booking count against inventory
    pub fn is_occupying(&self) -> bool {
        self.status.is_occupying() && self.payment_status.is_occupying()
    }

    /// Group of women only; pins a flexible room to its restricted policy
    pub fn is_restricted_group(&self) -> bool {
        self.men == 0 && self.women > 0
    }

    /// Move to `next`, rejecting transitions the lifecycle does not allow
    pub fn transition_to(&mut self, next: BookingStatus, now: DateTime<Utc>) -> Result<(), AppError> {
        if !self.status.can_transition_to(next) {
            return Err(AppError::InvalidTransition(format!(
                "booking {} cannot move from {} to {}",
                self.id, self.status, next
            )));
        }
        self.status = next;
        self.updated_at = now;
        Ok(())
    }

    /// Apply a payment outcome. `Paid` forces the booking to confirmed.
    pub fn apply_payment(&mut self, next: PaymentStatus, now: DateTime<Utc>) -> Result<(), AppError> {
        if !self.payment_status.can_transition_to(next) {
            return Err(AppError::InvalidTransition(format!(
                "booking {} payment cannot move from {} to {}",
                self.id, self.payment_status, next
            )));
        }

        if next == PaymentStatus::Paid {
            match self.status {
                BookingStatus::Pending => self.status = BookingStatus::Confirmed,
                BookingStatus::Confirmed => {}
                other => {
                    return Err(AppError::InvalidTransition(format!(
                        "booking {} is {} and cannot accept a payment",
                        self.id, other
                    )))
                }
            }
            if self.amount_paid < self.deposit_amount {
                self.amount_paid = self.deposit_amount;
            }
        }

        self.payment_status = next;
        self.updated_at = now;
        Ok(())
    }
}

/// Guest details supplied with a booking request
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct GuestDetails {
    #[validate(email(message = "Invalid email format"))]
    pub email: String,

    #[validate(length(min = 1, max = 120, message = "Guest name is required"))]
    pub name: String,

    #[validate(length(max = 32))]
    pub phone: Option<String>,
}

/// Request to create a booking
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct BookingRequest {
    #[validate(nested)]
    pub guest: GuestDetails,

    pub check_in: NaiveDate,
    pub check_out: NaiveDate,

    #[validate(length(min = 1, message = "At least one bed is required"))]
    pub beds: Vec<BedSelection>,

    #[serde(default)]
    pub men: u32,
    #[serde(default)]
    pub women: u32,

    /// Hold taken for these beds while the guest paid
    #[serde(default)]
    pub hold_id: Option<Uuid>,
}

impl BookingRequest {
    pub fn stay(&self) -> StayRange {
        StayRange::new(self.check_in, self.check_out)
    }

    pub fn guest_count(&self) -> u32 {
        self.men + self.women
    }
}
