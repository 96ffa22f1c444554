//! Post-commit booking events

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use super::booking::Booking;

/// What happened to a booking
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BookingEventKind {
    Created,
    PaymentConfirmed,
    Cancelled,
}

impl fmt::Display for BookingEventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BookingEventKind::Created => write!(f, "booking_created"),
            BookingEventKind::PaymentConfirmed => write!(f, "payment_confirmed"),
            BookingEventKind::Cancelled => write!(f, "booking_cancelled"),
        }
    }
}

/// Notification carrying a snapshot of the booking at emission time
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BookingEvent {
    pub id: Uuid,
    pub kind: BookingEventKind,
    pub booking: Booking,
    pub guest_email: Option<String>,

    /// Refund issued, for cancellations
    #[serde(default)]
    pub refund_amount: Option<Decimal>,

    pub occurred_at: DateTime<Utc>,
}

impl BookingEvent {
    pub fn new(kind: BookingEventKind, booking: &Booking, occurred_at: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            kind,
            booking: booking.clone(),
            guest_email: None,
            refund_amount: None,
            occurred_at,
        }
    }

    pub fn with_guest_email(mut self, email: impl Into<String>) -> Self {
        self.guest_email = Some(email.into());
        self
    }

    pub fn with_refund(mut self, amount: Decimal) -> Self {
        self.refund_amount = Some(amount);
        self
    }
}
