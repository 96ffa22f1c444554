//! Domain models for Bunkhouse
//!
//! This module contains all the core domain models used throughout the application.

pub mod booking;
pub mod calendar;
pub mod event;
pub mod guest;
pub mod hold;
pub mod room;
pub mod stay;

pub use booking::{Booking, BookingRequest, BookingStatus, GuestDetails, PaymentStatus};
pub use calendar::ExternalBlock;
pub use event::{BookingEvent, BookingEventKind};
pub use guest::{normalize_email, Guest};
pub use hold::{Hold, HoldStatus};
pub use room::{GenderPolicy, Room, RoomId};
pub use stay::{BedSelection, StayRange};
