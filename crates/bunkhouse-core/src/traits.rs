//! Common traits for repositories and collaborators
//!
//! Defines abstractions for durable storage, the advisory lock store, the
//! external calendar feed and notification sinks.

use crate::error::AppError;
use crate::models::{Booking, BookingEvent, ExternalBlock, Guest, GuestDetails, StayRange};
use async_trait::async_trait;
use uuid::Uuid;

/// Generic repository trait for CRUD operations
#[async_trait]
pub trait Repository<T, ID>: Send + Sync {
    /// Find entity by ID
    async fn find_by_id(&self, id: ID) -> Result<Option<T>, AppError>;

    /// Find all entities with pagination
    async fn find_all(&self, limit: i64, offset: i64) -> Result<Vec<T>, AppError>;

    /// Count total entities
    async fn count(&self) -> Result<i64, AppError>;

    /// Create a new entity
    async fn create(&self, entity: &T) -> Result<T, AppError>;

    /// Update an existing entity
    async fn update(&self, entity: &T) -> Result<T, AppError>;
}

/// Booking repository trait with specialized methods
///
/// `create` must persist the booking row and every bed assignment
/// atomically. A bed assignment that collides with another active booking
/// surfaces as [`AppError::Conflict`].
#[async_trait]
pub trait BookingRepository: Repository<Booking, Uuid> {
    /// Bookings overlapping `range` whose beds still count as occupied
    async fn find_active_overlapping(&self, range: StayRange) -> Result<Vec<Booking>, AppError>;

    /// Bookings belonging to a guest, newest first
    async fn find_by_guest(&self, guest_id: Uuid) -> Result<Vec<Booking>, AppError>;
}

/// Guest repository trait with specialized methods
#[async_trait]
pub trait GuestRepository: Repository<Guest, Uuid> {
    /// Find guest by email (case-insensitive)
    async fn find_by_email(&self, email: &str) -> Result<Option<Guest>, AppError>;

    /// Insert a guest, or refresh name/phone of the guest with this email
    async fn upsert_by_email(&self, details: &GuestDetails) -> Result<Guest, AppError>;
}

/// Advisory lock store shared across engine instances
///
/// Values are opaque strings. Entries expire after their TTL; an expired
/// entry behaves exactly like an absent one.
#[async_trait]
pub trait LockStore: Send + Sync {
    /// Get a value by key
    async fn get(&self, key: &str) -> Result<Option<String>, AppError>;

    /// Set a value with a TTL, overwriting any existing entry
    async fn set_ex(&self, key: &str, value: &str, ttl_secs: u64) -> Result<(), AppError>;

    /// Set a value only if the key is absent. Returns `true` if it was set.
    async fn set_nx_ex(&self, key: &str, value: &str, ttl_secs: u64) -> Result<bool, AppError>;

    /// Delete a key. Returns `true` if it existed.
    async fn delete(&self, key: &str) -> Result<bool, AppError>;

    /// Delete a key only while it still holds `expected`
    async fn delete_if_eq(&self, key: &str, expected: &str) -> Result<bool, AppError>;

    /// Overwrite a key with `value` and a fresh TTL only while it still holds
    /// `expected`. Returns `true` if it was replaced.
    async fn replace_if_eq(
        &self,
        key: &str,
        expected: &str,
        value: &str,
        ttl_secs: u64,
    ) -> Result<bool, AppError>;

    /// All live `(key, value)` pairs whose key starts with `prefix`
    async fn list_by_prefix(&self, prefix: &str) -> Result<Vec<(String, String)>, AppError>;
}

/// External calendar import
#[async_trait]
pub trait ShadowBlockSource: Send + Sync {
    /// Blocks overlapping `range`
    async fn blocks_overlapping(&self, range: StayRange) -> Result<Vec<ExternalBlock>, AppError>;
}

/// Receiver of post-commit booking notifications
#[async_trait]
pub trait BookingEventSink: Send + Sync {
    /// Sink name used in logs
    fn name(&self) -> &str;

    /// Deliver one event
    async fn publish(&self, event: &BookingEvent) -> Result<(), AppError>;
}
