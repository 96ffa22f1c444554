//! In-memory repositories
//!
//! Same contracts as the PostgreSQL repositories, including the rejection of
//! overlapping active bed assignments. Used by tests and local runs.

use async_trait::async_trait;
use bunkhouse_core::{
    models::{normalize_email, Booking, ExternalBlock, Guest, GuestDetails, StayRange},
    traits::{BookingRepository, GuestRepository, Repository, ShadowBlockSource},
    AppError, AppResult,
};
use chrono::Utc;
use parking_lot::RwLock;
use std::collections::HashMap;
use tracing::{debug, warn};
use uuid::Uuid;

fn page<T: Clone>(mut items: Vec<T>, limit: i64, offset: i64) -> Vec<T> {
    let offset = offset.max(0) as usize;
    let limit = limit.max(0) as usize;
    if offset >= items.len() {
        return Vec::new();
    }
    items.drain(..offset);
    items.truncate(limit);
    items
}

/// Booking store backed by a map
#[derive(Default)]
pub struct MemoryBookingRepository {
    bookings: RwLock<HashMap<Uuid, Booking>>,
}

impl MemoryBookingRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reject `candidate` if one of its beds is held by another occupying booking
    fn check_overlap(bookings: &HashMap<Uuid, Booking>, candidate: &Booking) -> AppResult<()> {
        if !candidate.is_occupying() {
            return Ok(());
        }
        let stay = candidate.stay();
        let clash = bookings.values().find(|other| {
            other.id != candidate.id
                && other.is_occupying()
                && other.stay().overlaps(&stay)
                && other.beds.iter().any(|bed| candidate.beds.contains(bed))
        });
        match clash {
            Some(other) => {
                warn!(
                    "Booking {} overlaps beds of booking {}",
                    candidate.id, other.id
                );
                Err(AppError::Conflict(
                    "bed is already booked for overlapping dates".to_string(),
                ))
            }
            None => Ok(()),
        }
    }
}

#[async_trait]
impl Repository<Booking, Uuid> for MemoryBookingRepository {
    async fn find_by_id(&self, id: Uuid) -> AppResult<Option<Booking>> {
        Ok(self.bookings.read().get(&id).cloned())
    }

    async fn find_all(&self, limit: i64, offset: i64) -> AppResult<Vec<Booking>> {
        let mut all: Vec<Booking> = self.bookings.read().values().cloned().collect();
        all.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(page(all, limit, offset))
    }

    async fn count(&self) -> AppResult<i64> {
        Ok(self.bookings.read().len() as i64)
    }

    async fn create(&self, entity: &Booking) -> AppResult<Booking> {
        let mut bookings = self.bookings.write();
        if bookings.contains_key(&entity.id) {
            return Err(AppError::Conflict(format!(
                "booking {} already exists",
                entity.id
            )));
        }
        Self::check_overlap(&bookings, entity)?;
        bookings.insert(entity.id, entity.clone());
        debug!("Booking {} stored in memory", entity.id);
        Ok(entity.clone())
    }

    async fn update(&self, entity: &Booking) -> AppResult<Booking> {
        let mut bookings = self.bookings.write();
        if !bookings.contains_key(&entity.id) {
            return Err(AppError::BookingNotFound(entity.id));
        }
        Self::check_overlap(&bookings, entity)?;
        bookings.insert(entity.id, entity.clone());
        Ok(entity.clone())
    }
}

#[async_trait]
impl BookingRepository for MemoryBookingRepository {
    async fn find_active_overlapping(&self, range: StayRange) -> AppResult<Vec<Booking>> {
        let mut found: Vec<Booking> = self
            .bookings
            .read()
            .values()
            .filter(|b| b.is_occupying() && b.stay().overlaps(&range))
            .cloned()
            .collect();
        found.sort_by(|a, b| (a.check_in, a.created_at).cmp(&(b.check_in, b.created_at)));
        Ok(found)
    }

    async fn find_by_guest(&self, guest_id: Uuid) -> AppResult<Vec<Booking>> {
        let mut found: Vec<Booking> = self
            .bookings
            .read()
            .values()
            .filter(|b| b.guest_id == guest_id)
            .cloned()
            .collect();
        found.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(found)
    }
}

/// Guest store backed by a map
#[derive(Default)]
pub struct MemoryGuestRepository {
    guests: RwLock<HashMap<Uuid, Guest>>,
}

impl MemoryGuestRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Repository<Guest, Uuid> for MemoryGuestRepository {
    async fn find_by_id(&self, id: Uuid) -> AppResult<Option<Guest>> {
        Ok(self.guests.read().get(&id).cloned())
    }

    async fn find_all(&self, limit: i64, offset: i64) -> AppResult<Vec<Guest>> {
        let mut all: Vec<Guest> = self.guests.read().values().cloned().collect();
        all.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(page(all, limit, offset))
    }

    async fn count(&self) -> AppResult<i64> {
        Ok(self.guests.read().len() as i64)
    }

    async fn create(&self, entity: &Guest) -> AppResult<Guest> {
        let mut guests = self.guests.write();
        let email = normalize_email(&entity.email);
        if guests.values().any(|g| g.email == email) {
            return Err(AppError::Conflict(format!("guest {} already exists", email)));
        }
        let mut guest = entity.clone();
        guest.email = email;
        guests.insert(guest.id, guest.clone());
        Ok(guest)
    }

    async fn update(&self, entity: &Guest) -> AppResult<Guest> {
        let mut guests = self.guests.write();
        let guest = guests
            .get_mut(&entity.id)
            .ok_or_else(|| AppError::GuestNotFound(entity.id.to_string()))?;
        guest.name = entity.name.clone();
        guest.phone = entity.phone.clone();
        guest.updated_at = Utc::now();
        Ok(guest.clone())
    }
}

#[async_trait]
impl GuestRepository for MemoryGuestRepository {
    async fn find_by_email(&self, email: &str) -> AppResult<Option<Guest>> {
        let email = normalize_email(email);
        Ok(self
            .guests
            .read()
            .values()
            .find(|g| g.email == email)
            .cloned())
    }

    async fn upsert_by_email(&self, details: &GuestDetails) -> AppResult<Guest> {
        let email = normalize_email(&details.email);
        let mut guests = self.guests.write();

        if let Some(existing) = guests.values_mut().find(|g| g.email == email) {
            existing.name = details.name.trim().to_string();
            if details.phone.is_some() {
                existing.phone = details.phone.clone();
            }
            existing.updated_at = Utc::now();
            return Ok(existing.clone());
        }

        let guest = Guest::new(&email, &details.name, details.phone.clone(), Utc::now());
        guests.insert(guest.id, guest.clone());
        Ok(guest)
    }
}

/// Fixed list of calendar blocks, replaceable at runtime
#[derive(Default)]
pub struct StaticBlockSource {
    blocks: RwLock<Vec<ExternalBlock>>,
}

impl StaticBlockSource {
    pub fn new(blocks: Vec<ExternalBlock>) -> Self {
        Self {
            blocks: RwLock::new(blocks),
        }
    }

    /// Replace all blocks, as a feed refresh would
    pub fn replace(&self, blocks: Vec<ExternalBlock>) {
        *self.blocks.write() = blocks;
    }
}

#[async_trait]
impl ShadowBlockSource for StaticBlockSource {
    async fn blocks_overlapping(&self, range: StayRange) -> AppResult<Vec<ExternalBlock>> {
        Ok(self
            .blocks
            .read()
            .iter()
            .filter(|block| block.stay().overlaps(&range))
            .cloned()
            .collect())
    }
}
