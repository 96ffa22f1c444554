//! Shared harness for service integration tests
//!
//! Builds an engine over the in-memory adapters with a pinned clock.

#![allow(dead_code)]

use async_trait::async_trait;
use bunkhouse_cache::MemoryLockStore;
use bunkhouse_core::{
    models::{BedSelection, BookingEvent, BookingEventKind, BookingRequest, GenderPolicy, GuestDetails, Room},
    traits::BookingEventSink,
    AppConfig, AppResult, FixedClock,
};
use bunkhouse_db::{MemoryBookingRepository, MemoryGuestRepository, StaticBlockSource};
use bunkhouse_services::{Adapters, Engine};
use chrono::{NaiveDate, TimeZone, Utc};
use parking_lot::Mutex;
use rust_decimal_macros::dec;
use std::sync::Arc;
use std::time::Duration;

/// Sink keeping every event it receives
#[derive(Default)]
pub struct RecordingSink {
    events: Mutex<Vec<BookingEvent>>,
}

impl RecordingSink {
    /// Wait until `count` events of `kind` arrived
    pub async fn wait_for(&self, kind: BookingEventKind, count: usize) -> Vec<BookingEvent> {
        for _ in 0..200 {
            let found: Vec<BookingEvent> = self
                .events
                .lock()
                .iter()
                .filter(|e| e.kind == kind)
                .cloned()
                .collect();
            if found.len() >= count {
                return found;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("timed out waiting for {} {} events", count, kind);
    }
}

#[async_trait]
impl BookingEventSink for RecordingSink {
    fn name(&self) -> &str {
        "recording"
    }

    async fn publish(&self, event: &BookingEvent) -> AppResult<()> {
        self.events.lock().push(event.clone());
        Ok(())
    }
}

pub struct Harness {
    pub clock: Arc<FixedClock>,
    pub engine: Engine,
    pub store: Arc<MemoryLockStore>,
    pub blocks: Arc<StaticBlockSource>,
    pub sink: Arc<RecordingSink>,
}

pub const MIXED_ROOM: u32 = 1;
pub const FEMALE_ROOM: u32 = 2;
pub const FLEX_ROOM: u32 = 3;

fn room(id: u32, name: &str, capacity: u32, policy: GenderPolicy, flexible: bool) -> Room {
    Room {
        id,
        name: Some(name.to_string()),
        capacity,
        gender_policy: policy,
        is_flexible: flexible,
        auto_convert_hours: if flexible { 48 } else { 0 },
        base_price: dec!(60),
    }
}

/// Engine pinned to 2025-06-01 10:00 UTC with three rooms:
/// mixed (8 beds), female-only (6 beds), flexible (4 beds, opens 48h before check-in)
pub fn harness() -> Harness {
    let clock = Arc::new(FixedClock::new(
        Utc.with_ymd_and_hms(2025, 6, 1, 10, 0, 0).unwrap(),
    ));
    let store = Arc::new(MemoryLockStore::new(clock.clone()));
    let blocks = Arc::new(StaticBlockSource::default());
    let sink = Arc::new(RecordingSink::default());

    let mut config = AppConfig::default();
    config.rooms = vec![
        room(MIXED_ROOM, "Sunrise", 8, GenderPolicy::Mixed, false),
        room(FEMALE_ROOM, "Orchid", 6, GenderPolicy::FemaleOnly, false),
        room(FLEX_ROOM, "Lagoon", 4, GenderPolicy::FemaleOnly, true),
    ];

    let engine = Engine::new(
        &config,
        Adapters {
            bookings: Arc::new(MemoryBookingRepository::new()),
            guests: Arc::new(MemoryGuestRepository::new()),
            lock_store: store.clone(),
            blocks: blocks.clone(),
            sinks: vec![sink.clone() as Arc<dyn BookingEventSink>],
            clock: clock.clone(),
        },
    )
    .unwrap();

    Harness {
        clock,
        engine,
        store,
        blocks,
        sink,
    }
}

pub fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

pub fn beds(room_id: u32, numbers: &[u32]) -> Vec<BedSelection> {
    numbers
        .iter()
        .map(|n| BedSelection::new(room_id, *n))
        .collect()
}

pub fn request(check_in: NaiveDate, check_out: NaiveDate, beds: Vec<BedSelection>, men: u32, women: u32) -> BookingRequest {
    BookingRequest {
        guest: GuestDetails {
            email: "ana@example.com".to_string(),
            name: "Ana Souza".to_string(),
            phone: None,
        },
        check_in,
        check_out,
        beds,
        men,
        women,
        hold_id: None,
    }
}
