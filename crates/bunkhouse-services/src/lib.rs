//! Bunkhouse Services Library
//!
//! Business logic of the bed-reservation engine:
//!
//! - [`catalog`] - room catalog and flexible-room policy
//! - [`allocation`] - gender rules, bed-selection checks and suggestions
//! - [`inventory`] - occupancy merged from bookings, holds and calendar blocks
//! - [`holds`] - temporary bed holds in the shared lock store
//! - [`pricing`] - group discounts, seasons and deposits
//! - [`cancellation`] - refund tiers
//! - [`booking`] - the booking flow tying everything together
//! - [`events`] - post-commit notifications with retry
//!
//! [`Engine`] wires the services to a set of storage adapters.

pub mod allocation;
pub mod booking;
pub mod cancellation;
pub mod catalog;
pub mod events;
pub mod holds;
pub mod inventory;
pub mod occupancy;
pub mod pricing;

pub use allocation::{AccommodationCheck, AllocationValidator, SelectionReport};
pub use booking::{BookingConfirmation, BookingOrchestrator, BookingServices, Cancellation};
pub use cancellation::{CancellationPolicy, RefundDecision, RefundTier};
pub use catalog::RoomCatalog;
pub use events::{retry_with_backoff, EventDispatcher};
pub use holds::{HoldManager, HoldStore};
pub use inventory::{InventoryResolver, RoomAvailability};
pub use occupancy::OccupancySnapshot;
pub use pricing::{DepositSplit, PriceBreakdown, PricingEngine, Season};

use bunkhouse_core::{
    traits::{BookingEventSink, BookingRepository, GuestRepository, LockStore, ShadowBlockSource},
    AppConfig, AppResult, Clock,
};
use std::sync::Arc;
use tracing::info;

/// Storage and notification backends
pub struct Adapters {
    pub bookings: Arc<dyn BookingRepository>,
    pub guests: Arc<dyn GuestRepository>,
    pub lock_store: Arc<dyn LockStore>,
    pub blocks: Arc<dyn ShadowBlockSource>,
    pub sinks: Vec<Arc<dyn BookingEventSink>>,
    pub clock: Arc<dyn Clock>,
}

/// Fully wired engine
pub struct Engine {
    pub catalog: Arc<RoomCatalog>,
    pub allocation: Arc<AllocationValidator>,
    pub pricing: Arc<PricingEngine>,
    pub inventory: Arc<InventoryResolver>,
    pub holds: Arc<HoldManager>,
    pub bookings: Arc<BookingOrchestrator>,
}

impl Engine {
    pub fn new(config: &AppConfig, adapters: Adapters) -> AppResult<Self> {
        let catalog = Arc::new(RoomCatalog::from_config(config)?);

        let allocation = Arc::new(AllocationValidator::new(
            catalog.clone(),
            config.allocation.mixed_group_threshold,
        ));
        let pricing = Arc::new(PricingEngine::new(
            catalog.clone(),
            config.pricing.clone(),
            config.booking.remaining_charge_lead_days,
        ));
        let holds = Arc::new(HoldManager::new(
            adapters.lock_store.clone(),
            adapters.bookings.clone(),
            catalog.clone(),
            adapters.clock.clone(),
            config.holds.clone(),
        ));
        let inventory = Arc::new(InventoryResolver::new(
            catalog.clone(),
            adapters.bookings.clone(),
            holds.hold_store().clone(),
            adapters.blocks.clone(),
            adapters.clock.clone(),
            config.calendar.clone(),
        ));

        let bookings = Arc::new(BookingOrchestrator::new(
            BookingServices {
                inventory: inventory.clone(),
                allocation: allocation.clone(),
                pricing: pricing.clone(),
                holds: holds.clone(),
                bookings: adapters.bookings,
                guests: adapters.guests,
                events: EventDispatcher::new(adapters.sinks, config.retry.clone()),
                clock: adapters.clock,
            },
            config.booking.clone(),
            &config.cancellation,
        ));

        info!(
            "Engine ready: {} rooms, {} beds",
            catalog.len(),
            catalog.total_capacity()
        );

        Ok(Self {
            catalog,
            allocation,
            pricing,
            inventory,
            holds,
            bookings,
        })
    }
}
