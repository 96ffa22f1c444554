//! Booking orchestrator
//!
//! Runs the booking flow end to end:
//! - Validate the request and the stay dates
//! - Read occupancy and validate the bed selection
//! - Price the stay and split the deposit
//! - Re-verify availability, then write guest and booking
//! - Confirm the originating hold and emit events after the write
//!
//! Nothing after the durable write can fail the booking.

use bunkhouse_core::{
    config::{BookingConfig, CancellationConfig},
    models::{
        BedSelection, Booking, BookingEvent, BookingEventKind, BookingRequest, BookingStatus,
        Guest, HoldStatus, PaymentStatus, StayRange,
    },
    traits::{BookingRepository, GuestRepository},
    AppError, AppResult, Clock,
};
use rust_decimal::Decimal;
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;
use validator::Validate;

use crate::allocation::AllocationValidator;
use crate::cancellation::{CancellationPolicy, RefundDecision};
use crate::events::EventDispatcher;
use crate::holds::HoldManager;
use crate::inventory::InventoryResolver;
use crate::pricing::{DepositSplit, PriceBreakdown, PricingEngine};

/// Result of a successful booking
#[derive(Debug, Clone, Serialize)]
pub struct BookingConfirmation {
    pub booking: Booking,
    pub guest: Guest,
    pub price: PriceBreakdown,
    pub deposit: DepositSplit,
}

/// Result of a cancellation
#[derive(Debug, Clone, Serialize)]
pub struct Cancellation {
    pub booking: Booking,
    pub refund: RefundDecision,
}

/// Collaborators the orchestrator drives
pub struct BookingServices {
    pub inventory: Arc<InventoryResolver>,
    pub allocation: Arc<AllocationValidator>,
    pub pricing: Arc<PricingEngine>,
    pub holds: Arc<HoldManager>,
    pub bookings: Arc<dyn BookingRepository>,
    pub guests: Arc<dyn GuestRepository>,
    pub events: EventDispatcher,
    pub clock: Arc<dyn Clock>,
}

pub struct BookingOrchestrator {
    services: BookingServices,
    cancellation: CancellationPolicy,
    config: BookingConfig,
}

impl BookingOrchestrator {
    pub fn new(services: BookingServices, config: BookingConfig, cancellation: &CancellationConfig) -> Self {
        Self {
            services,
            cancellation: CancellationPolicy::new(cancellation),
            config,
        }
    }

    /// Create a booking
    ///
    /// # Errors
    ///
    /// Returns error if:
    /// - The request or its dates are invalid (`Validation`)
    /// - The bed selection breaks a room rule (`InvalidSelection`)
    /// - A bed is taken, before or during processing (`BedUnavailable`, `Conflict`)
    /// - The referenced hold is missing, expired or for other beds
    #[instrument(skip(self, request), fields(email = %request.guest.email, beds = request.beds.len()))]
    pub async fn create_booking(&self, request: BookingRequest) -> AppResult<BookingConfirmation> {
        request.validate()?;

        let range = request.stay();
        self.validate_dates(range)?;

        if let Some(hold_id) = request.hold_id {
            self.check_hold_matches(hold_id, &request).await?;
        }

        let snapshot = self
            .services
            .inventory
            .occupancy(range, request.hold_id)
            .await?;
        self.services
            .allocation
            .validate_bed_selection(&request.beds, request.men, request.women, &snapshot)
            .into_result()?;

        let price = self
            .services
            .pricing
            .calculate_price(&request.beds, range.nights(), range.check_in)?;
        let deposit = self
            .services
            .pricing
            .calculate_deposit(price.total, request.guest_count());

        // Last guard before the write
        if !self
            .services
            .inventory
            .verify_beds_available(&request.beds, range, request.hold_id)
            .await?
        {
            warn!("Beds for {} were taken during processing", range);
            return Err(AppError::Conflict(
                "selected beds were taken while the booking was processed".to_string(),
            ));
        }

        let guest = self.services.guests.upsert_by_email(&request.guest).await?;

        let now = self.services.clock.now();
        let booking = Booking {
            id: Uuid::new_v4(),
            guest_id: guest.id,
            check_in: range.check_in,
            check_out: range.check_out,
            beds: request.beds.clone(),
            men: request.men,
            women: request.women,
            total_price: price.total,
            deposit_amount: deposit.deposit,
            remaining_amount: deposit.remaining,
            remaining_due_on: self
                .services
                .pricing
                .remaining_charge_date(range.check_in, self.services.clock.today()),
            amount_paid: Decimal::ZERO,
            refund_amount: Decimal::ZERO,
            status: BookingStatus::Pending,
            payment_status: PaymentStatus::Pending,
            hold_id: request.hold_id,
            created_at: now,
            updated_at: now,
        };
        let booking = self.services.bookings.create(&booking).await?;

        info!(
            "Booking {} created for {}: {} beds {} total {}",
            booking.id,
            guest.email,
            booking.beds.len(),
            range,
            booking.total_price
        );

        if let Some(hold_id) = booking.hold_id {
            if let Err(e) = self
                .services
                .holds
                .confirm_hold(hold_id, booking.payment_status)
                .await
            {
                error!("Failed to confirm hold {} for booking {}: {}", hold_id, booking.id, e);
            }
        }

        self.emit(
            BookingEvent::new(BookingEventKind::Created, &booking, now).with_guest_email(guest.email.clone()),
        );

        Ok(BookingConfirmation {
            booking,
            guest,
            price,
            deposit,
        })
    }

    /// Apply a payment outcome. Only `Paid` and `Failed` are accepted.
    #[instrument(skip(self))]
    pub async fn record_payment(&self, booking_id: Uuid, status: PaymentStatus) -> AppResult<Booking> {
        if !matches!(status, PaymentStatus::Paid | PaymentStatus::Failed) {
            return Err(AppError::Validation(format!(
                "payment status {} cannot be recorded directly",
                status
            )));
        }

        let mut booking = self.load(booking_id).await?;
        let now = self.services.clock.now();
        booking.apply_payment(status, now)?;
        let booking = self.services.bookings.update(&booking).await?;

        info!("Booking {} payment {}", booking.id, booking.payment_status);

        if status == PaymentStatus::Paid {
            let mut event = BookingEvent::new(BookingEventKind::PaymentConfirmed, &booking, now);
            if let Some(email) = self.guest_email(booking.guest_id).await {
                event = event.with_guest_email(email);
            }
            self.emit(event);
        }
        Ok(booking)
    }

    /// Cancel a booking and compute the refund owed
    #[instrument(skip(self))]
    pub async fn cancel_booking(&self, booking_id: Uuid) -> AppResult<Cancellation> {
        let mut booking = self.load(booking_id).await?;
        let now = self.services.clock.now();
        booking.transition_to(BookingStatus::Cancelled, now)?;

        let days_before = (booking.check_in - self.services.clock.today()).num_days();
        let refund = self.cancellation.refund_for(
            booking.amount_paid,
            days_before,
            self.services.pricing.is_carnival(booking.check_in),
        );

        if refund.refund > Decimal::ZERO && booking.payment_status == PaymentStatus::Paid {
            booking.apply_payment(PaymentStatus::Refunded, now)?;
            booking.refund_amount = refund.refund;
        }

        let booking = self.services.bookings.update(&booking).await?;
        info!(
            "Booking {} cancelled {} days before check-in, refund {} ({:?})",
            booking.id, days_before, refund.refund, refund.tier
        );

        let mut event = BookingEvent::new(BookingEventKind::Cancelled, &booking, now).with_refund(refund.refund);
        if let Some(email) = self.guest_email(booking.guest_id).await {
            event = event.with_guest_email(email);
        }
        self.emit(event);

        Ok(Cancellation { booking, refund })
    }

    #[instrument(skip(self))]
    pub async fn check_in(&self, booking_id: Uuid) -> AppResult<Booking> {
        self.advance(booking_id, BookingStatus::CheckedIn).await
    }

    #[instrument(skip(self))]
    pub async fn check_out(&self, booking_id: Uuid) -> AppResult<Booking> {
        self.advance(booking_id, BookingStatus::CheckedOut).await
    }

    pub async fn get_booking(&self, booking_id: Uuid) -> AppResult<Booking> {
        self.load(booking_id).await
    }

    /// Bookings of the guest with `email`, newest first
    pub async fn bookings_for_guest(&self, email: &str) -> AppResult<Vec<Booking>> {
        let guest = self
            .services
            .guests
            .find_by_email(email)
            .await?
            .ok_or_else(|| AppError::GuestNotFound(email.to_string()))?;
        self.services.bookings.find_by_guest(guest.id).await
    }

    /// Suggest beds for a group over `range`
    pub async fn suggest_beds(&self, range: StayRange, men: u32, women: u32) -> AppResult<Vec<BedSelection>> {
        let snapshot = self.services.inventory.occupancy(range, None).await?;
        self.services
            .allocation
            .suggest_bed_distribution(men, women, &snapshot)
    }

    fn validate_dates(&self, range: StayRange) -> AppResult<()> {
        let today = self.services.clock.today();

        if range.check_in < today {
            return Err(AppError::Validation(format!(
                "check-in {} is in the past",
                range.check_in
            )));
        }
        if !range.is_valid() {
            return Err(AppError::Validation(
                "check-out must be after check-in".to_string(),
            ));
        }

        let nights = range.nights();
        if nights < self.config.min_nights || nights > self.config.max_nights {
            return Err(AppError::Validation(format!(
                "stay must be between {} and {} nights, got {}",
                self.config.min_nights, self.config.max_nights, nights
            )));
        }

        let advance = (range.check_in - today).num_days();
        if advance > self.config.max_advance_days {
            return Err(AppError::Validation(format!(
                "check-in is {} days ahead, the limit is {}",
                advance, self.config.max_advance_days
            )));
        }

        self.services.pricing.validate_min_stay(range.check_in, nights)
    }

    /// The hold must be live and cover exactly the requested beds and dates
    async fn check_hold_matches(&self, hold_id: Uuid, request: &BookingRequest) -> AppResult<()> {
        let hold = self.services.holds.get_hold(hold_id).await?;

        match hold.status {
            HoldStatus::Active => {}
            HoldStatus::Expired => return Err(AppError::HoldExpired(hold_id)),
            other => {
                return Err(AppError::InvalidTransition(format!(
                    "hold {} is {}",
                    hold_id, other
                )))
            }
        }

        let mut held = hold.beds.clone();
        let mut requested = request.beds.clone();
        held.sort();
        requested.sort();
        if held != requested || hold.stay() != request.stay() {
            return Err(AppError::Validation(format!(
                "hold {} does not cover the requested beds and dates",
                hold_id
            )));
        }
        debug!("Booking request matches hold {}", hold_id);
        Ok(())
    }

    async fn advance(&self, booking_id: Uuid, next: BookingStatus) -> AppResult<Booking> {
        let mut booking = self.load(booking_id).await?;
        booking.transition_to(next, self.services.clock.now())?;
        let booking = self.services.bookings.update(&booking).await?;
        info!("Booking {} is now {}", booking.id, booking.status);
        Ok(booking)
    }

    async fn load(&self, booking_id: Uuid) -> AppResult<Booking> {
        self.services
            .bookings
            .find_by_id(booking_id)
            .await?
            .ok_or(AppError::BookingNotFound(booking_id))
    }

    async fn guest_email(&self, guest_id: Uuid) -> Option<String> {
        match self.services.guests.find_by_id(guest_id).await {
            Ok(guest) => guest.map(|g| g.email),
            Err(e) => {
                warn!("Could not load guest {} for event: {}", guest_id, e);
                None
            }
        }
    }

    fn emit(&self, event: BookingEvent) {
        if self.services.events.sink_count() == 0 {
            return;
        }
        debug!("Dispatching {} for booking {}", event.kind, event.booking.id);
        self.services.events.dispatch(event);
    }
}
