//! Integration tests for the booking flow
//!
//! Runs the full engine over the in-memory adapters.

mod common;

#[cfg(test)]
mod tests {
    use super::common::*;
    use bunkhouse_core::models::{
        BedSelection, BookingEventKind, BookingStatus, ExternalBlock, HoldStatus, PaymentStatus, StayRange,
    };
    use bunkhouse_core::{AppError, ErrorKind};
    use bunkhouse_services::RefundTier;
    use chrono::{Duration, TimeZone, Utc};
    use proptest::prelude::*;
    use rust_decimal_macros::dec;

    #[tokio::test]
    async fn test_create_booking_prices_and_notifies() {
        let h = harness();
        let confirmation = h
            .engine
            .bookings
            .create_booking(request(
                date(2025, 7, 10),
                date(2025, 7, 13),
                beds(MIXED_ROOM, &[1, 2]),
                1,
                1,
            ))
            .await
            .unwrap();

        let booking = &confirmation.booking;
        assert_eq!(booking.status, BookingStatus::Pending);
        assert_eq!(booking.payment_status, PaymentStatus::Pending);
        assert_eq!(booking.total_price, dec!(288.00));
        assert_eq!(booking.deposit_amount, dec!(86.40));
        assert_eq!(booking.remaining_amount, dec!(201.60));
        assert_eq!(booking.remaining_due_on, date(2025, 7, 3));
        assert_eq!(confirmation.guest.email, "ana@example.com");

        let events = h.sink.wait_for(BookingEventKind::Created, 1).await;
        assert_eq!(events[0].booking.id, booking.id);
        assert_eq!(events[0].guest_email.as_deref(), Some("ana@example.com"));
    }

    #[tokio::test]
    async fn test_booked_beds_are_occupied_for_their_range() {
        let h = harness();
        let range = StayRange::new(date(2025, 7, 10), date(2025, 7, 13));
        let booking = h
            .engine
            .bookings
            .create_booking(request(range.check_in, range.check_out, beds(MIXED_ROOM, &[3, 5]), 2, 0))
            .await
            .unwrap()
            .booking;
        h.engine
            .bookings
            .record_payment(booking.id, PaymentStatus::Paid)
            .await
            .unwrap();

        for night in range.nights_iter() {
            let occupied = h
                .engine
                .inventory
                .get_occupied_beds(StayRange::new(night, night + Duration::days(1)))
                .await
                .unwrap();
            assert_eq!(occupied[&MIXED_ROOM], vec![3, 5]);
        }

        // Checkout morning is free
        let after = h
            .engine
            .inventory
            .get_occupied_beds(StayRange::new(date(2025, 7, 13), date(2025, 7, 14)))
            .await
            .unwrap();
        assert!(after.is_empty());
    }

    #[tokio::test]
    async fn test_overlapping_booking_is_a_conflict() {
        let h = harness();
        h.engine
            .bookings
            .create_booking(request(date(2025, 7, 10), date(2025, 7, 13), beds(MIXED_ROOM, &[1]), 1, 0))
            .await
            .unwrap();

        let err = h
            .engine
            .bookings
            .create_booking(request(date(2025, 7, 12), date(2025, 7, 14), beds(MIXED_ROOM, &[1]), 1, 0))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Conflict);
        assert!(matches!(err, AppError::BedUnavailable { bed } if bed == BedSelection::new(MIXED_ROOM, 1)));

        h.engine
            .bookings
            .create_booking(request(date(2025, 7, 13), date(2025, 7, 14), beds(MIXED_ROOM, &[1]), 1, 0))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_own_hold_does_not_block_its_booking() {
        let h = harness();
        let range = StayRange::new(date(2025, 8, 1), date(2025, 8, 4));
        let hold = h
            .engine
            .holds
            .start_hold(beds(MIXED_ROOM, &[4, 5]), range, None, serde_json::json!({"cart": "c-1"}))
            .await
            .unwrap();

        // Anyone else sees the beds as taken
        let err = h
            .engine
            .bookings
            .create_booking(request(range.check_in, range.check_out, beds(MIXED_ROOM, &[5]), 1, 0))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Conflict);

        let mut req = request(range.check_in, range.check_out, beds(MIXED_ROOM, &[5, 4]), 1, 1);
        req.hold_id = Some(hold.id);
        let booking = h.engine.bookings.create_booking(req).await.unwrap().booking;
        assert_eq!(booking.hold_id, Some(hold.id));

        let hold = h.engine.holds.get_hold(hold.id).await.unwrap();
        assert_eq!(hold.status, HoldStatus::Confirmed);
        assert_eq!(hold.payment_status, Some(PaymentStatus::Pending));
    }

    #[tokio::test]
    async fn test_hold_must_match_request() {
        let h = harness();
        let range = StayRange::new(date(2025, 8, 1), date(2025, 8, 4));
        let hold = h
            .engine
            .holds
            .start_hold(beds(MIXED_ROOM, &[4]), range, Some(5), serde_json::Value::Null)
            .await
            .unwrap();

        let mut req = request(range.check_in, range.check_out, beds(MIXED_ROOM, &[6]), 1, 0);
        req.hold_id = Some(hold.id);
        let err = h.engine.bookings.create_booking(req.clone()).await.unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));

        h.clock.advance(Duration::minutes(6));
        req.beds = beds(MIXED_ROOM, &[4]);
        let err = h.engine.bookings.create_booking(req).await.unwrap_err();
        assert!(matches!(err, AppError::HoldExpired(_)));
    }

    #[tokio::test]
    async fn test_payment_confirms_booking() {
        let h = harness();
        let booking = h
            .engine
            .bookings
            .create_booking(request(date(2025, 7, 10), date(2025, 7, 13), beds(MIXED_ROOM, &[1, 2]), 1, 1))
            .await
            .unwrap()
            .booking;

        let err = h
            .engine
            .bookings
            .record_payment(booking.id, PaymentStatus::Refunded)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);

        let failed = h
            .engine
            .bookings
            .record_payment(booking.id, PaymentStatus::Failed)
            .await
            .unwrap();
        assert_eq!(failed.status, BookingStatus::Pending);

        let paid = h
            .engine
            .bookings
            .record_payment(booking.id, PaymentStatus::Paid)
            .await
            .unwrap();
        assert_eq!(paid.status, BookingStatus::Confirmed);
        assert_eq!(paid.amount_paid, dec!(86.40));

        let events = h.sink.wait_for(BookingEventKind::PaymentConfirmed, 1).await;
        assert_eq!(events[0].booking.status, BookingStatus::Confirmed);
        assert_eq!(events[0].guest_email.as_deref(), Some("ana@example.com"));
    }

    #[tokio::test]
    async fn test_early_cancellation_refunds_minus_fee() {
        let h = harness();
        let booking = h
            .engine
            .bookings
            .create_booking(request(date(2025, 7, 10), date(2025, 7, 13), beds(MIXED_ROOM, &[1, 2]), 1, 1))
            .await
            .unwrap()
            .booking;
        h.engine
            .bookings
            .record_payment(booking.id, PaymentStatus::Paid)
            .await
            .unwrap();

        let cancellation = h.engine.bookings.cancel_booking(booking.id).await.unwrap();
        assert_eq!(cancellation.refund.tier, RefundTier::Full);
        assert_eq!(cancellation.refund.days_before, 39);
        assert_eq!(cancellation.refund.refund, dec!(61.40));
        assert_eq!(cancellation.booking.status, BookingStatus::Cancelled);
        assert_eq!(cancellation.booking.payment_status, PaymentStatus::Refunded);
        assert_eq!(cancellation.booking.refund_amount, dec!(61.40));

        let events = h.sink.wait_for(BookingEventKind::Cancelled, 1).await;
        assert_eq!(events[0].refund_amount, Some(dec!(61.40)));

        // Beds are free again
        assert!(h
            .engine
            .inventory
            .get_occupied_beds(booking.stay())
            .await
            .unwrap()
            .is_empty());

        let err = h.engine.bookings.cancel_booking(booking.id).await.unwrap_err();
        assert!(matches!(err, AppError::InvalidTransition(_)));
    }

    #[tokio::test]
    async fn test_late_cancellation_refunds_half() {
        let h = harness();
        let booking = h
            .engine
            .bookings
            .create_booking(request(date(2025, 7, 10), date(2025, 7, 13), beds(MIXED_ROOM, &[1, 2]), 1, 1))
            .await
            .unwrap()
            .booking;
        h.engine
            .bookings
            .record_payment(booking.id, PaymentStatus::Paid)
            .await
            .unwrap();

        h.clock.set(Utc.with_ymd_and_hms(2025, 6, 20, 9, 0, 0).unwrap());
        let cancellation = h.engine.bookings.cancel_booking(booking.id).await.unwrap();
        assert_eq!(cancellation.refund.tier, RefundTier::Half);
        assert_eq!(cancellation.refund.refund, dec!(43.20));
    }

    #[tokio::test]
    async fn test_carnival_minimum_stay_and_no_refund() {
        let h = harness();
        let err = h
            .engine
            .bookings
            .create_booking(request(date(2026, 2, 14), date(2026, 2, 18), beds(MIXED_ROOM, &[1, 2]), 2, 0))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));

        let confirmation = h
            .engine
            .bookings
            .create_booking(request(date(2026, 2, 14), date(2026, 2, 19), beds(MIXED_ROOM, &[1, 2]), 2, 0))
            .await
            .unwrap();
        assert_eq!(confirmation.price.total, dec!(1200.00));
        assert_eq!(confirmation.deposit.deposit, dec!(360.00));

        let id = confirmation.booking.id;
        h.engine
            .bookings
            .record_payment(id, PaymentStatus::Paid)
            .await
            .unwrap();
        let cancellation = h.engine.bookings.cancel_booking(id).await.unwrap();
        assert_eq!(cancellation.refund.tier, RefundTier::Carnival);
        assert_eq!(cancellation.refund.refund, dec!(0));
        assert_eq!(cancellation.booking.payment_status, PaymentStatus::Paid);
    }

    #[tokio::test]
    async fn test_date_rules() {
        let h = harness();
        let bookings = &h.engine.bookings;

        for (check_in, check_out) in [
            (date(2025, 5, 30), date(2025, 6, 2)),
            (date(2025, 7, 5), date(2025, 7, 5)),
            (date(2025, 7, 1), date(2025, 8, 1)),
            (date(2026, 7, 1), date(2026, 7, 3)),
        ] {
            let err = bookings
                .create_booking(request(check_in, check_out, beds(MIXED_ROOM, &[1]), 1, 0))
                .await
                .unwrap_err();
            assert!(matches!(err, AppError::Validation(_)), "{} -> {}", check_in, err);
        }
    }

    #[tokio::test]
    async fn test_request_shape_is_validated() {
        let h = harness();
        let mut req = request(date(2025, 7, 10), date(2025, 7, 11), beds(MIXED_ROOM, &[1]), 1, 0);
        req.guest.email = "not-an-email".to_string();
        let err = h.engine.bookings.create_booking(req).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
    }

    #[tokio::test]
    async fn test_female_only_room_rejects_small_mixed_group() {
        let h = harness();
        let err = h
            .engine
            .bookings
            .create_booking(request(date(2025, 7, 10), date(2025, 7, 12), beds(FEMALE_ROOM, &[1, 2]), 1, 1))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::InvalidSelection(_)));

        h.engine
            .bookings
            .create_booking(request(date(2025, 7, 10), date(2025, 7, 12), beds(FEMALE_ROOM, &[1, 2]), 0, 2))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_flexible_room_opens_before_check_in() {
        let h = harness();
        let mixed = request(date(2025, 7, 10), date(2025, 7, 12), beds(FLEX_ROOM, &[1, 2]), 1, 1);

        let err = h
            .engine
            .bookings
            .create_booking(mixed.clone())
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::InvalidSelection(_)));

        h.clock.set(Utc.with_ymd_and_hms(2025, 7, 8, 14, 0, 0).unwrap());
        h.engine.bookings.create_booking(mixed).await.unwrap();
    }

    #[tokio::test]
    async fn test_flexible_room_stays_restricted_with_women_group() {
        let h = harness();
        h.engine
            .bookings
            .create_booking(request(date(2025, 7, 10), date(2025, 7, 12), beds(FLEX_ROOM, &[1, 2]), 0, 2))
            .await
            .unwrap();

        h.clock.set(Utc.with_ymd_and_hms(2025, 7, 9, 8, 0, 0).unwrap());
        let availability = h
            .engine
            .inventory
            .check_availability(StayRange::new(date(2025, 7, 10), date(2025, 7, 12)))
            .await
            .unwrap();
        let flex = availability.iter().find(|r| r.room_id == FLEX_ROOM).unwrap();
        assert!(flex.policy.is_restricted());
        assert_eq!(flex.free_beds, vec![3, 4]);

        let err = h
            .engine
            .bookings
            .create_booking(request(date(2025, 7, 10), date(2025, 7, 12), beds(FLEX_ROOM, &[3, 4]), 1, 1))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::InvalidSelection(_)));
    }

    #[tokio::test]
    async fn test_calendar_block_takes_beds() {
        let h = harness();
        h.blocks.replace(vec![ExternalBlock {
            uid: "hw-991".to_string(),
            check_in: date(2025, 7, 10),
            check_out: date(2025, 7, 11),
            source: "hostelworld".to_string(),
            stale: false,
            room_id: Some(MIXED_ROOM),
            beds: Some(vec![1]),
            bed_count: 1,
        }]);

        let err = h
            .engine
            .bookings
            .create_booking(request(date(2025, 7, 10), date(2025, 7, 12), beds(MIXED_ROOM, &[1]), 1, 0))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::BedUnavailable { .. }));
    }

    #[tokio::test]
    async fn test_stay_lifecycle() {
        let h = harness();
        let id = h
            .engine
            .bookings
            .create_booking(request(date(2025, 7, 10), date(2025, 7, 12), beds(MIXED_ROOM, &[7]), 1, 0))
            .await
            .unwrap()
            .booking
            .id;

        assert!(matches!(
            h.engine.bookings.check_in(id).await,
            Err(AppError::InvalidTransition(_))
        ));

        h.engine
            .bookings
            .record_payment(id, PaymentStatus::Paid)
            .await
            .unwrap();
        assert_eq!(
            h.engine.bookings.check_in(id).await.unwrap().status,
            BookingStatus::CheckedIn
        );
        assert!(matches!(
            h.engine.bookings.cancel_booking(id).await,
            Err(AppError::InvalidTransition(_))
        ));
        assert_eq!(
            h.engine.bookings.check_out(id).await.unwrap().status,
            BookingStatus::CheckedOut
        );

        assert!(matches!(
            h.engine.bookings.get_booking(uuid::Uuid::new_v4()).await,
            Err(AppError::BookingNotFound(_))
        ));
        assert_eq!(
            h.engine
                .bookings
                .bookings_for_guest("ANA@example.com")
                .await
                .unwrap()
                .len(),
            1
        );
    }

    #[tokio::test]
    async fn test_suggested_beds_can_be_booked() {
        let h = harness();
        let range = StayRange::new(date(2025, 9, 1), date(2025, 9, 4));
        h.engine
            .bookings
            .create_booking(request(range.check_in, range.check_out, beds(MIXED_ROOM, &[1, 2, 3]), 3, 0))
            .await
            .unwrap();

        // Mixed group of 7: only the mixed room qualifies, 5 beds left
        let err = h
            .engine
            .bookings
            .suggest_beds(range, 4, 3)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::InsufficientBeds { requested: 7, available: 5 }));

        let suggestion = h.engine.bookings.suggest_beds(range, 0, 7).await.unwrap();
        assert_eq!(suggestion.len(), 7);
        assert_eq!(suggestion[0], BedSelection::new(FEMALE_ROOM, 1));

        let confirmation = h
            .engine
            .bookings
            .create_booking(request(range.check_in, range.check_out, suggestion, 0, 7))
            .await
            .unwrap();
        assert_eq!(confirmation.price.discount_rate, dec!(0.10));
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(24))]

        #[test]
        fn disjoint_ranges_never_see_each_other(
            a in 0i64..40, la in 1i64..8, b in 0i64..40, lb in 1i64..8,
        ) {
            let base = date(2025, 7, 1);
            let taken = StayRange::new(base + Duration::days(a), base + Duration::days(a + la));
            let query = StayRange::new(base + Duration::days(b), base + Duration::days(b + lb));
            prop_assume!(!taken.overlaps(&query));

            let runtime = tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
                .unwrap();
            let occupied = runtime.block_on(async {
                let h = harness();
                h.engine
                    .bookings
                    .create_booking(request(taken.check_in, taken.check_out, beds(MIXED_ROOM, &[1]), 1, 0))
                    .await
                    .unwrap();
                h.engine
                    .holds
                    .start_hold(beds(MIXED_ROOM, &[2]), taken, None, serde_json::Value::Null)
                    .await
                    .unwrap();
                h.engine.inventory.get_occupied_beds(query).await.unwrap()
            });
            prop_assert!(occupied.is_empty());
        }
    }
}
