//! Post-commit event delivery
//!
//! Booking events go to every registered sink after the durable write.
//! Delivery failures are retried with backoff when transient and are
//! otherwise logged. They never reach the caller that produced the event.

use bunkhouse_core::{
    config::RetryConfig,
    models::BookingEvent,
    traits::BookingEventSink,
    AppResult,
};
use std::future::Future;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tracing::{debug, error, info, warn};

/// Run `operation` until it succeeds, fails with a non-transient error, or
/// `max_attempts` is reached
pub async fn retry_with_backoff<F, Fut, T>(retry: &RetryConfig, op_name: &str, mut operation: F) -> AppResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = AppResult<T>>,
{
    let max_attempts = retry.max_attempts.max(1);
    let mut attempt = 1;

    loop {
        match operation().await {
            Ok(value) => {
                if attempt > 1 {
                    info!("{} succeeded on attempt {}", op_name, attempt);
                }
                return Ok(value);
            }
            Err(e) if e.is_transient() && attempt < max_attempts => {
                let delay = retry.backoff_for(attempt);
                warn!(
                    "{} failed (attempt {}/{}): {}, retrying in {:?}",
                    op_name, attempt, max_attempts, e, delay
                );
                sleep(delay).await;
                attempt += 1;
            }
            Err(e) => {
                error!("{} failed after {} attempts: {}", op_name, attempt, e);
                return Err(e);
            }
        }
    }
}

/// Fans booking events out to the configured sinks
#[derive(Clone)]
pub struct EventDispatcher {
    sinks: Vec<Arc<dyn BookingEventSink>>,
    retry: RetryConfig,
}

impl EventDispatcher {
    pub fn new(sinks: Vec<Arc<dyn BookingEventSink>>, retry: RetryConfig) -> Self {
        Self { sinks, retry }
    }

    pub fn sink_count(&self) -> usize {
        self.sinks.len()
    }

    /// Deliver to every sink, logging failures. Returns the number of sinks
    /// that accepted the event.
    pub async fn deliver(&self, event: &BookingEvent) -> usize {
        let mut delivered = 0;
        for sink in &self.sinks {
            let sink: &dyn BookingEventSink = sink.as_ref();
            let op_name = format!("{} for booking {} via {}", event.kind, event.booking.id, sink.name());
            match retry_with_backoff(&self.retry, &op_name, move || sink.publish(event)).await {
                Ok(()) => {
                    debug!("Delivered {}", op_name);
                    delivered += 1;
                }
                Err(e) => error!("Dropped {}: {}", op_name, e),
            }
        }
        delivered
    }

    /// Deliver in the background
    pub fn dispatch(&self, event: BookingEvent) -> JoinHandle<usize> {
        let dispatcher = self.clone();
        tokio::spawn(async move { dispatcher.deliver(&event).await })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use bunkhouse_core::models::{Booking, BookingEventKind, BookingStatus, PaymentStatus};
    use bunkhouse_core::AppError;
    use chrono::{NaiveDate, Utc};
    use parking_lot::Mutex;
    use rust_decimal::Decimal;
    use uuid::Uuid;

    struct FlakySink {
        failures_left: Mutex<u32>,
        error: fn() -> AppError,
        received: Mutex<Vec<Uuid>>,
    }

    impl FlakySink {
        fn new(failures: u32, error: fn() -> AppError) -> Self {
            Self {
                failures_left: Mutex::new(failures),
                error,
                received: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl BookingEventSink for FlakySink {
        fn name(&self) -> &str {
            "flaky"
        }

        async fn publish(&self, event: &BookingEvent) -> AppResult<()> {
            {
                let mut left = self.failures_left.lock();
                if *left > 0 {
                    *left -= 1;
                    return Err((self.error)());
                }
            }
            self.received.lock().push(event.id);
            Ok(())
        }
    }

    fn retry() -> RetryConfig {
        RetryConfig {
            max_attempts: 3,
            initial_backoff_ms: 1,
            backoff_multiplier: 2,
            max_backoff_ms: 5,
        }
    }

    fn event() -> BookingEvent {
        let now = Utc::now();
        let day = NaiveDate::from_ymd_opt(2025, 9, 1).unwrap();
        let booking = Booking {
            id: Uuid::new_v4(),
            guest_id: Uuid::new_v4(),
            check_in: day,
            check_out: day.succ_opt().unwrap(),
            beds: vec![],
            men: 0,
            women: 1,
            total_price: Decimal::ZERO,
            deposit_amount: Decimal::ZERO,
            remaining_amount: Decimal::ZERO,
            remaining_due_on: day,
            amount_paid: Decimal::ZERO,
            refund_amount: Decimal::ZERO,
            status: BookingStatus::Pending,
            payment_status: PaymentStatus::Pending,
            hold_id: None,
            created_at: now,
            updated_at: now,
        };
        BookingEvent::new(BookingEventKind::Created, &booking, now)
    }

    #[tokio::test]
    async fn test_transient_failures_are_retried() {
        let sink = Arc::new(FlakySink::new(2, || AppError::LockStore("timeout".into())));
        let dispatcher = EventDispatcher::new(vec![sink.clone() as Arc<dyn BookingEventSink>], retry());

        assert_eq!(dispatcher.deliver(&event()).await, 1);
        assert_eq!(sink.received.lock().len(), 1);
    }

    #[tokio::test]
    async fn test_gives_up_after_max_attempts() {
        let sink = Arc::new(FlakySink::new(3, || AppError::Database("down".into())));
        let dispatcher = EventDispatcher::new(vec![sink.clone() as Arc<dyn BookingEventSink>], retry());

        assert_eq!(dispatcher.deliver(&event()).await, 0);
        assert!(sink.received.lock().is_empty());
    }

    #[tokio::test]
    async fn test_permanent_failure_is_not_retried() {
        let sink = Arc::new(FlakySink::new(1, || AppError::Serialization("bad".into())));
        let ok = Arc::new(FlakySink::new(0, || AppError::Internal("unused".into())));
        let dispatcher = EventDispatcher::new(
            vec![
                sink.clone() as Arc<dyn BookingEventSink>,
                ok.clone() as Arc<dyn BookingEventSink>,
            ],
            retry(),
        );

        let delivered = dispatcher.dispatch(event()).await.unwrap();
        assert_eq!(delivered, 1);
        assert!(sink.received.lock().is_empty());
        assert_eq!(*sink.failures_left.lock(), 0);
        assert_eq!(ok.received.lock().len(), 1);
    }
}
