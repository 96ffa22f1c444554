//! Redis pub/sub notification sink
//!
//! Publishes booking events as JSON so notification workers (email,
//! messaging) can subscribe without coupling to the engine.

use async_trait::async_trait;
use bunkhouse_core::error::AppError;
use bunkhouse_core::models::BookingEvent;
use bunkhouse_core::traits::BookingEventSink;
use redis::{aio::ConnectionManager, AsyncCommands};
use tracing::{debug, error};

use crate::RedisLockStore;

#[derive(Clone)]
pub struct RedisEventSink {
    manager: ConnectionManager,
    channel: String,
}

impl RedisEventSink {
    pub fn new(manager: ConnectionManager, channel: impl Into<String>) -> Self {
        Self {
            manager,
            channel: channel.into(),
        }
    }

    /// Publish on the connection already held by a lock store
    pub fn from_store(store: &RedisLockStore, channel: impl Into<String>) -> Self {
        Self::new(store.connection(), channel)
    }
}

#[async_trait]
impl BookingEventSink for RedisEventSink {
    fn name(&self) -> &str {
        "redis_pubsub"
    }

    async fn publish(&self, event: &BookingEvent) -> Result<(), AppError> {
        let payload = serde_json::to_string(event).map_err(|e| {
            error!("Failed to serialize event {}: {}", event.id, e);
            AppError::Serialization(format!("Serialization failed: {}", e))
        })?;

        let mut conn = self.manager.clone();
        let receivers: i64 = conn
            .publish(&self.channel, payload)
            .await
            .map_err(RedisLockStore::map_redis_error)?;

        debug!(
            "PUBLISH {} {} for booking {} ({} receivers)",
            self.channel, event.kind, event.booking.id, receivers
        );
        Ok(())
    }
}
