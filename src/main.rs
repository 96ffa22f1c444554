//! Bunkhouse engine daemon
//!
//! Wires the reservation engine to PostgreSQL and Redis and drives the
//! periodic sweep of expired holds. Request-handling front ends embed
//! `bunkhouse_services::Engine` the same way.

use anyhow::Context;
use bunkhouse_cache::{RedisEventSink, RedisLockStore};
use bunkhouse_core::{traits::BookingEventSink, AppConfig, SystemClock};
use bunkhouse_db::{create_pool, run_migrations, PgBookingRepository, PgGuestRepository, PgShadowBlockRepository};
use bunkhouse_services::{Adapters, Engine};
use std::env;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Initialize tracing/logging
fn init_tracing() {
    let log_level = env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string());

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!(
            "bunkhouse={},bunkhouse_services={},bunkhouse_db={},bunkhouse_cache={},sqlx=warn",
            log_level, log_level, log_level, log_level
        ))
    });

    tracing_subscriber::registry()
        .with(env_filter)
        .with(
            fmt::layer()
                .with_target(true)
                .with_thread_ids(true)
                .with_file(true)
                .with_line_number(true),
        )
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env file
    dotenvy::dotenv().ok();

    init_tracing();

    info!("Starting Bunkhouse engine v{}", env!("CARGO_PKG_VERSION"));

    let config = AppConfig::load().context("failed to load configuration")?;
    if config.rooms.is_empty() {
        warn!("No rooms configured; every availability query will be empty");
    }

    info!("Connecting to database...");
    let pool = create_pool(&config.database)
        .await
        .context("failed to create database pool")?;
    if config.database.run_migrations {
        run_migrations(&pool).await.context("failed to run migrations")?;
    }

    info!("Connecting to Redis...");
    let lock_store = RedisLockStore::new(&config.redis.url)
        .await
        .context("failed to connect to Redis")?;
    let events = RedisEventSink::from_store(&lock_store, config.redis.events_channel.clone());

    let engine = Engine::new(
        &config,
        Adapters {
            bookings: Arc::new(PgBookingRepository::new(pool.clone())),
            guests: Arc::new(PgGuestRepository::new(pool.clone())),
            lock_store: Arc::new(lock_store),
            blocks: Arc::new(PgShadowBlockRepository::new(pool)),
            sinks: vec![Arc::new(events) as Arc<dyn BookingEventSink>],
            clock: Arc::new(SystemClock),
        },
    )
    .context("failed to build engine")?;

    let period = Duration::from_secs(config.holds.sweep_interval_secs.max(1));
    info!("Sweeping expired holds every {:?}", period);

    let mut interval = tokio::time::interval(period);
    loop {
        tokio::select! {
            _ = interval.tick() => {
                if let Err(e) = engine.holds.sweep_expired().await {
                    error!("Hold sweep failed: {}", e);
                }
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Shutdown signal received");
                break;
            }
        }
    }

    info!("Bunkhouse engine stopped");
    Ok(())
}
