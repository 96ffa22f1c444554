//! Bunkhouse Database Layer
//!
//! This crate provides PostgreSQL database access and repository implementations
//! for the Bunkhouse engine. It includes:
//!
//! - Connection pool management and schema migrations with sqlx
//! - Booking repository writing booking rows and bed assignments in one transaction
//! - Guest repository with upsert by email
//! - Shadow block repository for imported calendar blocks
//! - In-memory repositories with the same contracts for tests and local runs

pub mod memory;
pub mod pool;
pub mod repositories;

pub use memory::{MemoryBookingRepository, MemoryGuestRepository, StaticBlockSource};
pub use pool::{create_pool, run_migrations};
pub use repositories::*;

// Re-export commonly used types
pub use bunkhouse_core::{AppError, AppResult};
pub use sqlx::{PgPool, Postgres, Transaction};
