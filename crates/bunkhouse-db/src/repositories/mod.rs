//! Repository implementations
//!
//! This module contains concrete implementations of the repository traits
//! defined in bunkhouse-core, using sqlx for PostgreSQL access.

pub mod block_repo;
pub mod booking_repo;
pub mod guest_repo;

pub use block_repo::PgShadowBlockRepository;
pub use booking_repo::PgBookingRepository;
pub use guest_repo::PgGuestRepository;
