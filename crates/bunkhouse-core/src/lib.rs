//! Bunkhouse Core Library
//!
//! This crate provides the foundational types, traits, and error handling
//! for the Bunkhouse bed-reservation engine. It includes:
//!
//! - Domain models (Room, Booking, Hold, Guest, ExternalBlock, ...)
//! - Collaborator traits for persistence, lock store, calendar and notifications
//! - Unified error handling with error classification
//! - Application configuration
//! - Clock abstraction for deterministic time

pub mod clock;
pub mod config;
pub mod error;
pub mod models;
pub mod traits;

pub use clock::{Clock, FixedClock, SystemClock};
pub use config::AppConfig;
pub use error::{AppError, ErrorKind};

/// Result type alias using AppError
pub type AppResult<T> = Result<T, AppError>;
