//! Unified error handling for Bunkhouse
//!
//! Every failure in the engine is expressed as an [`AppError`]. Callers that
//! need to decide between surfacing, retrying or re-selecting beds should use
//! [`AppError::kind`] rather than matching individual variants.

use thiserror::Error;
use uuid::Uuid;

use crate::models::BedSelection;

/// Coarse classification of an [`AppError`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Malformed input or business-rule violation. Never retried.
    Validation,
    /// Requested beds are no longer available. Caller may pick new beds.
    Conflict,
    /// Referenced entity is absent.
    NotFound,
    /// I/O failure against a store. Retryable at collaborator boundaries.
    Transient,
    /// Configuration, serialization or invariant failure.
    Internal,
}

/// Main application error type
#[derive(Error, Debug)]
pub enum AppError {
    // ==================== Store Errors ====================
    #[error("Database error: {0}")]
    Database(String),

    #[error("Database pool error: {0}")]
    Pool(String),

    #[error("Transaction failed: {0}")]
    Transaction(String),

    #[error("Lock store error: {0}")]
    LockStore(String),

    #[error("Lock store connection failed: {0}")]
    LockStoreConnection(String),

    // ==================== Business Logic Errors ====================
    #[error("Booking not found: {0}")]
    BookingNotFound(Uuid),

    #[error("Guest not found: {0}")]
    GuestNotFound(String),

    #[error("Hold not found: {0}")]
    HoldNotFound(Uuid),

    #[error("Room not found: {0}")]
    RoomNotFound(u32),

    #[error("Bed {bed} is not available for the requested dates")]
    BedUnavailable { bed: BedSelection },

    #[error("Hold conflict: bed {bed} is already held for {night}")]
    HoldConflict { bed: BedSelection, night: chrono::NaiveDate },

    #[error("Insufficient beds: requested {requested}, available {available}")]
    InsufficientBeds { requested: u32, available: u32 },

    #[error("Hold expired: {0}")]
    HoldExpired(Uuid),

    #[error("Invalid transition: {0}")]
    InvalidTransition(String),

    // ==================== Validation Errors ====================
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid bed selection: {}", .0.join("; "))]
    InvalidSelection(Vec<String>),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    // ==================== Resource Errors ====================
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    // ==================== Internal Errors ====================
    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl AppError {
    /// Classifies this error for retry and surfacing decisions
    pub fn kind(&self) -> ErrorKind {
        match self {
            AppError::Database(_)
            | AppError::Pool(_)
            | AppError::Transaction(_)
            | AppError::LockStore(_)
            | AppError::LockStoreConnection(_) => ErrorKind::Transient,

            AppError::BookingNotFound(_)
            | AppError::GuestNotFound(_)
            | AppError::HoldNotFound(_)
            | AppError::RoomNotFound(_)
            | AppError::NotFound(_) => ErrorKind::NotFound,

            AppError::BedUnavailable { .. }
            | AppError::HoldConflict { .. }
            | AppError::InsufficientBeds { .. }
            | AppError::Conflict(_) => ErrorKind::Conflict,

            AppError::HoldExpired(_)
            | AppError::InvalidTransition(_)
            | AppError::Validation(_)
            | AppError::InvalidSelection(_)
            | AppError::InvalidInput(_) => ErrorKind::Validation,

            AppError::Internal(_) | AppError::Config(_) | AppError::Serialization(_) => {
                ErrorKind::Internal
            }
        }
    }

    /// True when the failure came from store I/O and may succeed on retry
    pub fn is_transient(&self) -> bool {
        self.kind() == ErrorKind::Transient
    }

    /// HTTP status hint for the controller layer
    pub fn http_status(&self) -> u16 {
        match self.kind() {
            ErrorKind::Validation => 400,
            ErrorKind::NotFound => 404,
            ErrorKind::Conflict => 409,
            ErrorKind::Transient => 503,
            ErrorKind::Internal => 500,
        }
    }

    /// Returns the error code for API responses
    pub fn error_code(&self) -> &'static str {
        match self {
            AppError::Database(_) => "database_error",
            AppError::Pool(_) => "pool_error",
            AppError::Transaction(_) => "transaction_error",
            AppError::LockStore(_) => "lock_store_error",
            AppError::LockStoreConnection(_) => "lock_store_connection_error",
            AppError::BookingNotFound(_) => "booking_not_found",
            AppError::GuestNotFound(_) => "guest_not_found",
            AppError::HoldNotFound(_) => "hold_not_found",
            AppError::RoomNotFound(_) => "room_not_found",
            AppError::BedUnavailable { .. } => "bed_unavailable",
            AppError::HoldConflict { .. } => "hold_conflict",
            AppError::InsufficientBeds { .. } => "insufficient_beds",
            AppError::HoldExpired(_) => "hold_expired",
            AppError::InvalidTransition(_) => "invalid_transition",
            AppError::Validation(_) => "validation_error",
            AppError::InvalidSelection(_) => "invalid_selection",
            AppError::InvalidInput(_) => "invalid_input",
            AppError::NotFound(_) => "not_found",
            AppError::Conflict(_) => "conflict",
            AppError::Internal(_) => "internal_error",
            AppError::Config(_) => "config_error",
            AppError::Serialization(_) => "serialization_error",
        }
    }
}

// ==================== From implementations ====================

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::Serialization(err.to_string())
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        AppError::Internal(err.to_string())
    }
}

impl From<config::ConfigError> for AppError {
    fn from(err: config::ConfigError) -> Self {
        AppError::Config(err.to_string())
    }
}

impl From<validator::ValidationErrors> for AppError {
    fn from(err: validator::ValidationErrors) -> Self {
        AppError::Validation(err.to_string())
    }
}
