//! Booking repository implementation
//!
//! Bookings live in `bookings`; each selected bed is a row in `booking_beds`
//! carrying the stay dates and an `active` flag. An exclusion constraint on
//! active rows makes the database the last guard against double-booking.

use bunkhouse_core::{
    models::{BedSelection, Booking, BookingStatus, PaymentStatus, StayRange},
    traits::{BookingRepository, Repository},
    AppError, AppResult,
};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use sqlx::PgPool;
use std::collections::HashMap;
use tracing::{debug, error, instrument, warn};
use uuid::Uuid;

const BOOKING_COLUMNS: &str = r#"
    id, guest_id, check_in, check_out, men, women,
    total_price, deposit_amount, remaining_amount, remaining_due_on,
    amount_paid, refund_amount, status, payment_status, hold_id,
    created_at, updated_at
"#;

/// SQLSTATE for exclusion constraint violations
const EXCLUSION_VIOLATION: &str = "23P01";

/// SQLSTATE for unique constraint violations
const UNIQUE_VIOLATION: &str = "23505";

/// PostgreSQL implementation of BookingRepository
pub struct PgBookingRepository {
    pool: PgPool,
}

impl PgBookingRepository {
    /// Create a new booking repository
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Parse booking status from string
    fn parse_status(s: &str) -> BookingStatus {
        BookingStatus::from_str(s).unwrap_or_default()
    }

    /// Parse payment status from string
    fn parse_payment_status(s: &str) -> PaymentStatus {
        PaymentStatus::from_str(s).unwrap_or_default()
    }

    /// Map a write failure, surfacing constraint violations as conflicts
    fn map_write_error(err: sqlx::Error, action: &str) -> AppError {
        if let sqlx::Error::Database(db_err) = &err {
            match db_err.code().as_deref() {
                Some(EXCLUSION_VIOLATION) => {
                    warn!("Bed assignment overlaps an active booking: {}", db_err);
                    return AppError::Conflict(
                        "bed is already booked for overlapping dates".to_string(),
                    );
                }
                Some(UNIQUE_VIOLATION) => {
                    warn!("Duplicate booking row: {}", db_err);
                    return AppError::Conflict(format!("duplicate record: {}", db_err));
                }
                _ => {}
            }
        }
        error!("Database error {}: {}", action, err);
        AppError::Database(format!("Failed {}: {}", action, err))
    }

    /// Load bed assignments for a set of bookings and attach them
    async fn attach_beds(&self, rows: Vec<BookingRow>) -> AppResult<Vec<Booking>> {
        if rows.is_empty() {
            return Ok(Vec::new());
        }

        let ids: Vec<Uuid> = rows.iter().map(|r| r.id).collect();
        let bed_rows = sqlx::query_as::<sqlx::Postgres, BedRow>(
            r#"
            SELECT booking_id, room_id, bed_number
            FROM booking_beds
            WHERE booking_id = ANY($1)
            ORDER BY room_id, bed_number
            "#,
        )
        .bind(&ids)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            error!("Database error loading bed assignments: {}", e);
            AppError::Database(format!("Failed to load bed assignments: {}", e))
        })?;

        let mut beds: HashMap<Uuid, Vec<BedSelection>> = HashMap::new();
        for bed in bed_rows {
            beds.entry(bed.booking_id)
                .or_default()
                .push(BedSelection::new(bed.room_id as u32, bed.bed_number as u32));
        }

        Ok(rows
            .into_iter()
            .map(|row| {
                let selections = beds.remove(&row.id).unwrap_or_default();
                row.into_booking(selections)
            })
            .collect())
    }
}

#[async_trait]
impl Repository<Booking, Uuid> for PgBookingRepository {
    #[instrument(skip(self))]
    async fn find_by_id(&self, id: Uuid) -> AppResult<Option<Booking>> {
        debug!("Finding booking by id: {}", id);

        let row = sqlx::query_as::<sqlx::Postgres, BookingRow>(&format!(
            "SELECT {} FROM bookings WHERE id = $1",
            BOOKING_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            error!("Database error finding booking {}: {}", id, e);
            AppError::Database(format!("Failed to find booking: {}", e))
        })?;

        match row {
            Some(row) => Ok(self.attach_beds(vec![row]).await?.pop()),
            None => Ok(None),
        }
    }

    #[instrument(skip(self))]
    async fn find_all(&self, limit: i64, offset: i64) -> AppResult<Vec<Booking>> {
        debug!("Finding all bookings with limit {} offset {}", limit, offset);

        let rows = sqlx::query_as::<sqlx::Postgres, BookingRow>(&format!(
            "SELECT {} FROM bookings ORDER BY created_at DESC LIMIT $1 OFFSET $2",
            BOOKING_COLUMNS
        ))
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            error!("Database error finding bookings: {}", e);
            AppError::Database(format!("Failed to fetch bookings: {}", e))
        })?;

        self.attach_beds(rows).await
    }

    #[instrument(skip(self))]
    async fn count(&self) -> AppResult<i64> {
        let result: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM bookings")
            .fetch_one(&self.pool)
            .await
            .map_err(|e| {
                error!("Database error counting bookings: {}", e);
                AppError::Database(format!("Failed to count bookings: {}", e))
            })?;

        Ok(result.0)
    }

    #[instrument(skip(self, entity), fields(booking_id = %entity.id))]
    async fn create(&self, entity: &Booking) -> AppResult<Booking> {
        debug!(
            "Creating booking {} with {} beds {}",
            entity.id,
            entity.beds.len(),
            entity.stay()
        );

        let mut tx = self.pool.begin().await.map_err(|e| {
            error!("Failed to start transaction: {}", e);
            AppError::Transaction(format!("Failed to start transaction: {}", e))
        })?;

        let row = sqlx::query_as::<sqlx::Postgres, BookingRow>(&format!(
            r#"
            INSERT INTO bookings (
                id, guest_id, check_in, check_out, men, women,
                total_price, deposit_amount, remaining_amount, remaining_due_on,
                amount_paid, refund_amount, status, payment_status, hold_id,
                created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17)
            RETURNING {}
            "#,
            BOOKING_COLUMNS
        ))
        .bind(entity.id)
        .bind(entity.guest_id)
        .bind(entity.check_in)
        .bind(entity.check_out)
        .bind(entity.men as i32)
        .bind(entity.women as i32)
        .bind(entity.total_price)
        .bind(entity.deposit_amount)
        .bind(entity.remaining_amount)
        .bind(entity.remaining_due_on)
        .bind(entity.amount_paid)
        .bind(entity.refund_amount)
        .bind(entity.status.to_string())
        .bind(entity.payment_status.to_string())
        .bind(entity.hold_id)
        .bind(entity.created_at)
        .bind(entity.updated_at)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| Self::map_write_error(e, "creating booking"))?;

        let active = entity.is_occupying();
        for bed in &entity.beds {
            sqlx::query(
                r#"
                INSERT INTO booking_beds (booking_id, room_id, bed_number, check_in, check_out, active)
                VALUES ($1, $2, $3, $4, $5, $6)
                "#,
            )
            .bind(entity.id)
            .bind(bed.room_id as i32)
            .bind(bed.bed_number as i32)
            .bind(entity.check_in)
            .bind(entity.check_out)
            .bind(active)
            .execute(&mut *tx)
            .await
            .map_err(|e| Self::map_write_error(e, "assigning bed"))?;
        }

        tx.commit().await.map_err(|e| {
            error!("Failed to commit transaction: {}", e);
            AppError::Transaction(format!("Failed to commit transaction: {}", e))
        })?;

        debug!("Booking {} persisted", entity.id);
        Ok(row.into_booking(entity.beds.clone()))
    }

    #[instrument(skip(self, entity), fields(booking_id = %entity.id))]
    async fn update(&self, entity: &Booking) -> AppResult<Booking> {
        debug!(
            "Updating booking {}: status={} payment={}",
            entity.id, entity.status, entity.payment_status
        );

        let mut tx = self.pool.begin().await.map_err(|e| {
            error!("Failed to start transaction: {}", e);
            AppError::Transaction(format!("Failed to start transaction: {}", e))
        })?;

        let row = sqlx::query_as::<sqlx::Postgres, BookingRow>(&format!(
            r#"
            UPDATE bookings
            SET total_price = $2,
                deposit_amount = $3,
                remaining_amount = $4,
                remaining_due_on = $5,
                amount_paid = $6,
                refund_amount = $7,
                status = $8,
                payment_status = $9,
                updated_at = $10
            WHERE id = $1
            RETURNING {}
            "#,
            BOOKING_COLUMNS
        ))
        .bind(entity.id)
        .bind(entity.total_price)
        .bind(entity.deposit_amount)
        .bind(entity.remaining_amount)
        .bind(entity.remaining_due_on)
        .bind(entity.amount_paid)
        .bind(entity.refund_amount)
        .bind(entity.status.to_string())
        .bind(entity.payment_status.to_string())
        .bind(entity.updated_at)
        .fetch_optional(&mut *tx)
        .await
        .map_err(|e| Self::map_write_error(e, "updating booking"))?
        .ok_or(AppError::BookingNotFound(entity.id))?;

        sqlx::query("UPDATE booking_beds SET active = $2 WHERE booking_id = $1")
            .bind(entity.id)
            .bind(entity.is_occupying())
            .execute(&mut *tx)
            .await
            .map_err(|e| Self::map_write_error(e, "updating bed assignments"))?;

        tx.commit().await.map_err(|e| {
            error!("Failed to commit transaction: {}", e);
            AppError::Transaction(format!("Failed to commit transaction: {}", e))
        })?;

        Ok(row.into_booking(entity.beds.clone()))
    }
}

#[async_trait]
impl BookingRepository for PgBookingRepository {
    #[instrument(skip(self))]
    async fn find_active_overlapping(&self, range: StayRange) -> AppResult<Vec<Booking>> {
        debug!("Finding occupying bookings overlapping {}", range);

        let statuses: Vec<String> = BookingStatus::OCCUPYING
            .iter()
            .map(ToString::to_string)
            .collect();
        let payment_statuses: Vec<String> = PaymentStatus::OCCUPYING
            .iter()
            .map(ToString::to_string)
            .collect();

        let rows = sqlx::query_as::<sqlx::Postgres, BookingRow>(&format!(
            r#"
            SELECT {}
            FROM bookings
            WHERE check_in < $2
                AND $1 < check_out
                AND status = ANY($3)
                AND payment_status = ANY($4)
            ORDER BY check_in, created_at
            "#,
            BOOKING_COLUMNS
        ))
        .bind(range.check_in)
        .bind(range.check_out)
        .bind(&statuses)
        .bind(&payment_statuses)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            error!("Database error finding overlapping bookings: {}", e);
            AppError::Database(format!("Failed to find overlapping bookings: {}", e))
        })?;

        self.attach_beds(rows).await
    }

    #[instrument(skip(self))]
    async fn find_by_guest(&self, guest_id: Uuid) -> AppResult<Vec<Booking>> {
        debug!("Finding bookings for guest: {}", guest_id);

        let rows = sqlx::query_as::<sqlx::Postgres, BookingRow>(&format!(
            "SELECT {} FROM bookings WHERE guest_id = $1 ORDER BY created_at DESC",
            BOOKING_COLUMNS
        ))
        .bind(guest_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            error!("Database error finding bookings for guest {}: {}", guest_id, e);
            AppError::Database(format!("Failed to find guest bookings: {}", e))
        })?;

        self.attach_beds(rows).await
    }
}

/// Helper struct for mapping database rows
#[derive(Debug, sqlx::FromRow)]
struct BookingRow {
    id: Uuid,
    guest_id: Uuid,
    check_in: NaiveDate,
    check_out: NaiveDate,
    men: i32,
    women: i32,
    total_price: Decimal,
    deposit_amount: Decimal,
    remaining_amount: Decimal,
    remaining_due_on: NaiveDate,
    amount_paid: Decimal,
    refund_amount: Decimal,
    status: String,
    payment_status: String,
    hold_id: Option<Uuid>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl BookingRow {
    fn into_booking(self, beds: Vec<BedSelection>) -> Booking {
        Booking {
            id: self.id,
            guest_id: self.guest_id,
            check_in: self.check_in,
            check_out: self.check_out,
            beds,
            men: self.men.max(0) as u32,
            women: self.women.max(0) as u32,
            total_price: self.total_price,
            deposit_amount: self.deposit_amount,
            remaining_amount: self.remaining_amount,
            remaining_due_on: self.remaining_due_on,
            amount_paid: self.amount_paid,
            refund_amount: self.refund_amount,
            status: PgBookingRepository::parse_status(&self.status),
            payment_status: PgBookingRepository::parse_payment_status(&self.payment_status),
            hold_id: self.hold_id,
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct BedRow {
    booking_id: Uuid,
    room_id: i32,
    bed_number: i32,
}
