//! Guest repository implementation

use bunkhouse_core::{
    models::{normalize_email, Guest, GuestDetails},
    traits::{GuestRepository, Repository},
    AppError, AppResult,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use tracing::{debug, error, instrument};
use uuid::Uuid;

/// PostgreSQL implementation of GuestRepository
pub struct PgGuestRepository {
    pool: PgPool,
}

impl PgGuestRepository {
    /// Create a new guest repository
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl Repository<Guest, Uuid> for PgGuestRepository {
    #[instrument(skip(self))]
    async fn find_by_id(&self, id: Uuid) -> AppResult<Option<Guest>> {
        debug!("Finding guest by id: {}", id);

        let result = sqlx::query_as::<sqlx::Postgres, GuestRow>(
            r#"
            SELECT id, email, name, phone, created_at, updated_at
            FROM guests
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            error!("Database error finding guest {}: {}", id, e);
            AppError::Database(format!("Failed to find guest: {}", e))
        })?;

        Ok(result.map(Into::into))
    }

    #[instrument(skip(self))]
    async fn find_all(&self, limit: i64, offset: i64) -> AppResult<Vec<Guest>> {
        let rows = sqlx::query_as::<sqlx::Postgres, GuestRow>(
            r#"
            SELECT id, email, name, phone, created_at, updated_at
            FROM guests
            ORDER BY created_at DESC
            LIMIT $1 OFFSET $2
            "#,
        )
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            error!("Database error finding guests: {}", e);
            AppError::Database(format!("Failed to fetch guests: {}", e))
        })?;

        Ok(rows.into_iter().map(Into::into).collect())
    }

    #[instrument(skip(self))]
    async fn count(&self) -> AppResult<i64> {
        let result: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM guests")
            .fetch_one(&self.pool)
            .await
            .map_err(|e| {
                error!("Database error counting guests: {}", e);
                AppError::Database(format!("Failed to count guests: {}", e))
            })?;

        Ok(result.0)
    }

    #[instrument(skip(self, entity))]
    async fn create(&self, entity: &Guest) -> AppResult<Guest> {
        debug!("Creating guest: {}", entity.email);

        let row = sqlx::query_as::<sqlx::Postgres, GuestRow>(
            r#"
            INSERT INTO guests (id, email, name, phone, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING id, email, name, phone, created_at, updated_at
            "#,
        )
        .bind(entity.id)
        .bind(normalize_email(&entity.email))
        .bind(&entity.name)
        .bind(&entity.phone)
        .bind(entity.created_at)
        .bind(entity.updated_at)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            error!("Database error creating guest: {}", e);
            AppError::Database(format!("Failed to create guest: {}", e))
        })?;

        Ok(row.into())
    }

    #[instrument(skip(self, entity))]
    async fn update(&self, entity: &Guest) -> AppResult<Guest> {
        debug!("Updating guest: {}", entity.id);

        let row = sqlx::query_as::<sqlx::Postgres, GuestRow>(
            r#"
            UPDATE guests
            SET name = $2,
                phone = $3,
                updated_at = NOW()
            WHERE id = $1
            RETURNING id, email, name, phone, created_at, updated_at
            "#,
        )
        .bind(entity.id)
        .bind(&entity.name)
        .bind(&entity.phone)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            error!("Database error updating guest {}: {}", entity.id, e);
            AppError::Database(format!("Failed to update guest: {}", e))
        })?
        .ok_or_else(|| AppError::GuestNotFound(entity.id.to_string()))?;

        Ok(row.into())
    }
}

#[async_trait]
impl GuestRepository for PgGuestRepository {
    #[instrument(skip(self))]
    async fn find_by_email(&self, email: &str) -> AppResult<Option<Guest>> {
        let email = normalize_email(email);
        debug!("Finding guest by email: {}", email);

        let result = sqlx::query_as::<sqlx::Postgres, GuestRow>(
            r#"
            SELECT id, email, name, phone, created_at, updated_at
            FROM guests
            WHERE email = $1
            "#,
        )
        .bind(&email)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            error!("Database error finding guest by email: {}", e);
            AppError::Database(format!("Failed to find guest: {}", e))
        })?;

        Ok(result.map(Into::into))
    }

    #[instrument(skip(self, details), fields(email = %details.email))]
    async fn upsert_by_email(&self, details: &GuestDetails) -> AppResult<Guest> {
        let row = sqlx::query_as::<sqlx::Postgres, GuestRow>(
            r#"
            INSERT INTO guests (id, email, name, phone)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (email) DO UPDATE
            SET name = EXCLUDED.name,
                phone = COALESCE(EXCLUDED.phone, guests.phone),
                updated_at = NOW()
            RETURNING id, email, name, phone, created_at, updated_at
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(normalize_email(&details.email))
        .bind(details.name.trim())
        .bind(&details.phone)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            error!("Database error upserting guest: {}", e);
            AppError::Database(format!("Failed to upsert guest: {}", e))
        })?;

        debug!("Guest {} upserted", row.id);
        Ok(row.into())
    }
}

/// Helper struct for mapping database rows
#[derive(Debug, sqlx::FromRow)]
struct GuestRow {
    id: Uuid,
    email: String,
    name: String,
    phone: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<GuestRow> for Guest {
    fn from(row: GuestRow) -> Self {
        Self {
            id: row.id,
            email: row.email,
            name: row.name,
            phone: row.phone,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}
