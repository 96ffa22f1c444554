//! Shadow block repository
//!
//! Stores blocks produced by the calendar importer and serves them to the
//! inventory resolver.

use bunkhouse_core::{
    models::{ExternalBlock, StayRange},
    traits::ShadowBlockSource,
    AppError, AppResult,
};
use async_trait::async_trait;
use chrono::NaiveDate;
use sqlx::PgPool;
use tracing::{debug, error, info, instrument};

/// PostgreSQL store for imported calendar blocks
pub struct PgShadowBlockRepository {
    pool: PgPool,
}

impl PgShadowBlockRepository {
    /// Create a new shadow block repository
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Insert or refresh imported blocks, clearing their stale flag
    #[instrument(skip(self, blocks), fields(count = blocks.len()))]
    pub async fn upsert_blocks(&self, blocks: &[ExternalBlock]) -> AppResult<usize> {
        if blocks.is_empty() {
            return Ok(0);
        }

        let mut tx = self.pool.begin().await.map_err(|e| {
            error!("Failed to start transaction: {}", e);
            AppError::Transaction(format!("Failed to start transaction: {}", e))
        })?;

        for block in blocks {
            let beds: Option<Vec<i32>> = block
                .beds
                .as_ref()
                .map(|beds| beds.iter().map(|b| *b as i32).collect());

            sqlx::query(
                r#"
                INSERT INTO external_blocks (
                    uid, check_in, check_out, source, stale, room_id, beds, bed_count, updated_at
                )
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, NOW())
                ON CONFLICT (uid) DO UPDATE
                SET check_in = EXCLUDED.check_in,
                    check_out = EXCLUDED.check_out,
                    source = EXCLUDED.source,
                    stale = EXCLUDED.stale,
                    room_id = EXCLUDED.room_id,
                    beds = EXCLUDED.beds,
                    bed_count = EXCLUDED.bed_count,
                    updated_at = NOW()
                "#,
            )
            .bind(&block.uid)
            .bind(block.check_in)
            .bind(block.check_out)
            .bind(&block.source)
            .bind(block.stale)
            .bind(block.room_id.map(|r| r as i32))
            .bind(beds)
            .bind(block.bed_count.max(1) as i32)
            .execute(&mut *tx)
            .await
            .map_err(|e| {
                error!("Database error upserting block {}: {}", block.uid, e);
                AppError::Database(format!("Failed to upsert block: {}", e))
            })?;
        }

        tx.commit().await.map_err(|e| {
            error!("Failed to commit transaction: {}", e);
            AppError::Transaction(format!("Failed to commit transaction: {}", e))
        })?;

        info!("Imported {} calendar blocks", blocks.len());
        Ok(blocks.len())
    }

    /// Flag every block of `source` not present in the latest feed as stale
    #[instrument(skip(self, current_uids))]
    pub async fn mark_stale_except(&self, source: &str, current_uids: &[String]) -> AppResult<u64> {
        let result = sqlx::query(
            r#"
            UPDATE external_blocks
            SET stale = TRUE, updated_at = NOW()
            WHERE source = $1 AND NOT (uid = ANY($2)) AND NOT stale
            "#,
        )
        .bind(source)
        .bind(current_uids)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            error!("Database error marking stale blocks: {}", e);
            AppError::Database(format!("Failed to mark stale blocks: {}", e))
        })?;

        Ok(result.rows_affected())
    }
}

#[async_trait]
impl ShadowBlockSource for PgShadowBlockRepository {
    #[instrument(skip(self))]
    async fn blocks_overlapping(&self, range: StayRange) -> AppResult<Vec<ExternalBlock>> {
        debug!("Finding calendar blocks overlapping {}", range);

        let rows = sqlx::query_as::<sqlx::Postgres, BlockRow>(
            r#"
            SELECT uid, check_in, check_out, source, stale, room_id, beds, bed_count
            FROM external_blocks
            WHERE check_in < $2 AND $1 < check_out
            ORDER BY check_in, uid
            "#,
        )
        .bind(range.check_in)
        .bind(range.check_out)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            error!("Database error finding calendar blocks: {}", e);
            AppError::Database(format!("Failed to find calendar blocks: {}", e))
        })?;

        Ok(rows.into_iter().map(Into::into).collect())
    }
}

/// Helper struct for mapping database rows
#[derive(Debug, sqlx::FromRow)]
struct BlockRow {
    uid: String,
    check_in: NaiveDate,
    check_out: NaiveDate,
    source: String,
    stale: bool,
    room_id: Option<i32>,
    beds: Option<Vec<i32>>,
    bed_count: i32,
}

impl From<BlockRow> for ExternalBlock {
    fn from(row: BlockRow) -> Self {
        Self {
            uid: row.uid,
            check_in: row.check_in,
            check_out: row.check_out,
            source: row.source,
            stale: row.stale,
            room_id: row.room_id.map(|r| r as u32),
            beds: row
                .beds
                .map(|beds| beds.into_iter().filter(|b| *b > 0).map(|b| b as u32).collect()),
            bed_count: row.bed_count.max(1) as u32,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_row_conversion_drops_invalid_beds() {
        let row = BlockRow {
            uid: "feed-1".to_string(),
            check_in: NaiveDate::from_ymd_opt(2025, 8, 1).unwrap(),
            check_out: NaiveDate::from_ymd_opt(2025, 8, 3).unwrap(),
            source: "airbnb".to_string(),
            stale: true,
            room_id: Some(4),
            beds: Some(vec![0, 2, 3]),
            bed_count: 0,
        };

        let block: ExternalBlock = row.into();
        assert_eq!(block.room_id, Some(4));
        assert_eq!(block.beds, Some(vec![2, 3]));
        assert_eq!(block.bed_count, 1);
        assert!(block.stale);
    }
}
