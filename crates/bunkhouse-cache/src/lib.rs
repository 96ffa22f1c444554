//! Advisory lock store for Bunkhouse
//!
//! Provides the shared store behind the hold manager. Production runs use
//! [`RedisLockStore`]; tests and single-process runs use [`MemoryLockStore`].
//!
//! # Features
//!
//! - Connection pooling via Redis ConnectionManager
//! - Atomic set-if-absent with TTL for per-night bed claims
//! - Compare-and-delete so a hold only removes claims it owns
//! - Compare-and-set so hold records change only from the state last read
//! - Prefix listing via incremental SCAN
//!
//! # Example
//!
//! ```no_run
//! use bunkhouse_cache::RedisLockStore;
//! use bunkhouse_core::traits::LockStore;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let store = RedisLockStore::new("redis://127.0.0.1:6379").await?;
//!
//!     let claimed = store.set_nx_ex("bed_claim:1:1:2025-07-01", "hold-a", 600).await?;
//!     assert!(claimed);
//!
//!     Ok(())
//! }
//! ```

pub mod events;
pub mod keys;
pub mod memory;

pub use events::RedisEventSink;
pub use memory::MemoryLockStore;

use async_trait::async_trait;
use bunkhouse_core::error::AppError;
use bunkhouse_core::traits::LockStore;
use redis::{aio::ConnectionManager, AsyncCommands, Client, RedisError};
use tracing::{debug, error, warn};

/// Deletes KEYS[1] only while it still holds ARGV[1]
const DELETE_IF_EQ_SCRIPT: &str = r#"
if redis.call('GET', KEYS[1]) == ARGV[1] then
    return redis.call('DEL', KEYS[1])
else
    return 0
end
"#;

/// Sets KEYS[1] to ARGV[2] with TTL ARGV[3] only while it still holds ARGV[1]
const REPLACE_IF_EQ_SCRIPT: &str = r#"
if redis.call('GET', KEYS[1]) == ARGV[1] then
    redis.call('SET', KEYS[1], ARGV[2], 'EX', ARGV[3])
    return 1
else
    return 0
end
"#;

const SCAN_BATCH: usize = 200;

/// Redis lock store with connection pooling
///
/// Wraps a Redis ConnectionManager to provide efficient, multiplexed access
/// to Redis. All operations are async and return Results with AppError.
#[derive(Clone)]
pub struct RedisLockStore {
    manager: ConnectionManager,
}

impl RedisLockStore {
    /// Create a new Redis lock store
    ///
    /// # Errors
    ///
    /// Returns `AppError::LockStoreConnection` if the connection fails
    pub async fn new(url: &str) -> Result<Self, AppError> {
        debug!("Connecting to Redis at {}", url);

        let client = Client::open(url).map_err(|e| {
            error!("Failed to create Redis client: {}", e);
            AppError::LockStoreConnection(format!("Invalid Redis URL: {}", e))
        })?;

        let manager = ConnectionManager::new(client).await.map_err(|e| {
            error!("Failed to establish Redis connection: {}", e);
            AppError::LockStoreConnection(format!("Connection failed: {}", e))
        })?;

        debug!("Redis connection established successfully");
        Ok(Self { manager })
    }

    /// Shared connection manager, for other Redis-backed adapters
    pub fn connection(&self) -> ConnectionManager {
        self.manager.clone()
    }

    /// Ping the Redis server to check connectivity
    pub async fn ping(&self) -> Result<(), AppError> {
        let mut conn = self.manager.clone();
        let _: String = redis::cmd("PING")
            .query_async(&mut conn)
            .await
            .map_err(|e| {
                error!("Redis ping failed: {}", e);
                AppError::LockStore(format!("Ping failed: {}", e))
            })?;
        Ok(())
    }

    /// Flush all keys from the current database
    #[cfg(test)]
    pub async fn flush_db(&self) -> Result<(), AppError> {
        let mut conn = self.manager.clone();
        let _: () = redis::cmd("FLUSHDB")
            .query_async(&mut conn)
            .await
            .map_err(|e| {
                error!("Failed to flush database: {}", e);
                AppError::LockStore(format!("Flush failed: {}", e))
            })?;
        Ok(())
    }

    /// Convert RedisError to AppError
    pub(crate) fn map_redis_error(err: RedisError) -> AppError {
        match err.kind() {
            redis::ErrorKind::IoError => {
                error!("Redis I/O error: {}", err);
                AppError::LockStoreConnection(format!("I/O error: {}", err))
            }
            redis::ErrorKind::TypeError => {
                warn!("Redis type error: {}", err);
                AppError::LockStore(format!("Type mismatch: {}", err))
            }
            _ => {
                error!("Redis error: {}", err);
                AppError::LockStore(err.to_string())
            }
        }
    }
}

#[async_trait]
impl LockStore for RedisLockStore {
    async fn get(&self, key: &str) -> Result<Option<String>, AppError> {
        debug!("GET {}", key);
        let mut conn = self.manager.clone();

        let value: Option<String> = conn.get(key).await.map_err(Self::map_redis_error)?;
        Ok(value)
    }

    async fn set_ex(&self, key: &str, value: &str, ttl_secs: u64) -> Result<(), AppError> {
        debug!("SET {} (TTL: {}s)", key, ttl_secs);
        let mut conn = self.manager.clone();

        let _: () = conn
            .set_ex(key, value, ttl_secs.max(1))
            .await
            .map_err(Self::map_redis_error)?;

        Ok(())
    }

    async fn set_nx_ex(&self, key: &str, value: &str, ttl_secs: u64) -> Result<bool, AppError> {
        debug!("SETNX {} (TTL: {}s)", key, ttl_secs);
        let mut conn = self.manager.clone();

        // SET key value EX ttl NX - returns OK if set, nil if key exists
        let result: Option<String> = redis::cmd("SET")
            .arg(key)
            .arg(value)
            .arg("EX")
            .arg(ttl_secs.max(1))
            .arg("NX")
            .query_async(&mut conn)
            .await
            .map_err(Self::map_redis_error)?;

        Ok(result.is_some())
    }

    async fn delete(&self, key: &str) -> Result<bool, AppError> {
        debug!("DEL {}", key);
        let mut conn = self.manager.clone();

        let deleted: i32 = conn.del(key).await.map_err(Self::map_redis_error)?;
        Ok(deleted > 0)
    }

    async fn delete_if_eq(&self, key: &str, expected: &str) -> Result<bool, AppError> {
        debug!("DEL-IF-EQ {}", key);
        let mut conn = self.manager.clone();

        let removed: i64 = redis::Script::new(DELETE_IF_EQ_SCRIPT)
            .key(key)
            .arg(expected)
            .invoke_async(&mut conn)
            .await
            .map_err(Self::map_redis_error)?;

        Ok(removed > 0)
    }

    async fn replace_if_eq(
        &self,
        key: &str,
        expected: &str,
        value: &str,
        ttl_secs: u64,
    ) -> Result<bool, AppError> {
        debug!("SET-IF-EQ {} (TTL: {}s)", key, ttl_secs);
        let mut conn = self.manager.clone();

        let replaced: i64 = redis::Script::new(REPLACE_IF_EQ_SCRIPT)
            .key(key)
            .arg(expected)
            .arg(value)
            .arg(ttl_secs.max(1))
            .invoke_async(&mut conn)
            .await
            .map_err(Self::map_redis_error)?;

        Ok(replaced > 0)
    }

    async fn list_by_prefix(&self, prefix: &str) -> Result<Vec<(String, String)>, AppError> {
        let pattern = keys::scan_pattern(prefix);
        debug!("SCAN {}", pattern);
        let mut conn = self.manager.clone();

        let mut found: Vec<String> = Vec::new();
        let mut cursor: u64 = 0;
        loop {
            let (next, batch): (u64, Vec<String>) = redis::cmd("SCAN")
                .arg(cursor)
                .arg("MATCH")
                .arg(&pattern)
                .arg("COUNT")
                .arg(SCAN_BATCH)
                .query_async(&mut conn)
                .await
                .map_err(Self::map_redis_error)?;
            found.extend(batch);
            if next == 0 {
                break;
            }
            cursor = next;
        }

        // SCAN may return a key more than once
        found.sort();
        found.dedup();

        let mut entries = Vec::with_capacity(found.len());
        for chunk in found.chunks(SCAN_BATCH) {
            let values: Vec<Option<String>> = redis::cmd("MGET")
                .arg(chunk)
                .query_async(&mut conn)
                .await
                .map_err(Self::map_redis_error)?;

            // Keys that expired between SCAN and MGET come back as nil
            entries.extend(
                chunk
                    .iter()
                    .zip(values)
                    .filter_map(|(key, value)| value.map(|v| (key.clone(), v))),
            );
        }

        debug!("SCAN {} -> {} live keys", pattern, entries.len());
        Ok(entries)
    }
}
