//! In-process lock store
//!
//! Same contract as [`RedisLockStore`](crate::RedisLockStore), with expiry
//! driven by a [`Clock`] so tests can step through TTLs. Visible only to the
//! process that owns it.

use async_trait::async_trait;
use bunkhouse_core::clock::Clock;
use bunkhouse_core::error::AppError;
use bunkhouse_core::traits::LockStore;
use chrono::{DateTime, Duration, Utc};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

struct Entry {
    value: String,
    expires_at: DateTime<Utc>,
}

pub struct MemoryLockStore {
    entries: Mutex<HashMap<String, Entry>>,
    clock: Arc<dyn Clock>,
}

impl MemoryLockStore {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            clock,
        }
    }

    /// Expiry instant for a TTL, pinned to the latest representable instant
    fn deadline(&self, ttl_secs: u64) -> DateTime<Utc> {
        i64::try_from(ttl_secs.max(1))
            .ok()
            .and_then(Duration::try_seconds)
            .and_then(|ttl| self.clock.now().checked_add_signed(ttl))
            .unwrap_or(DateTime::<Utc>::MAX_UTC)
    }

    /// Number of live entries
    pub fn len(&self) -> usize {
        let now = self.clock.now();
        self.entries
            .lock()
            .values()
            .filter(|entry| entry.expires_at > now)
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl LockStore for MemoryLockStore {
    async fn get(&self, key: &str) -> Result<Option<String>, AppError> {
        let now = self.clock.now();
        let mut entries = self.entries.lock();
        match entries.get(key) {
            Some(entry) if entry.expires_at > now => Ok(Some(entry.value.clone())),
            Some(_) => {
                entries.remove(key);
                Ok(None)
            }
            None => Ok(None),
        }
    }

    async fn set_ex(&self, key: &str, value: &str, ttl_secs: u64) -> Result<(), AppError> {
        debug!("SET {} (TTL: {}s)", key, ttl_secs);
        let expires_at = self.deadline(ttl_secs);
        self.entries.lock().insert(
            key.to_string(),
            Entry {
                value: value.to_string(),
                expires_at,
            },
        );
        Ok(())
    }

    async fn set_nx_ex(&self, key: &str, value: &str, ttl_secs: u64) -> Result<bool, AppError> {
        let now = self.clock.now();
        let expires_at = self.deadline(ttl_secs);
        let mut entries = self.entries.lock();

        if let Some(existing) = entries.get(key) {
            if existing.expires_at > now {
                debug!("SETNX {} rejected", key);
                return Ok(false);
            }
        }

        entries.insert(
            key.to_string(),
            Entry {
                value: value.to_string(),
                expires_at,
            },
        );
        debug!("SETNX {} (TTL: {}s)", key, ttl_secs);
        Ok(true)
    }

    async fn delete(&self, key: &str) -> Result<bool, AppError> {
        let now = self.clock.now();
        Ok(self
            .entries
            .lock()
            .remove(key)
            .map(|entry| entry.expires_at > now)
            .unwrap_or(false))
    }

    async fn delete_if_eq(&self, key: &str, expected: &str) -> Result<bool, AppError> {
        let now = self.clock.now();
        let mut entries = self.entries.lock();
        let matches = entries
            .get(key)
            .map(|entry| entry.expires_at > now && entry.value == expected)
            .unwrap_or(false);
        if matches {
            entries.remove(key);
        }
        Ok(matches)
    }

    async fn replace_if_eq(
        &self,
        key: &str,
        expected: &str,
        value: &str,
        ttl_secs: u64,
    ) -> Result<bool, AppError> {
        let now = self.clock.now();
        let expires_at = self.deadline(ttl_secs);
        let mut entries = self.entries.lock();

        match entries.get_mut(key) {
            Some(entry) if entry.expires_at > now && entry.value == expected => {
                entry.value = value.to_string();
                entry.expires_at = expires_at;
                debug!("SET-IF-EQ {} (TTL: {}s)", key, ttl_secs);
                Ok(true)
            }
            _ => {
                debug!("SET-IF-EQ {} rejected", key);
                Ok(false)
            }
        }
    }

    async fn list_by_prefix(&self, prefix: &str) -> Result<Vec<(String, String)>, AppError> {
        let now = self.clock.now();
        let mut entries = self.entries.lock();
        entries.retain(|_, entry| entry.expires_at > now);

        let mut found: Vec<(String, String)> = entries
            .iter()
            .filter(|(key, _)| key.starts_with(prefix))
            .map(|(key, entry)| (key.clone(), entry.value.clone()))
            .collect();
        found.sort();
        Ok(found)
    }
}
