//! Device store layer for Orrery.
//!
//! The device offers a persistent, capacity-limited string key-value store.
//! [`KvBackend`] is that raw store; [`DurableStore`] is the adapter every
//! component talks to. The adapter:
//!
//! - surfaces a full store as [`StoreError::QuotaExceeded`] from `set`,
//! - treats every read failure (backend error, corrupt JSON, wrong shape) as
//!   "absent" and logs it,
//! - never lets a backend failure on `remove` escape.
//!
//! Components own disjoint key namespaces (see the `*_KEY` / `*_PREFIX`
//! constants in each module); nothing here enforces that.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde::Serialize;
use serde::de::DeserializeOwned;
use sqlx::Row;
use sqlx::sqlite::{SqlitePool, SqlitePoolOptions};
use tracing::{debug, warn};

use crate::error::{StoreError, StoreResult};

/// A raw persistent string store.
#[async_trait]
pub trait KvBackend: Send + Sync {
    async fn read(&self, key: &str) -> StoreResult<Option<String>>;

    /// Insert or overwrite `key`. Fails with `QuotaExceeded` when the store
    /// would grow past its capacity.
    async fn write(&self, key: &str, value: &str) -> StoreResult<()>;

    async fn delete(&self, key: &str) -> StoreResult<()>;
}

/// The store handle passed to every component.
#[derive(Clone)]
pub struct DurableStore {
    backend: Arc<dyn KvBackend>,
}

impl DurableStore {
    pub fn new(backend: Arc<dyn KvBackend>) -> Self {
        Self { backend }
    }

    /// An unbounded in-memory store.
    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryBackend::new()))
    }

    /// Read a raw value. Backend failures read as absent.
    pub async fn get(&self, key: &str) -> Option<String> {
        match self.backend.read(key).await {
            Ok(value) => value,
            Err(e) => {
                warn!(key, error = %e, "Store read failed; treating as absent");
                None
            }
        }
    }

    /// Read and decode a JSON value. Missing, unreadable or malformed values
    /// all read as absent.
    pub async fn get_json<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let raw = self.get(key).await?;
        match serde_json::from_str(&raw) {
            Ok(value) => Some(value),
            Err(e) => {
                warn!(key, error = %e, "Malformed stored value; treating as absent");
                None
            }
        }
    }

    /// Whether a value is stored under `key`, without decoding it.
    pub async fn contains(&self, key: &str) -> bool {
        self.get(key).await.is_some()
    }

    pub async fn set(&self, key: &str, value: &str) -> StoreResult<()> {
        self.backend.write(key, value).await
    }

    pub async fn set_json<T: Serialize + ?Sized>(&self, key: &str, value: &T) -> StoreResult<()> {
        let raw = serde_json::to_string(value)?;
        self.set(key, &raw).await
    }

    /// Remove a value. Failures are logged, never returned.
    pub async fn remove(&self, key: &str) {
        if let Err(e) = self.backend.delete(key).await {
            warn!(key, error = %e, "Store remove failed");
        }
    }
}

/// Bytes a key/value pair counts against a store's capacity.
fn entry_size(key: &str, value: &str) -> u64 {
    (key.len() + value.len()) as u64
}

fn check_capacity(capacity: Option<u64>, used: u64, requested: u64) -> StoreResult<()> {
    match capacity {
        Some(capacity) if used + requested > capacity => Err(StoreError::QuotaExceeded {
            used,
            capacity,
            requested,
        }),
        _ => Ok(()),
    }
}

/// In-memory backend with an optional byte capacity.
///
/// Used by tests and by hosts without persistent storage.
#[derive(Debug, Default)]
pub struct MemoryBackend {
    entries: Mutex<HashMap<String, String>>,
    capacity: Option<u64>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// A backend that rejects writes once keys plus values exceed `capacity` bytes.
    pub fn with_capacity(capacity: u64) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            capacity: Some(capacity),
        }
    }

    /// Bytes currently stored.
    pub fn used_bytes(&self) -> u64 {
        self.lock().iter().map(|(k, v)| entry_size(k, v)).sum()
    }

    /// Number of stored keys.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Stored keys starting with `prefix`.
    pub fn keys_with_prefix(&self, prefix: &str) -> Vec<String> {
        let mut keys: Vec<String> = self
            .lock()
            .keys()
            .filter(|k| k.starts_with(prefix))
            .cloned()
            .collect();
        keys.sort();
        keys
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, String>> {
        self.entries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl KvBackend for MemoryBackend {
    async fn read(&self, key: &str) -> StoreResult<Option<String>> {
        Ok(self.lock().get(key).cloned())
    }

    async fn write(&self, key: &str, value: &str) -> StoreResult<()> {
        let mut entries = self.lock();
        let used: u64 = entries
            .iter()
            .filter(|(k, _)| k.as_str() != key)
            .map(|(k, v)| entry_size(k, v))
            .sum();
        check_capacity(self.capacity, used, entry_size(key, value))?;
        entries.insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn delete(&self, key: &str) -> StoreResult<()> {
        self.lock().remove(key);
        Ok(())
    }
}

/// SQLite-backed device store.
///
/// A single `kv_entries` table, capped at an optional total byte size so it
/// behaves like a platform store with a fixed quota.
#[derive(Clone)]
pub struct SqliteBackend {
    pool: SqlitePool,
    capacity: Option<u64>,
}

impl SqliteBackend {
    /// Open the store and initialize the schema.
    ///
    /// # Arguments
    ///
    /// * `database_url` - SQLite connection string (e.g., "sqlite:orrery.db?mode=rwc" or "sqlite::memory:")
    /// * `capacity` - Maximum total bytes of keys plus values, or `None` for unbounded
    pub async fn new(database_url: &str, capacity: Option<u64>) -> anyhow::Result<Self> {
        // One connection: the device store has a single writer, and the
        // capacity check must see its own previous writes.
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect(database_url)
            .await?;

        let backend = Self { pool, capacity };
        backend.initialize_schema().await?;

        Ok(backend)
    }

    async fn initialize_schema(&self) -> anyhow::Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS kv_entries (
                key TEXT PRIMARY KEY NOT NULL,
                value TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Bytes stored under every key except `excluding`.
    async fn used_bytes_excluding(&self, excluding: &str) -> StoreResult<u64> {
        let row = sqlx::query(
            r#"
            SELECT COALESCE(SUM(length(CAST(key AS BLOB)) + length(CAST(value AS BLOB))), 0) AS used
            FROM kv_entries
            WHERE key != ?
            "#,
        )
        .bind(excluding)
        .fetch_one(&self.pool)
        .await?;

        let used: i64 = row.get("used");
        Ok(used.max(0) as u64)
    }
}

#[async_trait]
impl KvBackend for SqliteBackend {
    async fn read(&self, key: &str) -> StoreResult<Option<String>> {
        let row = sqlx::query("SELECT value FROM kv_entries WHERE key = ?")
            .bind(key)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.map(|r| r.get("value")))
    }

    async fn write(&self, key: &str, value: &str) -> StoreResult<()> {
        if self.capacity.is_some() {
            let used = self.used_bytes_excluding(key).await?;
            check_capacity(self.capacity, used, entry_size(key, value))?;
        }

        sqlx::query(
            r#"
            INSERT INTO kv_entries (key, value)
            VALUES (?, ?)
            ON CONFLICT(key) DO UPDATE SET value = excluded.value
            "#,
        )
        .bind(key)
        .bind(value)
        .execute(&self.pool)
        .await?;

        debug!(key, bytes = value.len(), "Stored value");
        Ok(())
    }

    async fn delete(&self, key: &str) -> StoreResult<()> {
        sqlx::query("DELETE FROM kv_entries WHERE key = ?")
            .bind(key)
            .execute(&self.pool)
            .await?;

        Ok(())
    }
}
