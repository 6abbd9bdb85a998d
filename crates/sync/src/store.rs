//! Durable key-value storage capability.
//!
//! The engine never touches the filesystem directly: everything durable (cache
//! partitions, the pending queue, the last-sync timestamp, backup snapshots,
//! the auth token) goes through [`KeyValueStore`] under namespaced string keys
//! with JSON-serialized values. The production store is SQLite-backed; tests
//! inject [`MemoryStore`].
//!
//! The store file is shared across processes of the same user; no cross-process
//! coordination is attempted, so concurrent writers can race. Accepted
//! limitation, not a guarantee.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex as StdMutex};

use anyhow::Context;
use async_trait::async_trait;
use chrono::Utc;
use sqlx::sqlite::SqliteConnectOptions;
use sqlx::{Row, SqlitePool};
use tokio::sync::Mutex;

use magazzino_core::EntityType;

/// Storage keys, namespaced per concern.
pub mod keys {
    use super::EntityType;

    pub const PENDING_OPS: &str = "pending_ops";
    pub const LAST_SYNC: &str = "last_sync";
    pub const BACKUPS: &str = "backups";
    pub const AUTH_TOKEN: &str = "auth_token";

    /// Cache partition key for one entity type.
    pub fn cache(entity: EntityType) -> String {
        format!("cache:{}", entity.as_str())
    }
}

/// Injected storage capability.
///
/// Values are opaque strings (callers JSON-serialize). Absence of a key is
/// `Ok(None)`, never an error.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    async fn get(&self, key: &str) -> anyhow::Result<Option<String>>;
    async fn put(&self, key: &str, value: &str) -> anyhow::Result<()>;
    async fn remove(&self, key: &str) -> anyhow::Result<()>;
}

/// SQLite-backed store (offline support).
///
/// Cheap to clone; the pool is initialized lazily on first use.
#[derive(Debug, Clone)]
pub struct SqliteStore {
    pool: Arc<Mutex<Option<SqlitePool>>>,
    path: Option<PathBuf>,
}

impl SqliteStore {
    /// Create a store at the default per-user data path
    /// (`{app_data_dir}/magazzino/sync.db`).
    pub fn new() -> Self {
        Self {
            pool: Arc::new(Mutex::new(None)),
            path: None,
        }
    }

    /// Create a store at an explicit path (tests, portable installs).
    pub fn at_path(path: impl Into<PathBuf>) -> Self {
        Self {
            pool: Arc::new(Mutex::new(None)),
            path: Some(path.into()),
        }
    }

    /// Initialize the database connection (called lazily on first use).
    async fn ensure_initialized(&self) -> anyhow::Result<()> {
        let mut pool_guard = self.pool.lock().await;
        if pool_guard.is_some() {
            return Ok(());
        }

        let db_path = match &self.path {
            Some(path) => path.clone(),
            None => default_db_path()
                .context("failed to determine store path - ensure app data directory is accessible")?,
        };

        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("failed to create store directory at {:?}", parent))?;
        }

        let options = SqliteConnectOptions::new()
            .filename(&db_path)
            .create_if_missing(true);

        let pool = SqlitePool::connect_with(options)
            .await
            .with_context(|| format!("failed to create SQLite pool at {:?}", db_path))?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS kv_store (
                key        TEXT PRIMARY KEY,
                value      TEXT NOT NULL,
                updated_at TEXT NOT NULL
            )
            "#,
        )
        .execute(&pool)
        .await
        .context("failed to create kv_store table")?;

        *pool_guard = Some(pool);
        Ok(())
    }

    /// Get the pool, initializing if necessary.
    async fn get_pool(&self) -> anyhow::Result<SqlitePool> {
        self.ensure_initialized().await?;
        let pool_guard = self.pool.lock().await;
        pool_guard
            .as_ref()
            .cloned()
            .context("store pool missing after initialization")
    }
}

impl Default for SqliteStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl KeyValueStore for SqliteStore {
    async fn get(&self, key: &str) -> anyhow::Result<Option<String>> {
        let pool = self.get_pool().await?;

        let row = sqlx::query("SELECT value FROM kv_store WHERE key = ?1")
            .bind(key)
            .fetch_optional(&pool)
            .await
            .with_context(|| format!("failed to read key '{}'", key))?;

        match row {
            Some(row) => Ok(Some(row.try_get("value")?)),
            None => Ok(None),
        }
    }

    async fn put(&self, key: &str, value: &str) -> anyhow::Result<()> {
        let pool = self.get_pool().await?;
        let now = Utc::now().to_rfc3339();

        sqlx::query(
            r#"
            INSERT INTO kv_store (key, value, updated_at)
            VALUES (?1, ?2, ?3)
            ON CONFLICT(key)
            DO UPDATE SET
                value = excluded.value,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(key)
        .bind(value)
        .bind(&now)
        .execute(&pool)
        .await
        .with_context(|| format!("failed to write key '{}'", key))?;

        Ok(())
    }

    async fn remove(&self, key: &str) -> anyhow::Result<()> {
        let pool = self.get_pool().await?;

        sqlx::query("DELETE FROM kv_store WHERE key = ?1")
            .bind(key)
            .execute(&pool)
            .await
            .with_context(|| format!("failed to remove key '{}'", key))?;

        Ok(())
    }
}

/// In-memory store for tests and ephemeral runs.
#[derive(Debug, Default)]
pub struct MemoryStore {
    values: StdMutex<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl KeyValueStore for MemoryStore {
    async fn get(&self, key: &str) -> anyhow::Result<Option<String>> {
        let values = self
            .values
            .lock()
            .map_err(|_| anyhow::anyhow!("memory store poisoned"))?;
        Ok(values.get(key).cloned())
    }

    async fn put(&self, key: &str, value: &str) -> anyhow::Result<()> {
        let mut values = self
            .values
            .lock()
            .map_err(|_| anyhow::anyhow!("memory store poisoned"))?;
        values.insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn remove(&self, key: &str) -> anyhow::Result<()> {
        let mut values = self
            .values
            .lock()
            .map_err(|_| anyhow::anyhow!("memory store poisoned"))?;
        values.remove(key);
        Ok(())
    }
}

/// Resolve the default SQLite store path:
/// `{app_data_dir}/magazzino/sync.db`.
fn default_db_path() -> anyhow::Result<PathBuf> {
    let base = dirs::data_dir()
        .or_else(|| {
            dirs::home_dir().map(|mut h| {
                h.push(".local");
                h.push("share");
                h
            })
        })
        .context("failed to resolve OS app data directory - tried data_dir() and home_dir()/.local/share")?;

    let mut dir = base;
    dir.push("magazzino");
    dir.push("sync.db");

    Ok(dir)
}
