use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use sqlx::{
    sqlite::{SqliteConnectOptions, SqlitePoolOptions},
    Pool, Row, Sqlite,
};
use std::{
    collections::HashMap,
    fs,
    path::{Path, PathBuf},
    str::FromStr,
    sync::{Arc, Mutex},
};

/// Storage key holding the serialized offline outbound queue.
pub const OFFLINE_QUEUE_KEY: &str = "offline_message_queue";
pub const AUTH_TOKEN_KEY: &str = "auth_token";
pub const CURRENT_USER_KEY: &str = "current_user";

/// Keys removed when stored credentials are discarded.
pub const CREDENTIAL_KEYS: [&str; 2] = [AUTH_TOKEN_KEY, CURRENT_USER_KEY];

pub fn last_connection_key(user_email: &str) -> String {
    format!("last_connection_{user_email}")
}

/// Durable string key-value persistence.
///
/// `compare_and_swap` is the only primitive that may be used for
/// read-modify-write cycles: it applies `new` only if the stored value still
/// equals `expected` (`None` meaning absent) and reports whether it did.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>>;
    async fn set(&self, key: &str, value: String) -> Result<()>;
    async fn remove(&self, key: &str) -> Result<()>;
    async fn compare_and_swap(
        &self,
        key: &str,
        expected: Option<&str>,
        new: Option<String>,
    ) -> Result<bool>;
}

#[derive(Clone, Default)]
pub struct MemoryStore {
    entries: Arc<Mutex<HashMap<String, String>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn with_entries<T>(&self, f: impl FnOnce(&mut HashMap<String, String>) -> T) -> Result<T> {
        let mut guard = self
            .entries
            .lock()
            .map_err(|_| anyhow!("memory store lock poisoned"))?;
        Ok(f(&mut guard))
    }
}

#[async_trait]
impl KeyValueStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        self.with_entries(|entries| entries.get(key).cloned())
    }

    async fn set(&self, key: &str, value: String) -> Result<()> {
        self.with_entries(|entries| {
            entries.insert(key.to_string(), value);
        })
    }

    async fn remove(&self, key: &str) -> Result<()> {
        self.with_entries(|entries| {
            entries.remove(key);
        })
    }

    async fn compare_and_swap(
        &self,
        key: &str,
        expected: Option<&str>,
        new: Option<String>,
    ) -> Result<bool> {
        self.with_entries(|entries| {
            if entries.get(key).map(String::as_str) != expected {
                return false;
            }
            match new {
                Some(value) => {
                    entries.insert(key.to_string(), value);
                }
                None => {
                    entries.remove(key);
                }
            }
            true
        })
    }
}

#[derive(Clone)]
pub struct SqliteStore {
    pool: Pool<Sqlite>,
}

impl SqliteStore {
    pub async fn open(database_url: &str) -> Result<Self> {
        let database_url = normalize_database_url(database_url);
        ensure_sqlite_parent_dir_exists(&database_url)?;

        let connect_options =
            SqliteConnectOptions::from_str(&database_url)?.create_if_missing(true);
        // Every pooled connection to `sqlite::memory:` would see its own database.
        let max_connections = if database_url.starts_with("sqlite::memory:") {
            1
        } else {
            5
        };
        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect_with(connect_options)
            .await
            .with_context(|| format!("failed to open key-value store at '{database_url}'"))?;
        sqlx::migrate!("./migrations").run(&pool).await?;
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &Pool<Sqlite> {
        &self.pool
    }

    pub async fn health_check(&self) -> Result<()> {
        let _: i64 = sqlx::query_scalar("SELECT 1")
            .fetch_one(&self.pool)
            .await
            .context("sqlite ping failed")?;
        Ok(())
    }
}

#[async_trait]
impl KeyValueStore for SqliteStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        let row = sqlx::query("SELECT value FROM kv_entries WHERE key = ?")
            .bind(key)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(|r| r.get::<String, _>(0)))
    }

    async fn set(&self, key: &str, value: String) -> Result<()> {
        sqlx::query(
            "INSERT INTO kv_entries (key, value, updated_at) VALUES (?, ?, CURRENT_TIMESTAMP)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = CURRENT_TIMESTAMP",
        )
        .bind(key)
        .bind(value)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<()> {
        sqlx::query("DELETE FROM kv_entries WHERE key = ?")
            .bind(key)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn compare_and_swap(
        &self,
        key: &str,
        expected: Option<&str>,
        new: Option<String>,
    ) -> Result<bool> {
        let rows_affected = match (expected, new) {
            (None, Some(value)) => sqlx::query(
                "INSERT INTO kv_entries (key, value, updated_at) VALUES (?, ?, CURRENT_TIMESTAMP)
                 ON CONFLICT(key) DO NOTHING",
            )
            .bind(key)
            .bind(value)
            .execute(&self.pool)
            .await?
            .rows_affected(),
            (Some(current), Some(value)) => sqlx::query(
                "UPDATE kv_entries SET value = ?, updated_at = CURRENT_TIMESTAMP
                 WHERE key = ? AND value = ?",
            )
            .bind(value)
            .bind(key)
            .bind(current)
            .execute(&self.pool)
            .await?
            .rows_affected(),
            (Some(current), None) => sqlx::query("DELETE FROM kv_entries WHERE key = ? AND value = ?")
                .bind(key)
                .bind(current)
                .execute(&self.pool)
                .await?
                .rows_affected(),
            (None, None) => {
                let exists: i64 =
                    sqlx::query_scalar("SELECT COUNT(*) FROM kv_entries WHERE key = ?")
                        .bind(key)
                        .fetch_one(&self.pool)
                        .await?;
                return Ok(exists == 0);
            }
        };
        Ok(rows_affected == 1)
    }
}

/// Accepts plain file paths as well as `sqlite:` urls.
pub fn normalize_database_url(raw_database_url: &str) -> String {
    let raw_database_url = raw_database_url.trim();

    if raw_database_url.is_empty() {
        return "sqlite::memory:".to_string();
    }

    if raw_database_url.starts_with("sqlite::memory:")
        || raw_database_url.starts_with("sqlite://")
        || raw_database_url.contains("://")
    {
        return raw_database_url.to_string();
    }

    if let Some(path) = raw_database_url.strip_prefix("sqlite:") {
        let path = path.replace('\\', "/");
        return format!("sqlite://{path}");
    }

    format!("sqlite://{}", raw_database_url.replace('\\', "/"))
}

fn ensure_sqlite_parent_dir_exists(database_url: &str) -> Result<()> {
    let Some(path) = sqlite_path(database_url) else {
        return Ok(());
    };

    let Some(parent) = path.parent() else {
        return Ok(());
    };

    fs::create_dir_all(parent).with_context(|| {
        format!(
            "failed to create parent directory '{}' for database url '{database_url}'",
            parent.display()
        )
    })?;

    Ok(())
}

fn sqlite_path(database_url: &str) -> Option<PathBuf> {
    if database_url.starts_with("sqlite::memory:") || !database_url.starts_with("sqlite:") {
        return None;
    }

    let path = database_url
        .trim_start_matches("sqlite://")
        .trim_start_matches("sqlite:")
        .split('?')
        .next()
        .unwrap_or_default();

    if path.is_empty() {
        return None;
    }

    Some(Path::new(path).to_path_buf())
}

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
