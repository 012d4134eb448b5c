//! Durable storage for the single persisted bearer token.
//!
//! Absence of a value means "logged out". No validation happens here.

use std::path::Path;
use std::sync::{PoisonError, RwLock};

use anyhow::Context;
use async_trait::async_trait;
use campus_auth::BearerToken;
use chrono::Utc;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Row, SqlitePool};

/// Key the token is persisted under.
pub const TOKEN_KEY: &str = "token";

#[derive(Debug, Clone, thiserror::Error)]
pub enum TokenStoreError {
    #[error("storage error: {0}")]
    Storage(String),
}

impl From<anyhow::Error> for TokenStoreError {
    fn from(err: anyhow::Error) -> Self {
        TokenStoreError::Storage(format!("{err:#}"))
    }
}

/// Key-value slot for the persisted bearer token.
#[async_trait]
pub trait TokenStore: Send + Sync {
    async fn get(&self) -> Result<Option<BearerToken>, TokenStoreError>;

    async fn set(&self, token: &BearerToken) -> Result<(), TokenStoreError>;

    /// Remove the token. Clearing an empty store is not an error.
    async fn clear(&self) -> Result<(), TokenStoreError>;
}

/// Process-local token store for tests and ephemeral sessions.
#[derive(Debug, Default)]
pub struct InMemoryTokenStore {
    slot: RwLock<Option<BearerToken>>,
}

impl InMemoryTokenStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store pre-populated with `token`, as if persisted by an earlier run.
    pub fn with_token(token: impl Into<String>) -> Self {
        Self {
            slot: RwLock::new(Some(BearerToken::new(token))),
        }
    }

    /// Synchronous peek, for assertions.
    pub fn snapshot(&self) -> Option<BearerToken> {
        self.slot.read().unwrap_or_else(PoisonError::into_inner).clone()
    }
}

#[async_trait]
impl TokenStore for InMemoryTokenStore {
    async fn get(&self) -> Result<Option<BearerToken>, TokenStoreError> {
        Ok(self.snapshot())
    }

    async fn set(&self, token: &BearerToken) -> Result<(), TokenStoreError> {
        *self.slot.write().unwrap_or_else(PoisonError::into_inner) = Some(token.clone());
        Ok(())
    }

    async fn clear(&self) -> Result<(), TokenStoreError> {
        *self.slot.write().unwrap_or_else(PoisonError::into_inner) = None;
        Ok(())
    }
}

/// SQLite-backed token store surviving process restarts.
#[derive(Debug, Clone)]
pub struct SqliteTokenStore {
    pool: SqlitePool,
}

impl SqliteTokenStore {
    /// Open (or create) the store at `path`, creating parent directories.
    pub async fn open(path: &Path) -> anyhow::Result<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("failed to create token store directory at {:?}", parent))?;
        }

        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await
            .with_context(|| format!("failed to open token store at {:?}", path))?;

        Self::from_pool(pool).await
    }

    /// In-memory database, for tests.
    pub async fn in_memory() -> anyhow::Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .context("failed to open in-memory token store")?;

        Self::from_pool(pool).await
    }

    async fn from_pool(pool: SqlitePool) -> anyhow::Result<Self> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS kv_store (
                key        TEXT PRIMARY KEY NOT NULL,
                value      TEXT NOT NULL,
                updated_at TEXT NOT NULL
            )
            "#,
        )
        .execute(&pool)
        .await
        .context("failed to create kv_store table")?;

        Ok(Self { pool })
    }

    async fn read(&self) -> anyhow::Result<Option<BearerToken>> {
        let row = sqlx::query(
            r#"
            SELECT value
            FROM kv_store
            WHERE key = ?1
            "#,
        )
        .bind(TOKEN_KEY)
        .fetch_optional(&self.pool)
        .await
        .context("failed to read token")?;

        let Some(row) = row else {
            return Ok(None);
        };

        let value: String = row.try_get("value")?;
        Ok(Some(BearerToken::new(value)).filter(|t| !t.as_str().is_empty()))
    }

    async fn write(&self, token: &BearerToken) -> anyhow::Result<()> {
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
        .bind(TOKEN_KEY)
        .bind(token.as_str())
        .bind(&now)
        .execute(&self.pool)
        .await
        .context("failed to upsert token")?;

        Ok(())
    }

    async fn delete(&self) -> anyhow::Result<()> {
        sqlx::query(
            r#"
            DELETE FROM kv_store
            WHERE key = ?1
            "#,
        )
        .bind(TOKEN_KEY)
        .execute(&self.pool)
        .await
        .context("failed to delete token")?;

        Ok(())
    }
}

#[async_trait]
impl TokenStore for SqliteTokenStore {
    async fn get(&self) -> Result<Option<BearerToken>, TokenStoreError> {
        Ok(self.read().await?)
    }

    async fn set(&self, token: &BearerToken) -> Result<(), TokenStoreError> {
        Ok(self.write(token).await?)
    }

    async fn clear(&self) -> Result<(), TokenStoreError> {
        Ok(self.delete().await?)
    }
}
