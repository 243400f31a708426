//! SQLite checkpoint store implementation

use async_trait::async_trait;
use sqlx::{SqlitePool, sqlite::SqlitePoolOptions};
use std::path::Path;
use time::OffsetDateTime;
use toot_mirror_domain::{CheckpointError, CheckpointStore};

const SLOT: &str = "default";

/// SQLite-backed checkpoint store (single row per slot)
pub struct SqliteCheckpointStore {
    pool: SqlitePool,
}

impl SqliteCheckpointStore {
    /// Create a new SQLite checkpoint store, initializing the database if needed
    pub async fn new(db_path: impl AsRef<Path>) -> Result<Self, CheckpointError> {
        let db_path = db_path.as_ref();

        // Create parent directories if needed
        if let Some(parent) = db_path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }

        let db_url = format!("sqlite:{}?mode=rwc", db_path.display());

        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect(&db_url)
            .await
            .map_err(|e| CheckpointError::Database(e.to_string()))?;

        let store = Self { pool };
        store.run_migrations().await?;

        Ok(store)
    }

    /// Create an in-memory SQLite store (for testing)
    pub async fn in_memory() -> Result<Self, CheckpointError> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .map_err(|e| CheckpointError::Database(e.to_string()))?;

        let store = Self { pool };
        store.run_migrations().await?;

        Ok(store)
    }

    async fn run_migrations(&self) -> Result<(), CheckpointError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS checkpoint (
                slot TEXT PRIMARY KEY,
                source_post_id TEXT NOT NULL,
                updated_at TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| CheckpointError::Database(e.to_string()))?;

        Ok(())
    }

    /// When the checkpoint was last advanced
    pub async fn updated_at(&self) -> Result<Option<OffsetDateTime>, CheckpointError> {
        let row: Option<(String,)> =
            sqlx::query_as("SELECT updated_at FROM checkpoint WHERE slot = ?")
                .bind(SLOT)
                .fetch_optional(&self.pool)
                .await
                .map_err(|e| CheckpointError::Database(e.to_string()))?;

        row.map(|(updated_at,)| {
            OffsetDateTime::parse(&updated_at, &time::format_description::well_known::Rfc3339)
                .map_err(|e| CheckpointError::Database(e.to_string()))
        })
        .transpose()
    }
}

#[async_trait]
impl CheckpointStore for SqliteCheckpointStore {
    async fn load(&self) -> Result<Option<String>, CheckpointError> {
        let row: Option<(String,)> =
            sqlx::query_as("SELECT source_post_id FROM checkpoint WHERE slot = ?")
                .bind(SLOT)
                .fetch_optional(&self.pool)
                .await
                .map_err(|e| CheckpointError::Database(e.to_string()))?;

        Ok(row.map(|(id,)| id))
    }

    async fn save(&self, source_post_id: &str) -> Result<(), CheckpointError> {
        let updated_at = OffsetDateTime::now_utc()
            .format(&time::format_description::well_known::Rfc3339)
            .map_err(|e| CheckpointError::Database(e.to_string()))?;

        sqlx::query(
            r#"
            INSERT INTO checkpoint (slot, source_post_id, updated_at)
            VALUES (?, ?, ?)
            ON CONFLICT(slot) DO UPDATE SET
                source_post_id = excluded.source_post_id,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(SLOT)
        .bind(source_post_id)
        .bind(&updated_at)
        .execute(&self.pool)
        .await
        .map_err(|e| CheckpointError::Database(e.to_string()))?;

        Ok(())
    }

    async fn clear(&self) -> Result<(), CheckpointError> {
        sqlx::query("DELETE FROM checkpoint WHERE slot = ?")
            .bind(SLOT)
            .execute(&self.pool)
            .await
            .map_err(|e| CheckpointError::Database(e.to_string()))?;

        Ok(())
    }

    fn strategy(&self) -> &'static str {
        "sqlite"
    }
}
