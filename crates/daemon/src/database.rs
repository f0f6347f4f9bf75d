//! SQLite persistence for resident state and the blob cache.
//!
//! This module manages its own connection pool. Two tables: `resident_site`
//! holds at most one row (the active manifest + site info as JSON), and
//! `blob_cache` maps content identifiers to decompressed bytes.

use std::path::Path;

use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use sqlx::Row;
use thiserror::Error;
use tracing::info;

/// Database connection pool for daemon state.
#[derive(Debug, Clone)]
pub struct Database {
    pool: SqlitePool,
}

impl std::ops::Deref for Database {
    type Target = SqlitePool;

    fn deref(&self) -> &Self::Target {
        &self.pool
    }
}

/// Errors that can occur when setting up the database.
#[derive(Debug, Error)]
pub enum DatabaseError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] sqlx::Error),

    #[error("Setup error: {0}")]
    Setup(String),
}

impl Database {
    /// Open (or create) a file-based database and run migrations.
    pub async fn new(path: impl AsRef<Path>) -> Result<Self, DatabaseError> {
        let path = path.as_ref();

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                DatabaseError::Setup(format!("failed to create database directory: {e}"))
            })?;
        }

        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await?;

        let db = Self { pool };
        db.run_migrations().await?;

        info!("daemon database initialized at {:?}", path);
        Ok(db)
    }

    /// Create an in-memory database. Used by tests and ephemeral services.
    pub async fn in_memory() -> Result<Self, DatabaseError> {
        let options = SqliteConnectOptions::new()
            .filename(":memory:")
            .create_if_missing(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await?;

        let db = Self { pool };
        db.run_migrations().await?;

        info!("daemon database initialized in-memory");
        Ok(db)
    }

    async fn run_migrations(&self) -> Result<(), DatabaseError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS resident_site (
                id INTEGER PRIMARY KEY CHECK (id = 1),
                manifest TEXT NOT NULL,
                site_info TEXT NOT NULL,
                updated_at INTEGER NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS blob_cache (
                cid TEXT PRIMARY KEY,
                data BLOB NOT NULL,
                size INTEGER NOT NULL,
                created_at INTEGER NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Replace the resident site row.
    pub async fn save_resident(
        &self,
        manifest_json: &str,
        site_info_json: &str,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            INSERT INTO resident_site (id, manifest, site_info, updated_at)
            VALUES (1, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                manifest = excluded.manifest,
                site_info = excluded.site_info,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(manifest_json)
        .bind(site_info_json)
        .bind(chrono::Utc::now().timestamp())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Load the resident site row, if any: `(manifest_json, site_info_json)`.
    pub async fn load_resident(&self) -> Result<Option<(String, String)>, sqlx::Error> {
        let row = sqlx::query("SELECT manifest, site_info FROM resident_site WHERE id = 1")
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(|r| (r.get::<String, _>("manifest"), r.get::<String, _>("site_info"))))
    }

    pub async fn clear_resident(&self) -> Result<(), sqlx::Error> {
        sqlx::query("DELETE FROM resident_site")
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn get_blob(&self, cid: &str) -> Result<Option<Vec<u8>>, sqlx::Error> {
        let row = sqlx::query("SELECT data FROM blob_cache WHERE cid = ?")
            .bind(cid)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(|r| r.get::<Vec<u8>, _>("data")))
    }

    pub async fn put_blob(&self, cid: &str, data: &[u8]) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            INSERT INTO blob_cache (cid, data, size, created_at)
            VALUES (?, ?, ?, ?)
            ON CONFLICT(cid) DO NOTHING
            "#,
        )
        .bind(cid)
        .bind(data)
        .bind(data.len() as i64)
        .bind(chrono::Utc::now().timestamp())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn clear_blobs(&self) -> Result<(), sqlx::Error> {
        sqlx::query("DELETE FROM blob_cache")
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Entry count and total byte size of the blob cache.
    pub async fn blob_stats(&self) -> Result<(u64, u64), sqlx::Error> {
        let row =
            sqlx::query("SELECT COUNT(*) AS n, COALESCE(SUM(size), 0) AS bytes FROM blob_cache")
                .fetch_one(&self.pool)
                .await?;
        Ok((
            row.get::<i64, _>("n") as u64,
            row.get::<i64, _>("bytes") as u64,
        ))
    }
}
