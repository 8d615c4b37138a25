//! SQLite-backed storage handle.
//!
//! Owns pool construction and schema lifecycle in one place. Schema
//! versions are tracked through SQLite's `user_version` pragma; each entry
//! in [`MIGRATIONS`] runs at most once, in order, and the pragma advances
//! after every applied step so a crash mid-sequence resumes at the first
//! unapplied migration.

use std::path::Path;
use std::time::Duration;

use sqlx::sqlite::{
    SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous,
};
use sqlx::SqlitePool;
use thiserror::Error;

/// Ordered schema steps; position n (1-based) is the `user_version` the
/// store reaches after applying it.
const MIGRATIONS: &[&str] = &[include_str!("../../../migrations/001_initial_schema.sql")];

#[derive(Debug, Error)]
pub enum StoreSetupError {
    #[error("Cannot create data directory {path}: {source}")]
    DataDir {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Cannot open database {path}: {source}")]
    Open {
        path: String,
        #[source]
        source: sqlx::Error,
    },

    #[error("Schema migration to version {version} failed: {source}")]
    Migration {
        version: i64,
        #[source]
        source: sqlx::Error,
    },
}

/// Connection pool plus schema lifecycle for the orchestrator store.
///
/// Repositories borrow clones of the pool; the handle itself is only
/// needed at startup.
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    /// Open the store at `path`, creating the file and its parent
    /// directory as needed, and bring the schema up to date.
    pub async fn open(path: &str, max_connections: u32) -> Result<Self, StoreSetupError> {
        if let Some(parent) = Path::new(path).parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent).map_err(|source| StoreSetupError::DataDir {
                    path: parent.display().to_string(),
                    source,
                })?;
            }
        }

        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .foreign_keys(true)
            .busy_timeout(Duration::from_secs(30));

        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections.max(1))
            .acquire_timeout(Duration::from_secs(3))
            .connect_with(options)
            .await
            .map_err(|source| StoreSetupError::Open { path: path.to_string(), source })?;

        let db = Self { pool };
        db.migrate().await?;
        Ok(db)
    }

    /// In-memory store for tests. Pinned to a single connection so the
    /// database lives exactly as long as the pool.
    pub async fn open_in_memory() -> Result<Self, StoreSetupError> {
        let options = SqliteConnectOptions::new()
            .filename(":memory:")
            .foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await
            .map_err(|source| StoreSetupError::Open {
                path: ":memory:".to_string(),
                source,
            })?;

        let db = Self { pool };
        db.migrate().await?;
        Ok(db)
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Current schema version as recorded in the `user_version` pragma.
    pub async fn schema_version(&self) -> Result<i64, sqlx::Error> {
        let (version,): (i64,) = sqlx::query_as("PRAGMA user_version")
            .fetch_one(&self.pool)
            .await?;
        Ok(version)
    }

    /// Apply every migration the store has not seen yet. Idempotent.
    async fn migrate(&self) -> Result<(), StoreSetupError> {
        let current = self
            .schema_version()
            .await
            .map_err(|source| StoreSetupError::Migration { version: 0, source })?;

        for (index, sql) in MIGRATIONS.iter().enumerate() {
            let version = index as i64 + 1;
            if version <= current {
                continue;
            }

            sqlx::raw_sql(sql)
                .execute(&self.pool)
                .await
                .map_err(|source| StoreSetupError::Migration { version, source })?;

            // The pragma does not accept bind parameters; version is an
            // internal integer, never user input.
            sqlx::query(&format!("PRAGMA user_version = {version}"))
                .execute(&self.pool)
                .await
                .map_err(|source| StoreSetupError::Migration { version, source })?;

            tracing::info!(version, "Applied schema migration");
        }

        Ok(())
    }
}
