//! `SQLite` connection pool setup, migration runner and schema check.

use std::str::FromStr;

use sqlx::SqlitePool;
use sqlx::sqlite::SqliteConnectOptions;

use homehub_app::ports::StorageConfig;

use crate::error::StorageError;

/// Schema version recorded in `schema_info` by the embedded migrations.
pub const SCHEMA_VERSION: i64 = 1;

const IN_MEMORY_URL: &str = "sqlite::memory:";

const SCHEMA_TABLE_EXISTS: &str =
    "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = 'schema_info'";
const SELECT_SCHEMA_VERSION: &str = "SELECT MAX(version) FROM schema_info";

/// Holds the `SQLite` connection pool and provides access to it.
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    /// Connect to the database, optionally run migrations, then check the
    /// schema version.
    ///
    /// The parent directory of a file database is created when missing.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError`] if the directory, the connection or the
    /// migrations fail, and [`StorageError::SchemaMismatch`] when the schema
    /// is missing or at another version.
    pub async fn open(config: &StorageConfig) -> Result<Self, StorageError> {
        let options = if config.is_in_memory() {
            SqliteConnectOptions::from_str(IN_MEMORY_URL)?
        } else {
            if let Some(parent) = config.path.parent().filter(|p| !p.as_os_str().is_empty()) {
                std::fs::create_dir_all(parent)?;
            }
            SqliteConnectOptions::new()
                .filename(&config.path)
                .create_if_missing(true)
        }
        .foreign_keys(true);

        let pool = SqlitePool::connect_with(options).await?;

        if config.run_migrations {
            sqlx::migrate!("./migrations").run(&pool).await?;
        }

        let database = Self { pool };
        database.check_schema().await?;
        tracing::info!(
            path = %config.path.display(),
            migrated = config.run_migrations,
            "sqlite database opened"
        );
        Ok(database)
    }

    /// Compare the stored schema version with [`SCHEMA_VERSION`].
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::SchemaMismatch`] when `schema_info` is missing
    /// or holds another version.
    pub async fn check_schema(&self) -> Result<(), StorageError> {
        let (tables,): (i64,) = sqlx::query_as(SCHEMA_TABLE_EXISTS)
            .fetch_one(&self.pool)
            .await?;
        let found = if tables == 0 {
            None
        } else {
            let (version,): (Option<i64>,) = sqlx::query_as(SELECT_SCHEMA_VERSION)
                .fetch_one(&self.pool)
                .await?;
            version
        };

        if found == Some(SCHEMA_VERSION) {
            Ok(())
        } else {
            Err(StorageError::SchemaMismatch {
                expected: SCHEMA_VERSION,
                found,
            })
        }
    }

    /// Borrow the underlying connection pool.
    #[must_use]
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Close every connection, waiting for in-flight queries.
    pub async fn close(&self) {
        self.pool.close().await;
    }
}
