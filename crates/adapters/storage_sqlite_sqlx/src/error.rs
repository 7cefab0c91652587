//! Storage-specific error type wrapping sqlx errors.

use homehub_domain::error::HubError;

/// Errors originating from the `SQLite` storage layer.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// A query or connection failed.
    #[error("database error")]
    Database(#[from] sqlx::Error),

    /// Failed to serialize a JSON column.
    #[error("JSON serialization error")]
    Json(#[from] serde_json::Error),

    /// Failed to run migrations.
    #[error("migration error")]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// The database directory could not be created.
    #[error("cannot prepare database directory")]
    Io(#[from] std::io::Error),

    /// The database is not at the schema version this build expects.
    #[error("schema version mismatch")]
    SchemaMismatch { expected: i64, found: Option<i64> },
}

impl From<StorageError> for HubError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::SchemaMismatch { expected, found } => Self::SchemaMismatch { expected, found },
            // Applied by a newer build: this one does not know the migration.
            StorageError::Migration(sqlx::migrate::MigrateError::VersionMissing(version)) => {
                Self::SchemaMismatch {
                    expected: crate::pool::SCHEMA_VERSION,
                    found: Some(version),
                }
            }
            other => Self::Storage(Box::new(other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn should_map_unknown_applied_migration_to_schema_mismatch() {
        let err = StorageError::Migration(sqlx::migrate::MigrateError::VersionMissing(20_990_101));
        assert!(matches!(
            HubError::from(err),
            HubError::SchemaMismatch {
                expected: 1,
                found: Some(20_990_101)
            }
        ));
    }

    #[test]
    fn should_map_io_failure_to_storage_error() {
        let err = StorageError::Io(std::io::Error::other("read-only file system"));
        assert!(HubError::from(err).is_storage_fault());
    }
}
