//! Error types for the Postgres-backed registry/resource-map store.

use mcsd_storage::StorageError;

#[derive(Debug, thiserror::Error)]
pub enum PostgresError {
    #[error("database connection error: {0}")]
    Connection(#[from] sqlx_core::error::Error),

    #[error("migration error: {message}")]
    Migration { message: String },

    #[error("configuration error: {message}")]
    Config { message: String },
}

impl PostgresError {
    #[must_use]
    pub fn migration(message: impl Into<String>) -> Self {
        Self::Migration {
            message: message.into(),
        }
    }

    #[must_use]
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }
}

impl From<PostgresError> for StorageError {
    fn from(err: PostgresError) -> Self {
        match err {
            PostgresError::Connection(e) => StorageError::connection(e.to_string()),
            PostgresError::Migration { message } => {
                StorageError::internal(format!("migration error: {message}"))
            }
            PostgresError::Config { message } => {
                StorageError::internal(format!("configuration error: {message}"))
            }
        }
    }
}

/// Maps a raw sqlx error into a `StorageError`, recognizing the unique
/// constraint violation on `(directory_id, resource_type,
/// upstream_resource_id)` as a `Conflict` rather than an opaque `Internal`.
pub fn classify_sqlx_error(err: sqlx_core::error::Error) -> StorageError {
    if let sqlx_core::error::Error::Database(db_err) = &err
        && db_err.code().as_deref() == Some("23505")
    {
        return StorageError::conflict(db_err.message().to_string());
    }
    StorageError::internal(err.to_string())
}

pub type Result<T> = std::result::Result<T, PostgresError>;
