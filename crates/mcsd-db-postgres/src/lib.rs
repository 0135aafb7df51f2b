//! # mcsd-db-postgres
//!
//! Postgres-backed implementation of `mcsd-storage`'s `DirectoryStore` and
//! `ResourceMapStore` traits, over four tables: `directory`,
//! `directory_provider`, `directory_provider_directory`, `resource_map`.
//!
//! Queries are hand-written against `sqlx-core`/`sqlx-postgres` directly
//! rather than through the `sqlx` facade's `query!` macro, so the crate
//! builds without a live database to check queries against at compile time.

mod bridge;
mod config;
mod error;
mod pool;
mod store;

pub mod migrations;
pub mod queries;

pub use config::PostgresConfig;
pub use error::{PostgresError, Result};
pub use pool::create_pool;
pub use store::{PgDirectoryStore, PgResourceMapStore};

pub use mcsd_storage::{DirectoryStore, ResourceMapStore, StorageError};

/// Creates the connection pool and runs the schema-setup migrations if
/// `config.run_migrations` is set, returning both store implementations
/// wired to the same pool.
pub async fn connect(
    config: &PostgresConfig,
) -> Result<(PgDirectoryStore, PgResourceMapStore)> {
    let pool = create_pool(config).await?;
    if config.run_migrations {
        migrations::run(&pool).await?;
    }
    Ok((
        PgDirectoryStore::new(pool.clone()),
        PgResourceMapStore::new(pool),
    ))
}

pub mod prelude {
    pub use crate::config::PostgresConfig;
    pub use crate::error::{PostgresError, Result};
    pub use crate::store::{PgDirectoryStore, PgResourceMapStore};
    pub use crate::{connect, create_pool};
    pub use mcsd_storage::{DirectoryStore, ResourceMapStore, StorageError};
}
