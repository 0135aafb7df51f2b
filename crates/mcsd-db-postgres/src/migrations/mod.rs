//! Schema setup for the registry and resource-map tables.
//!
//! No `sqlx-macros`/`sqlx::migrate!` here — same constraint the teacher's
//! backend worked under, to avoid pulling in the sqlite feature set that
//! macro drags along. Each statement is idempotent (`IF NOT EXISTS`), so
//! running this against an already-migrated database is a no-op.

use sqlx_core::query::query;
use sqlx_postgres::PgPool;
use tracing::{info, instrument};

use crate::error::{PostgresError, Result};

const STATEMENTS: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS directory (
        id TEXT PRIMARY KEY,
        ura TEXT NOT NULL,
        endpoint TEXT NOT NULL UNIQUE,
        origin TEXT NOT NULL CHECK (origin IN ('provider', 'manual')),
        failed_attempts INTEGER NOT NULL DEFAULT 0,
        failed_sync_count INTEGER NOT NULL DEFAULT 0,
        last_success_sync TIMESTAMPTZ,
        is_ignored BOOLEAN NOT NULL DEFAULT FALSE,
        reason_ignored TEXT,
        deleted_at TIMESTAMPTZ,
        created_at TIMESTAMPTZ NOT NULL DEFAULT now(),
        modified_at TIMESTAMPTZ NOT NULL DEFAULT now()
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS directory_provider (
        id TEXT PRIMARY KEY,
        url TEXT NOT NULL UNIQUE,
        enabled BOOLEAN NOT NULL DEFAULT TRUE,
        last_refresh_at TIMESTAMPTZ
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS directory_provider_directory (
        provider_id TEXT NOT NULL REFERENCES directory_provider(id),
        directory_id TEXT NOT NULL REFERENCES directory(id),
        first_seen_at TIMESTAMPTZ NOT NULL,
        last_seen_at TIMESTAMPTZ NOT NULL,
        removed_at TIMESTAMPTZ,
        PRIMARY KEY (provider_id, directory_id)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS resource_map (
        directory_id TEXT NOT NULL REFERENCES directory(id),
        resource_type TEXT NOT NULL,
        upstream_resource_id TEXT NOT NULL,
        local_resource_id TEXT NOT NULL,
        content_hash TEXT NOT NULL,
        created_at TIMESTAMPTZ NOT NULL DEFAULT now(),
        updated_at TIMESTAMPTZ NOT NULL DEFAULT now(),
        PRIMARY KEY (directory_id, resource_type, upstream_resource_id)
    )
    "#,
    r#"
    CREATE INDEX IF NOT EXISTS idx_resource_map_local_id
        ON resource_map (resource_type, local_resource_id)
    "#,
];

/// Runs every `CREATE TABLE IF NOT EXISTS` / `CREATE INDEX IF NOT EXISTS`
/// statement in order.
#[instrument(skip(pool))]
pub async fn run(pool: &PgPool) -> Result<()> {
    for statement in STATEMENTS {
        query(statement)
            .execute(pool)
            .await
            .map_err(|e| PostgresError::migration(e.to_string()))?;
    }
    info!("registry and resource-map schema up to date");
    Ok(())
}
