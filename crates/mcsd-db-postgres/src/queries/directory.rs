//! Hand-written queries backing `DirectoryStore`: directories, providers,
//! and the provider-directory link table.

use mcsd_storage::{Directory, DirectoryOrigin, Provider, ProviderDirectoryLink, StorageError};
use sqlx_core::query::query;
use sqlx_core::query_as::query_as;
use sqlx_postgres::PgPool;

use crate::bridge::{from_chrono, to_chrono};
use crate::error::classify_sqlx_error;

const DIRECTORY_COLUMNS: &str = "id, ura, endpoint, origin, failed_attempts, failed_sync_count, \
    last_success_sync, is_ignored, reason_ignored, deleted_at, created_at, modified_at";

type DirectoryRow = (
    String,
    String,
    String,
    String,
    i32,
    i32,
    Option<chrono::DateTime<chrono::Utc>>,
    bool,
    Option<String>,
    Option<chrono::DateTime<chrono::Utc>>,
    chrono::DateTime<chrono::Utc>,
    chrono::DateTime<chrono::Utc>,
);

fn row_to_directory(row: DirectoryRow) -> Directory {
    let (
        id,
        ura,
        endpoint,
        origin,
        failed_attempts,
        failed_sync_count,
        last_success_sync,
        is_ignored,
        reason_ignored,
        deleted_at,
        created_at,
        modified_at,
    ) = row;
    Directory {
        id,
        ura,
        endpoint,
        origin: if origin == "manual" {
            DirectoryOrigin::Manual
        } else {
            DirectoryOrigin::Provider
        },
        failed_attempts,
        failed_sync_count,
        last_success_sync: last_success_sync.map(from_chrono),
        is_ignored,
        reason_ignored,
        deleted_at: deleted_at.map(from_chrono),
        created_at: from_chrono(created_at),
        modified_at: from_chrono(modified_at),
    }
}

fn origin_str(origin: DirectoryOrigin) -> &'static str {
    match origin {
        DirectoryOrigin::Provider => "provider",
        DirectoryOrigin::Manual => "manual",
    }
}

pub async fn get_directory(pool: &PgPool, id: &str) -> Result<Option<Directory>, StorageError> {
    let row: Option<DirectoryRow> = query_as(&format!(
        "SELECT {DIRECTORY_COLUMNS} FROM directory WHERE id = $1"
    ))
    .bind(id)
    .fetch_optional(pool)
    .await
    .map_err(classify_sqlx_error)?;
    Ok(row.map(row_to_directory))
}

pub async fn find_directory_by_endpoint(
    pool: &PgPool,
    endpoint: &str,
) -> Result<Option<Directory>, StorageError> {
    let row: Option<DirectoryRow> = query_as(&format!(
        "SELECT {DIRECTORY_COLUMNS} FROM directory WHERE endpoint = $1"
    ))
    .bind(endpoint)
    .fetch_optional(pool)
    .await
    .map_err(classify_sqlx_error)?;
    Ok(row.map(row_to_directory))
}

pub async fn upsert_directory(pool: &PgPool, d: Directory) -> Result<Directory, StorageError> {
    let row: DirectoryRow = query_as(&format!(
        r#"
        INSERT INTO directory
            (id, ura, endpoint, origin, failed_attempts, failed_sync_count,
             last_success_sync, is_ignored, reason_ignored, deleted_at,
             created_at, modified_at)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
        ON CONFLICT (id) DO UPDATE SET
            ura = EXCLUDED.ura,
            endpoint = EXCLUDED.endpoint,
            origin = EXCLUDED.origin,
            failed_attempts = EXCLUDED.failed_attempts,
            failed_sync_count = EXCLUDED.failed_sync_count,
            last_success_sync = EXCLUDED.last_success_sync,
            is_ignored = EXCLUDED.is_ignored,
            reason_ignored = EXCLUDED.reason_ignored,
            deleted_at = EXCLUDED.deleted_at,
            modified_at = EXCLUDED.modified_at
        RETURNING {DIRECTORY_COLUMNS}
        "#
    ))
    .bind(&d.id)
    .bind(&d.ura)
    .bind(&d.endpoint)
    .bind(origin_str(d.origin))
    .bind(d.failed_attempts)
    .bind(d.failed_sync_count)
    .bind(d.last_success_sync.as_ref().map(to_chrono))
    .bind(d.is_ignored)
    .bind(&d.reason_ignored)
    .bind(d.deleted_at.as_ref().map(to_chrono))
    .bind(to_chrono(&d.created_at))
    .bind(to_chrono(&d.modified_at))
    .fetch_one(pool)
    .await
    .map_err(classify_sqlx_error)?;

    Ok(row_to_directory(row))
}

pub async fn list_active_directories(pool: &PgPool) -> Result<Vec<Directory>, StorageError> {
    let rows: Vec<DirectoryRow> = query_as(&format!(
        "SELECT {DIRECTORY_COLUMNS} FROM directory WHERE is_ignored = FALSE AND deleted_at IS NULL"
    ))
    .fetch_all(pool)
    .await
    .map_err(classify_sqlx_error)?;
    Ok(rows.into_iter().map(row_to_directory).collect())
}

pub async fn soft_delete_directory(
    pool: &PgPool,
    id: &str,
    deleted_at: chrono::DateTime<chrono::Utc>,
) -> Result<(), StorageError> {
    let result = query("UPDATE directory SET deleted_at = $2, modified_at = $2 WHERE id = $1")
        .bind(id)
        .bind(deleted_at)
        .execute(pool)
        .await
        .map_err(classify_sqlx_error)?;
    if result.rows_affected() == 0 {
        return Err(StorageError::not_found("Directory", id));
    }
    Ok(())
}

pub async fn list_deleted_directories(pool: &PgPool) -> Result<Vec<Directory>, StorageError> {
    let rows: Vec<DirectoryRow> = query_as(&format!(
        "SELECT {DIRECTORY_COLUMNS} FROM directory WHERE deleted_at IS NOT NULL"
    ))
    .fetch_all(pool)
    .await
    .map_err(classify_sqlx_error)?;
    Ok(rows.into_iter().map(row_to_directory).collect())
}

pub async fn hard_delete_directory(pool: &PgPool, id: &str) -> Result<(), StorageError> {
    let result = query("DELETE FROM directory WHERE id = $1")
        .bind(id)
        .execute(pool)
        .await
        .map_err(classify_sqlx_error)?;
    if result.rows_affected() == 0 {
        return Err(StorageError::not_found("Directory", id));
    }
    Ok(())
}

pub async fn mark_ignored(
    pool: &PgPool,
    id: &str,
    reason: String,
    at: chrono::DateTime<chrono::Utc>,
) -> Result<Directory, StorageError> {
    let row: Option<DirectoryRow> = query_as(&format!(
        r#"
        UPDATE directory SET
            is_ignored = TRUE,
            reason_ignored = $2,
            modified_at = $3
        WHERE id = $1
        RETURNING {DIRECTORY_COLUMNS}
        "#
    ))
    .bind(id)
    .bind(reason)
    .bind(at)
    .fetch_optional(pool)
    .await
    .map_err(classify_sqlx_error)?;
    row.map(row_to_directory)
        .ok_or_else(|| StorageError::not_found("Directory", id))
}

pub async fn record_sync_attempt(
    pool: &PgPool,
    id: &str,
    success: bool,
    at: chrono::DateTime<chrono::Utc>,
) -> Result<Directory, StorageError> {
    let row: Option<DirectoryRow> = if success {
        query_as(&format!(
            r#"
            UPDATE directory SET
                failed_attempts = 0,
                last_success_sync = $2,
                is_ignored = FALSE,
                reason_ignored = NULL,
                modified_at = $2
            WHERE id = $1
            RETURNING {DIRECTORY_COLUMNS}
            "#
        ))
        .bind(id)
        .bind(at)
        .fetch_optional(pool)
        .await
        .map_err(classify_sqlx_error)?
    } else {
        query_as(&format!(
            r#"
            UPDATE directory SET
                failed_attempts = failed_attempts + 1,
                failed_sync_count = failed_sync_count + 1,
                modified_at = $2
            WHERE id = $1
            RETURNING {DIRECTORY_COLUMNS}
            "#
        ))
        .bind(id)
        .bind(at)
        .fetch_optional(pool)
        .await
        .map_err(classify_sqlx_error)?
    };

    row.map(row_to_directory)
        .ok_or_else(|| StorageError::not_found("Directory", id))
}

const PROVIDER_COLUMNS: &str = "id, url, enabled, last_refresh_at";

type ProviderRow = (String, String, bool, Option<chrono::DateTime<chrono::Utc>>);

fn row_to_provider(row: ProviderRow) -> Provider {
    let (id, url, enabled, last_refresh_at) = row;
    Provider {
        id,
        url,
        enabled,
        last_refresh_at: last_refresh_at.map(from_chrono),
    }
}

pub async fn get_provider(pool: &PgPool, id: &str) -> Result<Option<Provider>, StorageError> {
    let row: Option<ProviderRow> = query_as(&format!(
        "SELECT {PROVIDER_COLUMNS} FROM directory_provider WHERE id = $1"
    ))
    .bind(id)
    .fetch_optional(pool)
    .await
    .map_err(classify_sqlx_error)?;
    Ok(row.map(row_to_provider))
}

pub async fn upsert_provider(pool: &PgPool, p: Provider) -> Result<Provider, StorageError> {
    let row: ProviderRow = query_as(&format!(
        r#"
        INSERT INTO directory_provider (id, url, enabled, last_refresh_at)
        VALUES ($1, $2, $3, $4)
        ON CONFLICT (id) DO UPDATE SET
            url = EXCLUDED.url,
            enabled = EXCLUDED.enabled,
            last_refresh_at = EXCLUDED.last_refresh_at
        RETURNING {PROVIDER_COLUMNS}
        "#
    ))
    .bind(&p.id)
    .bind(&p.url)
    .bind(p.enabled)
    .bind(p.last_refresh_at.as_ref().map(to_chrono))
    .fetch_one(pool)
    .await
    .map_err(classify_sqlx_error)?;
    Ok(row_to_provider(row))
}

pub async fn list_enabled_providers(pool: &PgPool) -> Result<Vec<Provider>, StorageError> {
    let rows: Vec<ProviderRow> = query_as(&format!(
        "SELECT {PROVIDER_COLUMNS} FROM directory_provider WHERE enabled = TRUE"
    ))
    .fetch_all(pool)
    .await
    .map_err(classify_sqlx_error)?;
    Ok(rows.into_iter().map(row_to_provider).collect())
}

pub async fn set_provider_last_refresh(
    pool: &PgPool,
    id: &str,
    at: chrono::DateTime<chrono::Utc>,
) -> Result<(), StorageError> {
    let result = query("UPDATE directory_provider SET last_refresh_at = $2 WHERE id = $1")
        .bind(id)
        .bind(at)
        .execute(pool)
        .await
        .map_err(classify_sqlx_error)?;
    if result.rows_affected() == 0 {
        return Err(StorageError::not_found("Provider", id));
    }
    Ok(())
}

const LINK_COLUMNS: &str = "provider_id, directory_id, first_seen_at, last_seen_at, removed_at";

type LinkRow = (
    String,
    String,
    chrono::DateTime<chrono::Utc>,
    chrono::DateTime<chrono::Utc>,
    Option<chrono::DateTime<chrono::Utc>>,
);

fn row_to_link(row: LinkRow) -> ProviderDirectoryLink {
    let (provider_id, directory_id, first_seen_at, last_seen_at, removed_at) = row;
    ProviderDirectoryLink {
        provider_id,
        directory_id,
        first_seen_at: from_chrono(first_seen_at),
        last_seen_at: from_chrono(last_seen_at),
        removed_at: removed_at.map(from_chrono),
    }
}

pub async fn upsert_provider_link(
    pool: &PgPool,
    link: ProviderDirectoryLink,
) -> Result<ProviderDirectoryLink, StorageError> {
    let row: LinkRow = query_as(&format!(
        r#"
        INSERT INTO directory_provider_directory
            (provider_id, directory_id, first_seen_at, last_seen_at, removed_at)
        VALUES ($1, $2, $3, $4, NULL)
        ON CONFLICT (provider_id, directory_id) DO UPDATE SET
            last_seen_at = EXCLUDED.last_seen_at,
            removed_at = NULL
        RETURNING {LINK_COLUMNS}
        "#
    ))
    .bind(&link.provider_id)
    .bind(&link.directory_id)
    .bind(to_chrono(&link.first_seen_at))
    .bind(to_chrono(&link.last_seen_at))
    .fetch_one(pool)
    .await
    .map_err(classify_sqlx_error)?;
    Ok(row_to_link(row))
}

pub async fn list_linked_directory_ids(
    pool: &PgPool,
    provider_id: &str,
) -> Result<Vec<String>, StorageError> {
    let ids: Vec<(String,)> = query_as(
        "SELECT directory_id FROM directory_provider_directory \
         WHERE provider_id = $1 AND removed_at IS NULL",
    )
    .bind(provider_id)
    .fetch_all(pool)
    .await
    .map_err(classify_sqlx_error)?;
    Ok(ids.into_iter().map(|(id,)| id).collect())
}

pub async fn mark_unseen_links_removed(
    pool: &PgPool,
    provider_id: &str,
    seen_directory_ids: &[String],
    at: chrono::DateTime<chrono::Utc>,
) -> Result<Vec<ProviderDirectoryLink>, StorageError> {
    let rows: Vec<LinkRow> = query_as(&format!(
        r#"
        UPDATE directory_provider_directory
        SET removed_at = $3
        WHERE provider_id = $1
          AND removed_at IS NULL
          AND NOT (directory_id = ANY($2))
        RETURNING {LINK_COLUMNS}
        "#
    ))
    .bind(provider_id)
    .bind(seen_directory_ids)
    .bind(at)
    .fetch_all(pool)
    .await
    .map_err(classify_sqlx_error)?;
    Ok(rows.into_iter().map(row_to_link).collect())
}

pub async fn count_other_active_links(
    pool: &PgPool,
    directory_id: &str,
    excluding_provider_id: &str,
) -> Result<i64, StorageError> {
    let (count,): (i64,) = query_as(
        r#"
        SELECT COUNT(*) FROM directory_provider_directory dpd
        JOIN directory_provider dp ON dp.id = dpd.provider_id
        WHERE dpd.directory_id = $1
          AND dpd.provider_id != $2
          AND dpd.removed_at IS NULL
          AND dp.enabled = TRUE
        "#,
    )
    .bind(directory_id)
    .bind(excluding_provider_id)
    .fetch_one(pool)
    .await
    .map_err(classify_sqlx_error)?;
    Ok(count)
}
