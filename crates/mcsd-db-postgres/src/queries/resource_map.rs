//! Hand-written queries backing `ResourceMapStore`.

use mcsd_storage::{ResourceMapKey, ResourceMapRow, StorageError};
use sqlx_core::query::query;
use sqlx_core::query_as::query_as;
use sqlx_postgres::PgPool;

use crate::bridge::{from_chrono, to_chrono};
use crate::error::classify_sqlx_error;

type ResourceMapDbRow = (
    String,
    String,
    String,
    String,
    String,
    chrono::DateTime<chrono::Utc>,
    chrono::DateTime<chrono::Utc>,
);

fn row_to_resource_map(row: ResourceMapDbRow) -> Result<ResourceMapRow, StorageError> {
    let (
        directory_id,
        resource_type,
        upstream_resource_id,
        local_resource_id,
        content_hash,
        created_at,
        updated_at,
    ) = row;
    let resource_type = resource_type.parse().map_err(|_| {
        StorageError::internal(format!(
            "unrecognized resource_type '{resource_type}' in resource_map row"
        ))
    })?;
    Ok(ResourceMapRow {
        directory_id,
        resource_type,
        upstream_resource_id,
        local_resource_id,
        content_hash,
        created_at: from_chrono(created_at),
        updated_at: from_chrono(updated_at),
    })
}

/// Batched lookup: one round trip regardless of how many keys the
/// adjacency graph needs resolved, via Postgres's row-constructor `IN`.
pub async fn get_many(
    pool: &PgPool,
    keys: &[ResourceMapKey],
) -> Result<Vec<ResourceMapRow>, StorageError> {
    if keys.is_empty() {
        return Ok(Vec::new());
    }

    let directory_ids: Vec<&str> = keys.iter().map(|k| k.directory_id.as_str()).collect();
    let resource_types: Vec<&str> = keys.iter().map(|k| k.resource_type.as_str()).collect();
    let upstream_ids: Vec<&str> = keys
        .iter()
        .map(|k| k.upstream_resource_id.as_str())
        .collect();

    let rows: Vec<ResourceMapDbRow> = query_as(
        r#"
        SELECT rm.directory_id, rm.resource_type, rm.upstream_resource_id,
               rm.local_resource_id, rm.content_hash, rm.created_at, rm.updated_at
        FROM resource_map rm
        JOIN unnest($1::text[], $2::text[], $3::text[])
            AS wanted(directory_id, resource_type, upstream_resource_id)
            ON rm.directory_id = wanted.directory_id
            AND rm.resource_type = wanted.resource_type
            AND rm.upstream_resource_id = wanted.upstream_resource_id
        "#,
    )
    .bind(&directory_ids)
    .bind(&resource_types)
    .bind(&upstream_ids)
    .fetch_all(pool)
    .await
    .map_err(classify_sqlx_error)?;

    rows.into_iter().map(row_to_resource_map).collect()
}

pub async fn insert(pool: &PgPool, row: ResourceMapRow) -> Result<(), StorageError> {
    query(
        r#"
        INSERT INTO resource_map
            (directory_id, resource_type, upstream_resource_id, local_resource_id,
             content_hash, created_at, updated_at)
        VALUES ($1, $2, $3, $4, $5, $6, $7)
        "#,
    )
    .bind(&row.directory_id)
    .bind(row.resource_type.as_str())
    .bind(&row.upstream_resource_id)
    .bind(&row.local_resource_id)
    .bind(&row.content_hash)
    .bind(to_chrono(&row.created_at))
    .bind(to_chrono(&row.updated_at))
    .execute(pool)
    .await
    .map_err(classify_sqlx_error)?;
    Ok(())
}

pub async fn update(pool: &PgPool, row: ResourceMapRow) -> Result<(), StorageError> {
    let result = query(
        r#"
        UPDATE resource_map SET
            local_resource_id = $4,
            content_hash = $5,
            updated_at = $6
        WHERE directory_id = $1 AND resource_type = $2 AND upstream_resource_id = $3
        "#,
    )
    .bind(&row.directory_id)
    .bind(row.resource_type.as_str())
    .bind(&row.upstream_resource_id)
    .bind(&row.local_resource_id)
    .bind(&row.content_hash)
    .bind(to_chrono(&row.updated_at))
    .execute(pool)
    .await
    .map_err(classify_sqlx_error)?;

    if result.rows_affected() == 0 {
        return Err(StorageError::not_found(
            "ResourceMap",
            format!("{}/{}", row.resource_type, row.upstream_resource_id),
        ));
    }
    Ok(())
}

pub async fn delete(pool: &PgPool, key: &ResourceMapKey) -> Result<(), StorageError> {
    query(
        "DELETE FROM resource_map \
         WHERE directory_id = $1 AND resource_type = $2 AND upstream_resource_id = $3",
    )
    .bind(&key.directory_id)
    .bind(key.resource_type.as_str())
    .bind(&key.upstream_resource_id)
    .execute(pool)
    .await
    .map_err(classify_sqlx_error)?;
    Ok(())
}
