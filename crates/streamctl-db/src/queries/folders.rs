//! Tenant folder operations.
//!
//! Sanitized names are unique per tenant, compared case-insensitively.

use chrono::Utc;
use rusqlite::Connection;
use streamctl_common::{Error, FolderId, Result, ServerId, TenantId};

use crate::models::Folder;

/// Insert a folder row.
///
/// Returns [`Error::Conflict`] when the tenant already owns a folder whose
/// sanitized name matches case-insensitively.
pub fn create_folder(
    conn: &Connection,
    tenant_id: TenantId,
    server_id: ServerId,
    name: &str,
    sanitized_name: &str,
) -> Result<Folder> {
    let id = FolderId::new();
    let created_at = Utc::now().to_rfc3339();

    conn.execute(
        "INSERT INTO folders (id, tenant_id, server_id, name, sanitized_name, usage_bytes, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, 0, ?6)",
        rusqlite::params![
            id.to_string(),
            tenant_id.to_string(),
            server_id.to_string(),
            name,
            sanitized_name,
            created_at,
        ],
    )
    .map_err(|e| match e {
        rusqlite::Error::SqliteFailure(f, _)
            if f.code == rusqlite::ErrorCode::ConstraintViolation =>
        {
            Error::Conflict(format!("folder '{sanitized_name}' already exists"))
        }
        other => Error::database(other.to_string()),
    })?;

    Ok(Folder {
        id,
        tenant_id,
        server_id,
        name: name.to_string(),
        sanitized_name: sanitized_name.to_string(),
        usage_bytes: 0,
        created_at,
    })
}

/// Get a folder by ID.
pub fn get_folder(conn: &Connection, id: FolderId) -> Result<Option<Folder>> {
    let sql = format!("SELECT {} FROM folders WHERE id = ?1", Folder::COLUMNS);
    match conn.query_row(&sql, [id.to_string()], Folder::from_row) {
        Ok(f) => Ok(Some(f)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(Error::database(e.to_string())),
    }
}

/// Find a tenant's folder by sanitized name, ignoring case.
pub fn find_by_sanitized_name(
    conn: &Connection,
    tenant_id: TenantId,
    sanitized_name: &str,
) -> Result<Option<Folder>> {
    let sql = format!(
        "SELECT {} FROM folders WHERE tenant_id = ?1 AND sanitized_name = ?2 COLLATE NOCASE",
        Folder::COLUMNS
    );
    match conn.query_row(
        &sql,
        rusqlite::params![tenant_id.to_string(), sanitized_name],
        Folder::from_row,
    ) {
        Ok(f) => Ok(Some(f)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(Error::database(e.to_string())),
    }
}

/// List a tenant's folders ordered by name.
pub fn list_folders(conn: &Connection, tenant_id: TenantId) -> Result<Vec<Folder>> {
    let sql = format!(
        "SELECT {} FROM folders WHERE tenant_id = ?1 ORDER BY sanitized_name",
        Folder::COLUMNS
    );
    let mut stmt = conn
        .prepare(&sql)
        .map_err(|e| Error::database(e.to_string()))?;
    let rows = stmt
        .query_map([tenant_id.to_string()], Folder::from_row)
        .map_err(|e| Error::database(e.to_string()))?
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(|e| Error::database(e.to_string()))?;
    Ok(rows)
}

/// Rename a folder.
pub fn rename_folder(
    conn: &Connection,
    id: FolderId,
    name: &str,
    sanitized_name: &str,
) -> Result<bool> {
    let n = conn
        .execute(
            "UPDATE folders SET name = ?1, sanitized_name = ?2 WHERE id = ?3",
            rusqlite::params![name, sanitized_name, id.to_string()],
        )
        .map_err(|e| match e {
            rusqlite::Error::SqliteFailure(f, _)
                if f.code == rusqlite::ErrorCode::ConstraintViolation =>
            {
                Error::Conflict(format!("folder '{sanitized_name}' already exists"))
            }
            other => Error::database(other.to_string()),
        })?;
    Ok(n > 0)
}

/// Delete a folder row.
pub fn delete_folder(conn: &Connection, id: FolderId) -> Result<bool> {
    let n = conn
        .execute("DELETE FROM folders WHERE id = ?1", [id.to_string()])
        .map_err(|e| Error::database(e.to_string()))?;
    Ok(n > 0)
}

/// Number of videos the store believes live in a folder.
pub fn count_videos(conn: &Connection, id: FolderId) -> Result<i64> {
    conn.query_row(
        "SELECT COUNT(*) FROM videos WHERE folder_id = ?1",
        [id.to_string()],
        |row| row.get(0),
    )
    .map_err(|e| Error::database(e.to_string()))
}

/// Overwrite the cached usage with a freshly measured value.
pub fn set_usage(conn: &Connection, id: FolderId, usage_bytes: i64) -> Result<bool> {
    let n = conn
        .execute(
            "UPDATE folders SET usage_bytes = ?1 WHERE id = ?2",
            rusqlite::params![usage_bytes, id.to_string()],
        )
        .map_err(|e| Error::database(e.to_string()))?;
    Ok(n > 0)
}

/// Sum of cached folder usage for a tenant.
pub fn total_usage(conn: &Connection, tenant_id: TenantId) -> Result<i64> {
    conn.query_row(
        "SELECT COALESCE(SUM(usage_bytes), 0) FROM folders WHERE tenant_id = ?1",
        [tenant_id.to_string()],
        |row| row.get(0),
    )
    .map_err(|e| Error::database(e.to_string()))
}
