//! Streaming account CRUD operations.

use chrono::Utc;
use rusqlite::Connection;
use streamctl_common::{Error, Result, ServerId, TenantId};

use crate::models::Tenant;

/// Limits and assignment for a new account.
#[derive(Debug, Clone, Default)]
pub struct NewTenant {
    pub login: String,
    pub max_bitrate_kbps: i64,
    pub max_viewers: i64,
    pub storage_limit_bytes: i64,
    pub low_latency_ingest: bool,
}

/// Whether a login can be used verbatim as a directory and application name.
pub fn is_valid_login(login: &str) -> bool {
    !login.is_empty()
        && login.len() <= 64
        && login
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
        && !login.starts_with('-')
}

/// Create an account assigned to `server_id`.
pub fn create_tenant(conn: &Connection, server_id: ServerId, new: &NewTenant) -> Result<Tenant> {
    if !is_valid_login(&new.login) {
        return Err(Error::Validation(format!(
            "login '{}' is not filesystem-safe",
            new.login
        )));
    }

    let id = TenantId::new();
    let created_at = Utc::now().to_rfc3339();

    conn.execute(
        "INSERT INTO tenants (id, login, server_id, max_bitrate_kbps, max_viewers,
                              storage_limit_bytes, low_latency_ingest, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        rusqlite::params![
            id.to_string(),
            new.login,
            server_id.to_string(),
            new.max_bitrate_kbps,
            new.max_viewers,
            new.storage_limit_bytes,
            new.low_latency_ingest,
            created_at,
        ],
    )
    .map_err(|e| match e {
        rusqlite::Error::SqliteFailure(f, _)
            if f.code == rusqlite::ErrorCode::ConstraintViolation =>
        {
            Error::Conflict(format!("login '{}' already exists", new.login))
        }
        other => Error::database(other.to_string()),
    })?;

    Ok(Tenant {
        id,
        login: new.login.clone(),
        server_id,
        max_bitrate_kbps: new.max_bitrate_kbps,
        max_viewers: new.max_viewers,
        storage_limit_bytes: new.storage_limit_bytes,
        low_latency_ingest: new.low_latency_ingest,
        created_at,
    })
}

/// Get an account by ID.
pub fn get_tenant(conn: &Connection, id: TenantId) -> Result<Option<Tenant>> {
    let sql = format!("SELECT {} FROM tenants WHERE id = ?1", Tenant::COLUMNS);
    match conn.query_row(&sql, [id.to_string()], Tenant::from_row) {
        Ok(t) => Ok(Some(t)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(Error::database(e.to_string())),
    }
}

/// Get an account by its login.
pub fn get_tenant_by_login(conn: &Connection, login: &str) -> Result<Option<Tenant>> {
    let sql = format!("SELECT {} FROM tenants WHERE login = ?1", Tenant::COLUMNS);
    match conn.query_row(&sql, [login], Tenant::from_row) {
        Ok(t) => Ok(Some(t)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(Error::database(e.to_string())),
    }
}

/// List all accounts hosted on a server.
pub fn list_tenants_for_server(conn: &Connection, server_id: ServerId) -> Result<Vec<Tenant>> {
    let sql = format!(
        "SELECT {} FROM tenants WHERE server_id = ?1 ORDER BY login",
        Tenant::COLUMNS
    );
    let mut stmt = conn
        .prepare(&sql)
        .map_err(|e| Error::database(e.to_string()))?;
    let rows = stmt
        .query_map([server_id.to_string()], Tenant::from_row)
        .map_err(|e| Error::database(e.to_string()))?
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(|e| Error::database(e.to_string()))?;
    Ok(rows)
}
