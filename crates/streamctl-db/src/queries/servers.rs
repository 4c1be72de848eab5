//! Media-serving host CRUD operations.

use chrono::Utc;
use rusqlite::Connection;
use streamctl_common::{Error, Result, ServerId, ServerStatus};

use crate::models::Server;

/// Fields required to register a host.
#[derive(Debug, Clone)]
pub struct NewServer {
    pub name: String,
    pub host: String,
    pub ssh_port: u16,
    pub ssh_user: String,
    pub ssh_password: Option<String>,
    pub ssh_key_path: Option<String>,
    pub http_port: u16,
    pub max_tenants: i64,
}

/// Register a new host in the `active` state.
pub fn create_server(conn: &Connection, new: &NewServer) -> Result<Server> {
    let id = ServerId::new();
    let created_at = Utc::now().to_rfc3339();

    conn.execute(
        "INSERT INTO servers (id, name, host, ssh_port, ssh_user, ssh_password, ssh_key_path,
                              http_port, max_tenants, current_tenants, status, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, 0, ?10, ?11)",
        rusqlite::params![
            id.to_string(),
            new.name,
            new.host,
            new.ssh_port,
            new.ssh_user,
            new.ssh_password,
            new.ssh_key_path,
            new.http_port,
            new.max_tenants,
            ServerStatus::Active.to_string(),
            created_at,
        ],
    )
    .map_err(|e| Error::database(e.to_string()))?;

    Ok(Server {
        id,
        name: new.name.clone(),
        host: new.host.clone(),
        ssh_port: new.ssh_port,
        ssh_user: new.ssh_user.clone(),
        ssh_password: new.ssh_password.clone(),
        ssh_key_path: new.ssh_key_path.clone(),
        http_port: new.http_port,
        max_tenants: new.max_tenants,
        current_tenants: 0,
        status: ServerStatus::Active,
        created_at,
    })
}

/// Get a host by ID.
pub fn get_server(conn: &Connection, id: ServerId) -> Result<Option<Server>> {
    let sql = format!("SELECT {} FROM servers WHERE id = ?1", Server::COLUMNS);
    match conn.query_row(&sql, [id.to_string()], Server::from_row) {
        Ok(s) => Ok(Some(s)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(Error::database(e.to_string())),
    }
}

/// List all hosts ordered by name.
pub fn list_servers(conn: &Connection) -> Result<Vec<Server>> {
    let sql = format!("SELECT {} FROM servers ORDER BY name", Server::COLUMNS);
    let mut stmt = conn
        .prepare(&sql)
        .map_err(|e| Error::database(e.to_string()))?;
    let rows = stmt
        .query_map([], Server::from_row)
        .map_err(|e| Error::database(e.to_string()))?
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(|e| Error::database(e.to_string()))?;
    Ok(rows)
}

/// Put a host into or out of maintenance.
pub fn set_status(conn: &Connection, id: ServerId, status: ServerStatus) -> Result<bool> {
    let n = conn
        .execute(
            "UPDATE servers SET status = ?1 WHERE id = ?2",
            rusqlite::params![status.to_string(), id.to_string()],
        )
        .map_err(|e| Error::database(e.to_string()))?;
    Ok(n > 0)
}

/// Recount the tenants assigned to a host and store the result.
pub fn refresh_tenant_count(conn: &Connection, id: ServerId) -> Result<i64> {
    let count: i64 = conn
        .query_row(
            "SELECT COUNT(*) FROM tenants WHERE server_id = ?1",
            [id.to_string()],
            |row| row.get(0),
        )
        .map_err(|e| Error::database(e.to_string()))?;

    conn.execute(
        "UPDATE servers SET current_tenants = ?1 WHERE id = ?2",
        rusqlite::params![count, id.to_string()],
    )
    .map_err(|e| Error::database(e.to_string()))?;

    Ok(count)
}
