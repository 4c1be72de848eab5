//! Transmission records. At most one transmission per tenant is active.

use chrono::Utc;
use rusqlite::Connection;
use streamctl_common::{Error, PlaylistId, Result, TenantId, TransmissionId, TransmissionStatus};

use crate::models::Transmission;

/// Outcome of [`start_transmission`].
#[derive(Debug, Clone)]
pub struct StartedTransmission {
    pub transmission: Transmission,
    /// The previously active transmission that was ended, if any.
    pub ended: Option<TransmissionId>,
}

/// Begin a transmission, ending any prior active one in the same transaction.
pub fn start_transmission(
    conn: &Connection,
    tenant_id: TenantId,
    playlist_id: Option<PlaylistId>,
    source: Option<&str>,
) -> Result<StartedTransmission> {
    let now = Utc::now().to_rfc3339();
    let tx = conn
        .unchecked_transaction()
        .map_err(|e| Error::database(e.to_string()))?;

    let ended = active_in(&tx, tenant_id)?.map(|t| t.id);
    if let Some(prev) = ended {
        tx.execute(
            "UPDATE transmissions SET status = 'ended', ended_at = ?1 WHERE id = ?2",
            rusqlite::params![now, prev.to_string()],
        )
        .map_err(|e| Error::database(e.to_string()))?;
    }

    let id = TransmissionId::new();
    tx.execute(
        "INSERT INTO transmissions (id, tenant_id, playlist_id, source, status, started_at)
         VALUES (?1, ?2, ?3, ?4, 'active', ?5)",
        rusqlite::params![
            id.to_string(),
            tenant_id.to_string(),
            playlist_id.map(|p| p.to_string()),
            source,
            now,
        ],
    )
    .map_err(|e| Error::database(e.to_string()))?;

    tx.commit().map_err(|e| Error::database(e.to_string()))?;

    Ok(StartedTransmission {
        transmission: Transmission {
            id,
            tenant_id,
            playlist_id,
            source: source.map(str::to_string),
            status: TransmissionStatus::Active,
            started_at: now,
            ended_at: None,
        },
        ended,
    })
}

/// End the tenant's active transmission. Returns the ended row's ID.
pub fn end_active(conn: &Connection, tenant_id: TenantId) -> Result<Option<TransmissionId>> {
    let Some(active) = get_active(conn, tenant_id)? else {
        return Ok(None);
    };
    conn.execute(
        "UPDATE transmissions SET status = 'ended', ended_at = ?1 WHERE id = ?2",
        rusqlite::params![Utc::now().to_rfc3339(), active.id.to_string()],
    )
    .map_err(|e| Error::database(e.to_string()))?;
    Ok(Some(active.id))
}

/// The tenant's active transmission, if any.
pub fn get_active(conn: &Connection, tenant_id: TenantId) -> Result<Option<Transmission>> {
    active_in(conn, tenant_id)
}

fn active_in(conn: &Connection, tenant_id: TenantId) -> Result<Option<Transmission>> {
    let sql = format!(
        "SELECT {} FROM transmissions WHERE tenant_id = ?1 AND status = 'active'",
        Transmission::COLUMNS
    );
    match conn.query_row(&sql, [tenant_id.to_string()], Transmission::from_row) {
        Ok(t) => Ok(Some(t)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(Error::database(e.to_string())),
    }
}

/// Transmission history for a tenant, newest first.
pub fn list_transmissions(conn: &Connection, tenant_id: TenantId) -> Result<Vec<Transmission>> {
    let sql = format!(
        "SELECT {} FROM transmissions WHERE tenant_id = ?1 ORDER BY started_at DESC",
        Transmission::COLUMNS
    );
    let mut stmt = conn
        .prepare(&sql)
        .map_err(|e| Error::database(e.to_string()))?;
    let rows = stmt
        .query_map([tenant_id.to_string()], Transmission::from_row)
        .map_err(|e| Error::database(e.to_string()))?
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(|e| Error::database(e.to_string()))?;
    Ok(rows)
}
