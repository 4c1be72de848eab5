//! Schedule entry operations.

use chrono::{NaiveDate, Utc};
use rusqlite::Connection;
use streamctl_common::{Error, PlaylistId, Result, ScheduleId, TenantId};

use crate::models::ScheduleEntry;

const SELECT_ENTRY: &str = "SELECT s.id, s.tenant_id, s.playlist_id, p.name, s.date, s.hour, \
     s.minute, s.repeat, s.shuffle, s.created_at
     FROM schedules s JOIN playlists p ON p.id = s.playlist_id";

/// Fields for a new schedule entry.
#[derive(Debug, Clone)]
pub struct NewSchedule {
    pub playlist_id: PlaylistId,
    pub date: NaiveDate,
    pub hour: u8,
    pub minute: u8,
    pub repeat: bool,
    pub shuffle: bool,
}

/// Create a schedule entry. The playlist must belong to the tenant.
pub fn create_schedule(
    conn: &Connection,
    tenant_id: TenantId,
    new: &NewSchedule,
) -> Result<ScheduleEntry> {
    if new.hour > 23 || new.minute > 59 {
        return Err(Error::Validation(format!(
            "invalid start time {:02}:{:02}",
            new.hour, new.minute
        )));
    }

    let owner: String = conn
        .query_row(
            "SELECT tenant_id FROM playlists WHERE id = ?1",
            [new.playlist_id.to_string()],
            |row| row.get(0),
        )
        .map_err(|e| match e {
            rusqlite::Error::QueryReturnedNoRows => Error::not_found("playlist", new.playlist_id),
            other => Error::database(other.to_string()),
        })?;
    if owner != tenant_id.to_string() {
        return Err(Error::Forbidden("playlist belongs to another tenant".into()));
    }

    let id = ScheduleId::new();
    conn.execute(
        "INSERT INTO schedules (id, tenant_id, playlist_id, date, hour, minute, repeat, shuffle, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
        rusqlite::params![
            id.to_string(),
            tenant_id.to_string(),
            new.playlist_id.to_string(),
            new.date.format("%Y-%m-%d").to_string(),
            new.hour,
            new.minute,
            new.repeat,
            new.shuffle,
            Utc::now().to_rfc3339(),
        ],
    )
    .map_err(|e| Error::database(e.to_string()))?;

    get_schedule(conn, id)?.ok_or_else(|| Error::not_found("schedule", id))
}

/// Get a schedule entry by ID.
pub fn get_schedule(conn: &Connection, id: ScheduleId) -> Result<Option<ScheduleEntry>> {
    let sql = format!("{SELECT_ENTRY} WHERE s.id = ?1");
    match conn.query_row(&sql, [id.to_string()], ScheduleEntry::from_row) {
        Ok(s) => Ok(Some(s)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(Error::database(e.to_string())),
    }
}

/// Entries dated on or after `today`, ordered by start time.
pub fn list_upcoming(
    conn: &Connection,
    tenant_id: TenantId,
    today: NaiveDate,
) -> Result<Vec<ScheduleEntry>> {
    let sql = format!(
        "{SELECT_ENTRY} WHERE s.tenant_id = ?1 AND s.date >= ?2
         ORDER BY s.date, s.hour, s.minute, s.created_at"
    );
    let mut stmt = conn
        .prepare(&sql)
        .map_err(|e| Error::database(e.to_string()))?;
    let rows = stmt
        .query_map(
            rusqlite::params![tenant_id.to_string(), today.format("%Y-%m-%d").to_string()],
            ScheduleEntry::from_row,
        )
        .map_err(|e| Error::database(e.to_string()))?
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(|e| Error::database(e.to_string()))?;
    Ok(rows)
}

/// Delete a schedule entry.
pub fn delete_schedule(conn: &Connection, id: ScheduleId) -> Result<bool> {
    let n = conn
        .execute("DELETE FROM schedules WHERE id = ?1", [id.to_string()])
        .map_err(|e| Error::database(e.to_string()))?;
    Ok(n > 0)
}
