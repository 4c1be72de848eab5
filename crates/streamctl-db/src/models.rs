//! Rust structs mapping to database tables.
//!
//! Each model implements `from_row` for constructing itself from a
//! `rusqlite::Row`. Column order in every `SELECT` matches the field order
//! documented on the model's column constant.

use chrono::NaiveDate;
use serde::Serialize;
use streamctl_common::{
    FolderId, PlaylistId, ScheduleId, ServerId, ServerStatus, TenantId, TransmissionId,
    TransmissionStatus, VideoId,
};
use uuid::Uuid;

// ---------------------------------------------------------------------------
// helpers
// ---------------------------------------------------------------------------

fn conversion_error(
    idx: usize,
    e: impl std::error::Error + Send + Sync + 'static,
) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
}

/// Parse a UUID-based ID from a text column.
fn parse_id<T: From<Uuid>>(row: &rusqlite::Row, idx: usize) -> rusqlite::Result<T> {
    let s: String = row.get(idx)?;
    let uuid = Uuid::parse_str(&s).map_err(|e| conversion_error(idx, e))?;
    Ok(T::from(uuid))
}

fn parse_opt_id<T: From<Uuid>>(row: &rusqlite::Row, idx: usize) -> rusqlite::Result<Option<T>> {
    let s: Option<String> = row.get(idx)?;
    match s {
        Some(v) => {
            let uuid = Uuid::parse_str(&v).map_err(|e| conversion_error(idx, e))?;
            Ok(Some(T::from(uuid)))
        }
        None => Ok(None),
    }
}

#[derive(Debug)]
struct EnumParseError(String);

impl std::fmt::Display for EnumParseError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::error::Error for EnumParseError {}

fn parse_enum<T: std::str::FromStr<Err = String>>(
    row: &rusqlite::Row,
    idx: usize,
) -> rusqlite::Result<T> {
    let s: String = row.get(idx)?;
    s.parse::<T>()
        .map_err(|e| conversion_error(idx, EnumParseError(e)))
}

fn parse_date(row: &rusqlite::Row, idx: usize) -> rusqlite::Result<NaiveDate> {
    let s: String = row.get(idx)?;
    NaiveDate::parse_from_str(&s, "%Y-%m-%d").map_err(|e| conversion_error(idx, e))
}

// ---------------------------------------------------------------------------
// Server
// ---------------------------------------------------------------------------

/// A remote media-serving host.
#[derive(Debug, Clone, Serialize)]
pub struct Server {
    pub id: ServerId,
    pub name: String,
    pub host: String,
    pub ssh_port: u16,
    pub ssh_user: String,
    #[serde(skip_serializing)]
    pub ssh_password: Option<String>,
    pub ssh_key_path: Option<String>,
    pub http_port: u16,
    pub max_tenants: i64,
    pub current_tenants: i64,
    pub status: ServerStatus,
    pub created_at: String,
}

impl Server {
    pub const COLUMNS: &'static str = "id, name, host, ssh_port, ssh_user, ssh_password, \
        ssh_key_path, http_port, max_tenants, current_tenants, status, created_at";

    pub fn from_row(row: &rusqlite::Row) -> rusqlite::Result<Self> {
        Ok(Self {
            id: parse_id(row, 0)?,
            name: row.get(1)?,
            host: row.get(2)?,
            ssh_port: row.get(3)?,
            ssh_user: row.get(4)?,
            ssh_password: row.get(5)?,
            ssh_key_path: row.get(6)?,
            http_port: row.get(7)?,
            max_tenants: row.get(8)?,
            current_tenants: row.get(9)?,
            status: parse_enum(row, 10)?,
            created_at: row.get(11)?,
        })
    }

    /// Whether the host refuses lifecycle operations.
    pub fn in_maintenance(&self) -> bool {
        self.status == ServerStatus::Maintenance
    }
}

// ---------------------------------------------------------------------------
// Tenant
// ---------------------------------------------------------------------------

/// A streaming account.
#[derive(Debug, Clone, Serialize)]
pub struct Tenant {
    pub id: TenantId,
    pub login: String,
    pub server_id: ServerId,
    pub max_bitrate_kbps: i64,
    pub max_viewers: i64,
    pub storage_limit_bytes: i64,
    /// Secondary low-latency ingest protocol enabled for this account.
    pub low_latency_ingest: bool,
    pub created_at: String,
}

impl Tenant {
    pub const COLUMNS: &'static str = "id, login, server_id, max_bitrate_kbps, max_viewers, \
        storage_limit_bytes, low_latency_ingest, created_at";

    pub fn from_row(row: &rusqlite::Row) -> rusqlite::Result<Self> {
        Ok(Self {
            id: parse_id(row, 0)?,
            login: row.get(1)?,
            server_id: parse_id(row, 2)?,
            max_bitrate_kbps: row.get(3)?,
            max_viewers: row.get(4)?,
            storage_limit_bytes: row.get(5)?,
            low_latency_ingest: row.get(6)?,
            created_at: row.get(7)?,
        })
    }
}

// ---------------------------------------------------------------------------
// Folder
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize)]
pub struct Folder {
    pub id: FolderId,
    pub tenant_id: TenantId,
    pub server_id: ServerId,
    pub name: String,
    pub sanitized_name: String,
    /// Cached usage; the remote listing is authoritative.
    pub usage_bytes: i64,
    pub created_at: String,
}

impl Folder {
    pub const COLUMNS: &'static str =
        "id, tenant_id, server_id, name, sanitized_name, usage_bytes, created_at";

    pub fn from_row(row: &rusqlite::Row) -> rusqlite::Result<Self> {
        Ok(Self {
            id: parse_id(row, 0)?,
            tenant_id: parse_id(row, 1)?,
            server_id: parse_id(row, 2)?,
            name: row.get(3)?,
            sanitized_name: row.get(4)?,
            usage_bytes: row.get(5)?,
            created_at: row.get(6)?,
        })
    }
}

// ---------------------------------------------------------------------------
// Video
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize)]
pub struct Video {
    pub id: VideoId,
    pub folder_id: FolderId,
    pub tenant_id: TenantId,
    pub file_name: String,
    pub remote_path: String,
    pub codec: Option<String>,
    pub bitrate_kbps: Option<i64>,
    pub width: Option<i64>,
    pub height: Option<i64>,
    pub container: Option<String>,
    pub duration_secs: Option<i64>,
    pub size_bytes: i64,
    pub created_at: String,
}

impl Video {
    pub const COLUMNS: &'static str = "id, folder_id, tenant_id, file_name, remote_path, codec, \
        bitrate_kbps, width, height, container, duration_secs, size_bytes, created_at";

    pub fn from_row(row: &rusqlite::Row) -> rusqlite::Result<Self> {
        Ok(Self {
            id: parse_id(row, 0)?,
            folder_id: parse_id(row, 1)?,
            tenant_id: parse_id(row, 2)?,
            file_name: row.get(3)?,
            remote_path: row.get(4)?,
            codec: row.get(5)?,
            bitrate_kbps: row.get(6)?,
            width: row.get(7)?,
            height: row.get(8)?,
            container: row.get(9)?,
            duration_secs: row.get(10)?,
            size_bytes: row.get(11)?,
            created_at: row.get(12)?,
        })
    }
}

/// Metadata supplied when registering an uploaded video.
#[derive(Debug, Clone, Default)]
pub struct NewVideo {
    pub file_name: String,
    pub remote_path: String,
    pub codec: Option<String>,
    pub bitrate_kbps: Option<i64>,
    pub width: Option<i64>,
    pub height: Option<i64>,
    pub container: Option<String>,
    pub duration_secs: Option<i64>,
    pub size_bytes: i64,
}

// ---------------------------------------------------------------------------
// Playlist
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize)]
pub struct Playlist {
    pub id: PlaylistId,
    pub tenant_id: TenantId,
    pub name: String,
    pub created_at: String,
}

impl Playlist {
    pub const COLUMNS: &'static str = "id, tenant_id, name, created_at";

    pub fn from_row(row: &rusqlite::Row) -> rusqlite::Result<Self> {
        Ok(Self {
            id: parse_id(row, 0)?,
            tenant_id: parse_id(row, 1)?,
            name: row.get(2)?,
            created_at: row.get(3)?,
        })
    }
}

/// One ordered playlist slot, joined with its video and folder.
#[derive(Debug, Clone, Serialize)]
pub struct PlaylistItem {
    pub position: i64,
    pub video_id: VideoId,
    pub file_name: String,
    pub remote_path: String,
    pub folder_name: String,
    pub duration_secs: Option<i64>,
}

impl PlaylistItem {
    pub fn from_row(row: &rusqlite::Row) -> rusqlite::Result<Self> {
        Ok(Self {
            position: row.get(0)?,
            video_id: parse_id(row, 1)?,
            file_name: row.get(2)?,
            remote_path: row.get(3)?,
            folder_name: row.get(4)?,
            duration_secs: row.get(5)?,
        })
    }
}

// ---------------------------------------------------------------------------
// ScheduleEntry
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize)]
pub struct ScheduleEntry {
    pub id: ScheduleId,
    pub tenant_id: TenantId,
    pub playlist_id: PlaylistId,
    /// Name of the referenced playlist (joined).
    pub playlist_name: String,
    pub date: NaiveDate,
    pub hour: u8,
    pub minute: u8,
    pub repeat: bool,
    pub shuffle: bool,
    pub created_at: String,
}

impl ScheduleEntry {
    pub fn from_row(row: &rusqlite::Row) -> rusqlite::Result<Self> {
        Ok(Self {
            id: parse_id(row, 0)?,
            tenant_id: parse_id(row, 1)?,
            playlist_id: parse_id(row, 2)?,
            playlist_name: row.get(3)?,
            date: parse_date(row, 4)?,
            hour: row.get(5)?,
            minute: row.get(6)?,
            repeat: row.get(7)?,
            shuffle: row.get(8)?,
            created_at: row.get(9)?,
        })
    }
}

// ---------------------------------------------------------------------------
// Transmission
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize)]
pub struct Transmission {
    pub id: TransmissionId,
    pub tenant_id: TenantId,
    pub playlist_id: Option<PlaylistId>,
    /// Ad-hoc source (e.g. a relay URL) when no playlist is bound.
    pub source: Option<String>,
    pub status: TransmissionStatus,
    pub started_at: String,
    pub ended_at: Option<String>,
}

impl Transmission {
    pub const COLUMNS: &'static str =
        "id, tenant_id, playlist_id, source, status, started_at, ended_at";

    pub fn from_row(row: &rusqlite::Row) -> rusqlite::Result<Self> {
        Ok(Self {
            id: parse_id(row, 0)?,
            tenant_id: parse_id(row, 1)?,
            playlist_id: parse_opt_id(row, 2)?,
            source: row.get(3)?,
            status: parse_enum(row, 4)?,
            started_at: row.get(5)?,
            ended_at: row.get(6)?,
        })
    }
}
