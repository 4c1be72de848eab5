//! Video metadata operations.

use chrono::Utc;
use rusqlite::Connection;
use streamctl_common::{Error, FolderId, Result, TenantId, VideoId};

use crate::models::{NewVideo, Video};

/// Register a video stored in `folder_id`.
pub fn create_video(
    conn: &Connection,
    tenant_id: TenantId,
    folder_id: FolderId,
    new: &NewVideo,
) -> Result<Video> {
    let id = VideoId::new();
    let created_at = Utc::now().to_rfc3339();

    conn.execute(
        "INSERT INTO videos (id, folder_id, tenant_id, file_name, remote_path, codec, bitrate_kbps,
                             width, height, container, duration_secs, size_bytes, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)",
        rusqlite::params![
            id.to_string(),
            folder_id.to_string(),
            tenant_id.to_string(),
            new.file_name,
            new.remote_path,
            new.codec,
            new.bitrate_kbps,
            new.width,
            new.height,
            new.container,
            new.duration_secs,
            new.size_bytes,
            created_at,
        ],
    )
    .map_err(|e| Error::database(e.to_string()))?;

    Ok(Video {
        id,
        folder_id,
        tenant_id,
        file_name: new.file_name.clone(),
        remote_path: new.remote_path.clone(),
        codec: new.codec.clone(),
        bitrate_kbps: new.bitrate_kbps,
        width: new.width,
        height: new.height,
        container: new.container.clone(),
        duration_secs: new.duration_secs,
        size_bytes: new.size_bytes,
        created_at,
    })
}

/// Get a video by ID.
pub fn get_video(conn: &Connection, id: VideoId) -> Result<Option<Video>> {
    let sql = format!("SELECT {} FROM videos WHERE id = ?1", Video::COLUMNS);
    match conn.query_row(&sql, [id.to_string()], Video::from_row) {
        Ok(v) => Ok(Some(v)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(Error::database(e.to_string())),
    }
}

/// List the videos stored in a folder.
pub fn list_by_folder(conn: &Connection, folder_id: FolderId) -> Result<Vec<Video>> {
    let sql = format!(
        "SELECT {} FROM videos WHERE folder_id = ?1 ORDER BY file_name",
        Video::COLUMNS
    );
    let mut stmt = conn
        .prepare(&sql)
        .map_err(|e| Error::database(e.to_string()))?;
    let rows = stmt
        .query_map([folder_id.to_string()], Video::from_row)
        .map_err(|e| Error::database(e.to_string()))?
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(|e| Error::database(e.to_string()))?;
    Ok(rows)
}

/// Rewrite the stored path of every video in a folder after a remote move.
///
/// Paths starting with `old_dir` get that prefix replaced by `new_dir`;
/// any other stored path is rebuilt as `new_dir/<file_name>`. All rows are
/// updated in one transaction. Returns the number of rewritten rows.
pub fn rewrite_folder_paths(
    conn: &Connection,
    folder_id: FolderId,
    old_dir: &str,
    new_dir: &str,
) -> Result<usize> {
    let videos = list_by_folder(conn, folder_id)?;
    let old_dir = old_dir.trim_end_matches('/');
    let new_dir = new_dir.trim_end_matches('/');

    let tx = conn
        .unchecked_transaction()
        .map_err(|e| Error::database(e.to_string()))?;

    for video in &videos {
        let rewritten = match video.remote_path.strip_prefix(old_dir) {
            Some(rest) if rest.starts_with('/') => format!("{new_dir}{rest}"),
            _ => format!("{new_dir}/{}", video.file_name),
        };
        tx.execute(
            "UPDATE videos SET remote_path = ?1 WHERE id = ?2",
            rusqlite::params![rewritten, video.id.to_string()],
        )
        .map_err(|e| Error::database(e.to_string()))?;
    }

    tx.commit().map_err(|e| Error::database(e.to_string()))?;
    Ok(videos.len())
}

/// Delete a video row.
pub fn delete_video(conn: &Connection, id: VideoId) -> Result<bool> {
    let n = conn
        .execute("DELETE FROM videos WHERE id = ?1", [id.to_string()])
        .map_err(|e| Error::database(e.to_string()))?;
    Ok(n > 0)
}
