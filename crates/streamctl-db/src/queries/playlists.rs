//! Playlist and ordered membership operations.

use chrono::Utc;
use rusqlite::Connection;
use streamctl_common::{Error, PlaylistId, Result, TenantId, VideoId};

use crate::models::{Playlist, PlaylistItem};

/// Create an empty playlist.
pub fn create_playlist(conn: &Connection, tenant_id: TenantId, name: &str) -> Result<Playlist> {
    if name.trim().is_empty() {
        return Err(Error::Validation("playlist name must not be empty".into()));
    }
    let id = PlaylistId::new();
    let created_at = Utc::now().to_rfc3339();

    conn.execute(
        "INSERT INTO playlists (id, tenant_id, name, created_at) VALUES (?1, ?2, ?3, ?4)",
        rusqlite::params![id.to_string(), tenant_id.to_string(), name, created_at],
    )
    .map_err(|e| Error::database(e.to_string()))?;

    Ok(Playlist {
        id,
        tenant_id,
        name: name.to_string(),
        created_at,
    })
}

/// Get a playlist by ID.
pub fn get_playlist(conn: &Connection, id: PlaylistId) -> Result<Option<Playlist>> {
    let sql = format!("SELECT {} FROM playlists WHERE id = ?1", Playlist::COLUMNS);
    match conn.query_row(&sql, [id.to_string()], Playlist::from_row) {
        Ok(p) => Ok(Some(p)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(Error::database(e.to_string())),
    }
}

/// List a tenant's playlists ordered by name.
pub fn list_playlists(conn: &Connection, tenant_id: TenantId) -> Result<Vec<Playlist>> {
    let sql = format!(
        "SELECT {} FROM playlists WHERE tenant_id = ?1 ORDER BY name, created_at",
        Playlist::COLUMNS
    );
    let mut stmt = conn
        .prepare(&sql)
        .map_err(|e| Error::database(e.to_string()))?;
    let rows = stmt
        .query_map([tenant_id.to_string()], Playlist::from_row)
        .map_err(|e| Error::database(e.to_string()))?
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(|e| Error::database(e.to_string()))?;
    Ok(rows)
}

/// Replace a playlist's ordered membership.
///
/// The same video may appear more than once. Every video must belong to
/// the playlist's tenant.
pub fn set_items(conn: &Connection, playlist_id: PlaylistId, videos: &[VideoId]) -> Result<()> {
    let playlist = get_playlist(conn, playlist_id)?
        .ok_or_else(|| Error::not_found("playlist", playlist_id))?;

    let tx = conn
        .unchecked_transaction()
        .map_err(|e| Error::database(e.to_string()))?;

    tx.execute(
        "DELETE FROM playlist_videos WHERE playlist_id = ?1",
        [playlist_id.to_string()],
    )
    .map_err(|e| Error::database(e.to_string()))?;

    for (position, video_id) in videos.iter().enumerate() {
        let owner: Option<String> = match tx.query_row(
            "SELECT tenant_id FROM videos WHERE id = ?1",
            [video_id.to_string()],
            |row| row.get(0),
        ) {
            Ok(t) => Some(t),
            Err(rusqlite::Error::QueryReturnedNoRows) => None,
            Err(e) => return Err(Error::database(e.to_string())),
        };
        match owner {
            Some(t) if t == playlist.tenant_id.to_string() => {}
            Some(_) => {
                return Err(Error::Forbidden(format!(
                    "video {video_id} belongs to another tenant"
                )))
            }
            None => return Err(Error::not_found("video", video_id)),
        }

        tx.execute(
            "INSERT INTO playlist_videos (playlist_id, position, video_id) VALUES (?1, ?2, ?3)",
            rusqlite::params![playlist_id.to_string(), position as i64, video_id.to_string()],
        )
        .map_err(|e| Error::database(e.to_string()))?;
    }

    tx.commit().map_err(|e| Error::database(e.to_string()))?;
    Ok(())
}

/// Ordered items of a playlist, joined with video and folder data.
pub fn list_items(conn: &Connection, playlist_id: PlaylistId) -> Result<Vec<PlaylistItem>> {
    let mut stmt = conn
        .prepare(
            "SELECT pv.position, v.id, v.file_name, v.remote_path, f.sanitized_name, v.duration_secs
             FROM playlist_videos pv
             JOIN videos v ON v.id = pv.video_id
             JOIN folders f ON f.id = v.folder_id
             WHERE pv.playlist_id = ?1
             ORDER BY pv.position",
        )
        .map_err(|e| Error::database(e.to_string()))?;
    let rows = stmt
        .query_map([playlist_id.to_string()], PlaylistItem::from_row)
        .map_err(|e| Error::database(e.to_string()))?
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(|e| Error::database(e.to_string()))?;
    Ok(rows)
}

/// Delete a playlist. Membership and schedules cascade.
pub fn delete_playlist(conn: &Connection, id: PlaylistId) -> Result<bool> {
    let n = conn
        .execute("DELETE FROM playlists WHERE id = ?1", [id.to_string()])
        .map_err(|e| Error::database(e.to_string()))?;
    Ok(n > 0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::NewVideo;
    use crate::pool::{get_conn, init_memory_pool};
    use crate::queries::{fixtures, videos};

    #[test]
    fn items_keep_order_and_duplicates() {
        let pool = init_memory_pool().unwrap();
        let conn = get_conn(&pool).unwrap();
        let (_, tenant) = fixtures::server_and_tenant(&conn, "radio1");
        let folder = fixtures::folder(&conn, &tenant, "shows");

        let mk = |name: &str| {
            videos::create_video(
                &conn,
                tenant.id,
                folder.id,
                &NewVideo {
                    file_name: name.into(),
                    remote_path: format!("/home/streaming/radio1/shows/{name}"),
                    duration_secs: Some(30),
                    ..Default::default()
                },
            )
            .unwrap()
        };
        let a = mk("a.mp4");
        let b = mk("b.mp4");

        let playlist = create_playlist(&conn, tenant.id, "morning").unwrap();
        set_items(&conn, playlist.id, &[b.id, a.id, b.id]).unwrap();

        let items = list_items(&conn, playlist.id).unwrap();
        let names: Vec<_> = items.iter().map(|i| i.file_name.as_str()).collect();
        assert_eq!(names, ["b.mp4", "a.mp4", "b.mp4"]);
        assert_eq!(items[0].folder_name, "shows");

        set_items(&conn, playlist.id, &[a.id]).unwrap();
        assert_eq!(list_items(&conn, playlist.id).unwrap().len(), 1);
    }

    #[test]
    fn foreign_video_rejected() {
        let pool = init_memory_pool().unwrap();
        let conn = get_conn(&pool).unwrap();
        let (_, owner) = fixtures::server_and_tenant(&conn, "radio1");
        let (_, other) = fixtures::server_and_tenant(&conn, "radio2");
        let folder = fixtures::folder(&conn, &other, "x");
        let video = videos::create_video(
            &conn,
            other.id,
            folder.id,
            &NewVideo {
                file_name: "x.mp4".into(),
                remote_path: "/x.mp4".into(),
                ..Default::default()
            },
        )
        .unwrap();

        let playlist = create_playlist(&conn, owner.id, "p").unwrap();
        let err = set_items(&conn, playlist.id, &[video.id]).unwrap_err();
        assert!(matches!(err, Error::Forbidden(_)));
        assert!(list_items(&conn, playlist.id).unwrap().is_empty());
    }

    #[test]
    fn empty_name_rejected() {
        let pool = init_memory_pool().unwrap();
        let conn = get_conn(&pool).unwrap();
        let (_, tenant) = fixtures::server_and_tenant(&conn, "radio1");
        assert!(matches!(
            create_playlist(&conn, tenant.id, "  "),
            Err(Error::Validation(_))
        ));
    }
}
