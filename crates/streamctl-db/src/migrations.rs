//! Embedded SQL migrations and runner.
//!
//! Migrations are stored as `&str` constants and executed in order. A
//! `schema_migrations` table tracks which versions have been applied.

use rusqlite::Connection;
use streamctl_common::{Error, Result};

/// V1: initial schema.
const V1_INITIAL: &str = r#"
-- Media-serving hosts
CREATE TABLE servers (
    id              TEXT PRIMARY KEY,
    name            TEXT NOT NULL,
    host            TEXT NOT NULL,
    ssh_port        INTEGER NOT NULL DEFAULT 22,
    ssh_user        TEXT NOT NULL,
    ssh_password    TEXT,
    ssh_key_path    TEXT,
    http_port       INTEGER NOT NULL DEFAULT 8086,
    max_tenants     INTEGER NOT NULL DEFAULT 0,
    current_tenants INTEGER NOT NULL DEFAULT 0,
    status          TEXT NOT NULL DEFAULT 'active',
    created_at      TEXT NOT NULL
);

-- Streaming accounts
CREATE TABLE tenants (
    id                  TEXT PRIMARY KEY,
    login               TEXT UNIQUE NOT NULL,
    server_id           TEXT NOT NULL REFERENCES servers(id),
    max_bitrate_kbps    INTEGER NOT NULL DEFAULT 0,
    max_viewers         INTEGER NOT NULL DEFAULT 0,
    storage_limit_bytes INTEGER NOT NULL DEFAULT 0,
    low_latency_ingest  INTEGER NOT NULL DEFAULT 0,
    created_at          TEXT NOT NULL
);

CREATE TABLE folders (
    id             TEXT PRIMARY KEY,
    tenant_id      TEXT NOT NULL REFERENCES tenants(id) ON DELETE CASCADE,
    server_id      TEXT NOT NULL REFERENCES servers(id),
    name           TEXT NOT NULL,
    sanitized_name TEXT NOT NULL,
    usage_bytes    INTEGER NOT NULL DEFAULT 0,
    created_at     TEXT NOT NULL
);

CREATE TABLE videos (
    id           TEXT PRIMARY KEY,
    folder_id    TEXT NOT NULL REFERENCES folders(id),
    tenant_id    TEXT NOT NULL REFERENCES tenants(id) ON DELETE CASCADE,
    file_name    TEXT NOT NULL,
    remote_path  TEXT NOT NULL,
    codec        TEXT,
    bitrate_kbps INTEGER,
    width        INTEGER,
    height       INTEGER,
    container    TEXT,
    duration_secs INTEGER,
    size_bytes   INTEGER NOT NULL DEFAULT 0,
    created_at   TEXT NOT NULL
);

CREATE TABLE playlists (
    id         TEXT PRIMARY KEY,
    tenant_id  TEXT NOT NULL REFERENCES tenants(id) ON DELETE CASCADE,
    name       TEXT NOT NULL,
    created_at TEXT NOT NULL
);

-- Ordered membership; duplicates allowed, position is the order key
CREATE TABLE playlist_videos (
    playlist_id TEXT NOT NULL REFERENCES playlists(id) ON DELETE CASCADE,
    position    INTEGER NOT NULL,
    video_id    TEXT NOT NULL REFERENCES videos(id) ON DELETE CASCADE,
    PRIMARY KEY (playlist_id, position)
);

CREATE TABLE schedules (
    id          TEXT PRIMARY KEY,
    tenant_id   TEXT NOT NULL REFERENCES tenants(id) ON DELETE CASCADE,
    playlist_id TEXT NOT NULL REFERENCES playlists(id) ON DELETE CASCADE,
    date        TEXT NOT NULL,
    hour        INTEGER NOT NULL,
    minute      INTEGER NOT NULL,
    repeat      INTEGER NOT NULL DEFAULT 0,
    shuffle     INTEGER NOT NULL DEFAULT 0,
    created_at  TEXT NOT NULL
);

CREATE TABLE transmissions (
    id          TEXT PRIMARY KEY,
    tenant_id   TEXT NOT NULL REFERENCES tenants(id) ON DELETE CASCADE,
    playlist_id TEXT REFERENCES playlists(id) ON DELETE SET NULL,
    source      TEXT,
    status      TEXT NOT NULL,
    started_at  TEXT NOT NULL,
    ended_at    TEXT
);

-- Indexes
CREATE UNIQUE INDEX idx_folders_tenant_name ON folders(tenant_id, sanitized_name COLLATE NOCASE);
CREATE INDEX idx_videos_folder            ON videos(folder_id);
CREATE INDEX idx_videos_tenant            ON videos(tenant_id);
CREATE INDEX idx_schedules_tenant_date    ON schedules(tenant_id, date);
CREATE UNIQUE INDEX idx_transmissions_one_active
    ON transmissions(tenant_id) WHERE status = 'active';
"#;

/// Ordered list of (version, sql) pairs.
const MIGRATIONS: &[(i64, &str)] = &[(1, V1_INITIAL)];

/// Run all pending migrations on `conn`.
///
/// Creates the `schema_migrations` tracking table if it does not exist,
/// then applies each outstanding migration inside a transaction.
pub fn run_migrations(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS schema_migrations (
            version    INTEGER PRIMARY KEY NOT NULL,
            applied_at TEXT NOT NULL DEFAULT (datetime('now'))
        )",
    )
    .map_err(|e| Error::database(e.to_string()))?;

    for &(version, sql) in MIGRATIONS {
        let already: bool = conn
            .query_row(
                "SELECT COUNT(*) > 0 FROM schema_migrations WHERE version = ?1",
                [version],
                |row| row.get(0),
            )
            .map_err(|e| Error::database(e.to_string()))?;

        if already {
            continue;
        }

        let tx = conn
            .unchecked_transaction()
            .map_err(|e| Error::database(e.to_string()))?;

        tx.execute_batch(sql)
            .map_err(|e| Error::database(format!("Migration V{version} failed: {e}")))?;

        tx.execute(
            "INSERT INTO schema_migrations (version) VALUES (?1)",
            [version],
        )
        .map_err(|e| Error::database(e.to_string()))?;

        tx.commit().map_err(|e| Error::database(e.to_string()))?;
    }

    Ok(())
}
