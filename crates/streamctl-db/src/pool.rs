//! Database connection pool management.
//!
//! Connection pooling for SQLite using r2d2. Every connection enables foreign
//! keys and a busy timeout; pending migrations run once at pool creation.

use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use streamctl_common::{Error, Result};
use uuid::Uuid;

use crate::migrations;

/// Type alias for the database connection pool.
pub type DbPool = Pool<SqliteConnectionManager>;

/// Type alias for a pooled database connection.
pub type PooledConnection = r2d2::PooledConnection<SqliteConnectionManager>;

const CONNECTION_INIT: &str = "PRAGMA foreign_keys = ON; PRAGMA busy_timeout = 5000;";

/// Initialize a new database pool with the given file path.
///
/// Creates the SQLite file if needed and runs pending migrations.
pub fn init_pool(db_path: &str) -> Result<DbPool> {
    let manager =
        SqliteConnectionManager::file(db_path).with_init(|conn| conn.execute_batch(CONNECTION_INIT));
    build(manager, 8)
}

/// Initialize an in-memory database pool for testing.
///
/// Every pooled connection shares the same named in-memory database, which
/// lives as long as the pool keeps at least one connection open.
pub fn init_memory_pool() -> Result<DbPool> {
    let uri = format!("file:streamctl-{}?mode=memory&cache=shared", Uuid::new_v4());
    let manager =
        SqliteConnectionManager::file(uri).with_init(|conn| conn.execute_batch(CONNECTION_INIT));
    build(manager, 4)
}

fn build(manager: SqliteConnectionManager, max_size: u32) -> Result<DbPool> {
    let pool = Pool::builder()
        .max_size(max_size)
        .min_idle(Some(1))
        .build(manager)
        .map_err(|e| Error::database(format!("Failed to create connection pool: {e}")))?;

    let conn = pool
        .get()
        .map_err(|e| Error::database(format!("Failed to get connection for migrations: {e}")))?;
    migrations::run_migrations(&conn)?;

    Ok(pool)
}

/// Get a connection from the pool.
pub fn get_conn(pool: &DbPool) -> Result<PooledConnection> {
    pool.get()
        .map_err(|e| Error::database(format!("Failed to get connection from pool: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn foreign_keys_enabled() {
        let pool = init_memory_pool().unwrap();
        let conn = get_conn(&pool).unwrap();
        let enabled: i32 = conn
            .query_row("PRAGMA foreign_keys", [], |row| row.get(0))
            .unwrap();
        assert_eq!(enabled, 1);
    }

    #[test]
    fn connections_share_one_database() {
        let pool = init_memory_pool().unwrap();
        let a = get_conn(&pool).unwrap();
        let b = get_conn(&pool).unwrap();

        a.execute(
            "INSERT INTO servers (id, name, host, ssh_port, ssh_user, http_port, max_tenants,
                                  current_tenants, status, created_at)
             VALUES ('s1', 'edge', '10.0.0.1', 22, 'root', 8086, 10, 0, 'active', 'now')",
            [],
        )
        .unwrap();

        let count: i64 = b
            .query_row("SELECT COUNT(*) FROM servers", [], |row| row.get(0))
            .unwrap();
        assert_eq!(count, 1);
    }

    #[test]
    fn file_pool_runs_migrations() {
        let dir = tempfile_dir();
        let path = dir.join("store.db");
        let pool = init_pool(path.to_str().unwrap()).unwrap();
        let conn = get_conn(&pool).unwrap();
        let count: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM sqlite_master WHERE type='table' AND name='tenants'",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(count, 1);
        let _ = std::fs::remove_dir_all(dir);
    }

    fn tempfile_dir() -> std::path::PathBuf {
        let dir = std::env::temp_dir().join(format!("streamctl-db-{}", Uuid::new_v4()));
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }
}
