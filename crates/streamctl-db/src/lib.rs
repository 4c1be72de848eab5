//! streamctl-db: relational store for servers, tenants and their media.
//!
//! SQLite-backed storage with r2d2 connection pooling, embedded migrations,
//! typed models, and one query module per entity.
//!
//! # Example
//!
//! ```
//! use streamctl_db::pool::{init_memory_pool, get_conn};
//! use streamctl_db::queries::servers;
//!
//! let pool = init_memory_pool().unwrap();
//! let conn = get_conn(&pool).unwrap();
//! let all = servers::list_servers(&conn).unwrap();
//! assert!(all.is_empty());
//! ```

pub mod migrations;
pub mod models;
pub mod pool;
pub mod queries;
