//! streamctl-common: shared types, IDs, and the error taxonomy.
//!
//! This crate is the foundational dependency for every other streamctl crate:
//!
//! - **Typed IDs**: UUID newtypes for servers, tenants, folders, videos, etc.
//! - **Domain enums**: server status, application instance state, generated
//!   config state, transmission status
//! - **Error handling**: the [`Error`] taxonomy that separates transient
//!   transport failures from fatal ones

pub mod error;
pub mod ids;
pub mod types;

pub use error::{Error, Result};
pub use ids::*;
pub use types::*;
