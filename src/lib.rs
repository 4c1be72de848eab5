//! streamctl - orchestration for multi-tenant streaming hosts
//!
//! This library crate exposes the core functionality for the binary and for
//! integration testing.

pub mod config;
pub mod context;
pub mod lifecycle;
pub mod proxy;
pub mod server;
pub mod smil;
pub mod sync;
pub mod template;
