//! Playlist/schedule document generation.
//!
//! [`document`] holds the XML model and rendering; [`generator`] builds a
//! document from store state and writes it to the tenant's root.

pub mod document;
pub mod generator;

pub use document::{SmilDocument, SmilPlaylist, SmilVideo};
pub use generator::{CurrentDocument, GeneratedConfig, SmilGenerator, SmilMode};
