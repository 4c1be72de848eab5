//! Database query modules.
//!
//! - servers: media-serving hosts and their load counters
//! - tenants: streaming accounts
//! - folders: tenant folders and cached usage
//! - videos: video metadata and stored remote paths
//! - playlists: playlists and ordered membership
//! - schedules: dated playlist schedule entries
//! - transmissions: the single active transmission per tenant

pub mod folders;
pub mod playlists;
pub mod schedules;
pub mod servers;
pub mod tenants;
pub mod transmissions;
pub mod videos;

#[cfg(test)]
pub(crate) mod fixtures;
