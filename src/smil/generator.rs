//! Builds and publishes each tenant's playlist document.
//!
//! Regeneration for one tenant is serialized through a per-tenant async
//! mutex, so a hot-reload never races a half-finished write. Different
//! tenants regenerate independently.
//!
//! Every [`SmilGenerator::mark_stale`] bumps a per-tenant epoch. A
//! regeneration only reports the document as generated when the epoch it
//! read before building is still current after the write.

use std::sync::Arc;

use chrono::{Local, NaiveDate};
use dashmap::DashMap;
use rusqlite::Connection;
use serde::Serialize;
use streamctl_common::{ConfigState, Error, PlaylistId, Result, TenantId};
use streamctl_db::models::{Server, Tenant};
use streamctl_db::pool::{get_conn, DbPool};
use streamctl_db::queries::{playlists, schedules, transmissions};
use streamctl_remote::{HostSpec, Provisioner};
use tokio::sync::{Mutex, OwnedMutexGuard};

use super::document::{engine_source, video_length, SmilDocument, SmilPlaylist, SmilVideo};
use crate::config::LayoutConfig;

/// Which playlists the document materializes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "mode", content = "playlist_id", rename_all = "snake_case")]
pub enum SmilMode {
    /// Only the playlist bound to the active transmission, looping.
    SinglePlaylist(PlaylistId),
    /// One block per schedule entry dated today or later.
    FullSchedule,
}

/// Result of a successful regeneration.
#[derive(Debug, Clone, Serialize)]
pub struct GeneratedConfig {
    pub remote_path: String,
    pub mode: SmilMode,
    pub playlists: usize,
    pub bytes: usize,
}

/// A document known to match store state, held under the tenant's
/// regeneration lock until dropped.
pub struct CurrentDocument {
    _guard: OwnedMutexGuard<()>,
    /// Set when the document had to be rebuilt first.
    pub regenerated: Option<GeneratedConfig>,
}

#[derive(Debug, Clone, Copy)]
struct DocState {
    state: ConfigState,
    epoch: u64,
}

impl Default for DocState {
    fn default() -> Self {
        Self {
            state: ConfigState::NoConfig,
            epoch: 0,
        }
    }
}

pub struct SmilGenerator {
    db: DbPool,
    provisioner: Arc<Provisioner>,
    layout: LayoutConfig,
    states: DashMap<TenantId, DocState>,
    locks: DashMap<TenantId, Arc<Mutex<()>>>,
}

impl SmilGenerator {
    pub fn new(db: DbPool, provisioner: Arc<Provisioner>, layout: LayoutConfig) -> Self {
        Self {
            db,
            provisioner,
            layout,
            states: DashMap::new(),
            locks: DashMap::new(),
        }
    }

    /// Current freshness of a tenant's document.
    pub fn state(&self, tenant_id: TenantId) -> ConfigState {
        self.states
            .get(&tenant_id)
            .map(|s| s.state)
            .unwrap_or(ConfigState::NoConfig)
    }

    /// Record that playlist or schedule state changed for a tenant.
    pub fn mark_stale(&self, tenant_id: TenantId) {
        let mut doc = self.states.entry(tenant_id).or_default();
        doc.state = ConfigState::Stale;
        doc.epoch += 1;
    }

    fn epoch(&self, tenant_id: TenantId) -> u64 {
        self.states.get(&tenant_id).map(|s| s.epoch).unwrap_or(0)
    }

    /// Remote location of a tenant's document.
    pub fn remote_path(&self, login: &str) -> String {
        streamctl_remote::shell::join(
            &self.provisioner.layout().tenant_root(login),
            &[&self.layout.smil_file_name],
        )
    }

    fn lock_for(&self, tenant_id: TenantId) -> Arc<Mutex<()>> {
        self.locks
            .entry(tenant_id)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Mode implied by the tenant's active transmission.
    pub fn resolve_mode(conn: &Connection, tenant_id: TenantId) -> Result<SmilMode> {
        Ok(match transmissions::get_active(conn, tenant_id)? {
            Some(t) => match t.playlist_id {
                Some(playlist_id) => SmilMode::SinglePlaylist(playlist_id),
                None => SmilMode::FullSchedule,
            },
            None => SmilMode::FullSchedule,
        })
    }

    /// Build the document for `tenant` from store state.
    pub fn build(&self, tenant: &Tenant, mode: SmilMode, today: NaiveDate) -> Result<SmilDocument> {
        let conn = get_conn(&self.db)?;
        let tenant_root = self.provisioner.layout().tenant_root(&tenant.login);
        let mut doc = SmilDocument::empty(&tenant.login);

        let videos_for = |playlist_id: PlaylistId| -> Result<Vec<SmilVideo>> {
            Ok(playlists::list_items(&conn, playlist_id)?
                .iter()
                .map(|item| SmilVideo {
                    src: engine_source(
                        item,
                        &tenant.login,
                        &tenant_root,
                        &self.layout.strip_prefixes,
                    ),
                    length: video_length(item.duration_secs),
                })
                .collect())
        };

        match mode {
            SmilMode::SinglePlaylist(playlist_id) => {
                let playlist = playlists::get_playlist(&conn, playlist_id)?
                    .filter(|p| p.tenant_id == tenant.id)
                    .ok_or_else(|| Error::not_found("playlist", playlist_id))?;
                doc.playlists.push(SmilPlaylist {
                    name: playlist.name,
                    play_on_stream: tenant.login.clone(),
                    repeat: true,
                    scheduled: None,
                    videos: videos_for(playlist_id)?,
                });
            }
            SmilMode::FullSchedule => {
                for entry in schedules::list_upcoming(&conn, tenant.id, today)? {
                    let date = entry.date.format("%Y-%m-%d");
                    doc.playlists.push(SmilPlaylist {
                        name: format!(
                            "{}@{date}T{:02}{:02}",
                            entry.playlist_name, entry.hour, entry.minute
                        ),
                        play_on_stream: tenant.login.clone(),
                        repeat: entry.shuffle,
                        scheduled: Some(format!(
                            "{date} {:02}:{:02}:00",
                            entry.hour, entry.minute
                        )),
                        videos: videos_for(entry.playlist_id)?,
                    });
                }
            }
        }

        Ok(doc)
    }

    /// Rebuild the tenant's document and replace the remote copy.
    ///
    /// Any failure leaves the previous remote document in place and the
    /// tenant's state unchanged, and is reported as
    /// [`Error::ConfigGeneration`] (fatal transport errors pass through).
    pub async fn regenerate(&self, server: &Server, tenant: &Tenant) -> Result<GeneratedConfig> {
        let lock = self.lock_for(tenant.id);
        let _guard = lock.lock().await;
        self.regenerate_locked(server, tenant, self.epoch(tenant.id)).await
    }

    /// Take the tenant's lock and rebuild the document unless it is already
    /// generated. The returned guard keeps other regenerations out, so a
    /// hot-reload issued while holding it sees exactly this document.
    pub async fn ensure_current(&self, server: &Server, tenant: &Tenant) -> Result<CurrentDocument> {
        let guard = self.lock_for(tenant.id).lock_owned().await;
        let regenerated = match self.state(tenant.id) {
            ConfigState::Generated => None,
            ConfigState::Stale | ConfigState::NoConfig => {
                Some(self.regenerate_locked(server, tenant, self.epoch(tenant.id)).await?)
            }
        };
        Ok(CurrentDocument {
            _guard: guard,
            regenerated,
        })
    }

    /// Caller holds the tenant's lock. `epoch` is read before building; the
    /// state only becomes generated if no change arrived since.
    async fn regenerate_locked(
        &self,
        server: &Server,
        tenant: &Tenant,
        epoch: u64,
    ) -> Result<GeneratedConfig> {
        let (mode, xml, playlists) = {
            let mode = {
                let conn = get_conn(&self.db)?;
                Self::resolve_mode(&conn, tenant.id)?
            };
            let doc = self
                .build(tenant, mode, Local::now().date_naive())
                .map_err(|e| Error::ConfigGeneration(format!("building document: {e}")))?;
            (mode, doc.render(), doc.playlists.len())
        };

        let remote_path = self.remote_path(&tenant.login);
        let host = HostSpec::from(server);
        let manager = self.provisioner.manager();

        let written = match manager.upload_bytes(&host, xml.as_bytes(), &remote_path).await {
            Err(Error::RemoteStateMismatch(msg)) => {
                // The tenant root may be missing; repair it and try once more.
                tracing::warn!(login = %tenant.login, "Document upload failed ({msg}), repairing tenant root");
                self.provisioner
                    .ensure_tenant_root(server, &tenant.login)
                    .await?;
                manager.upload_bytes(&host, xml.as_bytes(), &remote_path).await
            }
            other => other,
        };

        if let Err(e) = written {
            return Err(if e.is_fatal() {
                e
            } else {
                Error::ConfigGeneration(format!("writing {remote_path}: {e}"))
            });
        }

        let current = {
            let mut doc = self.states.entry(tenant.id).or_default();
            let current = doc.epoch == epoch;
            if current {
                doc.state = ConfigState::Generated;
            }
            current
        };
        if !current {
            tracing::debug!(login = %tenant.login, "Store changed while regenerating, document stays stale");
        }
        tracing::info!(
            login = %tenant.login,
            playlists,
            bytes = xml.len(),
            "Playlist document published"
        );

        Ok(GeneratedConfig {
            remote_path,
            mode,
            playlists,
            bytes: xml.len(),
        })
    }
}
