//! Write-path orchestration.
//!
//! A tenant-facing change is persisted first. Provisioning, document
//! regeneration and hot-reload then run best-effort: their failures become
//! warnings on the [`SyncReport`] and never undo the stored change.

use std::sync::Arc;

use serde::Serialize;
use streamctl_common::{Error, FolderId, PlaylistId, Result, ScheduleId, TransmissionId, VideoId};
use streamctl_db::models::{Folder, ScheduleEntry, Server, Tenant, Transmission};
use streamctl_db::pool::{get_conn, DbPool};
use streamctl_db::queries::schedules::NewSchedule;
use streamctl_db::queries::{playlists, schedules, servers, tenants, transmissions};
use streamctl_remote::{Provisioner, UsageSummary};

use crate::lifecycle::LifecycleController;
use crate::smil::SmilGenerator;

/// Outcome of a change plus its best-effort follow-up work.
#[derive(Debug, Clone, Serialize)]
pub struct SyncReport {
    pub success: bool,
    pub message: String,
    pub warnings: Vec<String>,
}

impl SyncReport {
    pub fn ok(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
            warnings: Vec::new(),
        }
    }

    fn warn(&mut self, what: &str, err: &Error) {
        tracing::warn!("{what}: {err}");
        self.warnings.push(format!("{what}: {err}"));
    }
}

/// A started transmission and the follow-up report.
#[derive(Debug, Clone, Serialize)]
pub struct TransmissionReport {
    pub transmission: Transmission,
    pub ended: Option<TransmissionId>,
    #[serde(flatten)]
    pub report: SyncReport,
}

pub struct Orchestrator {
    db: DbPool,
    provisioner: Arc<Provisioner>,
    generator: Arc<SmilGenerator>,
    lifecycle: Arc<LifecycleController>,
}

impl Orchestrator {
    pub fn new(
        db: DbPool,
        provisioner: Arc<Provisioner>,
        generator: Arc<SmilGenerator>,
        lifecycle: Arc<LifecycleController>,
    ) -> Self {
        Self {
            db,
            provisioner,
            generator,
            lifecycle,
        }
    }

    pub fn generator(&self) -> &Arc<SmilGenerator> {
        &self.generator
    }

    pub fn lifecycle(&self) -> &Arc<LifecycleController> {
        &self.lifecycle
    }

    pub fn provisioner(&self) -> &Arc<Provisioner> {
        &self.provisioner
    }

    /// Tenant and its owning server.
    pub fn resolve(&self, login: &str) -> Result<(Server, Tenant)> {
        let conn = get_conn(&self.db)?;
        let tenant = tenants::get_tenant_by_login(&conn, login)?
            .ok_or_else(|| Error::not_found("tenant", login))?;
        let server = servers::get_server(&conn, tenant.server_id)?
            .ok_or_else(|| Error::not_found("server", tenant.server_id))?;
        Ok((server, tenant))
    }

    /// Regenerate the document and, once written, hot-reload it.
    async fn publish(&self, server: &Server, tenant: &Tenant, report: &mut SyncReport) {
        self.generator.mark_stale(tenant.id);
        match self.generator.regenerate(server, tenant).await {
            Ok(_) => {
                if let Err(e) = self.lifecycle.reload_schedule(server, tenant).await {
                    report.warn("schedule reload", &e);
                }
            }
            Err(e) => report.warn("playlist document", &e),
        }
    }

    /// Create the tenant's remote root, update the host's tenant count and
    /// publish an initial document.
    pub async fn provision_tenant(&self, login: &str) -> Result<SyncReport> {
        let (server, tenant) = self.resolve(login)?;
        let root = self.provisioner.ensure_tenant_root(&server, login).await?;
        {
            let conn = get_conn(&self.db)?;
            servers::refresh_tenant_count(&conn, server.id)?;
        }

        let mut report = SyncReport::ok(format!("tenant root ready at {root}"));
        if let Err(e) = self.generator.regenerate(&server, &tenant).await {
            report.warn("playlist document", &e);
        }
        Ok(report)
    }

    /// Reconcile everything derived for a tenant: root, document, reload.
    pub async fn sync_tenant(&self, login: &str) -> Result<SyncReport> {
        let (server, tenant) = self.resolve(login)?;
        let mut report = SyncReport::ok(format!("{login} synchronized"));

        if let Err(e) = self.provisioner.ensure_tenant_root(&server, login).await {
            if e.is_fatal() {
                return Err(e);
            }
            report.warn("tenant root", &e);
        }
        self.publish(&server, &tenant, &mut report).await;

        if !report.warnings.is_empty() {
            report.success = false;
            report.message = format!("{login} synchronized with {} warning(s)", report.warnings.len());
        }
        Ok(report)
    }

    pub async fn start_transmission(
        &self,
        login: &str,
        playlist_id: Option<PlaylistId>,
        source: Option<&str>,
    ) -> Result<TransmissionReport> {
        let (server, tenant) = self.resolve(login)?;
        if playlist_id.is_none() && source.is_none() {
            return Err(Error::Validation(
                "a transmission needs a playlist or a source".into(),
            ));
        }

        let started = {
            let conn = get_conn(&self.db)?;
            if let Some(id) = playlist_id {
                playlists::get_playlist(&conn, id)?
                    .filter(|p| p.tenant_id == tenant.id)
                    .ok_or_else(|| Error::not_found("playlist", id))?;
            }
            transmissions::start_transmission(&conn, tenant.id, playlist_id, source)?
        };
        tracing::info!(login, transmission = %started.transmission.id, "Transmission started");

        let mut report = SyncReport::ok("transmission started");
        self.publish(&server, &tenant, &mut report).await;
        Ok(TransmissionReport {
            transmission: started.transmission,
            ended: started.ended,
            report,
        })
    }

    pub async fn end_transmission(&self, login: &str) -> Result<SyncReport> {
        let (server, tenant) = self.resolve(login)?;
        let ended = {
            let conn = get_conn(&self.db)?;
            transmissions::end_active(&conn, tenant.id)?
        };
        let Some(ended) = ended else {
            return Ok(SyncReport::ok("no active transmission"));
        };
        tracing::info!(login, transmission = %ended, "Transmission ended");

        let mut report = SyncReport::ok("transmission ended");
        self.publish(&server, &tenant, &mut report).await;
        Ok(report)
    }

    /// Replace a playlist's items and publish.
    pub async fn set_playlist_items(
        &self,
        login: &str,
        playlist_id: PlaylistId,
        videos: &[VideoId],
    ) -> Result<SyncReport> {
        let (server, tenant) = self.resolve(login)?;
        {
            let conn = get_conn(&self.db)?;
            playlists::get_playlist(&conn, playlist_id)?
                .filter(|p| p.tenant_id == tenant.id)
                .ok_or_else(|| Error::not_found("playlist", playlist_id))?;
            playlists::set_items(&conn, playlist_id, videos)?;
        }
        let mut report = SyncReport::ok(format!("playlist updated with {} item(s)", videos.len()));
        self.publish(&server, &tenant, &mut report).await;
        Ok(report)
    }

    pub async fn add_schedule(&self, login: &str, new: &NewSchedule) -> Result<(ScheduleEntry, SyncReport)> {
        let (server, tenant) = self.resolve(login)?;
        let entry = {
            let conn = get_conn(&self.db)?;
            schedules::create_schedule(&conn, tenant.id, new)?
        };
        let mut report = SyncReport::ok("schedule added");
        self.publish(&server, &tenant, &mut report).await;
        Ok((entry, report))
    }

    pub async fn remove_schedule(&self, login: &str, id: ScheduleId) -> Result<SyncReport> {
        let (server, tenant) = self.resolve(login)?;
        {
            let conn = get_conn(&self.db)?;
            schedules::get_schedule(&conn, id)?
                .filter(|s| s.tenant_id == tenant.id)
                .ok_or_else(|| Error::not_found("schedule", id))?;
            schedules::delete_schedule(&conn, id)?;
        }
        let mut report = SyncReport::ok("schedule removed");
        self.publish(&server, &tenant, &mut report).await;
        Ok(report)
    }

    pub async fn create_folder(&self, login: &str, name: &str) -> Result<Folder> {
        let (server, tenant) = self.resolve(login)?;
        self.provisioner.ensure_folder(&server, &tenant, name).await
    }

    /// Rename a folder. Video paths change, so the document is republished.
    pub async fn rename_folder(
        &self,
        login: &str,
        folder_id: FolderId,
        name: &str,
    ) -> Result<(Folder, SyncReport)> {
        let (server, tenant) = self.resolve(login)?;
        let folder = self
            .provisioner
            .rename_folder(&server, &tenant, folder_id, name)
            .await?;
        let mut report = SyncReport::ok(format!("folder renamed to {}", folder.sanitized_name));
        self.publish(&server, &tenant, &mut report).await;
        Ok((folder, report))
    }

    pub async fn delete_folder(&self, login: &str, folder_id: FolderId) -> Result<()> {
        let (server, tenant) = self.resolve(login)?;
        self.provisioner.delete_folder(&server, &tenant, folder_id).await
    }

    pub async fn usage(&self, login: &str) -> Result<UsageSummary> {
        let (server, tenant) = self.resolve(login)?;
        self.provisioner.tenant_usage(&server, &tenant).await
    }
}
