//! Tenant filesystem provisioning.
//!
//! Keeps the remote directory tree in step with the store's folder rows.
//! The store is updated optimistically and compensated when the remote
//! side fails, so no folder row outlives a failed mkdir. Remote listings
//! are authoritative for file counts and usage; the store's usage column
//! is a cache refreshed from them.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use streamctl_common::{Error, FolderId, Result};
use streamctl_db::models::{Folder, Server, Tenant};
use streamctl_db::pool::{get_conn, DbPool};
use streamctl_db::queries::{folders, videos};

use crate::manager::{ConnectionManager, DirRemoval};
use crate::retry::{retry_if, RetryPolicy};
use crate::shell::{self, quote};
use crate::transport::HostSpec;

/// Where tenant content lives on a media host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Layout {
    /// Parent of every tenant root, e.g. `/home/streaming`.
    pub content_root: String,
    /// Fixed subdirectories created inside each tenant root.
    pub tenant_subdirs: Vec<String>,
}

impl Layout {
    pub fn tenant_root(&self, login: &str) -> String {
        shell::join(&self.content_root, &[login])
    }

    pub fn folder_path(&self, login: &str, sanitized_name: &str) -> String {
        shell::join(&self.content_root, &[login, sanitized_name])
    }
}

/// Reduce a display name to a filesystem-safe folder name.
///
/// Whitespace runs become `_`; anything outside `[A-Za-z0-9_.-]` is dropped.
/// Case is preserved; uniqueness is checked case-insensitively elsewhere.
pub fn sanitize_folder_name(raw: &str) -> Result<String> {
    let mut out = String::with_capacity(raw.len());
    let mut pending_space = false;
    for c in raw.trim().chars() {
        if c.is_whitespace() {
            pending_space = true;
            continue;
        }
        if c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.') {
            if pending_space && !out.is_empty() {
                out.push('_');
            }
            pending_space = false;
            out.push(c);
        }
    }
    let out = out.trim_matches('.').to_string();
    if out.is_empty() {
        return Err(Error::Validation(format!(
            "folder name '{raw}' has no usable characters"
        )));
    }
    if out.len() > 128 {
        return Err(Error::Validation("folder name is too long".into()));
    }
    Ok(out)
}

/// Measured usage of one folder.
#[derive(Debug, Clone, Serialize)]
pub struct FolderUsage {
    pub folder_id: FolderId,
    pub name: String,
    pub bytes: u64,
    /// `false` when the remote measurement failed and the cached value is shown.
    pub fresh: bool,
}

/// Storage usage of a tenant against its limit.
#[derive(Debug, Clone, Serialize)]
pub struct UsageSummary {
    pub login: String,
    pub used_bytes: u64,
    pub limit_bytes: u64,
    /// `None` when the tenant has no limit.
    pub percent: Option<f64>,
    pub folders: Vec<FolderUsage>,
}

pub struct Provisioner {
    manager: Arc<ConnectionManager>,
    db: DbPool,
    layout: Layout,
    verify: RetryPolicy,
}

impl Provisioner {
    pub fn new(manager: Arc<ConnectionManager>, db: DbPool, layout: Layout) -> Self {
        Self {
            manager,
            db,
            layout,
            verify: RetryPolicy::new(3, Duration::from_millis(500)),
        }
    }

    /// Override how long directory creation is re-verified.
    pub fn with_verify_policy(mut self, policy: RetryPolicy) -> Self {
        self.verify = policy;
        self
    }

    pub fn layout(&self) -> &Layout {
        &self.layout
    }

    pub fn manager(&self) -> &Arc<ConnectionManager> {
        &self.manager
    }

    /// Create the tenant root and its fixed subdirectories, then confirm
    /// they are visible.
    pub async fn ensure_tenant_root(&self, server: &Server, login: &str) -> Result<String> {
        let host = HostSpec::from(server);
        let root = self.layout.tenant_root(login);
        let mut dirs = vec![root.clone()];
        dirs.extend(
            self.layout
                .tenant_subdirs
                .iter()
                .map(|sub| shell::join(&root, &[sub])),
        );
        let quoted: Vec<String> = dirs.iter().map(|d| quote(d)).collect();
        let quoted = quoted.join(" ");

        self.manager
            .run_checked(&host, &format!("mkdir -p -- {quoted}"), "mkdir")
            .await?;

        // Some remote filesystems publish new directories with a delay.
        let check = format!("for d in {quoted}; do [ -d \"$d\" ] || echo \"$d\"; done");
        let (host_ref, check) = (&host, check.as_str());
        retry_if(
            self.verify,
            "verify tenant root",
            |e: &Error| matches!(e, Error::RemoteStateMismatch(_)) || e.is_retryable(),
            || async move {
                let missing = self.manager.run_checked(host_ref, check, "verify").await?;
                let missing = missing.trim();
                if missing.is_empty() {
                    Ok(())
                } else {
                    Err(Error::RemoteStateMismatch(format!(
                        "directories not visible after mkdir: {}",
                        missing.replace('\n', ", ")
                    )))
                }
            },
        )
        .await?;

        tracing::info!(server = %server.name, login, root = %root, "Tenant root ready");
        Ok(root)
    }

    /// Create a folder for `tenant`: store row first, then the remote
    /// directory. A remote failure deletes the row again.
    pub async fn ensure_folder(&self, server: &Server, tenant: &Tenant, raw_name: &str) -> Result<Folder> {
        let sanitized = sanitize_folder_name(raw_name)?;

        let folder = {
            let conn = get_conn(&self.db)?;
            if let Some(existing) = folders::find_by_sanitized_name(&conn, tenant.id, &sanitized)? {
                return Err(Error::Conflict(format!(
                    "folder '{}' already exists",
                    existing.sanitized_name
                )));
            }
            folders::create_folder(&conn, tenant.id, server.id, raw_name.trim(), &sanitized)?
        };

        let host = HostSpec::from(server);
        let path = self.layout.folder_path(&tenant.login, &sanitized);
        let created = async {
            self.manager
                .run_checked(&host, &format!("mkdir -p -- {}", quote(&path)), "mkdir")
                .await?;
            if self.manager.dir_exists(&host, &path).await? {
                Ok(())
            } else {
                Err(Error::RemoteStateMismatch(format!("{path} missing after mkdir")))
            }
        }
        .await;

        if let Err(e) = created {
            tracing::warn!(login = %tenant.login, folder = %sanitized, "Remote mkdir failed, removing folder row: {e}");
            let conn = get_conn(&self.db)?;
            folders::delete_folder(&conn, folder.id)?;
            return Err(e);
        }

        tracing::info!(login = %tenant.login, folder = %sanitized, "Folder provisioned");
        Ok(folder)
    }

    fn owned_folder(&self, tenant: &Tenant, folder_id: FolderId) -> Result<Folder> {
        let conn = get_conn(&self.db)?;
        let folder = folders::get_folder(&conn, folder_id)?
            .ok_or_else(|| Error::not_found("folder", folder_id))?;
        if folder.tenant_id != tenant.id {
            return Err(Error::not_found("folder", folder_id));
        }
        Ok(folder)
    }

    /// Move a folder on the remote host and rewrite its videos' paths.
    pub async fn rename_folder(
        &self,
        server: &Server,
        tenant: &Tenant,
        folder_id: FolderId,
        new_raw_name: &str,
    ) -> Result<Folder> {
        let folder = self.owned_folder(tenant, folder_id)?;
        let sanitized = sanitize_folder_name(new_raw_name)?;

        {
            let conn = get_conn(&self.db)?;
            if let Some(other) = folders::find_by_sanitized_name(&conn, tenant.id, &sanitized)? {
                if other.id != folder.id {
                    return Err(Error::Conflict(format!("folder '{sanitized}' already exists")));
                }
            }
        }

        let old_path = self.layout.folder_path(&tenant.login, &folder.sanitized_name);
        let new_path = self.layout.folder_path(&tenant.login, &sanitized);

        if old_path != new_path {
            self.move_remote(server, &old_path, &new_path).await?;
        }

        let conn = get_conn(&self.db)?;
        folders::rename_folder(&conn, folder.id, new_raw_name.trim(), &sanitized)?;
        let rewritten = videos::rewrite_folder_paths(&conn, folder.id, &old_path, &new_path)?;
        tracing::info!(
            login = %tenant.login,
            from = %folder.sanitized_name,
            to = %sanitized,
            videos = rewritten,
            "Folder renamed"
        );
        folders::get_folder(&conn, folder.id)?.ok_or_else(|| Error::not_found("folder", folder.id))
    }

    async fn move_remote(&self, server: &Server, old_path: &str, new_path: &str) -> Result<()> {
        let host = HostSpec::from(server);
        let (old_q, new_q) = (quote(old_path), quote(new_path));
        // Exit 3: neither side exists. Exit 4: target already occupied.
        let script = format!(
            "if [ -d {old_q} ]; then \
               if [ -e {new_q} ] && [ ! {old_q} -ef {new_q} ]; then exit 4; fi; \
               mv -- {old_q} {new_q}; \
             elif [ -d {new_q} ]; then :; \
             else exit 3; fi"
        );
        let output = self.manager.run(&host, &script).await?;
        match output.exit_code {
            0 => Ok(()),
            3 => {
                tracing::warn!(
                    server = %server.name,
                    path = old_path,
                    "Folder missing on remote, recreating under new name"
                );
                self.manager
                    .run_checked(&host, &format!("mkdir -p -- {new_q}"), "mkdir")
                    .await?;
                Ok(())
            }
            4 => Err(Error::Conflict(format!("{new_path} already exists on remote"))),
            code => Err(Error::RemoteStateMismatch(format!(
                "moving {old_path} failed (exit {code}): {}",
                output.stderr.trim()
            ))),
        }
    }

    /// Delete an empty folder.
    ///
    /// Refused while the store lists videos in it, and refused while the
    /// remote directory holds any file even if the store says it is empty.
    pub async fn delete_folder(&self, server: &Server, tenant: &Tenant, folder_id: FolderId) -> Result<()> {
        let folder = self.owned_folder(tenant, folder_id)?;

        let stored = {
            let conn = get_conn(&self.db)?;
            folders::count_videos(&conn, folder.id)?
        };
        if stored > 0 {
            return Err(Error::Conflict(format!(
                "folder '{}' still holds {stored} video(s)",
                folder.sanitized_name
            )));
        }

        let host = HostSpec::from(server);
        let path = self.layout.folder_path(&tenant.login, &folder.sanitized_name);
        match self.manager.remove_empty_dir(&host, &path).await? {
            DirRemoval::Removed => {}
            DirRemoval::Absent => {
                tracing::debug!(path = %path, "Remote folder already absent");
            }
            DirRemoval::Occupied => {
                return Err(Error::Conflict(format!(
                    "folder '{}' still holds files on the remote host",
                    folder.sanitized_name
                )));
            }
        }

        let conn = get_conn(&self.db)?;
        folders::delete_folder(&conn, folder.id)?;
        tracing::info!(login = %tenant.login, folder = %folder.sanitized_name, "Folder deleted");
        Ok(())
    }

    /// Measure a folder on the remote host and store the result.
    pub async fn refresh_folder_usage(&self, server: &Server, tenant: &Tenant, folder: &Folder) -> Result<u64> {
        let host = HostSpec::from(server);
        let path = self.layout.folder_path(&tenant.login, &folder.sanitized_name);
        let bytes = self.manager.disk_usage(&host, &path).await?;

        let conn = get_conn(&self.db)?;
        folders::set_usage(&conn, folder.id, i64::try_from(bytes).unwrap_or(i64::MAX))?;
        if folder.usage_bytes != bytes as i64 {
            tracing::debug!(
                folder = %folder.sanitized_name,
                cached = folder.usage_bytes,
                measured = bytes,
                "Folder usage corrected from remote"
            );
        }
        Ok(bytes)
    }

    /// Refresh every folder's usage and total it against the tenant limit.
    ///
    /// A folder whose measurement fails is reported with its cached value
    /// and `fresh: false`.
    pub async fn tenant_usage(&self, server: &Server, tenant: &Tenant) -> Result<UsageSummary> {
        let list = {
            let conn = get_conn(&self.db)?;
            folders::list_folders(&conn, tenant.id)?
        };

        let mut usage = Vec::with_capacity(list.len());
        for folder in &list {
            let entry = match self.refresh_folder_usage(server, tenant, folder).await {
                Ok(bytes) => FolderUsage {
                    folder_id: folder.id,
                    name: folder.sanitized_name.clone(),
                    bytes,
                    fresh: true,
                },
                Err(e) if e.is_fatal() => return Err(e),
                Err(e) => {
                    tracing::warn!(folder = %folder.sanitized_name, "Usage refresh failed, using cached value: {e}");
                    FolderUsage {
                        folder_id: folder.id,
                        name: folder.sanitized_name.clone(),
                        bytes: folder.usage_bytes.max(0) as u64,
                        fresh: false,
                    }
                }
            };
            usage.push(entry);
        }

        let used_bytes: u64 = usage.iter().map(|f| f.bytes).sum();
        let limit_bytes = tenant.storage_limit_bytes.max(0) as u64;
        let percent = (limit_bytes > 0).then(|| used_bytes as f64 * 100.0 / limit_bytes as f64);

        Ok(UsageSummary {
            login: tenant.login.clone(),
            used_bytes,
            limit_bytes,
            percent,
            folders: usage,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sanitizing() {
        assert_eq!(sanitize_folder_name("  Morning Shows ").unwrap(), "Morning_Shows");
        assert_eq!(sanitize_folder_name("news/2024?").unwrap(), "news2024");
        assert_eq!(sanitize_folder_name("a   b").unwrap(), "a_b");
        assert_eq!(sanitize_folder_name("..hidden").unwrap(), "hidden");
        assert!(sanitize_folder_name("../..").is_err());
        assert!(sanitize_folder_name("???").is_err());
    }

    #[test]
    fn layout_paths() {
        let layout = Layout {
            content_root: "/home/streaming/".into(),
            tenant_subdirs: vec![],
        };
        assert_eq!(layout.tenant_root("radio1"), "/home/streaming/radio1");
        assert_eq!(layout.folder_path("radio1", "shows"), "/home/streaming/radio1/shows");
    }
}
