//! Connection manager: the single entry point for remote execution and
//! file transfer.
//!
//! Every operation acquires a channel from the host's pool, runs one
//! process on it under a timeout, and classifies the outcome. Transient
//! transport failures mark the channel broken and are retried; fatal ones
//! surface immediately. Mutating helpers are written to be safe to re-run,
//! because a retried attempt may follow one that half succeeded.

use std::path::Path;
use std::pin::Pin;
use std::process::Stdio;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;

use dashmap::DashMap;
use streamctl_common::{Error, Result, ServerId};
use tokio::io::{AsyncRead, ReadBuf};
use tokio::process::{Child, ChildStdout};

use crate::command::{self, CommandOutput, RunFailure};
use crate::pool::{HostPool, PooledChannel};
use crate::retry::{retry, RetryPolicy};
use crate::shell::quote;
use crate::transport::{HostSpec, Transport};

/// Tunables for the connection manager.
#[derive(Debug, Clone)]
pub struct ManagerOptions {
    /// Channels per host, which is also the per-host concurrency cap.
    pub max_channels_per_host: usize,
    /// Idle channels older than this are closed instead of reused.
    pub max_idle: Duration,
    pub connect_timeout: Duration,
    pub command_timeout: Duration,
    pub transfer_timeout: Duration,
    /// Retries after the first attempt for transient failures.
    pub max_retries: u32,
    pub retry_delay: Duration,
}

impl Default for ManagerOptions {
    fn default() -> Self {
        Self {
            max_channels_per_host: 4,
            max_idle: Duration::from_secs(300),
            connect_timeout: Duration::from_secs(15),
            command_timeout: Duration::from_secs(30),
            transfer_timeout: Duration::from_secs(600),
            max_retries: 2,
            retry_delay: Duration::from_secs(2),
        }
    }
}

/// Result of [`ConnectionManager::remove_empty_dir`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DirRemoval {
    Removed,
    Absent,
    /// A file remains below the directory and nothing was removed.
    Occupied,
}

/// Result of a remote stat.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RemoteStat {
    pub exists: bool,
    pub size: u64,
    /// Modification time in epoch seconds, when the host reports one.
    pub modified: Option<i64>,
}

pub struct ConnectionManager {
    transport: Arc<dyn Transport>,
    pools: DashMap<ServerId, Arc<HostPool>>,
    opts: ManagerOptions,
}

impl ConnectionManager {
    pub fn new(transport: Arc<dyn Transport>, opts: ManagerOptions) -> Self {
        Self {
            transport,
            pools: DashMap::new(),
            opts,
        }
    }

    pub fn options(&self) -> &ManagerOptions {
        &self.opts
    }

    pub fn transport_kind(&self) -> &'static str {
        self.transport.kind()
    }

    fn default_policy(&self) -> RetryPolicy {
        RetryPolicy::with_retries(self.opts.max_retries, self.opts.retry_delay)
    }

    fn pool(&self, host: &HostSpec) -> Arc<HostPool> {
        self.pools
            .entry(host.server_id)
            .or_insert_with(|| {
                Arc::new(HostPool::new(
                    host.clone(),
                    self.transport.clone(),
                    self.opts.max_channels_per_host,
                    self.opts.max_idle,
                    self.opts.connect_timeout,
                ))
            })
            .clone()
    }

    /// Drop the pool for a server, e.g. after its credentials changed.
    pub async fn forget(&self, server_id: ServerId) {
        if let Some((_, pool)) = self.pools.remove(&server_id) {
            pool.drain().await;
        }
    }

    /// Close every idle channel on every host.
    pub async fn shutdown(&self) {
        let pools: Vec<Arc<HostPool>> = self.pools.iter().map(|p| p.value().clone()).collect();
        for pool in pools {
            pool.drain().await;
        }
    }

    /// One attempt: run the process built by `build` on a pooled channel.
    async fn attempt<F>(&self, host: &HostSpec, timeout: Duration, build: F) -> Result<CommandOutput>
    where
        F: FnOnce(&PooledChannel) -> tokio::process::Command,
    {
        let pool = self.pool(host);
        let mut channel = pool.acquire().await?;
        let cmd = build(&channel);

        match command::run(cmd, timeout).await {
            Ok(output) => {
                if let Some(err) = channel.classify(host, &output) {
                    channel.mark_broken();
                    return Err(err);
                }
                Ok(output)
            }
            Err(RunFailure::Spawn(e)) => Err(Error::Internal(format!(
                "{} transport failed to spawn: {e}",
                self.transport.kind()
            ))),
            Err(failure) => {
                channel.mark_broken();
                Err(Error::transient(&host.name, failure.to_string()))
            }
        }
    }

    /// Run `script` on the host, retrying transient failures up to
    /// `max_retries` times.
    ///
    /// A non-zero exit of the script itself is returned in the output, not
    /// as an error.
    pub async fn execute(
        &self,
        host: &HostSpec,
        script: &str,
        max_retries: u32,
    ) -> Result<CommandOutput> {
        let policy = RetryPolicy::with_retries(max_retries, self.opts.retry_delay);
        tracing::debug!(server = %host.name, script, "Executing remote command");
        retry(policy, "remote execute", || {
            self.attempt(host, self.opts.command_timeout, move |ch| ch.exec(script))
        })
        .await
    }

    /// [`execute`](Self::execute) with the configured retry count.
    pub async fn run(&self, host: &HostSpec, script: &str) -> Result<CommandOutput> {
        self.execute(host, script, self.opts.max_retries).await
    }

    /// Run `script` and fail with `what` if it exits non-zero.
    pub async fn run_checked(&self, host: &HostSpec, script: &str, what: &str) -> Result<String> {
        let output = self.run(host, script).await?;
        if !output.success() {
            return Err(Error::RemoteStateMismatch(format!(
                "{what} failed on {} (exit {}): {}",
                host.name,
                output.exit_code,
                output.stderr.trim()
            )));
        }
        Ok(output.stdout)
    }

    /// Copy a local file to `remote_path`.
    ///
    /// The file is transferred to a sibling temporary name and renamed into
    /// place, so readers never see a partial file and a failed transfer
    /// leaves any existing file untouched.
    pub async fn upload(
        &self,
        host: &HostSpec,
        local: &Path,
        remote_path: &str,
        max_retries: u32,
    ) -> Result<()> {
        let policy = RetryPolicy::with_retries(max_retries, self.opts.retry_delay);
        let tmp = format!("{remote_path}.part-{}", uuid::Uuid::new_v4().simple());

        let tmp_path = tmp.as_str();
        let transferred = retry(policy, "remote upload", || async move {
            let output = self
                .attempt(host, self.opts.transfer_timeout, move |ch| ch.upload(local, tmp_path))
                .await?;
            if output.success() {
                Ok(())
            } else {
                Err(Error::RemoteStateMismatch(format!(
                    "upload to {remote_path} failed (exit {}): {}",
                    output.exit_code,
                    output.stderr.trim()
                )))
            }
        })
        .await;

        if let Err(e) = transferred {
            let cleanup = format!("rm -f -- {}", quote(&tmp));
            if let Err(ce) = self.execute(host, &cleanup, 0).await {
                tracing::debug!(server = %host.name, "Temp file cleanup failed: {ce}");
            }
            return Err(e);
        }

        // Re-running after a half-applied rename finds the temp file gone and
        // the target present, which counts as done.
        let (tmp_q, dst_q) = (quote(&tmp), quote(remote_path));
        let script = format!(
            "if [ -e {tmp_q} ]; then mv -f -- {tmp_q} {dst_q}; fi && [ -e {dst_q} ]"
        );
        let output = self.execute(host, &script, max_retries).await?;
        if !output.success() {
            return Err(Error::RemoteStateMismatch(format!(
                "could not move upload into place at {remote_path}: {}",
                output.stderr.trim()
            )));
        }

        tracing::info!(server = %host.name, remote = remote_path, "Upload complete");
        Ok(())
    }

    /// Write `contents` to `remote_path` through a local temporary file.
    pub async fn upload_bytes(&self, host: &HostSpec, contents: &[u8], remote_path: &str) -> Result<()> {
        let tmp = tempfile::NamedTempFile::new()?;
        tokio::fs::write(tmp.path(), contents).await?;
        self.upload(host, tmp.path(), remote_path, self.opts.max_retries)
            .await
    }

    /// Copy `remote_path` to a local file.
    pub async fn download(&self, host: &HostSpec, remote_path: &str, local: &Path) -> Result<()> {
        retry(self.default_policy(), "remote download", || async move {
            let output = self
                .attempt(host, self.opts.transfer_timeout, move |ch| ch.download(remote_path, local))
                .await?;
            if output.success() {
                Ok(())
            } else {
                Err(Error::RemoteStateMismatch(format!(
                    "download of {remote_path} failed (exit {}): {}",
                    output.exit_code,
                    output.stderr.trim()
                )))
            }
        })
        .await
    }

    /// Existence, size and modification time of a remote file.
    pub async fn stat(&self, host: &HostSpec, path: &str) -> Result<RemoteStat> {
        let p = quote(path);
        let script = format!(
            "if [ -f {p} ]; then stat -c '%s %Y' -- {p} 2>/dev/null || wc -c < {p}; else echo missing; fi"
        );
        let stdout = self.run_checked(host, &script, "stat").await?;
        parse_stat(&stdout)
    }

    /// Whether a remote directory exists.
    pub async fn dir_exists(&self, host: &HostSpec, path: &str) -> Result<bool> {
        let script = format!("if [ -d {} ]; then echo yes; else echo no; fi", quote(path));
        let stdout = self.run_checked(host, &script, "directory check").await?;
        Ok(stdout.trim() == "yes")
    }

    /// Names of the regular files directly inside `dir`, sorted.
    ///
    /// A missing directory is reported as [`Error::RemoteStateMismatch`].
    pub async fn list_files(&self, host: &HostSpec, dir: &str) -> Result<Vec<String>> {
        let d = quote(dir);
        let script = format!("[ -d {d} ] || exit 3; find {d} -mindepth 1 -maxdepth 1 -type f");
        let output = self.run(host, &script).await?;
        match output.exit_code {
            0 => {}
            3 => {
                return Err(Error::RemoteStateMismatch(format!(
                    "directory {dir} missing on {}",
                    host.name
                )))
            }
            code => {
                return Err(Error::RemoteStateMismatch(format!(
                    "listing {dir} failed (exit {code}): {}",
                    output.stderr.trim()
                )))
            }
        }
        let mut names: Vec<String> = output
            .stdout
            .lines()
            .filter(|l| !l.is_empty())
            .map(|l| l.rsplit('/').next().unwrap_or(l).to_string())
            .collect();
        names.sort();
        Ok(names)
    }

    /// Remove `dir` unless a regular file exists anywhere below it.
    ///
    /// The check and the removal run as one remote script, so a file that
    /// lands between them cannot be deleted along with the directory.
    pub async fn remove_empty_dir(&self, host: &HostSpec, dir: &str) -> Result<DirRemoval> {
        let d = quote(dir);
        let script = format!(
            "[ -d {d} ] || exit 3; \
             [ -z \"$(find {d} -type f -print -quit)\" ] || exit 4; \
             rm -rf -- {d}"
        );
        let output = self.run(host, &script).await?;
        match output.exit_code {
            0 => Ok(DirRemoval::Removed),
            3 => Ok(DirRemoval::Absent),
            4 => Ok(DirRemoval::Occupied),
            code => Err(Error::RemoteStateMismatch(format!(
                "removing {dir} failed (exit {code}): {}",
                output.stderr.trim()
            ))),
        }
    }

    /// Bytes used below `path`, as reported by `du`.
    pub async fn disk_usage(&self, host: &HostSpec, path: &str) -> Result<u64> {
        let p = quote(path);
        let script = format!(
            "[ -e {p} ] || {{ echo 0; exit 0; }}; \
             du -sb -- {p} 2>/dev/null || echo $(( $(du -sk -- {p} | cut -f1) * 1024 ))"
        );
        let stdout = self.run_checked(host, &script, "disk usage").await?;
        stdout
            .split_whitespace()
            .next()
            .and_then(|n| n.parse().ok())
            .ok_or_else(|| Error::Internal(format!("unexpected du output: {}", stdout.trim())))
    }

    /// Start `script` on the host and stream its stdout.
    ///
    /// The returned reader owns both the process and the pooled channel.
    /// Dropping it kills the process and frees the channel.
    pub async fn open_read(&self, host: &HostSpec, script: &str) -> Result<RemoteReader> {
        retry(self.default_policy(), "remote read", || async move {
            let pool = self.pool(host);
            let channel = pool.acquire().await?;
            let mut cmd = channel.exec(script);
            cmd.stdin(Stdio::null())
                .stdout(Stdio::piped())
                .stderr(Stdio::null())
                .kill_on_drop(true);
            let mut child = cmd.spawn().map_err(|e| {
                Error::Internal(format!("{} transport failed to spawn: {e}", self.transport.kind()))
            })?;
            let stdout = child
                .stdout
                .take()
                .ok_or_else(|| Error::Internal("remote read has no stdout".into()))?;
            Ok(RemoteReader {
                stdout,
                child,
                _channel: channel,
            })
        })
        .await
    }
}

fn parse_stat(stdout: &str) -> Result<RemoteStat> {
    let trimmed = stdout.trim();
    if trimmed == "missing" {
        return Ok(RemoteStat {
            exists: false,
            size: 0,
            modified: None,
        });
    }
    let unexpected = || Error::Internal(format!("unexpected stat output: {trimmed}"));
    let mut fields = trimmed.split_whitespace();
    let size = fields
        .next()
        .and_then(|f| f.parse().ok())
        .ok_or_else(unexpected)?;
    let modified = match fields.next() {
        Some(f) => Some(f.parse().map_err(|_| unexpected())?),
        None => None,
    };
    Ok(RemoteStat {
        exists: true,
        size,
        modified,
    })
}

/// Streaming read from a remote process.
pub struct RemoteReader {
    stdout: ChildStdout,
    child: Child,
    _channel: PooledChannel,
}

impl AsyncRead for RemoteReader {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<std::io::Result<()>> {
        let before = buf.filled().len();
        let this = &mut *self;
        match Pin::new(&mut this.stdout).poll_read(cx, buf) {
            Poll::Ready(Ok(())) if buf.filled().len() == before => {
                // EOF. Surface a failed remote command instead of a silent
                // short read.
                match this.child.try_wait() {
                    Ok(Some(status)) if !status.success() => Poll::Ready(Err(std::io::Error::other(
                        format!("remote read exited with {status}"),
                    ))),
                    _ => Poll::Ready(Ok(())),
                }
            }
            other => other,
        }
    }
}
