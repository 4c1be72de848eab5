//! System OpenSSH transport.
//!
//! Each channel owns a ControlMaster socket: `connect` authenticates once
//! with `ssh -M -N -f`, and every later command or `scp` transfer rides the
//! multiplexed connection through `-S <socket>` without re-authenticating.
//! Password credentials are fed through `sshpass -e` so they never appear
//! on a command line.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use streamctl_common::{Error, Result};
use tokio::process::Command;

use super::{Channel, HostSpec, Transport};
use crate::command::CommandOutput;

static SOCKET_SEQ: AtomicU64 = AtomicU64::new(0);

/// Stderr fragments emitted by ssh when credentials are rejected.
const AUTH_PATTERNS: &[&str] = &[
    "Permission denied (",
    "Authentication failed",
    "Too many authentication failures",
    "Host key verification failed",
    "REMOTE HOST IDENTIFICATION HAS CHANGED",
];

/// Stderr fragments that indicate the connection itself went away.
const TRANSIENT_PATTERNS: &[&str] = &[
    "Control socket connect",
    "Connection reset",
    "Connection refused",
    "Connection timed out",
    "Operation timed out",
    "Connection closed",
    "lost connection",
    "Broken pipe",
    "No route to host",
    "Could not resolve hostname",
    "mux_client_request_session",
];

/// sshpass exit code for a rejected password.
const SSHPASS_BAD_PASSWORD: i32 = 5;
/// sshpass exit code for an unknown host key.
const SSHPASS_HOST_KEY_UNKNOWN: i32 = 6;

/// Classify a finished ssh/scp invocation.
///
/// Returns `None` when the failure (if any) belongs to the remote command.
/// ssh reserves exit code 255 for its own errors, so that code is always a
/// transport problem; other codes are only attributed to the transport when
/// stderr carries one of ssh's connection messages.
pub fn classify_ssh_failure(
    server: &str,
    exit_code: i32,
    stderr: &str,
    via_sshpass: bool,
) -> Option<Error> {
    if exit_code == 0 {
        return None;
    }

    let first_line = || {
        stderr
            .lines()
            .find(|l| !l.trim().is_empty())
            .unwrap_or("no diagnostic output")
            .trim()
            .to_string()
    };

    if via_sshpass && exit_code == SSHPASS_BAD_PASSWORD {
        return Some(Error::fatal_auth(server, "password rejected"));
    }
    if via_sshpass && exit_code == SSHPASS_HOST_KEY_UNKNOWN {
        return Some(Error::fatal_auth(server, "host key not accepted"));
    }

    // A dead control socket makes ssh fall back to a fresh login, which then
    // fails authentication in batch mode. The socket is the real cause.
    if stderr.contains("Control socket connect") {
        return Some(Error::transient(server, first_line()));
    }
    if AUTH_PATTERNS.iter().any(|p| stderr.contains(p)) {
        return Some(Error::fatal_auth(server, first_line()));
    }
    if exit_code == 255 || TRANSIENT_PATTERNS.iter().any(|p| stderr.contains(p)) {
        return Some(Error::transient(server, first_line()));
    }
    None
}

/// Paths and timeouts for the ssh transport.
#[derive(Debug, Clone)]
pub struct SshOptions {
    pub ssh_bin: PathBuf,
    pub scp_bin: PathBuf,
    /// Needed only for hosts configured with a password.
    pub sshpass_bin: Option<PathBuf>,
    /// Directory holding ControlMaster sockets.
    pub control_dir: PathBuf,
    pub connect_timeout: Duration,
    /// How long an idle master stays up before ssh tears it down.
    pub control_persist: Duration,
}

impl SshOptions {
    /// Locate `ssh`, `scp` and (optionally) `sshpass` in `PATH`.
    pub fn discover(control_dir: impl Into<PathBuf>) -> Result<Self> {
        let ssh_bin = which::which("ssh")
            .map_err(|_| Error::Internal("ssh binary not found in PATH".into()))?;
        let scp_bin = which::which("scp")
            .map_err(|_| Error::Internal("scp binary not found in PATH".into()))?;
        Ok(Self {
            ssh_bin,
            scp_bin,
            sshpass_bin: which::which("sshpass").ok(),
            control_dir: control_dir.into(),
            connect_timeout: Duration::from_secs(10),
            control_persist: Duration::from_secs(600),
        })
    }
}

/// Transport over the system OpenSSH client.
#[derive(Debug, Clone)]
pub struct SshTransport {
    opts: Arc<SshOptions>,
}

impl SshTransport {
    pub fn new(opts: SshOptions) -> Self {
        Self {
            opts: Arc::new(opts),
        }
    }

    fn master_command(&self, host: &HostSpec, socket: &Path) -> Result<Command> {
        let mut cmd = match &host.password {
            Some(password) => {
                let sshpass = self.opts.sshpass_bin.as_ref().ok_or_else(|| {
                    Error::fatal_auth(
                        &host.name,
                        "password authentication requires sshpass, which was not found",
                    )
                })?;
                let mut cmd = Command::new(sshpass);
                cmd.arg("-e").arg(&self.opts.ssh_bin).env("SSHPASS", password);
                cmd
            }
            None => {
                let mut cmd = Command::new(&self.opts.ssh_bin);
                cmd.arg("-o").arg("BatchMode=yes");
                cmd
            }
        };

        cmd.arg("-M")
            .arg("-N")
            .arg("-f")
            .arg("-S")
            .arg(socket)
            .arg("-o")
            .arg(format!(
                "ControlPersist={}",
                self.opts.control_persist.as_secs().max(1)
            ))
            .arg("-o")
            .arg(format!(
                "ConnectTimeout={}",
                self.opts.connect_timeout.as_secs().max(1)
            ))
            .arg("-o")
            .arg("ServerAliveInterval=15")
            .arg("-o")
            .arg("StrictHostKeyChecking=accept-new");
        if let Some(key) = &host.key_path {
            cmd.arg("-i").arg(key);
        }
        cmd.arg("-p")
            .arg(host.port.to_string())
            .arg(format!("{}@{}", host.user, host.host));
        Ok(cmd)
    }
}

#[async_trait]
impl Transport for SshTransport {
    fn kind(&self) -> &'static str {
        "ssh"
    }

    async fn connect(&self, host: &HostSpec) -> Result<Box<dyn Channel>> {
        tokio::fs::create_dir_all(&self.opts.control_dir).await?;

        let seq = SOCKET_SEQ.fetch_add(1, Ordering::Relaxed);
        let id = host.server_id.to_string();
        let socket = self
            .opts
            .control_dir
            .join(format!("{}-{}-{seq}", &id[..8], std::process::id()));

        let mut cmd = self.master_command(host, &socket)?;

        // The backgrounded master inherits stdio. A pipe would stay open for
        // the master's lifetime, so stderr goes to a file instead.
        let log = tempfile::NamedTempFile::new()?;
        cmd.stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::from(log.reopen()?))
            .kill_on_drop(true);

        tracing::debug!(server = %host.name, socket = %socket.display(), "Opening ssh master");

        let mut child = cmd.spawn()?;
        let limit = self.opts.connect_timeout + Duration::from_secs(5);
        let status = match tokio::time::timeout(limit, child.wait()).await {
            Ok(status) => status?,
            Err(_) => {
                return Err(Error::transient(
                    &host.name,
                    format!("ssh connect timed out after {limit:?}"),
                ))
            }
        };

        if !status.success() {
            let stderr = tokio::fs::read_to_string(log.path()).await.unwrap_or_default();
            let exit_code = status.code().unwrap_or(-1);
            return Err(
                classify_ssh_failure(&host.name, exit_code, &stderr, host.password.is_some())
                    .unwrap_or_else(|| {
                        Error::transient(&host.name, format!("ssh master exited with {status}"))
                    }),
            );
        }

        tracing::info!(server = %host.name, host = %host.host, "ssh channel established");

        Ok(Box::new(SshChannel {
            opts: self.opts.clone(),
            target: format!("{}@{}", host.user, host.host),
            port: host.port,
            socket,
        }))
    }
}

struct SshChannel {
    opts: Arc<SshOptions>,
    target: String,
    port: u16,
    socket: PathBuf,
}

impl SshChannel {
    fn scp(&self) -> Command {
        let mut cmd = Command::new(&self.opts.scp_bin);
        cmd.arg("-q")
            .arg("-o")
            .arg(format!("ControlPath={}", self.socket.display()))
            .arg("-o")
            .arg("ControlMaster=no")
            .arg("-o")
            .arg("BatchMode=yes")
            .arg("-P")
            .arg(self.port.to_string());
        cmd
    }
}

#[async_trait]
impl Channel for SshChannel {
    fn exec(&self, script: &str) -> Command {
        let mut cmd = Command::new(&self.opts.ssh_bin);
        cmd.arg("-S")
            .arg(&self.socket)
            .arg("-o")
            .arg("ControlMaster=no")
            .arg("-o")
            .arg("BatchMode=yes")
            .arg("-p")
            .arg(self.port.to_string())
            .arg(&self.target)
            .arg("--")
            .arg(script);
        cmd
    }

    fn upload(&self, local: &Path, remote: &str) -> Command {
        let mut cmd = self.scp();
        cmd.arg(local).arg(format!("{}:{remote}", self.target));
        cmd
    }

    fn download(&self, remote: &str, local: &Path) -> Command {
        let mut cmd = self.scp();
        cmd.arg(format!("{}:{remote}", self.target)).arg(local);
        cmd
    }

    fn classify(&self, host: &HostSpec, output: &CommandOutput) -> Option<Error> {
        classify_ssh_failure(&host.name, output.exit_code, &output.stderr, false)
    }

    async fn close(&self) {
        let mut cmd = Command::new(&self.opts.ssh_bin);
        cmd.arg("-S")
            .arg(&self.socket)
            .arg("-O")
            .arg("exit")
            .arg("-p")
            .arg(self.port.to_string())
            .arg(&self.target);
        if let Err(e) = crate::command::run(cmd, Duration::from_secs(5)).await {
            tracing::debug!(socket = %self.socket.display(), "ssh master exit failed: {e}");
        }
        let _ = tokio::fs::remove_file(&self.socket).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use streamctl_common::ServerId;

    fn host(password: Option<&str>) -> HostSpec {
        HostSpec {
            server_id: ServerId::new(),
            name: "edge-1".into(),
            host: "10.0.0.5".into(),
            port: 2222,
            user: "root".into(),
            password: password.map(str::to_string),
            key_path: None,
        }
    }

    fn opts(sshpass: bool) -> SshOptions {
        SshOptions {
            ssh_bin: "/usr/bin/ssh".into(),
            scp_bin: "/usr/bin/scp".into(),
            sshpass_bin: sshpass.then(|| PathBuf::from("/usr/bin/sshpass")),
            control_dir: "/tmp/streamctl-test".into(),
            connect_timeout: Duration::from_secs(10),
            control_persist: Duration::from_secs(600),
        }
    }

    fn args(cmd: &Command) -> Vec<String> {
        cmd.as_std()
            .get_args()
            .map(|a| a.to_string_lossy().to_string())
            .collect()
    }

    #[test]
    fn auth_failure_is_fatal() {
        let err = classify_ssh_failure(
            "edge-1",
            255,
            "root@10.0.0.5: Permission denied (publickey,password).\n",
            false,
        )
        .unwrap();
        assert!(err.is_fatal());
    }

    #[test]
    fn connection_errors_are_transient() {
        for stderr in [
            "ssh: connect to host 10.0.0.5 port 22: Connection refused",
            "Connection reset by 10.0.0.5 port 22",
            "ssh: connect to host 10.0.0.5 port 22: Connection timed out",
        ] {
            let err = classify_ssh_failure("edge-1", 255, stderr, false).unwrap();
            assert!(err.is_retryable(), "{stderr}");
        }
    }

    #[test]
    fn remote_command_failure_is_not_a_transport_error() {
        let stderr = "mkdir: cannot create directory '/x': Permission denied";
        assert!(classify_ssh_failure("edge-1", 1, stderr, false).is_none());
        assert!(classify_ssh_failure("edge-1", 0, "", false).is_none());
    }

    #[test]
    fn dead_control_socket_is_transient() {
        let stderr = "Control socket connect(/tmp/s): No such file or directory\n\
                      root@10.0.0.5: Permission denied (publickey).";
        let err = classify_ssh_failure("edge-1", 255, stderr, false).unwrap();
        assert!(err.is_retryable());
    }

    #[test]
    fn sshpass_bad_password() {
        let err = classify_ssh_failure("edge-1", 5, "", true).unwrap();
        assert!(matches!(err, Error::FatalAuth { .. }));
    }

    #[test]
    fn password_master_goes_through_sshpass() {
        let transport = SshTransport::new(opts(true));
        let cmd = transport
            .master_command(&host(Some("secret")), Path::new("/tmp/s"))
            .unwrap();
        assert_eq!(cmd.as_std().get_program(), "/usr/bin/sshpass");
        let args = args(&cmd);
        assert_eq!(args[0], "-e");
        assert!(!args.iter().any(|a| a.contains("secret")));
        assert!(args.contains(&"-M".to_string()));
        assert_eq!(args.last().unwrap(), "root@10.0.0.5");
    }

    #[test]
    fn password_without_sshpass_is_fatal() {
        let transport = SshTransport::new(opts(false));
        let err = transport
            .master_command(&host(Some("secret")), Path::new("/tmp/s"))
            .unwrap_err();
        assert!(err.is_fatal());
    }

    #[test]
    fn key_master_uses_batch_mode() {
        let transport = SshTransport::new(opts(false));
        let mut spec = host(None);
        spec.key_path = Some("/root/.ssh/id_ed25519".into());
        let cmd = transport.master_command(&spec, Path::new("/tmp/s")).unwrap();
        let args = args(&cmd);
        assert!(args.contains(&"BatchMode=yes".to_string()));
        assert!(args.contains(&"/root/.ssh/id_ed25519".to_string()));
        assert!(args.contains(&"2222".to_string()));
    }
}
