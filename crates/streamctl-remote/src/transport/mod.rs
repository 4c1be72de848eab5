//! Transport abstraction: how a channel to a media host is opened and how
//! commands and transfers are expressed on it.
//!
//! A [`Channel`] does not run anything itself. It builds
//! [`tokio::process::Command`]s that the connection manager spawns, times
//! out and classifies, so every transport shares one execution path.

mod local;
mod ssh;

use std::path::Path;

use async_trait::async_trait;
use streamctl_common::{Error, Result, ServerId};
use streamctl_db::models::Server;
use tokio::process::Command;

use crate::command::CommandOutput;

pub use local::LocalTransport;
pub use ssh::{classify_ssh_failure, SshOptions, SshTransport};

/// Connection parameters for one media host.
#[derive(Clone)]
pub struct HostSpec {
    pub server_id: ServerId,
    /// Display name used in logs and error messages.
    pub name: String,
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: Option<String>,
    pub key_path: Option<String>,
}

impl std::fmt::Debug for HostSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HostSpec")
            .field("server_id", &self.server_id)
            .field("name", &self.name)
            .field("host", &self.host)
            .field("port", &self.port)
            .field("user", &self.user)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .field("key_path", &self.key_path)
            .finish()
    }
}

impl From<&Server> for HostSpec {
    fn from(server: &Server) -> Self {
        Self {
            server_id: server.id,
            name: server.name.clone(),
            host: server.host.clone(),
            port: server.ssh_port,
            user: server.ssh_user.clone(),
            password: server.ssh_password.clone(),
            key_path: server.ssh_key_path.clone(),
        }
    }
}

/// Opens channels to hosts.
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    /// Short transport name for logs ("ssh", "local").
    fn kind(&self) -> &'static str;

    /// Establish an authenticated channel to `host`.
    ///
    /// Credential rejection must surface as [`Error::FatalAuth`] and
    /// network trouble as [`Error::TransientTransport`].
    async fn connect(&self, host: &HostSpec) -> Result<Box<dyn Channel>>;
}

/// One established, reusable channel.
#[async_trait]
pub trait Channel: Send + Sync {
    /// A process that runs `script` through the host's POSIX shell.
    fn exec(&self, script: &str) -> Command;

    /// A process that copies a local file to `remote`.
    fn upload(&self, local: &Path, remote: &str) -> Command;

    /// A process that copies `remote` to a local file.
    fn download(&self, remote: &str, local: &Path) -> Command;

    /// Inspect a finished process for transport-level failure.
    ///
    /// Returns `None` when the output is the command's own result, even
    /// when that result is a non-zero exit.
    fn classify(&self, _host: &HostSpec, _output: &CommandOutput) -> Option<Error> {
        None
    }

    /// Tear the channel down. Called when a broken channel is discarded.
    async fn close(&self) {}
}
