use std::path::{Path, PathBuf};

use async_trait::async_trait;
use streamctl_common::Result;
use tokio::process::Command;

use super::{Channel, HostSpec, Transport};

/// Runs "remote" commands through a local shell.
///
/// Used when the media engine shares the machine with the console, and by
/// tests that point the content root at a temporary directory.
#[derive(Debug, Clone)]
pub struct LocalTransport {
    shell: PathBuf,
}

impl LocalTransport {
    pub fn new() -> Self {
        Self {
            shell: PathBuf::from("sh"),
        }
    }

    pub fn with_shell(shell: impl Into<PathBuf>) -> Self {
        Self {
            shell: shell.into(),
        }
    }
}

impl Default for LocalTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Transport for LocalTransport {
    fn kind(&self) -> &'static str {
        "local"
    }

    async fn connect(&self, host: &HostSpec) -> Result<Box<dyn Channel>> {
        tracing::debug!(server = %host.name, "Opening local channel");
        Ok(Box::new(LocalChannel {
            shell: self.shell.clone(),
        }))
    }
}

struct LocalChannel {
    shell: PathBuf,
}

#[async_trait]
impl Channel for LocalChannel {
    fn exec(&self, script: &str) -> Command {
        let mut cmd = Command::new(&self.shell);
        cmd.arg("-c").arg(script);
        cmd
    }

    fn upload(&self, local: &Path, remote: &str) -> Command {
        let mut cmd = Command::new("cp");
        cmd.arg("--").arg(local).arg(remote);
        cmd
    }

    fn download(&self, remote: &str, local: &Path) -> Command {
        let mut cmd = Command::new("cp");
        cmd.arg("--").arg(remote).arg(local);
        cmd
    }
}
