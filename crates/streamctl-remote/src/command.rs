//! Running a prepared process with a timeout and capturing its output.

use std::process::Stdio;
use std::time::Duration;

use tokio::process::Command;

/// Output captured from a remote command.
///
/// A non-zero `exit_code` is the command's own answer, not a transport
/// failure; transport failures are reported as errors before this is built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOutput {
    /// Captured standard output (lossy UTF-8).
    pub stdout: String,
    /// Captured standard error (lossy UTF-8).
    pub stderr: String,
    /// Process exit code, `-1` when terminated by a signal.
    pub exit_code: i32,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

/// Why a process could not produce a [`CommandOutput`].
#[derive(Debug)]
pub(crate) enum RunFailure {
    Spawn(std::io::Error),
    Wait(std::io::Error),
    TimedOut(Duration),
}

impl std::fmt::Display for RunFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RunFailure::Spawn(e) => write!(f, "failed to spawn: {e}"),
            RunFailure::Wait(e) => write!(f, "I/O error waiting for process: {e}"),
            RunFailure::TimedOut(d) => write!(f, "timed out after {d:?}"),
        }
    }
}

/// Spawn `cmd` and wait for it, killing it if `timeout` expires first.
pub(crate) async fn run(mut cmd: Command, timeout: Duration) -> Result<CommandOutput, RunFailure> {
    cmd.stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let child = cmd.spawn().map_err(RunFailure::Spawn)?;

    // Dropping the wait future on timeout drops the child, which kills it.
    match tokio::time::timeout(timeout, child.wait_with_output()).await {
        Ok(Ok(output)) => Ok(CommandOutput {
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
            exit_code: output.status.code().unwrap_or(-1),
        }),
        Ok(Err(e)) => Err(RunFailure::Wait(e)),
        Err(_elapsed) => Err(RunFailure::TimedOut(timeout)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sh(script: &str) -> Command {
        let mut cmd = Command::new("sh");
        cmd.arg("-c").arg(script);
        cmd
    }

    #[tokio::test]
    async fn captures_output_and_exit_code() {
        let out = run(sh("echo hello; echo oops >&2; exit 3"), Duration::from_secs(5))
            .await
            .unwrap();
        assert_eq!(out.stdout.trim(), "hello");
        assert_eq!(out.stderr.trim(), "oops");
        assert_eq!(out.exit_code, 3);
        assert!(!out.success());
    }

    #[tokio::test]
    async fn nonexistent_program() {
        let result = run(
            Command::new("nonexistent_tool_xyz_12345"),
            Duration::from_secs(5),
        )
        .await;
        assert!(matches!(result, Err(RunFailure::Spawn(_))));
    }

    #[tokio::test]
    async fn timeout_fires() {
        let result = run(sh("sleep 10"), Duration::from_millis(100)).await;
        match result {
            Err(failure @ RunFailure::TimedOut(_)) => {
                assert!(failure.to_string().contains("timed out"));
            }
            other => panic!("expected timeout, got {other:?}"),
        }
    }
}
