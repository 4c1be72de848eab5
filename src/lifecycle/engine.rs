//! The closed set of engine management commands.
//!
//! Every remote command sent to the media engine is rendered here from the
//! configured templates. Call sites pick an [`EngineOp`]; they never build
//! command strings themselves.

use serde::Serialize;
use streamctl_common::InstanceState;
use streamctl_remote::{shell, CommandOutput};

use crate::config::EngineConfig;
use crate::template::TemplateContext;

/// Printed by the status script when the descriptor is locked.
const LOCK_MARKER: &str = "__STREAMCTL_BLOCKED__";

/// Management operations understood by the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EngineOp {
    Start,
    Stop,
    Status,
    Block,
    Unblock,
}

impl EngineOp {
    pub fn name(self) -> &'static str {
        match self {
            Self::Start => "start",
            Self::Stop => "stop",
            Self::Status => "status",
            Self::Block => "block",
            Self::Unblock => "unblock",
        }
    }

    /// Whether running this op changes engine or filesystem state.
    pub fn is_mutating(self) -> bool {
        !matches!(self, Self::Status)
    }
}

impl std::fmt::Display for EngineOp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Paths of one application's configuration on the engine host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppPaths {
    pub conf_dir: String,
    pub descriptor: String,
    pub locked: String,
}

#[derive(Debug, Clone)]
pub struct EngineCommands {
    config: EngineConfig,
}

impl EngineCommands {
    pub fn new(config: EngineConfig) -> Self {
        Self { config }
    }

    pub fn paths(&self, app: &str) -> AppPaths {
        let conf_dir = shell::join(&self.config.conf_root, &[app]);
        let descriptor = shell::join(&conf_dir, &[&self.config.descriptor_name]);
        let locked = format!("{descriptor}{}", self.config.lock_suffix);
        AppPaths {
            conf_dir,
            descriptor,
            locked,
        }
    }

    fn template(&self, op: EngineOp) -> &str {
        match op {
            EngineOp::Start => &self.config.start_template,
            EngineOp::Stop => &self.config.stop_template,
            EngineOp::Status => &self.config.status_template,
            EngineOp::Block => &self.config.block_template,
            EngineOp::Unblock => &self.config.unblock_template,
        }
    }

    /// Shell script for `op` on application `app`.
    ///
    /// `{cli}` is inserted verbatim since it may carry its own arguments.
    /// Every other value is quoted as a single shell word.
    pub fn render(&self, op: EngineOp, app: &str) -> String {
        let paths = self.paths(app);
        let with_cli = TemplateContext::new()
            .with_var("cli", self.config.cli.as_str())
            .substitute(self.template(op));
        let script = TemplateContext::new()
            .with_var("app", app)
            .with_var("conf_dir", paths.conf_dir)
            .with_var("descriptor", paths.descriptor.as_str())
            .with_var("locked", paths.locked.as_str())
            .substitute_shell(&with_cli);

        match op {
            EngineOp::Status => format!(
                "if [ -e {} ]; then echo {LOCK_MARKER}; fi; {script}",
                shell::quote(&paths.locked)
            ),
            _ => script,
        }
    }
}

/// Instance state from the output of the [`EngineOp::Status`] script.
///
/// A locked descriptor wins over whatever the engine reports.
pub fn parse_status(output: &CommandOutput) -> InstanceState {
    if output.stdout.contains(LOCK_MARKER) {
        return InstanceState::Blocked;
    }
    let text = output.stdout.to_ascii_lowercase();
    if text.contains("not loaded") || text.contains("unloaded") || text.contains("not running") {
        InstanceState::Unloaded
    } else if output.success() && (text.contains("loaded") || text.contains("running")) {
        InstanceState::Loaded
    } else {
        InstanceState::Unloaded
    }
}

/// First meaningful line of the status output.
pub fn status_detail(output: &CommandOutput) -> String {
    output
        .stdout
        .lines()
        .map(str::trim)
        .find(|l| !l.is_empty() && *l != LOCK_MARKER)
        .unwrap_or("")
        .to_string()
}
