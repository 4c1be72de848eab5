//! Lifecycle controller for tenant application instances.
//!
//! Actions are the operation the caller asked for, so their failures are
//! returned as-is rather than downgraded to warnings.

use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use streamctl_common::{Error, InstanceState, Result, Role};
use streamctl_db::models::{Server, Tenant};
use streamctl_remote::{CommandOutput, ConnectionManager, HostSpec};

use super::engine::{parse_status, status_detail, EngineCommands, EngineOp};
use super::probe::{IngestProbe, IngestState};
use super::reload::{ReloadClient, ReloadOutcome};
use crate::config::{EngineConfig, IngestConfig, ReloadConfig};
use crate::smil::SmilGenerator;

/// Actions accepted from the API and CLI.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AppAction {
    Start,
    Stop,
    Restart,
    Block,
    Unblock,
    Status,
    Reload,
}

impl FromStr for AppAction {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "start" => Ok(Self::Start),
            "stop" => Ok(Self::Stop),
            "restart" => Ok(Self::Restart),
            "block" => Ok(Self::Block),
            "unblock" => Ok(Self::Unblock),
            "status" => Ok(Self::Status),
            "reload" => Ok(Self::Reload),
            other => Err(format!("unknown action: {other}")),
        }
    }
}

/// Result of a lifecycle action.
#[derive(Debug, Clone, Serialize)]
pub struct ActionOutcome {
    pub success: bool,
    pub message: String,
    /// The instance was already in the requested state; nothing was sent.
    pub already: bool,
    pub state: InstanceState,
}

impl ActionOutcome {
    fn done(message: impl Into<String>, state: InstanceState) -> Self {
        Self {
            success: true,
            message: message.into(),
            already: false,
            state,
        }
    }

    fn already(message: impl Into<String>, state: InstanceState) -> Self {
        Self {
            success: true,
            message: message.into(),
            already: true,
            state,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct StatusReport {
    pub state: InstanceState,
    /// Present when the tenant has low-latency ingest enabled.
    pub ingest: Option<IngestState>,
    /// First line of the engine's answer.
    pub detail: String,
}

pub struct LifecycleController {
    manager: Arc<ConnectionManager>,
    generator: Arc<SmilGenerator>,
    commands: EngineCommands,
    reload: ReloadClient,
    probe: IngestProbe,
    settle: Duration,
}

impl LifecycleController {
    pub fn new(
        manager: Arc<ConnectionManager>,
        generator: Arc<SmilGenerator>,
        engine: EngineConfig,
        reload: ReloadConfig,
        ingest: &IngestConfig,
    ) -> Self {
        Self {
            manager,
            generator,
            settle: Duration::from_millis(engine.restart_settle_ms),
            commands: EngineCommands::new(engine),
            reload: ReloadClient::new(reload),
            probe: IngestProbe::new(ingest),
        }
    }

    pub fn commands(&self) -> &EngineCommands {
        &self.commands
    }

    /// Run an action by name.
    pub async fn perform(
        &self,
        action: AppAction,
        server: &Server,
        tenant: &Tenant,
        role: Role,
    ) -> Result<ActionOutcome> {
        match action {
            AppAction::Start => self.start(server, tenant).await,
            AppAction::Stop => self.stop(server, tenant).await,
            AppAction::Restart => self.restart(server, tenant).await,
            AppAction::Block => self.block(server, tenant, role).await,
            AppAction::Unblock => self.unblock(server, tenant, role).await,
            AppAction::Status => {
                let report = self.status(server, tenant).await?;
                Ok(ActionOutcome::already(report.detail, report.state))
            }
            AppAction::Reload => {
                let outcome = self.reload_schedule(server, tenant).await?;
                let prefix = if outcome.regenerated {
                    "document regenerated, "
                } else {
                    ""
                };
                let state = self.status(server, tenant).await?.state;
                Ok(ActionOutcome::done(
                    format!(
                        "{prefix}schedule reloaded after {} attempt(s)",
                        outcome.attempts
                    ),
                    state,
                ))
            }
        }
    }

    async fn run_op(&self, server: &Server, tenant: &Tenant, op: EngineOp) -> Result<CommandOutput> {
        let host = HostSpec::from(server);
        let script = self.commands.render(op, &tenant.login);
        tracing::debug!(server = %server.name, login = %tenant.login, op = %op, "Engine command");
        let output = self.manager.run(&host, &script).await?;
        if op.is_mutating() && !output.success() {
            return Err(Error::lifecycle(op.name(), failure_message(&output)));
        }
        Ok(output)
    }

    /// Current instance state. A locked descriptor reports
    /// [`InstanceState::Blocked`]. For low-latency tenants a reachable
    /// playback URL upgrades an unloaded answer to loaded.
    pub async fn status(&self, server: &Server, tenant: &Tenant) -> Result<StatusReport> {
        let output = self.run_op(server, tenant, EngineOp::Status).await?;
        let mut state = parse_status(&output);

        let ingest = if tenant.low_latency_ingest {
            let ingest = self.probe.probe(server, &tenant.login).await;
            if state == InstanceState::Unloaded && ingest.is_loaded() {
                state = InstanceState::Loaded;
            }
            Some(ingest)
        } else {
            None
        };

        Ok(StatusReport {
            state,
            ingest,
            detail: status_detail(&output),
        })
    }

    pub async fn start(&self, server: &Server, tenant: &Tenant) -> Result<ActionOutcome> {
        if server.in_maintenance() {
            return Err(Error::Maintenance {
                server: server.name.clone(),
            });
        }

        match self.status(server, tenant).await?.state {
            InstanceState::Loaded => {
                return Ok(ActionOutcome::already(
                    "application already active",
                    InstanceState::Loaded,
                ))
            }
            InstanceState::Blocked => {
                return Err(Error::lifecycle("start", "application is blocked"));
            }
            InstanceState::Unloaded => {}
        }

        self.run_op(server, tenant, EngineOp::Start).await?;
        tracing::info!(server = %server.name, login = %tenant.login, "Application started");
        Ok(ActionOutcome::done("application started", InstanceState::Loaded))
    }

    pub async fn stop(&self, server: &Server, tenant: &Tenant) -> Result<ActionOutcome> {
        let state = self.status(server, tenant).await?.state;
        if state == InstanceState::Unloaded {
            return Ok(ActionOutcome::already(
                "application already stopped",
                InstanceState::Unloaded,
            ));
        }

        self.run_op(server, tenant, EngineOp::Stop).await?;
        tracing::info!(server = %server.name, login = %tenant.login, "Application stopped");
        let state = if state == InstanceState::Blocked {
            InstanceState::Blocked
        } else {
            InstanceState::Unloaded
        };
        Ok(ActionOutcome::done("application stopped", state))
    }

    pub async fn restart(&self, server: &Server, tenant: &Tenant) -> Result<ActionOutcome> {
        if server.in_maintenance() {
            return Err(Error::Maintenance {
                server: server.name.clone(),
            });
        }

        let stopped = self.stop(server, tenant).await?;
        if !stopped.already {
            tokio::time::sleep(self.settle).await;
        }
        let started = self.start(server, tenant).await?;
        Ok(ActionOutcome::done("application restarted", started.state))
    }

    /// Lock the descriptor so the engine refuses to load the application,
    /// then shut it down.
    pub async fn block(&self, server: &Server, tenant: &Tenant, role: Role) -> Result<ActionOutcome> {
        require_privileged(role, "block")?;

        self.run_op(server, tenant, EngineOp::Block).await?;
        let stop = self.run_op(server, tenant, EngineOp::Stop).await;
        if let Err(e) = stop {
            // The descriptor is locked either way; an already stopped
            // instance makes the engine CLI exit non-zero.
            tracing::debug!(login = %tenant.login, "Stop after block: {e}");
        }

        tracing::info!(server = %server.name, login = %tenant.login, "Application blocked");
        Ok(ActionOutcome::done("application blocked", InstanceState::Blocked))
    }

    /// Restore the descriptor, then stop and start the application.
    pub async fn unblock(&self, server: &Server, tenant: &Tenant, role: Role) -> Result<ActionOutcome> {
        require_privileged(role, "unblock")?;

        self.run_op(server, tenant, EngineOp::Unblock).await?;
        if let Err(e) = self.run_op(server, tenant, EngineOp::Stop).await {
            tracing::debug!(login = %tenant.login, "Stop after unblock: {e}");
        }
        let started = self.start(server, tenant).await?;

        tracing::info!(server = %server.name, login = %tenant.login, "Application unblocked");
        Ok(ActionOutcome::done("application unblocked", started.state))
    }

    /// Hot-reload the schedule.
    ///
    /// A stale or missing document is rebuilt first, and the tenant's
    /// regeneration lock is held across the reload.
    pub async fn reload_schedule(&self, server: &Server, tenant: &Tenant) -> Result<ReloadOutcome> {
        let current = self.generator.ensure_current(server, tenant).await?;
        let mut outcome = self.reload.reload(server, &tenant.login).await?;
        outcome.regenerated = current.regenerated.is_some();
        Ok(outcome)
    }
}

fn require_privileged(role: Role, action: &str) -> Result<()> {
    if role.is_privileged() {
        Ok(())
    } else {
        Err(Error::Forbidden(format!("{action} requires a reseller or admin role")))
    }
}

/// One line describing a failed engine command.
fn failure_message(output: &CommandOutput) -> String {
    let line = output
        .stderr
        .lines()
        .chain(output.stdout.lines())
        .map(str::trim)
        .find(|l| !l.is_empty());
    match line {
        Some(l) => format!("exit {}: {}", output.exit_code, l.chars().take(200).collect::<String>()),
        None => format!("exit {}", output.exit_code),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;
    use streamctl_common::{ServerId, ServerStatus, TenantId};
    use crate::config::LayoutConfig;
    use streamctl_db::pool::init_memory_pool;
    use streamctl_remote::{Layout, LocalTransport, ManagerOptions, Provisioner};

    /// Fake engine CLI: logs its arguments and answers status from a file.
    const FAKE_ENGINE: &str = r#"#!/bin/sh
dir=$(dirname "$0")
echo "$*" >> "$dir/calls.log"
case "$1" in
  getAppInstanceInfo) cat "$dir/state" ;;
  startAppInstance) echo "loaded" > "$dir/state" ;;
  shutdownAppInstance) echo "not loaded" > "$dir/state" ;;
esac
"#;

    struct Fixture {
        dir: tempfile::TempDir,
        controller: LifecycleController,
        server: Server,
        tenant: Tenant,
    }

    fn fixture(initial_state: &str) -> Fixture {
        fixture_with(initial_state, ReloadConfig::default())
    }

    fn fixture_with(initial_state: &str, reload: ReloadConfig) -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let script = dir.path().join("engine.sh");
        std::fs::write(&script, FAKE_ENGINE).unwrap();
        std::fs::write(dir.path().join("state"), format!("{initial_state}\n")).unwrap();
        std::fs::create_dir_all(dir.path().join("conf/radio1")).unwrap();
        std::fs::write(dir.path().join("conf/radio1/Application.xml"), "<Root/>").unwrap();

        let manager = Arc::new(ConnectionManager::new(
            Arc::new(LocalTransport::new()),
            ManagerOptions {
                retry_delay: Duration::from_millis(1),
                ..Default::default()
            },
        ));
        let engine = EngineConfig {
            cli: format!("sh {}", script.display()),
            conf_root: dir.path().join("conf").display().to_string(),
            restart_settle_ms: 1,
            ..Default::default()
        };
        let content_root = dir.path().join("content").display().to_string();
        let db = init_memory_pool().unwrap();
        let provisioner = Arc::new(Provisioner::new(
            manager.clone(),
            db.clone(),
            Layout {
                content_root: content_root.clone(),
                tenant_subdirs: vec![],
            },
        ));
        let generator = Arc::new(SmilGenerator::new(
            db,
            provisioner,
            LayoutConfig {
                content_root,
                ..Default::default()
            },
        ));
        let controller = LifecycleController::new(
            manager,
            generator,
            engine,
            reload,
            &IngestConfig::default(),
        );

        let server = Server {
            id: ServerId::new(),
            name: "local".into(),
            host: "127.0.0.1".into(),
            ssh_port: 22,
            ssh_user: "root".into(),
            ssh_password: None,
            ssh_key_path: None,
            http_port: 1,
            max_tenants: 10,
            current_tenants: 1,
            status: ServerStatus::Active,
            created_at: "now".into(),
        };
        let tenant = Tenant {
            id: TenantId::new(),
            login: "radio1".into(),
            server_id: server.id,
            max_bitrate_kbps: 0,
            max_viewers: 0,
            storage_limit_bytes: 0,
            low_latency_ingest: false,
            created_at: "now".into(),
        };
        Fixture {
            dir,
            controller,
            server,
            tenant,
        }
    }

    fn calls(dir: &Path) -> Vec<String> {
        std::fs::read_to_string(dir.join("calls.log"))
            .unwrap_or_default()
            .lines()
            .map(str::to_string)
            .collect()
    }

    #[tokio::test]
    async fn start_when_loaded_sends_no_mutation() {
        let f = fixture("loaded");
        let outcome = f.controller.start(&f.server, &f.tenant).await.unwrap();
        assert!(outcome.success);
        assert!(outcome.already);
        assert_eq!(calls(f.dir.path()), ["getAppInstanceInfo radio1"]);
    }

    #[tokio::test]
    async fn start_when_unloaded_issues_start() {
        let f = fixture("not loaded");
        let outcome = f.controller.start(&f.server, &f.tenant).await.unwrap();
        assert!(!outcome.already);
        assert_eq!(outcome.state, InstanceState::Loaded);
        assert_eq!(
            calls(f.dir.path()),
            ["getAppInstanceInfo radio1", "startAppInstance radio1"]
        );
    }

    #[tokio::test]
    async fn start_in_maintenance_is_fatal() {
        let mut f = fixture("not loaded");
        f.server.status = ServerStatus::Maintenance;
        let err = f.controller.start(&f.server, &f.tenant).await.unwrap_err();
        assert!(matches!(err, Error::Maintenance { .. }));
        assert!(calls(f.dir.path()).is_empty());
    }

    #[tokio::test]
    async fn stop_when_unloaded_is_noop() {
        let f = fixture("not loaded");
        let outcome = f.controller.stop(&f.server, &f.tenant).await.unwrap();
        assert!(outcome.already);
        assert_eq!(calls(f.dir.path()).len(), 1);
    }

    #[tokio::test]
    async fn restart_stops_then_starts() {
        let f = fixture("loaded");
        let outcome = f.controller.restart(&f.server, &f.tenant).await.unwrap();
        assert_eq!(outcome.state, InstanceState::Loaded);
        let log = calls(f.dir.path());
        let stop = log.iter().position(|c| c.starts_with("shutdownAppInstance"));
        let start = log.iter().position(|c| c.starts_with("startAppInstance"));
        assert!(stop.unwrap() < start.unwrap());
    }

    #[tokio::test]
    async fn block_requires_privilege() {
        let f = fixture("loaded");
        let err = f
            .controller
            .block(&f.server, &f.tenant, Role::Tenant)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Forbidden(_)));
        assert!(calls(f.dir.path()).is_empty());
    }

    #[tokio::test]
    async fn block_then_unblock_round_trip() {
        let f = fixture("loaded");
        let conf = f.dir.path().join("conf/radio1");

        let blocked = f
            .controller
            .block(&f.server, &f.tenant, Role::Admin)
            .await
            .unwrap();
        assert_eq!(blocked.state, InstanceState::Blocked);
        assert!(conf.join("Application.xml.lock").exists());
        assert!(!conf.join("Application.xml").exists());

        let status = f.controller.status(&f.server, &f.tenant).await.unwrap();
        assert_eq!(status.state, InstanceState::Blocked);
        let err = f.controller.start(&f.server, &f.tenant).await.unwrap_err();
        assert!(matches!(err, Error::Lifecycle { .. }));

        let unblocked = f
            .controller
            .unblock(&f.server, &f.tenant, Role::Reseller)
            .await
            .unwrap();
        assert_eq!(unblocked.state, InstanceState::Loaded);
        assert!(conf.join("Application.xml").exists());
    }

    #[tokio::test]
    async fn failed_engine_command_surfaces() {
        let f = fixture("not loaded");
        std::fs::write(
            f.dir.path().join("engine.sh"),
            "#!/bin/sh\ncase \"$1\" in getAppInstanceInfo) echo 'not loaded';; *) echo 'JMX connection refused' >&2; exit 2;; esac\n",
        )
        .unwrap();
        let err = f.controller.start(&f.server, &f.tenant).await.unwrap_err();
        assert!(err.to_string().contains("JMX connection refused"));
    }

    #[tokio::test]
    async fn reload_rebuilds_missing_document_and_reports_queried_state() {
        use streamctl_common::ConfigState;
        use wiremock::matchers::{method, path, query_param};
        use wiremock::{Mock, MockServer, ResponseTemplate};

        let mock = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/schedules"))
            .and(query_param("appName", "radio1"))
            .respond_with(ResponseTemplate::new(200).set_body_string("Schedule reload DONE"))
            .mount(&mock)
            .await;
        let f = fixture_with(
            "not loaded",
            ReloadConfig {
                url_template: format!("{}/schedules?appName={{login}}", mock.uri()),
                max_attempts: 1,
                delay_ms: 1,
                ..Default::default()
            },
        );
        let generator = f.controller.generator.clone();
        assert_eq!(generator.state(f.tenant.id), ConfigState::NoConfig);

        let outcome = f
            .controller
            .perform(AppAction::Reload, &f.server, &f.tenant, Role::Tenant)
            .await
            .unwrap();
        assert!(outcome.message.starts_with("document regenerated"));
        assert_eq!(outcome.state, InstanceState::Unloaded);
        assert_eq!(calls(f.dir.path()), ["getAppInstanceInfo radio1"]);
        assert!(Path::new(&generator.remote_path("radio1")).exists());
        assert_eq!(generator.state(f.tenant.id), ConfigState::Generated);

        let again = f
            .controller
            .perform(AppAction::Reload, &f.server, &f.tenant, Role::Tenant)
            .await
            .unwrap();
        assert!(again.message.starts_with("schedule reloaded"));
    }

    #[test]
    fn actions_parse() {
        assert_eq!("restart".parse::<AppAction>().unwrap(), AppAction::Restart);
        assert!("explode".parse::<AppAction>().is_err());
    }
}
