//! Shared test harness for integration tests.
//!
//! Provides [`TestHarness`], which builds a full [`AppContext`] over an
//! in-memory DB and a [`LocalTransport`], so "remote" commands run through
//! `sh -c` against a temp directory. One media host and one tenant
//! (`radio1`) are registered. [`TestHarness::with_server`] starts Axum on a
//! random port for HTTP-level testing.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use streamctl::config::{Config, TransportKind};
use streamctl::context::AppContext;
use streamctl::server::build_router;
use streamctl_db::models::{Server, Tenant};
use streamctl_db::pool::{init_memory_pool, DbPool, PooledConnection};
use streamctl_db::queries::servers::{self, NewServer};
use streamctl_db::queries::tenants::{self, NewTenant};
use streamctl_remote::LocalTransport;

pub const LOGIN: &str = "radio1";
pub const TOKEN_SECRET: &str = "integration-secret";

const FAKE_ENGINE: &str = r#"#!/bin/sh
dir=$(dirname "$0")
echo "$*" >> "$dir/calls.log"
case "$1" in
  getAppInstanceInfo) cat "$dir/state" 2>/dev/null || echo "not loaded" ;;
  startAppInstance) echo "loaded" > "$dir/state" ;;
  shutdownAppInstance) echo "not loaded" > "$dir/state" ;;
esac
"#;

/// Test harness wrapping a fully-constructed [`AppContext`].
pub struct TestHarness {
    pub ctx: AppContext,
    pub db: DbPool,
    pub dir: tempfile::TempDir,
    pub server: Server,
    pub tenant: Tenant,
}

impl TestHarness {
    /// Config pointing every remote path into `dir`. The reload endpoint
    /// refuses connections unless the caller overrides it.
    pub fn config_for(dir: &std::path::Path) -> Config {
        let mut config = Config::default();
        config.remote.transport = TransportKind::Local;
        config.remote.retry_delay_ms = 1;
        config.layout.content_root = dir.join("content").display().to_string();
        config.engine.cli = format!("sh {}", dir.join("engine.sh").display());
        config.engine.conf_root = dir.join("conf").display().to_string();
        config.engine.restart_settle_ms = 1;
        config.reload.url_template =
            "http://127.0.0.1:9/schedules?appName={login}&action=reloadSchedule".into();
        config.reload.max_attempts = 1;
        config.reload.delay_ms = 1;
        config.reload.timeout_secs = 2;
        config.proxy.token_secret = Some(TOKEN_SECRET.into());
        config
    }

    /// Create a new harness with default test configuration.
    pub fn new() -> Self {
        let dir = tempfile::tempdir().expect("failed to create temp dir");
        let config = Self::config_for(dir.path());
        Self::with_config(dir, config)
    }

    /// Create a new harness with a custom configuration. `dir` must be the
    /// directory the config's paths point into.
    pub fn with_config(dir: tempfile::TempDir, config: Config) -> Self {
        std::fs::write(dir.path().join("engine.sh"), FAKE_ENGINE).unwrap();
        std::fs::create_dir_all(dir.path().join("content")).unwrap();
        std::fs::create_dir_all(dir.path().join("conf").join(LOGIN)).unwrap();
        std::fs::write(
            dir.path().join("conf").join(LOGIN).join("Application.xml"),
            "<Root/>",
        )
        .unwrap();

        let db = init_memory_pool().expect("failed to create in-memory pool");
        let (server, tenant) = {
            let conn = db.get().unwrap();
            let server = servers::create_server(
                &conn,
                &NewServer {
                    name: "local".into(),
                    host: "127.0.0.1".into(),
                    ssh_port: 22,
                    ssh_user: "root".into(),
                    ssh_password: None,
                    ssh_key_path: None,
                    http_port: 1,
                    max_tenants: 10,
                },
            )
            .unwrap();
            let tenant = tenants::create_tenant(
                &conn,
                server.id,
                &NewTenant {
                    login: LOGIN.into(),
                    storage_limit_bytes: 10_000,
                    ..Default::default()
                },
            )
            .unwrap();
            (server, tenant)
        };

        let ctx = AppContext::with_parts(config, db.clone(), Arc::new(LocalTransport::new()));
        Self {
            ctx,
            db,
            dir,
            server,
            tenant,
        }
    }

    /// Start an Axum server on a random port and return the harness together
    /// with the bound socket address.
    pub async fn with_server() -> (Self, SocketAddr) {
        Self::new().serve().await
    }

    /// Start an Axum server for this harness on a random port.
    pub async fn serve(self) -> (Self, SocketAddr) {
        let app = build_router(self.ctx.clone());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("failed to bind random port");
        let addr = listener.local_addr().expect("failed to get local addr");

        tokio::spawn(async move {
            axum::serve(listener, app).await.ok();
        });

        (self, addr)
    }

    /// Get a database connection from the pool.
    pub fn conn(&self) -> PooledConnection {
        streamctl_db::pool::get_conn(&self.db).expect("failed to get db connection")
    }

    /// Local path of the tenant root.
    pub fn tenant_root(&self) -> PathBuf {
        self.dir.path().join("content").join(LOGIN)
    }

    /// Lines the fake engine was invoked with.
    pub fn engine_calls(&self) -> Vec<String> {
        std::fs::read_to_string(self.dir.path().join("calls.log"))
            .unwrap_or_default()
            .lines()
            .map(str::to_string)
            .collect()
    }

    pub fn token(&self) -> String {
        self.ctx
            .proxy
            .signer()
            .expect("token secret configured")
            .issue(LOGIN, 600)
            .unwrap()
    }
}
