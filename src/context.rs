//! Application context shared by the HTTP handlers and the CLI.
//!
//! [`AppContext`] wires the store, the connection manager and the services
//! built on top of it. Everything is behind an `Arc` so the context clones
//! cheaply into Axum state.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context as _, Result};
use streamctl_db::pool::{init_pool, DbPool};
use streamctl_remote::{
    ConnectionManager, LocalTransport, Provisioner, SshOptions, SshTransport, Transport,
};

use crate::config::{Config, TransportKind};
use crate::lifecycle::LifecycleController;
use crate::proxy::{MediaProxy, StreamRegistry};
use crate::smil::SmilGenerator;
use crate::sync::Orchestrator;

#[derive(Clone)]
pub struct AppContext {
    pub config: Arc<Config>,
    pub db: DbPool,
    pub manager: Arc<ConnectionManager>,
    pub provisioner: Arc<Provisioner>,
    pub generator: Arc<SmilGenerator>,
    pub lifecycle: Arc<LifecycleController>,
    pub orchestrator: Arc<Orchestrator>,
    pub proxy: Arc<MediaProxy>,
    pub registry: Arc<StreamRegistry>,
}

impl AppContext {
    /// Open the store at `config.server.db_path` and build every service.
    pub fn open(config: Config) -> Result<Self> {
        let db_path = config.server.db_path.to_string_lossy().into_owned();
        tracing::info!("Initializing database at {}", db_path);
        let db = init_pool(&db_path).context("Failed to open database")?;
        let transport = build_transport(&config)?;
        Ok(Self::with_parts(config, db, transport))
    }

    /// Build the services over an existing pool and transport.
    pub fn with_parts(config: Config, db: DbPool, transport: Arc<dyn Transport>) -> Self {
        let manager = Arc::new(ConnectionManager::new(
            transport,
            config.remote.manager_options(),
        ));
        let provisioner = Arc::new(Provisioner::new(
            manager.clone(),
            db.clone(),
            config.layout.layout(),
        ));
        let generator = Arc::new(SmilGenerator::new(
            db.clone(),
            provisioner.clone(),
            config.layout.clone(),
        ));
        let lifecycle = Arc::new(LifecycleController::new(
            manager.clone(),
            generator.clone(),
            config.engine.clone(),
            config.reload.clone(),
            &config.ingest,
        ));
        let orchestrator = Arc::new(Orchestrator::new(
            db.clone(),
            provisioner.clone(),
            generator.clone(),
            lifecycle.clone(),
        ));
        let registry = Arc::new(StreamRegistry::default());
        let proxy = Arc::new(MediaProxy::new(
            db.clone(),
            manager.clone(),
            config.layout.layout(),
            &config.proxy,
            registry.clone(),
        ));

        Self {
            config: Arc::new(config),
            db,
            manager,
            provisioner,
            generator,
            lifecycle,
            orchestrator,
            proxy,
            registry,
        }
    }

    /// Cancel in-flight media streams and close pooled channels.
    pub async fn shutdown(&self) {
        let cancelled = self.registry.len();
        self.registry.cancel_all();
        if cancelled > 0 {
            tracing::info!("Cancelled {} active media stream(s)", cancelled);
        }
        self.manager.shutdown().await;
    }
}

/// Pick the transport named by `remote.transport`.
pub fn build_transport(config: &Config) -> Result<Arc<dyn Transport>> {
    match config.remote.transport {
        TransportKind::Local => {
            tracing::info!("Using local shell transport");
            Ok(Arc::new(LocalTransport::new()))
        }
        TransportKind::Ssh => {
            std::fs::create_dir_all(&config.remote.control_dir).with_context(|| {
                format!(
                    "Failed to create ssh control directory {:?}",
                    config.remote.control_dir
                )
            })?;
            let mut opts = SshOptions::discover(config.remote.control_dir.clone())?;
            opts.connect_timeout = Duration::from_secs(config.remote.connect_timeout_secs);
            tracing::info!(ssh = ?opts.ssh_bin, "Using ssh transport");
            Ok(Arc::new(SshTransport::new(opts)))
        }
    }
}
