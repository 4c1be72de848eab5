mod types;

pub use types::*;

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use std::time::Duration;

use streamctl_remote::{Layout, ManagerOptions};

use crate::template;

/// Load configuration from a TOML file
pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {:?}", path))?;

    let mut config: Config = toml::from_str(&content)
        .with_context(|| format!("Failed to parse config file: {:?}", path))?;

    validate_config(&config)?;
    expand_paths(&mut config);

    Ok(config)
}

/// Load config from default locations or return default config
pub fn load_config_or_default(custom_path: Option<&Path>) -> Result<Config> {
    if let Some(path) = custom_path {
        return load_config(path);
    }

    let default_paths = [
        "./streamctl.toml",
        "~/.config/streamctl/config.toml",
        "/etc/streamctl/config.toml",
    ];

    for path_str in default_paths {
        let path = shellexpand::tilde(path_str);
        let path = Path::new(path.as_ref());
        if path.exists() {
            return load_config(path);
        }
    }

    let mut config = Config::default();
    expand_paths(&mut config);
    Ok(config)
}

fn expand(path: &Path) -> PathBuf {
    PathBuf::from(shellexpand::tilde(&path.to_string_lossy()).as_ref())
}

fn expand_paths(config: &mut Config) {
    config.server.db_path = expand(&config.server.db_path);
    config.remote.control_dir = expand(&config.remote.control_dir);
    config.proxy.cache_dir = expand(&config.proxy.cache_dir);
}

/// Validate configuration, returning non-fatal warnings.
pub fn validate_config(config: &Config) -> Result<Vec<String>> {
    let mut warnings = Vec::new();

    if config.server.port == 0 {
        anyhow::bail!("Server port cannot be 0");
    }
    if config.remote.max_channels_per_host == 0 {
        anyhow::bail!("remote.max_channels_per_host must be at least 1");
    }
    if !config.layout.content_root.starts_with('/') {
        anyhow::bail!(
            "layout.content_root must be absolute, got '{}'",
            config.layout.content_root
        );
    }
    if config.layout.smil_file_name.is_empty() || config.layout.smil_file_name.contains('/') {
        anyhow::bail!("layout.smil_file_name must be a plain file name");
    }

    let engine = &config.engine;
    for (name, tpl) in [
        ("start_template", &engine.start_template),
        ("stop_template", &engine.stop_template),
        ("status_template", &engine.status_template),
        ("block_template", &engine.block_template),
        ("unblock_template", &engine.unblock_template),
    ] {
        if tpl.trim().is_empty() {
            anyhow::bail!("engine.{name} cannot be empty");
        }
        for placeholder in template::placeholders(tpl) {
            if !["cli", "app", "conf_dir", "descriptor", "locked"].contains(&placeholder) {
                warnings.push(format!("engine.{name} uses unknown placeholder {{{placeholder}}}"));
            }
        }
    }
    if engine.lock_suffix.is_empty() {
        anyhow::bail!("engine.lock_suffix cannot be empty");
    }

    if config.reload.url_template.trim().is_empty() {
        anyhow::bail!("reload.url_template cannot be empty");
    }
    if config.reload.sentinel.is_empty() {
        anyhow::bail!("reload.sentinel cannot be empty");
    }
    if config.reload.max_attempts == 0 {
        anyhow::bail!("reload.max_attempts must be at least 1");
    }
    if config.reload.username.is_empty() {
        warnings.push("reload.username is empty; hot-reload requests will be rejected".into());
    }

    if config.proxy.block_size == 0 {
        anyhow::bail!("proxy.block_size must be greater than 0");
    }
    if config.proxy.token_secret.as_deref().map_or(true, str::is_empty) {
        warnings.push("proxy.token_secret is unset; the media proxy will refuse every request".into());
    }

    for w in &warnings {
        tracing::warn!("{w}");
    }
    Ok(warnings)
}

impl RemoteConfig {
    pub fn manager_options(&self) -> ManagerOptions {
        ManagerOptions {
            max_channels_per_host: self.max_channels_per_host,
            max_idle: Duration::from_secs(self.max_idle_secs),
            connect_timeout: Duration::from_secs(self.connect_timeout_secs),
            command_timeout: Duration::from_secs(self.command_timeout_secs),
            transfer_timeout: Duration::from_secs(self.transfer_timeout_secs),
            max_retries: self.max_retries,
            retry_delay: Duration::from_millis(self.retry_delay_ms),
        }
    }
}

impl LayoutConfig {
    pub fn layout(&self) -> Layout {
        Layout {
            content_root: self.content_root.clone(),
            tenant_subdirs: self.tenant_subdirs.clone(),
        }
    }
}
