use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub remote: RemoteConfig,

    #[serde(default)]
    pub layout: LayoutConfig,

    #[serde(default)]
    pub engine: EngineConfig,

    #[serde(default)]
    pub reload: ReloadConfig,

    #[serde(default)]
    pub ingest: IngestConfig,

    #[serde(default)]
    pub proxy: ProxyConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    /// SQLite database file
    #[serde(default = "default_db_path")]
    pub db_path: PathBuf,

    /// Bearer key required on the admin API (unset = no auth)
    #[serde(default)]
    pub api_key: Option<String>,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}
fn default_port() -> u16 {
    8080
}
fn default_db_path() -> PathBuf {
    PathBuf::from("streamctl.db")
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            db_path: default_db_path(),
            api_key: None,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportKind {
    #[default]
    Ssh,
    Local,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RemoteConfig {
    #[serde(default)]
    pub transport: TransportKind,

    /// Directory for ssh ControlMaster sockets
    #[serde(default = "default_control_dir")]
    pub control_dir: PathBuf,

    /// Pooled channels per host; also the per-host concurrency cap
    #[serde(default = "default_max_channels")]
    pub max_channels_per_host: usize,

    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,

    #[serde(default = "default_command_timeout")]
    pub command_timeout_secs: u64,

    #[serde(default = "default_transfer_timeout")]
    pub transfer_timeout_secs: u64,

    /// Retries after the first attempt for transient failures
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    #[serde(default = "default_retry_delay")]
    pub retry_delay_ms: u64,

    /// Idle channels older than this are reconnected
    #[serde(default = "default_max_idle")]
    pub max_idle_secs: u64,
}

fn default_control_dir() -> PathBuf {
    PathBuf::from("~/.cache/streamctl/ssh")
}
fn default_max_channels() -> usize {
    4
}
fn default_connect_timeout() -> u64 {
    15
}
fn default_command_timeout() -> u64 {
    30
}
fn default_transfer_timeout() -> u64 {
    600
}
fn default_max_retries() -> u32 {
    2
}
fn default_retry_delay() -> u64 {
    2000
}
fn default_max_idle() -> u64 {
    300
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            transport: TransportKind::default(),
            control_dir: default_control_dir(),
            max_channels_per_host: default_max_channels(),
            connect_timeout_secs: default_connect_timeout(),
            command_timeout_secs: default_command_timeout(),
            transfer_timeout_secs: default_transfer_timeout(),
            max_retries: default_max_retries(),
            retry_delay_ms: default_retry_delay(),
            max_idle_secs: default_max_idle(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LayoutConfig {
    /// Parent directory of every tenant root on the media hosts
    #[serde(default = "default_content_root")]
    pub content_root: String,

    /// Subdirectories created in each tenant root
    #[serde(default = "default_tenant_subdirs")]
    pub tenant_subdirs: Vec<String>,

    /// File name of the generated playlist document inside the tenant root
    #[serde(default = "default_smil_file")]
    pub smil_file_name: String,

    /// Absolute prefixes stripped from stored video paths before they are
    /// written as engine-relative sources
    #[serde(default)]
    pub strip_prefixes: Vec<String>,
}

fn default_content_root() -> String {
    "/home/streaming".to_string()
}
fn default_tenant_subdirs() -> Vec<String> {
    vec!["recordings".to_string()]
}
fn default_smil_file() -> String {
    "playlists_agendamentos.smil".to_string()
}

impl Default for LayoutConfig {
    fn default() -> Self {
        Self {
            content_root: default_content_root(),
            tenant_subdirs: default_tenant_subdirs(),
            smil_file_name: default_smil_file(),
            strip_prefixes: Vec::new(),
        }
    }
}

/// Media engine control.
///
/// Templates accept `{cli}`, `{app}`, `{conf_dir}`, `{descriptor}` and
/// `{locked}`; values are shell-quoted on substitution.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct EngineConfig {
    /// Command prefix for the engine's management CLI
    #[serde(default = "default_cli")]
    pub cli: String,

    /// Directory holding one configuration directory per application
    #[serde(default = "default_conf_root")]
    pub conf_root: String,

    #[serde(default = "default_descriptor")]
    pub descriptor_name: String,

    #[serde(default = "default_lock_suffix")]
    pub lock_suffix: String,

    #[serde(default = "default_start_template")]
    pub start_template: String,

    #[serde(default = "default_stop_template")]
    pub stop_template: String,

    #[serde(default = "default_status_template")]
    pub status_template: String,

    #[serde(default = "default_block_template")]
    pub block_template: String,

    #[serde(default = "default_unblock_template")]
    pub unblock_template: String,

    /// Pause between stop and start on restart
    #[serde(default = "default_settle")]
    pub restart_settle_ms: u64,
}

fn default_cli() -> String {
    "engine-jmx".to_string()
}
fn default_conf_root() -> String {
    "/usr/local/streaming-engine/conf".to_string()
}
fn default_descriptor() -> String {
    "Application.xml".to_string()
}
fn default_lock_suffix() -> String {
    ".lock".to_string()
}
fn default_start_template() -> String {
    "{cli} startAppInstance {app}".to_string()
}
fn default_stop_template() -> String {
    "{cli} shutdownAppInstance {app}".to_string()
}
fn default_status_template() -> String {
    "{cli} getAppInstanceInfo {app}".to_string()
}
fn default_block_template() -> String {
    "if [ -e {descriptor} ]; then mv -f -- {descriptor} {locked}; fi; [ -e {locked} ]".to_string()
}
fn default_unblock_template() -> String {
    "if [ -e {locked} ]; then mv -f -- {locked} {descriptor}; fi; [ -e {descriptor} ]".to_string()
}
fn default_settle() -> u64 {
    3000
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            cli: default_cli(),
            conf_root: default_conf_root(),
            descriptor_name: default_descriptor(),
            lock_suffix: default_lock_suffix(),
            start_template: default_start_template(),
            stop_template: default_stop_template(),
            status_template: default_status_template(),
            block_template: default_block_template(),
            unblock_template: default_unblock_template(),
            restart_settle_ms: default_settle(),
        }
    }
}

/// Hot-reload endpoint. The URL template accepts `{host}`, `{port}` and
/// `{login}`.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ReloadConfig {
    #[serde(default = "default_reload_url")]
    pub url_template: String,

    #[serde(default)]
    pub username: String,

    #[serde(default)]
    pub password: String,

    /// Literal substring in the response body that marks success
    #[serde(default = "default_sentinel")]
    pub sentinel: String,

    #[serde(default = "default_reload_attempts")]
    pub max_attempts: u32,

    #[serde(default = "default_reload_delay")]
    pub delay_ms: u64,

    #[serde(default = "default_reload_timeout")]
    pub timeout_secs: u64,
}

fn default_reload_url() -> String {
    "http://{host}:{port}/schedules?appName={login}&action=reloadSchedule".to_string()
}
fn default_sentinel() -> String {
    "DONE".to_string()
}
fn default_reload_attempts() -> u32 {
    5
}
fn default_reload_delay() -> u64 {
    2000
}
fn default_reload_timeout() -> u64 {
    10
}

impl Default for ReloadConfig {
    fn default() -> Self {
        Self {
            url_template: default_reload_url(),
            username: String::new(),
            password: String::new(),
            sentinel: default_sentinel(),
            max_attempts: default_reload_attempts(),
            delay_ms: default_reload_delay(),
            timeout_secs: default_reload_timeout(),
        }
    }
}

/// Low-latency ingest probe. The URL template accepts `{host}`, `{port}`
/// and `{login}`.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct IngestConfig {
    #[serde(default = "default_probe_url")]
    pub probe_url_template: String,

    #[serde(default = "default_probe_timeout")]
    pub timeout_secs: u64,
}

fn default_probe_url() -> String {
    "http://{host}:{port}/{login}/{login}_ll/playlist.m3u8".to_string()
}
fn default_probe_timeout() -> u64 {
    5
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            probe_url_template: default_probe_url(),
            timeout_secs: default_probe_timeout(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ProxyConfig {
    /// HMAC key for tenant bearer tokens (unset = proxy refuses all requests)
    #[serde(default)]
    pub token_secret: Option<String>,

    #[serde(default = "default_token_ttl")]
    pub token_ttl_secs: u64,

    /// Files at least this large are read with aligned block reads
    #[serde(default = "default_large_threshold")]
    pub large_file_threshold: u64,

    /// Block size for aligned reads
    #[serde(default = "default_block_size")]
    pub block_size: u64,

    /// Serve from a local copy downloaded on first access
    #[serde(default)]
    pub cache_enabled: bool,

    #[serde(default = "default_cache_dir")]
    pub cache_dir: PathBuf,
}

fn default_token_ttl() -> u64 {
    6 * 3600
}
fn default_large_threshold() -> u64 {
    16 * 1024 * 1024
}
fn default_block_size() -> u64 {
    64 * 1024
}
fn default_cache_dir() -> PathBuf {
    PathBuf::from("~/.cache/streamctl/media")
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            token_secret: None,
            token_ttl_secs: default_token_ttl(),
            large_file_threshold: default_large_threshold(),
            block_size: default_block_size(),
            cache_enabled: false,
            cache_dir: default_cache_dir(),
        }
    }
}
