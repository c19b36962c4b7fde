//! Configuration for the syncdesk server.
//!
//! TOML file + `SYNCDESK_*` environment loading, validation, and
//! translation into `syncdesk_core` runtime settings and the remote
//! store's `TransportConfig`.

use std::collections::{BTreeMap, HashMap};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use directories::ProjectDirs;
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::Url;

use syncdesk_api::{TlsMode, TransportConfig};
use syncdesk_core::{Actor, ExecutorConfig, HubConfig, Table};

/// Environment variable naming an explicit config file.
pub const CONFIG_ENV: &str = "SYNCDESK_CONFIG";

const REDACTED: &str = "<redacted>";

// ── Error ───────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid {field}: {reason}")]
    Validation { field: String, reason: String },

    #[error("config file not found: {}", path.display())]
    Missing { path: PathBuf },

    #[error("failed to serialize config: {0}")]
    Serialization(#[from] toml::ser::Error),

    #[error("config loading failed: {0}")]
    Figment(Box<figment::Error>),
}

impl From<figment::Error> for ConfigError {
    fn from(err: figment::Error) -> Self {
        Self::Figment(Box::new(err))
    }
}

impl ConfigError {
    fn invalid(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Validation {
            field: field.into(),
            reason: reason.into(),
        }
    }
}

// ── TOML config structs ─────────────────────────────────────────────

/// Top-level configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerSettings,
    #[serde(default)]
    pub remote: RemoteSettings,
    #[serde(default)]
    pub executor: ExecutorSettings,
    #[serde(default)]
    pub hub: HubSettings,
    #[serde(default)]
    pub auth: AuthSettings,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct ServerSettings {
    /// Socket address the HTTP server binds.
    #[serde(default = "default_bind")]
    pub bind: String,

    /// Allowed CORS origins. Empty allows any origin.
    #[serde(default)]
    pub cors_origins: Vec<String>,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            cors_origins: Vec::new(),
        }
    }
}

fn default_bind() -> String {
    "127.0.0.1:8080".into()
}

/// The remote record store.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct RemoteSettings {
    /// Base URL of the REST collection API.
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// API key (plaintext; prefer `api_key_env`).
    pub api_key: Option<String>,

    /// Environment variable name containing the API key.
    pub api_key_env: Option<String>,

    /// Hard HTTP timeout in seconds.
    #[serde(default = "default_remote_timeout")]
    pub timeout: u64,

    /// Path to a custom CA certificate.
    pub ca_cert: Option<PathBuf>,

    /// Accept invalid certificates (development stores only).
    #[serde(default)]
    pub insecure: bool,
}

impl Default for RemoteSettings {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            api_key: None,
            api_key_env: None,
            timeout: default_remote_timeout(),
            ca_cert: None,
            insecure: false,
        }
    }
}

fn default_base_url() -> String {
    "http://127.0.0.1:54321/rest/v1".into()
}
fn default_remote_timeout() -> u64 {
    30
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct ExecutorSettings {
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    #[serde(default = "default_retry_attempts")]
    pub retry_attempts: u32,
    #[serde(default = "default_backoff_base_ms")]
    pub backoff_base_ms: u64,
    #[serde(default = "default_backoff_max_ms")]
    pub backoff_max_ms: u64,
    #[serde(default = "default_cache_ttl_secs")]
    pub cache_ttl_secs: u64,
    /// How often expired cache entries are swept. 0 disables the sweeper.
    #[serde(default = "default_cache_sweep_secs")]
    pub cache_sweep_secs: u64,
    /// Per-table TTL overrides, keyed by table name.
    #[serde(default)]
    pub table_ttl_secs: BTreeMap<String, u64>,
}

impl Default for ExecutorSettings {
    fn default() -> Self {
        Self {
            timeout_ms: default_timeout_ms(),
            retry_attempts: default_retry_attempts(),
            backoff_base_ms: default_backoff_base_ms(),
            backoff_max_ms: default_backoff_max_ms(),
            cache_ttl_secs: default_cache_ttl_secs(),
            cache_sweep_secs: default_cache_sweep_secs(),
            table_ttl_secs: BTreeMap::new(),
        }
    }
}

fn default_timeout_ms() -> u64 {
    10_000
}
fn default_retry_attempts() -> u32 {
    3
}
fn default_backoff_base_ms() -> u64 {
    250
}
fn default_backoff_max_ms() -> u64 {
    5_000
}
fn default_cache_ttl_secs() -> u64 {
    60
}
fn default_cache_sweep_secs() -> u64 {
    300
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct HubSettings {
    #[serde(default = "default_heartbeat_secs")]
    pub heartbeat_interval_secs: u64,
    /// Defaults to twice the heartbeat interval.
    pub liveness_window_secs: Option<u64>,
    #[serde(default = "default_connection_buffer")]
    pub connection_buffer: usize,
    #[serde(default = "default_race_window_secs")]
    pub conflict_race_window_secs: u64,
    /// Last-event memory per record used for conflict checks.
    #[serde(default = "default_event_retention_secs")]
    pub event_retention_secs: u64,
    #[serde(default = "default_listener_capacity")]
    pub listener_capacity: usize,
    /// Drop cached reads for a table when an external writer broadcasts
    /// a change to it.
    #[serde(default = "default_true")]
    pub invalidate_cache_on_broadcast: bool,
}

impl Default for HubSettings {
    fn default() -> Self {
        Self {
            heartbeat_interval_secs: default_heartbeat_secs(),
            liveness_window_secs: None,
            connection_buffer: default_connection_buffer(),
            conflict_race_window_secs: default_race_window_secs(),
            event_retention_secs: default_event_retention_secs(),
            listener_capacity: default_listener_capacity(),
            invalidate_cache_on_broadcast: true,
        }
    }
}

fn default_heartbeat_secs() -> u64 {
    30
}
fn default_connection_buffer() -> usize {
    256
}
fn default_race_window_secs() -> u64 {
    5
}
fn default_event_retention_secs() -> u64 {
    3600
}
fn default_listener_capacity() -> usize {
    1024
}
fn default_true() -> bool {
    true
}

/// Static bearer tokens accepted by the server.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct AuthSettings {
    /// Token -> identity.
    #[serde(default)]
    pub tokens: BTreeMap<String, TokenIdentity>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct TokenIdentity {
    pub user_id: String,
    pub user_name: Option<String>,
}

// ── Config file path ────────────────────────────────────────────────

/// Resolve the config file path via XDG / platform conventions.
pub fn config_path() -> PathBuf {
    ProjectDirs::from("dev", "syncdesk", "syncdesk").map_or_else(
        || PathBuf::from("syncdesk.toml"),
        |dirs| dirs.config_dir().join("config.toml"),
    )
}

// ── Config loading ──────────────────────────────────────────────────

/// Load the full Config from defaults, file, and environment, then
/// validate it.
///
/// The file is `explicit` when given (and must exist), else the path in
/// `SYNCDESK_CONFIG`, else the platform config path (optional).
pub fn load_config(explicit: Option<&Path>) -> Result<Config, ConfigError> {
    let path = match explicit {
        Some(path) => {
            if !path.exists() {
                return Err(ConfigError::Missing {
                    path: path.to_path_buf(),
                });
            }
            path.to_path_buf()
        }
        None => std::env::var_os(CONFIG_ENV).map_or_else(config_path, PathBuf::from),
    };

    let config: Config = Figment::new()
        .merge(Serialized::defaults(Config::default()))
        .merge(Toml::file(&path))
        .merge(Env::prefixed("SYNCDESK_").split("__"))
        .extract()?;

    config.validate()?;
    Ok(config)
}

// ── Validation & translation ────────────────────────────────────────

impl Config {
    /// Check every field that translation would otherwise trip over.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.bind_addr()?;
        self.remote_url()?;
        self.executor_config()?;

        let e = &self.executor;
        if e.timeout_ms == 0 {
            return Err(ConfigError::invalid("executor.timeout_ms", "must be greater than 0"));
        }
        if e.backoff_base_ms > e.backoff_max_ms {
            return Err(ConfigError::invalid(
                "executor.backoff_base_ms",
                "must not exceed executor.backoff_max_ms",
            ));
        }

        let h = &self.hub;
        if h.heartbeat_interval_secs == 0 {
            return Err(ConfigError::invalid(
                "hub.heartbeat_interval_secs",
                "must be greater than 0",
            ));
        }
        if h
            .liveness_window_secs
            .is_some_and(|window| window < h.heartbeat_interval_secs)
        {
            return Err(ConfigError::invalid(
                "hub.liveness_window_secs",
                "must be at least the heartbeat interval",
            ));
        }
        if h.connection_buffer == 0 {
            return Err(ConfigError::invalid("hub.connection_buffer", "must be greater than 0"));
        }
        if h.event_retention_secs < h.conflict_race_window_secs {
            return Err(ConfigError::invalid(
                "hub.event_retention_secs",
                "must be at least hub.conflict_race_window_secs",
            ));
        }

        if self.auth.tokens.keys().any(|t| t.trim().is_empty()) {
            return Err(ConfigError::invalid("auth.tokens", "tokens must not be blank"));
        }
        Ok(())
    }

    pub fn bind_addr(&self) -> Result<SocketAddr, ConfigError> {
        self.server.bind.parse().map_err(|_| {
            ConfigError::invalid(
                "server.bind",
                format!("invalid socket address: {}", self.server.bind),
            )
        })
    }

    pub fn remote_url(&self) -> Result<Url, ConfigError> {
        let url: Url = self.remote.base_url.parse().map_err(|_| {
            ConfigError::invalid(
                "remote.base_url",
                format!("invalid URL: {}", self.remote.base_url),
            )
        })?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(ConfigError::invalid(
                "remote.base_url",
                format!("unsupported scheme '{}'", url.scheme()),
            ));
        }
        Ok(url)
    }

    /// Build the remote store's transport settings.
    pub fn transport_config(&self) -> TransportConfig {
        let remote = &self.remote;
        let tls = if remote.insecure {
            TlsMode::DangerAcceptInvalid
        } else if let Some(ref ca_path) = remote.ca_cert {
            TlsMode::CustomCa(ca_path.clone())
        } else {
            TlsMode::System
        };

        TransportConfig {
            tls,
            timeout: Duration::from_secs(remote.timeout),
            api_key: resolve_api_key(remote),
        }
    }

    pub fn executor_config(&self) -> Result<ExecutorConfig, ConfigError> {
        let e = &self.executor;
        let mut table_ttls = HashMap::new();
        for (name, secs) in &e.table_ttl_secs {
            let table = Table::from_str(name).map_err(|_| {
                ConfigError::invalid(
                    format!("executor.table_ttl_secs.{name}"),
                    "unknown table",
                )
            })?;
            table_ttls.insert(table, Duration::from_secs(*secs));
        }

        Ok(ExecutorConfig {
            default_timeout: Duration::from_millis(e.timeout_ms),
            retry_attempts: e.retry_attempts,
            backoff_base: Duration::from_millis(e.backoff_base_ms),
            backoff_max: Duration::from_millis(e.backoff_max_ms),
            cache_ttl: Duration::from_secs(e.cache_ttl_secs),
            table_ttls,
        })
    }

    pub fn hub_config(&self) -> HubConfig {
        let h = &self.hub;
        let heartbeat = Duration::from_secs(h.heartbeat_interval_secs);
        HubConfig {
            heartbeat_interval: heartbeat,
            liveness_window: h
                .liveness_window_secs
                .map_or(heartbeat * 2, Duration::from_secs),
            connection_buffer: h.connection_buffer,
            conflict_race_window: Duration::from_secs(h.conflict_race_window_secs),
            event_retention: Duration::from_secs(h.event_retention_secs),
            listener_capacity: h.listener_capacity,
        }
    }

    /// Sweep interval for the cache, `None` when disabled.
    pub fn cache_sweep_interval(&self) -> Option<Duration> {
        let secs = self.executor.cache_sweep_secs;
        (secs > 0).then(|| Duration::from_secs(secs))
    }

    /// Accepted bearer tokens mapped to the identity they establish.
    pub fn token_actors(&self) -> HashMap<String, Actor> {
        self.auth
            .tokens
            .iter()
            .map(|(token, identity)| {
                let actor = Actor {
                    user_id: Some(identity.user_id.clone()),
                    user_name: identity.user_name.clone(),
                    session_id: None,
                };
                (token.clone(), actor)
            })
            .collect()
    }

    /// A copy safe to print: secrets replaced, token identities kept.
    pub fn redacted(&self) -> Self {
        let mut copy = self.clone();
        if copy.remote.api_key.is_some() {
            copy.remote.api_key = Some(REDACTED.into());
        }
        copy.auth.tokens = self
            .auth
            .tokens
            .values()
            .enumerate()
            .map(|(i, identity)| (format!("{REDACTED}-{}", i + 1), identity.clone()))
            .collect();
        copy
    }

    pub fn to_toml(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }
}

/// Resolve the remote API key: named environment variable first, then
/// the plaintext value.
pub fn resolve_api_key(remote: &RemoteSettings) -> Option<SecretString> {
    if let Some(ref env_name) = remote.api_key_env {
        if let Ok(val) = std::env::var(env_name) {
            return Some(SecretString::from(val));
        }
    }
    remote.api_key.clone().map(SecretString::from)
}
