//! Configuration management for the mirror agent.
//!
//! Loads configuration from a TOML file with `MIRROR__SECTION__KEY`
//! environment variable overrides.

use crate::executor::dedup::ComparePolicy;
use crate::utils::errors::{MirrorError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Ceiling of a single range request, in bytes.
pub const DEFAULT_CHUNK_SIZE: u64 = 2_000_080_000;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub credentials: CredentialsConfig,
    pub backup: BackupConfig,
    #[serde(default)]
    pub remote: RemoteConfig,
    #[serde(default)]
    pub log: LogConfig,
    #[serde(default)]
    pub session: SessionConfig,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CredentialsConfig {
    /// OAuth client id
    #[serde(default)]
    pub client_id: String,

    /// OAuth client secret
    #[serde(default)]
    pub client_secret: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackupConfig {
    /// Directory holding the baseline and every incremental set
    #[serde(default)]
    pub root_dir: PathBuf,

    /// Number of incremental sets to keep (the baseline is never counted)
    #[serde(default = "default_retention")]
    pub retention: usize,

    /// Top-level units to mirror (empty = all)
    #[serde(default)]
    pub include: Vec<String>,

    /// Top-level units to skip, wins over `include`
    #[serde(default)]
    pub exclude: Vec<String>,

    /// Basis for the "unchanged since baseline" decision
    #[serde(default)]
    pub compare: ComparePolicy,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteConfig {
    /// Base URL of the hierarchy API
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Token endpoint (defaults to `<base_url>/authentication/v2/token`)
    #[serde(default)]
    pub auth_url: Option<String>,

    /// Name of the folder mirrored inside every project
    #[serde(default = "default_top_folder")]
    pub top_folder: String,

    /// Fixed-size payload used to measure throughput at session start
    #[serde(default)]
    pub speed_probe_url: Option<String>,

    /// Range request ceiling in bytes
    #[serde(default = "default_chunk_size")]
    pub chunk_size: u64,

    /// Timeout for listing, metadata and token calls
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    /// Timeout for a single content range request
    #[serde(default = "default_transfer_timeout")]
    pub transfer_timeout_secs: u64,

    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Directory for session and error logs (defaults to `<root_dir>/logs`)
    #[serde(default)]
    pub dir: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Delay before the process exits, lets buffered log writers drain
    #[serde(default = "default_grace_delay")]
    pub grace_delay_secs: u64,
}

// Default values
fn default_retention() -> usize {
    3
}

fn default_base_url() -> String {
    "https://developer.api.autodesk.com".to_string()
}

fn default_top_folder() -> String {
    "Project Files".to_string()
}

fn default_chunk_size() -> u64 {
    DEFAULT_CHUNK_SIZE
}

fn default_request_timeout() -> u64 {
    60
}

fn default_transfer_timeout() -> u64 {
    3600
}

fn default_connect_timeout() -> u64 {
    30
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_grace_delay() -> u64 {
    2
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            auth_url: None,
            top_folder: default_top_folder(),
            speed_probe_url: None,
            chunk_size: default_chunk_size(),
            request_timeout_secs: default_request_timeout(),
            transfer_timeout_secs: default_transfer_timeout(),
            connect_timeout_secs: default_connect_timeout(),
        }
    }
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            dir: None,
        }
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            grace_delay_secs: default_grace_delay(),
        }
    }
}

impl RemoteConfig {
    pub fn auth_url(&self) -> String {
        self.auth_url
            .clone()
            .unwrap_or_else(|| format!("{}/authentication/v2/token", self.base_url.trim_end_matches('/')))
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn transfer_timeout(&self) -> Duration {
        Duration::from_secs(self.transfer_timeout_secs)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }
}

impl Config {
    /// Load configuration from a TOML file, then apply environment overrides.
    pub fn from_file(path: &Path) -> Result<Self> {
        let settings = config::Config::builder()
            .add_source(config::File::from(path).format(config::FileFormat::Toml))
            .add_source(
                config::Environment::with_prefix("MIRROR")
                    .separator("__")
                    .list_separator(",")
                    .with_list_parse_key("backup.include")
                    .with_list_parse_key("backup.exclude")
                    .try_parsing(true),
            )
            .build()
            .map_err(|e| MirrorError::Config(format!("{}: {}", path.display(), e)))?;

        settings
            .try_deserialize()
            .map_err(|e| MirrorError::Config(format!("{}: {}", path.display(), e)))
    }

    /// Parse configuration from TOML text without environment overrides.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| MirrorError::Config(e.to_string()))
    }

    /// Reject settings the session cannot start without.
    pub fn validate(&self) -> Result<()> {
        if self.credentials.client_id.trim().is_empty() {
            return Err(MirrorError::Config("credentials.client_id is required".into()));
        }
        if self.credentials.client_secret.trim().is_empty() {
            return Err(MirrorError::Config("credentials.client_secret is required".into()));
        }
        if self.backup.root_dir.as_os_str().is_empty() {
            return Err(MirrorError::Config("backup.root_dir is required".into()));
        }
        if self.backup.retention < 1 {
            return Err(MirrorError::Config("backup.retention must be at least 1".into()));
        }
        if self.remote.chunk_size == 0 {
            return Err(MirrorError::Config("remote.chunk_size must be positive".into()));
        }
        Ok(())
    }

    /// Directory for session and error logs.
    pub fn log_dir(&self) -> PathBuf {
        self.log
            .dir
            .clone()
            .unwrap_or_else(|| self.backup.root_dir.join("logs"))
    }

    /// Whether a top-level unit with this name takes part in the session.
    pub fn includes_unit(&self, name: &str) -> bool {
        if self.backup.exclude.iter().any(|n| n == name) {
            return false;
        }
        self.backup.include.is_empty() || self.backup.include.iter().any(|n| n == name)
    }
}
