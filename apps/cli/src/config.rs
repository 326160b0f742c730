//! CLI configuration management.
//!
//! Configuration is stored as TOML:
//! - Linux: `$XDG_CONFIG_HOME/resup/config.toml` (or `~/.config/resup/config.toml`)
//! - Windows: `%APPDATA%/resup/config.toml`

use std::path::{Path, PathBuf};
use std::time::Duration;

use resup_supervisor::RetryConfig;
use resup_transfer::{DEFAULT_CHUNK_SIZE, DEFAULT_SEND_TIMEOUT, EngineConfig};
use serde::{Deserialize, Serialize};

/// CLI configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// File holding the persisted checkpoints.
    #[serde(default = "default_checkpoint_path")]
    pub checkpoint_path: PathBuf,

    /// Directory receiving uploaded bytes. Unset means a simulated remote.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub destination: Option<PathBuf>,

    /// Maximum bytes per chunk. Zero uses the engine default.
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,

    /// Seconds allowed for a single chunk send. Zero uses the engine default.
    #[serde(default = "default_send_timeout_secs")]
    pub send_timeout_secs: u64,

    /// Per-chunk delay of the simulated remote, in milliseconds.
    #[serde(default)]
    pub simulated_latency_ms: u64,

    #[serde(default)]
    pub retry: RetrySection,
}

/// `[retry]` table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrySection {
    #[serde(default = "default_initial_delay_ms")]
    pub initial_delay_ms: u64,

    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,

    #[serde(default = "default_backoff_factor")]
    pub backoff_factor: f64,

    /// Total attempts including the first one.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
}

fn default_checkpoint_path() -> PathBuf {
    data_dir().join("checkpoints.json")
}

fn default_chunk_size() -> usize {
    DEFAULT_CHUNK_SIZE
}

fn default_send_timeout_secs() -> u64 {
    DEFAULT_SEND_TIMEOUT.as_secs()
}

fn default_initial_delay_ms() -> u64 {
    1_000
}

fn default_max_delay_ms() -> u64 {
    60_000
}

fn default_backoff_factor() -> f64 {
    2.0
}

fn default_max_attempts() -> u32 {
    5
}

impl Default for RetrySection {
    fn default() -> Self {
        Self {
            initial_delay_ms: default_initial_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
            backoff_factor: default_backoff_factor(),
            max_attempts: default_max_attempts(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            checkpoint_path: default_checkpoint_path(),
            destination: None,
            chunk_size: default_chunk_size(),
            send_timeout_secs: default_send_timeout_secs(),
            simulated_latency_ms: 0,
            retry: RetrySection::default(),
        }
    }
}

impl Config {
    /// Loads configuration from `path`, or creates a default there if not found.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        if path.exists() {
            let content = std::fs::read_to_string(path)?;
            let config: Config = toml::from_str(&content)?;
            tracing::debug!(path = %path.display(), "configuration loaded");
            Ok(config)
        } else {
            let config = Config::default();
            config.save(path)?;
            Ok(config)
        }
    }

    /// Saves the configuration to `path`.
    pub fn save(&self, path: &Path) -> anyhow::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;

        tracing::debug!(path = %path.display(), "configuration saved");
        Ok(())
    }

    pub fn engine_config(&self) -> EngineConfig {
        EngineConfig {
            chunk_size: self.chunk_size,
            send_timeout: Duration::from_secs(self.send_timeout_secs),
        }
    }

    pub fn retry_config(&self) -> RetryConfig {
        RetryConfig {
            initial_delay: Duration::from_millis(self.retry.initial_delay_ms),
            max_delay: Duration::from_millis(self.retry.max_delay_ms),
            backoff_factor: self.retry.backoff_factor,
            max_attempts: self.retry.max_attempts,
        }
    }

    pub fn simulated_latency(&self) -> Duration {
        Duration::from_millis(self.simulated_latency_ms)
    }
}

/// Returns the platform-specific configuration file path.
pub fn config_path() -> PathBuf {
    config_dir().join("config.toml")
}

fn config_dir() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        let appdata =
            std::env::var("APPDATA").unwrap_or_else(|_| "C:\\Users\\Default\\AppData".into());
        PathBuf::from(appdata).join("resup")
    }

    #[cfg(not(target_os = "windows"))]
    {
        xdg_dir("XDG_CONFIG_HOME", ".config").join("resup")
    }
}

fn data_dir() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        let local =
            std::env::var("LOCALAPPDATA").unwrap_or_else(|_| "C:\\Users\\Default\\AppData".into());
        PathBuf::from(local).join("resup")
    }

    #[cfg(not(target_os = "windows"))]
    {
        xdg_dir("XDG_DATA_HOME", ".local/share").join("resup")
    }
}

#[cfg(not(target_os = "windows"))]
fn xdg_dir(var: &str, fallback: &str) -> PathBuf {
    match std::env::var_os(var) {
        Some(dir) if !dir.is_empty() => PathBuf::from(dir),
        _ => {
            let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".into());
            PathBuf::from(home).join(fallback)
        }
    }
}
