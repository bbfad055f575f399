use anyhow::{Context, Result};
use chrono::Duration;
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub polling: PollingConfig,
    #[serde(default)]
    pub jobs: JobsConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_timeout_secs")]
    pub request_timeout_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            request_timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_base_url() -> String {
    "http://localhost:8181".to_string()
}
fn default_timeout_secs() -> u64 {
    30
}

#[derive(Debug, Deserialize, Clone)]
pub struct StorageConfig {
    #[serde(default = "default_storage_dir")]
    pub dir: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            dir: default_storage_dir(),
        }
    }
}

fn default_storage_dir() -> PathBuf {
    PathBuf::from("./data/csync")
}

#[derive(Debug, Deserialize, Clone)]
pub struct PollingConfig {
    #[serde(default = "default_interval_ms")]
    pub interval_ms: u64,
    #[serde(default = "default_not_found_threshold")]
    pub not_found_threshold: u32,
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            interval_ms: default_interval_ms(),
            not_found_threshold: default_not_found_threshold(),
        }
    }
}

fn default_interval_ms() -> u64 {
    1000
}
fn default_not_found_threshold() -> u32 {
    5
}

#[derive(Debug, Deserialize, Clone)]
pub struct JobsConfig {
    #[serde(default = "default_stale_after_secs")]
    pub stale_after_secs: u64,
    #[serde(default = "default_failure_linger_secs")]
    pub failure_linger_secs: u64,
    #[serde(default = "default_completion_linger_secs")]
    pub completion_linger_secs: u64,
}

impl Default for JobsConfig {
    fn default() -> Self {
        Self {
            stale_after_secs: default_stale_after_secs(),
            failure_linger_secs: default_failure_linger_secs(),
            completion_linger_secs: default_completion_linger_secs(),
        }
    }
}

fn default_stale_after_secs() -> u64 {
    300
}
fn default_failure_linger_secs() -> u64 {
    5
}
fn default_completion_linger_secs() -> u64 {
    3
}

impl Config {
    pub fn request_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.server.request_timeout_secs)
    }

    pub fn poll_interval(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.polling.interval_ms)
    }

    pub fn stale_after(&self) -> Duration {
        Duration::seconds(self.jobs.stale_after_secs as i64)
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;
    validate(&config)?;
    Ok(config)
}

pub fn validate(config: &Config) -> Result<()> {
    let base = &config.server.base_url;
    let parsed = url::Url::parse(base)
        .with_context(|| format!("server.base_url is not a valid URL: '{}'", base))?;
    if !matches!(parsed.scheme(), "http" | "https") {
        anyhow::bail!("server.base_url must start with http:// or https://, got '{}'", base);
    }
    if config.server.request_timeout_secs == 0 {
        anyhow::bail!("server.request_timeout_secs must be > 0");
    }

    // Validate polling
    if config.polling.interval_ms == 0 {
        anyhow::bail!("polling.interval_ms must be > 0");
    }
    if config.polling.not_found_threshold == 0 {
        anyhow::bail!("polling.not_found_threshold must be >= 1");
    }

    // Validate jobs
    if config.jobs.stale_after_secs == 0 {
        anyhow::bail!("jobs.stale_after_secs must be > 0");
    }

    Ok(())
}
