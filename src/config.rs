//! Configuration structures and loading logic

use crate::retry::RetryPolicy;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Main manager configuration
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct ManagerConfig {
    /// Root of the per-model folders
    pub models_dir: PathBuf,
    /// Key-value file holding the downloaded models cache
    pub cache_file: PathBuf,
    /// Base URL of the inference server's API
    pub registry_url: String,
    pub remote_timeout_secs: u64,
    /// Backoff for cache store access
    pub retry: RetryPolicy,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            models_dir: default_models_dir(),
            cache_file: default_cache_file(),
            registry_url: default_registry_url(),
            remote_timeout_secs: default_remote_timeout(),
            retry: RetryPolicy::default(),
        }
    }
}

impl ManagerConfig {
    /// Load configuration from file with environment variable overrides
    pub fn load(path: Option<PathBuf>) -> Result<Self> {
        let mut config = if let Some(path) = path {
            let content = std::fs::read_to_string(&path)
                .with_context(|| format!("Failed to read config file: {:?}", path))?;
            toml::from_str(&content).context("Failed to parse TOML config")?
        } else {
            Self::default()
        };

        // Environment variable overrides
        if let Ok(models_dir) = std::env::var("MODEL_MANAGER_MODELS_DIR") {
            config.models_dir = PathBuf::from(models_dir);
        }
        if let Ok(cache_file) = std::env::var("MODEL_MANAGER_CACHE_FILE") {
            config.cache_file = PathBuf::from(cache_file);
        }
        if let Ok(url) = std::env::var("MODEL_MANAGER_REGISTRY_URL") {
            config.registry_url = url;
        }
        if let Ok(timeout) = std::env::var("MODEL_MANAGER_REMOTE_TIMEOUT") {
            config.remote_timeout_secs = timeout
                .parse()
                .context("Invalid MODEL_MANAGER_REMOTE_TIMEOUT value")?;
        }
        if let Ok(attempts) = std::env::var("MODEL_MANAGER_RETRY_ATTEMPTS") {
            config.retry.max_attempts = attempts
                .parse()
                .context("Invalid MODEL_MANAGER_RETRY_ATTEMPTS value")?;
        }

        Ok(config)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.models_dir.as_os_str().is_empty() {
            anyhow::bail!("models_dir cannot be empty");
        }

        if !self.registry_url.starts_with("http://") && !self.registry_url.starts_with("https://")
        {
            anyhow::bail!(
                "registry_url must be an http(s) URL (got '{}')",
                self.registry_url
            );
        }

        if self.remote_timeout_secs == 0 {
            anyhow::bail!("remote_timeout_secs must be > 0");
        }

        if self.retry.max_attempts == 0 {
            anyhow::bail!("retry.max_attempts must be >= 1");
        }
        if self.retry.initial_delay_ms > self.retry.max_delay_ms {
            anyhow::bail!(
                "retry.initial_delay_ms ({}) exceeds retry.max_delay_ms ({})",
                self.retry.initial_delay_ms,
                self.retry.max_delay_ms
            );
        }

        // Ensure cache file directory exists or can be created
        if let Some(parent) = self.cache_file.parent()
            && !parent.as_os_str().is_empty()
            && !parent.exists()
        {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Cannot create cache file directory: {:?}", parent))?;
        }

        Ok(())
    }
}

// Default functions
fn data_root() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("jan")
}
fn default_models_dir() -> PathBuf {
    data_root().join("models")
}
fn default_cache_file() -> PathBuf {
    data_root().join("model-manager").join("cache.json")
}
fn default_registry_url() -> String {
    "http://127.0.0.1:39291/v1".to_string()
}
fn default_remote_timeout() -> u64 {
    30
}
