//! Config load/save for `~/.snoo/config.yaml`.

use std::path::{Path, PathBuf};
use std::time::Duration;

use thiserror::Error;

use crate::client::ClientBuilder;

/// Client section (user_agent, base URLs, timeout, proxy, token).
#[derive(Debug, Clone, Default, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct ClientSection {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_agent: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub auth_base_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout_secs: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub proxy_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub access_token: Option<String>,
}

/// Stream section (poll_interval_ms, only_new).
#[derive(Debug, Clone, Default, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct StreamSection {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub poll_interval_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub only_new: Option<bool>,
}

/// Contents of the config file. Every section and key is optional.
#[derive(Debug, Clone, Default, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Config {
    #[serde(default)]
    pub client: ClientSection,
    #[serde(default)]
    pub stream: StreamSection,
}

impl Config {
    /// Builder preloaded with every client setting present in the file.
    pub fn client_builder(&self) -> ClientBuilder {
        let c = &self.client;
        let mut builder = ClientBuilder::new();
        if let Some(user_agent) = &c.user_agent {
            builder = builder.user_agent(user_agent);
        }
        if let Some(url) = &c.base_url {
            builder = builder.base_url(url);
        }
        if let Some(url) = &c.auth_base_url {
            builder = builder.auth_base_url(url);
        }
        if let Some(secs) = c.timeout_secs {
            builder = builder.timeout(Duration::from_secs(secs));
        }
        if let Some(proxy) = &c.proxy_url {
            builder = builder.proxy(proxy);
        }
        if let Some(token) = &c.access_token {
            builder = builder.access_token(token);
        }
        builder
    }

    /// Delay between stream polls; one second when unset.
    pub fn poll_interval(&self) -> Duration {
        self.stream
            .poll_interval_ms
            .map(Duration::from_millis)
            .unwrap_or(crate::stream::DEFAULT_POLL_INTERVAL)
    }
}

/// Returns the default config file path: `~/.snoo/config.yaml`.
pub fn default_config_path() -> Option<PathBuf> {
    let home = home_dir()?;
    Some(home.join(".snoo").join("config.yaml"))
}

#[cfg(unix)]
fn home_dir() -> Option<PathBuf> {
    std::env::var_os("HOME").map(PathBuf::from)
}

#[cfg(windows)]
fn home_dir() -> Option<PathBuf> {
    std::env::var_os("USERPROFILE").map(PathBuf::from)
}

#[cfg(not(any(unix, windows)))]
fn home_dir() -> Option<PathBuf> {
    None
}

/// Load config from a YAML file.
pub fn load(path: &Path) -> Result<Config, ConfigError> {
    let contents = std::fs::read_to_string(path)?;
    Ok(serde_yaml::from_str(&contents)?)
}

/// Save config as YAML. Creates the parent directory if missing.
pub fn save(path: &Path, config: &Config) -> Result<(), ConfigError> {
    if let Some(parent) = path.parent() {
        if !parent.exists() {
            std::fs::create_dir_all(parent)?;
        }
    }
    let contents = serde_yaml::to_string(config)?;
    std::fs::write(path, contents)?;
    Ok(())
}

/// Errors reading or writing the config file.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),
}
