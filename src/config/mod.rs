//! Configuration management for the Bealink server.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::ConfigError;
use crate::types::APP_NAME;

pub mod paths;

/// Main configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Path to the config file (set after loading)
    #[serde(skip)]
    pub path: PathBuf,

    /// HTTP control surface
    #[serde(default)]
    pub server: ServerConfig,

    /// Delayed power actions
    #[serde(default)]
    pub actions: ActionsConfig,

    /// mDNS advertisement
    #[serde(default)]
    pub discovery: DiscoveryConfig,

    /// Desktop notifications
    #[serde(default)]
    pub notifications: NotificationsConfig,
}

impl Config {
    /// Load configuration from `path`, falling back to defaults when no file
    /// exists.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Ok(Config {
                path: path.to_path_buf(),
                ..Default::default()
            });
        }

        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;

        let mut config = Self::parse(&content)?;
        config.path = path.to_path_buf();
        Ok(config)
    }

    /// Parse and validate TOML content.
    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        let config: Config = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Render the configuration as TOML.
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.server.port == 0 {
            return Err(ConfigError::Invalid("server.port must be non-zero".into()));
        }

        let grace = self.actions.grace_period_seconds;
        if !(1..=300).contains(&grace) {
            return Err(ConfigError::Invalid(format!(
                "actions.grace_period_seconds must be between 1 and 300, got {grace}"
            )));
        }

        if !self.discovery.service_type.ends_with(".local.") {
            return Err(ConfigError::Invalid(format!(
                "discovery.service_type must end with '.local.', got '{}'",
                self.discovery.service_type
            )));
        }

        Ok(())
    }

    /// Address the HTTP server binds to.
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}

/// HTTP server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

/// Delayed action configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionsConfig {
    /// Delay between accepting a shutdown/sleep request and executing it
    #[serde(default = "default_grace_period")]
    pub grace_period_seconds: u64,

    /// Cancel a pending action on any keystroke (Windows, global hook)
    #[serde(default = "default_true")]
    pub keyboard_cancel: bool,

    /// Log the OS command instead of running it
    #[serde(default)]
    pub dry_run: bool,
}

fn default_grace_period() -> u64 {
    5
}

fn default_true() -> bool {
    true
}

impl ActionsConfig {
    pub fn grace_period(&self) -> Duration {
        Duration::from_secs(self.grace_period_seconds)
    }
}

impl Default for ActionsConfig {
    fn default() -> Self {
        Self {
            grace_period_seconds: default_grace_period(),
            keyboard_cancel: true,
            dry_run: false,
        }
    }
}

/// mDNS advertisement configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiscoveryConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default = "default_service_type")]
    pub service_type: String,

    /// Instance name; defaults to `<hostname>._Bealink`
    pub instance_name: Option<String>,
}

fn default_service_type() -> String {
    "_http._tcp.local.".to_string()
}

impl DiscoveryConfig {
    pub fn instance_name(&self) -> String {
        self.instance_name.clone().unwrap_or_else(|| {
            let host = hostname::get()
                .ok()
                .and_then(|h| h.into_string().ok())
                .unwrap_or_else(|| "computer".to_string());
            format!("{host}._{APP_NAME}")
        })
    }
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            service_type: default_service_type(),
            instance_name: None,
        }
    }
}

/// Desktop notification configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationsConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
}

impl Default for NotificationsConfig {
    fn default() -> Self {
        Self { enabled: true }
    }
}
