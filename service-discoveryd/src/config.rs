use std::path::Path;
use serde::Deserialize;
use anyhow::{bail, Context, Result};
use shared::protocol::DEFAULT_TTL_WINDOW_SECS;

/// Upper bound on `ttl_window_secs`, one day
pub const MAX_TTL_WINDOW_SECS: u64 = 86_400;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub discovery: DiscoveryConfig,
    #[serde(default)]
    pub advertise: AdvertiseConfig,
    /// Backend config handed to the registry on the first serial scan
    #[serde(default = "default_serial_backend")]
    pub serial: toml::Table,
    #[serde(default)]
    pub api: ApiConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DiscoveryConfig {
    #[serde(default = "default_ttl_window")]
    pub ttl_window_secs: u64,
    #[serde(default = "default_maintenance_interval")]
    pub maintenance_interval_secs: u64,
    /// Restrict mDNS to a single interface; all interfaces when unset
    #[serde(default)]
    pub interface: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AdvertiseConfig {
    #[serde(default = "default_advertise_enabled")]
    pub enabled: bool,
    /// Defaults to the system host name
    #[serde(default)]
    pub instance_name: Option<String>,
    #[serde(default = "default_advertise_port")]
    pub port: u16,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
    #[serde(default = "default_listen")]
    pub listen: String,
}

fn default_ttl_window() -> u64 {
    DEFAULT_TTL_WINDOW_SECS
}

fn default_maintenance_interval() -> u64 {
    30
}

fn default_advertise_enabled() -> bool {
    true
}

fn default_advertise_port() -> u16 {
    8090
}

fn default_serial_backend() -> toml::Table {
    let mut table = toml::Table::new();
    table.insert("type".to_string(), toml::Value::String("adalight".to_string()));
    table
}

fn default_listen() -> String {
    "[::]:8091".to_string()
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            ttl_window_secs: default_ttl_window(),
            maintenance_interval_secs: default_maintenance_interval(),
            interface: None,
        }
    }
}

impl Default for AdvertiseConfig {
    fn default() -> Self {
        Self {
            enabled: default_advertise_enabled(),
            instance_name: None,
            port: default_advertise_port(),
        }
    }
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            listen: default_listen(),
        }
    }
}

impl DiscoveryConfig {
    /// Clamped to [`MAX_TTL_WINDOW_SECS`]
    pub fn ttl_window(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.ttl_window_secs.min(MAX_TTL_WINDOW_SECS) as i64)
    }
}

impl Config {
    /// Load configuration from a TOML file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        Self::parse(&contents)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))
    }

    pub fn parse(contents: &str) -> Result<Self> {
        let mut config: Config = toml::from_str(contents)?;
        // An empty [serial] table still means the default backend
        if config.serial.is_empty() {
            config.serial = default_serial_backend();
        }
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        let ttl = self.discovery.ttl_window_secs;
        if !(1..=MAX_TTL_WINDOW_SECS).contains(&ttl) {
            bail!(
                "discovery.ttl_window_secs must be between 1 and {}, got {}",
                MAX_TTL_WINDOW_SECS,
                ttl
            );
        }
        Ok(())
    }

    /// The `[serial]` table as the JSON object the backend registry expects.
    pub fn serial_backend_json(&self) -> Result<serde_json::Value> {
        serde_json::to_value(&self.serial).context("Failed to convert [serial] table")
    }
}
