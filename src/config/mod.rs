//! Configuration module
//!
//! Handles loading and saving zipd configuration: the router's ports and the
//! zones seeded into its zone information table.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::network::{Datagram, LinkKind, PortAddress};
use crate::zone::MAX_ZONE_NAME_LENGTH;

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Serialize error: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("Config file not found: {0}")]
    NotFound(PathBuf),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

pub type ConfigResult<T> = Result<T, ConfigError>;

/// Main application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// General settings
    #[serde(default)]
    pub general: GeneralConfig,

    /// Service settings
    #[serde(default)]
    pub service: ServiceConfig,

    /// Ports attached to the router
    #[serde(default)]
    pub ports: Vec<PortConfig>,

    /// Seed zones, in the order they are added to the zone table
    #[serde(default)]
    pub zones: Vec<ZoneConfig>,
}

/// General configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneralConfig {
    /// Router name used in logs
    pub name: String,
    /// Enable verbose logging
    #[serde(default)]
    pub verbose: bool,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            name: hostname::get()
                .map(|h| h.to_string_lossy().to_string())
                .unwrap_or_else(|_| "zipd".to_string()),
            verbose: false,
        }
    }
}

/// Service configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceConfig {
    /// Largest reply payload the ZIP responder builds
    #[serde(default = "default_max_data_length")]
    pub max_data_length: usize,
    /// Also run the AppleTalk Echo service (off unless asked for)
    #[serde(default)]
    pub echo: bool,
}

fn default_max_data_length() -> usize {
    Datagram::MAX_DATA_LENGTH
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            max_data_length: default_max_data_length(),
            echo: false,
        }
    }
}

/// One router port
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PortConfig {
    pub name: String,
    #[serde(default = "default_kind")]
    pub kind: LinkKind,
    pub network: u16,
    pub node: u8,
    pub network_min: u16,
    pub network_max: u16,
    /// Link segment the port is attached to; ports naming the same segment
    /// share one virtual link. Defaults to the port name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub segment: Option<String>,
}

fn default_kind() -> LinkKind {
    LinkKind::EtherTalk
}

impl PortConfig {
    pub fn segment(&self) -> &str {
        self.segment.as_deref().unwrap_or(&self.name)
    }

    pub fn address(&self) -> PortAddress {
        PortAddress {
            network: self.network,
            node: self.node,
            network_min: self.network_min,
            network_max: self.network_max,
        }
    }
}

/// One seed zone
///
/// The first zone listed for a network is that network's default zone.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ZoneConfig {
    pub name: String,
    pub networks: Vec<u16>,
}

impl Config {
    /// Load configuration from a file
    pub fn load(path: &Path) -> ConfigResult<Self> {
        if !path.exists() {
            return Err(ConfigError::NotFound(path.to_path_buf()));
        }

        let contents = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from the default location
    pub fn load_default() -> ConfigResult<Self> {
        let config_paths = [
            dirs::config_dir().map(|p| p.join("zipd/config.toml")),
            Some(PathBuf::from("./zipd.toml")),
            Some(PathBuf::from("./config.toml")),
        ];

        for path in config_paths.iter().flatten() {
            if path.exists() {
                return Self::load(path);
            }
        }

        Ok(Self::default())
    }

    /// Save configuration to a file
    pub fn save(&self, path: &Path) -> ConfigResult<()> {
        let contents = toml::to_string_pretty(self)?;

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        std::fs::write(path, contents)?;
        Ok(())
    }

    /// Check port ranges and zone names
    pub fn validate(&self) -> ConfigResult<()> {
        for port in &self.ports {
            if port.network_min > port.network_max {
                return Err(ConfigError::Invalid(format!(
                    "port {}: network range {}-{} is reversed",
                    port.name, port.network_min, port.network_max
                )));
            }
            if port.network != 0 && !(port.network_min..=port.network_max).contains(&port.network) {
                return Err(ConfigError::Invalid(format!(
                    "port {}: network {} outside {}-{}",
                    port.name, port.network, port.network_min, port.network_max
                )));
            }
        }

        for zone in &self.zones {
            if zone.name.is_empty() || zone.name.len() > MAX_ZONE_NAME_LENGTH {
                return Err(ConfigError::Invalid(format!(
                    "zone name {:?} must be 1 to {} bytes",
                    zone.name, MAX_ZONE_NAME_LENGTH
                )));
            }
        }

        if self.service.max_data_length < 16 {
            return Err(ConfigError::Invalid(format!(
                "max_data_length {} is too small",
                self.service.max_data_length
            )));
        }
        Ok(())
    }
}

/// Generate a sample configuration file
pub fn generate_sample_config() -> ConfigResult<String> {
    let config = Config {
        general: GeneralConfig {
            name: "seed-router".to_string(),
            verbose: false,
        },
        ports: vec![
            PortConfig {
                name: "ethertalk0".to_string(),
                kind: LinkKind::EtherTalk,
                network: 10,
                node: 1,
                network_min: 10,
                network_max: 19,
                segment: None,
            },
            PortConfig {
                name: "localtalk0".to_string(),
                kind: LinkKind::LocalTalk,
                network: 20,
                node: 254,
                network_min: 20,
                network_max: 20,
                segment: None,
            },
        ],
        zones: vec![
            ZoneConfig {
                name: "Engineering".to_string(),
                networks: vec![10],
            },
            ZoneConfig {
                name: "Sales".to_string(),
                networks: vec![10, 11],
            },
            ZoneConfig {
                name: "Front Office".to_string(),
                networks: vec![20],
            },
        ],
        ..Default::default()
    };

    Ok(toml::to_string_pretty(&config)?)
}
