//! Bridge configuration
//!
//! Loaded once at startup from TOML. The file is looked up in this order:
//!
//! 1. path given as the first command line argument
//! 2. `$PADBRIDGE_CONFIG`
//! 3. `<config dir>/padbridge/config.toml`
//!
//! An explicitly named file must exist. If none is named and the default location is
//! empty, the built-in defaults for the Adafruit joy bonnet are used.

use color_eyre::eyre::{eyre, Result, WrapErr};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::Level;

pub const CONFIG_ENV: &str = "PADBRIDGE_CONFIG";
const CONFIG_DIR: &str = "padbridge";
const CONFIG_FILE: &str = "config.toml";

/// How an input device is located
#[derive(Deserialize, Serialize, Clone, Debug, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum DeviceLocator {
    /// Advertised device name, matched against every `/dev/input/event*` node
    Name(String),
    /// Fixed event node, read as raw kernel records
    Path(PathBuf),
}

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq, Eq)]
pub struct SourceConfig {
    pub locator: DeviceLocator,

    /// Request exclusive delivery of the device's events
    #[serde(default = "default_grab")]
    pub grab: bool,
}

impl SourceConfig {
    pub fn named(name: &str) -> Self {
        Self {
            locator: DeviceLocator::Name(name.to_string()),
            grab: default_grab(),
        }
    }
}

fn default_grab() -> bool {
    true
}

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq, Eq)]
#[serde(default)]
pub struct BridgeConfig {
    /// tracing level: error, warn, info, debug or trace
    pub log_level: String,

    /// HID gadget device receiving the reports
    pub gadget: PathBuf,

    pub buttons: SourceConfig,
    pub stick: SourceConfig,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            gadget: PathBuf::from("/dev/hidg0"),
            buttons: SourceConfig::named("joy-bonnet-buttons"),
            stick: SourceConfig::named("joy-bonnet-stick"),
        }
    }
}

impl BridgeConfig {
    pub fn from_toml(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content).map_err(|e| eyre!("Invalid config: {}", e))?;
        config.level()?;
        Ok(config)
    }

    pub async fn from_file(path: &Path) -> Result<Self> {
        let content = tokio::fs::read_to_string(path)
            .await
            .wrap_err_with(|| format!("Failed to read config file {}", path.display()))?;
        Self::from_toml(&content).wrap_err_with(|| format!("In {}", path.display()))
    }

    /// Resolves and loads the configuration. `explicit` is the command line path.
    pub async fn load(explicit: Option<PathBuf>) -> Result<Self> {
        let named = explicit.or_else(|| std::env::var_os(CONFIG_ENV).map(PathBuf::from));
        if let Some(path) = named {
            return Self::from_file(&path).await;
        }

        if let Some(path) = default_path() {
            if tokio::fs::try_exists(&path)
                .await
                .wrap_err("Failed to check for default config")?
            {
                return Self::from_file(&path).await;
            }
        }
        Ok(Self::default())
    }

    pub fn level(&self) -> Result<Level> {
        self.log_level
            .parse()
            .map_err(|_| eyre!("Invalid log level {:?}", self.log_level))
    }
}

fn default_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join(CONFIG_DIR).join(CONFIG_FILE))
}
