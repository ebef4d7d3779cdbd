use fossor_common::{ProvisioningKind, DEFAULT_PORT};
use serde::{Deserialize, Serialize};
use std::{path::Path, time::Duration};
use thiserror::Error;

pub const CONFIG_FILE: &str = "config.ron";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read {path}: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },
    #[error("could not parse config: {0}")]
    Parse(#[from] ron::error::SpannedError),
    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Node settings. Every field has a default, so an empty `()` file is a valid
/// configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct Config {
    /// Mean of the exponential wait between reports, in minutes.
    pub mean_interval_minutes: f64,
    /// Granularity of the publish session's wait loop.
    pub poll_interval_ms: u64,
    pub broker: Broker,
    pub provisioning: Provisioning,
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct Broker {
    pub uri: String,
    pub port: u16,
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct Provisioning {
    pub kind: ProvisioningKind,
    /// Pin the association to the access point the broadcast named.
    pub set_target_bssid: bool,
    /// Restart the listener after this many seconds without credentials.
    /// `None` waits forever.
    pub timeout_secs: Option<u64>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            mean_interval_minutes: 60.0,
            poll_interval_ms: 1000,
            broker: Broker::default(),
            provisioning: Provisioning::default(),
        }
    }
}

impl Default for Broker {
    fn default() -> Self {
        Self {
            uri: "mqtts://localhost".to_string(),
            port: DEFAULT_PORT,
        }
    }
}

impl Default for Provisioning {
    fn default() -> Self {
        Self {
            kind: ProvisioningKind::EspTouch,
            set_target_bssid: false,
            timeout_secs: None,
        }
    }
}

impl Config {
    /// Load `config.ron` from the working directory.
    pub fn load() -> Result<Config, ConfigError> {
        Self::load_from(CONFIG_FILE)
    }

    pub fn load_from(path: impl AsRef<Path>) -> Result<Config, ConfigError> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_ron(&contents)
    }

    /// Like [`Config::load`], but a missing file yields the defaults.
    pub fn load_or_default() -> Result<Config, ConfigError> {
        match Self::load() {
            Err(ConfigError::Read { source, .. }) if source.kind() == std::io::ErrorKind::NotFound => {
                Ok(Config::default())
            }
            other => other,
        }
    }

    pub fn from_ron(contents: &str) -> Result<Config, ConfigError> {
        let config: Config = ron::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.mean_interval_minutes.is_finite() || self.mean_interval_minutes <= 0.0 {
            return Err(ConfigError::Invalid(format!(
                "mean_interval_minutes must be positive, got {}",
                self.mean_interval_minutes
            )));
        }
        if self.poll_interval_ms == 0 {
            return Err(ConfigError::Invalid("poll_interval_ms must be non-zero".into()));
        }
        if self.broker.uri.trim().is_empty() {
            return Err(ConfigError::Invalid("broker.uri is empty".into()));
        }
        Ok(())
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn provisioning_timeout(&self) -> Option<Duration> {
        self.provisioning.timeout_secs.map(Duration::from_secs)
    }
}
