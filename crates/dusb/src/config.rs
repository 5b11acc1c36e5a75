use serde::Deserialize;

use crate::error::ConfigError;

pub const DEFAULT_WAKEUP_INTERVAL_MS: u64 = 10_000;
pub const DEFAULT_IN_INTERVAL_MS: u64 = 25_000;

/// Construction-time tunables. Immutable once the device is realized.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DusbConfig {
    /// Period of the remote-wakeup timer, in milliseconds.
    #[serde(alias = "wakeup_interval")]
    pub wakeup_interval_ms: u64,
    /// Period of the IN-data producer, in milliseconds.
    #[serde(alias = "in_interval")]
    pub in_interval_ms: u64,
}

impl Default for DusbConfig {
    fn default() -> Self {
        Self {
            wakeup_interval_ms: DEFAULT_WAKEUP_INTERVAL_MS,
            in_interval_ms: DEFAULT_IN_INTERVAL_MS,
        }
    }
}

impl DusbConfig {
    /// Parses device properties from JSON, e.g. `{"wakeup_interval": 500}`. Missing fields keep
    /// their defaults.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.wakeup_interval_ms == 0 {
            return Err(ConfigError::ZeroInterval {
                field: "wakeup_interval",
            });
        }
        if self.in_interval_ms == 0 {
            return Err(ConfigError::ZeroInterval {
                field: "in_interval",
            });
        }
        Ok(())
    }
}
