//! config.rs
//!
//! Widget configuration. One implementation covers both rendering variants
//! the device dashboard has shipped; they differ only in the formatting and
//! defaulting policies and in whether the connectivity flag is shown.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::reading::DefaultingPolicy;
use crate::render::Formatting;

pub const DEFAULT_PATH: &str = "/get_data";
pub const DEFAULT_INTERVAL: Duration = Duration::from_millis(5000);
pub const DEFAULT_FRESHNESS_WINDOW: Duration = Duration::from_secs(5);

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse config file: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Ids of the elements the widget writes into.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ElementIds {
    pub heart_rate: String,
    pub spo2: String,
    pub temperature: String,
    pub connection_status: String,
}

impl Default for ElementIds {
    fn default() -> Self {
        Self {
            heart_rate: "heart_rate".to_string(),
            spo2: "spo2".to_string(),
            temperature: "temperature".to_string(),
            connection_status: "connection_status".to_string(),
        }
    }
}

impl ElementIds {
    /// The elements every render cycle requires.
    pub fn required(&self) -> [&str; 3] {
        [
            self.heart_rate.as_str(),
            self.spo2.as_str(),
            self.temperature.as_str(),
        ]
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WidgetConfig {
    /// Scheme and authority of the device web server.
    pub base_url: String,
    /// Path of the reading endpoint.
    pub path: String,
    #[serde(rename = "interval_ms", with = "millis")]
    pub interval: Duration,
    pub formatting: Formatting,
    pub defaulting: DefaultingPolicy,
    pub show_connection_status: bool,
    /// A reading younger than this counts as live.
    #[serde(rename = "freshness_window_ms", with = "millis")]
    pub freshness_window: Duration,
    /// Run the first cycle at start instead of one interval later.
    pub fire_immediately: bool,
    #[serde(rename = "request_timeout_ms", with = "opt_millis")]
    pub request_timeout: Option<Duration>,
    pub elements: ElementIds,
}

impl Default for WidgetConfig {
    fn default() -> Self {
        Self::unit_suffixed()
    }
}

impl WidgetConfig {
    /// Values with units, nullish defaulting, connectivity flag shown.
    pub fn unit_suffixed() -> Self {
        Self {
            base_url: "http://127.0.0.1:5000".to_string(),
            path: DEFAULT_PATH.to_string(),
            interval: DEFAULT_INTERVAL,
            formatting: Formatting::UnitSuffixed,
            defaulting: DefaultingPolicy::Nullish,
            show_connection_status: true,
            freshness_window: DEFAULT_FRESHNESS_WINDOW,
            fire_immediately: false,
            request_timeout: None,
            elements: ElementIds::default(),
        }
    }

    /// Bare numbers, falsy defaulting, no connectivity flag.
    pub fn raw() -> Self {
        Self {
            formatting: Formatting::Raw,
            defaulting: DefaultingPolicy::Falsy,
            show_connection_status: false,
            ..Self::unit_suffixed()
        }
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        let config: WidgetConfig = serde_json::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.interval.is_zero() {
            return Err(ConfigError::Invalid("interval_ms must be greater than zero".into()));
        }
        if self.base_url.is_empty() {
            return Err(ConfigError::Invalid("base_url must not be empty".into()));
        }
        if !self.path.starts_with('/') {
            return Err(ConfigError::Invalid(format!(
                "path `{}` must start with `/`",
                self.path
            )));
        }
        let ids = self.elements.required();
        if ids.iter().any(|id| id.is_empty()) {
            return Err(ConfigError::Invalid("element ids must not be empty".into()));
        }
        if ids[0] == ids[1] || ids[0] == ids[2] || ids[1] == ids[2] {
            return Err(ConfigError::Invalid("element ids must be distinct".into()));
        }
        Ok(())
    }
}

mod millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}

mod opt_millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(
        value: &Option<Duration>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        match value {
            Some(d) => serializer.serialize_some(&(d.as_millis() as u64)),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<Duration>, D::Error> {
        Option::<u64>::deserialize(deserializer).map(|ms| ms.map(Duration::from_millis))
    }
}
