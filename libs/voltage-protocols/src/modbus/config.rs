//! Bridge configuration
//!
//! Loaded from YAML, TOML or JSON files through figment. Environment
//! variables override file values, e.g. `EDGE_CYCLE_TIME_MS=500`.

use std::path::Path;
use std::time::Duration;

use figment::{
    providers::{Env, Format, Json, Toml, Yaml},
    Figment,
};
use serde::{Deserialize, Serialize};
use voltage_comlink::error::{ComLinkError, Result};

use super::worker::{LogVerbosity, WorkerSettings};

/// Prefix of environment overrides
pub const ENV_PREFIX: &str = "EDGE_";

/// Physical link of a bridge
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum LinkConfig {
    Tcp {
        host: String,
        #[serde(default = "default_tcp_port")]
        port: u16,
    },
    Serial {
        device: String,
        #[serde(default = "default_baud_rate")]
        baud_rate: u32,
        #[serde(default = "default_data_bits")]
        data_bits: u8,
        #[serde(default = "default_stop_bits")]
        stop_bits: u8,
        /// "None", "Even" or "Odd"
        #[serde(default = "default_parity")]
        parity: String,
    },
}

impl LinkConfig {
    pub fn validate(&self) -> Result<()> {
        match self {
            LinkConfig::Tcp { host, port } => {
                if host.trim().is_empty() {
                    return Err(ComLinkError::config("TCP host is empty"));
                }
                if *port == 0 {
                    return Err(ComLinkError::config("TCP port must not be 0"));
                }
            },
            LinkConfig::Serial {
                device,
                baud_rate,
                data_bits,
                stop_bits,
                parity,
            } => {
                if device.trim().is_empty() {
                    return Err(ComLinkError::config("serial device is empty"));
                }
                if *baud_rate == 0 {
                    return Err(ComLinkError::config("baud rate must not be 0"));
                }
                if !(5..=8).contains(data_bits) {
                    return Err(ComLinkError::config(format!("invalid data bits: {data_bits}")));
                }
                if !(1..=2).contains(stop_bits) {
                    return Err(ComLinkError::config(format!("invalid stop bits: {stop_bits}")));
                }
                if !matches!(parity.as_str(), "None" | "Even" | "Odd") {
                    return Err(ComLinkError::config(format!("invalid parity: {parity}")));
                }
            },
        }
        Ok(())
    }
}

impl std::fmt::Display for LinkConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LinkConfig::Tcp { host, port } => write!(f, "tcp://{host}:{port}"),
            LinkConfig::Serial { device, baud_rate, .. } => write!(f, "{device}@{baud_rate}"),
        }
    }
}

/// One bridge: a link, its timing and the worker settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BridgeConfig {
    pub name: String,
    pub link: LinkConfig,
    /// Response timeout per request
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    /// Additional attempts after a failed transaction
    #[serde(default = "default_retries")]
    pub retries: u32,
    /// Consecutive read failures before element channels lose their values
    #[serde(default = "default_invalidate_after")]
    pub invalidate_elements_after_read_errors: u32,
    #[serde(default)]
    pub log_verbosity: LogVerbosity,
}

impl BridgeConfig {
    pub fn tcp(name: impl Into<String>, host: impl Into<String>, port: u16) -> Self {
        Self {
            name: name.into(),
            link: LinkConfig::Tcp {
                host: host.into(),
                port,
            },
            timeout_ms: default_timeout_ms(),
            retries: default_retries(),
            invalidate_elements_after_read_errors: default_invalidate_after(),
            log_verbosity: LogVerbosity::default(),
        }
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Worker settings for a runtime ticking every `cycle_time`
    pub fn worker_settings(&self, cycle_time: Duration) -> WorkerSettings {
        WorkerSettings {
            cycle_time,
            invalidate_elements_after_read_errors: self.invalidate_elements_after_read_errors,
            log_verbosity: self.log_verbosity,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(ComLinkError::config("bridge name is empty"));
        }
        if self.timeout_ms == 0 {
            return Err(ComLinkError::config(format!("{}: timeout_ms must not be 0", self.name)));
        }
        self.link
            .validate()
            .map_err(|e| ComLinkError::config(format!("{}: {e}", self.name)))
    }
}

fn default_tcp_port() -> u16 {
    502
}

fn default_baud_rate() -> u32 {
    9600
}

fn default_data_bits() -> u8 {
    8
}

fn default_stop_bits() -> u8 {
    1
}

fn default_parity() -> String {
    "None".to_string()
}

fn default_timeout_ms() -> u64 {
    1000
}

fn default_retries() -> u32 {
    1
}

fn default_invalidate_after() -> u32 {
    1
}

/// Load a configuration file, format chosen by extension
///
/// Values from `EDGE_`-prefixed environment variables take precedence;
/// nested keys are separated by `__`.
pub fn load_config_from_file<T, P>(path: P) -> Result<T>
where
    T: for<'de> Deserialize<'de>,
    P: AsRef<Path>,
{
    let path = path.as_ref();
    let extension = path
        .extension()
        .and_then(|s| s.to_str())
        .ok_or_else(|| ComLinkError::config("Config file must have an extension"))?;

    let figment = match extension {
        "toml" => Figment::new().merge(Toml::file(path)),
        "yaml" | "yml" => Figment::new().merge(Yaml::file(path)),
        "json" => Figment::new().merge(Json::file(path)),
        _ => {
            return Err(ComLinkError::config(format!(
                "Unsupported config file format: {extension}"
            )))
        },
    };

    figment
        .merge(Env::prefixed(ENV_PREFIX).split("__"))
        .extract()
        .map_err(|e| ComLinkError::config(format!("Failed to load {}: {e}", path.display())))
}
