//! Configuration loading for the bridge.
//!
//! Configuration is read from a TOML file:
//!
//! ```toml
//! [transport]
//! kind = "serial"
//! path = "/dev/ttyUSB0"
//! baud_rate = 57600
//!
//! [logging]
//! log_dir = "logs"
//! retention_days = 7
//!
//! [[devices]]
//! id = "01:8A:78:BC"
//! name = "Hall switch"
//! eep = "F6-02-01"
//! kind = "rocker"
//! ```
//!
//! When no transport is configured, the following environment variables are
//! used:
//! - `ENOCEAN_SERIAL_PORT`: serial device path
//! - `ENOCEAN_TCP_ADDRESS`: `host:port` of a network gateway

use std::collections::HashSet;
use std::path::Path;
use std::time::Duration;

use log::debug;
use serde::Deserialize;
use thiserror::Error;

use enocean_protocol::{DeviceId, EepKey};

use crate::transport::{
    SerialTransport, TcpTransport, Transport, DEFAULT_BAUD_RATE, DEFAULT_READ_TIMEOUT,
};

/// Default configuration file looked up in the working directory.
pub const DEFAULT_CONFIG_FILE: &str = "enocean-bridge.toml";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid config: {0}")]
    Invalid(String),
}

/// Configuration file format.
#[derive(Debug, Deserialize, Default)]
pub struct ConfigFile {
    #[serde(default)]
    pub transport: TransportSection,
    #[serde(default)]
    pub logging: LoggingSection,
    #[serde(default)]
    pub devices: Vec<DeviceConfig>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportKind {
    Serial,
    Tcp,
}

#[derive(Debug, Deserialize, Default)]
pub struct TransportSection {
    pub kind: Option<TransportKind>,
    pub path: Option<String>,
    pub baud_rate: Option<u32>,
    pub address: Option<String>,
    pub read_timeout_ms: Option<u64>,
}

#[derive(Debug, Deserialize, Default)]
pub struct LoggingSection {
    pub log_dir: Option<String>,
    pub retention_days: Option<u64>,
    pub level: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceKind {
    Rocker,
    Cover,
    Climate,
    Sensor,
}

/// One configured device.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct DeviceConfig {
    pub id: DeviceId,
    pub name: Option<String>,
    pub eep: EepKey,
    pub kind: DeviceKind,
    /// Sender ID used for commands; the gateway base ID when absent.
    pub sender: Option<DeviceId>,
    /// Set point base temperature (climate).
    pub base: Option<f64>,
    /// Range of reported set points (climate).
    pub setpoint_range: Option<f64>,
    /// Set point drift that triggers a resend, in kelvin (climate).
    pub tolerance: Option<f64>,
}

impl DeviceConfig {
    pub fn display_name(&self) -> String {
        self.name.clone().unwrap_or_else(|| self.id.to_string())
    }

    /// Returns true if `key` is this device's ID or name.
    pub fn matches(&self, key: &str) -> bool {
        if self.name.as_deref() == Some(key) {
            return true;
        }
        key.parse::<DeviceId>().map(|id| id == self.id).unwrap_or(false)
    }
}

/// Resolved transport settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportSettings {
    Serial {
        path: String,
        baud_rate: u32,
        read_timeout: Duration,
    },
    Tcp {
        address: String,
        read_timeout: Duration,
    },
}

impl TransportSettings {
    /// Build an unopened transport.
    pub fn build(&self) -> Box<dyn Transport> {
        match self {
            TransportSettings::Serial {
                path,
                baud_rate,
                read_timeout,
            } => Box::new(SerialTransport::new(path.clone(), *baud_rate, *read_timeout)),
            TransportSettings::Tcp {
                address,
                read_timeout,
            } => Box::new(TcpTransport::new(address.clone(), *read_timeout)),
        }
    }
}

/// Load configuration from a TOML file.
pub fn load_config(path: &Path) -> Result<ConfigFile, ConfigError> {
    let contents = std::fs::read_to_string(path)?;
    let config = parse_config(&contents)?;
    debug!(
        "Configuration loaded from {}: {} devices",
        path.display(),
        config.devices.len()
    );
    Ok(config)
}

/// Parse and validate configuration text.
pub fn parse_config(contents: &str) -> Result<ConfigFile, ConfigError> {
    let config: ConfigFile = toml::from_str(contents)?;
    config.validate()?;
    Ok(config)
}

impl ConfigFile {
    fn validate(&self) -> Result<(), ConfigError> {
        let mut seen = HashSet::new();
        for device in &self.devices {
            if !seen.insert(device.id) {
                return Err(ConfigError::Invalid(format!(
                    "duplicate device ID {}",
                    device.id
                )));
            }
            if let Some(range) = device.setpoint_range {
                if !(range.is_finite() && range > 0.0) {
                    return Err(ConfigError::Invalid(format!(
                        "device {}: setpoint_range must be positive",
                        device.id
                    )));
                }
            }
            if let Some(tolerance) = device.tolerance {
                if !(tolerance.is_finite() && tolerance >= 0.0) {
                    return Err(ConfigError::Invalid(format!(
                        "device {}: tolerance must not be negative",
                        device.id
                    )));
                }
            }
        }
        Ok(())
    }

    /// Find a device by ID or name.
    pub fn device(&self, key: &str) -> Option<&DeviceConfig> {
        self.devices.iter().find(|d| d.matches(key))
    }

    /// Resolve the transport: command line overrides, then the file, then
    /// the environment.
    pub fn transport_settings(
        &self,
        serial_override: Option<&str>,
        tcp_override: Option<&str>,
    ) -> Result<TransportSettings, ConfigError> {
        let section = &self.transport;
        let read_timeout = section
            .read_timeout_ms
            .map(Duration::from_millis)
            .unwrap_or(DEFAULT_READ_TIMEOUT);
        let serial = |path: String| TransportSettings::Serial {
            path,
            baud_rate: section.baud_rate.unwrap_or(DEFAULT_BAUD_RATE),
            read_timeout,
        };
        let tcp = |address: String| TransportSettings::Tcp {
            address,
            read_timeout,
        };

        if let Some(path) = serial_override {
            return Ok(serial(path.to_string()));
        }
        if let Some(address) = tcp_override {
            return Ok(tcp(address.to_string()));
        }

        match section.kind {
            Some(TransportKind::Serial) => section
                .path
                .clone()
                .map(serial)
                .ok_or_else(|| ConfigError::Invalid("serial transport needs a path".to_string())),
            Some(TransportKind::Tcp) => section
                .address
                .clone()
                .map(tcp)
                .ok_or_else(|| ConfigError::Invalid("tcp transport needs an address".to_string())),
            None => {
                if let Some(path) = section.path.clone() {
                    return Ok(serial(path));
                }
                if let Some(address) = section.address.clone() {
                    return Ok(tcp(address));
                }
                transport_from_env(read_timeout, section.baud_rate)
            }
        }
    }
}

fn transport_from_env(
    read_timeout: Duration,
    baud_rate: Option<u32>,
) -> Result<TransportSettings, ConfigError> {
    if let Ok(path) = std::env::var("ENOCEAN_SERIAL_PORT") {
        debug!("Using serial port from environment: {}", path);
        return Ok(TransportSettings::Serial {
            path,
            baud_rate: baud_rate.unwrap_or(DEFAULT_BAUD_RATE),
            read_timeout,
        });
    }
    if let Ok(address) = std::env::var("ENOCEAN_TCP_ADDRESS") {
        debug!("Using TCP gateway from environment: {}", address);
        return Ok(TransportSettings::Tcp {
            address,
            read_timeout,
        });
    }
    Err(ConfigError::Invalid(
        "no transport configured (use --serial, --tcp or a [transport] section)".to_string(),
    ))
}
