//! Device helpers: turn radio telegrams of one configured device into
//! events, and build the commands it understands.

mod climate;
mod cover;
mod rocker;
mod sensor;

pub use climate::{Thermostat, DEFAULT_BASE, DEFAULT_TOLERANCE, MAX_TEMP};
pub use cover::Cover;
pub use rocker::{ButtonEvent, RockerSwitch};
pub use sensor::Sensor;

use serde::Serialize;

use enocean_protocol::{Decoded, DeviceId, EepKey, ProtocolError, RadioPacket, Registry};

use crate::config::{ConfigError, DeviceConfig, DeviceKind};

/// State change reported by a device.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DeviceEvent {
    Button(ButtonEvent),
    /// Cover position in percent (100 = open); `None` when the actuator does
    /// not know it.
    CoverPosition { position: Option<u8> },
    Climate {
        set_point: f64,
        temperature: f64,
    },
    Sensor(Decoded),
}

/// A configured device.
pub trait Device: Send {
    fn id(&self) -> DeviceId;

    fn name(&self) -> &str;

    fn eep(&self) -> EepKey;

    /// Process a telegram sent by this device.
    fn handle(
        &mut self,
        packet: &RadioPacket,
        registry: &Registry,
    ) -> Result<Option<DeviceEvent>, ProtocolError>;

    /// Sender ID configured for commands to this device.
    fn command_sender(&self) -> Option<DeviceId> {
        None
    }

    /// Returns true if handling a telegram queued a command.
    fn has_command(&self) -> bool {
        false
    }

    /// Build the queued command, if any, sent as `sender`.
    fn take_command(&mut self, _sender: DeviceId) -> Result<Option<RadioPacket>, ProtocolError> {
        Ok(None)
    }
}

/// Build the helper for a configured device.
pub fn from_config(config: &DeviceConfig, registry: &Registry) -> Result<Box<dyn Device>, ConfigError> {
    if !registry.contains(config.eep) {
        return Err(ConfigError::Invalid(format!(
            "device {}: unsupported EEP {}",
            config.id, config.eep
        )));
    }

    let name = config.display_name();
    let require_family = |rorg_func: &str| -> Result<(), ConfigError> {
        let actual = format!("{}-{:02X}", config.eep.rorg, config.eep.func);
        if actual == rorg_func {
            Ok(())
        } else {
            Err(ConfigError::Invalid(format!(
                "device {}: {:?} needs a {}-xx profile, got {}",
                config.id, config.kind, rorg_func, config.eep
            )))
        }
    };

    let device: Box<dyn Device> = match config.kind {
        DeviceKind::Rocker => {
            require_family("F6-02")?;
            Box::new(RockerSwitch::new(config.id, name, config.eep))
        }
        DeviceKind::Cover => {
            require_family("D2-05")?;
            Box::new(Cover::new(config.id, name, config.sender))
        }
        DeviceKind::Climate => {
            require_family("A5-10")?;
            Box::new(thermostat(config, name))
        }
        DeviceKind::Sensor => Box::new(Sensor::new(config.id, name, config.eep)),
    };
    Ok(device)
}

/// Thermostat helper for a climate device entry.
pub fn thermostat(config: &DeviceConfig, name: String) -> Thermostat {
    Thermostat::new(
        config.id,
        name,
        config.sender,
        config.base.unwrap_or(DEFAULT_BASE),
        config
            .setpoint_range
            .unwrap_or(enocean_protocol::eep::DEFAULT_REPORT_RANGE),
    )
    .with_tolerance(config.tolerance.unwrap_or(DEFAULT_TOLERANCE))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn device_config(kind: DeviceKind, eep: &str) -> DeviceConfig {
        DeviceConfig {
            id: DeviceId(0x01020304),
            name: Some("Test".to_string()),
            eep: eep.parse().unwrap(),
            kind,
            sender: None,
            base: None,
            setpoint_range: None,
            tolerance: None,
        }
    }

    #[test]
    fn test_from_config() {
        let registry = Registry::builtin().unwrap();

        let rocker = from_config(&device_config(DeviceKind::Rocker, "F6-02-01"), &registry).unwrap();
        assert_eq!(rocker.name(), "Test");
        assert_eq!(rocker.id(), DeviceId(0x01020304));

        let sensor = from_config(&device_config(DeviceKind::Sensor, "A5-04-01"), &registry).unwrap();
        assert_eq!(sensor.eep().to_string(), "A5-04-01");

        assert!(from_config(&device_config(DeviceKind::Cover, "F6-02-01"), &registry).is_err());
        assert!(from_config(&device_config(DeviceKind::Sensor, "A5-99-01"), &registry).is_err());

        let climate = from_config(&device_config(DeviceKind::Climate, "A5-10-03"), &registry).unwrap();
        assert!(!climate.has_command());
        assert_eq!(climate.command_sender(), None);
    }

    #[test]
    fn test_thermostat_from_config() {
        let mut config = device_config(DeviceKind::Climate, "A5-10-03");
        config.base = Some(21.0);
        config.tolerance = Some(0.2);
        let thermostat = thermostat(&config, config.display_name());
        assert_eq!(thermostat.min_temp(), 11.0);
        assert_eq!(thermostat.max_temp(), MAX_TEMP);
    }
}
