//! Fan-out of received packets to configured devices by sender ID.

use std::collections::HashMap;
use std::sync::Arc;

use log::{debug, info, warn};
use serde::Serialize;

use enocean_protocol::{DeviceId, Packet, Registry};

use crate::devices::{Device, DeviceEvent};

/// Event produced by a configured device.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Dispatched {
    pub device: DeviceId,
    pub name: String,
    pub event: DeviceEvent,
}

pub struct Dispatcher {
    registry: Arc<Registry>,
    devices: HashMap<DeviceId, Box<dyn Device>>,
}

impl Dispatcher {
    pub fn new(registry: Arc<Registry>) -> Self {
        Self {
            registry,
            devices: HashMap::new(),
        }
    }

    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    /// Add a device, replacing any device with the same ID.
    pub fn register(&mut self, device: Box<dyn Device>) -> Option<Box<dyn Device>> {
        debug!(
            "Registered device {} ({}, {})",
            device.id(),
            device.name(),
            device.eep()
        );
        let replaced = self.devices.insert(device.id(), device);
        if let Some(old) = &replaced {
            warn!("Device {} registered twice, replacing {}", old.id(), old.name());
        }
        replaced
    }

    pub fn len(&self) -> usize {
        self.devices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }

    pub fn device_mut(&mut self, id: DeviceId) -> Option<&mut (dyn Device + 'static)> {
        self.devices.get_mut(&id).map(|d| d.as_mut())
    }

    /// Hand a packet to the device that sent it.
    pub fn dispatch(&mut self, packet: &Packet) -> Option<Dispatched> {
        let radio = match packet {
            Packet::Radio(radio) => radio,
            Packet::Event(event) => {
                info!("Gateway event: {:?}", event.event);
                return None;
            }
            other => {
                debug!("Unhandled {:?} packet", other.packet_type());
                return None;
            }
        };

        let sender = radio.sender();
        let Some(device) = self.devices.get_mut(&sender) else {
            debug!("Telegram from unknown device {} (RORG {})", sender, radio.rorg());
            return None;
        };

        match device.handle(radio, &self.registry) {
            Ok(Some(event)) => Some(Dispatched {
                device: sender,
                name: device.name().to_string(),
                event,
            }),
            Ok(None) => None,
            Err(e) => {
                warn!("{}: cannot decode telegram: {}", device.name(), e);
                None
            }
        }
    }
}
