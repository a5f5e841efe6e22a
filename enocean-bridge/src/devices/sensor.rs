//! Generic sensors: decode every telegram with the configured profile.

use log::info;

use enocean_protocol::{DeviceId, EepKey, ProtocolError, RadioPacket, Registry};

use super::{Device, DeviceEvent};

pub struct Sensor {
    id: DeviceId,
    name: String,
    eep: EepKey,
}

impl Sensor {
    pub fn new(id: DeviceId, name: String, eep: EepKey) -> Self {
        Self { id, name, eep }
    }
}

impl Device for Sensor {
    fn id(&self) -> DeviceId {
        self.id
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn eep(&self) -> EepKey {
        self.eep
    }

    fn handle(
        &mut self,
        packet: &RadioPacket,
        registry: &Registry,
    ) -> Result<Option<DeviceEvent>, ProtocolError> {
        if packet.rorg() != self.eep.rorg {
            return Ok(None);
        }
        if packet.is_learn() {
            info!("{}: teach-in telegram", self.name);
            return Ok(None);
        }
        let decoded = registry.decode(self.eep, packet.payload())?;
        Ok(Some(DeviceEvent::Sensor(decoded)))
    }
}
