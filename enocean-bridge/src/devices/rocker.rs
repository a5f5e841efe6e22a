//! Rocker switches (F6-02-xx).

use log::debug;
use serde::Serialize;

use enocean_protocol::{DeviceId, EepKey, ProtocolError, RadioPacket, Registry, Rorg};

use super::{Device, DeviceEvent};

/// Button press or release.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ButtonEvent {
    /// `Some(true)` pressed, `Some(false)` released, `None` if the status
    /// byte says neither.
    pub pressed: Option<bool>,
    /// Rocker: 0 = A, 1 = B, 10 = both. `None` for other action codes.
    pub which: Option<u8>,
    /// 0 = upper (on) side, 1 = lower (off) side.
    pub onoff: Option<u8>,
    /// Repeater hop count.
    pub repeated: u8,
    /// Raw action byte.
    pub action: u8,
}

impl ButtonEvent {
    pub fn from_packet(packet: &RadioPacket) -> Option<Self> {
        if packet.rorg() != Rorg::Rps {
            return None;
        }
        let action = *packet.payload().first()?;
        let status = packet.status();

        let pressed = match status >> 4 {
            3 => Some(true),
            2 => Some(false),
            _ => None,
        };

        let (which, onoff) = match action {
            0x70 => (Some(0), Some(0)),
            0x50 => (Some(0), Some(1)),
            0x30 => (Some(1), Some(0)),
            0x10 => (Some(1), Some(1)),
            0x37 => (Some(10), Some(0)),
            0x15 => (Some(10), Some(1)),
            _ => (None, None),
        };

        Some(Self {
            pressed,
            which,
            onoff,
            repeated: packet.repeater_count(),
            action,
        })
    }
}

pub struct RockerSwitch {
    id: DeviceId,
    name: String,
    eep: EepKey,
    last: Option<ButtonEvent>,
}

impl RockerSwitch {
    pub fn new(id: DeviceId, name: String, eep: EepKey) -> Self {
        Self {
            id,
            name,
            eep,
            last: None,
        }
    }

    pub fn is_on(&self) -> Option<bool> {
        self.last.and_then(|e| e.pressed)
    }
}

impl Device for RockerSwitch {
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
        let Some(event) = ButtonEvent::from_packet(packet) else {
            debug!("{}: ignoring RORG {}", self.name, packet.rorg());
            return Ok(None);
        };

        // Validates the payload against the profile.
        registry.decode(self.eep, packet.payload())?;

        self.last = Some(event);
        Ok(Some(DeviceEvent::Button(event)))
    }
}
