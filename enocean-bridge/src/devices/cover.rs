//! Blinds actuators (D2-05-00).
//!
//! The host counts positions from closed (0) to open (100); the actuator
//! counts the other way, so positions are mirrored in both directions.

use log::debug;

use enocean_protocol::eep::FieldInput;
use enocean_protocol::{DeviceId, EepKey, ProtocolError, RadioPacket, Registry, Rorg};

use super::{Device, DeviceEvent};

const EEP: EepKey = EepKey::new(Rorg::Vld, 0x05, 0x00);

const CMD_GO_TO: u32 = 1;
const CMD_STOP: u32 = 2;
const CMD_QUERY: u32 = 3;
const CMD_REPLY: u32 = 4;

/// Raw position meaning "unknown".
const POSITION_UNKNOWN: u32 = 127;

pub struct Cover {
    id: DeviceId,
    name: String,
    sender: Option<DeviceId>,
    previous: Option<u8>,
    position: Option<u8>,
}

impl Cover {
    pub fn new(id: DeviceId, name: String, sender: Option<DeviceId>) -> Self {
        Self {
            id,
            name,
            sender,
            previous: None,
            position: None,
        }
    }

    /// Configured sender ID, if any. Callers fall back to the gateway base ID.
    pub fn sender(&self) -> Option<DeviceId> {
        self.sender
    }

    /// Last known position (100 = open).
    pub fn position(&self) -> Option<u8> {
        self.position
    }

    /// `None` unless two consecutive known positions differ.
    pub fn is_opening(&self) -> Option<bool> {
        self.movement().map(|(previous, current)| previous < current)
    }

    /// `None` unless two consecutive known positions differ.
    pub fn is_closing(&self) -> Option<bool> {
        self.movement().map(|(previous, current)| previous > current)
    }

    pub fn is_closed(&self) -> Option<bool> {
        self.position.map(|position| position == 0)
    }

    fn movement(&self) -> Option<(u8, u8)> {
        match (self.previous, self.position) {
            (Some(previous), Some(current)) if previous != current => Some((previous, current)),
            _ => None,
        }
    }

    fn command(
        &self,
        registry: &Registry,
        command: u32,
        values: &[(&str, FieldInput<'_>)],
        sender: DeviceId,
    ) -> Result<RadioPacket, ProtocolError> {
        let encoded = registry.encode(EEP, Some(command), values)?;
        RadioPacket::create(Rorg::Vld, &encoded.payload, sender, self.id)
    }

    /// Move to `position` percent (100 = open).
    pub fn set_position(
        &self,
        registry: &Registry,
        position: u8,
        sender: DeviceId,
    ) -> Result<RadioPacket, ProtocolError> {
        if position > 100 {
            return Err(ProtocolError::InvalidValue {
                field: "POS".to_string(),
                reason: format!("position {} above 100", position),
            });
        }
        let raw = 100 - position;
        debug!("{}: go to {}% (raw {})", self.name, position, raw);
        self.command(
            registry,
            CMD_GO_TO,
            &[("POS", FieldInput::Scaled(raw as f64))],
            sender,
        )
    }

    pub fn open(&self, registry: &Registry, sender: DeviceId) -> Result<RadioPacket, ProtocolError> {
        self.set_position(registry, 100, sender)
    }

    pub fn close(&self, registry: &Registry, sender: DeviceId) -> Result<RadioPacket, ProtocolError> {
        self.set_position(registry, 0, sender)
    }

    pub fn stop(&self, registry: &Registry, sender: DeviceId) -> Result<RadioPacket, ProtocolError> {
        self.command(registry, CMD_STOP, &[], sender)
    }

    pub fn query(&self, registry: &Registry, sender: DeviceId) -> Result<RadioPacket, ProtocolError> {
        self.command(registry, CMD_QUERY, &[], sender)
    }
}

impl Device for Cover {
    fn id(&self) -> DeviceId {
        self.id
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn eep(&self) -> EepKey {
        EEP
    }

    fn handle(
        &mut self,
        packet: &RadioPacket,
        registry: &Registry,
    ) -> Result<Option<DeviceEvent>, ProtocolError> {
        if packet.rorg() != Rorg::Vld {
            return Ok(None);
        }

        let decoded = registry.decode(EEP, packet.payload())?;
        if decoded.command != Some(CMD_REPLY) {
            return Ok(None);
        }

        let raw = decoded.raw("POS").unwrap_or(POSITION_UNKNOWN);
        if raw == POSITION_UNKNOWN || raw > 100 {
            debug!("{}: unknown position received ({})", self.name, raw);
            self.position = None;
            return Ok(Some(DeviceEvent::CoverPosition { position: None }));
        }

        let position = 100 - raw as u8;
        debug!("{}: position {}%", self.name, position);
        self.previous = self.position;
        self.position = Some(position);
        Ok(Some(DeviceEvent::CoverPosition {
            position: Some(position),
        }))
    }
}
