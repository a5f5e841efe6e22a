//! Identifier and constant definitions for the ESP3 protocol.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Sync byte that starts every ESP3 frame.
pub const SYNC_BYTE: u8 = 0x55;

/// Header size after the sync byte: data length (2), optional length (1), type (1).
pub const HEADER_SIZE: usize = 4;

/// Bytes of framing around data and optional data: sync, header, header CRC, data CRC.
pub const FRAME_OVERHEAD: usize = 1 + HEADER_SIZE + 1 + 1;

/// Maximum data length expressible in the header.
pub const MAX_DATA_LENGTH: usize = u16::MAX as usize;

/// Maximum optional data length expressible in the header.
pub const MAX_OPTIONAL_LENGTH: usize = u8::MAX as usize;

/// ESP3 packet types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PacketType {
    /// ERP1 radio telegram.
    RadioErp1,
    /// Response to a command.
    Response,
    /// Radio sub-telegram.
    RadioSubTel,
    /// Event from the module.
    Event,
    /// Common command (host to module).
    CommonCommand,
    /// Smart Ack command.
    SmartAckCommand,
    /// Remote management command.
    RemoteManCommand,
    /// Radio message.
    RadioMessage,
    /// ERP2 radio telegram.
    RadioErp2,
    /// 802.15.4 raw packet.
    Radio802_15_4,
    /// 2.4 GHz command.
    Command2_4,
    /// Reserved or vendor-specific type.
    Unknown(u8),
}

impl From<u8> for PacketType {
    fn from(value: u8) -> Self {
        match value {
            0x01 => PacketType::RadioErp1,
            0x02 => PacketType::Response,
            0x03 => PacketType::RadioSubTel,
            0x04 => PacketType::Event,
            0x05 => PacketType::CommonCommand,
            0x06 => PacketType::SmartAckCommand,
            0x07 => PacketType::RemoteManCommand,
            0x09 => PacketType::RadioMessage,
            0x0A => PacketType::RadioErp2,
            0x10 => PacketType::Radio802_15_4,
            0x11 => PacketType::Command2_4,
            other => PacketType::Unknown(other),
        }
    }
}

impl From<PacketType> for u8 {
    fn from(value: PacketType) -> Self {
        match value {
            PacketType::RadioErp1 => 0x01,
            PacketType::Response => 0x02,
            PacketType::RadioSubTel => 0x03,
            PacketType::Event => 0x04,
            PacketType::CommonCommand => 0x05,
            PacketType::SmartAckCommand => 0x06,
            PacketType::RemoteManCommand => 0x07,
            PacketType::RadioMessage => 0x09,
            PacketType::RadioErp2 => 0x0A,
            PacketType::Radio802_15_4 => 0x10,
            PacketType::Command2_4 => 0x11,
            PacketType::Unknown(other) => other,
        }
    }
}

/// Radio telegram organization (first data byte of an ERP1 telegram).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Rorg {
    /// Repeated switch communication.
    Rps,
    /// 1 byte communication.
    Bs1,
    /// 4 byte communication.
    Bs4,
    /// Variable length data.
    Vld,
    /// Manufacturer specific communication.
    Msc,
    /// Addressing destination telegram.
    Adt,
    /// Smart Ack learn request.
    SmLrnReq,
    /// Smart Ack learn answer.
    SmLrnAns,
    /// Smart Ack reclaim.
    SmRec,
    /// Remote management.
    SysEx,
    /// Secure telegram.
    Sec,
    /// Secure telegram with encapsulation.
    SecEncaps,
    /// Universal teach-in.
    Ute,
    /// Unassigned value.
    Unknown(u8),
}

impl From<u8> for Rorg {
    fn from(value: u8) -> Self {
        match value {
            0xF6 => Rorg::Rps,
            0xD5 => Rorg::Bs1,
            0xA5 => Rorg::Bs4,
            0xD2 => Rorg::Vld,
            0xD1 => Rorg::Msc,
            0xA6 => Rorg::Adt,
            0xC6 => Rorg::SmLrnReq,
            0xC7 => Rorg::SmLrnAns,
            0xA7 => Rorg::SmRec,
            0xC5 => Rorg::SysEx,
            0x30 => Rorg::Sec,
            0x31 => Rorg::SecEncaps,
            0xD4 => Rorg::Ute,
            other => Rorg::Unknown(other),
        }
    }
}

impl From<Rorg> for u8 {
    fn from(value: Rorg) -> Self {
        match value {
            Rorg::Rps => 0xF6,
            Rorg::Bs1 => 0xD5,
            Rorg::Bs4 => 0xA5,
            Rorg::Vld => 0xD2,
            Rorg::Msc => 0xD1,
            Rorg::Adt => 0xA6,
            Rorg::SmLrnReq => 0xC6,
            Rorg::SmLrnAns => 0xC7,
            Rorg::SmRec => 0xA7,
            Rorg::SysEx => 0xC5,
            Rorg::Sec => 0x30,
            Rorg::SecEncaps => 0x31,
            Rorg::Ute => 0xD4,
            Rorg::Unknown(other) => other,
        }
    }
}

impl Rorg {
    /// Fixed payload length for this RORG, if it has one.
    pub fn fixed_payload_len(self) -> Option<usize> {
        match self {
            Rorg::Rps | Rorg::Bs1 => Some(1),
            Rorg::Bs4 => Some(4),
            _ => None,
        }
    }

    /// Maximum payload length accepted when building a telegram.
    pub fn max_payload_len(self) -> usize {
        match self.fixed_payload_len() {
            Some(len) => len,
            None if self == Rorg::Vld => 14,
            None => MAX_DATA_LENGTH - 6,
        }
    }
}

impl fmt::Display for Rorg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02X}", u8::from(*self))
    }
}

/// Return code carried in the first byte of a response packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReturnCode {
    Ok,
    Error,
    NotSupported,
    WrongParam,
    OperationDenied,
    Unknown(u8),
}

impl From<u8> for ReturnCode {
    fn from(value: u8) -> Self {
        match value {
            0x00 => ReturnCode::Ok,
            0x01 => ReturnCode::Error,
            0x02 => ReturnCode::NotSupported,
            0x03 => ReturnCode::WrongParam,
            0x04 => ReturnCode::OperationDenied,
            other => ReturnCode::Unknown(other),
        }
    }
}

impl From<ReturnCode> for u8 {
    fn from(value: ReturnCode) -> Self {
        match value {
            ReturnCode::Ok => 0x00,
            ReturnCode::Error => 0x01,
            ReturnCode::NotSupported => 0x02,
            ReturnCode::WrongParam => 0x03,
            ReturnCode::OperationDenied => 0x04,
            ReturnCode::Unknown(other) => other,
        }
    }
}

impl ReturnCode {
    /// Returns true if this return code indicates success.
    pub fn is_ok(self) -> bool {
        self == ReturnCode::Ok
    }
}

/// Event code carried in the first byte of an event packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EventCode {
    SaReclaimNotSuccessful,
    SaConfirmLearn,
    SaLearnAck,
    CoReady,
    CoEventSecureDevices,
    Unknown(u8),
}

impl From<u8> for EventCode {
    fn from(value: u8) -> Self {
        match value {
            0x01 => EventCode::SaReclaimNotSuccessful,
            0x02 => EventCode::SaConfirmLearn,
            0x03 => EventCode::SaLearnAck,
            0x04 => EventCode::CoReady,
            0x05 => EventCode::CoEventSecureDevices,
            other => EventCode::Unknown(other),
        }
    }
}

impl From<EventCode> for u8 {
    fn from(value: EventCode) -> Self {
        match value {
            EventCode::SaReclaimNotSuccessful => 0x01,
            EventCode::SaConfirmLearn => 0x02,
            EventCode::SaLearnAck => 0x03,
            EventCode::CoReady => 0x04,
            EventCode::CoEventSecureDevices => 0x05,
            EventCode::Unknown(other) => other,
        }
    }
}

/// Common command codes sent from the host to the module.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CommonCommandCode {
    /// Software reset of the module.
    WriteReset,
    /// Read application and API version.
    ReadVersion,
    /// Read the base ID range of the module.
    ReadIdBase,
    Other(u8),
}

impl From<u8> for CommonCommandCode {
    fn from(value: u8) -> Self {
        match value {
            0x02 => CommonCommandCode::WriteReset,
            0x03 => CommonCommandCode::ReadVersion,
            0x08 => CommonCommandCode::ReadIdBase,
            other => CommonCommandCode::Other(other),
        }
    }
}

impl From<CommonCommandCode> for u8 {
    fn from(value: CommonCommandCode) -> Self {
        match value {
            CommonCommandCode::WriteReset => 0x02,
            CommonCommandCode::ReadVersion => 0x03,
            CommonCommandCode::ReadIdBase => 0x08,
            CommonCommandCode::Other(other) => other,
        }
    }
}

/// 32-bit EnOcean device address (sender or destination).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DeviceId(pub u32);

impl DeviceId {
    /// Broadcast destination address.
    pub const BROADCAST: DeviceId = DeviceId(0xFFFF_FFFF);

    /// Build from 4 big-endian bytes.
    pub fn from_bytes(bytes: [u8; 4]) -> Self {
        DeviceId(u32::from_be_bytes(bytes))
    }

    /// Build from a slice that must be exactly 4 bytes long.
    pub fn from_slice(bytes: &[u8]) -> Option<Self> {
        let arr: [u8; 4] = bytes.try_into().ok()?;
        Some(Self::from_bytes(arr))
    }

    /// Big-endian byte representation.
    pub fn to_bytes(self) -> [u8; 4] {
        self.0.to_be_bytes()
    }

    /// Returns true for the broadcast address.
    pub fn is_broadcast(self) -> bool {
        self == Self::BROADCAST
    }
}

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let b = self.to_bytes();
        write!(f, "{:02X}:{:02X}:{:02X}:{:02X}", b[0], b[1], b[2], b[3])
    }
}

impl From<[u8; 4]> for DeviceId {
    fn from(bytes: [u8; 4]) -> Self {
        DeviceId::from_bytes(bytes)
    }
}

/// Error returned when a device ID string cannot be parsed.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Invalid device ID: {0}")]
pub struct ParseDeviceIdError(pub String);

impl FromStr for DeviceId {
    type Err = ParseDeviceIdError;

    /// Accepts `01:8A:78:BC`, `01-8A-78-BC`, `018A78BC` and `0x018A78BC`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        let hex: String = trimmed
            .strip_prefix("0x")
            .or_else(|| trimmed.strip_prefix("0X"))
            .unwrap_or(trimmed)
            .chars()
            .filter(|c| *c != ':' && *c != '-')
            .collect();

        if hex.is_empty() || hex.len() > 8 {
            return Err(ParseDeviceIdError(s.to_string()));
        }

        u32::from_str_radix(&hex, 16)
            .map(DeviceId)
            .map_err(|_| ParseDeviceIdError(s.to_string()))
    }
}

impl Serialize for DeviceId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for DeviceId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}
