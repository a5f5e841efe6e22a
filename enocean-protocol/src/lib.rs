//! EnOcean Serial Protocol 3 (ESP3) packet layer.
//!
//! This crate turns the byte stream of an EnOcean USB/serial gateway into
//! typed packets, and decodes radio payloads into named engineering values
//! through Equipment Profiles (EEP). It performs no I/O.
//!
//! # Frame Format
//!
//! ```text
//! +------+-------------+---------+------+-------+--------+----------+-------+
//! | Sync | Data length | Opt len | Type | CRC8H | Data   | Optional | CRC8D |
//! | 0x55 | u16 BE      | u8      | u8   |       | (n)    | (m)      |       |
//! +------+-------------+---------+------+-------+--------+----------+-------+
//! ```
//!
//! # Example
//!
//! ```rust
//! use enocean_protocol::{EepKey, FrameDecoder, Packet, Registry};
//!
//! let wire = [
//!     0x55, 0x00, 0x07, 0x07, 0x01, 0x7A, // header
//!     0xF6, 0x30, 0x01, 0x8A, 0x78, 0xBC, 0x30, // RPS telegram
//!     0x03, 0xFF, 0xFF, 0xFF, 0xFF, 0x2D, 0x00, // optional data
//!     0x6B,
//! ];
//!
//! let mut decoder = FrameDecoder::new();
//! decoder.push(&wire);
//! let frame = decoder.decode().unwrap();
//!
//! let packet = Packet::from_frame(&frame).unwrap();
//! let radio = packet.as_radio().unwrap();
//! assert_eq!(radio.sender().to_string(), "01:8A:78:BC");
//!
//! let registry = Registry::builtin().unwrap();
//! let key: EepKey = "F6-02-01".parse().unwrap();
//! let decoded = registry.decode(key, radio.payload()).unwrap();
//! assert_eq!(decoded.get("EB").unwrap().value.as_label(), Some("pressed"));
//! ```

pub mod bits;
pub mod crc8;
pub mod eep;
pub mod error;
pub mod frame;
pub mod packet;
pub mod types;

pub use bits::BitRange;
pub use crc8::crc8;
pub use eep::{
    ClampWarning, Decoded, DecodedField, EepKey, Encoded, FieldInput, FieldKind, FieldSpec,
    FieldValue, Layout, Profile, Registry, SetpointRaw, SetpointScale,
};
pub use error::{FramingError, ProtocolError};
pub use frame::{encode_frame, Frame, FrameDecoder, FrameHeader, FrameStats};
pub use packet::{CommonCommandPacket, EventPacket, Packet, RadioPacket, ResponsePacket};
pub use types::{
    CommonCommandCode, DeviceId, EventCode, PacketType, ReturnCode, Rorg, FRAME_OVERHEAD,
    HEADER_SIZE, SYNC_BYTE,
};
