//! Error types for the EnOcean protocol layer.

use thiserror::Error;

use crate::eep::EepKey;

/// Framing-level errors raised while splitting the byte stream into frames.
///
/// These are always recoverable: the decoder drops the offending sync byte
/// and rescans the buffer.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FramingError {
    /// Header checksum does not match the 4 header bytes.
    #[error("Header CRC mismatch: computed 0x{computed:02X}, received 0x{received:02X}")]
    HeaderCrc { computed: u8, received: u8 },

    /// Data checksum does not match `data || optional_data`.
    #[error("Data CRC mismatch: computed 0x{computed:02X}, received 0x{received:02X}")]
    DataCrc { computed: u8, received: u8 },

    /// A section is too long to be described by the ESP3 header.
    #[error("Frame section too large: {0} bytes (max: {1})")]
    FrameTooLarge(usize, usize),
}

/// Errors raised by the packet model and the EEP codec.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ProtocolError {
    /// Frame could not be produced or validated.
    #[error("Framing error: {0}")]
    Framing(#[from] FramingError),

    /// Packet layout is inconsistent with its packet type or RORG.
    #[error("Invalid packet: {0}")]
    InvalidPacket(String),

    /// No codec is registered for the EEP.
    #[error("Unsupported EEP: {0}")]
    UnsupportedEep(EepKey),

    /// Payload length does not match any layout of the selected EEP.
    #[error("Payload length mismatch for {eep}: expected {expected:?} bytes, got {actual}")]
    PayloadLengthMismatch {
        eep: EepKey,
        expected: Vec<usize>,
        actual: usize,
    },

    /// Payload carries a command identifier the EEP does not define.
    #[error("Unsupported command {command} for {eep}")]
    UnsupportedCommand { eep: EepKey, command: u32 },

    /// Profile table is structurally invalid (rejected at registration).
    #[error("Invalid profile {eep}: {reason}")]
    InvalidProfile { eep: EepKey, reason: String },

    /// Field shortcut is not part of the selected layout.
    #[error("Unknown field '{field}' for {eep}")]
    UnknownField { eep: EepKey, field: String },

    /// Value cannot be encoded into the field.
    #[error("Invalid value for '{field}': {reason}")]
    InvalidValue { field: String, reason: String },
}

impl ProtocolError {
    /// Returns true if the error only affects the current packet and the
    /// caller can keep using the raw bytes.
    pub fn is_recoverable(&self) -> bool {
        !matches!(self, ProtocolError::InvalidProfile { .. })
    }
}
