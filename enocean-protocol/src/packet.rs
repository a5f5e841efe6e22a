//! Typed view of ESP3 frames.

use bytes::Bytes;
use serde::Serialize;

use crate::error::ProtocolError;
use crate::frame::Frame;
use crate::types::*;

/// Sub-telegram count used for outgoing telegrams.
pub const DEFAULT_SUB_TEL_NUM: u8 = 3;

/// dBm placeholder used for outgoing telegrams.
pub const DEFAULT_SEND_DBM: u8 = 0xFF;

/// Bytes of an ERP1 data section outside the payload: RORG, sender (4), status.
const RADIO_ENVELOPE: usize = 1 + 4 + 1;

/// Learn bit in the last payload byte of 1BS and 4BS telegrams (clear = learn).
const LEARN_BIT: u8 = 0x08;

/// A decoded ESP3 packet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Packet {
    Radio(RadioPacket),
    Response(ResponsePacket),
    Event(EventPacket),
    CommonCommand(CommonCommandPacket),
    Other {
        packet_type: PacketType,
        data: Vec<u8>,
        optional: Vec<u8>,
    },
}

impl Packet {
    /// Classify a frame by packet type.
    pub fn from_frame(frame: &Frame) -> Result<Self, ProtocolError> {
        match frame.packet_type {
            PacketType::RadioErp1 => {
                RadioPacket::from_data(&frame.data, &frame.optional).map(Packet::Radio)
            }
            PacketType::Response => {
                ResponsePacket::from_data(&frame.data, &frame.optional).map(Packet::Response)
            }
            PacketType::Event => {
                EventPacket::from_data(&frame.data, &frame.optional).map(Packet::Event)
            }
            PacketType::CommonCommand => {
                CommonCommandPacket::from_data(&frame.data, &frame.optional)
                    .map(Packet::CommonCommand)
            }
            packet_type => Ok(Packet::Other {
                packet_type,
                data: frame.data.to_vec(),
                optional: frame.optional.to_vec(),
            }),
        }
    }

    /// Build a packet from raw sections, as a frame with these sections
    /// would be decoded.
    pub fn from_parts(
        packet_type: PacketType,
        data: Vec<u8>,
        optional: Vec<u8>,
    ) -> Result<Self, ProtocolError> {
        let frame = Frame::new(packet_type, data, optional)?;
        Self::from_frame(&frame)
    }

    /// Packet type of this packet.
    pub fn packet_type(&self) -> PacketType {
        match self {
            Packet::Radio(_) => PacketType::RadioErp1,
            Packet::Response(_) => PacketType::Response,
            Packet::Event(_) => PacketType::Event,
            Packet::CommonCommand(_) => PacketType::CommonCommand,
            Packet::Other { packet_type, .. } => *packet_type,
        }
    }

    /// Render the data and optional sections.
    pub fn to_sections(&self) -> (Vec<u8>, Vec<u8>) {
        match self {
            Packet::Radio(p) => (p.to_data(), p.optional.clone()),
            Packet::Response(p) => {
                let mut data = vec![u8::from(p.return_code)];
                data.extend_from_slice(&p.data);
                (data, p.optional.clone())
            }
            Packet::Event(p) => {
                let mut data = vec![u8::from(p.event)];
                data.extend_from_slice(&p.data);
                (data, p.optional.clone())
            }
            Packet::CommonCommand(p) => {
                let mut data = vec![u8::from(p.code)];
                data.extend_from_slice(&p.data);
                (data, p.optional.clone())
            }
            Packet::Other { data, optional, .. } => (data.clone(), optional.clone()),
        }
    }

    /// Build the frame for this packet.
    pub fn to_frame(&self) -> Result<Frame, ProtocolError> {
        let (data, optional) = self.to_sections();
        Ok(Frame::new(self.packet_type(), data, optional)?)
    }

    /// Serialize to wire bytes.
    pub fn encode(&self) -> Result<Bytes, ProtocolError> {
        Ok(self.to_frame()?.encode())
    }

    /// Radio telegram, if this is one.
    pub fn as_radio(&self) -> Option<&RadioPacket> {
        match self {
            Packet::Radio(p) => Some(p),
            _ => None,
        }
    }
}

impl From<RadioPacket> for Packet {
    fn from(p: RadioPacket) -> Self {
        Packet::Radio(p)
    }
}

impl From<CommonCommandPacket> for Packet {
    fn from(p: CommonCommandPacket) -> Self {
        Packet::CommonCommand(p)
    }
}

/// ERP1 radio telegram.
///
/// Data layout: `[rorg] + payload + sender(4) + [status]`. Optional data, when
/// present, is `[sub_tel_num] + destination(4) + [dBm] + [security_level]`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RadioPacket {
    rorg: Rorg,
    payload: Vec<u8>,
    sender: DeviceId,
    status: u8,
    optional: Vec<u8>,
}

impl RadioPacket {
    /// Parse the data and optional sections of an ERP1 frame.
    pub fn from_data(data: &[u8], optional: &[u8]) -> Result<Self, ProtocolError> {
        if data.len() < RADIO_ENVELOPE + 1 {
            return Err(ProtocolError::InvalidPacket(format!(
                "radio telegram too short: {} bytes",
                data.len()
            )));
        }

        let rorg = Rorg::from(data[0]);
        let status_pos = data.len() - 1;
        let sender_pos = status_pos - 4;
        let payload = &data[1..sender_pos];

        check_payload_len(rorg, payload.len())?;

        Ok(Self {
            rorg,
            payload: payload.to_vec(),
            sender: DeviceId::from_bytes([
                data[sender_pos],
                data[sender_pos + 1],
                data[sender_pos + 2],
                data[sender_pos + 3],
            ]),
            status: data[status_pos],
            optional: optional.to_vec(),
        })
    }

    /// Build an outgoing telegram.
    ///
    /// Short payloads of fixed-size RORGs are right-padded with zeros; payloads
    /// longer than the RORG allows are rejected. Optional data addresses
    /// `destination`. 1BS/4BS telegrams are marked as data telegrams; use
    /// [`with_learn`](Self::with_learn) to send a teach-in.
    pub fn create(
        rorg: Rorg,
        payload: &[u8],
        sender: DeviceId,
        destination: DeviceId,
    ) -> Result<Self, ProtocolError> {
        let mut payload = payload.to_vec();
        if let Some(fixed) = rorg.fixed_payload_len() {
            if payload.len() < fixed {
                payload.resize(fixed, 0);
            }
        }
        check_payload_len(rorg, payload.len())?;

        let mut optional = Vec::with_capacity(7);
        optional.push(DEFAULT_SUB_TEL_NUM);
        optional.extend_from_slice(&destination.to_bytes());
        optional.push(DEFAULT_SEND_DBM);
        optional.push(0x00);

        Ok(Self {
            rorg,
            payload,
            sender,
            status: 0x00,
            optional,
        }
        .with_learn(false))
    }

    /// Same telegram with a different status byte.
    pub fn with_status(mut self, status: u8) -> Self {
        self.status = status;
        self
    }

    /// Same telegram without optional data.
    pub fn without_optional(mut self) -> Self {
        self.optional.clear();
        self
    }

    /// Same telegram with the 1BS/4BS learn bit set or cleared.
    ///
    /// Other RORGs are returned unchanged.
    pub fn with_learn(mut self, learn: bool) -> Self {
        if matches!(self.rorg, Rorg::Bs1 | Rorg::Bs4) {
            if let Some(db0) = self.payload.last_mut() {
                if learn {
                    *db0 &= !LEARN_BIT;
                } else {
                    *db0 |= LEARN_BIT;
                }
            }
        }
        self
    }

    /// Render the data section.
    pub fn to_data(&self) -> Vec<u8> {
        let mut data = Vec::with_capacity(RADIO_ENVELOPE + self.payload.len());
        data.push(u8::from(self.rorg));
        data.extend_from_slice(&self.payload);
        data.extend_from_slice(&self.sender.to_bytes());
        data.push(self.status);
        data
    }

    pub fn rorg(&self) -> Rorg {
        self.rorg
    }

    /// RORG-specific data bytes between the RORG byte and the sender.
    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    pub fn sender(&self) -> DeviceId {
        self.sender
    }

    pub fn status(&self) -> u8 {
        self.status
    }

    pub fn optional(&self) -> &[u8] {
        &self.optional
    }

    /// Repeater hop count (low nibble of the status byte).
    pub fn repeater_count(&self) -> u8 {
        self.status & 0x0F
    }

    /// T21 flag of RPS telegrams (status bit 5).
    pub fn t21(&self) -> bool {
        self.status & 0x20 != 0
    }

    /// NU flag of RPS telegrams (status bit 4).
    pub fn nu(&self) -> bool {
        self.status & 0x10 != 0
    }

    /// Returns true for 1BS/4BS teach-in telegrams.
    pub fn is_learn(&self) -> bool {
        match self.rorg {
            Rorg::Bs1 | Rorg::Bs4 => self
                .payload
                .last()
                .map(|db0| db0 & LEARN_BIT == 0)
                .unwrap_or(false),
            _ => false,
        }
    }

    /// Number of sub-telegrams received (optional byte 0).
    pub fn sub_telegram_count(&self) -> Option<u8> {
        self.optional.first().copied()
    }

    /// Destination address (optional bytes 1..5).
    pub fn destination(&self) -> Option<DeviceId> {
        self.optional.get(1..5).and_then(DeviceId::from_slice)
    }

    /// Received signal strength in dBm (optional byte 5, negated).
    pub fn dbm(&self) -> Option<i16> {
        self.optional.get(5).map(|&v| -(v as i16))
    }

    /// Security level (optional byte 6).
    pub fn security_level(&self) -> Option<u8> {
        self.optional.get(6).copied()
    }
}

fn check_payload_len(rorg: Rorg, len: usize) -> Result<(), ProtocolError> {
    if len == 0 {
        return Err(ProtocolError::InvalidPacket(format!(
            "empty payload for RORG {}",
            rorg
        )));
    }

    match rorg.fixed_payload_len() {
        Some(fixed) if fixed != len => Err(ProtocolError::InvalidPacket(format!(
            "RORG {} expects {} payload bytes, got {}",
            rorg, fixed, len
        ))),
        _ if len > rorg.max_payload_len() => Err(ProtocolError::InvalidPacket(format!(
            "RORG {} allows at most {} payload bytes, got {}",
            rorg,
            rorg.max_payload_len(),
            len
        ))),
        _ => Ok(()),
    }
}

/// Response to a command sent to the module.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResponsePacket {
    pub return_code: ReturnCode,
    /// Response data following the return code.
    pub data: Vec<u8>,
    pub optional: Vec<u8>,
}

impl ResponsePacket {
    pub fn from_data(data: &[u8], optional: &[u8]) -> Result<Self, ProtocolError> {
        let (&code, rest) = data
            .split_first()
            .ok_or_else(|| ProtocolError::InvalidPacket("empty response".to_string()))?;
        Ok(Self {
            return_code: ReturnCode::from(code),
            data: rest.to_vec(),
            optional: optional.to_vec(),
        })
    }

    /// Base ID carried by a successful `CO_RD_IDBASE` response.
    pub fn base_id(&self) -> Option<DeviceId> {
        if !self.return_code.is_ok() {
            return None;
        }
        self.data.get(0..4).and_then(DeviceId::from_slice)
    }
}

/// Event reported by the module.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EventPacket {
    pub event: EventCode,
    pub data: Vec<u8>,
    pub optional: Vec<u8>,
}

impl EventPacket {
    pub fn from_data(data: &[u8], optional: &[u8]) -> Result<Self, ProtocolError> {
        let (&code, rest) = data
            .split_first()
            .ok_or_else(|| ProtocolError::InvalidPacket("empty event".to_string()))?;
        Ok(Self {
            event: EventCode::from(code),
            data: rest.to_vec(),
            optional: optional.to_vec(),
        })
    }
}

/// Common command sent from the host to the module.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CommonCommandPacket {
    pub code: CommonCommandCode,
    pub data: Vec<u8>,
    pub optional: Vec<u8>,
}

impl CommonCommandPacket {
    pub fn new(code: CommonCommandCode) -> Self {
        Self {
            code,
            data: Vec::new(),
            optional: Vec::new(),
        }
    }

    /// `CO_RD_IDBASE`: ask the module for its base ID.
    pub fn read_id_base() -> Self {
        Self::new(CommonCommandCode::ReadIdBase)
    }

    /// `CO_RD_VERSION`: ask the module for its firmware versions.
    pub fn read_version() -> Self {
        Self::new(CommonCommandCode::ReadVersion)
    }

    /// `CO_WR_RESET`: software reset.
    pub fn reset() -> Self {
        Self::new(CommonCommandCode::WriteReset)
    }

    pub fn from_data(data: &[u8], optional: &[u8]) -> Result<Self, ProtocolError> {
        let (&code, rest) = data
            .split_first()
            .ok_or_else(|| ProtocolError::InvalidPacket("empty common command".to_string()))?;
        Ok(Self {
            code: CommonCommandCode::from(code),
            data: rest.to_vec(),
            optional: optional.to_vec(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::FrameDecoder;

    fn roundtrip(packet: &Packet) -> Packet {
        let bytes = packet.encode().unwrap();
        let mut decoder = FrameDecoder::new();
        decoder.push(&bytes);
        let frame = decoder.decode().expect("should decode frame");
        Packet::from_frame(&frame).unwrap()
    }

    #[test]
    fn test_parse_rps_telegram() {
        let data = [0xF6, 0x30, 0x01, 0x8A, 0x78, 0xBC, 0x30];
        let optional = [0x03, 0xFF, 0xFF, 0xFF, 0xFF, 0x2D, 0x00];
        let packet = RadioPacket::from_data(&data, &optional).unwrap();

        assert_eq!(packet.rorg(), Rorg::Rps);
        assert_eq!(packet.payload(), &[0x30]);
        assert_eq!(packet.sender(), DeviceId(0x018A78BC));
        assert_eq!(packet.status(), 0x30);
        assert!(packet.t21());
        assert!(packet.nu());
        assert_eq!(packet.repeater_count(), 0);
        assert_eq!(packet.sub_telegram_count(), Some(3));
        assert_eq!(packet.destination(), Some(DeviceId::BROADCAST));
        assert_eq!(packet.dbm(), Some(-45));
        assert_eq!(packet.security_level(), Some(0));
        assert!(!packet.is_learn());
        assert_eq!(packet.to_data(), data.to_vec());
    }

    #[test]
    fn test_parse_4bs_learn_bit() {
        let data = [0xA5, 0x00, 0x00, 0x55, 0x08, 0x01, 0x81, 0xB7, 0x44, 0x00];
        let packet = RadioPacket::from_data(&data, &[]).unwrap();
        assert_eq!(packet.rorg(), Rorg::Bs4);
        assert_eq!(packet.payload(), &[0x00, 0x00, 0x55, 0x08]);
        assert!(!packet.is_learn());

        let teach_in = [0xA5, 0x08, 0x28, 0x46, 0x80, 0x01, 0x81, 0xB7, 0x44, 0x00];
        let packet = RadioPacket::from_data(&teach_in, &[]).unwrap();
        assert!(packet.is_learn());
    }

    #[test]
    fn test_invalid_payload_length() {
        // 4BS with only 3 payload bytes
        let data = [0xA5, 0x00, 0x00, 0x55, 0x01, 0x81, 0xB7, 0x44, 0x00];
        assert!(matches!(
            RadioPacket::from_data(&data, &[]),
            Err(ProtocolError::InvalidPacket(_))
        ));

        // Too short to hold sender and status
        assert!(RadioPacket::from_data(&[0xF6, 0x00, 0x00], &[]).is_err());

        let too_long = [0u8; 5];
        assert!(matches!(
            RadioPacket::create(Rorg::Bs4, &too_long, DeviceId(1), DeviceId::BROADCAST),
            Err(ProtocolError::InvalidPacket(_))
        ));
        assert!(RadioPacket::create(Rorg::Vld, &[0u8; 15], DeviceId(1), DeviceId::BROADCAST).is_err());
        assert!(RadioPacket::create(Rorg::Vld, &[], DeviceId(1), DeviceId::BROADCAST).is_err());
    }

    #[test]
    fn test_create_pads_and_addresses() {
        let sender = DeviceId(0xFF801201);
        let destination = DeviceId(0x05123456);
        let packet = RadioPacket::create(Rorg::Bs4, &[0x00, 0x1F], sender, destination).unwrap();

        assert_eq!(packet.payload(), &[0x00, 0x1F, 0x00, 0x08]);
        assert!(!packet.is_learn());
        assert_eq!(
            packet.optional(),
            &[0x03, 0x05, 0x12, 0x34, 0x56, 0xFF, 0x00]
        );
        assert_eq!(packet.destination(), Some(destination));
        assert_eq!(
            packet.to_data(),
            vec![0xA5, 0x00, 0x1F, 0x00, 0x08, 0xFF, 0x80, 0x12, 0x01, 0x00]
        );

        let teach_in = packet.with_learn(true);
        assert_eq!(teach_in.payload()[3], 0x00);
        assert!(teach_in.is_learn());

        let bs1 = RadioPacket::create(Rorg::Bs1, &[0x01], sender, destination).unwrap();
        assert_eq!(bs1.payload(), &[0x09]);
        assert!(!bs1.is_learn());
    }

    #[test]
    fn test_roundtrip_all_radio_rorgs() {
        let sender = DeviceId(0x018A78BC);
        let cases: [(Rorg, &[u8]); 4] = [
            (Rorg::Rps, &[0x50][..]),
            (Rorg::Bs1, &[0x09][..]),
            (Rorg::Bs4, &[0x00, 0x1F, 0x80, 0x08][..]),
            (Rorg::Vld, &[0x00, 0x00, 0x00, 0x01][..]),
        ];

        for (rorg, payload) in cases {
            let packet: Packet = RadioPacket::create(rorg, payload, sender, DeviceId::BROADCAST)
                .unwrap()
                .with_status(0x30)
                .into();
            assert_eq!(roundtrip(&packet), packet, "roundtrip failed for {:?}", rorg);

            let bare: Packet = RadioPacket::create(rorg, payload, sender, DeviceId::BROADCAST)
                .unwrap()
                .without_optional()
                .into();
            assert_eq!(roundtrip(&bare), bare);
        }
    }

    #[test]
    fn test_response_base_id() {
        let packet =
            Packet::from_parts(PacketType::Response, vec![0x00, 0xFF, 0x87, 0xCA, 0x80], vec![0x0A])
                .unwrap();
        match &packet {
            Packet::Response(resp) => {
                assert!(resp.return_code.is_ok());
                assert_eq!(resp.base_id(), Some(DeviceId(0xFF87CA80)));
                assert_eq!(resp.optional, vec![0x0A]);
            }
            other => panic!("unexpected packet {:?}", other),
        }
        assert_eq!(roundtrip(&packet), packet);

        let failed = ResponsePacket::from_data(&[0x02], &[]).unwrap();
        assert_eq!(failed.return_code, ReturnCode::NotSupported);
        assert_eq!(failed.base_id(), None);
    }

    #[test]
    fn test_event_and_common_command() {
        let event = Packet::from_parts(PacketType::Event, vec![0x04, 0x00], vec![]).unwrap();
        assert!(matches!(
            &event,
            Packet::Event(EventPacket { event: EventCode::CoReady, .. })
        ));

        let cmd: Packet = CommonCommandPacket::read_id_base().into();
        assert_eq!(
            &cmd.encode().unwrap()[..],
            &[0x55, 0x00, 0x01, 0x00, 0x05, 0x70, 0x08, 0x38]
        );
        assert_eq!(roundtrip(&cmd), cmd);
    }

    #[test]
    fn test_other_packet_types_kept_raw() {
        let packet =
            Packet::from_parts(PacketType::SmartAckCommand, vec![0x01, 0x02], vec![0x03]).unwrap();
        assert_eq!(packet.packet_type(), PacketType::SmartAckCommand);
        assert_eq!(packet.to_sections(), (vec![0x01, 0x02], vec![0x03]));
        assert_eq!(roundtrip(&packet), packet);
    }

    #[test]
    fn test_empty_response_rejected() {
        assert!(Packet::from_parts(PacketType::Response, vec![], vec![]).is_err());
    }
}
