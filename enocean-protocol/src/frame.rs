//! ESP3 frame encoding and decoding.
//!
//! Frame format:
//! ```text
//! +------+--------+--------+--------+------+------+----------+----------+------+
//! | Sync | Data length     | Opt len| Type | CRC8H| Data     | Optional | CRC8D|
//! | 0x55 | u16 BE          | u8     | u8   |      | (n)      | (m)      |      |
//! +------+--------+--------+--------+------+------+----------+----------+------+
//! ```
//!
//! `CRC8H` covers the 4 header bytes, `CRC8D` covers data and optional data.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use log::{debug, trace, warn};

use crate::crc8::{crc8, crc8_chain};
use crate::error::FramingError;
use crate::types::*;

/// Initial capacity of the decoder buffer.
const DECODER_CAPACITY: usize = 512;

/// Parsed ESP3 header (the 4 bytes between sync and header CRC).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    pub data_length: u16,
    pub optional_length: u8,
    pub packet_type: u8,
}

impl FrameHeader {
    fn parse(bytes: &[u8]) -> Self {
        Self {
            data_length: u16::from_be_bytes([bytes[0], bytes[1]]),
            optional_length: bytes[2],
            packet_type: bytes[3],
        }
    }

    /// Header bytes as they appear on the wire.
    pub fn to_bytes(self) -> [u8; HEADER_SIZE] {
        let len = self.data_length.to_be_bytes();
        [len[0], len[1], self.optional_length, self.packet_type]
    }

    /// Number of bytes following the header CRC (data, optional data, data CRC).
    fn body_len(self) -> usize {
        self.data_length as usize + self.optional_length as usize + 1
    }
}

/// A well-formed ESP3 frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub packet_type: PacketType,
    pub data: Bytes,
    pub optional: Bytes,
}

impl Frame {
    /// Build a frame, checking that both sections fit in the header.
    pub fn new(
        packet_type: PacketType,
        data: impl Into<Bytes>,
        optional: impl Into<Bytes>,
    ) -> Result<Self, FramingError> {
        let data = data.into();
        let optional = optional.into();

        if data.len() > MAX_DATA_LENGTH {
            return Err(FramingError::FrameTooLarge(data.len(), MAX_DATA_LENGTH));
        }
        if optional.len() > MAX_OPTIONAL_LENGTH {
            return Err(FramingError::FrameTooLarge(optional.len(), MAX_OPTIONAL_LENGTH));
        }

        Ok(Self {
            packet_type,
            data,
            optional,
        })
    }

    /// Header describing this frame.
    pub fn header(&self) -> FrameHeader {
        FrameHeader {
            data_length: self.data.len() as u16,
            optional_length: self.optional.len() as u8,
            packet_type: self.packet_type.into(),
        }
    }

    /// CRC8 over the 4 header bytes.
    pub fn header_crc(&self) -> u8 {
        crc8(&self.header().to_bytes())
    }

    /// CRC8 over `data || optional`.
    pub fn data_crc(&self) -> u8 {
        crc8_chain(&[&self.data[..], &self.optional[..]])
    }

    /// Total size on the wire.
    pub fn wire_len(&self) -> usize {
        FRAME_OVERHEAD + self.data.len() + self.optional.len()
    }

    /// Serialize to wire bytes.
    pub fn encode(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(self.wire_len());
        buf.put_u8(SYNC_BYTE);
        buf.put_slice(&self.header().to_bytes());
        buf.put_u8(self.header_crc());
        buf.put_slice(&self.data);
        buf.put_slice(&self.optional);
        buf.put_u8(self.data_crc());
        buf.freeze()
    }
}

/// Serialize a packet type and its sections into wire bytes.
pub fn encode_frame(
    packet_type: PacketType,
    data: &[u8],
    optional: &[u8],
) -> Result<Bytes, FramingError> {
    let frame = Frame::new(
        packet_type,
        Bytes::copy_from_slice(data),
        Bytes::copy_from_slice(optional),
    )?;
    Ok(frame.encode())
}

/// Decoder counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FrameStats {
    /// Frames emitted.
    pub frames: u64,
    /// Bytes discarded while looking for a sync byte.
    pub sync_errors: u64,
    /// Candidate frames dropped because of a header CRC mismatch.
    pub header_crc_errors: u64,
    /// Candidate frames dropped because of a data CRC mismatch.
    pub data_crc_errors: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DecodeState {
    /// Looking for a sync byte at the head of the buffer.
    SeekSync,
    /// Buffer starts with a sync byte; waiting for header and header CRC.
    ReadHeader,
    /// Header validated; waiting for data, optional data and data CRC.
    ReadBody(FrameHeader),
}

/// Incremental ESP3 frame decoder.
///
/// Bytes are appended with [`push`](Self::push) as they arrive from the
/// transport and frames are pulled with [`decode`](Self::decode). Garbage
/// and corrupted frames are skipped; the decoder never gives up on the
/// stream.
#[derive(Debug)]
pub struct FrameDecoder {
    buffer: BytesMut,
    state: DecodeState,
    stats: FrameStats,
}

impl Default for FrameDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameDecoder {
    /// Create a new decoder.
    pub fn new() -> Self {
        Self {
            buffer: BytesMut::with_capacity(DECODER_CAPACITY),
            state: DecodeState::SeekSync,
            stats: FrameStats::default(),
        }
    }

    /// Append received bytes.
    pub fn push(&mut self, data: &[u8]) {
        self.buffer.extend_from_slice(data);
    }

    /// Try to decode the next complete frame.
    ///
    /// Returns `None` when more bytes are needed. Call repeatedly until it
    /// returns `None` to drain every frame already buffered.
    pub fn decode(&mut self) -> Option<Frame> {
        loop {
            match self.state {
                DecodeState::SeekSync => {
                    match self.buffer.iter().position(|&b| b == SYNC_BYTE) {
                        Some(pos) => {
                            if pos > 0 {
                                debug!("Discarding {} bytes before sync", pos);
                                self.stats.sync_errors += pos as u64;
                                self.buffer.advance(pos);
                            }
                            self.state = DecodeState::ReadHeader;
                        }
                        None => {
                            if !self.buffer.is_empty() {
                                debug!("Discarding {} bytes without sync", self.buffer.len());
                                self.stats.sync_errors += self.buffer.len() as u64;
                                self.buffer.clear();
                            }
                            return None;
                        }
                    }
                }
                DecodeState::ReadHeader => {
                    if self.buffer.len() < 1 + HEADER_SIZE + 1 {
                        return None;
                    }

                    let computed = crc8(&self.buffer[1..1 + HEADER_SIZE]);
                    let received = self.buffer[1 + HEADER_SIZE];
                    if computed != received {
                        let err = FramingError::HeaderCrc { computed, received };
                        warn!("{}, resyncing", err);
                        self.stats.header_crc_errors += 1;
                        self.resync();
                        continue;
                    }

                    let header = FrameHeader::parse(&self.buffer[1..1 + HEADER_SIZE]);
                    trace!("Header: {:?}", header);
                    self.state = DecodeState::ReadBody(header);
                }
                DecodeState::ReadBody(header) => {
                    let body_start = 1 + HEADER_SIZE + 1;
                    if self.buffer.len() < body_start + header.body_len() {
                        return None;
                    }

                    let data_len = header.data_length as usize;
                    let opt_len = header.optional_length as usize;
                    let crc_pos = body_start + data_len + opt_len;

                    let computed = crc8(&self.buffer[body_start..crc_pos]);
                    let received = self.buffer[crc_pos];
                    if computed != received {
                        let err = FramingError::DataCrc { computed, received };
                        warn!("{}, resyncing", err);
                        self.stats.data_crc_errors += 1;
                        self.resync();
                        continue;
                    }

                    let mut raw = self.buffer.split_to(crc_pos + 1);
                    raw.advance(body_start);
                    let data = raw.split_to(data_len).freeze();
                    let optional = raw.split_to(opt_len).freeze();

                    self.stats.frames += 1;
                    self.state = DecodeState::SeekSync;

                    return Some(Frame {
                        packet_type: PacketType::from(header.packet_type),
                        data,
                        optional,
                    });
                }
            }
        }
    }

    /// Drop the sync byte of the current candidate and search again.
    fn resync(&mut self) {
        self.buffer.advance(1);
        self.state = DecodeState::SeekSync;
    }

    /// Decoder counters.
    pub fn stats(&self) -> FrameStats {
        self.stats
    }

    /// Number of buffered bytes not yet consumed.
    pub fn buffered_len(&self) -> usize {
        self.buffer.len()
    }

    /// Drop any partial frame and start over from sync search.
    pub fn reset(&mut self) {
        self.buffer.clear();
        self.state = DecodeState::SeekSync;
    }
}
