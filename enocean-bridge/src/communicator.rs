//! Gateway communicator.
//!
//! Owns a transport, runs the read loop on a dedicated thread and serializes
//! writes. Decoded packets are handed to the consumer in wire order through a
//! bounded channel. Response packets are routed to a pending [`request`]
//! instead, if there is one.
//!
//! [`request`]: Communicator::request

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use log::{debug, error, info, trace, warn};
use parking_lot::Mutex;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};

use enocean_protocol::{
    CommonCommandPacket, DeviceId, FrameDecoder, FrameStats, Packet, ProtocolError,
    ResponsePacket, ReturnCode,
};

use crate::transport::{Transport, TransportError};

/// Communicator errors.
#[derive(Error, Debug)]
pub enum CommunicatorError {
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("No response within {0:?}")]
    Timeout(Duration),

    #[error("Communicator closed")]
    Closed,

    #[error("Command rejected: {0:?}")]
    Rejected(ReturnCode),
}

/// Communicator configuration.
#[derive(Debug, Clone)]
pub struct CommunicatorConfig {
    /// Capacity of the packet channel to the consumer.
    pub channel_capacity: usize,
    /// Default timeout of [`Communicator::request`].
    pub request_timeout: Duration,
}

impl Default for CommunicatorConfig {
    fn default() -> Self {
        Self {
            channel_capacity: 64,
            request_timeout: Duration::from_millis(500),
        }
    }
}

type PendingResponse = Arc<Mutex<Option<oneshot::Sender<ResponsePacket>>>>;

/// Connection to one gateway.
pub struct Communicator {
    config: CommunicatorConfig,
    writer: Mutex<Box<dyn Transport>>,
    pending: PendingResponse,
    /// Only one request may wait for a response at a time.
    request_lock: tokio::sync::Mutex<()>,
    running: Arc<AtomicBool>,
    reader: Mutex<Option<JoinHandle<Result<(), TransportError>>>>,
    stats: Arc<Mutex<FrameStats>>,
    base_id: Mutex<Option<DeviceId>>,
    endpoint: String,
}

impl Communicator {
    /// Open the transport and start the read loop.
    ///
    /// Returns the communicator and the receiver of decoded packets. The
    /// receiver yields `None` once the read loop has ended.
    pub fn start(
        mut transport: Box<dyn Transport>,
        config: CommunicatorConfig,
    ) -> Result<(Self, mpsc::Receiver<Packet>), CommunicatorError> {
        transport.open()?;
        let reader_transport = transport.try_clone()?;
        let endpoint = transport.describe();

        let (packet_tx, packet_rx) = mpsc::channel(config.channel_capacity.max(1));
        let pending: PendingResponse = Arc::new(Mutex::new(None));
        let running = Arc::new(AtomicBool::new(true));
        let stats = Arc::new(Mutex::new(FrameStats::default()));

        let read_loop = ReadLoop {
            transport: reader_transport,
            packets: packet_tx,
            pending: Arc::clone(&pending),
            running: Arc::clone(&running),
            stats: Arc::clone(&stats),
        };
        let reader = std::thread::Builder::new()
            .name("enocean-reader".to_string())
            .spawn(move || read_loop.run())
            .map_err(TransportError::Io)?;

        info!("Communicator started on {}", endpoint);

        Ok((
            Self {
                config,
                writer: Mutex::new(transport),
                pending,
                request_lock: tokio::sync::Mutex::new(()),
                running,
                reader: Mutex::new(Some(reader)),
                stats,
                base_id: Mutex::new(None),
                endpoint,
            },
            packet_rx,
        ))
    }

    /// Returns true while the read loop is running.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Frame decoder counters of the read loop.
    pub fn stats(&self) -> FrameStats {
        *self.stats.lock()
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Encode and write a packet.
    pub fn send(&self, packet: &Packet) -> Result<(), CommunicatorError> {
        let bytes = packet.encode()?;
        self.send_raw(&bytes)
    }

    /// Write pre-encoded frame bytes.
    pub fn send_raw(&self, bytes: &[u8]) -> Result<(), CommunicatorError> {
        if !self.is_running() {
            return Err(CommunicatorError::Closed);
        }
        trace!("TX {} bytes: {:02X?}", bytes.len(), bytes);
        self.writer.lock().write(bytes)?;
        Ok(())
    }

    /// Send a command and wait for the module's response.
    pub async fn request(
        &self,
        packet: &Packet,
        timeout: Duration,
    ) -> Result<ResponsePacket, CommunicatorError> {
        let _guard = self.request_lock.lock().await;

        let (tx, rx) = oneshot::channel();
        *self.pending.lock() = Some(tx);

        if let Err(e) = self.send(packet) {
            self.pending.lock().take();
            return Err(e);
        }

        match tokio::time::timeout(timeout, rx).await {
            Ok(Ok(response)) => {
                debug!("Response: {:?}", response.return_code);
                Ok(response)
            }
            Ok(Err(_)) => Err(CommunicatorError::Closed),
            Err(_) => {
                self.pending.lock().take();
                warn!("No response from {} within {:?}", self.endpoint, timeout);
                Err(CommunicatorError::Timeout(timeout))
            }
        }
    }

    /// Read the module's base ID (`CO_RD_IDBASE`). The result is cached.
    pub async fn base_id(&self) -> Result<DeviceId, CommunicatorError> {
        if let Some(id) = *self.base_id.lock() {
            return Ok(id);
        }

        let command: Packet = CommonCommandPacket::read_id_base().into();
        let response = self.request(&command, self.config.request_timeout).await?;
        if !response.return_code.is_ok() {
            return Err(CommunicatorError::Rejected(response.return_code));
        }

        let id = response.base_id().ok_or_else(|| {
            ProtocolError::InvalidPacket(format!(
                "base ID response too short: {} bytes",
                response.data.len()
            ))
        })?;
        info!("Gateway base ID: {}", id);
        *self.base_id.lock() = Some(id);
        Ok(id)
    }

    /// Stop the read loop and close the transport.
    ///
    /// Returns the read loop's result: `Ok` for a clean stop, the transport
    /// error that ended it otherwise.
    pub fn shutdown(&self) -> Result<(), TransportError> {
        self.running.store(false, Ordering::SeqCst);
        self.writer.lock().close();
        self.pending.lock().take();

        match self.reader.lock().take() {
            Some(handle) => handle.join().unwrap_or_else(|_| {
                error!("Read loop panicked");
                Err(TransportError::Closed)
            }),
            None => Ok(()),
        }
    }
}

impl Drop for Communicator {
    fn drop(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        self.writer.lock().close();
    }
}

/// Keep `packets` drained in a background task.
///
/// The read loop blocks while the packet channel is full, which also holds
/// back the responses [`Communicator::request`] waits for. One-shot callers
/// that only care about a few packets hand the receiver over here: packets
/// accepted by `keep` are forwarded, everything else is dropped.
pub fn drain_packets<F>(
    mut packets: mpsc::Receiver<Packet>,
    keep: F,
) -> mpsc::UnboundedReceiver<Packet>
where
    F: Fn(&Packet) -> bool + Send + 'static,
{
    let (tx, rx) = mpsc::unbounded_channel();
    tokio::spawn(async move {
        while let Some(packet) = packets.recv().await {
            if keep(&packet) {
                if tx.send(packet).is_err() {
                    break;
                }
            } else {
                trace!("Ignoring {:?} packet", packet.packet_type());
            }
        }
    });
    rx
}

struct ReadLoop {
    transport: Box<dyn Transport>,
    packets: mpsc::Sender<Packet>,
    pending: PendingResponse,
    running: Arc<AtomicBool>,
    stats: Arc<Mutex<FrameStats>>,
}

impl ReadLoop {
    fn run(mut self) -> Result<(), TransportError> {
        let result = self.read_frames();
        self.running.store(false, Ordering::SeqCst);
        // Wake a pending request instead of letting it time out.
        self.pending.lock().take();
        self.transport.close();

        match &result {
            Ok(()) => debug!("Read loop stopped"),
            Err(e) => error!("Read loop ended: {}", e),
        }
        result
    }

    fn read_frames(&mut self) -> Result<(), TransportError> {
        let mut decoder = FrameDecoder::new();

        while self.running.load(Ordering::SeqCst) {
            let chunk = match self.transport.read_available() {
                Ok(chunk) => chunk,
                Err(_) if !self.running.load(Ordering::SeqCst) => return Ok(()),
                Err(e) => return Err(e),
            };
            if chunk.is_empty() {
                continue;
            }

            trace!("RX {} bytes: {:02X?}", chunk.len(), &chunk[..]);
            decoder.push(&chunk);

            while let Some(frame) = decoder.decode() {
                *self.stats.lock() = decoder.stats();
                let packet = match Packet::from_frame(&frame) {
                    Ok(packet) => packet,
                    Err(e) => {
                        warn!("Dropping {:?} packet: {}", frame.packet_type, e);
                        continue;
                    }
                };

                if !self.deliver(packet) {
                    debug!("Packet consumer gone");
                    return Ok(());
                }
            }
            // Sync and CRC errors count even when no frame came out.
            *self.stats.lock() = decoder.stats();
        }

        Ok(())
    }

    /// Route one packet. Returns false if the consumer has gone away.
    fn deliver(&self, packet: Packet) -> bool {
        let packet = match packet {
            Packet::Response(response) => match self.pending.lock().take() {
                Some(waiter) => {
                    let _ = waiter.send(response);
                    return true;
                }
                None => Packet::Response(response),
            },
            other => other,
        };

        self.packets.blocking_send(packet).is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::{MemoryHandle, MemoryTransport};
    use enocean_protocol::{encode_frame, PacketType, RadioPacket, Rorg};

    const READ_TIMEOUT: Duration = Duration::from_millis(10);
    const WAIT: Duration = Duration::from_secs(2);

    fn start() -> (Communicator, mpsc::Receiver<Packet>, MemoryHandle) {
        let (transport, handle) = MemoryTransport::pair(READ_TIMEOUT);
        let (communicator, packets) =
            Communicator::start(Box::new(transport), CommunicatorConfig::default()).unwrap();
        (communicator, packets, handle)
    }

    fn rps_frame(action: u8, sender: u32) -> Vec<u8> {
        let mut data = vec![0xF6, action];
        data.extend_from_slice(&sender.to_be_bytes());
        data.push(0x30);
        encode_frame(PacketType::RadioErp1, &data, &[]).unwrap().to_vec()
    }

    async fn recv(packets: &mut mpsc::Receiver<Packet>) -> Packet {
        tokio::time::timeout(WAIT, packets.recv())
            .await
            .expect("packet should arrive")
            .expect("channel open")
    }

    #[tokio::test]
    async fn test_packets_arrive_in_wire_order() {
        let (communicator, mut packets, handle) = start();

        let mut wire = Vec::new();
        for i in 0..5u32 {
            wire.extend(rps_frame(0x10, i));
        }
        // Line noise, then a split mid-frame to exercise partial reads
        handle.inject(&[0x00, 0xFF]);
        handle.inject(&wire[..10]);
        handle.inject(&wire[10..]);

        for i in 0..5u32 {
            let packet = recv(&mut packets).await;
            assert_eq!(packet.as_radio().unwrap().sender(), DeviceId(i));
        }
        assert_eq!(communicator.stats().frames, 5);
        assert_eq!(communicator.stats().sync_errors, 2);
        communicator.shutdown().unwrap();
    }

    #[tokio::test]
    async fn test_send_writes_encoded_frame() {
        let (communicator, _packets, handle) = start();
        let packet: Packet =
            RadioPacket::create(Rorg::Rps, &[0x50], DeviceId(0xFF801201), DeviceId::BROADCAST)
                .unwrap()
                .into();
        communicator.send(&packet).unwrap();

        let writes = handle.wait_for_writes(1, WAIT).unwrap();
        assert_eq!(writes[0], packet.encode().unwrap().to_vec());
        communicator.shutdown().unwrap();
    }

    #[tokio::test]
    async fn test_concurrent_sends_do_not_interleave() {
        let (communicator, _packets, handle) = start();
        let communicator = Arc::new(communicator);

        let mut threads = Vec::new();
        for t in 0..4u32 {
            let communicator = Arc::clone(&communicator);
            threads.push(std::thread::spawn(move || {
                for i in 0..10u32 {
                    let packet: Packet = RadioPacket::create(
                        Rorg::Bs4,
                        &[t as u8, i as u8, 0, 0],
                        DeviceId(t),
                        DeviceId::BROADCAST,
                    )
                    .unwrap()
                    .into();
                    communicator.send(&packet).unwrap();
                }
            }));
        }
        for thread in threads {
            thread.join().unwrap();
        }

        let writes = handle.wait_for_writes(40, WAIT).unwrap();
        let mut decoder = FrameDecoder::new();
        for write in &writes {
            decoder.push(write);
        }
        let mut frames = 0;
        while decoder.decode().is_some() {
            frames += 1;
        }
        assert_eq!(frames, 40);
        assert_eq!(decoder.stats().sync_errors, 0);
        communicator.shutdown().unwrap();
    }

    #[tokio::test]
    async fn test_base_id_from_response() {
        let (communicator, mut packets, handle) = start();

        let responder = std::thread::spawn(move || {
            let writes = handle.wait_for_writes(1, WAIT).unwrap();
            assert_eq!(writes[0], vec![0x55, 0x00, 0x01, 0x00, 0x05, 0x70, 0x08, 0x38]);
            // An unrelated radio telegram arrives before the response
            handle.inject(&rps_frame(0x30, 0x018A78BC));
            handle.inject(
                &encode_frame(PacketType::Response, &[0x00, 0xFF, 0x87, 0xCA, 0x80], &[0x0A])
                    .unwrap(),
            );
            handle
        });

        let id = communicator.base_id().await.unwrap();
        assert_eq!(id, DeviceId(0xFF87CA80));
        let handle = responder.join().unwrap();

        // Cached: no second command
        assert_eq!(communicator.base_id().await.unwrap(), id);
        assert_eq!(handle.writes().len(), 1);

        // The radio telegram still reached the consumer, the response did not
        let packet = recv(&mut packets).await;
        assert!(packet.as_radio().is_some());
        communicator.shutdown().unwrap();
    }

    #[tokio::test]
    async fn test_rejected_request() {
        let (communicator, _packets, handle) = start();
        let responder = std::thread::spawn(move || {
            handle.wait_for_writes(1, WAIT).unwrap();
            handle.inject(&encode_frame(PacketType::Response, &[0x02], &[]).unwrap());
        });

        let err = communicator.base_id().await.unwrap_err();
        assert!(matches!(
            err,
            CommunicatorError::Rejected(ReturnCode::NotSupported)
        ));
        responder.join().unwrap();
        communicator.shutdown().unwrap();
    }

    #[tokio::test]
    async fn test_request_timeout() {
        let (communicator, _packets, _handle) = start();
        let command: Packet = CommonCommandPacket::read_version().into();
        let err = communicator
            .request(&command, Duration::from_millis(30))
            .await
            .unwrap_err();
        assert!(matches!(err, CommunicatorError::Timeout(_)));
        communicator.shutdown().unwrap();
    }

    #[tokio::test]
    async fn test_unsolicited_response_reaches_consumer() {
        let (communicator, mut packets, handle) = start();
        handle.inject(&encode_frame(PacketType::Response, &[0x00], &[]).unwrap());
        assert!(matches!(recv(&mut packets).await, Packet::Response(_)));
        communicator.shutdown().unwrap();
    }

    #[tokio::test]
    async fn test_stats_count_errors_without_frames() {
        let (communicator, _packets, handle) = start();
        // Garbage, then a sync byte with a broken header
        handle.inject(&[0x00, 0x11, 0x22]);
        handle.inject(&[0x55, 0x00, 0x07, 0x07, 0x01, 0x00]);

        let deadline = std::time::Instant::now() + WAIT;
        loop {
            let stats = communicator.stats();
            if stats.sync_errors >= 3 && stats.header_crc_errors >= 1 {
                break;
            }
            assert!(std::time::Instant::now() < deadline, "stats not published: {:?}", stats);
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert_eq!(communicator.stats().frames, 0);
        communicator.shutdown().unwrap();
    }

    #[tokio::test]
    async fn test_drained_receiver_does_not_block_requests() {
        let (transport, handle) = MemoryTransport::pair(READ_TIMEOUT);
        let config = CommunicatorConfig {
            channel_capacity: 1,
            ..CommunicatorConfig::default()
        };
        let (communicator, packets) = Communicator::start(Box::new(transport), config).unwrap();
        let mut kept = drain_packets(packets, |packet| {
            packet.as_radio().map(|r| r.sender()) == Some(DeviceId(7))
        });

        let responder = std::thread::spawn(move || {
            handle.wait_for_writes(1, WAIT).unwrap();
            // Busy radio traffic ahead of the response
            for i in 0..20u32 {
                handle.inject(&rps_frame(0x10, i));
            }
            handle.inject(
                &encode_frame(PacketType::Response, &[0x00, 0xFF, 0x87, 0xCA, 0x80], &[])
                    .unwrap(),
            );
        });

        assert_eq!(communicator.base_id().await.unwrap(), DeviceId(0xFF87CA80));
        responder.join().unwrap();

        let packet = tokio::time::timeout(WAIT, kept.recv()).await.unwrap().unwrap();
        assert_eq!(packet.as_radio().unwrap().sender(), DeviceId(7));
        communicator.shutdown().unwrap();
    }

    #[tokio::test]
    async fn test_transport_failure_ends_read_loop() {
        let (communicator, mut packets, handle) = start();
        handle.inject(&rps_frame(0x10, 1));
        assert!(recv(&mut packets).await.as_radio().is_some());

        handle.fail(std::io::ErrorKind::BrokenPipe);
        let end = tokio::time::timeout(WAIT, packets.recv()).await.unwrap();
        assert!(end.is_none());
        assert!(!communicator.is_running());

        assert!(matches!(communicator.shutdown(), Err(TransportError::Io(_))));
        assert!(matches!(
            communicator.send_raw(&[0x55]),
            Err(CommunicatorError::Closed)
        ));
    }
}
