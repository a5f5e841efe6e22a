//! Long-running monitor: keeps a communicator alive and feeds the dispatcher.

use std::future::Future;
use std::time::Duration;

use log::{error, info, warn};

use enocean_protocol::{DeviceId, Packet};

use crate::communicator::{Communicator, CommunicatorConfig, CommunicatorError};
use crate::config::TransportSettings;
use crate::dispatch::{Dispatched, Dispatcher};

/// First reconnect delay.
pub const INITIAL_BACKOFF: Duration = Duration::from_secs(1);

/// Longest reconnect delay.
pub const MAX_BACKOFF: Duration = Duration::from_secs(30);

/// Exponential reconnect delay.
#[derive(Debug, Clone)]
pub struct Backoff {
    current: Duration,
    initial: Duration,
    max: Duration,
}

impl Default for Backoff {
    fn default() -> Self {
        Self::new(INITIAL_BACKOFF, MAX_BACKOFF)
    }
}

impl Backoff {
    pub fn new(initial: Duration, max: Duration) -> Self {
        Self {
            current: initial,
            initial,
            max,
        }
    }

    /// Delay to wait now; doubles the next one up to the maximum.
    pub fn next_delay(&mut self) -> Duration {
        let delay = self.current;
        self.current = (self.current * 2).min(self.max);
        delay
    }

    pub fn reset(&mut self) {
        self.current = self.initial;
    }
}

/// Run the monitor loop until `shutdown` completes.
///
/// Every packet is passed to `on_packet` along with the device event it
/// produced, if any. Transport failures are logged and followed by a
/// reconnect with a fresh communicator (and thus a fresh frame decoder).
pub async fn run_monitor<F, S>(
    settings: &TransportSettings,
    config: CommunicatorConfig,
    dispatcher: &mut Dispatcher,
    mut on_packet: F,
    shutdown: S,
) where
    F: FnMut(&Packet, Option<&Dispatched>),
    S: Future<Output = ()>,
{
    tokio::pin!(shutdown);
    let mut backoff = Backoff::default();

    loop {
        match Communicator::start(settings.build(), config.clone()) {
            Ok((communicator, mut packets)) => {
                backoff.reset();
                info!("Monitoring {}", communicator.endpoint());

                loop {
                    tokio::select! {
                        packet = packets.recv() => {
                            let Some(packet) = packet else { break };
                            let dispatched = dispatcher.dispatch(&packet);
                            if let Some(dispatched) = &dispatched {
                                let sent =
                                    send_queued_command(&communicator, dispatcher, dispatched.device).await;
                                if let Err(e) = sent {
                                    warn!("{}: queued command not sent: {}", dispatched.name, e);
                                }
                            }
                            on_packet(&packet, dispatched.as_ref());
                        }
                        _ = &mut shutdown => {
                            info!("Shutting down");
                            if let Err(e) = communicator.shutdown() {
                                warn!("Read loop ended with: {}", e);
                            }
                            return;
                        }
                    }
                }

                match communicator.shutdown() {
                    Ok(()) => warn!("Connection to {} closed", communicator.endpoint()),
                    Err(e) => error!("Connection to {} lost: {}", communicator.endpoint(), e),
                }
                let stats = communicator.stats();
                info!(
                    "Frames: {}, sync errors: {}, header CRC errors: {}, data CRC errors: {}",
                    stats.frames, stats.sync_errors, stats.header_crc_errors, stats.data_crc_errors
                );
            }
            Err(e) => error!("Failed to open gateway: {}", e),
        }

        let delay = backoff.next_delay();
        info!("Reconnecting in {:?}", delay);
        tokio::select! {
            _ = tokio::time::sleep(delay) => {}
            _ = &mut shutdown => {
                info!("Shutting down");
                return;
            }
        }
    }
}

/// Send the command `id` queued while handling its last telegram.
///
/// Devices without a configured sender use the gateway base ID.
async fn send_queued_command(
    communicator: &Communicator,
    dispatcher: &mut Dispatcher,
    id: DeviceId,
) -> Result<(), CommunicatorError> {
    let configured = match dispatcher.device_mut(id) {
        Some(device) if device.has_command() => device.command_sender(),
        _ => return Ok(()),
    };
    let sender = match configured {
        Some(sender) => sender,
        None => communicator.base_id().await?,
    };

    let Some(device) = dispatcher.device_mut(id) else {
        return Ok(());
    };
    if let Some(packet) = device.take_command(sender)? {
        info!("{}: sending queued command", device.name());
        communicator.send(&packet.into())?;
    }
    Ok(())
}
