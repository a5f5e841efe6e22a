//! Byte transports to an EnOcean gateway.
//!
//! A transport is a blocking byte pipe. The communicator keeps one handle
//! for writing and hands a clone to its read loop, so implementations must
//! support [`Transport::try_clone`] on an open transport.

mod memory;
mod serial;
mod tcp;

pub use memory::{MemoryHandle, MemoryTransport};
pub use serial::SerialTransport;
pub use tcp::TcpTransport;

use std::io;
use std::time::Duration;

use bytes::Bytes;
use thiserror::Error;

/// Default ESP3 baud rate.
pub const DEFAULT_BAUD_RATE: u32 = 57_600;

/// Default blocking read timeout.
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_millis(100);

/// Size of a single read.
pub(crate) const READ_CHUNK: usize = 256;

/// Transport-level errors.
#[derive(Error, Debug)]
pub enum TransportError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("Serial port error: {0}")]
    Serial(#[from] serialport::Error),

    #[error("Transport closed")]
    Closed,

    #[error("Transport not open")]
    NotOpen,
}

/// Blocking byte pipe to a gateway.
pub trait Transport: Send {
    /// Open the underlying device. Opening an open transport is a no-op.
    fn open(&mut self) -> Result<(), TransportError>;

    /// Wait up to the read timeout for bytes.
    ///
    /// Returns an empty buffer when nothing arrived in time.
    fn read_available(&mut self) -> Result<Bytes, TransportError>;

    /// Write all bytes.
    fn write(&mut self, data: &[u8]) -> Result<(), TransportError>;

    /// Close the device. Further reads and writes fail with `NotOpen`.
    fn close(&mut self);

    /// Independent handle on the same open device.
    fn try_clone(&self) -> Result<Box<dyn Transport>, TransportError>;

    /// Human readable endpoint, for logs.
    fn describe(&self) -> String;
}

/// Returns true for read errors that only mean "no data yet".
pub(crate) fn is_timeout(err: &io::Error) -> bool {
    matches!(
        err.kind(),
        io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock | io::ErrorKind::Interrupted
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_timeout() {
        assert!(is_timeout(&io::Error::from(io::ErrorKind::TimedOut)));
        assert!(is_timeout(&io::Error::from(io::ErrorKind::WouldBlock)));
        assert!(!is_timeout(&io::Error::from(io::ErrorKind::BrokenPipe)));
    }

    #[test]
    fn test_error_display() {
        assert_eq!(TransportError::Closed.to_string(), "Transport closed");
        let err: TransportError = io::Error::new(io::ErrorKind::Other, "boom").into();
        assert!(err.to_string().contains("boom"));
    }
}
