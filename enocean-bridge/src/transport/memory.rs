//! In-memory transport.
//!
//! [`MemoryTransport`] is the host side; [`MemoryHandle`] plays the gateway:
//! it injects received bytes, inspects written frames and can simulate a
//! disconnect or an I/O failure.

use std::collections::VecDeque;
use std::io;
use std::sync::Arc;
use std::time::{Duration, Instant};

use bytes::Bytes;
use parking_lot::{Condvar, Mutex};

use super::{Transport, TransportError};

#[derive(Debug, Default)]
struct State {
    inbound: VecDeque<u8>,
    writes: Vec<Vec<u8>>,
    open: bool,
    closed: bool,
    failure: Option<io::ErrorKind>,
}

#[derive(Debug, Default)]
struct Shared {
    state: Mutex<State>,
    changed: Condvar,
}

pub struct MemoryTransport {
    shared: Arc<Shared>,
    read_timeout: Duration,
    is_open: bool,
}

/// Gateway side of a [`MemoryTransport`].
#[derive(Clone)]
pub struct MemoryHandle {
    shared: Arc<Shared>,
}

impl MemoryTransport {
    /// Create a transport and the handle driving it.
    pub fn pair(read_timeout: Duration) -> (Self, MemoryHandle) {
        let shared = Arc::new(Shared::default());
        (
            Self {
                shared: Arc::clone(&shared),
                read_timeout,
                is_open: false,
            },
            MemoryHandle { shared },
        )
    }

    fn check(&self) -> Result<(), TransportError> {
        if !self.is_open {
            return Err(TransportError::NotOpen);
        }
        Ok(())
    }
}

impl Transport for MemoryTransport {
    fn open(&mut self) -> Result<(), TransportError> {
        let mut state = self.shared.state.lock();
        if state.closed {
            return Err(TransportError::Closed);
        }
        state.open = true;
        self.is_open = true;
        Ok(())
    }

    fn read_available(&mut self) -> Result<Bytes, TransportError> {
        self.check()?;
        let deadline = Instant::now() + self.read_timeout;
        let mut state = self.shared.state.lock();

        loop {
            if let Some(kind) = state.failure {
                return Err(io::Error::from(kind).into());
            }
            if !state.inbound.is_empty() {
                let bytes: Vec<u8> = state.inbound.drain(..).collect();
                return Ok(Bytes::from(bytes));
            }
            if state.closed {
                return Err(TransportError::Closed);
            }
            if self.shared.changed.wait_until(&mut state, deadline).timed_out() {
                return Ok(Bytes::new());
            }
        }
    }

    fn write(&mut self, data: &[u8]) -> Result<(), TransportError> {
        self.check()?;
        let mut state = self.shared.state.lock();
        if let Some(kind) = state.failure {
            return Err(io::Error::from(kind).into());
        }
        if state.closed {
            return Err(TransportError::Closed);
        }
        state.writes.push(data.to_vec());
        self.shared.changed.notify_all();
        Ok(())
    }

    fn close(&mut self) {
        self.is_open = false;
        let mut state = self.shared.state.lock();
        state.open = false;
        self.shared.changed.notify_all();
    }

    fn try_clone(&self) -> Result<Box<dyn Transport>, TransportError> {
        self.check()?;
        Ok(Box::new(MemoryTransport {
            shared: Arc::clone(&self.shared),
            read_timeout: self.read_timeout,
            is_open: true,
        }))
    }

    fn describe(&self) -> String {
        "memory".to_string()
    }
}

impl MemoryHandle {
    /// Make bytes available to the next read.
    pub fn inject(&self, bytes: &[u8]) {
        let mut state = self.shared.state.lock();
        state.inbound.extend(bytes);
        self.shared.changed.notify_all();
    }

    /// Every `write` call so far, in order.
    pub fn writes(&self) -> Vec<Vec<u8>> {
        self.shared.state.lock().writes.clone()
    }

    /// Wait until at least `count` writes happened.
    pub fn wait_for_writes(&self, count: usize, timeout: Duration) -> Option<Vec<Vec<u8>>> {
        let deadline = Instant::now() + timeout;
        let mut state = self.shared.state.lock();
        while state.writes.len() < count {
            if self.shared.changed.wait_until(&mut state, deadline).timed_out() {
                return None;
            }
        }
        Some(state.writes.clone())
    }

    /// Simulate the gateway going away: reads fail with `Closed` once the
    /// inbound queue is drained.
    pub fn disconnect(&self) {
        let mut state = self.shared.state.lock();
        state.closed = true;
        self.shared.changed.notify_all();
    }

    /// Make every further read and write fail with an I/O error.
    pub fn fail(&self, kind: io::ErrorKind) {
        let mut state = self.shared.state.lock();
        state.failure = Some(kind);
        self.shared.changed.notify_all();
    }

    /// Returns true while a host side handle has the transport open.
    pub fn is_open(&self) -> bool {
        self.shared.state.lock().open
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TIMEOUT: Duration = Duration::from_millis(20);

    #[test]
    fn test_read_write() {
        let (mut transport, handle) = MemoryTransport::pair(TIMEOUT);
        assert!(matches!(transport.read_available(), Err(TransportError::NotOpen)));

        transport.open().unwrap();
        assert!(handle.is_open());
        assert!(transport.read_available().unwrap().is_empty());

        handle.inject(&[1, 2]);
        handle.inject(&[3]);
        assert_eq!(&transport.read_available().unwrap()[..], &[1, 2, 3]);

        transport.write(&[0x55]).unwrap();
        transport.write(&[0x56]).unwrap();
        assert_eq!(handle.writes(), vec![vec![0x55], vec![0x56]]);

        transport.close();
        assert!(!handle.is_open());
        assert!(matches!(transport.write(&[0]), Err(TransportError::NotOpen)));
    }

    #[test]
    fn test_disconnect_drains_then_closes() {
        let (mut transport, handle) = MemoryTransport::pair(TIMEOUT);
        transport.open().unwrap();
        handle.inject(&[9]);
        handle.disconnect();

        assert_eq!(&transport.read_available().unwrap()[..], &[9]);
        assert!(matches!(transport.read_available(), Err(TransportError::Closed)));
        assert!(matches!(transport.open(), Err(TransportError::Closed)));
    }

    #[test]
    fn test_failure_and_clone() {
        let (mut transport, handle) = MemoryTransport::pair(TIMEOUT);
        transport.open().unwrap();
        let mut reader = transport.try_clone().unwrap();

        handle.inject(&[7]);
        assert_eq!(&reader.read_available().unwrap()[..], &[7]);

        handle.fail(io::ErrorKind::BrokenPipe);
        assert!(matches!(reader.read_available(), Err(TransportError::Io(_))));
        assert!(matches!(transport.write(&[1]), Err(TransportError::Io(_))));
    }

    #[test]
    fn test_wait_for_writes() {
        let (mut transport, handle) = MemoryTransport::pair(TIMEOUT);
        transport.open().unwrap();
        assert!(handle.wait_for_writes(1, TIMEOUT).is_none());

        let writer = std::thread::spawn(move || {
            transport.write(&[1, 2, 3]).unwrap();
        });
        let writes = handle
            .wait_for_writes(1, Duration::from_secs(2))
            .expect("write should arrive");
        assert_eq!(writes, vec![vec![1, 2, 3]]);
        writer.join().unwrap();
    }
}
