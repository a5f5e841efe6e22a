//! TCP transport for gateways exposed through a serial-to-network bridge.

use std::io::{Read, Write};
use std::net::TcpStream;
use std::time::Duration;

use bytes::Bytes;
use log::{debug, info};

use super::{is_timeout, Transport, TransportError, READ_CHUNK};

pub struct TcpTransport {
    address: String,
    read_timeout: Duration,
    stream: Option<TcpStream>,
}

impl TcpTransport {
    pub fn new(address: impl Into<String>, read_timeout: Duration) -> Self {
        Self {
            address: address.into(),
            read_timeout,
            stream: None,
        }
    }

    fn stream(&mut self) -> Result<&mut TcpStream, TransportError> {
        self.stream.as_mut().ok_or(TransportError::NotOpen)
    }
}

impl Transport for TcpTransport {
    fn open(&mut self) -> Result<(), TransportError> {
        if self.stream.is_some() {
            return Ok(());
        }

        let stream = TcpStream::connect(&self.address)?;
        stream.set_read_timeout(Some(self.read_timeout))?;
        stream.set_nodelay(true)?;
        info!("Connected to {}", self.address);
        self.stream = Some(stream);
        Ok(())
    }

    fn read_available(&mut self) -> Result<Bytes, TransportError> {
        let stream = self.stream()?;
        let mut buf = [0u8; READ_CHUNK];
        match stream.read(&mut buf) {
            Ok(0) => Err(TransportError::Closed),
            Ok(n) => Ok(Bytes::copy_from_slice(&buf[..n])),
            Err(e) if is_timeout(&e) => Ok(Bytes::new()),
            Err(e) => Err(e.into()),
        }
    }

    fn write(&mut self, data: &[u8]) -> Result<(), TransportError> {
        let stream = self.stream()?;
        stream.write_all(data)?;
        stream.flush()?;
        Ok(())
    }

    fn close(&mut self) {
        if let Some(stream) = self.stream.take() {
            let _ = stream.shutdown(std::net::Shutdown::Both);
            debug!("Closed connection to {}", self.address);
        }
    }

    fn try_clone(&self) -> Result<Box<dyn Transport>, TransportError> {
        let stream = self.stream.as_ref().ok_or(TransportError::NotOpen)?;
        Ok(Box::new(TcpTransport {
            address: self.address.clone(),
            read_timeout: self.read_timeout,
            stream: Some(stream.try_clone()?),
        }))
    }

    fn describe(&self) -> String {
        format!("tcp:{}", self.address)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::TcpListener;

    #[test]
    fn test_roundtrip_over_loopback() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();

        let mut transport = TcpTransport::new(addr.to_string(), Duration::from_millis(50));
        transport.open().unwrap();
        let (mut peer, _) = listener.accept().unwrap();

        // Nothing sent yet: read times out with an empty buffer
        assert!(transport.read_available().unwrap().is_empty());

        peer.write_all(&[0x55, 0x00, 0x01]).unwrap();
        let mut reader = transport.try_clone().unwrap();
        let mut received = Vec::new();
        while received.len() < 3 {
            received.extend_from_slice(&reader.read_available().unwrap());
        }
        assert_eq!(received, vec![0x55, 0x00, 0x01]);

        transport.write(&[0xAA]).unwrap();
        let mut buf = [0u8; 1];
        peer.read_exact(&mut buf).unwrap();
        assert_eq!(buf, [0xAA]);

        drop(peer);
        let mut result = reader.read_available();
        while matches!(&result, Ok(b) if b.is_empty()) {
            result = reader.read_available();
        }
        assert!(matches!(result, Err(TransportError::Closed)));
    }

    #[test]
    fn test_unopened_stream() {
        let mut transport = TcpTransport::new("127.0.0.1:9", Duration::from_millis(10));
        assert!(matches!(transport.write(&[0x55]), Err(TransportError::NotOpen)));
        assert_eq!(transport.describe(), "tcp:127.0.0.1:9");
    }
}
