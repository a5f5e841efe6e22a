//! Serial port transport (USB gateways such as the USB 300).

use std::io::{Read, Write};
use std::time::Duration;

use bytes::Bytes;
use log::{debug, info};
use serialport::SerialPort;

use super::{is_timeout, Transport, TransportError, READ_CHUNK};

pub struct SerialTransport {
    path: String,
    baud_rate: u32,
    read_timeout: Duration,
    port: Option<Box<dyn SerialPort>>,
}

impl SerialTransport {
    pub fn new(path: impl Into<String>, baud_rate: u32, read_timeout: Duration) -> Self {
        Self {
            path: path.into(),
            baud_rate,
            read_timeout,
            port: None,
        }
    }

    fn port(&mut self) -> Result<&mut Box<dyn SerialPort>, TransportError> {
        self.port.as_mut().ok_or(TransportError::NotOpen)
    }
}

impl Transport for SerialTransport {
    fn open(&mut self) -> Result<(), TransportError> {
        if self.port.is_some() {
            return Ok(());
        }

        let port = serialport::new(&self.path, self.baud_rate)
            .timeout(self.read_timeout)
            .open()?;
        info!("Opened serial port {} @ {}", self.path, self.baud_rate);
        self.port = Some(port);
        Ok(())
    }

    fn read_available(&mut self) -> Result<Bytes, TransportError> {
        let port = self.port()?;
        let mut buf = [0u8; READ_CHUNK];
        match port.read(&mut buf) {
            Ok(n) => Ok(Bytes::copy_from_slice(&buf[..n])),
            Err(e) if is_timeout(&e) => Ok(Bytes::new()),
            Err(e) => Err(e.into()),
        }
    }

    fn write(&mut self, data: &[u8]) -> Result<(), TransportError> {
        let port = self.port()?;
        port.write_all(data)?;
        port.flush()?;
        Ok(())
    }

    fn close(&mut self) {
        if self.port.take().is_some() {
            debug!("Closed serial port {}", self.path);
        }
    }

    fn try_clone(&self) -> Result<Box<dyn Transport>, TransportError> {
        let port = self.port.as_ref().ok_or(TransportError::NotOpen)?;
        Ok(Box::new(SerialTransport {
            path: self.path.clone(),
            baud_rate: self.baud_rate,
            read_timeout: self.read_timeout,
            port: Some(port.try_clone()?),
        }))
    }

    fn describe(&self) -> String {
        format!("serial:{}", self.path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unopened_port() {
        let mut transport = SerialTransport::new("/dev/null-enocean", 57_600, Duration::from_millis(10));
        assert!(matches!(transport.read_available(), Err(TransportError::NotOpen)));
        assert!(matches!(transport.write(&[0x55]), Err(TransportError::NotOpen)));
        assert!(matches!(transport.try_clone(), Err(TransportError::NotOpen)));
        assert_eq!(transport.describe(), "serial:/dev/null-enocean");
    }

    #[test]
    fn test_open_missing_port() {
        let mut transport =
            SerialTransport::new("/dev/enocean-no-such-port", 57_600, Duration::from_millis(10));
        let err = transport.open().unwrap_err();
        assert!(matches!(err, TransportError::Serial(_)), "got {:?}", err);
        // Still closed after a failed open
        assert!(matches!(transport.read_available(), Err(TransportError::NotOpen)));
    }

    #[test]
    fn test_serial_error_conversion() {
        let err: TransportError =
            serialport::Error::new(serialport::ErrorKind::NoDevice, "gateway unplugged").into();
        assert!(matches!(
            &err,
            TransportError::Serial(inner) if inner.kind() == serialport::ErrorKind::NoDevice
        ));
        assert_eq!(err.to_string(), "Serial port error: gateway unplugged");
    }
}
