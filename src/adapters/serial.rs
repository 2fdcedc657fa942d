//! USB serial adapter.
//!
//! [`SerialOpener`] opens the controller's tty at 8N1 without flow control
//! and hands out [`SerialLink`]s to the Modbus session.

use std::io::{self, Read, Write};
use std::time::Duration;

use log::{debug, warn};
use serialport::{ClearBuffer, DataBits, FlowControl, Parity, SerialPort, StopBits};

use crate::config::SerialConfig;
use crate::error::{ConnectionFault, TransportError};
use crate::transport::link::{Link, LinkOpener};

/// Per-read timeout on the port; the connection enforces the response deadline.
const READ_TIMEOUT: Duration = Duration::from_millis(50);

pub struct SerialLink {
    port: Box<dyn SerialPort>,
}

impl Link for SerialLink {
    type Error = io::Error;

    fn read(&mut self, buf: &mut [u8]) -> Result<usize, io::Error> {
        match self.port.read(buf) {
            Ok(n) => Ok(n),
            Err(e) if e.kind() == io::ErrorKind::TimedOut => Ok(0),
            Err(e) => Err(e),
        }
    }

    fn write(&mut self, data: &[u8]) -> Result<usize, io::Error> {
        self.port.write(data)
    }

    fn flush(&mut self) -> Result<(), io::Error> {
        self.port.flush()
    }

    fn clear_input(&mut self) -> Result<(), io::Error> {
        self.port.clear(ClearBuffer::Input).map_err(io::Error::from)
    }
}

pub struct SerialOpener {
    path: String,
    baud_rate: u32,
}

impl SerialOpener {
    pub fn new(path: impl Into<String>, baud_rate: u32) -> Self {
        Self {
            path: path.into(),
            baud_rate,
        }
    }

    pub fn from_config(cfg: &SerialConfig) -> Self {
        Self::new(cfg.port.clone(), cfg.baud_rate)
    }
}

impl LinkOpener for SerialOpener {
    type Link = SerialLink;

    fn open(&mut self) -> Result<SerialLink, TransportError> {
        let port = serialport::new(&self.path, self.baud_rate)
            .data_bits(DataBits::Eight)
            .parity(Parity::None)
            .stop_bits(StopBits::One)
            .flow_control(FlowControl::None)
            .timeout(READ_TIMEOUT)
            .open()
            .map_err(|e| {
                warn!("SERIAL: cannot open {}: {}", self.path, e);
                TransportError::Connection(ConnectionFault::PortUnavailable)
            })?;
        debug!("SERIAL: opened {} @ {} baud", self.path, self.baud_rate);
        Ok(SerialLink { port })
    }

    fn endpoint(&self) -> &str {
        &self.path
    }
}
