//! Link abstraction: the byte channel under the Modbus connection.
//!
//! Concrete implementations:
//! - USB serial adapter ([`SerialLink`](crate::adapters::serial::SerialLink))
//! - In-memory device models in the integration tests
//!
//! [`ModbusConnection`](super::connection::ModbusConnection) is generic over
//! `Link`, so swapping the physical channel needs no change to framing or
//! retry logic.

use crate::error::TransportError;

/// Byte-oriented half-duplex channel.
pub trait Link {
    /// Error type for this link.
    type Error: core::fmt::Debug;

    /// Read up to `buf.len()` bytes into `buf`.
    /// Returns 0 when nothing arrived within the link's own read timeout.
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, Self::Error>;

    /// Write `data`, returning the number of bytes accepted.
    fn write(&mut self, data: &[u8]) -> Result<usize, Self::Error>;

    /// Flush any buffered output.
    fn flush(&mut self) -> Result<(), Self::Error>;

    /// Drop stale bytes sitting in the receive buffer.
    fn clear_input(&mut self) -> Result<(), Self::Error>;
}

/// Opens fresh links; the connection layer calls it on every (re)connect.
pub trait LinkOpener {
    type Link: Link;

    fn open(&mut self) -> Result<Self::Link, TransportError>;

    /// Human-readable endpoint for logs (device path).
    fn endpoint(&self) -> &str;
}

/// Best-effort recovery hook run between failed connect attempts.
pub trait UsbReset {
    fn reset(&mut self) -> std::io::Result<()>;
}
