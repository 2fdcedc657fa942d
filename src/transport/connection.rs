//! One open Modbus RTU conversation over a [`Link`].
//!
//! Each register access is a single request/response transaction: clear
//! stale input, send the request, then collect bytes until the decoder
//! yields a frame or the response timeout elapses. No retries happen here.

use std::time::Duration;

use log::{trace, warn};

use super::codec::{self, DecodeError, Response, ResponseDecoder};
use super::link::Link;
use super::{Register, RegisterPort};
use crate::app::ports::Clock;
use crate::error::{ConnectionFault, ProtocolFault, TransportError};

/// Back-off between empty reads so a non-blocking link does not spin.
const IDLE_READ_BACKOFF: Duration = Duration::from_millis(5);

const READ_CHUNK: usize = 16;

pub struct ModbusConnection<L: Link, C: Clock> {
    link: L,
    clock: C,
    slave: u8,
    response_timeout: Duration,
    decoder: ResponseDecoder,
}

impl<L: Link, C: Clock> ModbusConnection<L, C> {
    pub fn new(link: L, clock: C, slave: u8, response_timeout: Duration) -> Self {
        Self {
            link,
            clock,
            slave,
            response_timeout,
            decoder: ResponseDecoder::new(),
        }
    }

    /// Give the link back (tests inspect what was written).
    pub fn into_link(self) -> L {
        self.link
    }

    fn send(&mut self, request: &[u8]) -> Result<(), TransportError> {
        self.link.clear_input().map_err(link_fault)?;
        let mut written = 0;
        while written < request.len() {
            let n = self.link.write(&request[written..]).map_err(link_fault)?;
            if n == 0 {
                return Err(TransportError::Connection(ConnectionFault::Disconnected));
            }
            written += n;
        }
        self.link.flush().map_err(link_fault)
    }

    /// Send `request` and wait for the matching reply.
    ///
    /// `silent` is returned when nothing valid arrives before the timeout.
    fn transact(
        &mut self,
        request: &[u8],
        register: Register,
        silent: TransportError,
    ) -> Result<Response, TransportError> {
        self.decoder.reset();
        self.send(request)?;
        trace!("MODBUS: tx {:02x?}", request);

        let deadline = self.clock.now() + self.response_timeout;
        let mut chunk = [0u8; READ_CHUNK];
        loop {
            let n = self.link.read(&mut chunk).map_err(link_fault)?;
            if n > 0 {
                trace!("MODBUS: rx {:02x?}", &chunk[..n]);
                match self.decoder.feed(&chunk[..n]) {
                    Some(Ok(resp)) if resp.slave() == self.slave => return Ok(resp),
                    Some(Ok(resp)) => {
                        warn!("MODBUS: reply from slave {} ignored", resp.slave());
                        return Err(TransportError::Protocol(
                            register,
                            ProtocolFault::UnexpectedResponse,
                        ));
                    }
                    Some(Err(DecodeError::Crc)) => {
                        return Err(TransportError::Protocol(register, ProtocolFault::CrcMismatch));
                    }
                    Some(Err(DecodeError::Malformed)) => {
                        return Err(TransportError::Protocol(register, ProtocolFault::Malformed));
                    }
                    None => {}
                }
            } else {
                self.clock.sleep(IDLE_READ_BACKOFF);
            }

            if self.clock.now() >= deadline {
                return Err(silent);
            }
        }
    }
}

fn link_fault<E: core::fmt::Debug>(e: E) -> TransportError {
    warn!("MODBUS: link error: {:?}", e);
    TransportError::Connection(ConnectionFault::Disconnected)
}

impl<L: Link, C: Clock> RegisterPort for ModbusConnection<L, C> {
    fn write_register(&mut self, register: Register, value: u16) -> Result<(), TransportError> {
        let request = codec::encode_write(self.slave, register.address(), value);
        match self.transact(&request, register, TransportError::Write(register))? {
            Response::Written {
                register: echoed,
                value: echoed_value,
                ..
            } if echoed == register.address() && echoed_value == value => Ok(()),
            Response::Exception { code, .. } => {
                warn!("MODBUS: write {} rejected, exception {:#04x}", register, code);
                Err(TransportError::Protocol(register, ProtocolFault::Exception(code)))
            }
            _ => Err(TransportError::Protocol(
                register,
                ProtocolFault::UnexpectedResponse,
            )),
        }
    }

    fn read_register(&mut self, register: Register) -> Result<u16, TransportError> {
        let request = codec::encode_read(self.slave, register.address());
        match self.transact(&request, register, TransportError::Read(register))? {
            Response::Read { value, .. } => Ok(value),
            Response::Exception { code, .. } => {
                Err(TransportError::Protocol(register, ProtocolFault::Exception(code)))
            }
            Response::Written { .. } => Err(TransportError::Protocol(
                register,
                ProtocolFault::UnexpectedResponse,
            )),
        }
    }
}
