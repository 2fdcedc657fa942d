//! Connection lifecycle: connect with retries, optional USB reset between
//! attempts, and transparent reconnect after a dropped link.
//!
//! A [`Session`] is itself a [`RegisterPort`], so the actuator controller
//! never sees whether it is talking to a fresh or a long-lived link. When an
//! operation hits a connection fault the link is dropped and the *next*
//! operation reconnects; the failing operation is not replayed.

use std::time::Duration;

use log::{info, warn};

use super::connection::ModbusConnection;
use super::link::{LinkOpener, UsbReset};
use super::{Register, RegisterPort};
use crate::app::ports::Clock;
use crate::config::SerialConfig;
use crate::error::{ConnectionFault, TransportError};

/// Connect and framing parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionPolicy {
    pub slave: u8,
    pub response_timeout: Duration,
    pub max_retries: u8,
    pub retry_delay: Duration,
}

impl SessionPolicy {
    pub fn from_config(cfg: &SerialConfig) -> Self {
        Self {
            slave: cfg.slave_id,
            response_timeout: cfg.response_timeout(),
            max_retries: cfg.connect_retries.max(1),
            retry_delay: cfg.retry_delay(),
        }
    }
}

pub struct Session<O: LinkOpener, C: Clock> {
    opener: O,
    clock: C,
    policy: SessionPolicy,
    reset: Option<Box<dyn UsbReset + Send>>,
    conn: Option<ModbusConnection<O::Link, C>>,
}

impl<O: LinkOpener, C: Clock> Session<O, C> {
    pub fn new(opener: O, clock: C, policy: SessionPolicy) -> Self {
        Self {
            opener,
            clock,
            policy,
            reset: None,
            conn: None,
        }
    }

    /// Attach a USB reset hook, tried after odd-numbered failed attempts.
    pub fn with_usb_reset(mut self, reset: Box<dyn UsbReset + Send>) -> Self {
        self.reset = Some(reset);
        self
    }

    pub fn is_connected(&self) -> bool {
        self.conn.is_some()
    }

    /// Open the link, retrying up to `max_retries` times.
    ///
    /// Already-connected sessions return immediately.
    pub fn connect(&mut self) -> Result<(), TransportError> {
        if self.conn.is_some() {
            return Ok(());
        }

        let attempts = self.policy.max_retries.max(1);
        for attempt in 1..=attempts {
            match self.opener.open() {
                Ok(link) => {
                    info!(
                        "SESSION: connected to {} (attempt {}/{})",
                        self.opener.endpoint(),
                        attempt,
                        attempts
                    );
                    self.conn = Some(ModbusConnection::new(
                        link,
                        self.clock.clone(),
                        self.policy.slave,
                        self.policy.response_timeout,
                    ));
                    return Ok(());
                }
                Err(e) => {
                    warn!(
                        "SESSION: connect {} failed (attempt {}/{}): {}",
                        self.opener.endpoint(),
                        attempt,
                        attempts,
                        e
                    );
                }
            }

            if attempt == attempts {
                break;
            }
            if attempt % 2 == 1 {
                if let Some(hook) = self.reset.as_mut() {
                    info!("SESSION: attempting USB reset");
                    if let Err(e) = hook.reset() {
                        warn!("SESSION: USB reset failed: {}", e);
                    }
                }
            }
            self.clock.sleep(self.policy.retry_delay);
        }

        Err(TransportError::Connection(
            ConnectionFault::RetriesExhausted { attempts },
        ))
    }

    /// Drop the link (closes the serial handle).
    pub fn close(&mut self) {
        if self.conn.take().is_some() {
            info!("SESSION: connection to {} closed", self.opener.endpoint());
        }
    }

    fn with_conn<T>(
        &mut self,
        op: impl FnOnce(&mut ModbusConnection<O::Link, C>) -> Result<T, TransportError>,
    ) -> Result<T, TransportError> {
        self.connect()?;
        let Some(conn) = self.conn.as_mut() else {
            return Err(TransportError::Connection(ConnectionFault::Disconnected));
        };
        let result = op(conn);
        if let Err(e) = &result {
            if e.is_connection_fault() {
                warn!("SESSION: dropping link after {}", e);
                self.conn = None;
            }
        }
        result
    }
}

impl<O: LinkOpener, C: Clock> RegisterPort for Session<O, C> {
    fn write_register(&mut self, register: Register, value: u16) -> Result<(), TransportError> {
        self.with_conn(|c| c.write_register(register, value))
    }

    fn read_register(&mut self, register: Register) -> Result<u16, TransportError> {
        self.with_conn(|c| c.read_register(register))
    }
}
