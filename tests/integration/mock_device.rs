//! Mock actuator controller for integration tests.
//!
//! One shared [`DeviceModel`] can be reached two ways:
//! - [`MockDevice`]: register-level, implements `RegisterPort` directly.
//! - [`SlaveLink`]: byte-level, answers real Modbus RTU frames, so the
//!   whole `Session → ModbusConnection → codec` stack is exercised.
//!
//! Every access is recorded so tests can assert on the exact wire history.

use std::collections::VecDeque;
use std::io;
use std::sync::{Arc, Mutex, MutexGuard};

use catwindow::app::events::AppEvent;
use catwindow::app::ports::EventSink;
use catwindow::error::{ConnectionFault, TransportError};
use catwindow::transport::codec::{FN_READ_HOLDING, FN_WRITE_SINGLE, crc16};
use catwindow::transport::link::{Link, LinkOpener};
use catwindow::transport::{Register, RegisterPort};

// ── Device model ──────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    Write(Register, u16),
    Read(Register),
}

#[derive(Debug)]
pub struct DeviceModel {
    pub regs: [u16; 4],
    pub log: Vec<Access>,
    /// Leaf readback frozen at this raw value regardless of setpoint.
    pub window_stuck_at: Option<u16>,
    /// Every access fails as a dropped link.
    pub offline: bool,
}

impl DeviceModel {
    fn register(address: u16) -> Option<Register> {
        match address {
            0 => Some(Register::WindowSetpoint),
            1 => Some(Register::WindowReadback),
            2 => Some(Register::LockSetpoint),
            3 => Some(Register::LockReadback),
            _ => None,
        }
    }

    fn write(&mut self, register: Register, value: u16) {
        self.log.push(Access::Write(register, value));
        self.regs[register.address() as usize] = value;
        match register {
            Register::WindowSetpoint => {
                let rb = self.window_stuck_at.unwrap_or(value);
                self.regs[Register::WindowReadback.address() as usize] = rb;
            }
            Register::LockSetpoint => {
                self.regs[Register::LockReadback.address() as usize] = value;
            }
            _ => {}
        }
    }

    fn read(&mut self, register: Register) -> u16 {
        self.log.push(Access::Read(register));
        self.regs[register.address() as usize]
    }
}

// ── Register-level mock ───────────────────────────────────────

#[derive(Clone)]
pub struct MockDevice(Arc<Mutex<DeviceModel>>);

#[allow(dead_code)]
impl MockDevice {
    /// Closed (77.0°) and locked (0.0°).
    pub fn closed() -> Self {
        let mut regs = [0u16; 4];
        regs[Register::WindowSetpoint.address() as usize] = 770;
        regs[Register::WindowReadback.address() as usize] = 770;
        Self(Arc::new(Mutex::new(DeviceModel {
            regs,
            log: Vec::new(),
            window_stuck_at: None,
            offline: false,
        })))
    }

    pub fn model(&self) -> MutexGuard<'_, DeviceModel> {
        self.0.lock().unwrap()
    }

    /// Freeze the leaf readback at `angle` degrees.
    pub fn stick_window_at(&self, angle: f32) {
        let raw = (angle * 10.0).round() as u16;
        let mut m = self.model();
        m.window_stuck_at = Some(raw);
        m.regs[Register::WindowReadback.address() as usize] = raw;
    }

    pub fn set_offline(&self, offline: bool) {
        self.model().offline = offline;
    }

    pub fn writes(&self) -> Vec<(Register, u16)> {
        self.model()
            .log
            .iter()
            .filter_map(|a| match *a {
                Access::Write(r, v) => Some((r, v)),
                Access::Read(_) => None,
            })
            .collect()
    }

    pub fn clear_log(&self) {
        self.model().log.clear();
    }

    pub fn window_angle(&self) -> f32 {
        f32::from(self.model().regs[Register::WindowReadback.address() as usize]) / 10.0
    }

    pub fn lock_angle(&self) -> f32 {
        f32::from(self.model().regs[Register::LockReadback.address() as usize]) / 10.0
    }

    pub fn link(&self) -> SlaveLink {
        SlaveLink {
            device: self.clone(),
            slave: 1,
            pending: VecDeque::new(),
        }
    }
}

impl RegisterPort for MockDevice {
    fn write_register(&mut self, register: Register, value: u16) -> Result<(), TransportError> {
        let mut m = self.model();
        if m.offline {
            return Err(TransportError::Connection(ConnectionFault::Disconnected));
        }
        m.write(register, value);
        Ok(())
    }

    fn read_register(&mut self, register: Register) -> Result<u16, TransportError> {
        let mut m = self.model();
        if m.offline {
            return Err(TransportError::Connection(ConnectionFault::Disconnected));
        }
        Ok(m.read(register))
    }
}

// ── Byte-level Modbus slave ───────────────────────────────────

pub struct SlaveLink {
    device: MockDevice,
    slave: u8,
    pending: VecDeque<u8>,
}

fn with_crc(mut frame: Vec<u8>) -> Vec<u8> {
    let crc = crc16(&frame);
    frame.extend_from_slice(&crc.to_le_bytes());
    frame
}

impl SlaveLink {
    fn answer(&mut self, request: &[u8]) {
        if request.len() != 8 || request[0] != self.slave {
            return; // not for us: stay silent
        }
        let body = &request[..6];
        if crc16(body).to_le_bytes() != [request[6], request[7]] {
            return;
        }
        let function = request[1];
        let address = u16::from_be_bytes([request[2], request[3]]);
        let value = u16::from_be_bytes([request[4], request[5]]);
        let Some(register) = DeviceModel::register(address) else {
            // Illegal data address.
            self.pending
                .extend(with_crc(vec![self.slave, function | 0x80, 0x02]));
            return;
        };
        let mut m = self.device.model();
        match function {
            FN_WRITE_SINGLE => {
                m.write(register, value);
                self.pending.extend(request.iter().copied());
            }
            FN_READ_HOLDING => {
                let v = m.read(register).to_be_bytes();
                self.pending
                    .extend(with_crc(vec![self.slave, FN_READ_HOLDING, 2, v[0], v[1]]));
            }
            _ => self
                .pending
                .extend(with_crc(vec![self.slave, function | 0x80, 0x01])),
        }
    }
}

impl Link for SlaveLink {
    type Error = io::Error;

    fn read(&mut self, buf: &mut [u8]) -> Result<usize, io::Error> {
        if self.device.model().offline {
            return Err(io::Error::new(io::ErrorKind::BrokenPipe, "unplugged"));
        }
        let n = buf.len().min(self.pending.len());
        for (slot, byte) in buf.iter_mut().zip(self.pending.drain(..n)) {
            *slot = byte;
        }
        Ok(n)
    }

    fn write(&mut self, data: &[u8]) -> Result<usize, io::Error> {
        if self.device.model().offline {
            return Err(io::Error::new(io::ErrorKind::BrokenPipe, "unplugged"));
        }
        self.answer(data);
        Ok(data.len())
    }

    fn flush(&mut self) -> Result<(), io::Error> {
        Ok(())
    }

    fn clear_input(&mut self) -> Result<(), io::Error> {
        self.pending.clear();
        Ok(())
    }
}

/// Opens [`SlaveLink`]s; fails while the device is offline.
pub struct SlaveOpener {
    pub device: MockDevice,
    pub opens: usize,
}

impl LinkOpener for SlaveOpener {
    type Link = SlaveLink;

    fn open(&mut self) -> Result<SlaveLink, TransportError> {
        if self.device.model().offline {
            return Err(TransportError::Connection(ConnectionFault::PortUnavailable));
        }
        self.opens += 1;
        Ok(self.device.link())
    }

    fn endpoint(&self) -> &str {
        "mock://slave"
    }
}

// ── Recording sink ────────────────────────────────────────────

#[derive(Clone, Default)]
pub struct RecordingSink(Arc<Mutex<Vec<AppEvent>>>);

#[allow(dead_code)]
impl RecordingSink {
    pub fn events(&self) -> Vec<AppEvent> {
        self.0.lock().unwrap().clone()
    }
}

impl EventSink for RecordingSink {
    fn emit(&mut self, event: &AppEvent) {
        self.0.lock().unwrap().push(event.clone());
    }
}
