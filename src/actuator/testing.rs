//! In-memory register device for unit tests.

use crate::error::TransportError;
use crate::transport::{Register, RegisterPort};

/// Device whose readbacks jump straight to each setpoint. Records every
/// register access in order.
#[derive(Debug, Default)]
pub struct SnapDevice {
    pub regs: [u16; 4],
    pub log: Vec<(char, Register)>,
    /// Lock readback ignores setpoint writes.
    pub stuck_lock: bool,
    /// Leaf readback ignores setpoint writes.
    pub stuck_window: bool,
    /// Writes to this register fail with no response.
    pub reject_writes: Option<Register>,
}

impl SnapDevice {
    /// Device sitting at the default closed, locked position.
    pub fn closed() -> Self {
        let mut dev = Self::default();
        dev.regs[Register::WindowReadback.address() as usize] = 770;
        dev.regs[Register::WindowSetpoint.address() as usize] = 770;
        dev
    }

    pub fn writes(&self) -> Vec<Register> {
        self.log
            .iter()
            .filter(|(kind, _)| *kind == 'w')
            .map(|(_, r)| *r)
            .collect()
    }
}

impl RegisterPort for SnapDevice {
    fn write_register(&mut self, register: Register, value: u16) -> Result<(), TransportError> {
        self.log.push(('w', register));
        if self.reject_writes == Some(register) {
            return Err(TransportError::Write(register));
        }
        self.regs[register.address() as usize] = value;
        let readback = match register {
            Register::WindowSetpoint if !self.stuck_window => Some(Register::WindowReadback),
            Register::LockSetpoint if !self.stuck_lock => Some(Register::LockReadback),
            _ => None,
        };
        if let Some(rb) = readback {
            self.regs[rb.address() as usize] = value;
        }
        Ok(())
    }

    fn read_register(&mut self, register: Register) -> Result<u16, TransportError> {
        self.log.push(('r', register));
        Ok(self.regs[register.address() as usize])
    }
}
