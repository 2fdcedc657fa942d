//! Application core.
//!
//! Business rules for the window controller: the frame path
//! ([`service`]) decides when to move, the actuator worker ([`worker`])
//! serialises the moves. All interaction with the outside world happens
//! through **port traits** defined in [`ports`], keeping this layer
//! testable without a serial device.

pub mod commands;
pub mod events;
pub mod ports;
pub mod service;
pub mod worker;
