//! catwindow library.
//!
//! Exposes the presence logic, actuator control and Modbus transport for
//! the `catwindow` binary and for integration testing. The serial adapter
//! sits behind the `serial` feature, which the fuzz targets leave off.

#![deny(unused_must_use)]

pub mod actuator;
pub mod adapters;
pub mod app;
pub mod config;
pub mod diagnostics;
pub mod error;
pub mod presence;
pub mod retry;
pub mod runner;
pub mod shutdown;
pub mod transport;
