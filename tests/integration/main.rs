//! Integration test driver for `tests/integration/` submodules.
//!
//! Everything runs on the host against the mock device in `mock_device`;
//! no serial hardware is needed.

mod controller_scenarios;
mod mock_device;
mod modbus_stack_tests;
mod runner_tests;
