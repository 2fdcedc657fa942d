//! Adapters: concrete implementations of the hexagonal port traits.
//!
//! | Adapter        | Implements          | Connects to                    |
//! |----------------|---------------------|--------------------------------|
//! | `channel_sink` | EventSink           | Notifier thread (embassy chan) |
//! | `config_file`  | ConfigPort          | JSON file on disk              |
//! | `log_sink`     | EventSink           | `log` output                   |
//! | `notify`       | Notifier, EventSink | JSON lines on stdout + retries |
//! | `serial`       | LinkOpener / Link   | USB serial tty                 |
//! | `time`         | Clock               | `std::time` / virtual time     |
//! | `usb_reset`    | UsbReset            | sysfs USB driver bind/unbind   |

pub mod channel_sink;
pub mod config_file;
pub mod log_sink;
pub mod notify;
#[cfg(feature = "serial")]
pub mod serial;
pub mod time;
pub mod usb_reset;
