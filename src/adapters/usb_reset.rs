//! Sysfs USB unbind / rebind for a wedged USB-serial adapter.
//!
//! Resolves `/dev/<tty>` to its USB device (e.g. `1-1.2`) through
//! `/sys/class/tty/<tty>/device` and cycles it through the generic USB
//! driver. Needs write access to `/sys/bus/usb/drivers/usb/`.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use log::info;

use crate::app::ports::Clock;
use crate::transport::link::UsbReset;

const USB_DRIVER_DIR: &str = "/sys/bus/usb/drivers/usb";
const UNBIND_PAUSE: Duration = Duration::from_secs(1);
const REBIND_PAUSE: Duration = Duration::from_secs(2);

pub struct SysfsUsbReset<C: Clock> {
    port: PathBuf,
    clock: C,
}

impl<C: Clock> SysfsUsbReset<C> {
    pub fn new(port: impl Into<PathBuf>, clock: C) -> Self {
        Self {
            port: port.into(),
            clock,
        }
    }

    fn resolve_device(&self) -> io::Result<String> {
        // Follow udev symlinks such as /dev/ttyCAT -> /dev/ttyUSB0.
        let tty = fs::canonicalize(&self.port)?;
        let name = tty
            .file_name()
            .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "port has no file name"))?;
        let device = fs::canonicalize(Path::new("/sys/class/tty").join(name).join("device"))?;
        usb_device_id(&device)
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, "no USB device in sysfs path"))
    }
}

/// Deepest USB device name (`<bus>-<port>[.<port>...]`) in a sysfs path.
///
/// Interface nodes (`1-1.2:1.0`) and host controllers are skipped.
pub fn usb_device_id(sysfs_path: &Path) -> Option<String> {
    sysfs_path
        .components()
        .filter_map(|c| c.as_os_str().to_str())
        .rev()
        .find(|s| is_usb_device_name(s))
        .map(str::to_owned)
}

fn is_usb_device_name(s: &str) -> bool {
    let Some((bus, ports)) = s.split_once('-') else {
        return false;
    };
    !bus.is_empty()
        && bus.bytes().all(|b| b.is_ascii_digit())
        && !ports.is_empty()
        && ports.bytes().all(|b| b.is_ascii_digit() || b == b'.')
}

impl<C: Clock> UsbReset for SysfsUsbReset<C> {
    fn reset(&mut self) -> io::Result<()> {
        let id = self.resolve_device()?;
        info!("USB: resetting {} ({})", id, self.port.display());
        fs::write(Path::new(USB_DRIVER_DIR).join("unbind"), &id)?;
        self.clock.sleep(UNBIND_PAUSE);
        fs::write(Path::new(USB_DRIVER_DIR).join("bind"), &id)?;
        self.clock.sleep(REBIND_PAUSE);
        info!("USB: {} rebound", id);
        Ok(())
    }
}
