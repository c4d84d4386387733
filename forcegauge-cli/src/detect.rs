use anyhow::{Context, Result};
use rusb::{Device, GlobalContext};
use std::time::Duration;

/// USB identifiers the firmware enumerates with.
pub const GAUGE_VID: u16 = 0x16C0;
pub const GAUGE_PID: u16 = 0x047E;

const USB_TIMEOUT: Duration = Duration::from_secs(1);

/// A force gauge found on the bus.
#[derive(Debug)]
pub struct Attached {
    pub bus: u8,
    pub address: u8,
    /// `None` when the device could not be opened (usually permissions).
    pub product: Option<String>,
}

/// Enumerate USB devices and return every attached force gauge.
pub fn detect() -> Result<Vec<Attached>> {
    let devices = rusb::devices().context("failed to enumerate USB devices")?;
    let mut found = Vec::new();

    for device in devices.iter() {
        let desc = device
            .device_descriptor()
            .context("failed to read device descriptor")?;
        if desc.vendor_id() != GAUGE_VID || desc.product_id() != GAUGE_PID {
            continue;
        }

        found.push(Attached {
            bus: device.bus_number(),
            address: device.address(),
            product: product_string(&device),
        });
    }

    Ok(found)
}

fn product_string(device: &Device<GlobalContext>) -> Option<String> {
    let handle = match device.open() {
        Ok(handle) => handle,
        Err(e) => {
            tracing::debug!(error = %e, "cannot open device (may need root/sudo or udev rules)");
            return None;
        }
    };
    let desc = device.device_descriptor().ok()?;
    let language = handle.read_languages(USB_TIMEOUT).ok()?.into_iter().next()?;
    handle
        .read_product_string(language, &desc, USB_TIMEOUT)
        .ok()
}
