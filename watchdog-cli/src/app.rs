// SPDX-License-Identifier: MIT
// Copyright (c) 2025 Matthias Bilger <matthias@bilger.info>

use crate::config::Settings;
use anyhow::{Context, Result};
use log::{debug, info};
use trs444_usb::{DeviceEmulator, Session, Transport, UsbDevice, Watchdog};

/// Open the device and drive the watchdog until the session ends
pub async fn run(settings: Settings) -> Result<()> {
    // Configuration errors surface before the device is touched
    let session = Session::new(settings.session).context("Invalid watchdog configuration")?;

    let transport: Box<dyn Transport> = if settings.emulate {
        info!("Using the built-in device emulator");
        Box::new(DeviceEmulator::new())
    } else {
        let device = UsbDevice::open(&settings.device, &settings.usb).context("Failed to open watchdog device")?;
        let (endpoint_out, endpoint_in) = device.endpoints();
        let info = device.info();
        debug!(
            "Device {:04x}:{:04x} endpoints: OUT {:#04x} ({:?}), IN {:#04x} ({:?})",
            info.vendor_id,
            info.product_id,
            endpoint_out.address,
            endpoint_out.transfer_type,
            endpoint_in.address,
            endpoint_in.transfer_type
        );
        Box::new(device)
    };

    let mut watchdog = Watchdog::new(session, transport);
    watchdog.run_for(settings.ticks).await?;
    Ok(())
}
