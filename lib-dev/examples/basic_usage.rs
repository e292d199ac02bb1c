// SPDX-License-Identifier: MIT
// Copyright (c) 2025 Matthias Bilger <matthias@bilger.info>

use trs444_usb::{DeviceEmulator, Fault, Session, SessionConfig, Watchdog};

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    // Reset every 3 seconds and arm a 5 minute reboot timeout
    let session = Session::new(SessionConfig {
        reset_interval_secs: 3,
        reboot_timeout_secs: 300,
        ..SessionConfig::default()
    })?;
    let mut watchdog = Watchdog::new(session, DeviceEmulator::new());

    // Init and the first reset
    watchdog.run_for(Some(3)).await?;

    // Lose the next reset on the wire, the loop carries on
    watchdog.transport_mut().inject_fault(Fault::Timeout);
    watchdog.run_for(Some(6)).await?;

    let state = watchdog.transport().state();
    println!(
        "Device saw {} resets, reboot armed in {:?}s",
        state.watchdog_resets, state.reboot_timeout_secs
    );

    Ok(())
}
