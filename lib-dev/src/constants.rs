// SPDX-License-Identifier: MIT
// Copyright (c) 2025 Matthias Bilger <matthias@bilger.info>

/// Size of every frame exchanged with the device, in both directions
pub const BUFFER_SIZE: usize = 0x40;

/// Default USB vendor ID of the TRS444 watchdog
pub const DEFAULT_VENDOR_ID: u16 = 0x5131;

/// Default USB product ID of the TRS444 watchdog
pub const DEFAULT_PRODUCT_ID: u16 = 0x2007;

/// Time without a watchdog reset after which the device power-cycles the host
pub const DEFAULT_REBOOT_TIMEOUT_SECONDS: u32 = 360 * 2;

/// Seconds between two watchdog reset commands
pub const DEFAULT_WATCHDOG_RESET_INTERVAL_SECONDS: u32 = 5;

/// Timeout applied to each USB transfer. Zero means wait forever.
pub const DEFAULT_IO_TIMEOUT_MILLIS: u64 = 5000;

/// Length of one scheduling tick
pub const TICK_INTERVAL_SECONDS: u64 = 1;

/// First byte of the init request
pub const INIT_REQUEST_OPCODE: u8 = 0x80;

/// First byte of the init response
pub const INIT_RESPONSE_OPCODE: u8 = 0x81;

/// Leading bytes of the reboot request and its echo
pub const REBOOT_MAGIC: [u8; 2] = [0xFF, 0x55];

/// Opcode offset the encoded reboot timeout is added to
pub const WATCHDOG_RESET_BASE: u8 = 0x0C;

/// Resolution of the encoded reboot timeout
pub const REBOOT_TIMEOUT_STEP_SECONDS: u32 = 10;

/// Largest reboot timeout that still encodes into one byte
pub const MAX_REBOOT_TIMEOUT_SECONDS: u32 =
    (u8::MAX - WATCHDOG_RESET_BASE) as u32 * REBOOT_TIMEOUT_STEP_SECONDS + (REBOOT_TIMEOUT_STEP_SECONDS - 1);

/// Interface carrying the command endpoints
pub const USB_INTERFACE: u8 = 0;

/// Alternate setting of [`USB_INTERFACE`] carrying the command endpoints
pub const USB_ALT_SETTING: u8 = 0;

/// Number of decoded commands the emulator keeps, oldest dropped first
pub const EMULATOR_HISTORY_LEN: usize = 100;
