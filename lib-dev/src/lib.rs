// SPDX-License-Identifier: MIT
// Copyright (c) 2025 Matthias Bilger <matthias@bilger.info>

//! # TRS444 Watchdog USB Library
//!
//! This library talks to the TRS444 USB hardware watchdog, including:
//! - Command frame encoding (init, reboot, watchdog reset)
//! - Device discovery and bulk endpoint exchange
//! - An in-memory device emulator
//! - The once-per-second watchdog loop

pub mod commands;
pub mod constants;
pub mod emulator;
pub mod usb_device;
pub mod watchdog;

// Re-export commonly used types
pub use commands::{decode_reboot_timeout, encode_reboot_timeout, Command, CommandError, CommandKind, Frame};
pub use constants::*;
pub use emulator::{DeviceEmulator, EmulatedCommand, EmulatorState, Fault};
pub use usb_device::{send_command, CommandFailure, DeviceInfo, Endpoint, Transport, UsbDevice, UsbError, UsbOptions};
pub use watchdog::{RunMode, Session, SessionConfig, Stats, Watchdog, WatchdogError};
