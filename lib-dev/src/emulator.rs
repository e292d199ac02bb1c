// SPDX-License-Identifier: MIT
// Copyright (c) 2025 Matthias Bilger <matthias@bilger.info>

use crate::commands::{decode_reboot_timeout, Frame};
use crate::constants::{
    BUFFER_SIZE, EMULATOR_HISTORY_LEN, INIT_REQUEST_OPCODE, INIT_RESPONSE_OPCODE, REBOOT_MAGIC,
};
use crate::usb_device::{Transport, UsbError};
use std::collections::VecDeque;

/// Command as decoded by the emulated device
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmulatedCommand {
    Init,
    Reboot,
    WatchdogReset { reboot_timeout_secs: u32 },
    Unknown(u8),
}

/// Failure the emulator produces instead of answering normally
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fault {
    Disconnect,
    Timeout,
    /// Process the command but flip the first byte of the reply
    CorruptResponse,
}

/// Device emulator state
#[derive(Debug, Clone, Default)]
pub struct EmulatorState {
    pub initialized: bool,
    pub reboot_requested: bool,
    pub reboot_timeout_secs: Option<u32>,
    pub watchdog_resets: u32,
    /// Most recent commands, at most [`EMULATOR_HISTORY_LEN`]
    pub history: VecDeque<EmulatedCommand>,
}

/// In-memory TRS444 answering the way the hardware does
#[derive(Debug, Default)]
pub struct DeviceEmulator {
    state: EmulatorState,
    faults: VecDeque<Fault>,
}

impl DeviceEmulator {
    /// Create a new device emulator
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> &EmulatorState {
        &self.state
    }

    /// Queue a fault for the next exchange; faults are consumed in order
    pub fn inject_fault(&mut self, fault: Fault) {
        self.faults.push_back(fault);
    }

    /// Process one request frame and produce the device's reply
    pub fn process_command(&mut self, request: &Frame) -> Frame {
        let command = decode(request);
        if self.state.history.len() == EMULATOR_HISTORY_LEN {
            self.state.history.pop_front();
        }
        self.state.history.push_back(command);

        match command {
            EmulatedCommand::Init => {
                log::debug!("Init received");
                self.state.initialized = true;
                let mut response = [0u8; BUFFER_SIZE];
                response[0] = INIT_RESPONSE_OPCODE;
                response
            }
            EmulatedCommand::Reboot => {
                log::debug!("Reboot requested");
                self.state.reboot_requested = true;
                *request
            }
            EmulatedCommand::WatchdogReset { reboot_timeout_secs } => {
                log::debug!("Watchdog reset, reboot armed in {}s", reboot_timeout_secs);
                self.state.reboot_timeout_secs = Some(reboot_timeout_secs);
                self.state.watchdog_resets += 1;
                *request
            }
            EmulatedCommand::Unknown(opcode) => {
                log::warn!("Unknown command: {:#x}", opcode);
                [0xFF; BUFFER_SIZE]
            }
        }
    }
}

impl Transport for DeviceEmulator {
    fn exchange(&mut self, request: &Frame) -> Result<Frame, UsbError> {
        match self.faults.pop_front() {
            Some(Fault::Disconnect) => Err(UsbError::Disconnected),
            Some(Fault::Timeout) => Err(UsbError::Timeout),
            Some(Fault::CorruptResponse) => {
                let mut response = self.process_command(request);
                response[0] = !response[0];
                Ok(response)
            }
            None => Ok(self.process_command(request)),
        }
    }
}

// Reboot and init take precedence over the reset range they overlap with.
fn decode(request: &Frame) -> EmulatedCommand {
    if request[..REBOOT_MAGIC.len()] == REBOOT_MAGIC {
        return EmulatedCommand::Reboot;
    }

    match request[0] {
        INIT_REQUEST_OPCODE => EmulatedCommand::Init,
        opcode => match decode_reboot_timeout(opcode) {
            Some(reboot_timeout_secs) => EmulatedCommand::WatchdogReset { reboot_timeout_secs },
            None => EmulatedCommand::Unknown(opcode),
        },
    }
}
