// SPDX-License-Identifier: MIT
// Copyright (c) 2025 Matthias Bilger <matthias@bilger.info>

use crate::constants::{
    BUFFER_SIZE, INIT_REQUEST_OPCODE, INIT_RESPONSE_OPCODE, MAX_REBOOT_TIMEOUT_SECONDS, REBOOT_MAGIC,
    REBOOT_TIMEOUT_STEP_SECONDS, WATCHDOG_RESET_BASE,
};
use std::fmt;

/// One fixed-size buffer exchanged with the device
pub type Frame = [u8; BUFFER_SIZE];

/// Commands understood by the watchdog
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CommandKind {
    Init,
    Reboot,
    WatchdogReset,
}

impl fmt::Display for CommandKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CommandKind::Init => write!(f, "Init"),
            CommandKind::Reboot => write!(f, "Reboot"),
            CommandKind::WatchdogReset => write!(f, "WatchdogReset"),
        }
    }
}

/// Errors that can occur while building command frames
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CommandError {
    #[error("Reboot timeout {seconds}s cannot be encoded (maximum {max}s)")]
    TimeoutOutOfRange { seconds: u32, max: u32 },
}

/// A request frame together with the response the device must answer with
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
    kind: CommandKind,
    request: Frame,
    response: Frame,
}

impl Command {
    /// Handshake sent once when the session starts
    pub fn init() -> Self {
        Self {
            kind: CommandKind::Init,
            request: frame_with_prefix(&[INIT_REQUEST_OPCODE]),
            response: frame_with_prefix(&[INIT_RESPONSE_OPCODE]),
        }
    }

    /// Immediate power cycle of the monitored system; the device echoes it
    pub fn reboot() -> Self {
        let frame = frame_with_prefix(&REBOOT_MAGIC);
        Self {
            kind: CommandKind::Reboot,
            request: frame,
            response: frame,
        }
    }

    /// Keep-alive carrying the reboot timeout the device should arm
    pub fn watchdog_reset(reboot_timeout_secs: u32) -> Result<Self, CommandError> {
        let frame = frame_with_prefix(&[encode_reboot_timeout(reboot_timeout_secs)?]);
        Ok(Self {
            kind: CommandKind::WatchdogReset,
            request: frame,
            response: frame,
        })
    }

    pub fn kind(&self) -> CommandKind {
        self.kind
    }

    pub fn request(&self) -> &Frame {
        &self.request
    }

    pub fn expected_response(&self) -> &Frame {
        &self.response
    }

    /// Offset of the first byte of `response` that differs from the expected
    /// frame, `None` when the whole frame matches
    pub fn first_mismatch(&self, response: &Frame) -> Option<usize> {
        self.response.iter().zip(response).position(|(e, a)| e != a)
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} [{:#04x}]", self.kind, self.request[0])
    }
}

/// Encode a reboot timeout into the first byte of the watchdog reset frame.
///
/// The device counts in steps of ten seconds, so the value is floored.
pub fn encode_reboot_timeout(seconds: u32) -> Result<u8, CommandError> {
    if seconds > MAX_REBOOT_TIMEOUT_SECONDS {
        return Err(CommandError::TimeoutOutOfRange {
            seconds,
            max: MAX_REBOOT_TIMEOUT_SECONDS,
        });
    }
    Ok(WATCHDOG_RESET_BASE + (seconds / REBOOT_TIMEOUT_STEP_SECONDS) as u8)
}

/// Lower bound of the reboot timeout encoded in `opcode`, or `None` when the
/// byte is below the watchdog reset range
pub fn decode_reboot_timeout(opcode: u8) -> Option<u32> {
    opcode
        .checked_sub(WATCHDOG_RESET_BASE)
        .map(|steps| steps as u32 * REBOOT_TIMEOUT_STEP_SECONDS)
}

fn frame_with_prefix(prefix: &[u8]) -> Frame {
    let mut frame = [0u8; BUFFER_SIZE];
    frame[..prefix.len()].copy_from_slice(prefix);
    frame
}
