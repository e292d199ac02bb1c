// SPDX-License-Identifier: MIT
// Copyright (c) 2025 Matthias Bilger <matthias@bilger.info>

use crate::commands::{Command, CommandError, CommandKind};
use crate::constants::{
    DEFAULT_REBOOT_TIMEOUT_SECONDS, DEFAULT_WATCHDOG_RESET_INTERVAL_SECONDS, REBOOT_TIMEOUT_STEP_SECONDS,
    TICK_INTERVAL_SECONDS,
};
use crate::usb_device::{send_command, CommandFailure, Transport};
use log::{debug, error, info, warn};
use std::ops::ControlFlow;
use std::time::Duration;
use tokio::time::MissedTickBehavior;

/// What the session does after the init handshake
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RunMode {
    /// Send watchdog resets forever
    #[default]
    KeepAlive,
    /// Send a single reboot command and stop
    ForceReboot,
}

impl RunMode {
    /// Map the optional positional command of the CLI to a mode
    pub fn from_command(command: Option<&str>) -> Self {
        match command {
            Some("reboot") => RunMode::ForceReboot,
            _ => RunMode::KeepAlive,
        }
    }
}

/// Session parameters
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionConfig {
    pub reset_interval_secs: u32,
    pub reboot_timeout_secs: u32,
    pub mode: RunMode,
    /// Abort the session when the device does not acknowledge init
    pub strict_init: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            reset_interval_secs: DEFAULT_WATCHDOG_RESET_INTERVAL_SECONDS,
            reboot_timeout_secs: DEFAULT_REBOOT_TIMEOUT_SECONDS,
            mode: RunMode::KeepAlive,
            strict_init: false,
        }
    }
}

/// Errors that end a watchdog session
#[derive(Debug, thiserror::Error)]
pub enum WatchdogError {
    #[error("Watchdog reset interval must be at least one second")]
    InvalidInterval,

    #[error(transparent)]
    Command(#[from] CommandError),

    #[error("Device did not acknowledge init: {0}")]
    InitFailed(CommandFailure),
}

/// Tick counter and the frames derived from the configuration
#[derive(Debug, Clone)]
pub struct Session {
    config: SessionConfig,
    tick: u64,
    init: Command,
    reboot: Command,
    watchdog_reset: Command,
}

impl Session {
    /// Validate `config` and build the frames for the session.
    ///
    /// Fails before any device I/O when the interval is zero or the reboot
    /// timeout does not fit the protocol.
    pub fn new(config: SessionConfig) -> Result<Self, WatchdogError> {
        if config.reset_interval_secs == 0 {
            return Err(WatchdogError::InvalidInterval);
        }
        warn_if_floored(config.reboot_timeout_secs);
        let watchdog_reset = Command::watchdog_reset(config.reboot_timeout_secs)?;

        Ok(Self {
            config,
            tick: 0,
            init: Command::init(),
            reboot: Command::reboot(),
            watchdog_reset,
        })
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn mode(&self) -> RunMode {
        self.config.mode
    }

    /// Current tick, starting at 0
    pub fn tick(&self) -> u64 {
        self.tick
    }

    /// The cached watchdog reset command
    pub fn watchdog_reset(&self) -> &Command {
        &self.watchdog_reset
    }

    /// Change the reboot timeout; the reset frame is rebuilt only on success
    pub fn set_reboot_timeout(&mut self, seconds: u32) -> Result<(), CommandError> {
        if seconds == self.config.reboot_timeout_secs {
            return Ok(());
        }
        warn_if_floored(seconds);
        self.watchdog_reset = Command::watchdog_reset(seconds)?;
        self.config.reboot_timeout_secs = seconds;
        Ok(())
    }

    /// Command to issue on `tick`, `None` for an idle tick
    pub fn action_for_tick(&self, tick: u64) -> Option<&Command> {
        if tick == 0 {
            return Some(&self.init);
        }

        match self.config.mode {
            RunMode::ForceReboot => Some(&self.reboot),
            RunMode::KeepAlive => {
                let interval = u64::from(self.config.reset_interval_secs);
                (tick % interval == interval - 1).then_some(&self.watchdog_reset)
            }
        }
    }

    fn advance(&mut self) {
        self.tick = self.tick.saturating_add(1);
    }
}

fn warn_if_floored(seconds: u32) {
    if seconds % REBOOT_TIMEOUT_STEP_SECONDS != 0 {
        warn!(
            "Reboot timeout {}s is not a multiple of {}s, the device will use {}s",
            seconds,
            REBOOT_TIMEOUT_STEP_SECONDS,
            seconds - seconds % REBOOT_TIMEOUT_STEP_SECONDS
        );
    }
}

/// Command counters of a session
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Stats {
    pub sent: u64,
    pub ok: u64,
    pub mismatches: u64,
    pub transport_errors: u64,
}

/// Drives a [`Session`] against a [`Transport`], one decision per tick
pub struct Watchdog<T: Transport> {
    session: Session,
    transport: T,
    stats: Stats,
}

impl<T: Transport> Watchdog<T> {
    pub fn new(session: Session, transport: T) -> Self {
        Self {
            session,
            transport,
            stats: Stats::default(),
        }
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    pub fn stats(&self) -> Stats {
        self.stats
    }

    /// Act on the current tick and advance to the next one.
    ///
    /// Returns `Break` once the session is finished, which only happens after
    /// the reboot attempt in force-reboot mode.
    pub fn step(&mut self) -> Result<ControlFlow<()>, WatchdogError> {
        let tick = self.session.tick();
        let Some(command) = self.session.action_for_tick(tick) else {
            debug!("Tick {}: idle", tick);
            self.session.advance();
            return Ok(ControlFlow::Continue(()));
        };

        let kind = command.kind();
        let result = send_command(&mut self.transport, command);
        self.record(kind, &result);
        self.session.advance();

        match (kind, result) {
            (CommandKind::Init, Err(failure)) if self.session.config().strict_init => {
                error!("Stopping: init was not acknowledged");
                Err(WatchdogError::InitFailed(failure))
            }
            (CommandKind::Reboot, _) => Ok(ControlFlow::Break(())),
            _ => Ok(ControlFlow::Continue(())),
        }
    }

    /// Run until the session finishes. In keep-alive mode this never returns
    /// unless init fails under `strict_init`.
    pub async fn run(&mut self) -> Result<(), WatchdogError> {
        self.run_for(None).await
    }

    /// Run until the session finishes or `max_ticks` more ticks have elapsed.
    ///
    /// Every tick waits for the interval first and acts afterwards.
    pub async fn run_for(&mut self, max_ticks: Option<u64>) -> Result<(), WatchdogError> {
        let mut interval = tokio::time::interval(Duration::from_secs(TICK_INTERVAL_SECONDS));
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick completes immediately
        interval.tick().await;

        info!(
            "Watchdog session started ({:?}, reset every {}s, reboot timeout {}s)",
            self.session.mode(),
            self.session.config().reset_interval_secs,
            self.session.config().reboot_timeout_secs
        );

        let mut elapsed = 0u64;
        loop {
            if max_ticks.is_some_and(|max| elapsed >= max) {
                break;
            }
            interval.tick().await;
            elapsed += 1;

            if self.step()?.is_break() {
                break;
            }
        }

        info!(
            "Watchdog session finished after {} ticks: {} sent, {} ok, {} mismatched, {} transport errors",
            self.session.tick(),
            self.stats.sent,
            self.stats.ok,
            self.stats.mismatches,
            self.stats.transport_errors
        );
        Ok(())
    }

    fn record(&mut self, kind: CommandKind, result: &Result<(), CommandFailure>) {
        self.stats.sent += 1;
        match result {
            Ok(()) => {
                self.stats.ok += 1;
                info!("Command {} - OK", kind);
            }
            Err(failure) => {
                match failure {
                    CommandFailure::Mismatch { .. } => self.stats.mismatches += 1,
                    CommandFailure::Transport(_) => self.stats.transport_errors += 1,
                }
                warn!("Error {}: {}", kind, failure);
            }
        }
    }
}
