// SPDX-License-Identifier: MIT
// Copyright (c) 2025 Matthias Bilger <matthias@bilger.info>

use crate::Cli;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;
use trs444_usb::{
    DeviceInfo, RunMode, SessionConfig, UsbOptions, DEFAULT_IO_TIMEOUT_MILLIS, DEFAULT_REBOOT_TIMEOUT_SECONDS,
    DEFAULT_WATCHDOG_RESET_INTERVAL_SECONDS,
};

/// Root configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub device: DeviceInfo,
    #[serde(default)]
    pub watchdog: WatchdogConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Watchdog timing configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WatchdogConfig {
    #[serde(default = "default_reset_interval")]
    pub reset_interval: u32,
    #[serde(default = "default_reboot_timeout")]
    pub reboot_timeout: u32,
    #[serde(default)]
    pub strict_init: bool,
    #[serde(default = "default_io_timeout_ms")]
    pub io_timeout_ms: u64,
}

impl Default for WatchdogConfig {
    fn default() -> Self {
        Self {
            reset_interval: default_reset_interval(),
            reboot_timeout: default_reboot_timeout(),
            strict_init: false,
            io_timeout_ms: default_io_timeout_ms(),
        }
    }
}

fn default_reset_interval() -> u32 {
    DEFAULT_WATCHDOG_RESET_INTERVAL_SECONDS
}

fn default_reboot_timeout() -> u32 {
    DEFAULT_REBOOT_TIMEOUT_SECONDS
}

fn default_io_timeout_ms() -> u64 {
    DEFAULT_IO_TIMEOUT_MILLIS
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Fully resolved run parameters
#[derive(Debug, Clone)]
pub struct Settings {
    pub device: DeviceInfo,
    pub usb: UsbOptions,
    pub session: SessionConfig,
    pub emulate: bool,
    pub ticks: Option<u64>,
    pub log_level: String,
}

impl Config {
    /// Load configuration from a YAML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to read config file: {:?}", path.as_ref()))?;
        let config: Config = serde_yaml::from_str(&content)
            .with_context(|| "Failed to parse YAML config")?;
        Ok(config)
    }

    /// Load the given file, or the built-in defaults without one
    pub fn load(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::from_file(path),
            None => Ok(Self::default()),
        }
    }

    /// Apply command line arguments on top of the file configuration
    pub fn merge(self, cli: &Cli) -> Settings {
        let device = DeviceInfo {
            vendor_id: cli.vid.unwrap_or(self.device.vendor_id),
            product_id: cli.pid.unwrap_or(self.device.product_id),
        };

        let io_timeout_ms = cli.io_timeout_ms.unwrap_or(self.watchdog.io_timeout_ms);
        let usb = UsbOptions {
            io_timeout: Duration::from_millis(io_timeout_ms),
            ..UsbOptions::default()
        };

        let session = SessionConfig {
            reset_interval_secs: cli.reset_watchdog_timeout.unwrap_or(self.watchdog.reset_interval),
            reboot_timeout_secs: cli.reboot_timeout.unwrap_or(self.watchdog.reboot_timeout),
            mode: RunMode::from_command(cli.command.as_deref()),
            strict_init: cli.strict_init_override().unwrap_or(self.watchdog.strict_init),
        };

        Settings {
            device,
            usb,
            session,
            emulate: cli.emulate,
            ticks: cli.ticks,
            log_level: self.logging.level,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn write_config(content: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_defaults_without_file() {
        let cli = Cli::parse_from(["watchdog-trs444"]);
        let settings = Config::load(None).unwrap().merge(&cli);

        assert_eq!(settings.device, DeviceInfo::default());
        assert_eq!(settings.session, SessionConfig::default());
        assert_eq!(settings.usb.io_timeout, Duration::from_millis(5000));
        assert_eq!(settings.log_level, "info");
        assert!(!settings.emulate);
        assert_eq!(settings.ticks, None);
    }

    #[test]
    fn test_from_file() {
        let file = write_config(
            r#"
device:
  vendor_id: 4660
watchdog:
  reset_interval: 3
  reboot_timeout: 300
  strict_init: true
logging:
  level: debug
"#,
        );

        let config = Config::from_file(file.path()).unwrap();

        assert_eq!(config.device.vendor_id, 0x1234);
        assert_eq!(config.device.product_id, 0x2007);
        assert_eq!(config.watchdog.reset_interval, 3);
        assert_eq!(config.watchdog.reboot_timeout, 300);
        assert!(config.watchdog.strict_init);
        assert_eq!(config.watchdog.io_timeout_ms, 5000);
        assert_eq!(config.logging.level, "debug");
    }

    #[test]
    fn test_cli_overrides_file() {
        let file = write_config(
            r#"
watchdog:
  reset_interval: 3
  reboot_timeout: 300
  io_timeout_ms: 0
"#,
        );
        let cli = Cli::parse_from([
            "watchdog-trs444",
            "--reboot-timeout",
            "600",
            "--pid",
            "beef",
            "reboot",
        ]);

        let settings = Config::load(Some(file.path())).unwrap().merge(&cli);

        assert_eq!(settings.device.product_id, 0xBEEF);
        assert_eq!(settings.session.reset_interval_secs, 3);
        assert_eq!(settings.session.reboot_timeout_secs, 600);
        assert_eq!(settings.session.mode, RunMode::ForceReboot);
        assert_eq!(settings.usb.io_timeout, Duration::ZERO);
    }

    #[test]
    fn test_cli_overrides_strict_init_from_file() {
        let strict = write_config("watchdog:\n  strict_init: true\n");
        let lenient = write_config("watchdog:\n  strict_init: false\n");

        let cli = Cli::parse_from(["watchdog-trs444", "--no-strict-init"]);
        let settings = Config::load(Some(strict.path())).unwrap().merge(&cli);
        assert!(!settings.session.strict_init);

        let cli = Cli::parse_from(["watchdog-trs444", "--strict-init"]);
        let settings = Config::load(Some(lenient.path())).unwrap().merge(&cli);
        assert!(settings.session.strict_init);

        let cli = Cli::parse_from(["watchdog-trs444"]);
        let settings = Config::load(Some(strict.path())).unwrap().merge(&cli);
        assert!(settings.session.strict_init);
    }

    #[test]
    fn test_missing_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let result = Config::from_file(dir.path().join("missing.yaml"));

        assert!(result.is_err());
    }

    #[test]
    fn test_invalid_yaml_is_an_error() {
        let file = write_config("watchdog: [1, 2");

        assert!(Config::from_file(file.path()).is_err());
    }
}
