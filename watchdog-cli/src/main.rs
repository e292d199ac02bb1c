// SPDX-License-Identifier: MIT
// Copyright (c) 2025 Matthias Bilger <matthias@bilger.info>

mod app;
mod config;

use anyhow::Result;
use clap::Parser;
use config::Config;
use std::path::PathBuf;

/// Client software for the TRS444 USB watchdog
#[derive(Debug, Parser)]
#[command(name = "watchdog-trs444", version, about = "Client software for Watchdog TRS444")]
pub struct Cli {
    /// `reboot` power-cycles the host right away, anything else keeps the watchdog alive
    pub command: Option<String>,

    /// Device VID (hex, default 0x5131)
    #[arg(long, value_parser = parse_hex_u16)]
    pub vid: Option<u16>,

    /// Device PID (hex, default 0x2007)
    #[arg(long, value_parser = parse_hex_u16)]
    pub pid: Option<u16>,

    /// Seconds between two watchdog resets (default 5)
    #[arg(long)]
    pub reset_watchdog_timeout: Option<u32>,

    /// Seconds without a reset before the device reboots the host (default 720)
    #[arg(long)]
    pub reboot_timeout: Option<u32>,

    /// YAML configuration file
    #[arg(long, short)]
    pub config: Option<PathBuf>,

    /// Timeout of one USB transfer in milliseconds, 0 waits forever (default 5000)
    #[arg(long)]
    pub io_timeout_ms: Option<u64>,

    /// Exit when the device does not acknowledge init
    #[arg(long, overrides_with = "no_strict_init")]
    pub strict_init: bool,

    /// Keep running when init is not acknowledged, even if the config file says otherwise
    #[arg(long, overrides_with = "strict_init")]
    pub no_strict_init: bool,

    /// Talk to the built-in device emulator instead of the hardware
    #[arg(long)]
    pub emulate: bool,

    /// Stop after this many ticks
    #[arg(long)]
    pub ticks: Option<u64>,
}

impl Cli {
    /// `Some` when either init flag was given; the last one wins
    pub fn strict_init_override(&self) -> Option<bool> {
        match (self.strict_init, self.no_strict_init) {
            (true, _) => Some(true),
            (_, true) => Some(false),
            _ => None,
        }
    }
}

fn parse_hex_u16(s: &str) -> Result<u16, String> {
    let s = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")).unwrap_or(s);
    u16::from_str_radix(s, 16).map_err(|e| format!("invalid hex value '{s}': {e}"))
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let settings = Config::load(cli.config.as_deref())?.merge(&cli);

    // RUST_LOG takes precedence over the configured level
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(settings.log_level.as_str())).init();

    app::run(settings).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_hex_u16() {
        assert_eq!(parse_hex_u16("0x5131"), Ok(0x5131));
        assert_eq!(parse_hex_u16("0X2007"), Ok(0x2007));
        assert_eq!(parse_hex_u16("2007"), Ok(0x2007));
        assert!(parse_hex_u16("0x12345").is_err());
        assert!(parse_hex_u16("zz").is_err());
    }

    #[test]
    fn test_parse_hex_u16_strips_one_prefix() {
        assert!(parse_hex_u16("0x0x5131").is_err());
        assert!(parse_hex_u16("0X0x5131").is_err());
        assert!(parse_hex_u16("0x").is_err());
    }

    #[test]
    fn test_strict_init_flags() {
        let cli = Cli::parse_from(["watchdog-trs444"]);
        assert_eq!(cli.strict_init_override(), None);

        let cli = Cli::parse_from(["watchdog-trs444", "--strict-init"]);
        assert_eq!(cli.strict_init_override(), Some(true));

        let cli = Cli::parse_from(["watchdog-trs444", "--no-strict-init"]);
        assert_eq!(cli.strict_init_override(), Some(false));

        let cli = Cli::parse_from(["watchdog-trs444", "--strict-init", "--no-strict-init"]);
        assert_eq!(cli.strict_init_override(), Some(false));

        let cli = Cli::parse_from(["watchdog-trs444", "--no-strict-init", "--strict-init"]);
        assert_eq!(cli.strict_init_override(), Some(true));
    }

    #[test]
    fn test_cli_arguments() {
        let cli = Cli::parse_from([
            "watchdog-trs444",
            "--vid",
            "0x1234",
            "--reset-watchdog-timeout",
            "10",
            "--reboot-timeout",
            "360",
            "reboot",
        ]);

        assert_eq!(cli.command.as_deref(), Some("reboot"));
        assert_eq!(cli.vid, Some(0x1234));
        assert_eq!(cli.pid, None);
        assert_eq!(cli.reset_watchdog_timeout, Some(10));
        assert_eq!(cli.reboot_timeout, Some(360));
        assert!(!cli.emulate);
    }

    #[test]
    fn test_cli_rejects_bad_vid() {
        assert!(Cli::try_parse_from(["watchdog-trs444", "--vid", "nope"]).is_err());
    }
}
