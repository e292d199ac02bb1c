// SPDX-License-Identifier: MIT
// Copyright (c) 2025 Matthias Bilger <matthias@bilger.info>

use trs444_usb::commands::Command;
use trs444_usb::constants::EMULATOR_HISTORY_LEN;
use trs444_usb::emulator::*;
use trs444_usb::usb_device::{send_command, CommandFailure, Transport, UsbError};

    #[test]
    fn test_emulator_answers_all_commands() {
        let mut emulator = DeviceEmulator::new();

        send_command(&mut emulator, &Command::init()).unwrap();
        send_command(&mut emulator, &Command::watchdog_reset(720).unwrap()).unwrap();
        send_command(&mut emulator, &Command::reboot()).unwrap();

        let state = emulator.state();
        assert!(state.initialized);
        assert!(state.reboot_requested);
        assert_eq!(state.reboot_timeout_secs, Some(720));
        assert_eq!(state.watchdog_resets, 1);
        assert_eq!(
            state.history,
            vec![
                EmulatedCommand::Init,
                EmulatedCommand::WatchdogReset { reboot_timeout_secs: 720 },
                EmulatedCommand::Reboot,
            ]
        );
    }

    #[test]
    fn test_emulator_unknown_command() {
        let mut emulator = DeviceEmulator::new();
        let mut request = [0u8; 64];
        request[0] = 0x01;

        let response = emulator.exchange(&request).unwrap();

        assert!(response.iter().all(|&b| b == 0xFF));
        assert_eq!(emulator.state().history, vec![EmulatedCommand::Unknown(0x01)]);
    }

    #[test]
    fn test_emulator_history_keeps_latest_commands() {
        let mut emulator = DeviceEmulator::new();
        send_command(&mut emulator, &Command::init()).unwrap();

        let reset = Command::watchdog_reset(60).unwrap();
        for _ in 0..EMULATOR_HISTORY_LEN + 50 {
            send_command(&mut emulator, &reset).unwrap();
        }

        let state = emulator.state();
        assert_eq!(state.history.len(), EMULATOR_HISTORY_LEN);
        assert_eq!(state.watchdog_resets as usize, EMULATOR_HISTORY_LEN + 50);
        assert!(state.initialized);
        // Init was the oldest entry and has been dropped
        assert!(state
            .history
            .iter()
            .all(|command| *command == EmulatedCommand::WatchdogReset { reboot_timeout_secs: 60 }));
    }

    #[test]
    fn test_emulator_faults_are_consumed_in_order() {
        let mut emulator = DeviceEmulator::new();
        emulator.inject_fault(Fault::Timeout);
        emulator.inject_fault(Fault::Disconnect);
        emulator.inject_fault(Fault::CorruptResponse);

        let reset = Command::watchdog_reset(60).unwrap();

        assert!(matches!(emulator.exchange(reset.request()), Err(UsbError::Timeout)));
        assert!(matches!(emulator.exchange(reset.request()), Err(UsbError::Disconnected)));
        assert!(matches!(
            send_command(&mut emulator, &reset),
            Err(CommandFailure::Mismatch { offset: 0, .. })
        ));
        assert!(send_command(&mut emulator, &reset).is_ok());

        // Failed transfers never reach the device
        assert_eq!(emulator.state().watchdog_resets, 2);
    }
