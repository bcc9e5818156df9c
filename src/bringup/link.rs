//! Link configuration: reset, baud negotiation, and recovery paths.
//!
//! The controller cannot safely change its own UART rate while commands are
//! in flight, so every rate transition here is bracketed by flushes to keep
//! bytes from the switch window out of the next frame's header.

use tracing::{debug, error, info};

use super::command::{self, PowerMode, OPCODE_CHANGE_BAUD_RATE, OPCODE_INBAND_RESET, OPCODE_RESET,
    OPCODE_SET_SLEEP_MODE, OPCODE_BLE_WAKEUP, WAKEUP_SUBCODE_EXIT_HEARTBEAT};
use super::config::{
    BAUD_SETTLE_DELAY, POLL_CONFIG_INTERVAL, POLL_MAX_TIMEOUT, POLL_RETRY_INTERVAL,
    REOPEN_SETTLE_DELAY, RUNTIME_BAUD_CHANGE_SET,
};
use super::cycle::await_command_complete;
use super::error::{BringupError, BringupResult};
use super::reader::read_event;
use super::transport::UartTransport;
use super::validator::{classify, NoEscalation, Outcome, RecoveryAction};

/// Issue the controller reset command and confirm its completion.
///
/// This is both an explicit bring-up step and the universal recovery action
/// after a hardware error event. Its confirmation cycle runs without
/// escalation, so a hardware error during the reset itself cannot recurse;
/// it is simply discarded until the cycle's own deadline expires.
pub fn send_hci_reset(uart: &mut dyn UartTransport) -> BringupResult<()> {
    uart.write(&command::reset()).map_err(|e| {
        error!(error = %e, "failed to write reset command");
        BringupError::WriteFailed { command: "RESET" }
    })?;
    await_command_complete(
        uart,
        OPCODE_RESET,
        POLL_CONFIG_INTERVAL,
        POLL_MAX_TIMEOUT,
        &mut NoEscalation,
    )?;
    debug!("controller reset completed successfully");
    Ok(())
}

/// Recovery action issuing a controller reset, per the core protocol's
/// mandatory handling of hardware error events.
pub struct HciResetEscalation;

impl RecoveryAction for HciResetEscalation {
    fn on_hardware_error(
        &mut self,
        uart: &mut dyn UartTransport,
        code: Option<u8>,
    ) -> BringupResult<()> {
        error!(code, "hardware error event, issuing controller reset");
        send_hci_reset(uart)
    }
}

/// Negotiate the operating baud rate.
///
/// Differing rates: clock the host line at the initialization rate, reset
/// the controller, request the runtime rate change when the target is one
/// the controller accepts, wait for its firmware to re-clock, then move the
/// host line to the target with hardware flow control. Equal rates: flush
/// and reacquire the device at the target rate (some platform drivers only
/// apply the mode switch on a fresh open).
pub fn configure_link(
    uart: &mut dyn UartTransport,
    init_baud: u32,
    target_baud: u32,
) -> BringupResult<()> {
    if init_baud != target_baud {
        uart.set_baud_rate(init_baud)?;
        send_hci_reset(uart)?;

        if RUNTIME_BAUD_CHANGE_SET.contains(&target_baud) {
            debug!(target_baud, "requesting controller baud rate change");
            uart.write(&command::change_baud_rate(target_baud))
                .map_err(|e| {
                    error!(error = %e, "failed to write baud rate change command");
                    BringupError::WriteFailed {
                        command: "CHANGE_BAUD_RATE",
                    }
                })?;
            await_command_complete(
                uart,
                OPCODE_CHANGE_BAUD_RATE,
                POLL_CONFIG_INTERVAL,
                POLL_MAX_TIMEOUT,
                &mut HciResetEscalation,
            )?;
            debug!(target_baud, "controller baud rate changed");
        } else {
            debug!(
                target_baud,
                init_baud, "rate not in runtime change set, controller stays at init rate"
            );
        }

        // Let the controller's own rate switch finish in firmware.
        std::thread::sleep(BAUD_SETTLE_DELAY);

        uart.flush_input()?;
        uart.set_baud_rate(target_baud)?;
        uart.set_flow_control(true)?;
        uart.flush_all()?;
    } else {
        debug!(target_baud, "host already at target rate, reopening device");
        uart.flush_input()?;
        uart.reopen(target_baud, true)?;
        std::thread::sleep(REOPEN_SETTLE_DELAY);
        uart.flush_all()?;
    }

    std::thread::sleep(REOPEN_SETTLE_DELAY);
    info!(target_baud, "link configured");
    Ok(())
}

/// Restore communication with an already-initialized controller via an
/// in-band independent reset, without a full firmware re-download.
///
/// The link reopens at the last remembered rate with flow control enabled
/// (the running controller still honors CTS/RTS), the in-band reset is
/// confirmed, and the link reopens at the target rate with flow control
/// disabled, matching the controller's post-reset expectations.
pub fn inband_independent_reset(
    uart: &mut dyn UartTransport,
    last_baud: u32,
    target_baud: u32,
) -> BringupResult<()> {
    uart.reopen(last_baud, true)?;
    debug!(last_baud, "link reopened with flow control for in-band reset");
    uart.flush_all()?;

    uart.write(&command::inband_reset()).map_err(|e| {
        error!(error = %e, "failed to write in-band reset command");
        BringupError::WriteFailed {
            command: "INBAND_RESET",
        }
    })?;
    await_command_complete(
        uart,
        OPCODE_INBAND_RESET,
        POLL_RETRY_INTERVAL,
        POLL_MAX_TIMEOUT,
        &mut HciResetEscalation,
    )?;
    info!("in-band independent reset confirmed");

    uart.reopen(target_baud, false)?;
    debug!(target_baud, "link reopened without flow control after reset");
    Ok(())
}

/// Configure the controller's low-power mode and confirm completion.
pub fn configure_low_power(uart: &mut dyn UartTransport, mode: PowerMode) -> BringupResult<()> {
    debug!(?mode, "configuring low-power mode");
    uart.write(&command::set_sleep_mode(mode)).map_err(|e| {
        error!(error = %e, "failed to write sleep mode command");
        BringupError::WriteFailed {
            command: "SET_SLEEP_MODE",
        }
    })?;
    await_command_complete(
        uart,
        OPCODE_SET_SLEEP_MODE,
        POLL_CONFIG_INTERVAL,
        POLL_MAX_TIMEOUT,
        &mut HciResetEscalation,
    )?;
    info!(?mode, "low-power mode configured");
    Ok(())
}

/// Take the controller out of heartbeat mode before teardown.
///
/// Best effort: the single response read uses a short budget and failures
/// are logged only, since the session is closing either way. Returns true
/// only when the controller confirmed the exit with the matching opcode
/// and the heartbeat-exit subcode.
pub fn exit_heartbeat_mode(uart: &mut dyn UartTransport) -> bool {
    debug!("sending heartbeat exit command");
    if let Err(e) = uart.write(&command::wakeup_disable()) {
        debug!(error = %e, "failed to write heartbeat exit command");
        return false;
    }
    if let Ok(evt) = read_event(uart, POLL_RETRY_INTERVAL, POLL_CONFIG_INTERVAL) {
        if classify(&evt, OPCODE_BLE_WAKEUP) == Outcome::Matched
            && evt.subcode() == Some(WAKEUP_SUBCODE_EXIT_HEARTBEAT)
        {
            debug!("heartbeat exit confirmed");
            return true;
        }
    }
    debug!("no heartbeat exit confirmation before teardown");
    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bringup::command::Opcode;
    use crate::bringup::config::{
        HCI_EVENT_COMMAND_COMPLETE, HCI_EVENT_HARDWARE_ERROR, HCI_PACKET_COMMAND, HCI_PACKET_EVENT,
    };
    use crate::bringup::transport::MockUartTransport;
    use mockall::Sequence;

    /// Queue a completion frame for `opcode` on the mock reader path.
    fn expect_completion(mock: &mut MockUartTransport, opcode: Opcode) {
        let le = opcode.0.to_le_bytes();
        let header = [HCI_PACKET_EVENT, HCI_EVENT_COMMAND_COMPLETE, 4];
        let params = [0x01, le[0], le[1], 0x00];
        mock.expect_bytes_available().times(1).returning(|| Ok(3));
        mock.expect_read().times(1).returning(move |buf: &mut [u8]| {
            buf[..3].copy_from_slice(&header);
            Ok(3)
        });
        mock.expect_bytes_available().times(1).returning(|| Ok(4));
        mock.expect_read().times(1).returning(move |buf: &mut [u8]| {
            buf[..4].copy_from_slice(&params);
            Ok(4)
        });
    }

    /// Queue a hardware error frame on the mock reader path.
    fn expect_hardware_error(mock: &mut MockUartTransport) {
        let header = [HCI_PACKET_EVENT, HCI_EVENT_HARDWARE_ERROR, 1];
        mock.expect_bytes_available().times(1).returning(|| Ok(3));
        mock.expect_read().times(1).returning(move |buf: &mut [u8]| {
            buf[..3].copy_from_slice(&header);
            Ok(3)
        });
        mock.expect_bytes_available().times(1).returning(|| Ok(1));
        mock.expect_read().times(1).returning(|buf: &mut [u8]| {
            buf[0] = 0x42;
            Ok(1)
        });
    }

    fn expect_command_write(mock: &mut MockUartTransport, opcode: Opcode) {
        mock.expect_write()
            .withf(move |data: &[u8]| {
                data[0] == HCI_PACKET_COMMAND
                    && u16::from_le_bytes([data[1], data[2]]) == opcode.0
            })
            .times(1)
            .returning(|_| Ok(()));
    }

    #[test]
    fn test_reset_is_idempotent_on_healthy_link() {
        let mut mock = MockUartTransport::new();
        expect_command_write(&mut mock, OPCODE_RESET);
        expect_completion(&mut mock, OPCODE_RESET);
        expect_command_write(&mut mock, OPCODE_RESET);
        expect_completion(&mut mock, OPCODE_RESET);

        send_hci_reset(&mut mock).unwrap();
        send_hci_reset(&mut mock).unwrap();
    }

    #[test]
    fn test_reset_write_failure_reported() {
        let mut mock = MockUartTransport::new();
        mock.expect_write()
            .times(1)
            .returning(|_| Err(BringupError::Io(std::io::ErrorKind::BrokenPipe.into())));
        let err = send_hci_reset(&mut mock).unwrap_err();
        assert!(matches!(err, BringupError::WriteFailed { command: "RESET" }));
    }

    #[test]
    fn test_hardware_error_escalates_to_single_reset() {
        let mut mock = MockUartTransport::new();
        // Hardware error during a change-baud cycle: one reset write, whose
        // confirmation is itself a hardware error, discarded without another
        // reset until the matching reset completion arrives.
        expect_hardware_error(&mut mock);
        expect_command_write(&mut mock, OPCODE_RESET);
        expect_hardware_error(&mut mock);
        expect_completion(&mut mock, OPCODE_RESET);

        await_command_complete(
            &mut mock,
            OPCODE_CHANGE_BAUD_RATE,
            POLL_RETRY_INTERVAL,
            POLL_MAX_TIMEOUT,
            &mut HciResetEscalation,
        )
        .unwrap();
    }

    #[test]
    fn test_configure_link_differing_rates() {
        // Scenario: init 115200, target 3000000. Reset, rate change,
        // settle, host rate switch with flow control.
        let mut mock = MockUartTransport::new();
        let mut seq = Sequence::new();

        mock.expect_set_baud_rate()
            .withf(|&b| b == 115_200)
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(()));

        expect_command_write(&mut mock, OPCODE_RESET);
        expect_completion(&mut mock, OPCODE_RESET);
        expect_command_write(&mut mock, OPCODE_CHANGE_BAUD_RATE);
        expect_completion(&mut mock, OPCODE_CHANGE_BAUD_RATE);

        mock.expect_flush_input().times(1).returning(|| Ok(()));
        mock.expect_flush_all().times(1).returning(|| Ok(()));
        mock.expect_set_baud_rate()
            .withf(|&b| b == 3_000_000)
            .times(1)
            .returning(|_| Ok(()));
        mock.expect_set_flow_control()
            .withf(|&on| on)
            .times(1)
            .returning(|_| Ok(()));

        configure_link(&mut mock, 115_200, 3_000_000).unwrap();
    }

    #[test]
    fn test_configure_link_same_rate_reopens() {
        // Scenario: both rates 3000000. No reset, no rate change command;
        // flush input, reopen with flow control, flush.
        let mut mock = MockUartTransport::new();
        mock.expect_flush_input().times(1).returning(|| Ok(()));
        mock.expect_flush_all().times(1).returning(|| Ok(()));
        mock.expect_reopen()
            .withf(|&baud, &flow| baud == 3_000_000 && flow)
            .times(1)
            .returning(|_, _| Ok(()));

        configure_link(&mut mock, 3_000_000, 3_000_000).unwrap();
    }

    #[test]
    fn test_configure_link_unsupported_target_skips_rate_change() {
        // Scenario: target 9600 is outside the runtime change set. Reset
        // runs, the rate change command is never written, the host still
        // moves to 9600.
        let mut mock = MockUartTransport::new();

        mock.expect_set_baud_rate()
            .withf(|&b| b == 115_200)
            .times(1)
            .returning(|_| Ok(()));
        expect_command_write(&mut mock, OPCODE_RESET);
        expect_completion(&mut mock, OPCODE_RESET);
        mock.expect_flush_input().times(1).returning(|| Ok(()));
        mock.expect_flush_all().times(1).returning(|| Ok(()));
        mock.expect_set_baud_rate()
            .withf(|&b| b == 9_600)
            .times(1)
            .returning(|_| Ok(()));
        mock.expect_set_flow_control().times(1).returning(|_| Ok(()));

        configure_link(&mut mock, 115_200, 9_600).unwrap();
    }

    #[test]
    fn test_configure_link_aborts_on_reset_failure() {
        let mut mock = MockUartTransport::new();
        mock.expect_set_baud_rate().times(1).returning(|_| Ok(()));
        expect_command_write(&mut mock, OPCODE_RESET);
        // Nothing ever arrives for the reset confirmation.
        mock.expect_bytes_available().returning(|| Ok(0));

        let err = configure_link(&mut mock, 115_200, 3_000_000).unwrap_err();
        assert!(err.is_timeout());
    }

    #[test]
    fn test_inband_reset_sequence() {
        let mut mock = MockUartTransport::new();
        let mut seq = Sequence::new();

        mock.expect_reopen()
            .withf(|&baud, &flow| baud == 3_000_000 && flow)
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _| Ok(()));
        mock.expect_flush_all().times(1).returning(|| Ok(()));
        expect_command_write(&mut mock, OPCODE_INBAND_RESET);
        expect_completion(&mut mock, OPCODE_INBAND_RESET);
        mock.expect_reopen()
            .withf(|&baud, &flow| baud == 115_200 && !flow)
            .times(1)
            .returning(|_, _| Ok(()));

        inband_independent_reset(&mut mock, 3_000_000, 115_200).unwrap();
    }

    #[test]
    fn test_inband_reset_aborts_on_reopen_failure() {
        let mut mock = MockUartTransport::new();
        mock.expect_reopen().times(1).returning(|_, _| {
            Err(BringupError::OpenFailed {
                device: "/dev/ttyUSB0".into(),
            })
        });
        let err = inband_independent_reset(&mut mock, 3_000_000, 115_200).unwrap_err();
        assert!(matches!(err, BringupError::OpenFailed { .. }));
    }

    #[test]
    fn test_configure_low_power() {
        let mut mock = MockUartTransport::new();
        expect_command_write(&mut mock, OPCODE_SET_SLEEP_MODE);
        expect_completion(&mut mock, OPCODE_SET_SLEEP_MODE);
        configure_low_power(&mut mock, PowerMode::Sleep).unwrap();
    }

    /// Queue a wakeup-command completion carrying the given subcode.
    fn expect_wakeup_reply(mock: &mut MockUartTransport, subcode: u8) {
        let le = OPCODE_BLE_WAKEUP.0.to_le_bytes();
        let header = [HCI_PACKET_EVENT, HCI_EVENT_COMMAND_COMPLETE, 5];
        let params = [0x01, le[0], le[1], 0x00, subcode];
        mock.expect_bytes_available().times(1).returning(|| Ok(3));
        mock.expect_read().times(1).returning(move |buf: &mut [u8]| {
            buf[..3].copy_from_slice(&header);
            Ok(3)
        });
        mock.expect_bytes_available().times(1).returning(|| Ok(5));
        mock.expect_read().times(1).returning(move |buf: &mut [u8]| {
            buf[..5].copy_from_slice(&params);
            Ok(5)
        });
    }

    #[test]
    fn test_exit_heartbeat_confirmed_by_subcode() {
        crate::bringup::init_test_logging();
        let mut mock = MockUartTransport::new();
        expect_command_write(&mut mock, OPCODE_BLE_WAKEUP);
        expect_wakeup_reply(&mut mock, WAKEUP_SUBCODE_EXIT_HEARTBEAT);
        assert!(exit_heartbeat_mode(&mut mock));
    }

    #[test]
    fn test_exit_heartbeat_rejects_wrong_subcode() {
        // Right opcode, wrong subcode: the exit is not confirmed.
        let mut mock = MockUartTransport::new();
        expect_command_write(&mut mock, OPCODE_BLE_WAKEUP);
        expect_wakeup_reply(&mut mock, 0x01);
        assert!(!exit_heartbeat_mode(&mut mock));
    }

    #[test]
    fn test_exit_heartbeat_rejects_missing_subcode() {
        // Matching opcode but the reply stops at the status byte.
        let mut mock = MockUartTransport::new();
        expect_command_write(&mut mock, OPCODE_BLE_WAKEUP);
        expect_completion(&mut mock, OPCODE_BLE_WAKEUP);
        assert!(!exit_heartbeat_mode(&mut mock));
    }

    #[test]
    fn test_exit_heartbeat_swallows_failures() {
        let mut mock = MockUartTransport::new();
        mock.expect_write()
            .times(1)
            .returning(|_| Err(BringupError::Io(std::io::ErrorKind::BrokenPipe.into())));
        // Must not panic or propagate.
        assert!(!exit_heartbeat_mode(&mut mock));
    }
}
