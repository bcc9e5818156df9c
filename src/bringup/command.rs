//! Raw HCI command frames sent during bring-up.
//!
//! Command packets have a fixed shape: packet-type marker, 16-bit opcode
//! (little-endian), parameter length, parameters. This module owns the small
//! set of commands the bring-up sequence needs; nothing here parses responses.

use std::fmt;

use super::config::HCI_PACKET_COMMAND;

// ============================================================================
// Opcodes
// ============================================================================

/// Controller reset (mandatory before any configuration).
pub const OPCODE_RESET: Opcode = Opcode(0x0C03);

/// Vendor command switching the controller UART to a new rate.
pub const OPCODE_CHANGE_BAUD_RATE: Opcode = Opcode(0xFC09);

/// Vendor sleep-mode configuration (low-power mode).
pub const OPCODE_SET_SLEEP_MODE: Opcode = Opcode(0xFC23);

/// Vendor in-band independent reset trigger.
pub const OPCODE_INBAND_RESET: Opcode = Opcode(0xFCFC);

/// Vendor wakeup configuration (heartbeat enable/disable).
pub const OPCODE_BLE_WAKEUP: Opcode = Opcode(0xFD52);

/// Subcode confirming the controller left heartbeat mode.
pub const WAKEUP_SUBCODE_EXIT_HEARTBEAT: u8 = 0x04;

// Sleep-mode command parameters.
const SLEEP_MODE_AUTO: u8 = 0x02;
const SLEEP_MODE_FULL_POWER: u8 = 0x03;

/// A 16-bit HCI command identifier.
///
/// Opcodes are compared for equality only; there is no ordering between
/// command families.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Opcode(pub u16);

impl Opcode {
    /// Human-readable command name for log lines.
    pub fn name(&self) -> &'static str {
        match *self {
            OPCODE_RESET => "RESET",
            OPCODE_CHANGE_BAUD_RATE => "CHANGE_BAUD_RATE",
            OPCODE_SET_SLEEP_MODE => "SET_SLEEP_MODE",
            OPCODE_INBAND_RESET => "INBAND_RESET",
            OPCODE_BLE_WAKEUP => "BLE_WAKEUP",
            _ => "UNKNOWN",
        }
    }
}

impl fmt::Display for Opcode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:04X} ({})", self.0, self.name())
    }
}

/// Host/controller power coordination modes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PowerMode {
    /// Allow the controller to sleep between transactions.
    Sleep,
    /// Keep the controller fully powered.
    FullPower,
}

// ============================================================================
// Frame Builders
// ============================================================================

/// Assemble a command frame for the given opcode and parameters.
fn build_command(opcode: Opcode, params: &[u8]) -> Vec<u8> {
    let mut frame = Vec::with_capacity(4 + params.len());
    frame.push(HCI_PACKET_COMMAND);
    frame.extend_from_slice(&opcode.0.to_le_bytes());
    frame.push(params.len() as u8);
    frame.extend_from_slice(params);
    frame
}

/// Controller reset command.
pub fn reset() -> Vec<u8> {
    build_command(OPCODE_RESET, &[])
}

/// Runtime baud-rate change. The new rate rides as a little-endian u32.
pub fn change_baud_rate(baud: u32) -> Vec<u8> {
    build_command(OPCODE_CHANGE_BAUD_RATE, &baud.to_le_bytes())
}

/// In-band independent reset trigger.
pub fn inband_reset() -> Vec<u8> {
    build_command(OPCODE_INBAND_RESET, &[0x00])
}

/// Sleep-mode configuration for the requested power mode.
pub fn set_sleep_mode(mode: PowerMode) -> Vec<u8> {
    let mode_byte = match mode {
        PowerMode::Sleep => SLEEP_MODE_AUTO,
        PowerMode::FullPower => SLEEP_MODE_FULL_POWER,
    };
    build_command(OPCODE_SET_SLEEP_MODE, &[mode_byte, 0x00, 0x00])
}

/// Wakeup-disable command taking the controller out of heartbeat mode.
pub fn wakeup_disable() -> Vec<u8> {
    build_command(OPCODE_BLE_WAKEUP, &[WAKEUP_SUBCODE_EXIT_HEARTBEAT])
}
