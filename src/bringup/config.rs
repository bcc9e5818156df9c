//! Protocol constants for the UART bring-up sequence.

// Allow unused items - these document the full frame layout even where only
// part of it is consumed by the current bring-up paths.
#![allow(dead_code)]

use std::time::Duration;

// ============================================================================
// HCI Frame Layout
// ============================================================================

/// Packet-type marker preceding every frame on the wire.
pub const HCI_PACKET_TYPE_SIZE: usize = 1;

/// Event header: event code (1 byte) + parameter length (1 byte).
pub const HCI_EVENT_HEADER_SIZE: usize = 2;

/// Payload capacity of a bring-up event frame. Declared lengths beyond this
/// are clamped and logged; the excess bytes stay in the receive queue.
pub const HCI_EVENT_PAYLOAD_SIZE: usize = 64;

/// Packet-type marker for command packets (host to controller).
pub const HCI_PACKET_COMMAND: u8 = 0x01;

/// Packet-type marker for event packets (controller to host).
pub const HCI_PACKET_EVENT: u8 = 0x04;

/// Command Complete event code.
pub const HCI_EVENT_COMMAND_COMPLETE: u8 = 0x0E;

/// Hardware Error event code.
pub const HCI_EVENT_HARDWARE_ERROR: u8 = 0x10;

// Command Complete payload layout. The opcode is little-endian.
/// Offset of the num-completed-packets byte.
pub const HCI_EVT_PYLD_NUM_PKTS_IDX: usize = 0;
/// Offset of the 16-bit command opcode.
pub const HCI_EVT_PYLD_OPCODE_IDX: usize = 1;
/// Offset of the status byte.
pub const HCI_EVT_PYLD_STATUS_IDX: usize = 3;
/// Offset of the vendor subcode byte, where present.
pub const HCI_EVT_PYLD_SUBCODE_IDX: usize = 4;

// ============================================================================
// Polling and Timeouts
// ============================================================================

/// Poll interval while waiting on UART configuration command responses.
pub const POLL_CONFIG_INTERVAL: Duration = Duration::from_millis(10);

/// Short poll interval for retry-sensitive cycles (in-band reset, teardown).
pub const POLL_RETRY_INTERVAL: Duration = Duration::from_millis(1);

/// Ceiling for any single command/response cycle.
pub const POLL_MAX_TIMEOUT: Duration = Duration::from_millis(1000);

/// Settle time after a controller-side baud rate switch. The controller
/// re-clocks its UART in firmware during this window.
pub const BAUD_SETTLE_DELAY: Duration = Duration::from_millis(60);

/// Settle time after reopening the device at a new rate.
pub const REOPEN_SETTLE_DELAY: Duration = Duration::from_millis(20);

/// Read timeout for individual serial read calls. Reads are only issued
/// after the availability poll reports enough buffered bytes, so this is a
/// backstop, not the primary wait.
pub const SERIAL_READ_TIMEOUT: Duration = Duration::from_millis(1000);

// ============================================================================
// Device Open Retry
// ============================================================================

/// Maximum attempts to open the serial device.
pub const MAX_OPEN_RETRIES: u32 = 8;

/// Fixed backoff between open attempts.
pub const OPEN_RETRY_DELAY: Duration = Duration::from_millis(50);

// ============================================================================
// Baud Rates
// ============================================================================

/// Rates the controller accepts for the runtime baud-rate-change command.
/// Anything else keeps the initialization rate (logged, not an error).
pub const RUNTIME_BAUD_CHANGE_SET: &[u32] = &[115_200, 3_000_000];

/// Line speeds the host side supports. Mirrors the platform's discrete
/// termios speed table; rates outside this set fail line configuration.
pub const SUPPORTED_BAUD_RATES: &[u32] = &[
    9_600, 19_200, 38_400, 57_600, 115_200, 230_400, 460_800, 500_000, 576_000, 921_600, 1_000_000,
    1_152_000, 1_500_000, 3_000_000,
];

/// Check whether the host line can be clocked at the given rate.
pub fn is_supported_baud(baud: u32) -> bool {
    SUPPORTED_BAUD_RATES.contains(&baud)
}
