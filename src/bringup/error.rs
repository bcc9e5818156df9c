//! Error types for the controller bring-up protocol.

// Allow unused variants/methods - these are part of the error API surface
// and some variants are produced only by specific hardware states.
#![allow(dead_code)]

use thiserror::Error;

use super::command::Opcode;

/// Result type alias for bring-up operations.
pub type BringupResult<T> = Result<T, BringupError>;

/// Errors that can occur while bringing up the controller link.
#[derive(Debug, Error)]
pub enum BringupError {
    /// Serial port error from the serialport crate.
    #[error("Serial port error: {0}")]
    Serial(#[from] serialport::Error),

    /// Standard I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Device could not be opened within the retry budget.
    #[error("Failed to open device '{device}'")]
    OpenFailed { device: String },

    /// Line-discipline change (baud rate, flow control) was rejected.
    #[error("Failed to configure serial line at {baud} baud")]
    LineConfigFailed { baud: u32 },

    /// A command frame could not be written to the link.
    #[error("Failed to write {command} command")]
    WriteFailed { command: &'static str },

    /// No complete event arrived within the duration budget.
    #[error("Timed out reading event after {elapsed_ms}ms")]
    ReadTimeout { elapsed_ms: u64 },

    /// Frame carried an unexpected packet-type marker or event type.
    #[error("Invalid frame: unexpected marker or event type 0x{observed:02X}")]
    InvalidFrame { observed: u8 },

    /// Completion frame too short to contain the opcode and status.
    #[error("Invalid completion length {para_len} for event 0x{event_type:02X}")]
    InvalidLength { event_type: u8, para_len: u8 },

    /// Completion frame carried a different opcode than expected.
    #[error("Opcode mismatch: expected {expected}, received {received}")]
    OpcodeMismatch { expected: Opcode, received: Opcode },

    /// Completion frame carried a nonzero status byte.
    #[error("Controller returned status 0x{status:02X} for {opcode}")]
    ControllerStatusError { opcode: Opcode, status: u8 },

    /// Controller reported a hardware error event.
    #[error("Controller hardware error (code {code:?})")]
    HardwareError { code: Option<u8> },
}

impl BringupError {
    /// Check if this error is a deadline expiry rather than an I/O fault.
    pub fn is_timeout(&self) -> bool {
        matches!(self, BringupError::ReadTimeout { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_timeout() {
        assert!(BringupError::ReadTimeout { elapsed_ms: 1000 }.is_timeout());
        assert!(!BringupError::InvalidFrame { observed: 0x02 }.is_timeout());
        assert!(!BringupError::OpenFailed {
            device: "/dev/ttyUSB0".into()
        }
        .is_timeout());
    }

    #[test]
    fn test_error_display_carries_context() {
        let err = BringupError::InvalidLength {
            event_type: 0x0E,
            para_len: 2,
        };
        assert!(err.to_string().contains("0x0E"));

        let err = BringupError::ReadTimeout { elapsed_ms: 250 };
        assert!(err.to_string().contains("250"));
    }
}
