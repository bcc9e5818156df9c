//! Response Validator: classifies received frames and drives escalation.
//!
//! Classification itself is pure; the hardware-error escalation (the core
//! protocol requires an unconditional controller reset after a hardware
//! error event) is expressed as an injected [`RecoveryAction`] wired in at
//! composition time, so every call site shares one enforcement point.

use tracing::{debug, error, trace};

use super::command::Opcode;
use super::config::{
    HCI_EVENT_COMMAND_COMPLETE, HCI_EVENT_HARDWARE_ERROR, HCI_EVT_PYLD_STATUS_IDX,
};
use super::error::{BringupError, BringupResult};
use super::event::HciEvent;
use super::transport::UartTransport;

/// What a received frame turned out to be, relative to an expected opcode.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// Completion for the expected opcode. A nonzero status byte is logged
    /// but still counts as a match; the opcode governs the result.
    Matched,
    /// Completion for some other command.
    OpcodeMismatch { received: Opcode },
    /// Completion too short to contain opcode and status.
    InvalidLength { para_len: u8 },
    /// Hardware error event; carries the error code when the payload has one.
    HardwareError { code: Option<u8> },
    /// Any other event type.
    InvalidEventType { event_type: u8 },
}

/// Classify a frame against the expected completion opcode.
pub fn classify(evt: &HciEvent, expected: Opcode) -> Outcome {
    match evt.event_code() {
        HCI_EVENT_COMMAND_COMPLETE => {
            let (opcode, status) = match (evt.opcode(), evt.status()) {
                (Some(op), Some(st)) => (op, st),
                _ => {
                    error!(
                        event_type = evt.event_code(),
                        para_len = evt.parameter_length(),
                        min = HCI_EVT_PYLD_STATUS_IDX + 1,
                        "completion frame too short for opcode and status"
                    );
                    return Outcome::InvalidLength {
                        para_len: evt.parameter_length(),
                    };
                }
            };
            debug!(opcode = %opcode, status, "reply received for command");
            if status != 0 {
                error!(opcode = %opcode, status, "error status received for command");
            }
            if opcode == expected {
                Outcome::Matched
            } else {
                Outcome::OpcodeMismatch { received: opcode }
            }
        }
        HCI_EVENT_HARDWARE_ERROR => {
            let code = evt.payload().first().copied();
            error!(
                para_len = evt.parameter_length(),
                code, "hardware error event received"
            );
            Outcome::HardwareError { code }
        }
        other => {
            error!(event_type = other, "invalid event type received");
            Outcome::InvalidEventType { event_type: other }
        }
    }
}

/// Corrective action taken when a hardware error event is observed.
///
/// The validator is the single choke point every received frame passes
/// through, so the reset-on-hardware-error rule lives behind this trait
/// rather than at each call site.
pub trait RecoveryAction {
    fn on_hardware_error(
        &mut self,
        uart: &mut dyn UartTransport,
        code: Option<u8>,
    ) -> BringupResult<()>;
}

/// Recovery action that takes no corrective step and surfaces the error.
/// Used inside the reset primitive's own confirmation cycle so escalation
/// cannot recurse.
pub struct NoEscalation;

impl RecoveryAction for NoEscalation {
    fn on_hardware_error(
        &mut self,
        _uart: &mut dyn UartTransport,
        code: Option<u8>,
    ) -> BringupResult<()> {
        Err(BringupError::HardwareError { code })
    }
}

/// Validate a frame against the expected opcode, escalating on hardware
/// error. On a hardware error event the recovery action's result becomes
/// this function's result.
pub fn validate(
    evt: &HciEvent,
    expected: Opcode,
    uart: &mut dyn UartTransport,
    recovery: &mut dyn RecoveryAction,
) -> BringupResult<()> {
    match classify(evt, expected) {
        Outcome::Matched => Ok(()),
        Outcome::OpcodeMismatch { received } => {
            trace!(expected = %expected, received = %received, "opcode mismatch");
            Err(BringupError::OpcodeMismatch { expected, received })
        }
        Outcome::InvalidLength { para_len } => Err(BringupError::InvalidLength {
            event_type: evt.event_code(),
            para_len,
        }),
        Outcome::HardwareError { code } => recovery.on_hardware_error(uart, code),
        Outcome::InvalidEventType { event_type } => Err(BringupError::InvalidFrame {
            observed: event_type,
        }),
    }
}
