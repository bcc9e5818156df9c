//! Event frame type with bounds-checked field accessors.
//!
//! One `HciEvent` holds one parsed unit of the controller's event stream:
//! event code, parameter length, payload. Frames are built fresh per receive
//! attempt and discarded after validation; there is no reuse across cycles.

use tracing::warn;

use super::command::Opcode;
use super::config::{
    HCI_EVENT_PAYLOAD_SIZE, HCI_EVT_PYLD_OPCODE_IDX, HCI_EVT_PYLD_STATUS_IDX,
    HCI_EVT_PYLD_SUBCODE_IDX,
};

/// A single event frame received from the controller.
///
/// The payload buffer has fixed capacity; a declared parameter length beyond
/// it is clamped at construction so no accessor can run past the buffer.
#[derive(Debug, Clone)]
pub struct HciEvent {
    event_code: u8,
    para_len: u8,
    payload: [u8; HCI_EVENT_PAYLOAD_SIZE],
}

impl HciEvent {
    /// Build a frame from its header fields and payload buffer.
    ///
    /// `declared_len` comes off the wire; when it exceeds the payload
    /// capacity it is clamped and a warning is logged, matching how many
    /// bytes the reader actually consumed.
    pub fn from_raw(
        event_code: u8,
        declared_len: u8,
        payload: [u8; HCI_EVENT_PAYLOAD_SIZE],
    ) -> Self {
        let para_len = if (declared_len as usize) > HCI_EVENT_PAYLOAD_SIZE {
            warn!(
                declared = declared_len,
                capacity = HCI_EVENT_PAYLOAD_SIZE,
                "event parameter length exceeds payload capacity, clamping"
            );
            HCI_EVENT_PAYLOAD_SIZE as u8
        } else {
            declared_len
        };
        Self {
            event_code,
            para_len,
            payload,
        }
    }

    /// Build a frame from an event code and payload slice. Test/diagnostic
    /// convenience; the slice is truncated to capacity.
    pub fn from_parts(event_code: u8, params: &[u8]) -> Self {
        let len = params.len().min(HCI_EVENT_PAYLOAD_SIZE);
        let mut payload = [0u8; HCI_EVENT_PAYLOAD_SIZE];
        payload[..len].copy_from_slice(&params[..len]);
        Self::from_raw(event_code, params.len().min(u8::MAX as usize) as u8, payload)
    }

    /// The event code from the frame header.
    pub fn event_code(&self) -> u8 {
        self.event_code
    }

    /// Parameter length after clamping to capacity.
    pub fn parameter_length(&self) -> u8 {
        self.para_len
    }

    /// The valid portion of the payload.
    pub fn payload(&self) -> &[u8] {
        &self.payload[..self.para_len as usize]
    }

    /// The embedded command opcode, when the payload is long enough to
    /// contain both opcode bytes and the status byte that follows them.
    pub fn opcode(&self) -> Option<Opcode> {
        if (self.para_len as usize) > HCI_EVT_PYLD_STATUS_IDX {
            let lo = self.payload[HCI_EVT_PYLD_OPCODE_IDX];
            let hi = self.payload[HCI_EVT_PYLD_OPCODE_IDX + 1];
            Some(Opcode(u16::from_le_bytes([lo, hi])))
        } else {
            None
        }
    }

    /// The completion status byte, when present.
    pub fn status(&self) -> Option<u8> {
        if (self.para_len as usize) > HCI_EVT_PYLD_STATUS_IDX {
            Some(self.payload[HCI_EVT_PYLD_STATUS_IDX])
        } else {
            None
        }
    }

    /// The vendor subcode byte, when present.
    pub fn subcode(&self) -> Option<u8> {
        if (self.para_len as usize) > HCI_EVT_PYLD_SUBCODE_IDX {
            Some(self.payload[HCI_EVT_PYLD_SUBCODE_IDX])
        } else {
            None
        }
    }
}
