//! Event Reader: pulls one well-formed event frame off the serial device.
//!
//! There is no interrupt-driven I/O on this class of device; every wait is a
//! polled, time-budgeted loop over the receive queue's byte count. Bytes are
//! consumed irrevocably - a failed read leaves no way to un-consume, so
//! callers must treat any partial frame as discarded.

use std::time::Duration;

use tracing::{error, trace, warn};

use super::config::{
    HCI_EVENT_HEADER_SIZE, HCI_EVENT_PAYLOAD_SIZE, HCI_PACKET_EVENT, HCI_PACKET_TYPE_SIZE,
};
use super::cycle::DeadlineBudget;
use super::error::{BringupError, BringupResult};
use super::event::HciEvent;
use super::transport::UartTransport;

/// Poll the receive queue until at least `needed` bytes are buffered.
///
/// Fails with a read timeout once the budget expires; a zero budget times
/// out immediately without touching the device queue further.
fn poll_available(
    uart: &mut dyn UartTransport,
    needed: u32,
    poll_interval: Duration,
    budget: &DeadlineBudget,
) -> BringupResult<()> {
    loop {
        if budget.expired() {
            let elapsed_ms = budget.elapsed().as_millis() as u64;
            error!(elapsed_ms, needed, "timed out waiting for event bytes");
            return Err(BringupError::ReadTimeout { elapsed_ms });
        }
        if uart.bytes_available()? >= needed {
            return Ok(());
        }
        std::thread::sleep(poll_interval);
    }
}

/// Read exactly `buffer.len()` bytes, re-issuing partial reads.
fn read_exact(uart: &mut dyn UartTransport, buffer: &mut [u8]) -> BringupResult<()> {
    let mut count = 0;
    while count < buffer.len() {
        let n = uart.read(&mut buffer[count..])?;
        if n == 0 {
            error!(
                read = count,
                wanted = buffer.len(),
                "serial read returned no data mid-frame"
            );
            return Err(BringupError::Io(std::io::ErrorKind::UnexpectedEof.into()));
        }
        count += n;
    }
    Ok(())
}

/// Read one event frame, waiting at most `max_duration` for it to arrive.
///
/// The header (packet-type marker, event code, parameter length) is read
/// first; the payload read is capped at the frame buffer's capacity, with a
/// warning when the declared length exceeds it.
pub fn read_event(
    uart: &mut dyn UartTransport,
    poll_interval: Duration,
    max_duration: Duration,
) -> BringupResult<HciEvent> {
    let budget = DeadlineBudget::new(max_duration);
    let header_size = HCI_PACKET_TYPE_SIZE + HCI_EVENT_HEADER_SIZE;

    trace!("waiting for event packet marker");
    poll_available(uart, header_size as u32, poll_interval, &budget)?;

    let mut header = [0u8; HCI_PACKET_TYPE_SIZE + HCI_EVENT_HEADER_SIZE];
    read_exact(uart, &mut header)?;

    let packet_type = header[0];
    if packet_type != HCI_PACKET_EVENT {
        error!(packet_type, "invalid packet type received");
        return Err(BringupError::InvalidFrame {
            observed: packet_type,
        });
    }

    let event_code = header[1];
    let declared_len = header[2];
    let to_read = (declared_len as usize).min(HCI_EVENT_PAYLOAD_SIZE);
    if (declared_len as usize) > HCI_EVENT_PAYLOAD_SIZE {
        warn!(
            declared = declared_len,
            capacity = HCI_EVENT_PAYLOAD_SIZE,
            "declared payload larger than capacity, reading capacity only"
        );
    }

    trace!(event_code, to_read, "reading event parameters");
    let mut payload = [0u8; HCI_EVENT_PAYLOAD_SIZE];
    if to_read > 0 {
        poll_available(uart, to_read as u32, poll_interval, &budget)?;
        read_exact(uart, &mut payload[..to_read])?;
    }

    Ok(HciEvent::from_raw(event_code, declared_len, payload))
}
