//! Serial transport layer for controller bring-up.
//!
//! Provides a trait-based abstraction over the UART character device,
//! enabling both real hardware and mock testing. Unlike a general-purpose
//! stream, the bring-up core never blocks on reads: it polls the available
//! byte count and only then issues reads.

use std::io::{Read, Write};
use std::time::Duration;

#[cfg(test)]
use mockall::automock;
use serialport::{ClearBuffer, DataBits, FlowControl, Parity, SerialPort, StopBits};
use tracing::{debug, error, warn};

use super::config::{is_supported_baud, MAX_OPEN_RETRIES, OPEN_RETRY_DELAY, SERIAL_READ_TIMEOUT};
use super::error::{BringupError, BringupResult};

/// Trait for UART operations used by the bring-up core.
///
/// Exactly one implementor is live per physical session; the bring-up
/// sequence owns it exclusively for the duration of each configuration step.
#[cfg_attr(test, automock)]
pub trait UartTransport: Send {
    /// Write a raw frame to the link.
    fn write(&mut self, data: &[u8]) -> BringupResult<()>;

    /// Read up to `buffer.len()` bytes. Returns the number of bytes read;
    /// zero means the backstop timeout elapsed with nothing buffered.
    fn read(&mut self, buffer: &mut [u8]) -> BringupResult<usize>;

    /// Number of bytes waiting in the receive queue.
    fn bytes_available(&mut self) -> BringupResult<u32>;

    /// Discard pending input.
    fn flush_input(&mut self) -> BringupResult<()>;

    /// Discard pending input and output.
    fn flush_all(&mut self) -> BringupResult<()>;

    /// Change the host-side line speed in place.
    fn set_baud_rate(&mut self, baud: u32) -> BringupResult<()>;

    /// Enable or disable hardware (CTS/RTS) flow control in place.
    fn set_flow_control(&mut self, enabled: bool) -> BringupResult<()>;

    /// The currently configured line speed.
    fn baud_rate(&mut self) -> BringupResult<u32>;

    /// Close and reacquire the device at the given rate. Some platform
    /// drivers only apply certain mode switches on a fresh acquisition.
    fn reopen(&mut self, baud: u32, flow_control: bool) -> BringupResult<()>;

    /// Assert or clear the break condition on the transmit line. Used for
    /// low-power wake signaling.
    fn set_break(&mut self, on: bool) -> BringupResult<()>;
}

/// Serial port transport backed by the serialport crate.
pub struct SerialUart {
    // Option so reopen can drop the exclusive descriptor before reacquiring.
    port: Option<Box<dyn SerialPort>>,
    device: String,
}

impl std::fmt::Debug for SerialUart {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SerialUart")
            .field("device", &self.device)
            .field("port", &self.port.as_ref().map(|_| "dyn SerialPort"))
            .finish()
    }
}

impl SerialUart {
    /// Open the UART device with raw 8N1 framing at the given rate.
    pub fn open(device: &str, baud: u32, flow_control: bool) -> BringupResult<Self> {
        let port = open_port(device, baud, flow_control)?;
        Ok(Self {
            port: Some(port),
            device: device.to_string(),
        })
    }

    fn port(&mut self) -> BringupResult<&mut Box<dyn SerialPort>> {
        self.port.as_mut().ok_or_else(|| BringupError::OpenFailed {
            device: self.device.clone(),
        })
    }
}

/// Open the device with a bounded retry loop.
///
/// A freshly power-cycled or re-enumerated device can briefly refuse opens;
/// retries use a fixed backoff and give up after `MAX_OPEN_RETRIES`.
fn open_port(device: &str, baud: u32, flow_control: bool) -> BringupResult<Box<dyn SerialPort>> {
    if !is_supported_baud(baud) {
        error!(baud, "unsupported line speed requested");
        return Err(BringupError::LineConfigFailed { baud });
    }

    let flow = if flow_control {
        FlowControl::Hardware
    } else {
        FlowControl::None
    };

    for attempt in 1..=MAX_OPEN_RETRIES {
        match serialport::new(device, baud)
            .timeout(SERIAL_READ_TIMEOUT)
            .data_bits(DataBits::Eight)
            .parity(Parity::None)
            .stop_bits(StopBits::One)
            .flow_control(flow)
            .open()
        {
            Ok(port) => {
                // Drop anything buffered from a previous session.
                port.clear(ClearBuffer::All).ok();
                debug!(device, baud, flow_control, "serial device opened");
                return Ok(port);
            }
            Err(e) => {
                warn!(
                    device,
                    attempt,
                    error = %e,
                    "failed to open serial device, retrying"
                );
                std::thread::sleep(OPEN_RETRY_DELAY);
            }
        }
    }

    error!(device, "exceeded max open retry count");
    Err(BringupError::OpenFailed {
        device: device.to_string(),
    })
}

impl UartTransport for SerialUart {
    fn write(&mut self, data: &[u8]) -> BringupResult<()> {
        self.port()?.write_all(data).map_err(BringupError::Io)
    }

    fn read(&mut self, buffer: &mut [u8]) -> BringupResult<usize> {
        match self.port()?.read(buffer) {
            Ok(n) => Ok(n),
            Err(e) if e.kind() == std::io::ErrorKind::TimedOut => Ok(0),
            Err(e) => Err(BringupError::Io(e)),
        }
    }

    fn bytes_available(&mut self) -> BringupResult<u32> {
        self.port()?.bytes_to_read().map_err(BringupError::Serial)
    }

    fn flush_input(&mut self) -> BringupResult<()> {
        self.port()?
            .clear(ClearBuffer::Input)
            .map_err(BringupError::Serial)
    }

    fn flush_all(&mut self) -> BringupResult<()> {
        self.port()?
            .clear(ClearBuffer::All)
            .map_err(BringupError::Serial)
    }

    fn set_baud_rate(&mut self, baud: u32) -> BringupResult<()> {
        if !is_supported_baud(baud) {
            error!(baud, "unsupported line speed requested");
            return Err(BringupError::LineConfigFailed { baud });
        }
        self.port()?.set_baud_rate(baud).map_err(|e| {
            error!(baud, error = %e, "failed to set line speed");
            BringupError::LineConfigFailed { baud }
        })?;
        debug!(baud, "host line speed set");
        Ok(())
    }

    fn set_flow_control(&mut self, enabled: bool) -> BringupResult<()> {
        let flow = if enabled {
            FlowControl::Hardware
        } else {
            FlowControl::None
        };
        self.port()?.set_flow_control(flow).map_err(|e| {
            error!(enabled, error = %e, "failed to set flow control");
            BringupError::Serial(e)
        })
    }

    fn baud_rate(&mut self) -> BringupResult<u32> {
        self.port()?.baud_rate().map_err(BringupError::Serial)
    }

    fn reopen(&mut self, baud: u32, flow_control: bool) -> BringupResult<()> {
        // Release the exclusive descriptor before reacquiring the device.
        self.port = None;
        let device = self.device.clone();
        self.port = Some(open_port(&device, baud, flow_control)?);
        debug!(device, baud, flow_control, "serial device reopened");
        Ok(())
    }

    fn set_break(&mut self, on: bool) -> BringupResult<()> {
        let port = self.port()?;
        let result = if on {
            port.set_break()
        } else {
            port.clear_break()
        };
        result.map_err(BringupError::Serial)
    }
}
