//! UART Bluetooth controller bring-up core.
//!
//! This module implements the transport negotiation a host runs against a
//! UART-attached Bluetooth controller before handing the link to a host
//! stack.
//!
//! # Protocol Overview
//!
//! Bring-up consists of:
//! 1. **Device Acquisition** - Open the character device with retry
//! 2. **Recovery** - In-band independent reset when armed and needed
//! 3. **Reset** - Confirm the controller answers on the current rate
//! 4. **Rate Negotiation** - Move controller and host to the operating rate
//! 5. **Low-Power Configuration** - Optional autonomous sleep setup
//!
//! All waiting is polled against a deadline budget; nothing blocks
//! indefinitely.
//!
//! # Example
//!
//! ```ignore
//! use btuart_bringup::bringup::session::Session;
//! use btuart_bringup::props::MemoryPropertyStore;
//! use btuart_bringup::settings::BringupSettings;
//!
//! let settings = BringupSettings::default();
//! let mut session = Session::open(settings, MemoryPropertyStore::new())?;
//! session.bring_up()?;
//! ```

pub mod command;
pub mod config;
pub mod cycle;
pub mod error;
pub mod event;
pub mod link;
pub mod reader;
pub mod session;
pub mod transport;
pub mod validator;

// Re-export the types callers touch directly.

pub use command::{Opcode, PowerMode};
pub use error::{BringupError, BringupResult};
pub use event::HciEvent;
pub use session::Session;
pub use transport::{SerialUart, UartTransport};

/// Install a test subscriber so protocol log lines show up in captured
/// test output. Safe to call from every test; only the first call wins.
#[cfg(test)]
pub(crate) fn init_test_logging() {
    use tracing_subscriber::EnvFilter;
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init()
        .ok();
}
