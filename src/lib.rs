//! Bring-up and transport negotiation for UART-attached Bluetooth
//! controllers.
//!
//! The crate covers the window between opening the character device and
//! handing a fully negotiated link to a host stack: polled event reads,
//! response validation with reset escalation, baud-rate negotiation, in-band
//! independent-reset recovery, and low-power-mode configuration. Settings
//! and cross-boot properties persist as JSON.

pub mod bringup;
pub mod props;
pub mod settings;

pub use bringup::{BringupError, BringupResult, Session};
pub use props::{JsonPropertyStore, MemoryPropertyStore, PropertyStore};
pub use settings::{BringupSettings, IndependentResetMode, SettingsManager};
