//! Session State: owns the transport and the negotiated line settings.
//!
//! A session ties together the serial transport, the typed settings, and the
//! persisted cross-boot properties, and sequences the bring-up steps in the
//! order the controller requires. Exactly one session exists per physical
//! controller.

use tracing::{debug, info, warn};

use crate::props::{
    PropertyStore, PROP_BOOT_SLEEP_TRIGGER, PROP_FW_DOWNLOADED, PROP_INBAND_CONFIGURED,
};
use crate::settings::{BringupSettings, IndependentResetMode};

use super::command::PowerMode;
use super::error::BringupResult;
use super::link;
use super::transport::{SerialUart, UartTransport};

/// One live controller session: transport, settings, and negotiated state.
pub struct Session<P: PropertyStore> {
    uart: Box<dyn UartTransport>,
    settings: BringupSettings,
    props: P,
    /// Operating rate from the most recent successful negotiation. Recovery
    /// paths reopen at this rate, since the controller is still clocked there.
    last_baudrate: Option<u32>,
    /// Set once low-power mode has been configured; gates wake signaling.
    lpm_configured: bool,
}

impl<P: PropertyStore> Session<P> {
    /// Open the UART device and build a session around it.
    ///
    /// A controller with firmware already resident keeps running at the
    /// operating rate across host restarts, so the device is opened at that
    /// rate; a cold controller listens at the firmware-init rate.
    pub fn open(settings: BringupSettings, props: P) -> BringupResult<Self> {
        let fw_resident = props.get(PROP_FW_DOWNLOADED) != 0;
        let open_baud = if fw_resident {
            settings.baudrate_bt
        } else {
            settings.baudrate_fw_init
        };
        let mut uart = SerialUart::open(&settings.device, open_baud, false)?;
        let last_baudrate = uart.baud_rate().ok();
        Ok(Self {
            uart: Box::new(uart),
            settings,
            props,
            last_baudrate,
            lpm_configured: false,
        })
    }

    /// Build a session on an already-open transport.
    pub fn with_transport(
        uart: Box<dyn UartTransport>,
        settings: BringupSettings,
        props: P,
    ) -> Self {
        Self {
            uart,
            settings,
            props,
            last_baudrate: None,
            lpm_configured: false,
        }
    }

    /// Run the full bring-up sequence against the controller.
    ///
    /// Chooses the starting rate from the persisted firmware state, runs
    /// in-band recovery first when it is armed, negotiates the operating
    /// rate, then records the outcome in the property store and configures
    /// low-power mode when enabled.
    pub fn bring_up(&mut self) -> BringupResult<()> {
        let fw_resident = self.props.get(PROP_FW_DOWNLOADED) != 0;
        let inband_armed = self.settings.independent_reset_mode == IndependentResetMode::Inband
            && self.props.get(PROP_INBAND_CONFIGURED) != 0;
        info!(
            fw_resident,
            inband_armed,
            device = %self.settings.device,
            "starting controller bring-up"
        );

        let init_baud = if fw_resident {
            if inband_armed {
                // The running controller drops back to the firmware-init
                // rate after an independent reset.
                let last = self.last_baudrate.unwrap_or(self.settings.baudrate_bt);
                link::inband_independent_reset(
                    self.uart.as_mut(),
                    last,
                    self.settings.baudrate_fw_init,
                )?;
                self.settings.baudrate_fw_init
            } else {
                self.settings.baudrate_bt
            }
        } else {
            self.settings.baudrate_fw_init
        };

        if self.settings.send_boot_sleep_trigger && self.props.get(PROP_BOOT_SLEEP_TRIGGER) == 0 {
            debug!("arming boot-sleep trigger property");
            self.props.set(PROP_BOOT_SLEEP_TRIGGER, 1);
        }

        link::configure_link(self.uart.as_mut(), init_baud, self.settings.baudrate_bt)?;
        self.last_baudrate = Some(self.settings.baudrate_bt);

        self.props.set(PROP_FW_DOWNLOADED, 1);
        if self.settings.independent_reset_mode == IndependentResetMode::Inband {
            self.props.set(PROP_INBAND_CONFIGURED, 1);
        }

        if self.settings.enable_lpm {
            link::configure_low_power(self.uart.as_mut(), PowerMode::Sleep)?;
            self.lpm_configured = true;
        }

        info!(baudrate = self.settings.baudrate_bt, "controller bring-up complete");
        Ok(())
    }

    /// Signal the controller's wake state over the transmit line.
    ///
    /// Break is held while the controller may sleep and cleared to wake it.
    /// A no-op until low-power mode has been configured.
    pub fn set_wake_state(&mut self, awake: bool) -> BringupResult<()> {
        if !self.lpm_configured {
            debug!(awake, "wake signaling ignored, low-power mode not configured");
            return Ok(());
        }
        self.uart.set_break(!awake)
    }

    /// Tear the session down: exit heartbeat mode when configured, issue a
    /// final best-effort reset, and flush the line. Never fails; the
    /// descriptor is released when the session drops.
    pub fn close(&mut self) {
        info!("closing controller session");
        if self.settings.enable_heartbeat_config && !link::exit_heartbeat_mode(self.uart.as_mut())
        {
            warn!("controller did not confirm heartbeat exit");
        }
        if let Err(e) = link::send_hci_reset(self.uart.as_mut()) {
            warn!(error = %e, "final reset before close failed");
        }
        if let Err(e) = self.uart.flush_all() {
            warn!(error = %e, "flush before close failed");
        }
        self.lpm_configured = false;
    }

    pub fn settings(&self) -> &BringupSettings {
        &self.settings
    }

    pub fn props(&self) -> &P {
        &self.props
    }

    pub fn last_baudrate(&self) -> Option<u32> {
        self.last_baudrate
    }

    pub fn is_lpm_configured(&self) -> bool {
        self.lpm_configured
    }
}
