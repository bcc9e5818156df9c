//! Bring-up settings with JSON persistence.
//!
//! This module provides:
//! - `BringupSettings` struct for the UART link and controller options
//! - Persistence to a JSON file in a caller-supplied data directory
//!
//! ## Extensibility
//!
//! To add a new setting:
//! 1. Add the field to `BringupSettings` with `#[serde(default = ...)]`
//! 2. Consume it from the session orchestration in `bringup::session`

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// How a wedged controller is brought back without a power cycle.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum IndependentResetMode {
    /// No independent-reset support; a stuck controller needs a power cycle.
    #[default]
    Disabled,
    /// Reset is signaled out of band (dedicated GPIO, handled elsewhere).
    OutOfBand,
    /// Reset is signaled with a vendor command over the UART link itself.
    Inband,
}

/// Options governing how the controller link is brought up.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct BringupSettings {
    /// UART character device the controller is wired to.
    #[serde(default = "default_device")]
    pub device: String,

    /// Line speed the controller boots at, before negotiation.
    #[serde(default = "default_baudrate_fw_init")]
    pub baudrate_fw_init: u32,

    /// Operating line speed negotiated during bring-up.
    #[serde(default = "default_baudrate_bt")]
    pub baudrate_bt: u32,

    /// Recovery path for an already-initialized but unresponsive controller.
    #[serde(default)]
    pub independent_reset_mode: IndependentResetMode,

    /// Configure the controller's autonomous sleep mode during bring-up.
    #[serde(default)]
    pub enable_lpm: bool,

    /// Idle time before the controller may enter sleep, in milliseconds.
    #[serde(default = "default_lpm_timeout_ms")]
    pub lpm_timeout_ms: u64,

    /// Persist the boot-sleep trigger property on first bring-up.
    #[serde(default)]
    pub send_boot_sleep_trigger: bool,

    /// Controller heartbeat is configured; send the wakeup-disable command
    /// before teardown so it stops expecting host activity.
    #[serde(default)]
    pub enable_heartbeat_config: bool,
}

fn default_device() -> String {
    "/dev/ttyUSB0".to_string()
}

fn default_baudrate_fw_init() -> u32 {
    115_200
}

fn default_baudrate_bt() -> u32 {
    3_000_000
}

fn default_lpm_timeout_ms() -> u64 {
    1_000
}

impl Default for BringupSettings {
    fn default() -> Self {
        Self {
            device: default_device(),
            baudrate_fw_init: default_baudrate_fw_init(),
            baudrate_bt: default_baudrate_bt(),
            independent_reset_mode: IndependentResetMode::default(),
            enable_lpm: false,
            lpm_timeout_ms: default_lpm_timeout_ms(),
            send_boot_sleep_trigger: false,
            enable_heartbeat_config: false,
        }
    }
}

impl BringupSettings {
    /// Idle timeout before the controller may sleep, as a duration.
    pub fn lpm_idle_timeout(&self) -> Duration {
        Duration::from_millis(self.lpm_timeout_ms)
    }
}

/// Settings file name stored in the data directory.
const SETTINGS_FILENAME: &str = "bringup_settings.json";

/// Manages persistence of bring-up settings to a JSON file.
pub struct SettingsManager {
    settings_file_path: PathBuf,
}

impl SettingsManager {
    /// Create a new settings manager for the given data directory.
    pub fn new(data_dir: &Path) -> Self {
        let settings_file_path = data_dir.join(SETTINGS_FILENAME);
        Self { settings_file_path }
    }

    /// Load settings from disk, returning defaults if the file doesn't exist.
    pub fn load(&self) -> Result<BringupSettings, String> {
        if !self.settings_file_path.exists() {
            return Ok(BringupSettings::default());
        }

        let contents = fs::read_to_string(&self.settings_file_path)
            .map_err(|e| format!("Failed to read settings file: {}", e))?;

        // Handle empty file gracefully
        if contents.trim().is_empty() {
            return Ok(BringupSettings::default());
        }

        serde_json::from_str(&contents)
            .map_err(|e| format!("Failed to parse settings JSON: {}", e))
    }

    /// Save settings to disk.
    pub fn save(&self, settings: &BringupSettings) -> Result<(), String> {
        // Ensure parent directory exists
        if let Some(parent) = self.settings_file_path.parent() {
            fs::create_dir_all(parent)
                .map_err(|e| format!("Failed to create settings directory: {}", e))?;
        }

        let contents = serde_json::to_string_pretty(settings)
            .map_err(|e| format!("Failed to serialize settings: {}", e))?;

        fs::write(&self.settings_file_path, contents)
            .map_err(|e| format!("Failed to write settings file: {}", e))?;

        Ok(())
    }

    /// Get the path where settings are stored.
    pub fn settings_path(&self) -> &Path {
        &self.settings_file_path
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_default_settings() {
        let settings = BringupSettings::default();
        assert_eq!(settings.device, "/dev/ttyUSB0");
        assert_eq!(settings.baudrate_fw_init, 115_200);
        assert_eq!(settings.baudrate_bt, 3_000_000);
        assert_eq!(
            settings.independent_reset_mode,
            IndependentResetMode::Disabled
        );
        assert!(!settings.enable_lpm);
        assert_eq!(settings.lpm_idle_timeout(), Duration::from_millis(1_000));
    }

    #[test]
    fn test_partial_json_fills_defaults() {
        let settings: BringupSettings =
            serde_json::from_str(r#"{ "baudrateBt": 921600 }"#).unwrap();
        assert_eq!(settings.baudrate_bt, 921_600);
        assert_eq!(settings.baudrate_fw_init, 115_200);
        assert_eq!(settings.device, "/dev/ttyUSB0");
    }

    #[test]
    fn test_serde_camel_case() {
        let settings = BringupSettings {
            independent_reset_mode: IndependentResetMode::Inband,
            ..Default::default()
        };
        let json = serde_json::to_string(&settings).unwrap();
        assert!(json.contains("baudrateFwInit"));
        assert!(!json.contains("baudrate_fw_init"));
        assert!(json.contains("independentResetMode"));
        assert!(json.contains("inband"));
    }

    #[test]
    fn test_settings_persistence() {
        let dir = tempdir().unwrap();
        let manager = SettingsManager::new(dir.path());

        // Initially returns defaults
        let loaded = manager.load().unwrap();
        assert_eq!(loaded, BringupSettings::default());

        // Save custom settings
        let settings = BringupSettings {
            device: "/dev/ttyS1".to_string(),
            enable_lpm: true,
            independent_reset_mode: IndependentResetMode::Inband,
            ..Default::default()
        };
        manager.save(&settings).unwrap();

        // Load returns saved settings
        let loaded = manager.load().unwrap();
        assert_eq!(loaded, settings);
    }

    #[test]
    fn test_load_empty_file_returns_defaults() {
        let dir = tempdir().unwrap();
        let manager = SettingsManager::new(dir.path());
        fs::write(manager.settings_path(), "").unwrap();
        assert_eq!(manager.load().unwrap(), BringupSettings::default());
    }
}
