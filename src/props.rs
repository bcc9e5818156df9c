//! Persisted cross-boot integer properties.
//!
//! Bring-up decisions survive process restarts through a tiny key/value
//! store of named integers: whether firmware is already resident in the
//! controller, whether in-band recovery has been armed, and the boot-sleep
//! trigger. Reads fold anything absent or negative to zero, and writes are
//! fire-and-forget so a broken store never blocks bring-up.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

// =========================================================================
// Well-known property names
// =========================================================================

/// Nonzero once firmware has been loaded into the controller, so later
/// bring-ups skip straight to link configuration.
pub const PROP_FW_DOWNLOADED: &str = "bluetooth.fw_downloaded";

/// Nonzero once the in-band independent-reset command has been armed on the
/// controller; gates the in-band recovery path.
pub const PROP_INBAND_CONFIGURED: &str = "bluetooth.inband_ir_configured";

/// Set to 1 on first bring-up when the boot-sleep trigger is enabled.
pub const PROP_BOOT_SLEEP_TRIGGER: &str = "bluetooth.boot_sleep_trigger";

// =========================================================================
// Store trait and implementations
// =========================================================================

/// Named integer properties that persist across controller sessions.
pub trait PropertyStore {
    /// Read a property. Absent or negative values read as 0.
    fn get(&self, name: &str) -> i32;

    /// Write a property. Failures are logged, never propagated.
    fn set(&mut self, name: &str, value: i32);
}

/// Volatile store for tests and single-process callers.
#[derive(Debug, Default)]
pub struct MemoryPropertyStore {
    values: HashMap<String, i32>,
}

impl MemoryPropertyStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl PropertyStore for MemoryPropertyStore {
    fn get(&self, name: &str) -> i32 {
        self.values.get(name).copied().unwrap_or(0).max(0)
    }

    fn set(&mut self, name: &str, value: i32) {
        self.values.insert(name.to_string(), value);
    }
}

/// Properties file name stored in the data directory.
const PROPERTIES_FILENAME: &str = "bringup_props.json";

/// JSON-file-backed store. Each `set` rewrites the whole file; the map is
/// a handful of entries, so this stays simpler than an append log.
pub struct JsonPropertyStore {
    props_file_path: PathBuf,
    values: HashMap<String, i32>,
}

impl JsonPropertyStore {
    /// Open the store in the given data directory, reading any existing
    /// file. An unreadable or malformed file starts the store empty.
    pub fn open(data_dir: &Path) -> Self {
        let props_file_path = data_dir.join(PROPERTIES_FILENAME);
        let values = match fs::read_to_string(&props_file_path) {
            Ok(contents) if !contents.trim().is_empty() => {
                match serde_json::from_str(&contents) {
                    Ok(values) => values,
                    Err(e) => {
                        warn!(
                            path = %props_file_path.display(),
                            error = %e,
                            "malformed properties file, starting empty"
                        );
                        HashMap::new()
                    }
                }
            }
            _ => HashMap::new(),
        };
        Self {
            props_file_path,
            values,
        }
    }

    fn persist(&self) -> Result<(), String> {
        if let Some(parent) = self.props_file_path.parent() {
            fs::create_dir_all(parent)
                .map_err(|e| format!("Failed to create properties directory: {}", e))?;
        }
        let contents = serde_json::to_string_pretty(&self.values)
            .map_err(|e| format!("Failed to serialize properties: {}", e))?;
        fs::write(&self.props_file_path, contents)
            .map_err(|e| format!("Failed to write properties file: {}", e))?;
        Ok(())
    }
}

impl PropertyStore for JsonPropertyStore {
    fn get(&self, name: &str) -> i32 {
        self.values.get(name).copied().unwrap_or(0).max(0)
    }

    fn set(&mut self, name: &str, value: i32) {
        self.values.insert(name.to_string(), value);
        match self.persist() {
            Ok(()) => debug!(name, value, "property persisted"),
            Err(e) => warn!(name, value, error = %e, "failed to persist property"),
        }
    }
}
