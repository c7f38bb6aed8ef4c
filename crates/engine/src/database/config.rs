//! Engine configuration via `tessera.toml`
//!
//! A plain config file in the style of Redis: on first use a commented
//! default is written, and settings change by editing the file and
//! reopening the database.

use serde::{Deserialize, Serialize};
use std::path::Path;
use tessera_core::{Error, Result, MAX_KEYS_PER_CALL};

/// Config file name placed next to the data.
pub const CONFIG_FILE_NAME: &str = "tessera.toml";

fn default_sweep_interval_ms() -> u64 {
    5000
}

fn default_expire_safety_delay_ms() -> u64 {
    12 * 60 * 60 * 1000
}

fn default_flush_batch_size() -> u64 {
    2560
}

fn default_scan_batch_size() -> usize {
    1280
}

fn default_max_keys_per_call() -> u64 {
    MAX_KEYS_PER_CALL
}

/// Engine configuration loaded from `tessera.toml`.
///
/// # Example
///
/// ```toml
/// sweep_interval_ms = 5000
/// run_sweepers = true
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Sleep between expiration passes and between GC passes.
    #[serde(default = "default_sweep_interval_ms")]
    pub sweep_interval_ms: u64,
    /// Grace window subtracted from "now" before an expiration index entry
    /// is considered due.
    #[serde(default = "default_expire_safety_delay_ms")]
    pub expire_safety_delay_ms: u64,
    /// Run the expiration and GC sweepers for every namespace.
    #[serde(default)]
    pub run_sweepers: bool,
    /// Metadata rows deleted per transaction by `flushdb`.
    #[serde(default = "default_flush_batch_size")]
    pub flush_batch_size: u64,
    /// Rows fetched per cursor refill.
    #[serde(default = "default_scan_batch_size")]
    pub scan_batch_size: usize,
    /// Upper bound on keys returned by one enumeration call.
    #[serde(default = "default_max_keys_per_call")]
    pub max_keys_per_call: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            sweep_interval_ms: default_sweep_interval_ms(),
            expire_safety_delay_ms: default_expire_safety_delay_ms(),
            run_sweepers: false,
            flush_batch_size: default_flush_batch_size(),
            scan_batch_size: default_scan_batch_size(),
            max_keys_per_call: default_max_keys_per_call(),
        }
    }
}

impl EngineConfig {
    /// Returns the default config file content with comments.
    pub fn default_toml() -> &'static str {
        r#"# Tessera engine configuration
#
# Milliseconds between expiration sweeps and between GC sweeps.
sweep_interval_ms = 5000

# Grace window (ms) before an expiration index entry is swept: 12 hours.
# Foreground access expires keys on contact regardless of this value.
expire_safety_delay_ms = 43200000

# Run the background sweepers. Enable on exactly one instance per store.
run_sweepers = false

# Metadata rows deleted per transaction by flushdb.
flush_batch_size = 2560

# Rows fetched per cursor refill.
scan_batch_size = 1280

# Maximum keys returned by one key enumeration call.
max_keys_per_call = 5000
"#
    }

    /// Parse config from TOML text.
    ///
    /// # Errors
    ///
    /// Returns an error if the text does not parse or fails validation.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: EngineConfig = toml::from_str(content)
            .map_err(|e| Error::invalid_input(format!("Failed to parse config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Read and parse config from a file path.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::internal(format!(
                "Failed to read config file '{}': {}",
                path.display(),
                e
            ))
        })?;
        let config: EngineConfig = toml::from_str(&content).map_err(|e| {
            Error::invalid_input(format!(
                "Failed to parse config file '{}': {}",
                path.display(),
                e
            ))
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Write the default config file if it does not already exist.
    ///
    /// Returns `Ok(())` whether the file was created or already existed.
    pub fn write_default_if_missing(path: &Path) -> Result<()> {
        if !path.exists() {
            std::fs::write(path, Self::default_toml()).map_err(|e| {
                Error::internal(format!(
                    "Failed to write default config file '{}': {}",
                    path.display(),
                    e
                ))
            })?;
        }
        Ok(())
    }

    /// Reject settings the engine cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.sweep_interval_ms == 0 {
            return Err(Error::invalid_input("sweep_interval_ms must be positive"));
        }
        if self.flush_batch_size == 0 || self.scan_batch_size == 0 {
            return Err(Error::invalid_input("batch sizes must be positive"));
        }
        if self.max_keys_per_call == 0 {
            return Err(Error::invalid_input("max_keys_per_call must be positive"));
        }
        Ok(())
    }
}
