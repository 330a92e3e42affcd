//! Scheduler configuration
//!
//! Loaded from JSON. Missing fields fall back to their defaults, so an empty
//! object is a valid configuration.

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;

/// Upper bound on emulated cores.
pub const MAX_CORES: usize = 64;

/// Default emulated core count.
pub const DEFAULT_CORE_COUNT: usize = 4;

/// Default round-robin quantum in milliseconds.
pub const DEFAULT_QUANTUM_MS: u64 = 10;

/// Scheduler configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// `true`: every core runs independently on its own host thread.
    /// `false`: one shared core, cooperative round-robin.
    pub multi_core_scheduling: bool,
    /// Number of emulated cores (slot array length)
    pub core_count: usize,
    /// Preemption ticker period in shared-core mode
    pub quantum_ms: u64,
    /// Number of scheduling events kept in the audit log
    pub audit_capacity: usize,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            multi_core_scheduling: false,
            core_count: DEFAULT_CORE_COUNT,
            quantum_ms: DEFAULT_QUANTUM_MS,
            audit_capacity: 256,
        }
    }
}

impl SchedulerConfig {
    /// Shared-core configuration with default values
    pub fn shared_core() -> Self {
        Self::default()
    }

    /// Multi-core configuration with default values
    pub fn multi_core() -> Self {
        Self {
            multi_core_scheduling: true,
            ..Self::default()
        }
    }

    /// Returns the ticker period
    pub fn quantum(&self) -> Duration {
        Duration::from_millis(self.quantum_ms)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.core_count == 0 || self.core_count > MAX_CORES {
            return Err(ConfigError::Invalid(format!(
                "core_count must be between 1 and {}, got {}",
                MAX_CORES, self.core_count
            )));
        }
        if self.quantum_ms == 0 {
            return Err(ConfigError::Invalid(
                "quantum_ms must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }

    /// Parses and validates a JSON configuration
    pub fn from_json_str(data: &str) -> Result<Self, ConfigError> {
        let config: SchedulerConfig =
            serde_json::from_str(data).map_err(|err| ConfigError::Parse(err.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Loads and validates a JSON configuration file
    pub fn load_from_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let data =
            fs::read_to_string(path.as_ref()).map_err(|err| ConfigError::Io(err.to_string()))?;
        Self::from_json_str(&data)
    }
}
