//! Scheduler error types

use core_types::CoreId;
use thiserror::Error;

/// Errors returned by the scheduler's public API
///
/// The multi-occupancy invariant violation is not represented here: it
/// aborts the session instead of being returned.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SchedulerError {
    /// Core index outside the configured slot array
    #[error("Unknown core: {0}")]
    UnknownCore(CoreId),

    /// `start_preemption_ticker` called while a ticker is running
    #[error("Preemption ticker already running")]
    TickerAlreadyRunning,

    /// The host refused to spawn the ticker thread
    #[error("Failed to spawn preemption ticker: {0}")]
    TickerSpawn(String),

    /// The configuration was rejected
    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// Errors that can occur while loading scheduler configuration
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    /// Reading the configuration file failed
    #[error("Failed to read config: {0}")]
    Io(String),

    /// The configuration is not valid JSON for the expected shape
    #[error("Failed to parse config: {0}")]
    Parse(String),

    /// A value is out of range
    #[error("Invalid config: {0}")]
    Invalid(String),
}
