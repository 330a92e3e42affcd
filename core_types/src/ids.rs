//! Unique identifiers for scheduling entities

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Unique identifier for a guest thread
///
/// Guest threads are emulated OS threads. They belong to the emulated machine,
/// not to the host running the emulator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GuestThreadId(Uuid);

impl GuestThreadId {
    /// Creates a new random guest thread ID
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for GuestThreadId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for GuestThreadId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "GuestThread({})", self.0)
    }
}

/// Identifier for the host thread that carries a guest thread
///
/// Captured when the carrier is created and handed to every scheduling
/// call made from it. Identity checks compare carrier IDs instead of
/// looking at thread-local state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CarrierId(Uuid);

impl CarrierId {
    /// Creates a new random carrier ID
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for CarrierId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for CarrierId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Carrier({})", self.0)
    }
}

/// Index of an emulated processor core.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct CoreId(pub usize);

impl CoreId {
    /// Returns the slot index for this core
    pub fn index(&self) -> usize {
        self.0
    }
}

impl fmt::Display for CoreId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Core({})", self.0)
    }
}
