//! # HLE Kernel Scheduler
//!
//! The scheduling core of a high-level-emulated guest kernel.
//!
//! ## Purpose
//!
//! Guest threads are carried by host threads. This crate decides which guest
//! thread occupies which emulated core and tells the host execution
//! controller which carrier may run:
//! - Multi-core mode: each core runs independently on its own carrier
//! - Shared-core mode: one logical core, round-robin over the core slots
//! - A preemption ticker bounds how long one thread keeps the shared core
//!
//! ## Philosophy
//!
//! **Selection and execution are separate concerns.**
//!
//! The scheduler only moves entitlement. Which thread should run next comes
//! from a [`ReadyThreadSource`]; how a carrier actually stops, resumes or
//! yields is the [`hal::ExecutionVehicle`]'s business. Both are traits so the
//! whole protocol runs under `cargo test` with recording doubles.

pub mod config;
pub mod core_slot;
pub mod error;
pub mod preemption;
pub mod ready_queue;
pub mod scheduler;
pub mod test_utils;
pub mod thread;

pub use config::SchedulerConfig;
pub use core_slot::{CoreSlot, SlotSwitch};
pub use error::{ConfigError, SchedulerError};
pub use preemption::PreemptionHook;
pub use ready_queue::{ReadyThreadSource, RoundRobinQueue};
pub use scheduler::{ScheduleEvent, Scheduler, SwitchOutcome};
pub use thread::GuestThread;
