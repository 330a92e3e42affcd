//! # Hardware Abstraction Layer (HAL)
//!
//! This crate defines the traits the scheduler uses to talk to emulated
//! hardware.
//!
//! ## Design Principles
//!
//! 1. **Trait-based**: Execution control goes through [`ExecutionVehicle`]
//! 2. **No backend assumptions**: Interpreters and JITs look the same here
//! 3. **Testable**: Vehicles can be replaced by recording doubles

pub mod cpu;

pub use cpu::ExecutionVehicle;
