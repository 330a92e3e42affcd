//! # Core Types
//!
//! Identifiers shared by the scheduler, the host execution controller and
//! the execution vehicles.
//!
//! ## Key Types
//!
//! - [`GuestThreadId`]: Unique identifier for an emulated thread
//! - [`CarrierId`]: Identity of the host thread that drives a guest thread
//! - [`CoreId`]: Index of an emulated processor core

pub mod ids;

pub use ids::{CarrierId, CoreId, GuestThreadId};
