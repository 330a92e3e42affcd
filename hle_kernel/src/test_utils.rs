//! Test utilities for scheduling tests
//!
//! Provides a recording execution vehicle and helpers for tests that drive
//! the scheduler from several host threads.

use crate::thread::GuestThread;
use core_types::{CarrierId, CoreId};
use hal::ExecutionVehicle;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

/// Execution vehicle that records every call made on it
///
/// Interrupt requests also raise a pending flag that a simulated carrier loop
/// can poll with [`RecordingVehicle::take_interrupt`].
#[derive(Debug)]
pub struct RecordingVehicle {
    carrier: CarrierId,
    interrupts: AtomicUsize,
    executes: AtomicUsize,
    stops: AtomicUsize,
    interrupt_pending: AtomicBool,
}

impl RecordingVehicle {
    /// Creates a vehicle with a fresh carrier
    pub fn new() -> Arc<Self> {
        Self::with_carrier(CarrierId::new())
    }

    /// Creates a vehicle for an existing carrier
    pub fn with_carrier(carrier: CarrierId) -> Arc<Self> {
        Arc::new(Self {
            carrier,
            interrupts: AtomicUsize::new(0),
            executes: AtomicUsize::new(0),
            stops: AtomicUsize::new(0),
            interrupt_pending: AtomicBool::new(false),
        })
    }

    pub fn interrupts(&self) -> usize {
        self.interrupts.load(Ordering::SeqCst)
    }

    pub fn executes(&self) -> usize {
        self.executes.load(Ordering::SeqCst)
    }

    pub fn stops(&self) -> usize {
        self.stops.load(Ordering::SeqCst)
    }

    /// Consumes a pending interrupt request
    pub fn take_interrupt(&self) -> bool {
        self.interrupt_pending.swap(false, Ordering::SeqCst)
    }
}

impl ExecutionVehicle for RecordingVehicle {
    fn carrier(&self) -> CarrierId {
        self.carrier
    }

    fn request_interrupt(&self) {
        self.interrupts.fetch_add(1, Ordering::SeqCst);
        self.interrupt_pending.store(true, Ordering::SeqCst);
    }

    fn execute(&self) {
        self.executes.fetch_add(1, Ordering::SeqCst);
    }

    fn stop_execution(&self) {
        self.stops.fetch_add(1, Ordering::SeqCst);
    }
}

/// Creates a guest thread pinned to `core` with a recording vehicle
pub fn recorded_thread(core: usize) -> (Arc<GuestThread>, Arc<RecordingVehicle>) {
    let vehicle = RecordingVehicle::new();
    let thread = Arc::new(GuestThread::new(CoreId(core), vehicle.clone()));
    (thread, vehicle)
}

/// Polls `condition` until it holds, panicking after `timeout`
pub fn wait_until<F>(timeout: Duration, mut condition: F)
where
    F: FnMut() -> bool,
{
    let deadline = Instant::now() + timeout;
    while !condition() {
        assert!(Instant::now() < deadline, "condition not met within {:?}", timeout);
        thread::sleep(Duration::from_millis(1));
    }
}
