//! Guest threads as seen by the scheduler.

use core_types::{CarrierId, CoreId, GuestThreadId};
use hal::ExecutionVehicle;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// One emulated-OS thread
///
/// Owned by the emulator's thread table and shared through `Arc`. A core
/// slot holds a clone only while the thread is its current occupant.
pub struct GuestThread {
    id: GuestThreadId,
    core: CoreId,
    vehicle: Arc<dyn ExecutionVehicle>,
    /// Load-exclusive monitor; cleared whenever the thread is switched in
    exclusive: AtomicBool,
}

impl GuestThread {
    /// Creates a guest thread pinned to `core`
    pub fn new(core: CoreId, vehicle: Arc<dyn ExecutionVehicle>) -> Self {
        Self {
            id: GuestThreadId::new(),
            core,
            vehicle,
            exclusive: AtomicBool::new(false),
        }
    }

    pub fn id(&self) -> GuestThreadId {
        self.id
    }

    /// Core slot this thread is pinned to
    pub fn core(&self) -> CoreId {
        self.core
    }

    /// Host carrier driving this thread
    pub fn carrier(&self) -> CarrierId {
        self.vehicle.carrier()
    }

    pub fn vehicle(&self) -> &Arc<dyn ExecutionVehicle> {
        &self.vehicle
    }

    /// Returns true if `caller` is this thread's carrier
    pub fn is_carried_by(&self, caller: CarrierId) -> bool {
        self.vehicle.is_current_host_thread(caller)
    }

    /// Arms the exclusive-access monitor (load-exclusive)
    pub fn set_exclusive(&self) {
        self.exclusive.store(true, Ordering::SeqCst);
    }

    pub fn clear_exclusive(&self) {
        self.exclusive.store(false, Ordering::SeqCst);
    }

    pub fn has_exclusive(&self) -> bool {
        self.exclusive.load(Ordering::SeqCst)
    }
}

impl fmt::Debug for GuestThread {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GuestThread")
            .field("id", &self.id)
            .field("core", &self.core)
            .field("carrier", &self.carrier())
            .field("exclusive", &self.has_exclusive())
            .finish()
    }
}
