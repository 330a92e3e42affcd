//! Per-core slot bookkeeping.
//!
//! A slot records which guest thread occupies an emulated core and which
//! thread should occupy it next. It has no locking of its own: every slot
//! lives inside the scheduler state and is only touched under its lock.

use crate::ready_queue::ReadyThreadSource;
use crate::thread::GuestThread;
use core_types::CoreId;
use std::sync::Arc;

/// Result of applying a pending reassignment
#[derive(Debug, Clone, Default)]
pub struct SlotSwitch {
    /// Occupant before the switch
    pub previous: Option<Arc<GuestThread>>,
    /// Occupant after the switch
    pub next: Option<Arc<GuestThread>>,
}

impl SlotSwitch {
    /// Returns true if the occupant actually changed
    pub fn changed(&self) -> bool {
        !same_thread(&self.previous, &self.next)
    }
}

/// Bookkeeping for one emulated core
#[derive(Debug)]
pub struct CoreSlot {
    core: CoreId,
    current: Option<Arc<GuestThread>>,
    selected: Option<Arc<GuestThread>>,
    switch_needed: bool,
}

impl CoreSlot {
    pub fn new(core: CoreId) -> Self {
        Self {
            core,
            current: None,
            selected: None,
            switch_needed: false,
        }
    }

    pub fn core(&self) -> CoreId {
        self.core
    }

    /// The guest thread presently assigned to this core
    pub fn current(&self) -> Option<&Arc<GuestThread>> {
        self.current.as_ref()
    }

    /// The thread that will occupy this core after the next switch
    pub fn selected(&self) -> Option<&Arc<GuestThread>> {
        self.selected.as_ref()
    }

    pub fn switch_needed(&self) -> bool {
        self.switch_needed
    }

    /// Records the thread that should occupy this core next
    ///
    /// A switch becomes pending only when the selection differs from the
    /// current occupant.
    pub fn select(&mut self, thread: Option<Arc<GuestThread>>) {
        self.switch_needed = !same_thread(&thread, &self.current);
        self.selected = thread;
    }

    /// Applies the pending reassignment
    ///
    /// Entitlement is not touched here; the scheduler moves it using the
    /// returned pair.
    pub fn perform_switch(&mut self) -> SlotSwitch {
        self.switch_needed = false;
        let previous = std::mem::replace(&mut self.current, self.selected.clone());
        SlotSwitch {
            previous,
            next: self.current.clone(),
        }
    }

    /// Re-derives the current occupant from the ready source
    ///
    /// Used in shared-core mode. Leaves the core idle when nothing is
    /// runnable on it.
    pub fn refresh_current(
        &mut self,
        source: &mut dyn ReadyThreadSource,
    ) -> Option<&Arc<GuestThread>> {
        self.selected = source.next_ready(self.core);
        self.current = self.selected.clone();
        self.switch_needed = false;
        self.current.as_ref()
    }
}

fn same_thread(a: &Option<Arc<GuestThread>>, b: &Option<Arc<GuestThread>>) -> bool {
    match (a, b) {
        (Some(a), Some(b)) => a.id() == b.id(),
        (None, None) => true,
        _ => false,
    }
}
