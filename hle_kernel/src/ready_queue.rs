//! Ready-thread sources feeding the core slots.

use crate::thread::GuestThread;
use core_types::{CoreId, GuestThreadId};
use std::collections::VecDeque;
use std::sync::Arc;

/// Supplies runnable threads to core slots
///
/// Implementations decide the per-core order. Repeated `next_ready` calls
/// for the same core must cycle through its threads, which is what turns
/// round-robin over slots into round-robin over threads.
pub trait ReadyThreadSource: Send {
    /// Makes a thread runnable on its pinned core
    fn insert(&mut self, thread: Arc<GuestThread>);

    /// Removes a thread from every core; returns true if it was present
    fn remove(&mut self, id: GuestThreadId) -> bool;

    /// Returns the next runnable thread for `core`, if any
    fn next_ready(&mut self, core: CoreId) -> Option<Arc<GuestThread>>;
}

/// Per-core FIFO rotation
///
/// `next_ready` returns the front thread of the core's queue and rotates it
/// to the back, so every thread on a core gets its turn.
#[derive(Debug)]
pub struct RoundRobinQueue {
    queues: Vec<VecDeque<Arc<GuestThread>>>,
}

impl RoundRobinQueue {
    pub fn new(core_count: usize) -> Self {
        Self {
            queues: (0..core_count).map(|_| VecDeque::new()).collect(),
        }
    }

    /// Number of runnable threads on `core`
    pub fn len(&self, core: CoreId) -> usize {
        self.queues.get(core.index()).map_or(0, VecDeque::len)
    }

    pub fn is_empty(&self) -> bool {
        self.queues.iter().all(VecDeque::is_empty)
    }

    pub fn contains(&self, id: GuestThreadId) -> bool {
        self.queues
            .iter()
            .any(|queue| queue.iter().any(|thread| thread.id() == id))
    }
}

impl ReadyThreadSource for RoundRobinQueue {
    fn insert(&mut self, thread: Arc<GuestThread>) {
        if self.contains(thread.id()) {
            return;
        }
        // Threads pinned past the slot array fold onto the existing cores
        let core = thread.core().index() % self.queues.len().max(1);
        if let Some(queue) = self.queues.get_mut(core) {
            queue.push_back(thread);
        }
    }

    fn remove(&mut self, id: GuestThreadId) -> bool {
        let mut removed = false;
        for queue in &mut self.queues {
            let before = queue.len();
            queue.retain(|thread| thread.id() != id);
            removed |= queue.len() != before;
        }
        removed
    }

    fn next_ready(&mut self, core: CoreId) -> Option<Arc<GuestThread>> {
        let queue = self.queues.get_mut(core.index())?;
        let thread = queue.pop_front()?;
        queue.push_back(thread.clone());
        Some(thread)
    }
}
