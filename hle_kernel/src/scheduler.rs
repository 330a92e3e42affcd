//! Thread Scheduler
//!
//! Decides which guest thread occupies which emulated core and hands the
//! decision to the host execution controller.
//!
//! ## Modes
//!
//! - **Multi-core** (`multi_core_scheduling = true`): every core is
//!   independent. A carrier entering [`Scheduler::context_switch`] applies the
//!   pending switches of the cores it occupies and keeps running only if it
//!   still occupies exactly one core.
//! - **Shared-core** (`multi_core_scheduling = false`): one logical core is
//!   time-sliced. A rotating cursor walks the slots; each switch hands the
//!   core to the next slot with a runnable thread.
//!
//! ## Locking
//!
//! All slots, the cursor, the mode flag and the ready source live in one
//! [`SchedulerState`] behind one mutex. Calls into the execution vehicle
//! happen under that lock. Parking in `wait_until_entitled` always happens
//! after the lock is released.
//!
//! ## Fatal invariant
//!
//! A carrier found on more than one core in multi-core mode means the
//! selection logic is broken. The scheduler panics instead of correcting it.

use crate::config::SchedulerConfig;
use crate::core_slot::{CoreSlot, SlotSwitch};
use crate::error::SchedulerError;
use crate::preemption::{PreemptionHook, PreemptionTicker};
use crate::ready_queue::{ReadyThreadSource, RoundRobinQueue};
use crate::thread::GuestThread;
use core_types::{CarrierId, CoreId, GuestThreadId};
use host_exec::{CarrierState, HostExecutionController, Wake};
use log::{debug, error, info, warn};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// What a call to [`Scheduler::context_switch`] did
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SwitchOutcome {
    /// Multi-core: the caller is unknown to the controller and occupies no
    /// core; it keeps running outside guest scheduling
    Unscheduled,
    /// Shared-core: another carrier owns the core and was asked to yield
    ForeignInterrupted,
    /// Shared-core: nothing was running, the caller is an external host thread
    External,
    /// The caller went through `wait_until_entitled` and woke up
    Resumed(Wake),
}

/// Scheduling event for the audit trail
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ScheduleEvent {
    /// A thread was granted a core and resumed
    ThreadSelected { core: CoreId, thread: GuestThreadId },
    /// A thread lost its running entitlement
    EntitlementCleared { core: CoreId, thread: GuestThreadId },
    /// A thread's carrier was asked to yield
    InterruptRequested { core: CoreId, thread: GuestThreadId },
    /// A thread finished and its carrier was released
    ThreadExited { thread: GuestThreadId },
    /// A thread was forcibly deregistered
    ThreadRemoved { thread: GuestThreadId },
}

/// Bounded ring of scheduling events.
#[derive(Debug)]
struct AuditLog {
    events: VecDeque<ScheduleEvent>,
    capacity: usize,
}

impl AuditLog {
    fn with_capacity(capacity: usize) -> Self {
        Self {
            events: VecDeque::with_capacity(capacity.min(1024)),
            capacity,
        }
    }

    fn record(&mut self, event: ScheduleEvent) {
        if self.capacity == 0 {
            return;
        }
        if self.events.len() == self.capacity {
            self.events.pop_front();
        }
        self.events.push_back(event);
    }
}

/// Everything guarded by the scheduler lock
pub(crate) struct SchedulerState {
    slots: Vec<CoreSlot>,
    cursor: usize,
    multi_core: bool,
    ready: Box<dyn ReadyThreadSource>,
    audit: AuditLog,
}

/// State shared between the scheduler handle and the preemption ticker
pub(crate) struct Shared {
    state: Mutex<SchedulerState>,
    controller: Arc<HostExecutionController>,
}

impl Shared {
    fn lock_state(&self) -> MutexGuard<'_, SchedulerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Returns true once the thread's carrier has exited or been removed
    fn is_released(&self, thread: &GuestThread) -> bool {
        self.controller
            .state(thread.carrier())
            .is_some_and(CarrierState::is_released)
    }

    /// Moves entitlement according to a slot switch
    fn apply_switch(&self, audit: &mut AuditLog, core: CoreId, switch: SlotSwitch) {
        if let Some(previous) = &switch.previous {
            self.controller.clear_entitlement(previous.carrier());
            audit.record(ScheduleEvent::EntitlementCleared {
                core,
                thread: previous.id(),
            });
        }
        if let Some(next) = &switch.next {
            next.clear_exclusive();
            self.controller.set_entitled(next.carrier());
            next.vehicle().execute();
            audit.record(ScheduleEvent::ThreadSelected {
                core,
                thread: next.id(),
            });
            debug!("{} now runs {}", core, next.id());
        }
    }

    /// Multi-core steps 1 and 2: switch the caller's cores, count occupancy
    fn switch_cores_of(&self, state: &mut SchedulerState, caller: CarrierId) -> usize {
        let mut occupied = 0;
        for slot in state.slots.iter_mut() {
            let carried = slot.current().is_some_and(|t| t.is_carried_by(caller));
            if carried && slot.switch_needed() {
                let core = slot.core();
                let switch = slot.perform_switch();
                self.apply_switch(&mut state.audit, core, switch);
            }
            if slot.current().is_some_and(|t| t.is_carried_by(caller)) {
                occupied += 1;
            }
        }
        occupied
    }

    /// Shared-core step 2: walk the cursor to the next runnable slot
    ///
    /// Every slot is visited once, so threads pinned to any configured core
    /// are reachable.
    fn advance_cursor(&self, state: &mut SchedulerState) -> Option<Arc<GuestThread>> {
        let core_count = state.slots.len();
        for _ in 0..core_count {
            state.cursor = (state.cursor + 1) % core_count;
            let slot = &mut state.slots[state.cursor];
            if let Some(next) = slot.refresh_current(state.ready.as_mut()).cloned() {
                next.clear_exclusive();
                self.controller.set_entitled(next.carrier());
                next.vehicle().execute();
                state.audit.record(ScheduleEvent::ThreadSelected {
                    core: slot.core(),
                    thread: next.id(),
                });
                debug!("round-robin handed {} to {}", slot.core(), next.id());
                return Some(next);
            }
        }
        debug!("no runnable thread on any core");
        None
    }

    /// Asks the thread at the cursor to yield (shared-core mode only)
    pub(crate) fn request_preemption(&self) -> bool {
        let mut guard = self.lock_state();
        let state = &mut *guard;
        if state.multi_core {
            return false;
        }
        let slot = &state.slots[state.cursor];
        let Some(current) = slot.current().cloned() else {
            return false;
        };
        current.vehicle().request_interrupt();
        state.audit.record(ScheduleEvent::InterruptRequested {
            core: slot.core(),
            thread: current.id(),
        });
        true
    }

    /// Starts the selected threads of idle cores (multi-core mode only)
    pub(crate) fn wake_idle_cores(&self) -> usize {
        let mut guard = self.lock_state();
        let state = &mut *guard;
        if !state.multi_core {
            return 0;
        }
        let mut woken = 0;
        for slot in state.slots.iter_mut() {
            if slot.current().is_none() && slot.switch_needed() {
                let core = slot.core();
                let switch = slot.perform_switch();
                if switch.next.is_some() {
                    woken += 1;
                }
                self.apply_switch(&mut state.audit, core, switch);
            }
        }
        woken
    }
}

/// The thread scheduler
pub struct Scheduler {
    shared: Arc<Shared>,
    config: SchedulerConfig,
    ticker: Mutex<Option<PreemptionTicker>>,
    ticks: Arc<AtomicU64>,
    hook: Option<Arc<dyn PreemptionHook>>,
}

impl Scheduler {
    /// Creates a scheduler backed by a [`RoundRobinQueue`]
    pub fn new(
        config: SchedulerConfig,
        controller: Arc<HostExecutionController>,
    ) -> Result<Self, SchedulerError> {
        let source = Box::new(RoundRobinQueue::new(config.core_count));
        Self::with_ready_source(config, controller, source)
    }

    /// Creates a scheduler with a custom ready-thread source
    pub fn with_ready_source(
        config: SchedulerConfig,
        controller: Arc<HostExecutionController>,
        ready: Box<dyn ReadyThreadSource>,
    ) -> Result<Self, SchedulerError> {
        config.validate()?;
        let slots = (0..config.core_count).map(|i| CoreSlot::new(CoreId(i))).collect();
        let state = SchedulerState {
            slots,
            cursor: 0,
            multi_core: config.multi_core_scheduling,
            ready,
            audit: AuditLog::with_capacity(config.audit_capacity),
        };
        info!(
            "scheduler ready: {} cores, {} mode",
            config.core_count,
            mode_name(config.multi_core_scheduling)
        );
        Ok(Self {
            shared: Arc::new(Shared {
                state: Mutex::new(state),
                controller,
            }),
            config,
            ticker: Mutex::new(None),
            ticks: Arc::new(AtomicU64::new(0)),
            hook: None,
        })
    }

    /// Installs extra per-tick bookkeeping run by the preemption ticker
    pub fn with_preemption_hook(mut self, hook: Arc<dyn PreemptionHook>) -> Self {
        self.hook = Some(hook);
        self
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    pub fn controller(&self) -> &Arc<HostExecutionController> {
        &self.shared.controller
    }

    pub fn core_count(&self) -> usize {
        self.config.core_count
    }

    pub fn multi_core_scheduling(&self) -> bool {
        self.shared.lock_state().multi_core
    }

    /// Switches between multi-core and shared-core scheduling
    pub fn set_multi_core_scheduling(&self, enabled: bool) {
        let mut state = self.shared.lock_state();
        if state.multi_core != enabled {
            info!("scheduling mode: {}", mode_name(enabled));
        }
        state.multi_core = enabled;
    }

    /// Position of the round-robin cursor
    pub fn cursor(&self) -> usize {
        self.shared.lock_state().cursor
    }

    /// Current occupant of a core
    pub fn current_thread(&self, core: CoreId) -> Option<Arc<GuestThread>> {
        self.shared
            .lock_state()
            .slots
            .get(core.index())
            .and_then(|slot| slot.current().cloned())
    }

    /// Returns true if a reassignment is pending on `core`
    pub fn switch_needed(&self, core: CoreId) -> bool {
        self.shared
            .lock_state()
            .slots
            .get(core.index())
            .is_some_and(CoreSlot::switch_needed)
    }

    /// Makes a thread known to the scheduler
    ///
    /// Registers its carrier (parked) and inserts it into the ready source.
    pub fn enqueue(&self, thread: Arc<GuestThread>) {
        self.shared.controller.register(thread.carrier());
        debug!("enqueued {} on {}", thread.id(), thread.core());
        self.shared.lock_state().ready.insert(thread);
    }

    /// Records the thread that should occupy `core` next (multi-core mode)
    ///
    /// Selection is trusted: selecting a thread that already occupies another
    /// core is not rejected here and trips the occupancy check later.
    pub fn select_thread(
        &self,
        core: CoreId,
        thread: Option<Arc<GuestThread>>,
    ) -> Result<(), SchedulerError> {
        let mut state = self.shared.lock_state();
        let slot = state
            .slots
            .get_mut(core.index())
            .ok_or(SchedulerError::UnknownCore(core))?;
        slot.select(thread);
        Ok(())
    }

    /// Starts the selected threads of idle cores; returns how many started
    pub fn wake_idle_cores(&self) -> usize {
        self.shared.wake_idle_cores()
    }

    /// The scheduling entry point
    ///
    /// Callable from any carrier and from emulator-internal helper threads.
    /// May park the calling host thread until it is entitled again.
    ///
    /// # Panics
    ///
    /// Panics in multi-core mode if the caller occupies more than one core.
    pub fn context_switch(&self, caller: CarrierId) -> SwitchOutcome {
        let controller = &self.shared.controller;
        let mut guard = self.shared.lock_state();
        let state = &mut *guard;

        if state.multi_core {
            match self.shared.switch_cores_of(state, caller) {
                0 => {
                    controller.clear_entitlement(caller);
                    if !controller.is_known(caller) {
                        return SwitchOutcome::Unscheduled;
                    }
                }
                1 => controller.set_entitled(caller),
                occupied => {
                    drop(guard);
                    error!("{} occupies {} cores at once", caller, occupied);
                    panic!(
                        "guest thread scheduled on more than one core ({} occupies {} cores)",
                        caller, occupied
                    );
                }
            }
        } else {
            let core = CoreId(state.cursor);
            // A released occupant never switches itself out again
            let occupant = state.slots[state.cursor]
                .current()
                .cloned()
                .filter(|current| {
                    current.is_carried_by(caller) || !self.shared.is_released(current)
                });
            match occupant {
                Some(current) if !current.is_carried_by(caller) => {
                    current.vehicle().request_interrupt();
                    state.audit.record(ScheduleEvent::InterruptRequested {
                        core,
                        thread: current.id(),
                    });
                    return SwitchOutcome::ForeignInterrupted;
                }
                Some(current) => {
                    controller.clear_entitlement(current.carrier());
                    state.audit.record(ScheduleEvent::EntitlementCleared {
                        core,
                        thread: current.id(),
                    });
                    self.shared.advance_cursor(state);
                }
                None => {
                    self.shared.advance_cursor(state);
                    return SwitchOutcome::External;
                }
            }
        }

        drop(guard);
        SwitchOutcome::Resumed(controller.wait_until_entitled(caller))
    }

    /// Stops a finished thread and releases its carrier
    ///
    /// The thread leaves the ready source first so no concurrent switch can
    /// hand a core to a released carrier. Slots are not edited: in
    /// shared-core mode a released thread left at the cursor is passed over
    /// by the next switch.
    pub fn exit_thread(&self, thread: &GuestThread) {
        self.forget(thread, ScheduleEvent::ThreadExited { thread: thread.id() });
        thread.vehicle().stop_execution();
        self.shared.controller.exit(thread.carrier());
    }

    /// Forcibly deregisters a thread (abnormal teardown)
    pub fn remove_thread(&self, thread: &GuestThread) {
        self.forget(thread, ScheduleEvent::ThreadRemoved { thread: thread.id() });
        self.shared.controller.remove_thread(thread.carrier());
    }

    fn forget(&self, thread: &GuestThread, event: ScheduleEvent) {
        let mut guard = self.shared.lock_state();
        let state = &mut *guard;
        state.ready.remove(thread.id());
        if let Some(slot) = state
            .slots
            .iter()
            .find(|slot| slot.current().is_some_and(|t| t.id() == thread.id()))
        {
            warn!("{} released while still current on {}", thread.id(), slot.core());
        }
        state.audit.record(event);
    }

    /// Starts the round-robin preemption ticker
    pub fn start_preemption_ticker(&self) -> Result<(), SchedulerError> {
        let mut ticker = self.ticker.lock().unwrap_or_else(PoisonError::into_inner);
        if ticker.is_some() {
            return Err(SchedulerError::TickerAlreadyRunning);
        }
        *ticker = Some(PreemptionTicker::spawn(
            self.shared.clone(),
            self.config.quantum(),
            self.hook.clone(),
            self.ticks.clone(),
        )?);
        Ok(())
    }

    /// Stops and joins the ticker; returns false if none was running
    pub fn stop_preemption_ticker(&self) -> bool {
        let ticker = self
            .ticker
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        match ticker {
            Some(ticker) => {
                ticker.stop();
                true
            }
            None => false,
        }
    }

    pub fn is_preempting(&self) -> bool {
        self.ticker
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    /// Number of ticker iterations so far
    pub fn preemption_ticks(&self) -> u64 {
        self.ticks.load(Ordering::SeqCst)
    }

    /// Returns a copy of the audit log
    ///
    /// Used in tests to verify scheduling behavior.
    pub fn audit_log(&self) -> Vec<ScheduleEvent> {
        self.shared.lock_state().audit.events.iter().cloned().collect()
    }

    /// Clears the audit log
    pub fn clear_audit_log(&self) {
        self.shared.lock_state().audit.events.clear();
    }
}

impl Drop for Scheduler {
    fn drop(&mut self) {
        self.stop_preemption_ticker();
    }
}

fn mode_name(multi_core: bool) -> &'static str {
    if multi_core {
        "multi-core"
    } else {
        "shared-core"
    }
}
