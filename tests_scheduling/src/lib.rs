//! Scheduling Test Utilities
//!
//! Shared helpers for integration tests that drive the scheduler from real
//! host threads.
//!
//! ## Test Philosophy
//!
//! - **Real carriers**: every guest thread is carried by its own host thread
//!   that parks and resumes through the host execution controller
//! - **Observable exclusion**: carriers count themselves in and out of their
//!   work section, so overlap is measured rather than assumed
//! - **Clean teardown**: every test releases all carriers and joins them

use core_types::CoreId;
use hle_kernel::test_utils::RecordingVehicle;
use hle_kernel::{GuestThread, Scheduler, SchedulerConfig, SwitchOutcome};
use host_exec::{HostExecutionController, Wake};
use std::panic;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// Upper bound for any condition a test waits on
pub const TEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Creates a shared-core scheduler with a short quantum
pub fn shared_core_scheduler(core_count: usize) -> Arc<Scheduler> {
    test_bootstrap(SchedulerConfig {
        core_count,
        quantum_ms: 1,
        audit_capacity: 4096,
        ..SchedulerConfig::shared_core()
    })
}

/// Creates a multi-core scheduler
pub fn multi_core_scheduler(core_count: usize) -> Arc<Scheduler> {
    test_bootstrap(SchedulerConfig {
        core_count,
        ..SchedulerConfig::multi_core()
    })
}

/// Bootstrap helper for tests
///
/// Creates a scheduler with its own host execution controller.
pub fn test_bootstrap(config: SchedulerConfig) -> Arc<Scheduler> {
    let controller = Arc::new(HostExecutionController::new());
    Arc::new(Scheduler::new(config, controller).expect("test config must be valid"))
}

/// Tracks how many carriers are inside their work section
#[derive(Debug, Default)]
pub struct RunStats {
    running: AtomicUsize,
    max_running: AtomicUsize,
}

impl RunStats {
    pub fn enter(&self) {
        let now = self.running.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_running.fetch_max(now, Ordering::SeqCst);
    }

    pub fn leave(&self) {
        self.running.fetch_sub(1, Ordering::SeqCst);
    }

    /// Largest number of carriers ever seen working at once
    pub fn max_running(&self) -> usize {
        self.max_running.load(Ordering::SeqCst)
    }
}

/// One guest thread together with its host carrier
pub struct Carrier {
    pub thread: Arc<GuestThread>,
    pub vehicle: Arc<RecordingVehicle>,
    work: Arc<AtomicU64>,
    handle: Option<JoinHandle<Wake>>,
}

impl Carrier {
    /// Number of work units this carrier completed
    pub fn work(&self) -> u64 {
        self.work.load(Ordering::SeqCst)
    }
}

/// A set of guest threads carried by real host threads
pub struct CarrierPool {
    scheduler: Arc<Scheduler>,
    stats: Arc<RunStats>,
    stop: Arc<AtomicBool>,
    yield_every: Option<u64>,
    carriers: Vec<Carrier>,
}

impl CarrierPool {
    /// Carriers switch only when asked to yield
    pub fn new(scheduler: Arc<Scheduler>) -> Self {
        Self {
            scheduler,
            stats: Arc::new(RunStats::default()),
            stop: Arc::new(AtomicBool::new(false)),
            yield_every: None,
            carriers: Vec::new(),
        }
    }

    /// Carriers also call `context_switch` every `units` work units
    pub fn yielding_every(mut self, units: u64) -> Self {
        self.yield_every = Some(units.max(1));
        self
    }

    pub fn scheduler(&self) -> &Arc<Scheduler> {
        &self.scheduler
    }

    pub fn stats(&self) -> &RunStats {
        &self.stats
    }

    pub fn carrier(&self, index: usize) -> &Carrier {
        &self.carriers[index]
    }

    pub fn len(&self) -> usize {
        self.carriers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.carriers.is_empty()
    }

    /// Creates a guest thread pinned to `core`, enqueues it and starts its
    /// carrier; returns the carrier's index
    ///
    /// The carrier parks until the scheduler first entitles it.
    pub fn spawn(&mut self, core: usize) -> usize {
        let vehicle = RecordingVehicle::new();
        let thread = Arc::new(GuestThread::new(CoreId(core), vehicle.clone()));
        self.scheduler.enqueue(thread.clone());

        let work = Arc::new(AtomicU64::new(0));
        let handle = {
            let scheduler = self.scheduler.clone();
            let thread = thread.clone();
            let vehicle = vehicle.clone();
            let stats = self.stats.clone();
            let work = work.clone();
            let stop = self.stop.clone();
            let yield_every = self.yield_every;
            thread::Builder::new()
                .name(format!("carrier-{}", self.carriers.len()))
                .spawn(move || {
                    run_carrier(&scheduler, &thread, &vehicle, &stats, &work, &stop, yield_every)
                })
                .expect("failed to spawn carrier")
        };

        self.carriers.push(Carrier {
            thread,
            vehicle,
            work,
            handle: Some(handle),
        });
        self.carriers.len() - 1
    }

    /// Waits for one carrier to finish and returns how it was woken last
    ///
    /// A panic on the carrier is re-raised on the caller with its original
    /// payload.
    pub fn join(&mut self, index: usize) -> Wake {
        let handle = self.carriers[index]
            .handle
            .take()
            .expect("carrier already joined");
        handle
            .join()
            .unwrap_or_else(|payload| panic::resume_unwind(payload))
    }

    /// Stops the ticker, releases every carrier and joins them
    pub fn shutdown(mut self) -> Vec<Wake> {
        self.stop.store(true, Ordering::SeqCst);
        self.scheduler.stop_preemption_ticker();
        for carrier in &self.carriers {
            self.scheduler.remove_thread(&carrier.thread);
        }
        (0..self.carriers.len())
            .filter(|&index| self.carriers[index].handle.is_some())
            .collect::<Vec<_>>()
            .into_iter()
            .map(|index| self.join(index))
            .collect()
    }
}

/// Body of a carrier host thread
///
/// Works while entitled and enters the scheduler at every interrupt request
/// (and every `yield_every` units if set).
fn run_carrier(
    scheduler: &Scheduler,
    thread: &GuestThread,
    vehicle: &RecordingVehicle,
    stats: &RunStats,
    work: &AtomicU64,
    stop: &AtomicBool,
    yield_every: Option<u64>,
) -> Wake {
    let carrier = thread.carrier();
    let mut wake = scheduler.controller().wait_until_entitled(carrier);

    while wake == Wake::Entitled && !stop.load(Ordering::SeqCst) {
        stats.enter();
        let done = work.fetch_add(1, Ordering::SeqCst) + 1;
        thread::sleep(Duration::from_micros(50));
        stats.leave();

        let voluntary = yield_every.is_some_and(|units| done % units == 0);
        if vehicle.take_interrupt() || voluntary {
            if let SwitchOutcome::Resumed(next) = scheduler.context_switch(carrier) {
                wake = next;
            }
        }
    }
    wake
}
