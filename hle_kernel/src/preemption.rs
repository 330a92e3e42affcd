//! Preemption ticker
//!
//! A background host thread that drives round-robin preemption. Once per
//! quantum it asks the thread at the cursor slot to yield (shared-core mode)
//! and performs per-tick bookkeeping such as starting threads selected onto
//! idle cores (multi-core mode).
//!
//! The ticker never switches threads itself. The interrupted carrier reaches
//! its next safe point and calls `context_switch`.

use crate::error::SchedulerError;
use crate::scheduler::Shared;
use log::{info, trace, warn};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError, Sender};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// Name of the ticker's host thread
pub const TICKER_THREAD_NAME: &str = "hle-preemption";

/// Extra work run on every tick
pub trait PreemptionHook: Send + Sync {
    fn on_tick(&self);
}

/// Handle to a running ticker thread
pub(crate) struct PreemptionTicker {
    stop: Sender<()>,
    handle: Option<JoinHandle<()>>,
}

impl PreemptionTicker {
    pub(crate) fn spawn(
        shared: Arc<Shared>,
        quantum: Duration,
        hook: Option<Arc<dyn PreemptionHook>>,
        ticks: Arc<AtomicU64>,
    ) -> Result<Self, SchedulerError> {
        let (stop, stop_rx) = mpsc::channel();
        let handle = thread::Builder::new()
            .name(TICKER_THREAD_NAME.to_string())
            .spawn(move || {
                info!("preemption ticker started, quantum {:?}", quantum);
                loop {
                    if shared.request_preemption() {
                        trace!("preemption requested");
                    }
                    shared.wake_idle_cores();
                    if let Some(hook) = &hook {
                        hook.on_tick();
                    }
                    ticks.fetch_add(1, Ordering::SeqCst);

                    match stop_rx.recv_timeout(quantum) {
                        Err(RecvTimeoutError::Timeout) => {}
                        Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                    }
                }
                info!("preemption ticker stopped");
            })
            .map_err(|err| SchedulerError::TickerSpawn(err.to_string()))?;

        Ok(Self {
            stop,
            handle: Some(handle),
        })
    }

    /// Signals the ticker and waits for it to finish
    pub(crate) fn stop(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        let Some(handle) = self.handle.take() else {
            return;
        };
        // A send error means the thread already left its loop
        let _ = self.stop.send(());
        if handle.join().is_err() {
            warn!("preemption ticker panicked");
        }
    }
}

impl Drop for PreemptionTicker {
    fn drop(&mut self) {
        self.shutdown();
    }
}
