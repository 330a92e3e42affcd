//! # Host Execution Controller
//!
//! Bridges guest threads to the host threads that carry them.
//!
//! Every carrier has a control state. The scheduler grants or revokes the
//! right to run; a carrier that is not entitled parks in
//! [`HostExecutionController::wait_until_entitled`] until it is granted again
//! or released for good.
//!
//! ## Semantics
//!
//! - Entitlement is level-triggered: waiting on an entitled carrier returns at
//!   once and the carrier stays entitled.
//! - `exit` and `remove_thread` leave a terminal tombstone so that a wait which
//!   races with teardown returns [`Wake::Released`] instead of blocking forever.
//! - Every operation is idempotent on an already settled state.

use core_types::CarrierId;
use log::{debug, trace, warn};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};

/// Control state of one host carrier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CarrierState {
    /// Not permitted to run; `wait_until_entitled` blocks
    Parked,
    /// Permitted to run
    Entitled,
    /// Finished cleanly
    Exited,
    /// Forcibly deregistered
    Removed,
}

impl CarrierState {
    /// Returns true for the terminal states
    pub fn is_released(self) -> bool {
        matches!(self, CarrierState::Exited | CarrierState::Removed)
    }
}

/// Why a parked carrier woke up
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Wake {
    /// The scheduler granted entitlement
    Entitled,
    /// The carrier was exited or removed; it must unwind
    Released,
}

#[derive(Debug, Default)]
struct Registry {
    states: HashMap<CarrierId, CarrierState>,
    waiting: HashMap<CarrierId, usize>,
}

/// Process-wide registry of carrier control states.
#[derive(Debug, Default)]
pub struct HostExecutionController {
    registry: Mutex<Registry>,
    changed: Condvar,
}

impl HostExecutionController {
    /// Creates an empty controller
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a carrier in the parked state
    ///
    /// Already known carriers keep their state.
    pub fn register(&self, carrier: CarrierId) {
        let mut registry = self.registry();
        registry
            .states
            .entry(carrier)
            .or_insert(CarrierState::Parked);
    }

    /// Marks `carrier` as the one permitted to proceed and wakes it
    ///
    /// Unknown carriers are created entitled so a grant may precede the
    /// carrier's first wait. Released carriers are left alone.
    pub fn set_entitled(&self, carrier: CarrierId) {
        let mut registry = self.registry();
        let state = registry
            .states
            .entry(carrier)
            .or_insert(CarrierState::Parked);
        match *state {
            CarrierState::Entitled => {}
            CarrierState::Parked => {
                *state = CarrierState::Entitled;
                trace!("{} entitled", carrier);
                self.changed.notify_all();
            }
            CarrierState::Exited | CarrierState::Removed => {
                warn!("ignoring entitlement for released {}", carrier);
            }
        }
    }

    /// Revokes the running entitlement of `carrier`
    ///
    /// Never creates an entry: helper threads that were never scheduled stay
    /// unknown to the controller.
    pub fn clear_entitlement(&self, carrier: CarrierId) {
        let mut registry = self.registry();
        if let Some(state) = registry.states.get_mut(&carrier) {
            if *state == CarrierState::Entitled {
                *state = CarrierState::Parked;
                trace!("{} entitlement cleared", carrier);
            }
        }
    }

    /// Blocks the calling carrier until it is entitled or released
    ///
    /// This is the only blocking operation of the scheduling core. Callers
    /// must not hold the scheduler lock.
    pub fn wait_until_entitled(&self, carrier: CarrierId) -> Wake {
        let mut registry = self.registry();
        let mut parked = false;

        let wake = loop {
            let state = *registry
                .states
                .entry(carrier)
                .or_insert(CarrierState::Parked);
            match state {
                CarrierState::Entitled => break Wake::Entitled,
                CarrierState::Exited | CarrierState::Removed => break Wake::Released,
                CarrierState::Parked => {
                    if !parked {
                        parked = true;
                        *registry.waiting.entry(carrier).or_insert(0) += 1;
                        debug!("{} parked", carrier);
                    }
                    registry = self
                        .changed
                        .wait(registry)
                        .unwrap_or_else(PoisonError::into_inner);
                }
            }
        };

        if parked {
            if let Some(count) = registry.waiting.get_mut(&carrier) {
                *count -= 1;
                if *count == 0 {
                    registry.waiting.remove(&carrier);
                }
            }
            debug!("{} woke: {:?}", carrier, wake);
        }
        wake
    }

    /// Releases a carrier whose guest thread finished executing
    pub fn exit(&self, carrier: CarrierId) {
        self.release(carrier, CarrierState::Exited);
    }

    /// Forcibly deregisters a carrier (abnormal teardown)
    pub fn remove_thread(&self, carrier: CarrierId) {
        self.release(carrier, CarrierState::Removed);
    }

    /// Returns the control state of a carrier
    pub fn state(&self, carrier: CarrierId) -> Option<CarrierState> {
        self.registry().states.get(&carrier).copied()
    }

    /// Returns true if the carrier is currently entitled
    pub fn is_entitled(&self, carrier: CarrierId) -> bool {
        self.state(carrier) == Some(CarrierState::Entitled)
    }

    /// Returns true if the carrier was ever registered, granted or waited on
    pub fn is_known(&self, carrier: CarrierId) -> bool {
        self.registry().states.contains_key(&carrier)
    }

    /// Returns the number of host threads parked on `carrier`
    pub fn parked_waiters(&self, carrier: CarrierId) -> usize {
        self.registry()
            .waiting
            .get(&carrier)
            .copied()
            .unwrap_or(0)
    }

    fn release(&self, carrier: CarrierId, terminal: CarrierState) {
        let mut registry = self.registry();
        let state = registry.states.entry(carrier).or_insert(terminal);
        if state.is_released() {
            return;
        }
        *state = terminal;
        debug!("{} released ({:?})", carrier, terminal);
        self.changed.notify_all();
    }

    fn registry(&self) -> MutexGuard<'_, Registry> {
        self.registry
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;
    use std::time::{Duration, Instant};

    fn wait_for_parked(controller: &HostExecutionController, carrier: CarrierId) {
        let deadline = Instant::now() + Duration::from_secs(5);
        while controller.parked_waiters(carrier) == 0 {
            assert!(Instant::now() < deadline, "carrier never parked");
            thread::sleep(Duration::from_millis(1));
        }
    }

    #[test]
    fn test_register_starts_parked() {
        let controller = HostExecutionController::new();
        let carrier = CarrierId::new();
        controller.register(carrier);
        assert_eq!(controller.state(carrier), Some(CarrierState::Parked));
        assert!(!controller.is_entitled(carrier));
    }

    #[test]
    fn test_register_keeps_existing_state() {
        let controller = HostExecutionController::new();
        let carrier = CarrierId::new();
        controller.set_entitled(carrier);
        controller.register(carrier);
        assert!(controller.is_entitled(carrier));
    }

    #[test]
    fn test_wait_returns_immediately_when_entitled() {
        let controller = HostExecutionController::new();
        let carrier = CarrierId::new();
        controller.set_entitled(carrier);

        assert_eq!(controller.wait_until_entitled(carrier), Wake::Entitled);
        // Level-triggered: still entitled afterwards
        assert_eq!(controller.wait_until_entitled(carrier), Wake::Entitled);
        assert!(controller.is_entitled(carrier));
    }

    #[test]
    fn test_clear_entitlement_does_not_create_entries() {
        let controller = HostExecutionController::new();
        let helper = CarrierId::new();
        controller.clear_entitlement(helper);
        assert!(!controller.is_known(helper));
    }

    #[test]
    fn test_set_and_clear_are_idempotent() {
        let controller = HostExecutionController::new();
        let carrier = CarrierId::new();

        controller.set_entitled(carrier);
        controller.set_entitled(carrier);
        assert!(controller.is_entitled(carrier));

        controller.clear_entitlement(carrier);
        controller.clear_entitlement(carrier);
        assert_eq!(controller.state(carrier), Some(CarrierState::Parked));
    }

    #[test]
    fn test_parked_carrier_wakes_on_grant() {
        let controller = Arc::new(HostExecutionController::new());
        let carrier = CarrierId::new();
        controller.register(carrier);

        let waiter = {
            let controller = controller.clone();
            thread::spawn(move || controller.wait_until_entitled(carrier))
        };

        wait_for_parked(&controller, carrier);
        assert!(!waiter.is_finished());

        controller.set_entitled(carrier);
        assert_eq!(waiter.join().unwrap(), Wake::Entitled);
        assert_eq!(controller.parked_waiters(carrier), 0);
    }

    #[test]
    fn test_grant_for_other_carrier_does_not_wake() {
        let controller = Arc::new(HostExecutionController::new());
        let parked = CarrierId::new();
        let other = CarrierId::new();
        controller.register(parked);

        let waiter = {
            let controller = controller.clone();
            thread::spawn(move || controller.wait_until_entitled(parked))
        };

        wait_for_parked(&controller, parked);
        controller.set_entitled(other);
        thread::sleep(Duration::from_millis(20));
        assert!(!waiter.is_finished());

        controller.remove_thread(parked);
        assert_eq!(waiter.join().unwrap(), Wake::Released);
    }

    #[test]
    fn test_exit_releases_waiter() {
        let controller = Arc::new(HostExecutionController::new());
        let carrier = CarrierId::new();
        controller.register(carrier);

        let waiter = {
            let controller = controller.clone();
            thread::spawn(move || controller.wait_until_entitled(carrier))
        };

        wait_for_parked(&controller, carrier);
        controller.exit(carrier);
        assert_eq!(waiter.join().unwrap(), Wake::Released);
        assert_eq!(controller.state(carrier), Some(CarrierState::Exited));
    }

    #[test]
    fn test_wait_after_teardown_does_not_block() {
        let controller = HostExecutionController::new();
        let exited = CarrierId::new();
        let removed = CarrierId::new();
        controller.exit(exited);
        controller.remove_thread(removed);

        assert_eq!(controller.wait_until_entitled(exited), Wake::Released);
        assert_eq!(controller.wait_until_entitled(removed), Wake::Released);
    }

    #[test]
    fn test_released_carriers_are_not_revived() {
        let controller = HostExecutionController::new();
        let carrier = CarrierId::new();
        controller.exit(carrier);
        controller.set_entitled(carrier);
        controller.remove_thread(carrier);

        assert_eq!(controller.state(carrier), Some(CarrierState::Exited));
    }
}
