//! Thread Lifecycle Tests
//!
//! Validates exit and removal of guest threads while other carriers keep
//! running, and scheduler construction from a configuration file.

use core_types::{CarrierId, CoreId};
use hle_kernel::test_utils::wait_until;
use hle_kernel::{ScheduleEvent, Scheduler, SchedulerConfig, SchedulerError};
use host_exec::{CarrierState, HostExecutionController, Wake};
use std::sync::Arc;
use tests_scheduling::{shared_core_scheduler, CarrierPool, TEST_TIMEOUT};

/// Test: Exiting one thread releases its carrier and spares the others
///
/// This validates that:
/// 1. The exited thread's vehicle is stopped and its carrier unwinds
/// 2. The exited thread is never selected again
/// 3. Remaining carriers keep making progress
#[test]
fn test_exit_releases_carrier() {
    let scheduler = shared_core_scheduler(3);
    let mut pool = CarrierPool::new(scheduler.clone());
    for core in 0..3 {
        pool.spawn(core);
    }
    scheduler.start_preemption_ticker().unwrap();
    scheduler.context_switch(CarrierId::new());
    wait_until(TEST_TIMEOUT, || {
        (0..pool.len()).all(|index| pool.carrier(index).work() > 0)
    });

    let exited = pool.carrier(1).thread.clone();
    scheduler.exit_thread(&exited);
    assert_eq!(pool.join(1), Wake::Released);
    assert_eq!(pool.carrier(1).vehicle.stops(), 1);
    assert_eq!(
        scheduler.controller().state(exited.carrier()),
        Some(CarrierState::Exited)
    );

    scheduler.clear_audit_log();
    let before = [pool.carrier(0).work(), pool.carrier(2).work()];
    wait_until(TEST_TIMEOUT, || {
        pool.carrier(0).work() > before[0] && pool.carrier(2).work() > before[1]
    });
    let reselected = scheduler.audit_log().iter().any(|event| {
        matches!(event, ScheduleEvent::ThreadSelected { thread, .. } if *thread == exited.id())
    });
    assert!(!reselected);
    assert_eq!(pool.stats().max_running(), 1);

    let wakes = pool.shutdown();
    assert_eq!(wakes.len(), 2);
}

/// Test: Removing a parked thread wakes it with a release
#[test]
fn test_remove_parked_thread() {
    let scheduler = shared_core_scheduler(2);
    let mut pool = CarrierPool::new(scheduler.clone());
    let index = pool.spawn(0);
    let carrier = pool.carrier(index).thread.carrier();
    let controller = scheduler.controller().clone();
    wait_until(TEST_TIMEOUT, || controller.parked_waiters(carrier) == 1);

    scheduler.remove_thread(&pool.carrier(index).thread);
    assert_eq!(pool.join(index), Wake::Released);
    assert_eq!(pool.carrier(index).work(), 0);
    assert_eq!(pool.carrier(index).vehicle.stops(), 0);

    // Further releases are no-ops
    scheduler.remove_thread(&pool.carrier(index).thread);
    assert_eq!(controller.state(carrier), Some(CarrierState::Removed));
}

/// Test: A scheduler is built from a JSON configuration file
#[test]
fn test_scheduler_from_config_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("scheduler.json");
    std::fs::write(&path, r#"{ "multi_core_scheduling": true, "core_count": 2 }"#).unwrap();

    let config = SchedulerConfig::load_from_path(&path).unwrap();
    let scheduler = Scheduler::new(config, Arc::new(HostExecutionController::new())).unwrap();

    assert!(scheduler.multi_core_scheduling());
    assert_eq!(scheduler.core_count(), 2);
    assert_eq!(scheduler.config().quantum_ms, 10);
    assert_eq!(
        scheduler.select_thread(CoreId(2), None),
        Err(SchedulerError::UnknownCore(CoreId(2)))
    );
}

/// Test: An out-of-range configuration is rejected
#[test]
fn test_invalid_config_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("scheduler.json");
    std::fs::write(&path, r#"{ "core_count": 65 }"#).unwrap();

    assert!(SchedulerConfig::load_from_path(&path).is_err());
}
