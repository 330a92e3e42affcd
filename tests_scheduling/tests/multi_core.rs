//! Multi-Core Scheduling Tests
//!
//! Validates independent per-core scheduling with real carriers: sole
//! occupants keep running, descheduled threads park, re-selection on an
//! idle core resumes them, and double occupancy is caught under concurrency.

use core_types::CoreId;
use hle_kernel::test_utils::wait_until;
use std::thread;
use std::time::Duration;
use tests_scheduling::{multi_core_scheduler, CarrierPool, TEST_TIMEOUT};

/// Test: One carrier per core, all running concurrently
///
/// Every carrier enters the scheduler at each work unit; as the sole
/// occupant of its core it is re-entitled each time and never parks.
#[test]
fn test_cores_run_independently() {
    let scheduler = multi_core_scheduler(4);
    let mut pool = CarrierPool::new(scheduler.clone()).yielding_every(1);
    for core in 0..4 {
        let index = pool.spawn(core);
        scheduler
            .select_thread(CoreId(core), Some(pool.carrier(index).thread.clone()))
            .unwrap();
    }
    assert_eq!(scheduler.wake_idle_cores(), 4);

    wait_until(TEST_TIMEOUT, || {
        (0..pool.len()).all(|index| pool.carrier(index).work() >= 50)
    });
    assert!(pool.stats().max_running() <= 4);
    for index in 0..pool.len() {
        assert_eq!(pool.carrier(index).vehicle.executes(), 1);
    }

    let wakes = pool.shutdown();
    assert_eq!(wakes.len(), 4);
}

/// Test: A thread migrates between cores
///
/// This validates that:
/// 1. Deselecting a thread parks its carrier at its next switch
/// 2. Other cores keep running meanwhile
/// 3. Selecting it onto an idle core resumes it
#[test]
fn test_thread_migrates_between_cores() {
    let scheduler = multi_core_scheduler(4);
    let mut pool = CarrierPool::new(scheduler.clone()).yielding_every(1);
    let a = pool.spawn(0);
    let b = pool.spawn(1);
    let thread_a = pool.carrier(a).thread.clone();
    scheduler
        .select_thread(CoreId(0), Some(thread_a.clone()))
        .unwrap();
    scheduler
        .select_thread(CoreId(1), Some(pool.carrier(b).thread.clone()))
        .unwrap();
    scheduler.wake_idle_cores();
    wait_until(TEST_TIMEOUT, || {
        pool.carrier(a).work() > 10 && pool.carrier(b).work() > 10
    });

    scheduler.select_thread(CoreId(0), None).unwrap();
    let controller = scheduler.controller().clone();
    wait_until(TEST_TIMEOUT, || {
        controller.parked_waiters(thread_a.carrier()) == 1
    });
    assert!(scheduler.current_thread(CoreId(0)).is_none());

    let parked_work = pool.carrier(a).work();
    let running_work = pool.carrier(b).work();
    thread::sleep(Duration::from_millis(20));
    assert_eq!(pool.carrier(a).work(), parked_work);
    assert!(pool.carrier(b).work() > running_work);

    scheduler
        .select_thread(CoreId(2), Some(thread_a.clone()))
        .unwrap();
    assert_eq!(scheduler.wake_idle_cores(), 1);
    wait_until(TEST_TIMEOUT, || pool.carrier(a).work() > parked_work);
    assert_eq!(
        scheduler.current_thread(CoreId(2)).unwrap().id(),
        thread_a.id()
    );
    assert_eq!(pool.carrier(a).vehicle.executes(), 2);

    pool.shutdown();
}

/// Test: The ticker starts threads selected onto idle cores
#[test]
fn test_ticker_wakes_idle_cores() {
    let scheduler = multi_core_scheduler(2);
    let mut pool = CarrierPool::new(scheduler.clone()).yielding_every(1);
    let index = pool.spawn(1);
    scheduler.start_preemption_ticker().unwrap();

    scheduler
        .select_thread(CoreId(1), Some(pool.carrier(index).thread.clone()))
        .unwrap();
    wait_until(TEST_TIMEOUT, || pool.carrier(index).work() > 0);
    assert_eq!(pool.carrier(index).vehicle.interrupts(), 0);

    pool.shutdown();
}

/// Test: Migration under concurrent switching never trips the occupancy check
///
/// Carriers on cores 1 and 2 enter the scheduler at every work unit while a
/// third thread is moved back and forth between cores 0 and 3. Each move
/// deselects first and reselects only after the carrier parked, so the
/// thread never occupies two cores and no carrier may panic.
#[test]
fn test_migration_under_concurrent_switches() {
    let scheduler = multi_core_scheduler(4);
    let mut pool = CarrierPool::new(scheduler.clone()).yielding_every(1);
    let mover = pool.spawn(0);
    let steady: Vec<usize> = (1..3).map(|core| pool.spawn(core)).collect();
    for &index in &steady {
        let thread = pool.carrier(index).thread.clone();
        scheduler.select_thread(thread.core(), Some(thread)).unwrap();
    }
    let thread = pool.carrier(mover).thread.clone();
    scheduler
        .select_thread(CoreId(0), Some(thread.clone()))
        .unwrap();
    assert_eq!(scheduler.wake_idle_cores(), 3);

    let controller = scheduler.controller().clone();
    let mut from = CoreId(0);
    for round in 0..6 {
        let to = if round % 2 == 0 { CoreId(3) } else { CoreId(0) };
        let worked = pool.carrier(mover).work();
        wait_until(TEST_TIMEOUT, || pool.carrier(mover).work() > worked);

        scheduler.select_thread(from, None).unwrap();
        wait_until(TEST_TIMEOUT, || controller.parked_waiters(thread.carrier()) == 1);
        let parked_at = pool.carrier(mover).work();

        scheduler.select_thread(to, Some(thread.clone())).unwrap();
        assert_eq!(scheduler.wake_idle_cores(), 1);
        wait_until(TEST_TIMEOUT, || pool.carrier(mover).work() > parked_at);
        assert_eq!(scheduler.current_thread(to).unwrap().id(), thread.id());
        from = to;
    }

    for &index in &steady {
        assert!(pool.carrier(index).work() > 0);
    }
    assert!(pool.stats().max_running() <= 3);

    // Joins every carrier; a panic on any of them fails the test here
    let wakes = pool.shutdown();
    assert_eq!(wakes.len(), 3);
}

/// Test: Selecting a running thread onto a second core is fatal
///
/// The carrier keeps entering the scheduler on its own host thread while
/// the test thread selects it onto another idle core. Its next switch finds
/// it on two cores and panics, which `join` re-raises here.
#[test]
#[should_panic(expected = "more than one core")]
fn test_double_selection_races_carrier_switch() {
    let scheduler = multi_core_scheduler(2);
    let mut pool = CarrierPool::new(scheduler.clone()).yielding_every(1);
    let index = pool.spawn(0);
    let thread = pool.carrier(index).thread.clone();
    scheduler
        .select_thread(CoreId(0), Some(thread.clone()))
        .unwrap();
    scheduler.wake_idle_cores();
    wait_until(TEST_TIMEOUT, || pool.carrier(index).work() > 10);

    scheduler.select_thread(CoreId(1), Some(thread)).unwrap();
    scheduler.wake_idle_cores();

    pool.join(index);
}
