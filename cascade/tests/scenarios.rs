//! End-to-end scenarios exercising the propagation driver, the slot
//! rewire mechanism, and cross-graph link synchronization.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use cascade::{hold, iterate, EventLink, EventSource, Group, Observer, StateSlot, StateVar, SyncPoint, TransactionFlags};

#[test]
fn diamond_sum_fires_observer_once_per_transaction() {
    let group = Group::new();
    let a = StateVar::new(&group, 1i32);
    let b = StateVar::new(&group, 2i32);
    let c = a.as_state().state_with(&b.as_state(), |x, y| x + y);
    let d = a.as_state().state_with(&b.as_state(), |x, y| x * y);
    let e = c.state_with(&d, |x, y| x + y);

    let seen = Arc::new(Mutex::new(Vec::new()));
    let seen_clone = Arc::clone(&seen);
    let _obs = Observer::on_state(&e, move |value| seen_clone.lock().unwrap().push(*value));

    group.do_transaction(|_g| {
        a.set(3);
        b.set(4);
    });

    assert_eq!(*seen.lock().unwrap(), vec![19]);
    assert_eq!(e.get(), 19);
}

#[test]
fn hold_tracks_latest_event_and_suppresses_equal_repeats() {
    let group = Group::new();
    let src = EventSource::new(&group);
    let held = hold(&group, &src.as_event(), 0i32, |e| *e);

    let seen = Arc::new(Mutex::new(Vec::new()));
    let seen_clone = Arc::clone(&seen);
    let _obs = Observer::on_state(&held, move |value| seen_clone.lock().unwrap().push(*value));

    assert_eq!(held.get(), 0);

    src.emit(10);
    assert_eq!(held.get(), 10);
    assert_eq!(*seen.lock().unwrap(), vec![10]);

    src.emit(10);
    assert_eq!(*seen.lock().unwrap(), vec![10]);
}

#[test]
fn iterate_counts_events_within_one_transaction() {
    let group = Group::new();
    let trig = EventSource::new(&group);
    let count = iterate(&group, &trig.as_event(), 0u32, |_e: &(), n| n + 1);

    let seen = Arc::new(Mutex::new(Vec::new()));
    let seen_clone = Arc::clone(&seen);
    let _obs = Observer::on_state(&count, move |value| seen_clone.lock().unwrap().push(*value));

    group.do_transaction(|_g| {
        for _ in 0..100 {
            trig.emit(());
        }
    });

    assert_eq!(count.get(), 100);
    assert_eq!(*seen.lock().unwrap(), vec![100]);
}

#[test]
fn slot_rewire_stops_observing_former_source() {
    let group = Group::new();
    let a = StateVar::new(&group, 1i32);
    let b = StateVar::new(&group, 2i32);
    let slot = StateSlot::new(&group, &a.as_state());

    let log = Arc::new(Mutex::new(Vec::new()));
    let log_clone = Arc::clone(&log);
    let _obs = Observer::on_state(&slot.as_state(), move |value| log_clone.lock().unwrap().push(*value));

    slot.set(&b.as_state());
    b.set(5);
    a.set(99);

    assert_eq!(*log.lock().unwrap(), vec![2, 5]);
}

#[test]
fn link_sync_waits_for_downstream_propagation() {
    let g1 = Group::new();
    let g2 = Group::new();

    let evt1 = EventSource::<i32>::new(&g1);
    let forwarded = EventLink::new(&g2, &evt1.as_event());
    let evt2 = forwarded.as_event().filter(|_| true);

    let log = Arc::new(Mutex::new(Vec::new()));
    let log_clone = Arc::clone(&log);
    let _obs = Observer::on_event(&evt2, move |value| log_clone.lock().unwrap().push(*value));

    let sp = SyncPoint::new();
    let dependency = sp.new_dependency();
    g1.enqueue_transaction(
        Box::new(move |_g| {
            evt1.emit(1);
            evt1.emit(2);
        }),
        Some(dependency),
        TransactionFlags::SYNC_LINKED,
    );

    assert!(sp.wait_for(Duration::from_secs(3)));
    assert_eq!(*log.lock().unwrap(), vec![1, 2]);
}

// The merge-allowed transactions are enqueued while the blocking one is
// still sleeping, so the worker pops and merges all three into a single
// `do_transaction` scope; the observer sees them as one contiguous,
// submission-ordered run rather than interleaved with anything else.
#[test]
fn merging_throughput_collapses_mergeable_batch_into_one_cycle() {
    let group = Group::new();
    let src = EventSource::<i32>::new(&group);

    let log = Arc::new(Mutex::new(Vec::new()));
    let log_clone = Arc::clone(&log);
    let _obs = Observer::on_event(&src.as_event(), move |value| log_clone.lock().unwrap().push(*value));

    let blocker = src.clone();
    group.enqueue_transaction(
        Box::new(move |_g| {
            std::thread::sleep(Duration::from_millis(200));
            blocker.emit(0);
        }),
        None,
        TransactionFlags::NONE,
    );

    for value in [1, 2, 3] {
        let src = src.clone();
        group.enqueue_transaction(
            Box::new(move |_g| src.emit(value)),
            None,
            TransactionFlags::ALLOW_MERGING,
        );
    }

    std::thread::sleep(Duration::from_millis(500));
    let seen = log.lock().unwrap();
    assert_eq!(&seen[1..], &[1, 2, 3]);
}
