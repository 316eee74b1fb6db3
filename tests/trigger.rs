use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use vigil::{Error, EventLoop, Pipe, WAIT_NONE};

const EVENT_BUDGET: usize = 100;

fn init_logs() {
    let _ = env_logger::builder().is_test(true).try_init();
}

#[test]
fn trigger_fires() {
    init_logs();

    let evl = EventLoop::new().unwrap();
    let count = Arc::new(AtomicUsize::new(0));

    let trigger = {
        let count = count.clone();
        evl.add_trigger(move |_evl, _handle, _events| {
            count.fetch_add(1, Ordering::SeqCst);
        })
    }
    .unwrap();

    // Nothing fires on its own.
    assert_eq!(evl.handle_events(EVENT_BUDGET, WAIT_NONE).unwrap(), 0);
    assert_eq!(count.load(Ordering::SeqCst), 0);

    evl.fire(trigger).unwrap();
    assert_eq!(evl.handle_events(EVENT_BUDGET, WAIT_NONE).unwrap(), 1);
    assert_eq!(count.load(Ordering::SeqCst), 1);

    // A consumed trigger is reusable.
    evl.fire(trigger).unwrap();
    assert_eq!(evl.handle_events(EVENT_BUDGET, WAIT_NONE).unwrap(), 1);
    assert_eq!(count.load(Ordering::SeqCst), 2);

    evl.remove(trigger).unwrap();
}

#[test]
fn fires_coalesce() {
    init_logs();

    let evl = EventLoop::new().unwrap();
    let count = Arc::new(AtomicUsize::new(0));

    let trigger = {
        let count = count.clone();
        evl.add_trigger(move |_evl, _handle, _events| {
            count.fetch_add(1, Ordering::SeqCst);
        })
    }
    .unwrap();

    // Five fires before consumption deliver exactly one event.
    for _ in 0..5 {
        evl.fire(trigger).unwrap();
    }

    assert_eq!(evl.handle_events(EVENT_BUDGET, WAIT_NONE).unwrap(), 1);
    assert_eq!(count.load(Ordering::SeqCst), 1);

    assert_eq!(evl.handle_events(EVENT_BUDGET, WAIT_NONE).unwrap(), 0);
    assert_eq!(count.load(Ordering::SeqCst), 1);

    evl.remove(trigger).unwrap();
}

#[test]
fn recursive_fire() {
    init_logs();

    let evl = EventLoop::new().unwrap();
    let count = Arc::new(AtomicUsize::new(0));
    const TARGET: usize = 4;

    // The callback re-fires its own subscription; the raise is deferred
    // until the dispatch completes, then delivered on a later call.
    let trigger = {
        let count = count.clone();
        evl.add_trigger(move |evl, handle, _events| {
            if count.fetch_add(1, Ordering::SeqCst) + 1 < TARGET {
                evl.fire(handle).unwrap();
            }
        })
    }
    .unwrap();

    evl.fire(trigger).unwrap();

    for _ in 0..TARGET {
        assert_eq!(evl.handle_events(EVENT_BUDGET, WAIT_NONE).unwrap(), 1);
    }

    assert_eq!(count.load(Ordering::SeqCst), TARGET);
    assert_eq!(evl.handle_events(EVENT_BUDGET, WAIT_NONE).unwrap(), 0);

    evl.remove(trigger).unwrap();
}

#[test]
fn remove_from_own_callback() {
    init_logs();

    let evl = EventLoop::new().unwrap();
    let count = Arc::new(AtomicUsize::new(0));

    let trigger = {
        let count = count.clone();
        evl.add_trigger(move |evl, handle, _events| {
            count.fetch_add(1, Ordering::SeqCst);
            evl.remove(handle).unwrap();
        })
    }
    .unwrap();

    evl.fire(trigger).unwrap();
    assert_eq!(evl.handle_events(EVENT_BUDGET, WAIT_NONE).unwrap(), 1);
    assert_eq!(count.load(Ordering::SeqCst), 1);

    // The deferred cleanup ran; the handle no longer resolves.
    assert!(matches!(evl.fire(trigger), Err(Error::StaleHandle)));
    assert_eq!(evl.handle_events(EVENT_BUDGET, WAIT_NONE).unwrap(), 0);
    assert_eq!(count.load(Ordering::SeqCst), 1);
}

#[test]
fn no_delivery_after_remove() {
    init_logs();

    let evl = EventLoop::new().unwrap();
    let count = Arc::new(AtomicUsize::new(0));

    let trigger = {
        let count = count.clone();
        evl.add_trigger(move |_evl, _handle, _events| {
            count.fetch_add(1, Ordering::SeqCst);
        })
    }
    .unwrap();

    // Fired but removed before consumption: nothing may be delivered.
    evl.fire(trigger).unwrap();
    evl.remove(trigger).unwrap();

    assert_eq!(evl.handle_events(EVENT_BUDGET, WAIT_NONE).unwrap(), 0);
    assert_eq!(count.load(Ordering::SeqCst), 0);
}

#[test]
fn fire_from_peer_callback() {
    init_logs();

    let evl = EventLoop::new().unwrap();
    let pipe = Arc::new(Pipe::open().unwrap());
    let count = Arc::new(AtomicUsize::new(0));

    let trigger = {
        let count = count.clone();
        evl.add_trigger(move |_evl, _handle, _events| {
            count.fetch_add(1, Ordering::SeqCst);
        })
    }
    .unwrap();

    let sub = {
        let pipe = pipe.clone();
        evl.add_fd(pipe.read_fd(), vigil::Events::Read, move |evl, _handle, _events| {
            let mut buf = [0u8; 8];
            pipe.read(&mut buf).unwrap();
            evl.fire(trigger).unwrap();
        })
    }
    .unwrap();

    pipe.write(&1u64.to_ne_bytes()).unwrap();

    // First call dispatches the pipe, whose callback raises the trigger.
    assert!(evl.handle_events(EVENT_BUDGET, WAIT_NONE).unwrap() >= 1);

    if count.load(Ordering::SeqCst) == 0 {
        assert_eq!(evl.handle_events(EVENT_BUDGET, WAIT_NONE).unwrap(), 1);
    }
    assert_eq!(count.load(Ordering::SeqCst), 1);

    evl.remove(sub).unwrap();
    evl.remove(trigger).unwrap();
}
