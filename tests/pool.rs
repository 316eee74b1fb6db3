use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::time::Duration;

use vigil::{Events, Pipe, PoolBuilder};

const TEST_VALUE: u64 = 0x0BAD_FACE;

fn init_logs() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Blocks the test thread until a worker-side callback reports progress.
struct Gate {
    count: Mutex<usize>,
    cond: Condvar,
}

impl Gate {
    fn new() -> Arc<Gate> {
        Arc::new(Gate {
            count: Mutex::new(0),
            cond: Condvar::new(),
        })
    }

    fn signal(&self) {
        let mut count = self.count.lock().unwrap();
        *count += 1;
        self.cond.notify_all();
    }

    fn wait_for(&self, target: usize) -> usize {
        let count = self.count.lock().unwrap();
        let (count, timeout) = self
            .cond
            .wait_timeout_while(count, Duration::from_secs(10), |c| *c < target)
            .unwrap();
        assert!(!timeout.timed_out(), "worker never dispatched");
        *count
    }
}

#[test]
fn start_stop() {
    init_logs();

    let mut pool = PoolBuilder::new().worker_threads(2).build().unwrap();
    pool.start().unwrap();
    pool.stop().unwrap();
}

#[test]
fn stop_without_start() {
    init_logs();

    let mut pool = PoolBuilder::new().worker_threads(2).build().unwrap();
    pool.stop().unwrap();
}

#[test]
fn restarts_after_stop() {
    init_logs();

    let mut pool = PoolBuilder::new().worker_threads(2).build().unwrap();
    let gate = Gate::new();
    let pipe = Arc::new(Pipe::open().unwrap());

    {
        let gate = gate.clone();
        let pipe = pipe.clone();
        pool.event_loop()
            .add_fd(pipe.read_fd(), Events::Read, move |_evl, _handle, _events| {
                let mut buf = [0u8; 8];
                pipe.read(&mut buf).unwrap();
                gate.signal();
            })
            .unwrap();
    }

    pool.start().unwrap();
    pipe.write(&TEST_VALUE.to_ne_bytes()).unwrap();
    gate.wait_for(1);
    pool.stop().unwrap();

    // The same pool comes back up and keeps dispatching the surviving
    // subscription.
    pool.start().unwrap();
    pipe.write(&TEST_VALUE.to_ne_bytes()).unwrap();
    gate.wait_for(2);
    pool.stop().unwrap();
}

#[test]
fn pipe_readable_on_worker() {
    init_logs();

    let mut pool = PoolBuilder::new().worker_threads(2).build().unwrap();
    let gate = Gate::new();
    let pipe = Arc::new(Pipe::open().unwrap());
    let main_thread = std::thread::current().id();

    {
        let gate = gate.clone();
        let pipe = pipe.clone();
        pool.event_loop()
            .add_fd(pipe.read_fd(), Events::Read, move |_evl, _handle, events| {
                assert!(events.contains(Events::Read));
                assert_ne!(std::thread::current().id(), main_thread);

                let mut buf = [0u8; 8];
                assert_eq!(pipe.read(&mut buf).unwrap(), 8);
                assert_eq!(u64::from_ne_bytes(buf), TEST_VALUE);

                gate.signal();
            })
            .unwrap();
    }

    pool.start().unwrap();
    pipe.write(&TEST_VALUE.to_ne_bytes()).unwrap();
    gate.wait_for(1);
    pool.stop().unwrap();
}

#[test]
fn fires_while_stopped_coalesce() {
    init_logs();

    let mut pool = PoolBuilder::new().worker_threads(2).build().unwrap();
    let gate = Gate::new();

    let trigger = {
        let gate = gate.clone();
        pool.event_loop()
            .add_trigger(move |_evl, _handle, _events| {
                gate.signal();
            })
            .unwrap()
    };

    // Raised twice with no worker running: the raises coalesce, and the
    // callback runs exactly once after start.
    pool.event_loop().fire(trigger).unwrap();
    pool.event_loop().fire(trigger).unwrap();

    pool.start().unwrap();
    gate.wait_for(1);

    std::thread::sleep(Duration::from_millis(100));
    assert_eq!(*gate.count.lock().unwrap(), 1);

    pool.stop().unwrap();
}

#[test]
fn timer_fires_on_worker() {
    init_logs();

    let mut pool = PoolBuilder::new().worker_threads(2).build().unwrap();
    let gate = Gate::new();
    let count = Arc::new(AtomicUsize::new(0));

    {
        let gate = gate.clone();
        let count = count.clone();
        pool.event_loop()
            .add_timer(50, move |_evl, _handle, _events| {
                count.fetch_add(1, Ordering::SeqCst);
                gate.signal();
            })
            .unwrap();
    }

    pool.start().unwrap();
    gate.wait_for(1);
    pool.stop().unwrap();

    assert_eq!(count.load(Ordering::SeqCst), 1);
    assert_eq!(pool.event_loop().subscription_count(), 0);
}

#[test]
fn workers_share_the_load() {
    init_logs();

    let mut pool = PoolBuilder::new().worker_threads(4).build().unwrap();
    let gate = Gate::new();

    let mut pipes = Vec::new();
    for _ in 0..8 {
        let pipe = Arc::new(Pipe::open().unwrap());
        {
            let gate = gate.clone();
            let pipe = pipe.clone();
            pool.event_loop()
                .add_fd(pipe.read_fd(), Events::Read, move |_evl, _handle, _events| {
                    let mut buf = [0u8; 8];
                    pipe.read(&mut buf).unwrap();
                    gate.signal();
                })
                .unwrap();
        }
        pipes.push(pipe);
    }

    pool.start().unwrap();
    for pipe in &pipes {
        pipe.write(&TEST_VALUE.to_ne_bytes()).unwrap();
    }

    assert_eq!(gate.wait_for(8), 8);
    pool.stop().unwrap();
}
