//! Worker pool: a fixed set of OS threads dispatching one shared loop.
//!
//! The pool owns its event loop. `start()` spawns the configured number of
//! threads and blocks until each has signaled that it is running; `stop()`
//! raises a loop-local shutdown trigger whose callback re-fires itself, so
//! one wake cascades through every parked worker, then joins them all. A
//! stopped pool can be started again.

mod builder;
mod worker;

pub use builder::PoolBuilder;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, mpsc};
use std::thread::{self, JoinHandle};

use crate::error::Result;
use crate::event_loop::{EventLoop, Handle};
use crate::pool::worker::Worker;

/// A restartable pool of worker threads sharing one [`EventLoop`].
///
/// Subscriptions added to [`event_loop`](Self::event_loop) are dispatched on
/// whichever worker receives their readiness. Shutdown is cooperative: a
/// callback that never returns blocks `stop()` indefinitely.
pub struct Pool {
    worker_threads: usize,
    evl: Arc<EventLoop>,
    threads: Vec<JoinHandle<()>>,
    shutdown: Arc<AtomicBool>,
    stop_trigger: Option<Handle>,
}

impl Pool {
    pub(crate) fn new(worker_threads: usize) -> Result<Pool> {
        Ok(Pool {
            worker_threads,
            evl: Arc::new(EventLoop::new()?),
            threads: Vec::new(),
            shutdown: Arc::new(AtomicBool::new(false)),
            stop_trigger: None,
        })
    }

    /// The shared loop things may be subscribed to.
    pub fn event_loop(&self) -> &Arc<EventLoop> {
        &self.evl
    }

    /// Spawns the worker threads.
    ///
    /// Blocks until every thread has signaled that it has begun dispatching,
    /// so subscriptions made after `start()` returns are guaranteed a
    /// running worker.
    ///
    /// # Panics
    ///
    /// Panics if the pool is already started.
    pub fn start(&mut self) -> Result<()> {
        assert!(self.threads.is_empty(), "pool already started");

        let shutdown = Arc::new(AtomicBool::new(false));
        self.shutdown = shutdown.clone();

        // Each wake-up checks the flag and passes the signal on, so a single
        // fire in stop() reaches every parked worker in turn.
        let flag = shutdown.clone();
        let trigger = self.evl.add_trigger(move |evl, handle, _events| {
            if flag.load(Ordering::Acquire) {
                let _ = evl.fire(handle);
            }
        })?;
        self.stop_trigger = Some(trigger);

        let (started_tx, started_rx) = mpsc::channel();

        for id in 0..self.worker_threads {
            let worker = Worker::new(id, self.evl.clone(), shutdown.clone());
            let started = started_tx.clone();

            self.threads.push(thread::spawn(move || {
                let _ = started.send(());
                worker.run();
            }));
        }

        for _ in 0..self.worker_threads {
            started_rx
                .recv()
                .expect("worker exited before signaling start");
        }

        log::debug!("pool started with {} workers", self.worker_threads);
        Ok(())
    }

    /// Signals every worker to shut down and joins them.
    ///
    /// Each worker observes the stop condition at its next dispatch-loop
    /// iteration; there is no preemption. Idempotent, and the pool may be
    /// started again afterwards.
    pub fn stop(&mut self) -> Result<()> {
        self.shutdown.store(true, Ordering::Release);

        if let Some(trigger) = self.stop_trigger {
            if !self.threads.is_empty() {
                self.evl.fire(trigger)?;
            }
        }

        for handle in self.threads.drain(..) {
            let _ = handle.join();
        }

        if let Some(trigger) = self.stop_trigger.take() {
            self.evl.remove(trigger)?;
        }

        log::debug!("pool stopped");
        Ok(())
    }
}

impl Drop for Pool {
    /// Stops the pool, joining any workers still running.
    fn drop(&mut self) {
        let _ = self.stop();
    }
}
