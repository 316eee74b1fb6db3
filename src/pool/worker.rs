use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::event::WAIT_INDEFINITE;
use crate::event_loop::EventLoop;
use crate::event_loop::mux::EVENT_BATCH;

/// A worker thread in the pool.
///
/// Every worker loops on the shared loop's dispatch operation with an
/// indefinite timeout. The native wait call is safe for concurrent
/// invocation, and distinct ready events land on distinct workers; shutdown
/// is cooperative, observed between dispatch calls.
pub(crate) struct Worker {
    id: usize,
    evl: Arc<EventLoop>,
    shutdown: Arc<AtomicBool>,
}

impl Worker {
    pub(crate) fn new(id: usize, evl: Arc<EventLoop>, shutdown: Arc<AtomicBool>) -> Self {
        Self { id, evl, shutdown }
    }

    /// Runs the dispatch loop until the stop flag is observed.
    ///
    /// A failed wait is not retried: the error is logged and the worker
    /// exits its loop.
    pub(crate) fn run(&self) {
        log::debug!("worker {} running", self.id);

        loop {
            if self.shutdown.load(Ordering::Acquire) {
                break;
            }

            match self.evl.handle_events(EVENT_BATCH, WAIT_INDEFINITE) {
                Ok(handled) => {
                    if handled > 0 {
                        log::trace!("worker {} handled {} events", self.id, handled);
                    }
                }
                Err(err) => {
                    log::error!("worker {}: dispatch failed: {err}", self.id);
                    break;
                }
            }
        }

        log::debug!("worker {} stopped", self.id);
    }
}
