//! Event loop core: subscription lifecycle and the dispatch cycle.
//!
//! An [`EventLoop`] owns one platform multiplexer instance and a registry of
//! subscription records. It runs the wait -> dispatch -> re-arm cycle:
//! harvest a bounded batch of ready events, and for each one invoke the
//! callback, then apply the lifecycle transition (re-arm, or the deferred
//! cleanup requested by a `remove()` during the callback).
//!
//! `handle_events` may run concurrently on the same loop from any number of
//! threads. Distinct ready events go to distinct threads; a single
//! subscription is never dispatched twice at once, because its kernel
//! registration is one-shot and only re-armed after its callback returns.
//! The registry lock is never held while a callback runs.

mod registry;
mod subscription;

pub(crate) mod mux;

pub use registry::Handle;

use std::os::unix::io::RawFd;
use std::sync::{Arc, Mutex};

use crate::error::{Error, Result};
use crate::event::{Events, WAIT_NONE};
use crate::event_loop::mux::{EVENT_BATCH, Multiplexer};
use crate::event_loop::registry::Registry;
use crate::event_loop::subscription::{SubState, Subscription};

/// A multiplexing event loop over file descriptors, software triggers, and
/// one-shot timers.
///
/// The loop holds no thread of its own: callers drive it by calling
/// [`handle_events`](Self::handle_events), possibly from many threads at
/// once (see [`Pool`](crate::Pool)). Callbacks run synchronously on
/// whichever thread received the ready event and are expected not to block.
pub struct EventLoop {
    mux: Multiplexer,
    subs: Mutex<Registry<Subscription>>,
}

impl EventLoop {
    /// Creates the loop and its native notification queue.
    pub fn new() -> Result<EventLoop> {
        Ok(EventLoop {
            mux: Multiplexer::new()?,
            subs: Mutex::new(Registry::new()),
        })
    }

    /// Subscribes a file descriptor with the given interest mask.
    ///
    /// The subscription is persistent edge-triggered: each new readiness
    /// transition is delivered once, and a source left undrained by its
    /// callback is reported again on the next dispatch.
    pub fn add_fd<F>(&self, fd: RawFd, interest: Events, callback: F) -> Result<Handle>
    where
        F: Fn(&EventLoop, Handle, Events) + Send + Sync + 'static,
    {
        let mut subs = self.subs.lock().unwrap();

        let handle = subs.insert(Subscription::new(interest, Arc::new(callback)));
        let sub = subs.get_mut(handle).expect("fresh handle must resolve");

        self.mux.fd_init(sub, fd);
        self.finish_subscribe(&mut subs, handle)
    }

    /// Registers a timer that fires once, `timeout_ms` milliseconds from now
    /// on the monotonic clock, then removes itself.
    ///
    /// After the expiry has been dispatched the handle is stale.
    pub fn add_timer<F>(&self, timeout_ms: i32, callback: F) -> Result<Handle>
    where
        F: Fn(&EventLoop, Handle, Events) + Send + Sync + 'static,
    {
        let mut subs = self.subs.lock().unwrap();

        let handle = subs.insert(Subscription::new(Events::Read, Arc::new(callback)));
        let sub = subs.get_mut(handle).expect("fresh handle must resolve");

        if let Err(err) = self.mux.timer_init(sub, timeout_ms, handle.token()) {
            subs.remove(handle);
            return Err(err);
        }
        self.finish_subscribe(&mut subs, handle)
    }

    /// Registers a software trigger.
    ///
    /// [`fire`](Self::fire) raises it from any thread, including from inside
    /// a dispatched callback; fires coalesce until the next dispatch.
    pub fn add_trigger<F>(&self, callback: F) -> Result<Handle>
    where
        F: Fn(&EventLoop, Handle, Events) + Send + Sync + 'static,
    {
        let mut subs = self.subs.lock().unwrap();

        let handle = subs.insert(Subscription::new(Events::Read, Arc::new(callback)));
        let sub = subs.get_mut(handle).expect("fresh handle must resolve");

        if let Err(err) = self.mux.trigger_init(sub, handle.token()) {
            subs.remove(handle);
            return Err(err);
        }
        self.finish_subscribe(&mut subs, handle)
    }

    /// Registers a child loop's readiness signal inside this loop.
    ///
    /// Dispatching this loop then drains a bounded batch of the child's
    /// pending events, so loops compose hierarchically. The subscription
    /// keeps the child alive until it is removed.
    pub fn add_sub_loop(&self, child: Arc<EventLoop>) -> Result<Handle> {
        let child_fd = child.mux.raw_fd();

        self.add_fd(child_fd, Events::Read, move |_evl, handle, _events| {
            match child.handle_events(EVENT_BATCH, WAIT_NONE) {
                Ok(handled) => {
                    log::trace!("sub-loop {handle:?}: drained {handled} events");
                }
                Err(err) => {
                    log::error!("sub-loop {handle:?}: drain failed: {err}");
                }
            }
        })
    }

    /// Raises a software trigger.
    ///
    /// Any number of fires before the trigger is next dispatched deliver
    /// exactly one event. Firing the trigger whose callback is currently
    /// running defers the raise until that dispatch completes, so the
    /// callback never runs on two threads at once.
    pub fn fire(&self, handle: Handle) -> Result<()> {
        let mut subs = self.subs.lock().unwrap();
        let sub = subs.get_mut(handle).ok_or(Error::StaleHandle)?;

        match sub.state {
            SubState::Running => {
                sub.pending_fire = true;
                Ok(())
            }
            SubState::Subbed => self.mux.fire(sub),
            // Removal already requested; the fire has nowhere to land.
            SubState::Unsubbed => Ok(()),
        }
    }

    /// Removes a subscription.
    ///
    /// A subscription that is idle is deregistered and released before this
    /// returns. One that is mid-callback (its own, or on another thread) is
    /// only marked: the dispatcher holding it performs the deferred
    /// deregistration and release once the callback returns, which is what
    /// makes self- and cross-removal from inside callbacks safe. Removing an
    /// already-marked subscription is a no-op.
    pub fn remove(&self, handle: Handle) -> Result<()> {
        let mut subs = self.subs.lock().unwrap();
        let sub = subs.get_mut(handle).ok_or(Error::StaleHandle)?;

        match sub.state {
            SubState::Subbed => {
                let result = self.mux.unsubscribe(sub);
                subs.remove(handle);
                result
            }
            SubState::Running => {
                sub.state = SubState::Unsubbed;
                Ok(())
            }
            SubState::Unsubbed => Ok(()),
        }
    }

    /// Waits for readiness per the timeout contract (`0` returns
    /// immediately, `-1` blocks indefinitely, `N` blocks up to `N`
    /// milliseconds) and dispatches up to `budget` ready events, where `0`
    /// means unbounded.
    ///
    /// While a wait returns a full batch and the budget allows, further
    /// batches are fetched without blocking, bounding the latency of one
    /// call while staying efficient under load. Returns the number of events
    /// dispatched. A failed wait surfaces immediately and is not retried.
    pub fn handle_events(&self, budget: usize, timeout_ms: i32) -> Result<usize> {
        let budget = if budget == 0 { usize::MAX } else { budget };
        let mut handled = 0;
        let mut timeout_ms = timeout_ms;

        loop {
            let max_events = usize::min(budget - handled, EVENT_BATCH);
            let batch = self.mux.wait(max_events, timeout_ms)?;
            let batch_len = batch.len();

            for (token, events) in batch {
                self.dispatch(Handle::from_token(token), events);
            }

            handled += batch_len;
            if batch_len < max_events || handled >= budget {
                return Ok(handled);
            }

            // Keep draining full batches, but never block again.
            timeout_ms = WAIT_NONE;
        }
    }

    /// The number of live subscriptions, for diagnostics.
    pub fn subscription_count(&self) -> usize {
        self.subs.lock().unwrap().iter().count()
    }

    fn finish_subscribe(
        &self,
        subs: &mut Registry<Subscription>,
        handle: Handle,
    ) -> Result<Handle> {
        let sub = subs.get_mut(handle).expect("fresh handle must resolve");

        if let Err(err) = self.mux.subscribe(sub, handle.token()) {
            subs.remove(handle);
            return Err(err);
        }

        log::trace!("subscribed {handle:?}");
        Ok(handle)
    }

    /// Runs one subscription through the dispatch cycle.
    fn dispatch(&self, handle: Handle, events: Events) {
        let callback = {
            let mut subs = self.subs.lock().unwrap();

            let Some(sub) = subs.get_mut(handle) else {
                // Removed between the kernel harvest and now.
                return;
            };
            if sub.state != SubState::Subbed {
                // Never double-dispatch; the holder re-arms when done.
                return;
            }

            sub.state = SubState::Running;
            self.mux.acknowledge(sub);
            sub.callback.clone()
        };

        log::trace!("dispatching {handle:?}: {events:?}");
        callback(self, handle, events);

        let mut subs = self.subs.lock().unwrap();
        let sub = subs
            .get_mut(handle)
            .expect("subscription vanished mid-dispatch");

        if sub.single_use {
            sub.state = SubState::Unsubbed;
        }

        match sub.state {
            SubState::Running => {
                sub.state = SubState::Subbed;
                if let Err(err) = self.mux.rearm(sub, handle.token()) {
                    log::error!("re-arm of {handle:?} failed: {err}");
                }

                if sub.pending_fire {
                    sub.pending_fire = false;
                    if let Err(err) = self.mux.fire(sub) {
                        log::error!("deferred fire of {handle:?} failed: {err}");
                    }
                }
            }
            SubState::Unsubbed => {
                if let Err(err) = self.mux.unsubscribe(sub) {
                    log::error!("deferred deregistration of {handle:?} failed: {err}");
                }
                subs.remove(handle);
            }
            SubState::Subbed => {
                unreachable!("subscription re-armed during its own callback")
            }
        }
    }
}
