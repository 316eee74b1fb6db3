use std::sync::Arc;

use crate::event::Events;
use crate::event_loop::EventLoop;
use crate::event_loop::mux::Payload;
use crate::event_loop::registry::Handle;

/// Callback invoked when a subscription's source becomes ready.
///
/// The dispatching loop passes itself as the first argument so the callback
/// can fire triggers or remove subscriptions without holding its own
/// reference back to the loop.
pub(crate) type Callback = Arc<dyn Fn(&EventLoop, Handle, Events) + Send + Sync + 'static>;

/// Lifecycle state of a subscription.
///
/// Transitions only move `Subbed -> Running -> {Subbed, Unsubbed}`, always
/// advanced by the one thread currently dispatching the subscription (or by
/// `remove()` for an idle one). `Unsubbed` is terminal: the dispatcher that
/// observes it performs the deferred native deregistration and releases the
/// slot.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum SubState {
    /// Registered and idle.
    Subbed,
    /// Its callback is executing right now.
    Running,
    /// Logically removed; cleanup pending.
    Unsubbed,
}

/// One registered interest: a file descriptor, timer, trigger, or sub-loop.
pub(crate) struct Subscription {
    /// Interest mask used to derive the native filter set.
    pub(crate) interest: Events,

    /// Deliver exactly once, then self-remove (timers).
    pub(crate) single_use: bool,

    pub(crate) state: SubState,

    /// A trigger fire arrived while the callback was running; re-raise the
    /// native signal after the re-arm instead of delivering concurrently.
    pub(crate) pending_fire: bool,

    pub(crate) callback: Callback,

    /// Backend-specific registration data.
    pub(crate) payload: Payload,
}

impl Subscription {
    pub(crate) fn new(interest: Events, callback: Callback) -> Subscription {
        Subscription {
            interest,
            single_use: false,
            state: SubState::Subbed,
            pending_fire: false,
            callback,
            payload: Payload::default(),
        }
    }
}
