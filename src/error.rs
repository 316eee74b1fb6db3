use std::io;

use thiserror::Error;

/// Errors reported by the event loop and its platform multiplexer.
///
/// Every variant that carries an [`io::Error`] wraps the raw OS error of the
/// failed syscall. Invariant breaches (an impossible post-callback state, a
/// record vanishing mid-dispatch) are bugs, not environmental conditions, and
/// panic instead of surfacing here.
#[derive(Debug, Error)]
pub enum Error {
    /// Creating the native notification queue failed.
    #[error("failed to create the native notification queue: {0}")]
    PlatformInit(#[source] io::Error),

    /// Registering a subscription's native filters failed.
    ///
    /// The subscription record is released before this is returned; the
    /// handle that would have been produced never existed.
    #[error("failed to register subscription: {0}")]
    Subscribe(#[source] io::Error),

    /// Deregistering a subscription's native filters failed.
    ///
    /// The subscription record is released regardless.
    #[error("failed to deregister subscription: {0}")]
    Unsubscribe(#[source] io::Error),

    /// The blocking wait on the notification queue failed.
    ///
    /// Not retried internally; interrupted calls surface here too, and the
    /// caller decides whether to treat them as fatal.
    #[error("wait on the notification queue failed: {0}")]
    Wait(#[source] io::Error),

    /// Raising a software trigger failed.
    #[error("failed to raise trigger: {0}")]
    Fire(#[source] io::Error),

    /// The handle does not name a live subscription.
    ///
    /// Handles are generation-checked, so using one after its subscription
    /// was released is detected instead of touching reused memory.
    #[error("handle does not name a live subscription")]
    StaleHandle,
}

pub type Result<T> = std::result::Result<T, Error>;
