//! Platform-specific readiness multiplexer.
//!
//! This module provides a unified interface over the native kernel
//! notification primitive: `epoll` on Linux, `kqueue` on macOS and the BSDs.
//!
//! Both backends expose the same narrow contract to the event loop:
//! - per-kind initialization (fd, timer, trigger) filling a backend payload,
//! - atomic subscribe/unsubscribe of all of a subscription's native filters,
//! - one-shot re-arm after each dispatch,
//! - raising a software trigger from any thread,
//! - a bounded wait translating native events to the universal bitmask.
//!
//! Every registration is made edge-triggered and one-shot at the kernel
//! level; the dispatcher re-arms after the callback returns. From the event
//! loop's point of view this makes plain fd subscriptions persistent
//! edge-triggered while guaranteeing a subscription is handed to at most one
//! waiting thread per readiness transition.
//!
//! The concrete implementation is selected at compile time depending on the
//! target operating system.

#[cfg(target_os = "linux")]
mod epoll;

#[cfg(any(
    target_os = "macos",
    target_os = "freebsd",
    target_os = "netbsd",
    target_os = "openbsd"
))]
mod kqueue;

#[cfg(target_os = "linux")]
pub(crate) use epoll::{Multiplexer, Payload};

#[cfg(any(
    target_os = "macos",
    target_os = "freebsd",
    target_os = "netbsd",
    target_os = "openbsd"
))]
pub(crate) use kqueue::{Multiplexer, Payload};

/// Largest number of events harvested by a single native wait call.
pub(crate) const EVENT_BATCH: usize = 100;

/// Converts the shared timeout encoding to a native timespec.
///
/// Only meaningful for non-negative timeouts; indefinite waits never build a
/// timespec.
pub(crate) fn timeout_to_timespec(timeout_ms: i32) -> libc::timespec {
    const MILLIS_PER_SECOND: i32 = 1_000;
    const NANOS_PER_MILLI: i32 = 1_000_000;

    libc::timespec {
        tv_sec: (timeout_ms / MILLIS_PER_SECOND) as libc::time_t,
        tv_nsec: ((timeout_ms % MILLIS_PER_SECOND) * NANOS_PER_MILLI) as _,
    }
}
