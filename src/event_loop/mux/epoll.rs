//! Linux `epoll`-based multiplexer implementation.
//!
//! Responsibilities:
//! - Register file descriptors with read/write interests
//! - Back timers with one-shot `timerfd` expiries on the monotonic clock
//! - Back software triggers with an `eventfd` counter
//! - Block waiting for readiness and translate it to the universal bitmask
//!
//! All registrations carry `EPOLLET | EPOLLONESHOT`; the event loop re-arms
//! with `EPOLL_CTL_MOD` after each dispatch, which re-reports sources that
//! are still ready. Multiple eventfd writes before a dispatch accumulate in
//! the counter and drain to a single delivery.
//!
//! This backend is selected automatically on Linux targets.

use libc::{
    CLOCK_MONOTONIC, EFD_CLOEXEC, EFD_NONBLOCK, EPOLL_CLOEXEC, EPOLL_CTL_ADD, EPOLL_CTL_DEL,
    EPOLL_CTL_MOD, EPOLLERR, EPOLLET, EPOLLHUP, EPOLLIN, EPOLLONESHOT, EPOLLOUT, EPOLLRDHUP,
    TFD_CLOEXEC, TFD_NONBLOCK, epoll_create1, epoll_ctl, epoll_event, epoll_wait, eventfd,
    itimerspec, timerfd_create, timerfd_settime,
};
use std::io;
use std::os::unix::io::RawFd;

use crate::error::{Error, Result};
use crate::event::Events;
use crate::event_loop::mux::timeout_to_timespec;
use crate::event_loop::subscription::Subscription;

/// Backend-specific registration data carried by every subscription.
///
/// `fd` is whatever descriptor is registered with epoll: the caller's fd for
/// plain subscriptions, an owned timerfd/eventfd for timers and triggers.
pub(crate) struct Payload {
    pub(crate) fd: RawFd,

    /// The descriptor was created by the backend and is closed on release.
    owned: bool,

    /// Consume the 8-byte counter before the callback runs, so the re-arm
    /// after dispatch does not re-report stale edge state.
    drain: bool,
}

impl Default for Payload {
    fn default() -> Self {
        Payload {
            fd: -1,
            owned: false,
            drain: false,
        }
    }
}

impl Drop for Payload {
    fn drop(&mut self) {
        if self.owned && self.fd >= 0 {
            unsafe { libc::close(self.fd) };
        }
    }
}

/// Linux `epoll` multiplexer. Shared by every dispatching thread; the kernel
/// makes concurrent `epoll_wait` and `epoll_ctl` calls on one instance safe.
pub(crate) struct Multiplexer {
    epfd: RawFd,
}

impl Multiplexer {
    pub(crate) fn new() -> Result<Multiplexer> {
        let epfd = unsafe { epoll_create1(EPOLL_CLOEXEC) };
        if epfd < 0 {
            return Err(Error::PlatformInit(io::Error::last_os_error()));
        }

        Ok(Multiplexer { epfd })
    }

    /// The queue's own descriptor, pollable for readability by a parent loop.
    pub(crate) fn raw_fd(&self) -> RawFd {
        self.epfd
    }

    /// Prepares a plain file-descriptor subscription.
    pub(crate) fn fd_init(&self, sub: &mut Subscription, fd: RawFd) {
        debug_assert!(!sub.interest.is_none(), "fd subscription without interest");

        sub.payload = Payload {
            fd,
            owned: false,
            drain: false,
        };
    }

    /// Creates the backing one-shot expiry source for a timer subscription.
    pub(crate) fn timer_init(
        &self,
        sub: &mut Subscription,
        timeout_ms: i32,
        _token: u64,
    ) -> Result<()> {
        let timerfd = unsafe { timerfd_create(CLOCK_MONOTONIC, TFD_CLOEXEC | TFD_NONBLOCK) };
        if timerfd < 0 {
            return Err(Error::Subscribe(io::Error::last_os_error()));
        }

        // An all-zero it_value disarms the timer instead of expiring it, so
        // a zero timeout is clamped to the smallest armable value.
        let mut value = timeout_to_timespec(timeout_ms.max(0));
        if value.tv_sec == 0 && value.tv_nsec == 0 {
            value.tv_nsec = 1;
        }

        let spec = itimerspec {
            it_interval: timeout_to_timespec(0),
            it_value: value,
        };

        let rc = unsafe { timerfd_settime(timerfd, 0, &spec, std::ptr::null_mut()) };
        if rc != 0 {
            let err = io::Error::last_os_error();
            unsafe { libc::close(timerfd) };
            return Err(Error::Subscribe(err));
        }

        sub.interest = Events::Read;
        sub.single_use = true;
        sub.payload = Payload {
            fd: timerfd,
            owned: true,
            drain: true,
        };

        Ok(())
    }

    /// Creates the backing software-signal source for a trigger subscription.
    pub(crate) fn trigger_init(&self, sub: &mut Subscription, _token: u64) -> Result<()> {
        let fd = unsafe { eventfd(0, EFD_NONBLOCK | EFD_CLOEXEC) };
        if fd < 0 {
            return Err(Error::Subscribe(io::Error::last_os_error()));
        }

        sub.interest = Events::Read;
        sub.payload = Payload {
            fd,
            owned: true,
            drain: true,
        };

        Ok(())
    }

    /// Registers the subscription's descriptor, keyed by the handle token.
    pub(crate) fn subscribe(&self, sub: &Subscription, token: u64) -> Result<()> {
        self.change(sub, token, EPOLL_CTL_ADD)
            .map_err(Error::Subscribe)
    }

    /// Deregisters the subscription's descriptor.
    pub(crate) fn unsubscribe(&self, sub: &Subscription) -> Result<()> {
        let rc = unsafe {
            epoll_ctl(
                self.epfd,
                EPOLL_CTL_DEL,
                sub.payload.fd,
                std::ptr::null_mut(),
            )
        };
        if rc != 0 {
            return Err(Error::Unsubscribe(io::Error::last_os_error()));
        }

        Ok(())
    }

    /// Re-enables a one-shot registration after its callback returned.
    ///
    /// `EPOLL_CTL_MOD` re-evaluates current readiness, so a source that is
    /// still ready (an undrained pipe, a pending sub-loop) reports again on
    /// the next wait.
    pub(crate) fn rearm(&self, sub: &Subscription, token: u64) -> io::Result<()> {
        self.change(sub, token, EPOLL_CTL_MOD)
    }

    /// Raises the software signal behind a trigger subscription.
    pub(crate) fn fire(&self, sub: &Subscription) -> Result<()> {
        let value: u64 = 1;
        let n = unsafe {
            libc::write(
                sub.payload.fd,
                &value as *const u64 as *const _,
                size_of::<u64>(),
            )
        };
        if n < 0 {
            return Err(Error::Fire(io::Error::last_os_error()));
        }

        Ok(())
    }

    /// Consumes edge state before the callback is invoked.
    pub(crate) fn acknowledge(&self, sub: &Subscription) {
        if sub.payload.drain {
            let mut value: u64 = 0;
            unsafe {
                libc::read(
                    sub.payload.fd,
                    &mut value as *mut u64 as *mut _,
                    size_of::<u64>(),
                )
            };
        }
    }

    /// Waits for readiness per the timeout contract and returns ready
    /// `(token, events)` pairs.
    pub(crate) fn wait(&self, max_events: usize, timeout_ms: i32) -> Result<Vec<(u64, Events)>> {
        let mut native: Vec<epoll_event> = Vec::with_capacity(max_events);

        let n = unsafe {
            epoll_wait(
                self.epfd,
                native.as_mut_ptr(),
                max_events as i32,
                timeout_ms,
            )
        };
        if n < 0 {
            return Err(Error::Wait(io::Error::last_os_error()));
        }

        unsafe {
            native.set_len(n as usize);
        }

        Ok(native
            .iter()
            .map(|ev| (ev.u64, events_from_epoll(ev.events)))
            .collect())
    }

    fn change(&self, sub: &Subscription, token: u64, op: libc::c_int) -> io::Result<()> {
        let mut event = epoll_event {
            events: events_to_epoll(sub.interest),
            u64: token,
        };

        let rc = unsafe { epoll_ctl(self.epfd, op, sub.payload.fd, &mut event) };
        if rc != 0 {
            return Err(io::Error::last_os_error());
        }

        Ok(())
    }
}

impl Drop for Multiplexer {
    fn drop(&mut self) {
        unsafe { libc::close(self.epfd) };
    }
}

fn events_to_epoll(interest: Events) -> u32 {
    let mut flags = (EPOLLET | EPOLLONESHOT) as u32;

    if interest.contains(Events::Read) {
        flags |= EPOLLIN as u32;
    }
    if interest.contains(Events::Write) {
        flags |= EPOLLOUT as u32;
    }

    flags
}

fn events_from_epoll(native: u32) -> Events {
    let mut events = Events::none();

    if native & EPOLLIN as u32 != 0 {
        events |= Events::Read;
    }
    if native & EPOLLOUT as u32 != 0 {
        events |= Events::Write;
    }
    if native & (EPOLLRDHUP as u32 | EPOLLHUP as u32) != 0 {
        events |= Events::Close;
    }
    if native & EPOLLERR as u32 != 0 {
        events |= Events::Error;
    }

    events
}
