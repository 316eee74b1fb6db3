//! macOS/BSD `kqueue`-based multiplexer implementation.
//!
//! Functionally equivalent to the Linux `epoll` backend and exposes the same
//! interface to the event loop.
//!
//! Responsibilities:
//! - Register file descriptors with `EVFILT_READ`/`EVFILT_WRITE` filters
//! - Back timers with one-shot `EVFILT_TIMER` knotes
//! - Back software triggers with `EVFILT_USER` and `NOTE_TRIGGER`
//! - Block waiting for readiness and translate it to the universal bitmask
//!
//! Registrations carry `EV_CLEAR | EV_DISPATCH`, so delivery consumes the
//! edge state and disables the filter until the event loop re-enables it
//! after the callback. `NOTE_TRIGGER` activations coalesce in the kernel.
//!
//! This backend is selected automatically on macOS and the BSDs.

use libc::{
    EV_ADD, EV_CLEAR, EV_DELETE, EV_DISPATCH, EV_ENABLE, EV_EOF, EV_ERROR, EV_ONESHOT,
    EVFILT_READ, EVFILT_TIMER, EVFILT_USER, EVFILT_WRITE, NOTE_TRIGGER, kevent, kqueue,
};
use std::io;
use std::os::unix::io::RawFd;

use crate::error::{Error, Result};
use crate::event::Events;
use crate::event_loop::mux::timeout_to_timespec;
use crate::event_loop::subscription::Subscription;

/// Backend-specific registration data carried by every subscription.
///
/// `ident` is the kqueue identity: the watched fd for plain subscriptions,
/// the handle token for timers and triggers (unique among live knotes).
/// Unused filter slots hold zero.
#[derive(Default)]
pub(crate) struct Payload {
    ident: usize,
    filters: [i16; 2],

    /// Timer period in milliseconds, applied at `EV_ADD`.
    timer_ms: isize,
}

/// macOS/BSD `kqueue` multiplexer. Shared by every dispatching thread; the
/// kernel makes concurrent `kevent` calls on one instance safe.
pub(crate) struct Multiplexer {
    kq: RawFd,
}

impl Multiplexer {
    pub(crate) fn new() -> Result<Multiplexer> {
        let kq = unsafe { kqueue() };
        if kq < 0 {
            return Err(Error::PlatformInit(io::Error::last_os_error()));
        }

        Ok(Multiplexer { kq })
    }

    /// The queue's own descriptor, pollable for readability by a parent loop.
    pub(crate) fn raw_fd(&self) -> RawFd {
        self.kq
    }

    /// Prepares a plain file-descriptor subscription, deriving the native
    /// filter set from the interest mask.
    pub(crate) fn fd_init(&self, sub: &mut Subscription, fd: RawFd) {
        debug_assert!(!sub.interest.is_none(), "fd subscription without interest");

        let mut filters = [0i16; 2];
        let mut count = 0;

        if sub.interest.contains(Events::Read) {
            filters[count] = EVFILT_READ as i16;
            count += 1;
        }
        if sub.interest.contains(Events::Write) {
            filters[count] = EVFILT_WRITE as i16;
        }

        sub.payload = Payload {
            ident: fd as usize,
            filters,
            timer_ms: 0,
        };
    }

    /// Prepares a timer subscription backed by a one-shot `EVFILT_TIMER`.
    pub(crate) fn timer_init(
        &self,
        sub: &mut Subscription,
        timeout_ms: i32,
        token: u64,
    ) -> Result<()> {
        sub.interest = Events::Read;
        sub.single_use = true;
        sub.payload = Payload {
            ident: token as usize,
            filters: [EVFILT_TIMER as i16, 0],
            // A zero-period timer never fires; clamp so the expiry still
            // lands on the next tick.
            timer_ms: (timeout_ms.max(1)) as isize,
        };

        Ok(())
    }

    /// Prepares a trigger subscription backed by `EVFILT_USER`.
    pub(crate) fn trigger_init(&self, sub: &mut Subscription, token: u64) -> Result<()> {
        sub.interest = Events::Read;
        sub.payload = Payload {
            ident: token as usize,
            filters: [EVFILT_USER as i16, 0],
            timer_ms: 0,
        };

        Ok(())
    }

    /// Registers all of the subscription's filters atomically.
    pub(crate) fn subscribe(&self, sub: &Subscription, token: u64) -> Result<()> {
        let flags = if sub.single_use {
            EV_ADD | EV_ONESHOT
        } else {
            EV_ADD | EV_CLEAR | EV_DISPATCH
        };

        self.change(sub, token, flags, 0).map_err(Error::Subscribe)
    }

    /// Deregisters all of the subscription's filters.
    ///
    /// A fired one-shot knote is already gone from the kernel; its `ENOENT`
    /// is not an error here.
    pub(crate) fn unsubscribe(&self, sub: &Subscription) -> Result<()> {
        match self.change(sub, 0, EV_DELETE, 0) {
            Ok(()) => Ok(()),
            Err(err) if err.raw_os_error() == Some(libc::ENOENT) => Ok(()),
            Err(err) => Err(Error::Unsubscribe(err)),
        }
    }

    /// Re-enables a dispatch-disabled registration after its callback
    /// returned.
    pub(crate) fn rearm(&self, sub: &Subscription, token: u64) -> io::Result<()> {
        self.change(sub, token, EV_ENABLE, 0)
    }

    /// Raises the software signal behind a trigger subscription.
    pub(crate) fn fire(&self, sub: &Subscription) -> Result<()> {
        self.change(sub, sub.payload.ident as u64, EV_ENABLE, NOTE_TRIGGER)
            .map_err(Error::Fire)
    }

    /// Edge state is consumed by `EV_CLEAR` delivery; nothing to do here.
    pub(crate) fn acknowledge(&self, _sub: &Subscription) {}

    /// Waits for readiness per the timeout contract and returns ready
    /// `(token, events)` pairs.
    pub(crate) fn wait(&self, max_events: usize, timeout_ms: i32) -> Result<Vec<(u64, Events)>> {
        let mut native: Vec<libc::kevent> = Vec::with_capacity(max_events);

        let timeout = if timeout_ms < 0 {
            None
        } else {
            Some(timeout_to_timespec(timeout_ms))
        };
        let timeout_ptr = timeout
            .as_ref()
            .map_or(std::ptr::null(), |spec| spec as *const _);

        let n = unsafe {
            kevent(
                self.kq,
                std::ptr::null(),
                0,
                native.as_mut_ptr(),
                max_events as libc::c_int,
                timeout_ptr,
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
            .map(|ev| (ev.udata as u64, events_from_kevent(ev)))
            .collect())
    }

    fn change(&self, sub: &Subscription, token: u64, flags: u16, fflags: u32) -> io::Result<()> {
        let mut changes = [unsafe { std::mem::zeroed::<libc::kevent>() }; 2];
        let mut count = 0;

        for &filter in &sub.payload.filters {
            if filter == 0 {
                continue;
            }

            changes[count] = libc::kevent {
                ident: sub.payload.ident as libc::uintptr_t,
                filter: filter as _,
                flags,
                fflags,
                data: sub.payload.timer_ms as _,
                udata: token as *mut libc::c_void,
            };
            count += 1;
        }

        let rc = unsafe {
            kevent(
                self.kq,
                changes.as_ptr(),
                count as libc::c_int,
                std::ptr::null_mut(),
                0,
                std::ptr::null(),
            )
        };
        if rc < 0 {
            return Err(io::Error::last_os_error());
        }

        Ok(())
    }
}

impl Drop for Multiplexer {
    fn drop(&mut self) {
        unsafe { libc::close(self.kq) };
    }
}

fn events_from_kevent(ev: &libc::kevent) -> Events {
    let mut events = Events::none();

    if ev.flags & EV_ERROR != 0 {
        events |= Events::Error;
    } else if ev.filter == EVFILT_READ as _ {
        if ev.data != 0 {
            events |= Events::Read;
        }
        if ev.flags & EV_EOF != 0 {
            events |= Events::Close;
        }
    } else if ev.filter == EVFILT_WRITE as _ {
        if ev.data != 0 {
            events |= Events::Write;
        }
        if ev.flags & EV_EOF != 0 {
            events |= Events::Close;
        }
    } else if ev.filter == EVFILT_USER as _ || ev.filter == EVFILT_TIMER as _ {
        // Triggers and timers report as readable on every backend.
        events |= Events::Read;
    }

    events
}
