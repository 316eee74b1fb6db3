//! # Vigil
//!
//! **Vigil** is a cross-platform I/O event-notification core: it multiplexes
//! readiness of file descriptors, software triggers, and one-shot timers,
//! and dispatches them to registered callbacks, optionally from a pool of
//! worker threads sharing one underlying notification queue.
//!
//! There is no task scheduler and no futures machinery: callbacks run
//! synchronously on whichever thread received the ready event, directly on
//! top of the native kernel primitive (`epoll` on Linux, `kqueue` on macOS
//! and the BSDs).
//!
//! - **File descriptors** are persistent edge-triggered: every new readiness
//!   transition is delivered exactly once.
//! - **Triggers** are software-only sources; fires from any thread coalesce
//!   into one delivery.
//! - **Timers** fire once on the monotonic clock, then remove themselves.
//! - **Sub-loops** register one loop's readiness inside another, composing
//!   hierarchically.
//! - A callback may remove its own subscription, remove another live one, or
//!   run while other threads dispatch the same loop; the lifecycle state
//!   machine defers cleanup so none of this is ever a use-after-free or a
//!   double delivery.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use vigil::{Events, Pipe, PoolBuilder};
//!
//! let mut pool = PoolBuilder::new().worker_threads(2).build()?;
//! let pipe = Pipe::open()?;
//!
//! let sub = pool.event_loop().add_fd(pipe.read_fd(), Events::Read, {
//!     move |_evl, _handle, events| {
//!         println!("readable: {events:?}");
//!     }
//! })?;
//!
//! pool.start()?;
//! pipe.write(&42u64.to_ne_bytes())?;
//! // ... the callback runs on a worker thread ...
//! pool.stop()?;
//! ```

mod error;
mod event;
mod event_loop;
mod pipe;
mod pool;

pub use error::{Error, Result};
pub use event::{Events, WAIT_INDEFINITE, WAIT_NONE};
pub use event_loop::{EventLoop, Handle};
pub use pipe::Pipe;
pub use pool::{Pool, PoolBuilder};
