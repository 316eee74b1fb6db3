use bitmask_enum::bitmask;

/// Return immediately if nothing is ready.
pub const WAIT_NONE: i32 = 0;

/// Block until at least one event is ready.
pub const WAIT_INDEFINITE: i32 = -1;

/// Readiness reported to a callback, and the interest mask used when
/// subscribing a file descriptor.
///
/// Bits may combine in a single delivery: a half-closed peer with buffered
/// data reports `Read | Close` in one callback invocation.
///
/// Triggers and timers always report `Read`.
#[bitmask(u8)]
pub enum Events {
    /// The source is readable.
    Read,
    /// The source is writable.
    Write,
    /// The peer closed or half-closed the connection.
    Close,
    /// An error condition is pending on the source.
    Error,
}
