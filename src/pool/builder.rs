use std::thread;

use super::Pool;
use crate::error::Result;

/// Builder for configuring and creating a worker pool.
///
/// # Examples
///
/// ```rust,ignore
/// let pool = PoolBuilder::new()
///     .worker_threads(4)
///     .build()?;
/// ```
pub struct PoolBuilder {
    /// Number of worker threads dispatching on the shared loop.
    worker_threads: usize,
}

impl PoolBuilder {
    /// Creates a new `PoolBuilder` with default configuration.
    ///
    /// By default, the number of worker threads is set to the number of
    /// available logical CPUs, falling back to `1` if unavailable.
    pub fn new() -> Self {
        let worker_threads = thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1);

        Self { worker_threads }
    }

    /// Sets the number of worker threads used by the pool.
    ///
    /// # Panics
    ///
    /// Panics if `n == 0`.
    pub fn worker_threads(mut self, n: usize) -> Self {
        assert!(n > 0, "worker_threads must be > 0");

        self.worker_threads = n;
        self
    }

    /// Builds the pool and its owned event loop.
    ///
    /// The pool does not dispatch anything until
    /// [`start`](super::Pool::start) is called.
    pub fn build(self) -> Result<Pool> {
        Pool::new(self.worker_threads)
    }
}

impl Default for PoolBuilder {
    fn default() -> Self {
        Self::new()
    }
}
