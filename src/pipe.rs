//! Nonblocking byte-pipe wrapper.
//!
//! A [`Pipe`] is the small collaborator the core needs around the event loop:
//! a way to signal a parked thread by writing a fixed-size payload to a file
//! descriptor it is watching. The test suite uses it as its canonical
//! readiness source.
//!
//! This sits outside the core error taxonomy and reports plain
//! [`io::Result`]s.

use libc::{F_GETFL, F_SETFL, O_CLOEXEC, O_NONBLOCK, close, fcntl, pipe, read, write};
use std::io;
use std::os::fd::RawFd;

/// A unidirectional byte channel with both ends set nonblocking.
pub struct Pipe {
    read_fd: RawFd,
    write_fd: RawFd,
}

impl Pipe {
    /// Opens the pipe and marks both ends `O_NONBLOCK | O_CLOEXEC`.
    pub fn open() -> io::Result<Pipe> {
        let mut fds = [0 as RawFd; 2];

        let rc = unsafe { pipe(fds.as_mut_ptr()) };
        if rc != 0 {
            return Err(io::Error::last_os_error());
        }

        let pipe = Pipe {
            read_fd: fds[0],
            write_fd: fds[1],
        };

        for fd in fds {
            set_nonblocking(fd)?;
        }

        Ok(pipe)
    }

    /// The readable end, suitable for [`EventLoop::add_fd`].
    ///
    /// [`EventLoop::add_fd`]: crate::EventLoop::add_fd
    pub fn read_fd(&self) -> RawFd {
        self.read_fd
    }

    /// The writable end.
    pub fn write_fd(&self) -> RawFd {
        self.write_fd
    }

    /// Reads up to `buf.len()` bytes from the read end.
    pub fn read(&self, buf: &mut [u8]) -> io::Result<usize> {
        let n = unsafe { read(self.read_fd, buf.as_mut_ptr() as *mut _, buf.len()) };
        if n < 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(n as usize)
    }

    /// Writes the whole of `buf` to the write end.
    pub fn write(&self, buf: &[u8]) -> io::Result<usize> {
        let n = unsafe { write(self.write_fd, buf.as_ptr() as *const _, buf.len()) };
        if n < 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(n as usize)
    }
}

impl Drop for Pipe {
    fn drop(&mut self) {
        unsafe {
            close(self.read_fd);
            close(self.write_fd);
        }
    }
}

fn set_nonblocking(fd: RawFd) -> io::Result<()> {
    let flags = unsafe { fcntl(fd, F_GETFL) };
    if flags < 0 {
        return Err(io::Error::last_os_error());
    }

    let rc = unsafe { fcntl(fd, F_SETFL, flags | O_NONBLOCK | O_CLOEXEC) };
    if rc < 0 {
        return Err(io::Error::last_os_error());
    }

    Ok(())
}
