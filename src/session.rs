//! Session operations abstraction
//!
//! This module provides the session operations pattern that allows
//! transparent switching between plain TCP and TLS transports. The
//! connection engine is generic over [`SessionOps`] and never touches
//! sockets directly.
//!
//! Readiness is checked with poll(2) against the raw file descriptor, which
//! lets the reader thread wait for inbound bytes without holding the lock
//! that serializes reads and writes on the transport.

use crate::error::{Error, Result};
use std::io::{self, Read, Write};
use std::net::TcpStream;
use std::os::fd::{AsRawFd, RawFd};
use std::time::Duration;

/// Poll events
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollEvents {
    Read,
    Write,
}

/// Shut down both directions of a socket by descriptor.
///
/// Used to unblock a thread sitting in a blocking read on the transport
/// without taking the lock that thread may be holding.
pub fn shutdown_fd(fd: RawFd) {
    unsafe {
        libc::shutdown(fd, libc::SHUT_RDWR);
    }
}

/// Wait for readiness on a raw file descriptor.
///
/// Returns true if the descriptor became ready for the requested operation
/// within the timeout, false on timeout. `None` waits indefinitely.
pub fn poll_fd(fd: RawFd, events: PollEvents, timeout: Option<Duration>) -> Result<bool> {
    use libc::{poll, pollfd, POLLIN, POLLOUT};

    let mut pfd = pollfd {
        fd,
        events: match events {
            PollEvents::Read => POLLIN,
            PollEvents::Write => POLLOUT,
        },
        revents: 0,
    };

    let timeout_ms = timeout.map(|d| d.as_millis() as i32).unwrap_or(-1);

    let result = unsafe { poll(&mut pfd as *mut pollfd, 1, timeout_ms) };

    if result < 0 {
        let err = io::Error::last_os_error();
        if err.kind() == io::ErrorKind::Interrupted {
            return Ok(false);
        }
        return Err(Error::Io(err));
    }

    Ok(result > 0)
}

/// Session operations trait
///
/// Defines the operations the connection engine performs on a transport,
/// abstracting over plain TCP and TLS. Reads and writes block; callers
/// combine [`poll_fd`] on [`SessionOps::raw_fd`] with the lock discipline
/// described in the connection module to keep readers and writers from
/// starving each other.
pub trait SessionOps: Send {
    /// Read data from the session. Returns 0 at end of stream.
    fn read(&mut self, buf: &mut [u8]) -> Result<usize>;

    /// Write data to the session
    fn write(&mut self, buf: &[u8]) -> Result<usize>;

    /// Close the session
    fn close(&mut self) -> Result<()>;

    /// The underlying socket descriptor, for readiness polling
    fn raw_fd(&self) -> RawFd;

    /// Bytes already buffered above the socket (decrypted TLS records); the
    /// descriptor may show no readiness while these are waiting.
    fn pending(&self) -> usize {
        0
    }

    /// Read exactly `buf.len()` bytes. End of stream mid-read surfaces as
    /// a connection-closed error: the peer went away inside a frame.
    fn read_exact(&mut self, buf: &mut [u8]) -> Result<()> {
        let mut done = 0;
        while done < buf.len() {
            let n = self.read(&mut buf[done..])?;
            if n == 0 {
                return Err(Error::ConnectionClosed);
            }
            done += n;
        }
        Ok(())
    }

    /// Write the whole buffer
    fn write_all(&mut self, buf: &[u8]) -> Result<()> {
        let mut done = 0;
        while done < buf.len() {
            let n = self.write(&buf[done..])?;
            if n == 0 {
                return Err(Error::ConnectionClosed);
            }
            done += n;
        }
        Ok(())
    }
}

/// Plain TCP session operations
pub struct FdSessionOps {
    stream: TcpStream,
}

impl FdSessionOps {
    /// Create session operations from a TCP stream
    pub fn new(stream: TcpStream) -> Self {
        FdSessionOps { stream }
    }

    /// Get a reference to the underlying stream
    pub fn stream(&self) -> &TcpStream {
        &self.stream
    }
}

impl SessionOps for FdSessionOps {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        self.stream.read(buf).map_err(Error::from)
    }

    fn write(&mut self, buf: &[u8]) -> Result<usize> {
        self.stream.write(buf).map_err(Error::from)
    }

    fn close(&mut self) -> Result<()> {
        use std::net::Shutdown;
        match self.stream.shutdown(Shutdown::Both) {
            Ok(()) => Ok(()),
            // Already torn down by the peer.
            Err(e) if e.kind() == io::ErrorKind::NotConnected => Ok(()),
            Err(e) => Err(Error::Io(e)),
        }
    }

    fn raw_fd(&self) -> RawFd {
        self.stream.as_raw_fd()
    }
}
