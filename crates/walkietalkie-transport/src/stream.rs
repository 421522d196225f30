use std::io::{Read, Write};
use std::net::{Shutdown, TcpStream};
use std::time::Duration;

use crate::error::Result;

/// A connected stream implementing `Read` and `Write`.
///
/// This is the I/O type handed out by `accept` and `connect`. It wraps either
/// a TCP stream or, on Unix, a Unix domain socket stream.
pub struct WtStream {
    inner: WtStreamInner,
}

enum WtStreamInner {
    Tcp(TcpStream),
    #[cfg(unix)]
    Unix(std::os::unix::net::UnixStream),
}

impl Read for WtStream {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        match &mut self.inner {
            WtStreamInner::Tcp(stream) => stream.read(buf),
            #[cfg(unix)]
            WtStreamInner::Unix(stream) => stream.read(buf),
        }
    }
}

impl Write for WtStream {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        match &mut self.inner {
            WtStreamInner::Tcp(stream) => stream.write(buf),
            #[cfg(unix)]
            WtStreamInner::Unix(stream) => stream.write(buf),
        }
    }

    fn flush(&mut self) -> std::io::Result<()> {
        match &mut self.inner {
            WtStreamInner::Tcp(stream) => stream.flush(),
            #[cfg(unix)]
            WtStreamInner::Unix(stream) => stream.flush(),
        }
    }
}

impl WtStream {
    pub(crate) fn from_tcp(stream: TcpStream) -> Self {
        Self {
            inner: WtStreamInner::Tcp(stream),
        }
    }

    #[cfg(unix)]
    pub(crate) fn from_unix(stream: std::os::unix::net::UnixStream) -> Self {
        Self {
            inner: WtStreamInner::Unix(stream),
        }
    }

    /// Set read timeout on the underlying stream.
    pub fn set_read_timeout(&self, timeout: Option<Duration>) -> Result<()> {
        match &self.inner {
            WtStreamInner::Tcp(stream) => stream.set_read_timeout(timeout).map_err(Into::into),
            #[cfg(unix)]
            WtStreamInner::Unix(stream) => stream.set_read_timeout(timeout).map_err(Into::into),
        }
    }

    /// Set write timeout on the underlying stream.
    pub fn set_write_timeout(&self, timeout: Option<Duration>) -> Result<()> {
        match &self.inner {
            WtStreamInner::Tcp(stream) => stream.set_write_timeout(timeout).map_err(Into::into),
            #[cfg(unix)]
            WtStreamInner::Unix(stream) => stream.set_write_timeout(timeout).map_err(Into::into),
        }
    }

    /// Try to clone this stream (creates a new file descriptor).
    ///
    /// Used to hand the read half and the write half of one connection to
    /// different threads.
    pub fn try_clone(&self) -> Result<Self> {
        match &self.inner {
            WtStreamInner::Tcp(stream) => Ok(Self::from_tcp(stream.try_clone()?)),
            #[cfg(unix)]
            WtStreamInner::Unix(stream) => Ok(Self::from_unix(stream.try_clone()?)),
        }
    }

    /// Shut down the read half, the write half, or both.
    ///
    /// Affects every clone of this stream.
    pub fn shutdown(&self, how: Shutdown) -> Result<()> {
        match &self.inner {
            WtStreamInner::Tcp(stream) => stream.shutdown(how).map_err(Into::into),
            #[cfg(unix)]
            WtStreamInner::Unix(stream) => stream.shutdown(how).map_err(Into::into),
        }
    }
}

impl std::fmt::Debug for WtStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.inner {
            WtStreamInner::Tcp(_) => f.debug_struct("WtStream").field("type", &"tcp").finish(),
            #[cfg(unix)]
            WtStreamInner::Unix(_) => f.debug_struct("WtStream").field("type", &"unix").finish(),
        }
    }
}
