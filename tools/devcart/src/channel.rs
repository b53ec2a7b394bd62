//! Byte-stream channel to the cartridge.
//!
//! A channel hands out whatever the transport has: a read may return fewer
//! bytes than asked for, or none at all when the transport timed out, and a
//! write may accept only part of the buffer. Callers loop; a zero-length
//! transfer is never an error and never end-of-stream.

use std::fs::{File, OpenOptions};
use std::io::{self, Read, Write};
use std::net::{TcpStream, ToSocketAddrs};
use std::path::Path;
use std::time::Duration;

use thiserror::Error;

/// Transport failure. Fatal to the operation in flight.
#[derive(Debug, Error)]
#[error("{op} failed: {source}")]
pub struct ChannelError {
    pub op: &'static str,
    #[source]
    pub source: io::Error,
}

impl ChannelError {
    pub fn new(op: &'static str, source: io::Error) -> Self {
        Self { op, source }
    }
}

pub trait Channel {
    /// Reads up to `buf.len()` bytes. `Ok(0)` means "nothing yet, try again".
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, ChannelError>;

    /// Writes a prefix of `buf`, returning how much was accepted.
    fn write(&mut self, buf: &[u8]) -> Result<usize, ChannelError>;
}

impl<C: Channel + ?Sized> Channel for &mut C {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, ChannelError> {
        (**self).read(buf)
    }

    fn write(&mut self, buf: &[u8]) -> Result<usize, ChannelError> {
        (**self).write(buf)
    }
}

/// Adapts any std byte stream to [`Channel`] semantics.
///
/// A std read of zero bytes into a non-empty buffer is end-of-stream and fails
/// with `UnexpectedEof`, unless the adapter was built with
/// [`empty_reads_idle`](Self::empty_reads_idle).
#[derive(Debug)]
pub struct StreamChannel<T> {
    inner: T,
    empty_reads_idle: bool,
}

impl<T: Read + Write> StreamChannel<T> {
    pub fn new(inner: T) -> Self {
        Self {
            inner,
            empty_reads_idle: false,
        }
    }

    /// Reports zero-byte reads as idle instead of end-of-stream. Terminal
    /// devices with a read timeout (`VMIN = 0`) return nothing when the
    /// timeout expires.
    pub fn empty_reads_idle(mut self) -> Self {
        self.empty_reads_idle = true;
        self
    }

    pub fn get_ref(&self) -> &T {
        &self.inner
    }

    pub fn into_inner(self) -> T {
        self.inner
    }
}

fn is_idle(err: &io::Error) -> bool {
    matches!(
        err.kind(),
        io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock | io::ErrorKind::Interrupted
    )
}

impl<T: Read + Write> Channel for StreamChannel<T> {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, ChannelError> {
        match self.inner.read(buf) {
            Ok(0) if !buf.is_empty() && !self.empty_reads_idle => Err(ChannelError::new(
                "read",
                io::Error::new(io::ErrorKind::UnexpectedEof, "end of stream"),
            )),
            Ok(n) => Ok(n),
            Err(err) if is_idle(&err) => Ok(0),
            Err(err) => Err(ChannelError::new("read", err)),
        }
    }

    fn write(&mut self, buf: &[u8]) -> Result<usize, ChannelError> {
        let written = match self.inner.write(buf) {
            Ok(n) => n,
            Err(err) if is_idle(&err) => return Ok(0),
            Err(err) => return Err(ChannelError::new("write", err)),
        };
        self.inner
            .flush()
            .map_err(|err| ChannelError::new("flush", err))?;
        Ok(written)
    }
}

/// Opens a character device (for example `/dev/ttyUSB0`) for reading and
/// writing. Line settings are left as the system configured them, so an empty
/// read is a line timeout rather than a closed stream.
pub fn open_device(path: &Path) -> Result<StreamChannel<File>, ChannelError> {
    let file = OpenOptions::new()
        .read(true)
        .write(true)
        .open(path)
        .map_err(|err| ChannelError::new("open", err))?;
    log::debug!("opened device {}", path.display());
    Ok(StreamChannel::new(file).empty_reads_idle())
}

/// Connects to a TCP bridge in front of the cartridge. Reads time out after
/// `timeout`, which surfaces as zero-length reads. The bridge closing the
/// connection is a channel error.
pub fn connect_tcp<A: ToSocketAddrs>(
    addr: A,
    timeout: Duration,
) -> Result<StreamChannel<TcpStream>, ChannelError> {
    let stream = TcpStream::connect(addr).map_err(|err| ChannelError::new("connect", err))?;
    stream.set_nodelay(true).ok();
    stream
        .set_read_timeout(Some(timeout))
        .map_err(|err| ChannelError::new("configure", err))?;
    if let Ok(peer) = stream.peer_addr() {
        log::debug!("connected to tcp://{peer}");
    }
    Ok(StreamChannel::new(stream))
}
