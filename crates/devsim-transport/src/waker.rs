use std::io::{ErrorKind, Read, Write};
use std::os::fd::{AsRawFd, RawFd};
use std::os::unix::net::UnixStream;
use std::sync::Arc;

use crate::error::Result;

/// Cross-thread handle that interrupts a blocked [`Selector`](crate::Selector).
///
/// Cloning is cheap; every clone signals the same [`WakeReceiver`].
#[derive(Debug, Clone)]
pub struct Waker {
    tx: Arc<UnixStream>,
}

/// Selector-side half of a waker pair. Register its descriptor for read
/// interest and call [`drain`](WakeReceiver::drain) when it becomes readable.
#[derive(Debug)]
pub struct WakeReceiver {
    rx: UnixStream,
}

/// Create a connected waker pair (self-pipe over a Unix socket pair).
pub fn waker_pair() -> Result<(Waker, WakeReceiver)> {
    let (tx, rx) = UnixStream::pair()?;
    tx.set_nonblocking(true)?;
    rx.set_nonblocking(true)?;
    Ok((Waker { tx: Arc::new(tx) }, WakeReceiver { rx }))
}

impl Waker {
    /// Signal the receiver.
    ///
    /// A full socket buffer already guarantees a pending wake-up, so
    /// `WouldBlock` counts as success.
    pub fn wake(&self) -> Result<()> {
        loop {
            match (&*self.tx).write(&[1]) {
                Ok(_) => return Ok(()),
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) if err.kind() == ErrorKind::WouldBlock => return Ok(()),
                Err(err) => return Err(err.into()),
            }
        }
    }
}

impl WakeReceiver {
    /// Consume all pending wake-up signals. Returns how many bytes were drained.
    pub fn drain(&mut self) -> Result<usize> {
        let mut total = 0usize;
        let mut buf = [0u8; 64];
        loop {
            match self.rx.read(&mut buf) {
                Ok(0) => return Ok(total),
                Ok(n) => total += n,
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) if err.kind() == ErrorKind::WouldBlock => return Ok(total),
                Err(err) => return Err(err.into()),
            }
        }
    }
}

impl AsRawFd for WakeReceiver {
    fn as_raw_fd(&self) -> RawFd {
        self.rx.as_raw_fd()
    }
}
