//! Readiness selection over `poll(2)`.
//!
//! The selector is rebuilt on every iteration: callers [`Selector::add`] the
//! descriptors they care about with the interest they currently need, then
//! block in [`Selector::select`]. This keeps interest changes (arming write
//! interest only while data is pending) free of any registration bookkeeping.

use std::io::ErrorKind;
use std::os::fd::RawFd;
use std::time::Duration;

/// Opaque key returned with every readiness event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Token(pub u64);

/// Which directions a descriptor should be watched for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Interest {
    pub readable: bool,
    pub writable: bool,
}

impl Interest {
    pub const READABLE: Interest = Interest {
        readable: true,
        writable: false,
    };
    pub const WRITABLE: Interest = Interest {
        readable: false,
        writable: true,
    };
    pub const BOTH: Interest = Interest {
        readable: true,
        writable: true,
    };

    fn as_events(self) -> libc::c_short {
        let mut events = 0;
        if self.readable {
            events |= libc::POLLIN;
        }
        if self.writable {
            events |= libc::POLLOUT;
        }
        events
    }
}

/// Readiness reported for one descriptor.
///
/// Hang-up and error conditions are folded into `readable` so the owner
/// performs a receive and observes the close or the error directly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Readiness {
    pub readable: bool,
    pub writable: bool,
    /// The descriptor is not open (`POLLNVAL`).
    pub invalid: bool,
}

/// One ready descriptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Event {
    pub token: Token,
    pub readiness: Readiness,
}

/// `poll(2)`-backed readiness selector.
#[derive(Default)]
pub struct Selector {
    fds: Vec<libc::pollfd>,
    tokens: Vec<Token>,
}

impl std::fmt::Debug for Selector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Selector")
            .field("tokens", &self.tokens)
            .finish()
    }
}

impl Selector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Forget every descriptor added since the last clear.
    pub fn clear(&mut self) {
        self.fds.clear();
        self.tokens.clear();
    }

    /// Watch `fd` with `interest` during the next [`select`](Self::select).
    pub fn add(&mut self, token: Token, fd: RawFd, interest: Interest) {
        self.fds.push(libc::pollfd {
            fd,
            events: interest.as_events(),
            revents: 0,
        });
        self.tokens.push(token);
    }

    /// Block until at least one watched descriptor is ready.
    ///
    /// `None` waits indefinitely. Interrupted waits are retried.
    pub fn select(&mut self, timeout: Option<Duration>) -> std::io::Result<Vec<Event>> {
        let timeout_ms: libc::c_int = match timeout {
            None => -1,
            Some(d) => d.as_millis().min(libc::c_int::MAX as u128) as libc::c_int,
        };

        let ready = loop {
            for fd in &mut self.fds {
                fd.revents = 0;
            }
            // SAFETY: `self.fds` is a valid, initialized slice of `pollfd` and the
            // length passed matches it; poll only writes the `revents` fields.
            let rc = unsafe {
                libc::poll(
                    self.fds.as_mut_ptr(),
                    self.fds.len() as libc::nfds_t,
                    timeout_ms,
                )
            };
            if rc >= 0 {
                break rc as usize;
            }
            let err = std::io::Error::last_os_error();
            if err.kind() != ErrorKind::Interrupted {
                return Err(err);
            }
        };

        let mut events = Vec::with_capacity(ready);
        for (fd, token) in self.fds.iter().zip(&self.tokens) {
            let revents = fd.revents;
            if revents == 0 {
                continue;
            }
            events.push(Event {
                token: *token,
                readiness: Readiness {
                    readable: revents & (libc::POLLIN | libc::POLLHUP | libc::POLLERR) != 0,
                    writable: revents & libc::POLLOUT != 0,
                    invalid: revents & libc::POLLNVAL != 0,
                },
            });
        }
        Ok(events)
    }
}
