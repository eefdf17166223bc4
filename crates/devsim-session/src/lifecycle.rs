//! Registration set of live gateway connections.
//!
//! Owned by the multiplexer thread; nothing else touches it.

use std::collections::BTreeMap;
use std::fmt;

use bytes::BytesMut;
use devsim_frame::Decoder;
use devsim_transport::{Connection, Interest, Token};
use tracing::{debug, warn};

/// Identifier of a registered connection, unique within one registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(pub u64);

impl ConnectionId {
    pub fn token(self) -> Token {
        Token(self.0)
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// One registered socket with its decode and write state.
#[derive(Debug)]
pub struct Tracked {
    pub id: ConnectionId,
    pub connection: Connection,
    pub decoder: Decoder,
    /// Unsent remainder of the buffer currently being written.
    pub pending: BytesMut,
    /// Cleared once a peer close or fatal error has been observed; a
    /// connection still alive when closed was shut down locally.
    pub alive: bool,
}

impl Tracked {
    /// Interest for the next selection round.
    ///
    /// Read interest is always armed; write interest only while there is
    /// something to send on this connection or in the shared outbound queue.
    pub fn interest(&self, outbound_waiting: bool) -> Interest {
        Interest {
            readable: true,
            writable: !self.pending.is_empty() || outbound_waiting,
        }
    }
}

/// Live connections keyed by [`ConnectionId`], iterated in id order.
#[derive(Debug, Default)]
pub struct Registry {
    next_id: u64,
    entries: BTreeMap<ConnectionId, Tracked>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a connection with its decoder. Ids are never reused.
    pub fn insert(&mut self, connection: Connection, decoder: Decoder) -> ConnectionId {
        self.next_id += 1;
        let id = ConnectionId(self.next_id);
        debug!(%id, endpoint = connection.label(), "connection registered");
        self.entries.insert(
            id,
            Tracked {
                id,
                connection,
                decoder,
                pending: BytesMut::new(),
                alive: true,
            },
        );
        id
    }

    pub fn get_mut(&mut self, id: ConnectionId) -> Option<&mut Tracked> {
        self.entries.get_mut(&id)
    }

    /// Unregister without closing and hand the socket back. Removing an
    /// unknown id returns `None`.
    pub fn remove(&mut self, id: ConnectionId) -> Option<Connection> {
        self.entries.remove(&id).map(|tracked| tracked.connection)
    }

    /// Unregister and close a connection.
    ///
    /// Returns `false` if the id was not registered; closing twice is a no-op.
    pub fn close(&mut self, id: ConnectionId) -> bool {
        match self.entries.remove(&id) {
            Some(tracked) => {
                close_tracked(tracked);
                true
            }
            None => false,
        }
    }

    /// Unregister and close every connection. Returns how many were closed.
    pub fn drain(&mut self) -> usize {
        let entries = std::mem::take(&mut self.entries);
        let count = entries.len();
        for (_, tracked) in entries {
            close_tracked(tracked);
        }
        count
    }

    pub fn iter(&self) -> impl Iterator<Item = &Tracked> {
        self.entries.values()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

fn close_tracked(tracked: Tracked) {
    if !tracked.pending.is_empty() {
        warn!(
            id = %tracked.id,
            unsent = tracked.pending.len(),
            "closing connection with unsent bytes"
        );
    }
    if let Err(err) = tracked.connection.shutdown() {
        debug!(id = %tracked.id, error = %err, "shutdown failed");
    }
    debug!(id = %tracked.id, peer_closed = !tracked.alive, "connection closed");
}
