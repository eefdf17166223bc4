use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use tracing::debug;

use crate::error::{Result, SessionError};
use crate::jsonrpc::RpcResponse;

/// Default time a correlated request may wait for its response.
pub const DEFAULT_RPC_TIMEOUT: Duration = Duration::from_secs(30);

/// How a correlated request finished.
#[derive(Debug, Clone, PartialEq)]
pub enum Completion {
    /// The matching response arrived.
    Response(RpcResponse),
    /// No response arrived before the deadline; the entry was evicted.
    Expired,
}

/// Completion action stored under an RPC id.
pub type Callback = Box<dyn FnOnce(Completion) + Send>;

struct Entry {
    deadline: Instant,
    callback: Callback,
}

/// Maps RPC ids to completion callbacks.
///
/// Ids come from a counter owned by the registry, so independent sessions
/// never share id space. Callbacks always run outside the internal lock and
/// may therefore register follow-up requests.
pub struct CallbackRegistry {
    next_id: AtomicU64,
    timeout: Duration,
    entries: Mutex<HashMap<u64, Entry>>,
}

impl CallbackRegistry {
    pub fn new() -> Self {
        Self::with_timeout(DEFAULT_RPC_TIMEOUT)
    }

    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            next_id: AtomicU64::new(1),
            timeout,
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Next RPC id. Strictly increasing, never reused, first value 1.
    pub fn allocate_id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }

    /// Store `callback` under `id` with the registry's default deadline.
    pub fn register(&self, id: u64, callback: Callback) -> Result<()> {
        self.register_with_deadline(id, Instant::now() + self.timeout, callback)
    }

    /// Store `callback` under `id`, evicted once `deadline` passes.
    ///
    /// A second registration of a live id is rejected; the first one stays.
    pub fn register_with_deadline(&self, id: u64, deadline: Instant, callback: Callback) -> Result<()> {
        let mut entries = self.lock();
        if entries.contains_key(&id) {
            return Err(SessionError::DuplicateRpcId(id));
        }
        entries.insert(id, Entry { deadline, callback });
        Ok(())
    }

    /// Remove and invoke the callback for `id`.
    ///
    /// Returns `false` and drops the response when nothing is registered.
    pub fn resolve(&self, id: u64, response: RpcResponse) -> bool {
        let entry = self.lock().remove(&id);
        match entry {
            Some(entry) => {
                (entry.callback)(Completion::Response(response));
                true
            }
            None => {
                debug!(id, "response for unknown rpc id dropped");
                false
            }
        }
    }

    /// Evict every entry whose deadline is at or before `now`, invoking each
    /// with [`Completion::Expired`]. Returns how many were evicted.
    pub fn evict_expired(&self, now: Instant) -> usize {
        let expired: Vec<(u64, Entry)> = {
            let mut entries = self.lock();
            let ids: Vec<u64> = entries
                .iter()
                .filter(|(_, entry)| entry.deadline <= now)
                .map(|(id, _)| *id)
                .collect();
            ids.into_iter()
                .filter_map(|id| entries.remove(&id).map(|entry| (id, entry)))
                .collect()
        };

        let count = expired.len();
        for (id, entry) in expired {
            debug!(id, "rpc request expired without response");
            (entry.callback)(Completion::Expired);
        }
        count
    }

    /// Number of requests still waiting for a response.
    pub fn pending(&self) -> usize {
        self.lock().len()
    }

    /// Drop the entry for `id` without invoking its callback.
    pub fn cancel(&self, id: u64) -> bool {
        self.lock().remove(&id).is_some()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<u64, Entry>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for CallbackRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for CallbackRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CallbackRegistry")
            .field("next_id", &self.next_id.load(Ordering::Relaxed))
            .field("pending", &self.pending())
            .field("timeout", &self.timeout)
            .finish()
    }
}
