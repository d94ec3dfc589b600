//! Pending-request table
//!
//! Maps an outstanding request id to the single-slot channel its caller waits
//! on. The lock is only held to insert, remove or drain; callers wait on their
//! receiver outside it.

use std::collections::HashMap;
use std::sync::Arc;

use kvmcp_protocol::JsonRpcResponse;
use parking_lot::Mutex;
use tokio::sync::oneshot;

#[derive(Debug, Default)]
pub(crate) struct PendingRequests {
    waiters: Mutex<HashMap<i64, oneshot::Sender<JsonRpcResponse>>>,
}

impl PendingRequests {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Register `id` and return its receiver plus a guard that unregisters it
    /// when the caller stops waiting for any reason.
    pub(crate) fn register(
        self: &Arc<Self>,
        id: i64,
    ) -> (oneshot::Receiver<JsonRpcResponse>, PendingGuard) {
        let (tx, rx) = oneshot::channel();
        let previous = self.waiters.lock().insert(id, tx);
        debug_assert!(previous.is_none(), "request id {id} registered twice");
        let guard = PendingGuard {
            table: Arc::clone(self),
            id,
        };
        (rx, guard)
    }

    /// Deliver a response. Returns false when nobody is waiting for `id`.
    pub(crate) fn complete(&self, id: i64, response: JsonRpcResponse) -> bool {
        let sender = self.waiters.lock().remove(&id);
        match sender {
            Some(tx) => tx.send(response).is_ok(),
            None => false,
        }
    }

    /// Drop every sender so each waiting receiver observes a closed channel.
    /// Returns how many requests were failed.
    pub(crate) fn fail_all(&self) -> usize {
        let drained: Vec<_> = self.waiters.lock().drain().collect();
        drained.len()
    }

    pub(crate) fn remove(&self, id: i64) {
        self.waiters.lock().remove(&id);
    }

    pub(crate) fn len(&self) -> usize {
        self.waiters.lock().len()
    }
}

/// Removes its entry from the table on drop
#[derive(Debug)]
pub(crate) struct PendingGuard {
    table: Arc<PendingRequests>,
    id: i64,
}

impl Drop for PendingGuard {
    fn drop(&mut self) {
        self.table.remove(self.id);
    }
}
