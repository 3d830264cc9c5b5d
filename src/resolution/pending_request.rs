use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
    time::Instant,
};

use tokio::sync::oneshot;

use super::dns_packets::ParsedPacket;

/// A request to the forward server that waits for its reply.
#[derive(Debug)]
pub struct PendingRequest {
    /// When the request was sent
    pub sent_at: Instant,
    /// The original query id coming from the client
    pub original_query_id: u16,
    /// The forward query id of the latest attempt
    pub forward_query_id: u16,
    /// The sender to hand the reply to the waiting exchange
    pub tx: oneshot::Sender<ParsedPacket>,
}

/**
 * Thread safe pending request store.
 * Use `.clone()` to give each thread one store struct.
 * The data will stay shared.
 */
#[derive(Debug, Clone, Default)]
pub struct PendingRequestStore {
    pending: Arc<Mutex<HashMap<u16, PendingRequest>>>,
}

const POISONED: &str = "Lock is always successful except when poisoned. If poisened it will be poisened forever. We panic here because we can't recover from this.";

impl PendingRequestStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a new pending request
    pub fn insert(&self, request: PendingRequest) {
        let mut locked = self.pending.lock().expect(POISONED);
        locked.insert(request.forward_query_id, request);
    }

    /// Inserts the request and removes it again when the returned guard is dropped.
    pub fn insert_guarded(&self, request: PendingRequest) -> PendingRequestGuard<'_> {
        let forward_query_id = request.forward_query_id;
        self.insert(request);
        PendingRequestGuard {
            store: self,
            forward_query_id,
        }
    }

    /// Remove a pending request by forward query id.
    /// None means nobody waits for this id (anymore).
    pub fn remove_by_forward_id(&self, forward_query_id: u16) -> Option<PendingRequest> {
        let mut locked = self.pending.lock().expect(POISONED);
        locked.remove(&forward_query_id)
    }

    /// Drops every pending request. The waiting exchanges see a closed channel.
    pub fn fail_all(&self) -> usize {
        let mut locked = self.pending.lock().expect(POISONED);
        let count = locked.len();
        locked.clear();
        count
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.pending.lock().expect(POISONED).len()
    }

    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Owned by the exchange attempt that waits for the reply.
/// Once dropped, replies with this forward id are stale.
#[derive(Debug)]
pub struct PendingRequestGuard<'a> {
    store: &'a PendingRequestStore,
    forward_query_id: u16,
}

impl Drop for PendingRequestGuard<'_> {
    fn drop(&mut self) {
        self.store.remove_by_forward_id(self.forward_query_id);
    }
}
