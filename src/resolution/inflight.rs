//! Single-flight bookkeeping.
//!
//! The first task that misses the cache for a key becomes the leader and performs the
//! upstream exchange. Every other task asking for the same key while the leader is busy
//! becomes a follower and waits for the leader's outcome instead of sending its own query.

use std::sync::Arc;

use dashmap::{mapref::entry::Entry, DashMap};
use tokio::sync::watch;

use super::{resolution_key::ResolutionKey, response_cache::CacheItem};

#[derive(Debug, Clone)]
enum InflightState {
    Pending,
    Resolved(CacheItem),
    Failed,
}

type InflightSender = Arc<watch::Sender<InflightState>>;

/// What a follower gets back from the leader.
#[derive(Debug, Clone)]
pub enum InflightOutcome {
    /// The leader cached this item.
    Resolved(CacheItem),
    /// The leader's exchange failed.
    Failed,
    /// The leader was dropped before it published anything.
    Abandoned,
}

pub enum InflightRole {
    Leader(InflightGuard),
    Follower(InflightWaiter),
}

/**
 * Thread safe store of the exchanges currently in flight.
 * Use `.clone()` to give each task one store struct.
 * The data will stay shared.
 */
#[derive(Debug, Clone, Default)]
pub struct InflightStore {
    inflight: Arc<DashMap<ResolutionKey, InflightSender>>,
}

impl InflightStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers the caller as leader for the key or joins the running exchange.
    pub fn join(&self, key: &ResolutionKey) -> InflightRole {
        match self.inflight.entry(key.clone()) {
            Entry::Occupied(entry) => {
                let rx = entry.get().subscribe();
                InflightRole::Follower(InflightWaiter { rx })
            }
            Entry::Vacant(entry) => {
                let (tx, _) = watch::channel(InflightState::Pending);
                let tx = Arc::new(tx);
                entry.insert(tx.clone());
                InflightRole::Leader(InflightGuard {
                    inflight: self.inflight.clone(),
                    key: key.clone(),
                    tx,
                })
            }
        }
    }

    /// Number of exchanges currently in flight.
    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.inflight.len()
    }

    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.inflight.is_empty()
    }
}

/// Held by the leader. Removes the in-flight marker when dropped,
/// even if the leader never completes.
pub struct InflightGuard {
    inflight: Arc<DashMap<ResolutionKey, InflightSender>>,
    key: ResolutionKey,
    tx: InflightSender,
}

impl InflightGuard {
    /// Publishes the cached item to all followers.
    pub fn resolve(self, item: CacheItem) {
        self.tx.send_replace(InflightState::Resolved(item));
    }

    /// Tells all followers that the exchange failed.
    pub fn fail(self) {
        self.tx.send_replace(InflightState::Failed);
    }
}

impl Drop for InflightGuard {
    fn drop(&mut self) {
        self.inflight.remove_if(&self.key, |_, tx| Arc::ptr_eq(tx, &self.tx));
    }
}

/// Held by a follower.
pub struct InflightWaiter {
    rx: watch::Receiver<InflightState>,
}

impl InflightWaiter {
    pub async fn wait(mut self) -> InflightOutcome {
        let state = match self.rx.wait_for(|state| !matches!(state, InflightState::Pending)).await {
            Ok(state) => state.clone(),
            Err(_) => return InflightOutcome::Abandoned,
        };
        match state {
            InflightState::Resolved(item) => InflightOutcome::Resolved(item),
            InflightState::Failed => InflightOutcome::Failed,
            InflightState::Pending => InflightOutcome::Abandoned,
        }
    }
}
