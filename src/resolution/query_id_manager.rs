use std::sync::{
    atomic::{AtomicU16, Ordering},
    Arc,
};

/**
 * Thread-safe QueryIdManager.
 * Hands out the transaction ids used on the shared upstream socket.
 * Use `.clone()` to give each task one manager struct.
 * The counter will stay shared.
 */
#[derive(Debug, Clone)]
pub struct QueryIdManager {
    next: Arc<AtomicU16>,
}

impl QueryIdManager {
    /// Starts at a random id so restarts don't reuse the previous sequence.
    pub fn new() -> Self {
        Self::starting_at(rand::random())
    }

    pub fn starting_at(first: u16) -> Self {
        Self {
            next: Arc::new(AtomicU16::new(first)),
        }
    }

    /**
     * Gets the next query id. Wraps around after u16::MAX.
     */
    pub fn get_next(&self) -> u16 {
        self.next.fetch_add(1, Ordering::Relaxed)
    }
}

impl Default for QueryIdManager {
    fn default() -> Self {
        Self::new()
    }
}
