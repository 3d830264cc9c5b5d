use std::{num::NonZeroU64, sync::Arc};

use moka::future::Cache;

use super::{dns_packets::ParsedPacket, resolution_key::ResolutionKey};

/// A cached upstream response.
#[derive(Clone, Debug)]
pub struct CacheItem {
    pub key: ResolutionKey,
    pub response: Arc<ParsedPacket>,
}

impl CacheItem {
    pub fn new(key: ResolutionKey, response: ParsedPacket) -> Self {
        Self {
            key,
            response: Arc::new(response),
        }
    }

    /// Size of the cached value in the memory.
    /// Approximation. Could be done better.
    pub fn memory_size(&self) -> usize {
        self.key.memory_size() + self.response.raw_bytes().len()
    }

    /// Copy of the cached response with the transaction id of the client.
    /// The cached bytes stay untouched because other tasks may read them concurrently.
    pub fn response_for(&self, query_id: u16) -> Vec<u8> {
        // A parsed packet always contains the full header.
        let mut copy = self.response.raw_bytes().clone();
        copy[..2].copy_from_slice(&query_id.to_be_bytes());
        copy
    }
}

/**
 * Response cache keyed by the question of a query.
 * Entries live as long as the process unless a size bound is configured.
 * Use `.clone()` to share it between tasks. Moka Cache is thread safe.
 */
#[derive(Clone, Debug)]
pub struct ResponseCache {
    cache: Cache<ResolutionKey, CacheItem>,
}

impl ResponseCache {
    /// `max_size_mb` None keeps every entry forever.
    pub fn new(max_size_mb: Option<NonZeroU64>) -> Self {
        let mut builder = Cache::builder();
        if let Some(mb) = max_size_mb {
            builder = builder
                .weigher(|_key, value: &CacheItem| -> u32 { value.memory_size() as u32 })
                .max_capacity(mb.get() * 1024 * 1024);
        }
        ResponseCache { cache: builder.build() }
    }

    pub async fn get(&self, key: &ResolutionKey) -> Option<CacheItem> {
        self.cache.get(key).await
    }

    /// Stores the item unless the key is already cached.
    /// Returns the item that is cached after the call and whether it was newly inserted.
    pub async fn put(&self, item: CacheItem) -> (CacheItem, bool) {
        let entry = self.cache.entry(item.key.clone()).or_insert(item).await;
        let fresh = entry.is_fresh();
        (entry.into_value(), fresh)
    }

    /// Approximated size of the cache in bytes. May not be 100% accurate due to pending counts.
    pub fn approx_size_bytes(&self) -> u64 {
        self.cache.weighted_size()
    }

    pub fn entry_count(&self) -> u64 {
        self.cache.entry_count()
    }
}
