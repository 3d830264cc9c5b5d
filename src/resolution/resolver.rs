use std::{sync::Arc, time::Instant};

use super::{
    dns_packets::ParsedQuery,
    exchange::{ExchangeError, UpstreamExchange},
    helpers::DNS_HEADER_LEN,
    inflight::{InflightGuard, InflightOutcome, InflightRole, InflightStore},
    resolution_key::ResolutionKey,
    response_cache::{CacheItem, ResponseCache},
};

/// Why a query could not be resolved.
#[derive(thiserror::Error, Debug)]
pub enum ResolveError {
    #[error("Forwarding dns query failed. {0}")]
    Upstream(#[from] ExchangeError),

    #[error("Concurrent exchange for the same question failed.")]
    ConcurrentExchangeFailed,
}

/**
 * Resolves queries from the cache or by forwarding them upstream.
 * Identical queries that arrive while an exchange is running share its result.
 * Use `.clone()` to give each task one resolver. Cache and in-flight state stay shared.
 */
#[derive(Debug, Clone)]
pub struct Resolver {
    cache: ResponseCache,
    inflight: InflightStore,
    upstream: Arc<dyn UpstreamExchange>,
    fold_case: bool,
}

impl Resolver {
    pub fn new(cache: ResponseCache, upstream: Arc<dyn UpstreamExchange>, fold_case: bool) -> Self {
        Self {
            cache,
            inflight: InflightStore::new(),
            upstream,
            fold_case,
        }
    }

    pub fn cache(&self) -> &ResponseCache {
        &self.cache
    }

    /// Resolves a raw query.
    /// None means the datagram is not a usable query and should be dropped without a reply.
    /// A failed resolution is answered with SRVFAIL.
    pub async fn resolve_raw(&self, query: Vec<u8>) -> Option<Vec<u8>> {
        if query.len() < DNS_HEADER_LEN {
            tracing::trace!("Datagram with {} bytes is shorter than a dns header. Drop.", query.len());
            return None;
        }
        let query = match ParsedQuery::new(query) {
            Ok(query) => query,
            Err(e) => {
                tracing::debug!("Failed to parse query. {e} Drop.");
                return None;
            }
        };
        Some(self.resolve_with_log(&query).await)
    }

    /// Resolves the query and falls back to a SRVFAIL reply.
    pub async fn resolve_with_log(&self, query: &ParsedQuery) -> Vec<u8> {
        let start = Instant::now();
        let reply = match self.resolve(query).await {
            Ok(reply) => reply,
            Err(e) => {
                tracing::debug!("Reply SRVFAIL. {e} {query}");
                query.packet.create_server_fail_reply()
            }
        };
        tracing::debug!("{query} processed within {}ms.", start.elapsed().as_millis());
        reply
    }

    /// Resolves the query. The reply always carries the transaction id of `query`.
    pub async fn resolve(&self, query: &ParsedQuery) -> Result<Vec<u8>, ResolveError> {
        let key = query.resolution_key(self.fold_case);
        let item = self.resolve_item(query, &key).await?;
        Ok(item.response_for(query.id()))
    }

    async fn resolve_item(&self, query: &ParsedQuery, key: &ResolutionKey) -> Result<CacheItem, ResolveError> {
        loop {
            if let Some(item) = self.cache.get(key).await {
                tracing::trace!("Cache hit. {query}");
                return Ok(item);
            }

            let waiter = match self.inflight.join(key) {
                InflightRole::Leader(guard) => return self.resolve_as_leader(query, key, guard).await,
                InflightRole::Follower(waiter) => waiter,
            };

            tracing::debug!("Concurrent duplicate query. Wait on the running exchange. {query}");
            match waiter.wait().await {
                InflightOutcome::Resolved(item) => return Ok(item),
                InflightOutcome::Failed => {
                    return self
                        .cache
                        .get(key)
                        .await
                        .ok_or(ResolveError::ConcurrentExchangeFailed);
                }
                InflightOutcome::Abandoned => {
                    tracing::debug!("Running exchange was abandoned. Retry. {query}");
                }
            }
        }
    }

    async fn resolve_as_leader(
        &self,
        query: &ParsedQuery,
        key: &ResolutionKey,
        guard: InflightGuard,
    ) -> Result<CacheItem, ResolveError> {
        // The previous leader may have finished between our cache miss and taking the lead.
        if let Some(item) = self.cache.get(key).await {
            guard.resolve(item.clone());
            return Ok(item);
        }

        tracing::debug!("New uncached query. Forward to upstream. {query}");
        match self.upstream.exchange(query).await {
            Ok(reply) => {
                let (item, fresh) = self.cache.put(CacheItem::new(key.clone(), reply)).await;
                if fresh {
                    tracing::debug!("Cache populated. {query}");
                } else {
                    tracing::debug!("Question got cached concurrently. Use the cached reply. {query}");
                }
                guard.resolve(item.clone());
                Ok(item)
            }
            Err(e) => {
                if let Some(item) = self.cache.get(key).await {
                    tracing::debug!("Exchange failed but a concurrent exchange cached the question. {e} {query}");
                    guard.resolve(item.clone());
                    return Ok(item);
                }
                tracing::warn!("Exchange permanently failed. {e} {query}");
                guard.fail();
                Err(e.into())
            }
        }
    }
}
