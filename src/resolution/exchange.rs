//! Round trips to the upstream resolver.
//!
//! Every exchange is bounded by a number of attempts and a timeout per attempt.
//! A timeout consumes one attempt and the query is sent again right away.
//! A transport error aborts the exchange.

use std::{fmt::Debug, sync::Arc, time::Duration};

use async_trait::async_trait;
use simple_dns::SimpleDnsError;
use tokio::{sync::oneshot, task::JoinHandle, time::Instant};

use super::{
    dns_packets::{ParsedPacket, ParsedQuery},
    helpers::replace_packet_id,
    pending_request::{PendingRequest, PendingRequestStore},
    query_id_manager::QueryIdManager,
    transport::{Connector, Transport, TransportError},
};

#[derive(Debug, Clone, Copy)]
pub struct ExchangeSettings {
    /// How often the query is sent before the exchange gives up.
    pub attempts: u8,
    /// How long one attempt waits for a reply.
    pub attempt_timeout: Duration,
}

impl Default for ExchangeSettings {
    fn default() -> Self {
        Self {
            attempts: 5,
            attempt_timeout: Duration::from_millis(1100),
        }
    }
}

/// Any error that ends an exchange without a reply.
#[derive(thiserror::Error, Debug)]
pub enum ExchangeError {
    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error("No answer received from forward server after {attempts} attempts.")]
    Exhausted { attempts: u8 },

    #[error("Dns packet parse error: {0}")]
    Parse(#[from] SimpleDnsError),

    #[error("Receiving on the shared upstream socket failed.")]
    ReceiveFailed,
}

/// One query, one reply. Implementations retry internally.
#[async_trait]
pub trait UpstreamExchange: Debug + Send + Sync {
    async fn exchange(&self, query: &ParsedQuery) -> Result<ParsedPacket, ExchangeError>;
}

/**
 * Opens a fresh transport for every exchange.
 * The socket itself correlates the reply with the query so only
 * the transaction id is checked on top.
 */
#[derive(Debug, Clone)]
pub struct MessageExchange {
    connector: Arc<dyn Connector>,
    settings: ExchangeSettings,
}

impl MessageExchange {
    pub fn new(connector: Arc<dyn Connector>, settings: ExchangeSettings) -> Self {
        Self { connector, settings }
    }

    /// Reads until a reply with `expected_id` shows up or the deadline passes.
    async fn wait_for_reply(
        transport: &dyn Transport,
        expected_id: u16,
        deadline: Instant,
    ) -> Result<ParsedPacket, TransportError> {
        loop {
            let datagram = transport.recv_with_deadline(deadline).await?;
            match ParsedPacket::new(datagram) {
                Ok(packet) if packet.is_reply() && packet.id() == expected_id => return Ok(packet),
                Ok(packet) => {
                    tracing::debug!("Discard uncorrelated upstream datagram. id={} expected={expected_id}", packet.id());
                }
                Err(e) => {
                    tracing::debug!("Discard unparseable upstream datagram. {e}");
                }
            }
        }
    }
}

#[async_trait]
impl UpstreamExchange for MessageExchange {
    async fn exchange(&self, query: &ParsedQuery) -> Result<ParsedPacket, ExchangeError> {
        let transport = self.connector.connect().await?;
        let request = query.packet.raw_bytes();
        let attempts = self.settings.attempts;

        for attempt in 1..=attempts {
            transport.send(request).await?;
            let deadline = Instant::now() + self.settings.attempt_timeout;
            match Self::wait_for_reply(transport.as_ref(), query.id(), deadline).await {
                Ok(reply) => return Ok(reply),
                Err(TransportError::Timeout) => {
                    tracing::warn!("Attempt {attempt}/{attempts} timed out. {query}");
                }
                Err(e) => return Err(e.into()),
            }
        }

        Err(ExchangeError::Exhausted { attempts })
    }
}

/// Pause after a failed receive so a broken socket doesn't spin the loop.
const RECEIVE_ERROR_PAUSE: Duration = Duration::from_millis(10);

/// Aborts the receive loop when the last exchange clone is dropped.
#[derive(Debug)]
struct ReceiveLoop(JoinHandle<()>);

impl Drop for ReceiveLoop {
    fn drop(&mut self) {
        self.0.abort();
    }
}

/**
 * Multiplexes all exchanges over one long-lived transport.
 * Every attempt is sent with a new forward id. A background loop reads all
 * datagrams and hands each reply to the exchange waiting for exactly that id.
 * Replies to older attempts or unknown ids are stale and get discarded.
 */
#[derive(Debug, Clone)]
pub struct SharedSocketExchange {
    transport: Arc<dyn Transport>,
    pending: PendingRequestStore,
    id_manager: QueryIdManager,
    settings: ExchangeSettings,
    _receive_loop: Arc<ReceiveLoop>,
}

impl SharedSocketExchange {
    /// Creates the exchange and starts the receive loop in the background.
    pub fn start(transport: Arc<dyn Transport>, settings: ExchangeSettings) -> Self {
        Self::start_with_id_manager(transport, settings, QueryIdManager::new())
    }

    pub fn start_with_id_manager(
        transport: Arc<dyn Transport>,
        settings: ExchangeSettings,
        id_manager: QueryIdManager,
    ) -> Self {
        let pending = PendingRequestStore::new();
        let handle = tokio::spawn(Self::receive_loop(transport.clone(), pending.clone()));
        Self {
            transport,
            pending,
            id_manager,
            settings,
            _receive_loop: Arc::new(ReceiveLoop(handle)),
        }
    }

    async fn receive_loop(transport: Arc<dyn Transport>, pending: PendingRequestStore) {
        loop {
            if let Err(err) = Self::receive_datagram(transport.as_ref(), &pending).await {
                let failed = pending.fail_all();
                tracing::error!("Error while trying to receive from upstream. Failed {failed} pending requests. {err}");
                tokio::time::sleep(RECEIVE_ERROR_PAUSE).await;
            }
        }
    }

    async fn receive_datagram(transport: &dyn Transport, pending: &PendingRequestStore) -> Result<(), TransportError> {
        let datagram = transport.recv().await?;
        let packet = match ParsedPacket::new(datagram) {
            Ok(packet) => packet,
            Err(e) => {
                tracing::debug!("Failed to parse upstream datagram. {e} Drop.");
                return Ok(());
            }
        };

        let forward_id = packet.id();
        if !packet.is_reply() {
            tracing::debug!("Received query on the upstream socket. forward_id={forward_id} Drop.");
            return Ok(());
        }
        match pending.remove_by_forward_id(forward_id) {
            Some(request) => {
                tracing::trace!(
                    "Received response from forward server within {}ms. original_id={} forward_id={forward_id}",
                    request.sent_at.elapsed().as_millis(),
                    request.original_query_id
                );
                // The exchange may have timed out in the meantime.
                let _ = request.tx.send(packet);
            }
            None => {
                tracing::debug!("Received stale reply without a pending request. forward_id={forward_id} Discard.");
            }
        };
        Ok(())
    }

    /// Number of attempts currently waiting for a reply.
    #[cfg(test)]
    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }
}

#[async_trait]
impl UpstreamExchange for SharedSocketExchange {
    async fn exchange(&self, query: &ParsedQuery) -> Result<ParsedPacket, ExchangeError> {
        let original_id = query.id();
        let attempts = self.settings.attempts;

        for attempt in 1..=attempts {
            let forward_id = self.id_manager.get_next();
            let (tx, rx) = oneshot::channel::<ParsedPacket>();
            // Dropped at the end of the attempt, or with the whole exchange future.
            let _pending = self.pending.insert_guarded(PendingRequest {
                sent_at: std::time::Instant::now(),
                original_query_id: original_id,
                forward_query_id: forward_id,
                tx,
            });
            tracing::trace!("Forward attempt {attempt}/{attempts}. original_id={original_id} forward_id={forward_id}");

            let datagram = replace_packet_id(query.packet.raw_bytes(), forward_id)?;
            self.transport.send(&datagram).await?;

            match tokio::time::timeout(self.settings.attempt_timeout, rx).await {
                Ok(Ok(reply)) => return Ok(reply),
                Ok(Err(_)) => return Err(ExchangeError::ReceiveFailed),
                Err(_) => {
                    tracing::warn!("Attempt {attempt}/{attempts} timed out. forward_id={forward_id} {query}");
                }
            }
        }

        Err(ExchangeError::Exhausted { attempts })
    }
}
