use std::{net::SocketAddr, sync::Arc, time::Duration};

use tokio::{net::UdpSocket, sync::oneshot};

use crate::{app_context::AppContext, config::ExchangeMode};

use super::{
    exchange::{ExchangeSettings, MessageExchange, SharedSocketExchange, UpstreamExchange},
    resolver::Resolver,
    response_cache::ResponseCache,
    transport::{UdpConnector, UdpTransport, MAX_DATAGRAM_SIZE},
};

/// Any error related to receiving and sending DNS packets on the UDP socket.
#[derive(thiserror::Error, Debug)]
pub enum DnsSocketError {
    #[error(transparent)]
    IO(#[from] tokio::io::Error),
}

/**
 * DNS UDP socket
 */
#[derive(Debug, Clone)]
pub struct DnsSocket {
    socket: Arc<UdpSocket>,
    resolver: Resolver,
}

impl DnsSocket {
    /// Binds the listening socket and wires up the resolver from the configuration.
    pub async fn new(context: &AppContext) -> Result<Self, DnsSocketError> {
        let general = &context.config.general;
        let upstream = Self::build_upstream(context).await?;
        let cache = ResponseCache::new(context.config.cache.max_size_mb);
        let resolver = Resolver::new(cache, upstream, context.config.cache.case_insensitive_keys);
        Self::with_resolver(general.socket, resolver).await
    }

    /// Binds the listening socket with a custom resolver.
    pub async fn with_resolver(listening: SocketAddr, resolver: Resolver) -> Result<Self, DnsSocketError> {
        let socket = UdpSocket::bind(listening).await?;
        Ok(Self {
            socket: Arc::new(socket),
            resolver,
        })
    }

    async fn build_upstream(context: &AppContext) -> Result<Arc<dyn UpstreamExchange>, DnsSocketError> {
        let forward = context.config.general.forward;
        let config = &context.config.upstream;
        let settings = ExchangeSettings {
            attempts: config.attempts.get(),
            attempt_timeout: Duration::from_millis(config.attempt_timeout_ms),
        };
        let upstream: Arc<dyn UpstreamExchange> = match config.mode {
            ExchangeMode::Message => Arc::new(MessageExchange::new(Arc::new(UdpConnector::new(forward)), settings)),
            ExchangeMode::SharedSocket => {
                let transport = UdpTransport::connect(forward).await?;
                Arc::new(SharedSocketExchange::start(Arc::new(transport), settings))
            }
        };
        Ok(upstream)
    }

    /// Address the socket is listening on.
    pub fn local_addr(&self) -> tokio::io::Result<SocketAddr> {
        self.socket.local_addr()
    }

    pub fn resolver(&self) -> &Resolver {
        &self.resolver
    }

    // Send message to address
    pub async fn send_to(&self, buffer: &[u8], target: &SocketAddr) -> tokio::io::Result<usize> {
        self.socket.send_to(buffer, target).await
    }

    /// Starts the receive loop in the background.
    /// Returns the sender to stop the loop again.
    pub fn start_receive_loop(&self) -> oneshot::Sender<()> {
        let cloned = self.clone();
        let (tx, rx) = oneshot::channel::<()>();
        tokio::spawn(async move {
            let mut cancel = rx;
            loop {
                tokio::select! {
                    _ = &mut cancel => {
                        tracing::trace!("Stop UDP receive loop.");
                        break;
                    }
                    result = cloned.receive_datagram() => {
                        if let Err(err) = result {
                            tracing::error!("Error while trying to receive. {err}");
                        }
                    }
                }
            }
        });
        tx
    }

    async fn receive_datagram(&self) -> Result<(), DnsSocketError> {
        let mut buffer = vec![0; MAX_DATAGRAM_SIZE];
        let (size, from) = self.socket.recv_from(&mut buffer).await?;
        buffer.truncate(size);

        let socket = self.clone();
        tokio::spawn(async move {
            let Some(reply) = socket.resolver.resolve_raw(buffer).await else {
                return;
            };
            if let Err(e) = socket.send_to(&reply, &from).await {
                tracing::debug!("Failed to send reply to {from}. {e}");
            }
        });

        Ok(())
    }
}
