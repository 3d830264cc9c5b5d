use std::{fmt::Debug, net::SocketAddr, sync::Arc};

use async_trait::async_trait;
use tokio::{net::UdpSocket, time::Instant};

/// Largest possible UDP payload. Receive buffers are truncated to the actual size.
pub const MAX_DATAGRAM_SIZE: usize = 65535;

/// Any error while sending or receiving datagrams.
#[derive(thiserror::Error, Debug)]
pub enum TransportError {
    #[error(transparent)]
    IO(#[from] tokio::io::Error),

    #[error("Timeout. No datagram received before the deadline.")]
    Timeout,
}

/// Datagram connection to one upstream server.
#[async_trait]
pub trait Transport: Debug + Send + Sync {
    /// Sends one datagram.
    async fn send(&self, datagram: &[u8]) -> Result<(), TransportError>;

    /// Waits for the next datagram without a deadline.
    async fn recv(&self) -> Result<Vec<u8>, TransportError>;

    /// Waits for the next datagram until `deadline`.
    async fn recv_with_deadline(&self, deadline: Instant) -> Result<Vec<u8>, TransportError> {
        match tokio::time::timeout_at(deadline, self.recv()).await {
            Ok(result) => result,
            Err(_) => Err(TransportError::Timeout),
        }
    }
}

/// Hands out a fresh transport for every exchange.
#[async_trait]
pub trait Connector: Debug + Send + Sync {
    async fn connect(&self) -> Result<Arc<dyn Transport>, TransportError>;
}

/// Connected UDP socket.
#[derive(Debug)]
pub struct UdpTransport {
    socket: UdpSocket,
}

impl UdpTransport {
    /// Binds an ephemeral local port and connects it to `upstream`.
    pub async fn connect(upstream: SocketAddr) -> tokio::io::Result<Self> {
        let local: SocketAddr = if upstream.is_ipv4() {
            (std::net::Ipv4Addr::UNSPECIFIED, 0).into()
        } else {
            (std::net::Ipv6Addr::UNSPECIFIED, 0).into()
        };
        let socket = UdpSocket::bind(local).await?;
        socket.connect(upstream).await?;
        Ok(Self { socket })
    }
}

#[async_trait]
impl Transport for UdpTransport {
    async fn send(&self, datagram: &[u8]) -> Result<(), TransportError> {
        self.socket.send(datagram).await?;
        Ok(())
    }

    async fn recv(&self) -> Result<Vec<u8>, TransportError> {
        let mut buffer = vec![0; MAX_DATAGRAM_SIZE];
        let size = self.socket.recv(&mut buffer).await?;
        buffer.truncate(size);
        Ok(buffer)
    }
}

/// Opens one ephemeral UDP socket per exchange so replies can't cross between exchanges.
#[derive(Debug, Clone)]
pub struct UdpConnector {
    upstream: SocketAddr,
}

impl UdpConnector {
    pub fn new(upstream: SocketAddr) -> Self {
        Self { upstream }
    }
}

#[async_trait]
impl Connector for UdpConnector {
    async fn connect(&self) -> Result<Arc<dyn Transport>, TransportError> {
        let transport = UdpTransport::connect(self.upstream).await?;
        Ok(Arc::new(transport))
    }
}
