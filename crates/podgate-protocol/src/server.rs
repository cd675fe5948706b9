// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! QUIC server side of the gateway RPC endpoint.
//!
//! [`PodgateServer`] owns the endpoint, [`ConnectionHandler`] fans a
//! connection out into one task per stream, and [`StreamHandler`] reads the
//! single request on a stream and writes the single response.

use std::net::{SocketAddr, UdpSocket};
use std::sync::Arc;
use std::time::Duration;

use prost::Message;
use quinn::{Endpoint, Incoming, RecvStream, SendStream, ServerConfig, TransportConfig};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::frame::{Frame, FrameError, read_frame, write_frame};

/// Errors that can occur in the QUIC server
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("bind error: {0}")]
    Bind(#[from] std::io::Error),

    #[error("connection error: {0}")]
    Connection(#[from] quinn::ConnectionError),

    #[error("frame error: {0}")]
    Frame(#[from] FrameError),

    #[error("TLS error: {0}")]
    Tls(String),

    #[error("stream closed: {0}")]
    ClosedStream(#[from] quinn::ClosedStream),
}

/// Certificate the server presents.
#[derive(Debug, Clone, Default)]
pub enum TlsIdentity {
    /// Generate a throwaway certificate for `localhost` at startup.
    #[default]
    SelfSigned,
    /// PEM-encoded certificate chain and private key.
    Pem { cert: Vec<u8>, key: Vec<u8> },
}

/// Endpoint settings.
#[derive(Debug, Clone)]
pub struct PodgateServerConfig {
    pub bind_addr: SocketAddr,
    pub identity: TlsIdentity,
    /// Handshakes allowed in flight at once.
    pub max_incoming: usize,
    /// Concurrent calls per connection.
    pub max_concurrent_calls: u32,
    pub idle_timeout: Duration,
    pub keep_alive: Option<Duration>,
    /// Requested UDP socket buffer size for both directions; `None` keeps the
    /// OS default.
    pub udp_buffer_size: Option<usize>,
}

impl Default for PodgateServerConfig {
    fn default() -> Self {
        Self::new(SocketAddr::from(([0, 0, 0, 0], 3000)))
    }
}

impl PodgateServerConfig {
    /// Defaults for a gateway bound to `bind_addr` with a self-signed certificate.
    pub fn new(bind_addr: SocketAddr) -> Self {
        Self {
            bind_addr,
            identity: TlsIdentity::SelfSigned,
            max_incoming: 4_096,
            max_concurrent_calls: 256,
            idle_timeout: Duration::from_secs(60),
            keep_alive: Some(Duration::from_secs(15)),
            udp_buffer_size: Some(1024 * 1024),
        }
    }
}

/// QUIC endpoint accepting gateway connections.
pub struct PodgateServer {
    endpoint: Endpoint,
}

impl PodgateServer {
    /// Bind an endpoint with the given settings.
    pub fn bind(config: PodgateServerConfig) -> Result<Self, ServerError> {
        let server_config = server_config(&config)?;
        let socket = bind_udp(config.bind_addr, config.udp_buffer_size)?;

        let runtime = quinn::default_runtime()
            .ok_or_else(|| ServerError::Bind(std::io::Error::other("no async runtime found")))?;
        let endpoint = Endpoint::new_with_abstract_socket(
            quinn::EndpointConfig::default(),
            Some(server_config),
            runtime.wrap_udp_socket(socket)?,
            runtime,
        )?;

        info!(
            addr = %config.bind_addr,
            max_concurrent_calls = config.max_concurrent_calls,
            "QUIC endpoint bound"
        );

        Ok(Self { endpoint })
    }

    /// Bind with default settings and a self-signed certificate.
    pub fn localhost(bind_addr: SocketAddr) -> Result<Self, ServerError> {
        Self::bind(PodgateServerConfig::new(bind_addr))
    }

    /// Wait for the next connection attempt. `None` once the endpoint is closed.
    pub async fn accept(&self) -> Option<Incoming> {
        self.endpoint.accept().await
    }

    /// Address the endpoint is bound to.
    pub fn local_addr(&self) -> Result<SocketAddr, ServerError> {
        Ok(self.endpoint.local_addr()?)
    }

    /// Stop accepting and close every open connection.
    pub fn close(&self) {
        self.endpoint.close(0u32.into(), b"server closing");
    }
}

fn bind_udp(addr: SocketAddr, buffer_size: Option<usize>) -> std::io::Result<UdpSocket> {
    use socket2::{Domain, Protocol, Socket, Type};

    let socket = Socket::new(Domain::for_address(addr), Type::DGRAM, Some(Protocol::UDP))?;
    if let Some(size) = buffer_size {
        // The kernel may clamp these; a smaller buffer is not fatal.
        if let Err(e) = socket.set_recv_buffer_size(size) {
            warn!(size, error = %e, "Failed to set UDP receive buffer size");
        }
        if let Err(e) = socket.set_send_buffer_size(size) {
            warn!(size, error = %e, "Failed to set UDP send buffer size");
        }
    }
    socket.bind(&addr.into())?;
    Ok(socket.into())
}

fn server_config(config: &PodgateServerConfig) -> Result<ServerConfig, ServerError> {
    let (cert_pem, key_pem) = match &config.identity {
        TlsIdentity::SelfSigned => {
            let generated = rcgen::generate_simple_self_signed(vec!["localhost".to_string()])
                .map_err(|e| ServerError::Tls(e.to_string()))?;
            (
                generated.cert.pem().into_bytes(),
                generated.key_pair.serialize_pem().into_bytes(),
            )
        }
        TlsIdentity::Pem { cert, key } => (cert.clone(), key.clone()),
    };

    let certs = rustls_pemfile::certs(&mut cert_pem.as_slice())
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| ServerError::Tls(format!("failed to parse certificates: {}", e)))?;
    if certs.is_empty() {
        return Err(ServerError::Tls("no certificate found".to_string()));
    }
    let key = rustls_pemfile::private_key(&mut key_pem.as_slice())
        .map_err(|e| ServerError::Tls(format!("failed to parse private key: {}", e)))?
        .ok_or_else(|| ServerError::Tls("no private key found".to_string()))?;

    let crypto = rustls::ServerConfig::builder()
        .with_no_client_auth()
        .with_single_cert(certs, key)
        .map_err(|e| ServerError::Tls(e.to_string()))?;

    let mut transport = TransportConfig::default();
    transport.max_idle_timeout(Some(
        config
            .idle_timeout
            .try_into()
            .map_err(|_| ServerError::Tls("idle timeout out of range".to_string()))?,
    ));
    transport.max_concurrent_bidi_streams(config.max_concurrent_calls.into());
    transport.max_concurrent_uni_streams(0u32.into());
    transport.keep_alive_interval(config.keep_alive);

    let quic_crypto = quinn::crypto::rustls::QuicServerConfig::try_from(crypto)
        .map_err(|e| ServerError::Tls(e.to_string()))?;
    let mut server_config = ServerConfig::with_crypto(Arc::new(quic_crypto));
    server_config.transport_config(Arc::new(transport));
    server_config.max_incoming(config.max_incoming);

    Ok(server_config)
}

/// One accepted connection.
pub struct ConnectionHandler {
    connection: quinn::Connection,
}

impl ConnectionHandler {
    pub fn new(connection: quinn::Connection) -> Self {
        Self { connection }
    }

    pub fn remote_address(&self) -> SocketAddr {
        self.connection.remote_address()
    }

    /// Serve every stream the peer opens until the connection ends.
    pub async fn run<H, Fut>(&self, handler: H)
    where
        H: Fn(StreamHandler) -> Fut + Send + Sync + Clone + 'static,
        Fut: std::future::Future<Output = ()> + Send + 'static,
    {
        loop {
            let (send, recv) = match self.connection.accept_bi().await {
                Ok(streams) => streams,
                Err(
                    quinn::ConnectionError::ApplicationClosed(_)
                    | quinn::ConnectionError::LocallyClosed
                    | quinn::ConnectionError::TimedOut,
                ) => {
                    debug!(remote = %self.remote_address(), "connection ended");
                    break;
                }
                Err(e) => {
                    warn!(remote = %self.remote_address(), error = %e, "connection failed");
                    break;
                }
            };
            let handler = handler.clone();
            tokio::spawn(async move {
                handler(StreamHandler { send, recv }).await;
            });
        }
    }
}

/// One call: a request frame in, a response frame out.
pub struct StreamHandler {
    send: SendStream,
    recv: RecvStream,
}

impl StreamHandler {
    pub async fn read_frame(&mut self) -> Result<Frame, ServerError> {
        Ok(read_frame(&mut self.recv).await?)
    }

    pub async fn write_frame(&mut self, frame: &Frame) -> Result<(), ServerError> {
        Ok(write_frame(&mut self.send, frame).await?)
    }

    /// Write `msg` as the response and close our half of the stream.
    pub async fn respond<M: Message>(&mut self, msg: &M) -> Result<(), ServerError> {
        self.write_frame(&Frame::response(msg)?).await?;
        self.finish()
    }

    /// Signal that no more data follows.
    pub fn finish(&mut self) -> Result<(), ServerError> {
        self.send.finish()?;
        Ok(())
    }

    /// Resolves when the peer abandons the stream (reset or connection loss).
    pub async fn peer_gone(&mut self) {
        let _ = self.send.stopped().await;
    }
}
