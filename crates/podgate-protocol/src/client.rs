// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! QUIC client side of the gateway RPC endpoint.
//!
//! A [`PodgateClient`] keeps one connection and opens a fresh bidirectional
//! stream per call. A dropped connection is re-established on the next call.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use quinn::{ClientConfig, Connection, Endpoint, TransportConfig};
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, info, instrument, warn};

use crate::frame::{Frame, FrameError, read_frame, write_frame};

/// Errors that can occur in the QUIC client
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("connection error: {0}")]
    Connection(#[from] quinn::ConnectionError),

    #[error("connect error: {0}")]
    Connect(#[from] quinn::ConnectError),

    #[error("frame error: {0}")]
    Frame(#[from] FrameError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("stream closed: {0}")]
    ClosedStream(#[from] quinn::ClosedStream),

    #[error("TLS error: {0}")]
    Tls(String),

    #[error("no connection established")]
    NotConnected,

    #[error("connection timed out after {0}ms")]
    Timeout(u64),
}

/// Client settings.
#[derive(Debug, Clone)]
pub struct PodgateClientConfig {
    pub server_addr: SocketAddr,
    /// Name checked against the server certificate.
    pub server_name: String,
    /// Accept any server certificate. Development only.
    pub dangerous_skip_cert_verification: bool,
    /// Extra PEM trust anchors, for gateways with a private CA or a pinned
    /// self-signed certificate.
    pub ca_pem: Option<Vec<u8>>,
    pub keep_alive: Option<Duration>,
    pub idle_timeout: Duration,
    pub connect_timeout: Duration,
}

impl Default for PodgateClientConfig {
    fn default() -> Self {
        Self {
            server_addr: SocketAddr::from(([127, 0, 0, 1], 3000)),
            server_name: "localhost".to_string(),
            dangerous_skip_cert_verification: false,
            ca_pem: None,
            keep_alive: Some(Duration::from_secs(10)),
            idle_timeout: Duration::from_secs(60),
            connect_timeout: Duration::from_secs(10),
        }
    }
}

/// Connection to one gateway.
pub struct PodgateClient {
    endpoint: Endpoint,
    connection: Mutex<Option<Connection>>,
    config: PodgateClientConfig,
}

impl PodgateClient {
    pub fn new(config: PodgateClientConfig) -> Result<Self, ClientError> {
        let bind: SocketAddr = if config.server_addr.is_ipv6() {
            (std::net::Ipv6Addr::UNSPECIFIED, 0).into()
        } else {
            (std::net::Ipv4Addr::UNSPECIFIED, 0).into()
        };
        let mut endpoint = Endpoint::client(bind)?;
        endpoint.set_default_client_config(client_config(&config)?);

        Ok(Self {
            endpoint,
            connection: Mutex::new(None),
            config,
        })
    }

    /// Client for a gateway on the default local port with a self-signed certificate.
    pub fn localhost() -> Result<Self, ClientError> {
        Self::new(PodgateClientConfig {
            dangerous_skip_cert_verification: true,
            ..Default::default()
        })
    }

    /// Establish the connection unless one is already open.
    #[instrument(skip(self), fields(addr = %self.config.server_addr))]
    pub async fn connect(&self) -> Result<(), ClientError> {
        self.connection().await.map(|_| ())
    }

    async fn connection(&self) -> Result<Connection, ClientError> {
        let mut slot = self.connection.lock().await;
        if let Some(conn) = slot.as_ref()
            && conn.close_reason().is_none()
        {
            return Ok(conn.clone());
        }

        debug!("opening connection to gateway");
        let connecting = self
            .endpoint
            .connect(self.config.server_addr, &self.config.server_name)?;
        let conn = tokio::time::timeout(self.config.connect_timeout, connecting)
            .await
            .map_err(|_| ClientError::Timeout(self.config.connect_timeout.as_millis() as u64))??;

        info!(addr = %self.config.server_addr, "connected to gateway");
        *slot = Some(conn.clone());
        Ok(conn)
    }

    /// Make one call on a fresh stream.
    #[instrument(skip_all)]
    pub async fn request<Req: prost::Message, Resp: prost::Message + Default>(
        &self,
        request: &Req,
    ) -> Result<Resp, ClientError> {
        let conn = self.connection().await?;
        let (mut send, mut recv) = conn.open_bi().await?;

        write_frame(&mut send, &Frame::request(request)?).await?;
        send.finish()?;

        let frame = read_frame(&mut recv).await?;
        Ok(frame.decode_response()?)
    }

    pub async fn close(&self) {
        if let Some(conn) = self.connection.lock().await.take() {
            conn.close(0u32.into(), b"client closing");
        }
    }

    pub async fn is_connected(&self) -> bool {
        self.connection
            .lock()
            .await
            .as_ref()
            .is_some_and(|conn| conn.close_reason().is_none())
    }
}

fn client_config(config: &PodgateClientConfig) -> Result<ClientConfig, ClientError> {
    let crypto = if config.dangerous_skip_cert_verification {
        rustls::ClientConfig::builder()
            .dangerous()
            .with_custom_certificate_verifier(Arc::new(AcceptAnyCertificate))
            .with_no_client_auth()
    } else {
        let mut roots = rustls::RootCertStore {
            roots: webpki_roots::TLS_SERVER_ROOTS.to_vec(),
        };
        if let Some(pem) = &config.ca_pem {
            add_trust_anchors(&mut roots, pem)?;
        }
        rustls::ClientConfig::builder()
            .with_root_certificates(roots)
            .with_no_client_auth()
    };

    let mut transport = TransportConfig::default();
    transport.keep_alive_interval(config.keep_alive);
    transport.max_idle_timeout(Some(
        config
            .idle_timeout
            .try_into()
            .map_err(|_| ClientError::Tls("idle timeout out of range".to_string()))?,
    ));

    let quic_crypto = quinn::crypto::rustls::QuicClientConfig::try_from(crypto)
        .map_err(|e| ClientError::Tls(e.to_string()))?;
    let mut client_config = ClientConfig::new(Arc::new(quic_crypto));
    client_config.transport_config(Arc::new(transport));
    Ok(client_config)
}

fn add_trust_anchors(roots: &mut rustls::RootCertStore, pem: &[u8]) -> Result<(), ClientError> {
    let certs = rustls_pemfile::certs(&mut &pem[..])
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| ClientError::Tls(format!("failed to parse CA certificates: {}", e)))?;
    let (added, ignored) = roots.add_parsable_certificates(certs);
    if ignored > 0 {
        warn!(ignored, "Skipped unusable CA certificates");
    }
    if added == 0 {
        return Err(ClientError::Tls("no CA certificate found".to_string()));
    }
    debug!(added, "Loaded CA certificates");
    Ok(())
}

/// Accepts whatever certificate the server presents.
#[derive(Debug)]
struct AcceptAnyCertificate;

impl rustls::client::danger::ServerCertVerifier for AcceptAnyCertificate {
    fn verify_server_cert(
        &self,
        _end_entity: &rustls::pki_types::CertificateDer<'_>,
        _intermediates: &[rustls::pki_types::CertificateDer<'_>],
        _server_name: &rustls::pki_types::ServerName<'_>,
        _ocsp_response: &[u8],
        _now: rustls::pki_types::UnixTime,
    ) -> Result<rustls::client::danger::ServerCertVerified, rustls::Error> {
        Ok(rustls::client::danger::ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        _message: &[u8],
        _cert: &rustls::pki_types::CertificateDer<'_>,
        _dss: &rustls::DigitallySignedStruct,
    ) -> Result<rustls::client::danger::HandshakeSignatureValid, rustls::Error> {
        Ok(rustls::client::danger::HandshakeSignatureValid::assertion())
    }

    fn verify_tls13_signature(
        &self,
        _message: &[u8],
        _cert: &rustls::pki_types::CertificateDer<'_>,
        _dss: &rustls::DigitallySignedStruct,
    ) -> Result<rustls::client::danger::HandshakeSignatureValid, rustls::Error> {
        Ok(rustls::client::danger::HandshakeSignatureValid::assertion())
    }

    fn supported_verify_schemes(&self) -> Vec<rustls::SignatureScheme> {
        rustls::crypto::ring::default_provider()
            .signature_verification_algorithms
            .supported_schemes()
    }
}
