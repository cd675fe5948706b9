// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Embeddable runtime for podgate-gateway.
//!
//! [`GatewayRuntime`] wires a control plane into a [`Gateway`] and serves it
//! over HTTP and QUIC. Either listener can be disabled.
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use podgate_gateway::control_plane::InMemoryControlPlane;
//! use podgate_gateway::runtime::GatewayRuntime;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let runtime = GatewayRuntime::builder()
//!         .control_plane(Arc::new(InMemoryControlPlane::new()))
//!         .http_addr("127.0.0.1:8080".parse()?)
//!         .disable_rpc()
//!         .build()?
//!         .start()
//!         .await?;
//!
//!     // ... serve traffic ...
//!
//!     runtime.shutdown().await?;
//!     Ok(())
//! }
//! ```

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use podgate_protocol::{PodgateServer, PodgateServerConfig, TlsIdentity};
use tokio::net::TcpListener;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{error, info};

use crate::config::Config;
use crate::control_plane::ControlPlane;
use crate::facade::Gateway;
use crate::forwarder::DEFAULT_CALL_TIMEOUT;
use crate::policy::Policy;
use crate::retry::RetryPolicy;

/// Builder for creating a [`GatewayRuntime`].
pub struct GatewayRuntimeBuilder {
    control_plane: Option<Arc<dyn ControlPlane>>,
    policy: Policy,
    retry: RetryPolicy,
    call_timeout: Duration,
    http_addr: Option<SocketAddr>,
    rpc_addr: Option<SocketAddr>,
    tls_identity: TlsIdentity,
}

impl Default for GatewayRuntimeBuilder {
    fn default() -> Self {
        Self {
            control_plane: None,
            policy: Policy::default(),
            retry: RetryPolicy::default(),
            call_timeout: DEFAULT_CALL_TIMEOUT,
            http_addr: Some(SocketAddr::from(([0, 0, 0, 0], 8080))),
            rpc_addr: Some(SocketAddr::from(([0, 0, 0, 0], 3000))),
            tls_identity: TlsIdentity::SelfSigned,
        }
    }
}

impl GatewayRuntimeBuilder {
    /// Create a new builder with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Take policy, retry, timeout and listener settings from `config`.
    ///
    /// The control plane and, when configured, the RPC certificate still
    /// have to be supplied.
    pub fn from_config(config: &Config) -> Self {
        Self {
            control_plane: None,
            policy: config.policy.clone(),
            retry: config.retry,
            call_timeout: config.call_timeout,
            http_addr: config.http_addr,
            rpc_addr: config.rpc_addr,
            tls_identity: TlsIdentity::SelfSigned,
        }
    }

    /// Set the control plane (required).
    pub fn control_plane(mut self, control_plane: Arc<dyn ControlPlane>) -> Self {
        self.control_plane = Some(control_plane);
        self
    }

    /// Set the capability policy.
    pub fn policy(mut self, policy: Policy) -> Self {
        self.policy = policy;
        self
    }

    /// Set the retry policy for transient control-plane faults.
    pub fn retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Set the default per-call control-plane timeout.
    pub fn call_timeout(mut self, timeout: Duration) -> Self {
        self.call_timeout = timeout;
        self
    }

    /// Serve HTTP on `addr`. Port 0 picks a free port.
    pub fn http_addr(mut self, addr: SocketAddr) -> Self {
        self.http_addr = Some(addr);
        self
    }

    /// Do not start the HTTP listener.
    pub fn disable_http(mut self) -> Self {
        self.http_addr = None;
        self
    }

    /// Serve QUIC RPC on `addr`. Port 0 picks a free port.
    pub fn rpc_addr(mut self, addr: SocketAddr) -> Self {
        self.rpc_addr = Some(addr);
        self
    }

    /// Do not start the QUIC listener.
    pub fn disable_rpc(mut self) -> Self {
        self.rpc_addr = None;
        self
    }

    /// Certificate presented on the QUIC listener. Defaults to a
    /// self-signed certificate for `localhost`.
    pub fn tls_identity(mut self, identity: TlsIdentity) -> Self {
        self.tls_identity = identity;
        self
    }

    /// Build the runtime configuration.
    ///
    /// Returns an error if no control plane was set.
    pub fn build(self) -> Result<GatewayRuntimeConfig> {
        let control_plane = self
            .control_plane
            .ok_or_else(|| anyhow::anyhow!("control_plane is required"))?;
        if self.call_timeout.is_zero() {
            anyhow::bail!("call_timeout must be greater than zero");
        }

        Ok(GatewayRuntimeConfig {
            control_plane,
            policy: self.policy,
            retry: self.retry,
            call_timeout: self.call_timeout,
            http_addr: self.http_addr,
            rpc_addr: self.rpc_addr,
            tls_identity: self.tls_identity,
        })
    }
}

/// Configuration for a [`GatewayRuntime`].
pub struct GatewayRuntimeConfig {
    control_plane: Arc<dyn ControlPlane>,
    policy: Policy,
    retry: RetryPolicy,
    call_timeout: Duration,
    http_addr: Option<SocketAddr>,
    rpc_addr: Option<SocketAddr>,
    tls_identity: TlsIdentity,
}

impl GatewayRuntimeConfig {
    /// Bind the enabled listeners and start serving.
    pub async fn start(self) -> Result<GatewayRuntime> {
        let gateway = Arc::new(Gateway::new(
            self.control_plane,
            self.policy,
            self.retry,
            self.call_timeout,
        ));
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let (http_handle, http_addr) = match self.http_addr {
            Some(addr) => {
                let listener = TcpListener::bind(addr)
                    .await
                    .map_err(|e| anyhow::anyhow!("failed to bind HTTP listener to {}: {}", addr, e))?;
                let bound = listener.local_addr()?;
                let handle = tokio::spawn(crate::http::run_http_server_with_shutdown(
                    listener,
                    gateway.clone(),
                    shutdown_rx.clone(),
                ));
                (Some(handle), Some(bound))
            }
            None => (None, None),
        };

        let (rpc_handle, rpc_addr) = match self.rpc_addr {
            Some(addr) => {
                let server = PodgateServer::bind(PodgateServerConfig {
                    identity: self.tls_identity,
                    ..PodgateServerConfig::new(addr)
                })?;
                let bound = server.local_addr()?;
                let handle = tokio::spawn(crate::server::run_rpc_server_with_shutdown(
                    server,
                    gateway.clone(),
                    shutdown_rx.clone(),
                ));
                (Some(handle), Some(bound))
            }
            None => (None, None),
        };

        info!(
            http_addr = ?http_addr,
            rpc_addr = ?rpc_addr,
            control_plane = gateway.control_plane_name(),
            "GatewayRuntime started"
        );

        Ok(GatewayRuntime {
            http_handle,
            rpc_handle,
            shutdown_tx,
            gateway,
            http_addr,
            rpc_addr,
        })
    }
}

/// A running gateway that can be embedded in an application.
///
/// Call [`shutdown`](Self::shutdown) for graceful termination.
pub struct GatewayRuntime {
    http_handle: Option<JoinHandle<Result<()>>>,
    rpc_handle: Option<JoinHandle<Result<()>>>,
    shutdown_tx: watch::Sender<bool>,
    gateway: Arc<Gateway>,
    http_addr: Option<SocketAddr>,
    rpc_addr: Option<SocketAddr>,
}

impl GatewayRuntime {
    /// Create a new builder for configuring the runtime.
    pub fn builder() -> GatewayRuntimeBuilder {
        GatewayRuntimeBuilder::new()
    }

    /// Bound HTTP address, `None` when HTTP is disabled.
    pub fn http_addr(&self) -> Option<SocketAddr> {
        self.http_addr
    }

    /// Bound QUIC address, `None` when RPC is disabled.
    pub fn rpc_addr(&self) -> Option<SocketAddr> {
        self.rpc_addr
    }

    /// The shared gateway.
    pub fn gateway(&self) -> &Arc<Gateway> {
        &self.gateway
    }

    /// Gracefully shut down both listeners and wait for them.
    pub async fn shutdown(self) -> Result<()> {
        info!("GatewayRuntime shutting down...");

        let _ = self.shutdown_tx.send(true);

        let mut result = Ok(());
        for (name, handle) in [("HTTP", self.http_handle), ("RPC", self.rpc_handle)] {
            let Some(handle) = handle else {
                continue;
            };
            match handle.await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    error!("{} server error during shutdown: {}", name, e);
                    result = Err(e);
                }
                Err(e) => {
                    error!("{} server task panicked: {}", name, e);
                    result = Err(anyhow::anyhow!("{} server task panicked: {}", name, e));
                }
            }
        }

        if result.is_ok() {
            info!("GatewayRuntime shutdown complete");
        }
        result
    }

    /// Check if every enabled listener is still running.
    pub fn is_running(&self) -> bool {
        self.http_handle.as_ref().is_none_or(|h| !h.is_finished())
            && self.rpc_handle.as_ref().is_none_or(|h| !h.is_finished())
    }
}
