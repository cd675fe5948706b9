// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Configuration for the gateway SDK.

use std::net::SocketAddr;
use std::time::Duration;

use crate::error::{Result, SdkError};

/// Where the gateway is and how long to wait for it.
#[derive(Debug, Clone)]
pub struct SdkConfig {
    /// Gateway RPC address.
    pub server_addr: SocketAddr,
    /// Name checked against the gateway certificate.
    pub server_name: String,
    /// Accept any gateway certificate. Development only.
    pub skip_cert_verification: bool,
    /// PEM certificates to trust in addition to the public roots.
    pub ca_cert_pem: Option<Vec<u8>>,
    pub connect_timeout: Duration,
    /// Upper bound on one call, including the gateway's own retries.
    pub request_timeout: Duration,
}

impl Default for SdkConfig {
    fn default() -> Self {
        Self {
            server_addr: SocketAddr::from(([127, 0, 0, 1], 3000)),
            server_name: "localhost".to_string(),
            skip_cert_verification: false,
            ca_cert_pem: None,
            connect_timeout: Duration::from_secs(10),
            request_timeout: Duration::from_secs(60),
        }
    }
}

impl SdkConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Defaults plus certificate verification skipping, for a gateway running
    /// locally with its self-signed certificate.
    pub fn localhost() -> Self {
        Self {
            skip_cert_verification: true,
            ..Self::default()
        }
    }

    /// Read overrides from the process environment.
    ///
    /// | Variable | Default |
    /// |----------|---------|
    /// | `PODGATE_RPC_ADDR` | `127.0.0.1:3000` |
    /// | `PODGATE_SERVER_NAME` | `localhost` |
    /// | `PODGATE_SKIP_CERT_VERIFICATION` | `false` |
    /// | `PODGATE_CA_CERT_FILE` | unset |
    /// | `PODGATE_CONNECT_TIMEOUT_MS` | `10000` |
    /// | `PODGATE_REQUEST_TIMEOUT_MS` | `60000` |
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Like [`from_env`](Self::from_env) with an explicit variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let mut config = Self::default();

        if let Some(addr) = get("PODGATE_RPC_ADDR") {
            config.server_addr = addr
                .trim()
                .parse()
                .map_err(|e| SdkError::Config(format!("invalid PODGATE_RPC_ADDR {:?}: {}", addr, e)))?;
        }
        if let Some(name) = get("PODGATE_SERVER_NAME") {
            config.server_name = name.trim().to_string();
        }
        if let Some(flag) = get("PODGATE_SKIP_CERT_VERIFICATION") {
            config.skip_cert_verification =
                matches!(flag.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes");
        }
        if let Some(path) = get("PODGATE_CA_CERT_FILE") {
            let path = path.trim();
            let pem = std::fs::read(path).map_err(|e| {
                SdkError::Config(format!("failed to read PODGATE_CA_CERT_FILE {:?}: {}", path, e))
            })?;
            config.ca_cert_pem = Some(pem);
        }
        if let Some(ms) = get("PODGATE_CONNECT_TIMEOUT_MS") {
            config.connect_timeout = parse_millis("PODGATE_CONNECT_TIMEOUT_MS", &ms)?;
        }
        if let Some(ms) = get("PODGATE_REQUEST_TIMEOUT_MS") {
            config.request_timeout = parse_millis("PODGATE_REQUEST_TIMEOUT_MS", &ms)?;
        }

        Ok(config)
    }

    pub fn with_server_addr(mut self, addr: SocketAddr) -> Self {
        self.server_addr = addr;
        self
    }

    pub fn with_server_name(mut self, name: impl Into<String>) -> Self {
        self.server_name = name.into();
        self
    }

    pub fn with_skip_cert_verification(mut self, skip: bool) -> Self {
        self.skip_cert_verification = skip;
        self
    }

    /// Trust the PEM certificates in `pem`, e.g. the gateway's own certificate.
    pub fn with_ca_cert_pem(mut self, pem: impl Into<Vec<u8>>) -> Self {
        self.ca_cert_pem = Some(pem.into());
        self
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }
}

fn parse_millis(var: &str, value: &str) -> Result<Duration> {
    match value.trim().parse::<u64>() {
        Ok(ms) if ms > 0 => Ok(Duration::from_millis(ms)),
        _ => Err(SdkError::Config(format!(
            "invalid {}: expected a positive number of milliseconds, got {:?}",
            var, value
        ))),
    }
}
