// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Configuration for podgate-gateway.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use podgate_protocol::TlsIdentity;

use crate::control_plane::{ControlPlane, InMemoryControlPlane, KubeControlPlane, SERVICE_ACCOUNT_DIR};
use crate::policy::{DEFAULT_DENIED_CAPABILITIES, Policy};
use crate::retry::RetryPolicy;

/// Which control plane the gateway forwards to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlPlaneKind {
    /// Kubernetes REST API.
    Kube,
    /// In-process store (local development).
    Memory,
}

impl FromStr for ControlPlaneKind {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "kube" | "kubernetes" => Ok(ControlPlaneKind::Kube),
            "memory" | "in-memory" => Ok(ControlPlaneKind::Memory),
            _ => Err(()),
        }
    }
}

/// Gateway configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// HTTP listen address, `None` when disabled
    pub http_addr: Option<SocketAddr>,
    /// QUIC RPC listen address, `None` when disabled
    pub rpc_addr: Option<SocketAddr>,
    /// Per-call control-plane timeout
    pub call_timeout: Duration,
    /// Retry budget for transient faults
    pub retry: RetryPolicy,
    /// Capability deny-list
    pub policy: Policy,
    /// Control-plane backend
    pub control_plane: ControlPlaneKind,
    /// API server base URL
    pub cluster_url: String,
    /// File holding the API server bearer token
    pub cluster_token_file: Option<PathBuf>,
    /// PEM bundle used to verify the API server
    pub cluster_ca_file: Option<PathBuf>,
    /// Accept invalid API server certificates
    pub skip_cert_verification: bool,
    /// PEM certificate chain served on the RPC listener
    pub tls_cert_file: Option<PathBuf>,
    /// PEM private key for [`tls_cert_file`](Self::tls_cert_file)
    pub tls_key_file: Option<PathBuf>,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration through `lookup`, which maps a variable name to its value.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let http_addr = listen_addr("PODGATE_HTTP_ADDR", get("PODGATE_HTTP_ADDR"), "0.0.0.0:8080")?;
        let rpc_addr = listen_addr("PODGATE_RPC_ADDR", get("PODGATE_RPC_ADDR"), "0.0.0.0:3000")?;

        let call_timeout_ms: u64 = parse("PODGATE_CALL_TIMEOUT_MS", get("PODGATE_CALL_TIMEOUT_MS"), 10_000)?;
        if call_timeout_ms == 0 {
            return Err(ConfigError::invalid(
                "PODGATE_CALL_TIMEOUT_MS",
                "0",
                "must be greater than zero",
            ));
        }

        let defaults = RetryPolicy::default();
        let max_attempts: u32 = parse(
            "PODGATE_RETRY_MAX_ATTEMPTS",
            get("PODGATE_RETRY_MAX_ATTEMPTS"),
            defaults.max_attempts,
        )?;
        if max_attempts == 0 {
            return Err(ConfigError::invalid(
                "PODGATE_RETRY_MAX_ATTEMPTS",
                "0",
                "must be at least 1",
            ));
        }
        let base_ms: u64 = parse(
            "PODGATE_BACKOFF_BASE_MS",
            get("PODGATE_BACKOFF_BASE_MS"),
            defaults.base_delay.as_millis() as u64,
        )?;
        let max_ms: u64 = parse(
            "PODGATE_BACKOFF_MAX_MS",
            get("PODGATE_BACKOFF_MAX_MS"),
            defaults.max_delay.as_millis() as u64,
        )?;
        let jitter: f64 = parse("PODGATE_BACKOFF_JITTER", get("PODGATE_BACKOFF_JITTER"), defaults.jitter)?;
        if !(0.0..=1.0).contains(&jitter) {
            return Err(ConfigError::invalid(
                "PODGATE_BACKOFF_JITTER",
                jitter.to_string(),
                "must be between 0 and 1",
            ));
        }

        // An explicitly empty deny-list is allowed and means "deny nothing"
        let denied = lookup("PODGATE_DENIED_CAPABILITIES")
            .unwrap_or_else(|| DEFAULT_DENIED_CAPABILITIES.to_string());
        let policy = Policy::from_list(&denied).map_err(|e| {
            ConfigError::invalid("PODGATE_DENIED_CAPABILITIES", denied.clone(), e.to_string())
        })?;

        let control_plane = match get("PODGATE_CONTROL_PLANE") {
            Some(v) => v.parse().map_err(|_| {
                ConfigError::invalid("PODGATE_CONTROL_PLANE", v.clone(), "expected kube or memory")
            })?,
            None => ControlPlaneKind::Kube,
        };

        let cluster_url = get("PODGATE_CLUSTER_URL")
            .unwrap_or_else(|| "https://kubernetes.default.svc".to_string());
        let cluster_token_file = get("PODGATE_CLUSTER_TOKEN_FILE").map(PathBuf::from);
        let cluster_ca_file = get("PODGATE_CLUSTER_CA_FILE").map(PathBuf::from);

        let skip_cert_verification = get("PODGATE_SKIP_CERT_VERIFICATION")
            .map(|v| v == "true" || v == "1")
            .unwrap_or(false);

        let tls_cert_file = get("PODGATE_TLS_CERT_FILE").map(PathBuf::from);
        let tls_key_file = get("PODGATE_TLS_KEY_FILE").map(PathBuf::from);
        match (&tls_cert_file, &tls_key_file) {
            (Some(cert), None) => {
                return Err(ConfigError::invalid(
                    "PODGATE_TLS_CERT_FILE",
                    cert.display().to_string(),
                    "PODGATE_TLS_KEY_FILE must be set as well",
                ));
            }
            (None, Some(key)) => {
                return Err(ConfigError::invalid(
                    "PODGATE_TLS_KEY_FILE",
                    key.display().to_string(),
                    "PODGATE_TLS_CERT_FILE must be set as well",
                ));
            }
            _ => {}
        }

        Ok(Self {
            http_addr,
            rpc_addr,
            call_timeout: Duration::from_millis(call_timeout_ms),
            retry: RetryPolicy {
                max_attempts,
                base_delay: Duration::from_millis(base_ms),
                max_delay: Duration::from_millis(max_ms),
                jitter,
            },
            policy,
            control_plane,
            cluster_url,
            cluster_token_file,
            cluster_ca_file,
            skip_cert_verification,
            tls_cert_file,
            tls_key_file,
        })
    }

    /// Build the configured control plane.
    ///
    /// Without an explicit token or CA file, the service-account files the
    /// kubelet mounts into the pod are used when present.
    pub fn build_control_plane(&self) -> crate::Result<Arc<dyn ControlPlane>> {
        self.build_control_plane_in(Path::new(SERVICE_ACCOUNT_DIR))
    }

    fn build_control_plane_in(
        &self,
        service_account_dir: &Path,
    ) -> crate::Result<Arc<dyn ControlPlane>> {
        if self.control_plane == ControlPlaneKind::Memory {
            return Ok(Arc::new(InMemoryControlPlane::new()));
        }

        let mounted = |name: &str| {
            let path = service_account_dir.join(name);
            path.is_file().then_some(path)
        };
        let mut builder = KubeControlPlane::builder(&self.cluster_url)
            .skip_cert_verification(self.skip_cert_verification);
        if let Some(path) = self.cluster_token_file.clone().or_else(|| mounted("token")) {
            builder = builder.token_file(&path)?;
        }
        if let Some(path) = self.cluster_ca_file.clone().or_else(|| mounted("ca.crt")) {
            builder = builder.ca_file(&path)?;
        }
        Ok(Arc::new(builder.build()?))
    }

    /// Certificate for the RPC listener: the configured PEM files, or a
    /// self-signed one for `localhost` when none are set.
    pub fn tls_identity(&self) -> crate::Result<TlsIdentity> {
        let (Some(cert), Some(key)) = (&self.tls_cert_file, &self.tls_key_file) else {
            return Ok(TlsIdentity::SelfSigned);
        };
        let read = |path: &PathBuf| {
            std::fs::read(path).map_err(|e| {
                crate::Error::Other(format!("failed to read {}: {}", path.display(), e))
            })
        };
        Ok(TlsIdentity::Pem {
            cert: read(cert)?,
            key: read(key)?,
        })
    }
}

fn listen_addr(
    var: &'static str,
    value: Option<String>,
    default: &str,
) -> Result<Option<SocketAddr>, ConfigError> {
    let value = value.unwrap_or_else(|| default.to_string());
    if value.trim().eq_ignore_ascii_case("off") {
        return Ok(None);
    }
    value
        .trim()
        .parse()
        .map(Some)
        .map_err(|_| ConfigError::invalid(var, value.clone(), "expected host:port or off"))
}

fn parse<T: FromStr>(var: &'static str, value: Option<String>, default: T) -> Result<T, ConfigError> {
    match value {
        Some(v) => v
            .trim()
            .parse()
            .map_err(|_| ConfigError::invalid(var, v.clone(), "not a valid number")),
        None => Ok(default),
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// A variable holds a value that cannot be used.
    #[error("Invalid value {value:?} for {var}: {reason}")]
    InvalidValue {
        /// Variable name.
        var: &'static str,
        /// Offending value.
        value: String,
        /// What was expected.
        reason: String,
    },
}

impl ConfigError {
    fn invalid(var: &'static str, value: impl Into<String>, reason: impl Into<String>) -> Self {
        ConfigError::InvalidValue {
            var,
            value: value.into(),
            reason: reason.into(),
        }
    }
}
