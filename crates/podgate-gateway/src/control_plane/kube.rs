// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Kubernetes REST control plane.

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, RETRY_AFTER};
use reqwest::{Client, StatusCode};
use serde_json::Value;
use tracing::{debug, instrument, warn};

use super::{ControlPlane, ObjectIdentity, RemoteError};
use crate::error::{Error, Result};

/// Where the kubelet mounts the pod's service-account token and cluster CA.
pub const SERVICE_ACCOUNT_DIR: &str = "/var/run/secrets/kubernetes.io/serviceaccount";

/// Control plane backed by the Kubernetes API server.
#[derive(Debug, Clone)]
pub struct KubeControlPlane {
    client: Client,
    base_url: String,
    token: Option<String>,
}

/// Builder for [`KubeControlPlane`].
#[derive(Debug, Default)]
pub struct KubeControlPlaneBuilder {
    base_url: String,
    token: Option<String>,
    ca_pem: Option<Vec<u8>>,
    skip_cert_verification: bool,
}

impl KubeControlPlaneBuilder {
    /// Bearer token sent with every request.
    pub fn token(mut self, token: Option<String>) -> Self {
        self.token = token.map(|t| t.trim().to_string()).filter(|t| !t.is_empty());
        self
    }

    /// Read the bearer token from `path`.
    pub fn token_file(self, path: &Path) -> Result<Self> {
        let token = read_file(path, "token")?;
        Ok(self.token(Some(String::from_utf8_lossy(&token).into_owned())))
    }

    /// Trust the PEM certificates in `pem` for the API server.
    pub fn ca_pem(mut self, pem: Vec<u8>) -> Self {
        self.ca_pem = Some(pem);
        self
    }

    /// Trust the PEM certificates in `path` for the API server.
    pub fn ca_file(self, path: &Path) -> Result<Self> {
        let pem = read_file(path, "CA")?;
        Ok(self.ca_pem(pem))
    }

    /// Accept any API server certificate. Development only.
    pub fn skip_cert_verification(mut self, skip: bool) -> Self {
        self.skip_cert_verification = skip;
        self
    }

    /// Build the HTTP client.
    pub fn build(self) -> Result<KubeControlPlane> {
        let mut builder = Client::builder().connect_timeout(Duration::from_secs(5));

        if let Some(pem) = &self.ca_pem {
            // reqwest's rustls backend silently skips text that holds no certificate.
            if !String::from_utf8_lossy(pem).contains("-----BEGIN CERTIFICATE-----") {
                return Err(Error::Other("no certificate found in cluster CA".to_string()));
            }
            builder = builder.add_root_certificate(reqwest::Certificate::from_pem(pem)?);
        }
        if self.skip_cert_verification {
            warn!("API server certificate verification disabled");
            builder = builder.danger_accept_invalid_certs(true);
        }

        Ok(KubeControlPlane {
            client: builder.build()?,
            base_url: self.base_url.trim_end_matches('/').to_string(),
            token: self.token,
        })
    }
}

fn read_file(path: &Path, what: &str) -> Result<Vec<u8>> {
    std::fs::read(path).map_err(|e| {
        Error::Other(format!(
            "failed to read {} file {}: {}",
            what,
            path.display(),
            e
        ))
    })
}

impl KubeControlPlane {
    /// Start building a client for the API server at `base_url`.
    pub fn builder(base_url: impl Into<String>) -> KubeControlPlaneBuilder {
        KubeControlPlaneBuilder {
            base_url: base_url.into(),
            ..Default::default()
        }
    }

    /// Create a client for the API server at `base_url` trusting only the
    /// public roots.
    pub fn new(
        base_url: impl Into<String>,
        token: Option<String>,
        skip_cert_verification: bool,
    ) -> Result<Self> {
        Self::builder(base_url)
            .token(token)
            .skip_cert_verification(skip_cert_verification)
            .build()
    }

    /// API server base URL.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn collection_url(&self, namespace: &str, kind: &str) -> std::result::Result<String, RemoteError> {
        let resource = resource_for_kind(kind)?;
        Ok(format!(
            "{}/api/v1/namespaces/{}/{}",
            self.base_url, namespace, resource
        ))
    }

    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }
}

fn resource_for_kind(kind: &str) -> std::result::Result<&'static str, RemoteError> {
    match kind {
        "Pod" => Ok("pods"),
        other => Err(RemoteError::Invalid(format!("unsupported kind: {}", other))),
    }
}

/// Map a transport failure onto the remote error taxonomy.
fn transport_error(err: reqwest::Error) -> RemoteError {
    if err.is_timeout() || err.is_connect() || err.is_request() {
        RemoteError::Unavailable(err.to_string())
    } else {
        RemoteError::Unknown(err.to_string())
    }
}

/// Map a non-success API response onto the remote error taxonomy.
fn classify(status: StatusCode, headers: &HeaderMap, body: &[u8]) -> RemoteError {
    let message = status_message(body).unwrap_or_else(|| {
        status
            .canonical_reason()
            .unwrap_or("no reason given")
            .to_string()
    });

    match status.as_u16() {
        409 => RemoteError::AlreadyExists,
        429 => RemoteError::Throttled {
            retry_after: retry_after(headers),
        },
        401 | 403 => RemoteError::Unauthorized(message),
        400 | 422 => RemoteError::Invalid(message),
        500 | 502 | 503 | 504 => {
            RemoteError::Unavailable(format!("{}: {}", status.as_u16(), message))
        }
        _ => RemoteError::Unknown(format!("{}: {}", status.as_u16(), message)),
    }
}

/// `message` field of a Kubernetes `Status` body.
fn status_message(body: &[u8]) -> Option<String> {
    let status: Value = serde_json::from_slice(body).ok()?;
    status
        .get("message")
        .and_then(Value::as_str)
        .filter(|m| !m.is_empty())
        .map(str::to_string)
}

/// `Retry-After` in delta-seconds form.
fn retry_after(headers: &HeaderMap) -> Option<Duration> {
    headers
        .get(RETRY_AFTER)?
        .to_str()
        .ok()?
        .trim()
        .parse::<u64>()
        .ok()
        .map(Duration::from_secs)
}

fn identity_from(object: &Value, namespace: &str, kind: &str) -> Option<ObjectIdentity> {
    let metadata = object.get("metadata")?;
    let name = metadata.get("name")?.as_str()?;
    let namespace = metadata
        .get("namespace")
        .and_then(Value::as_str)
        .unwrap_or(namespace);
    let identity = ObjectIdentity::new(namespace, kind, name);
    Some(match metadata.get("uid").and_then(Value::as_str) {
        Some(uid) => identity.with_uid(uid),
        None => identity,
    })
}

#[async_trait]
impl ControlPlane for KubeControlPlane {
    fn name(&self) -> &'static str {
        "kubernetes"
    }

    #[instrument(skip(self, object), fields(url = %self.base_url))]
    async fn create_object(
        &self,
        namespace: &str,
        kind: &str,
        object: &Value,
    ) -> std::result::Result<ObjectIdentity, RemoteError> {
        let url = self.collection_url(namespace, kind)?;
        let response = self
            .authorize(self.client.post(&url))
            .json(object)
            .send()
            .await
            .map_err(transport_error)?;

        let status = response.status();
        let headers = response.headers().clone();
        let body = response.bytes().await.map_err(transport_error)?;

        if !status.is_success() {
            let err = classify(status, &headers, &body);
            debug!(status = status.as_u16(), error = %err, "create rejected");
            return Err(err);
        }

        let created: Value = serde_json::from_slice(&body).unwrap_or(Value::Null);
        identity_from(&created, namespace, kind)
            .or_else(|| identity_from(object, namespace, kind))
            .ok_or_else(|| RemoteError::Unknown("created object has no name".to_string()))
    }

    #[instrument(skip(self), fields(url = %self.base_url))]
    async fn get_object(
        &self,
        namespace: &str,
        kind: &str,
        name: &str,
    ) -> std::result::Result<Option<Value>, RemoteError> {
        let url = format!("{}/{}", self.collection_url(namespace, kind)?, name);
        let response = self
            .authorize(self.client.get(&url))
            .send()
            .await
            .map_err(transport_error)?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let headers = response.headers().clone();
        let body = response.bytes().await.map_err(transport_error)?;

        if !status.is_success() {
            return Err(classify(status, &headers, &body));
        }

        serde_json::from_slice(&body)
            .map(Some)
            .map_err(|e| RemoteError::Unknown(format!("malformed object body: {}", e)))
    }
}
