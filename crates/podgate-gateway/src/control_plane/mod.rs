// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Control-plane clients.
//!
//! The forwarder talks to the cluster only through the [`ControlPlane`]
//! trait. Two implementations ship with the gateway:
//!
//! - [`KubeControlPlane`]: Kubernetes REST API over HTTPS
//! - [`InMemoryControlPlane`]: in-process object store with fault injection

mod kube;
mod memory;

pub use kube::{KubeControlPlane, KubeControlPlaneBuilder, SERVICE_ACCOUNT_DIR};
pub use memory::{Fault, InMemoryControlPlane};

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// Identity of an object stored by the control plane.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ObjectIdentity {
    /// Object namespace.
    pub namespace: String,
    /// Object kind, e.g. `Pod`.
    pub kind: String,
    /// Object name.
    pub name: String,
    /// Server-assigned uid, when known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uid: Option<String>,
}

impl ObjectIdentity {
    /// Create an identity without a uid.
    pub fn new(
        namespace: impl Into<String>,
        kind: impl Into<String>,
        name: impl Into<String>,
    ) -> Self {
        Self {
            namespace: namespace.into(),
            kind: kind.into(),
            name: name.into(),
            uid: None,
        }
    }

    /// Attach a uid.
    pub fn with_uid(mut self, uid: impl Into<String>) -> Self {
        self.uid = Some(uid.into());
        self
    }
}

/// Renders as `Kind/namespace/name`.
impl fmt::Display for ObjectIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.kind, self.namespace, self.name)
    }
}

/// Errors returned by a control plane.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[non_exhaustive]
pub enum RemoteError {
    /// An object with the same identity already exists.
    #[error("object already exists")]
    AlreadyExists,

    /// The control plane asked us to slow down.
    #[error("throttled by control plane")]
    Throttled {
        /// Server-suggested wait before retrying.
        retry_after: Option<Duration>,
    },

    /// Credentials were missing, invalid or insufficient.
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    /// The control plane refused the object as invalid.
    #[error("invalid object: {0}")]
    Invalid(String),

    /// The control plane could not be reached or reported a server-side fault.
    #[error("control plane unavailable: {0}")]
    Unavailable(String),

    /// Any other failure.
    #[error("unexpected control plane error: {0}")]
    Unknown(String),
}

impl RemoteError {
    /// Whether retrying the same call may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            RemoteError::Throttled { .. } | RemoteError::Unavailable(_)
        )
    }

    /// Server-suggested retry delay, if any.
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            RemoteError::Throttled { retry_after } => *retry_after,
            _ => None,
        }
    }
}

/// The outbound collaborator that stores objects.
///
/// Implementations must be safe to share across tasks. A dropped future must
/// abandon the in-flight call.
#[async_trait]
pub trait ControlPlane: Send + Sync {
    /// Short backend name for logs and health reports.
    fn name(&self) -> &'static str;

    /// Create `object` in `namespace`. Fails with [`RemoteError::AlreadyExists`]
    /// when an object with the same name is already stored.
    async fn create_object(
        &self,
        namespace: &str,
        kind: &str,
        object: &Value,
    ) -> Result<ObjectIdentity, RemoteError>;

    /// Fetch an object, `None` when it does not exist.
    async fn get_object(
        &self,
        namespace: &str,
        kind: &str,
        name: &str,
    ) -> Result<Option<Value>, RemoteError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identity_display() {
        let id = ObjectIdentity::new("default", "Pod", "web-1").with_uid("abc");
        assert_eq!(id.to_string(), "Pod/default/web-1");
    }

    #[test]
    fn test_transient_classification() {
        assert!(RemoteError::Throttled { retry_after: None }.is_transient());
        assert!(RemoteError::Unavailable("503".into()).is_transient());
        assert!(!RemoteError::AlreadyExists.is_transient());
        assert!(!RemoteError::Unauthorized("no token".into()).is_transient());
        assert!(!RemoteError::Invalid("bad".into()).is_transient());
        assert!(!RemoteError::Unknown("418".into()).is_transient());
    }

    #[test]
    fn test_retry_after() {
        let err = RemoteError::Throttled {
            retry_after: Some(Duration::from_secs(2)),
        };
        assert_eq!(err.retry_after(), Some(Duration::from_secs(2)));
        assert_eq!(RemoteError::Unavailable("x".into()).retry_after(), None);
    }
}
