// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Public types for the gateway SDK.

use std::time::Duration;

use podgate_protocol::gateway_proto;
use serde::{Deserialize, Serialize};

/// Health status of the gateway.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthStatus {
    /// Whether the gateway is healthy.
    pub healthy: bool,
    /// Gateway version.
    pub version: String,
    /// Uptime in milliseconds.
    pub uptime_ms: i64,
    /// Control-plane backend the gateway forwards to.
    pub control_plane: String,
}

/// Options for submitting a workload.
#[derive(Debug, Clone)]
pub struct CreateWorkloadOptions {
    /// Workload document (YAML or JSON).
    pub document: String,
    /// Target namespace. When unset the document's namespace is used.
    pub namespace: Option<String>,
    /// Idempotency token. Retries with the same token never create twice.
    pub idempotency_token: Option<String>,
    /// Per-call control-plane timeout the gateway should apply.
    pub timeout: Option<Duration>,
}

impl CreateWorkloadOptions {
    /// Create options for a workload document.
    pub fn new(document: impl Into<String>) -> Self {
        Self {
            document: document.into(),
            namespace: None,
            idempotency_token: None,
            timeout: None,
        }
    }

    /// Set the target namespace.
    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = Some(namespace.into());
        self
    }

    /// Set the idempotency token.
    pub fn with_idempotency_token(mut self, token: impl Into<String>) -> Self {
        self.idempotency_token = Some(token.into());
        self
    }

    /// Set the per-call control-plane timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

/// Terminal outcome of a workload submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    /// Created by this request.
    Created,
    /// Replay of an earlier identical request.
    AlreadyExists,
    /// Name taken by a different object or request.
    Rejected,
    /// Gateway gave up on transient control-plane faults.
    Transient,
    /// Control plane refused the request.
    Fatal,
    /// Document failed validation.
    Invalid,
    /// Outcome not recognized by this SDK version.
    Unknown,
}

impl From<i32> for Outcome {
    fn from(value: i32) -> Self {
        match gateway_proto::Outcome::try_from(value) {
            Ok(gateway_proto::Outcome::Created) => Outcome::Created,
            Ok(gateway_proto::Outcome::AlreadyExists) => Outcome::AlreadyExists,
            Ok(gateway_proto::Outcome::Rejected) => Outcome::Rejected,
            Ok(gateway_proto::Outcome::Transient) => Outcome::Transient,
            Ok(gateway_proto::Outcome::Fatal) => Outcome::Fatal,
            Ok(gateway_proto::Outcome::Invalid) => Outcome::Invalid,
            Ok(gateway_proto::Outcome::Unspecified) | Err(_) => Outcome::Unknown,
        }
    }
}

/// Why a submission failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Document is not well-formed.
    ParseError,
    /// Document is missing or has malformed fields.
    SchemaError,
    /// Document requests a denied capability.
    PolicyError,
    /// Name conflict.
    Rejected,
    /// Retryable control-plane fault.
    Transient,
    /// Non-retryable control-plane failure.
    Fatal,
}

impl ErrorKind {
    fn from_proto(value: i32) -> Option<Self> {
        match gateway_proto::ErrorKind::try_from(value).ok()? {
            gateway_proto::ErrorKind::Unspecified => None,
            gateway_proto::ErrorKind::ParseError => Some(ErrorKind::ParseError),
            gateway_proto::ErrorKind::SchemaError => Some(ErrorKind::SchemaError),
            gateway_proto::ErrorKind::PolicyError => Some(ErrorKind::PolicyError),
            gateway_proto::ErrorKind::Rejected => Some(ErrorKind::Rejected),
            gateway_proto::ErrorKind::Transient => Some(ErrorKind::Transient),
            gateway_proto::ErrorKind::Fatal => Some(ErrorKind::Fatal),
        }
    }
}

/// Result of a workload submission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkloadOutcome {
    /// `true` for created and already-existing objects.
    pub success: bool,
    /// Terminal outcome.
    pub outcome: Outcome,
    /// `Kind/namespace/name` of the stored object.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub object_identity: Option<String>,
    /// Error kind, on failure.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<ErrorKind>,
    /// Error message, on failure.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

impl WorkloadOutcome {
    /// Whether resubmitting the same request later may succeed.
    pub fn is_retryable(&self) -> bool {
        self.outcome == Outcome::Transient
    }
}

impl From<gateway_proto::CreateWorkloadResponse> for WorkloadOutcome {
    fn from(resp: gateway_proto::CreateWorkloadResponse) -> Self {
        Self {
            success: resp.success,
            outcome: Outcome::from(resp.outcome),
            object_identity: resp.object_identity,
            error_kind: ErrorKind::from_proto(resp.error_kind),
            error_message: resp.error_message,
        }
    }
}
