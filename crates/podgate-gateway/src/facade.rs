// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Gateway facade.
//!
//! [`Gateway::handle`] is the single entry point used by both transport
//! adapters. Each request moves through
//! `received → validating → keying → forwarding → responded`; a validation
//! failure skips straight to `responded` without touching the control plane.

use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument};

use crate::control_plane::ControlPlane;
use crate::forwarder::{AdmissionResult, Forwarder};
use crate::keyer;
use crate::policy::Policy;
use crate::retry::RetryPolicy;
use crate::workload::{ValidationError, WorkloadRequest, validate};

/// Terminal outcome reported to callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    /// Object created by this request.
    Created,
    /// Idempotent replay of an earlier request.
    AlreadyExists,
    /// Name taken by a different object or request.
    Rejected,
    /// Control plane kept failing transiently; safe to retry.
    Transient,
    /// Control plane refused the request.
    Fatal,
    /// The request failed validation.
    Invalid,
}

/// Machine-readable error kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Document is not well-formed.
    ParseError,
    /// Document is well-formed but structurally wrong.
    SchemaError,
    /// Document requests a denied capability.
    PolicyError,
    /// Name conflict with a different object or request.
    Rejected,
    /// Retry budget exhausted on transient faults.
    Transient,
    /// Non-retryable control-plane failure.
    Fatal,
}

/// Uniform response returned by [`Gateway::handle`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResponseEnvelope {
    /// `true` for `created` and `already_exists`.
    pub success: bool,
    /// Terminal outcome.
    pub outcome: Outcome,
    /// `Kind/namespace/name` of the stored object, on success.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub object_identity: Option<String>,
    /// Error kind, on failure.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<ErrorKind>,
    /// Human-readable error, on failure.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

impl ResponseEnvelope {
    fn failure(outcome: Outcome, kind: ErrorKind, message: String) -> Self {
        Self {
            success: false,
            outcome,
            object_identity: None,
            error_kind: Some(kind),
            error_message: Some(message),
        }
    }
}

impl From<&ValidationError> for ResponseEnvelope {
    fn from(err: &ValidationError) -> Self {
        let kind = match err {
            ValidationError::Parse(_) => ErrorKind::ParseError,
            ValidationError::Schema(_) => ErrorKind::SchemaError,
            ValidationError::Policy { .. } => ErrorKind::PolicyError,
        };
        Self::failure(Outcome::Invalid, kind, err.to_string())
    }
}

impl From<AdmissionResult> for ResponseEnvelope {
    fn from(result: AdmissionResult) -> Self {
        match result {
            AdmissionResult::Created(id) => Self {
                success: true,
                outcome: Outcome::Created,
                object_identity: Some(id.to_string()),
                error_kind: None,
                error_message: None,
            },
            AdmissionResult::AlreadyExists(id) => Self {
                success: true,
                outcome: Outcome::AlreadyExists,
                object_identity: Some(id.to_string()),
                error_kind: None,
                error_message: None,
            },
            AdmissionResult::Rejected(reason) => {
                Self::failure(Outcome::Rejected, ErrorKind::Rejected, reason)
            }
            AdmissionResult::Transient(detail) => {
                Self::failure(Outcome::Transient, ErrorKind::Transient, detail)
            }
            AdmissionResult::Fatal(detail) => {
                Self::failure(Outcome::Fatal, ErrorKind::Fatal, detail)
            }
        }
    }
}

/// Health snapshot shared by both adapters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthStatus {
    /// Always `true` while the gateway is serving.
    pub healthy: bool,
    /// Gateway version.
    pub version: String,
    /// Milliseconds since the gateway was built.
    pub uptime_ms: i64,
    /// Control-plane backend name.
    pub control_plane: String,
}

/// The admission gateway.
#[derive(Debug)]
pub struct Gateway {
    policy: Arc<Policy>,
    forwarder: Forwarder,
    start_time: Instant,
    version: String,
}

impl Gateway {
    /// Create a gateway over `control_plane`.
    pub fn new(
        control_plane: Arc<dyn ControlPlane>,
        policy: Policy,
        retry: RetryPolicy,
        call_timeout: Duration,
    ) -> Self {
        Self::from_parts(
            Arc::new(policy),
            Forwarder::new(control_plane, retry, call_timeout),
        )
    }

    /// Create a gateway from an existing policy and forwarder.
    pub fn from_parts(policy: Arc<Policy>, forwarder: Forwarder) -> Self {
        Self {
            policy,
            forwarder,
            start_time: Instant::now(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }

    /// Capability policy applied by the validator.
    pub fn policy(&self) -> &Policy {
        &self.policy
    }

    /// The forwarder.
    pub fn forwarder(&self) -> &Forwarder {
        &self.forwarder
    }

    /// Name of the control-plane backend.
    pub fn control_plane_name(&self) -> &'static str {
        self.forwarder.control_plane().name()
    }

    /// Milliseconds since construction.
    pub fn uptime_ms(&self) -> i64 {
        self.start_time.elapsed().as_millis() as i64
    }

    /// Health snapshot.
    pub fn health(&self) -> HealthStatus {
        HealthStatus {
            healthy: true,
            version: self.version.clone(),
            uptime_ms: self.uptime_ms(),
            control_plane: self.control_plane_name().to_string(),
        }
    }

    /// Validate, key and forward one request.
    #[instrument(skip_all, fields(namespace = %raw.namespace))]
    pub async fn handle(&self, raw: WorkloadRequest) -> ResponseEnvelope {
        debug!("received");

        debug!("validating");
        let workload = match validate(&raw, &self.policy) {
            Ok(w) => w,
            Err(err) => {
                info!(error = %err, "request rejected by validator");
                let envelope = ResponseEnvelope::from(&err);
                debug!(outcome = ?envelope.outcome, "responded");
                return envelope;
            }
        };

        let key = keyer::key(&workload, raw.idempotency_token.as_deref());
        debug!(key = %key, object = %workload.name(), "keying");

        debug!(key = %key, "forwarding");
        let result = self
            .forwarder
            .forward_with_timeout(&workload, &key, raw.timeout)
            .await;
        debug!(key = %key, result = result.label(), "forwarded");

        match &result {
            AdmissionResult::Created(id) => info!(key = %key.short(), object = %id, "created"),
            AdmissionResult::AlreadyExists(id) => {
                info!(key = %key.short(), object = %id, "already exists, replay")
            }
            other => info!(key = %key.short(), result = other.label(), "admission failed"),
        }

        let envelope = ResponseEnvelope::from(result);
        debug!(key = %key, outcome = ?envelope.outcome, "responded");
        envelope
    }
}
