// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Podgate Gateway - Workload Admission
//!
//! This crate validates workload-creation requests and forwards them to a
//! cluster control plane exactly once. Retrying a request, whether by the
//! caller or by the gateway itself, never creates a second object.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────┐   ┌──────────────────────────────┐
//! │  QUIC RPC (podgate-sdk, CLI) │   │  HTTP (axum)                 │
//! │  Port 3000                   │   │  Port 8080                   │
//! └──────────────────────────────┘   └──────────────────────────────┘
//!                 │                                  │
//!                 └─────────────────┬────────────────┘
//!                                   ▼
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                      Gateway (facade)                            │
//! │  ┌─────────────┐   ┌─────────────┐   ┌───────────────────────┐  │
//! │  │  Validator  │──▶│    Keyer    │──▶│      Forwarder        │  │
//! │  └─────────────┘   └─────────────┘   └───────────────────────┘  │
//! └─────────────────────────────────────────────────────────────────┘
//!                                   │
//!                                   ▼
//!                ┌─────────────────────────────────────┐
//!                │  ControlPlane (Kubernetes / memory) │
//!                └─────────────────────────────────────┘
//! ```
//!
//! # Outcomes
//!
//! | Outcome | `success` | HTTP |
//! |---------|-----------|------|
//! | `created` | true | 201 |
//! | `already_exists` | true | 200 |
//! | `invalid` (parse / schema / policy) | false | 400 / 422 / 403 |
//! | `rejected` | false | 409 |
//! | `transient` | false | 503 |
//! | `fatal` | false | 502 |
//!
//! # Deduplication
//!
//! Every created object carries two annotations: `podgate.io/dedup-key` and
//! `podgate.io/content-digest`. When a create conflicts with an existing
//! object, the gateway reads it back. Matching annotations mean the request is
//! a replay and reports `already_exists`; anything else is `rejected`.
//!
//! # Configuration
//!
//! See [`config::Config`] for the environment variables.

#![deny(missing_docs)]

pub mod config;
pub mod control_plane;
pub mod error;
pub mod facade;
pub mod forwarder;
pub mod http;
pub mod keyer;
pub mod policy;
pub mod retry;
pub mod runtime;
pub mod server;
pub mod workload;

pub use error::{Error, Result};
pub use facade::{ErrorKind, Gateway, HealthStatus, Outcome, ResponseEnvelope};
pub use forwarder::{AdmissionResult, Forwarder};
pub use keyer::DedupKey;
pub use policy::{Capability, Policy};
pub use retry::RetryPolicy;
pub use runtime::GatewayRuntime;
pub use workload::{ValidatedWorkload, ValidationError, WorkloadRequest, validate};
