// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Podgate SDK
//!
//! Client for submitting workload documents to podgate-gateway over QUIC.
//!
//! Every submission ends in a [`WorkloadOutcome`]. Validation failures,
//! name conflicts and control-plane trouble are outcomes, not errors;
//! [`SdkError`] is reserved for transport and protocol problems.
//!
//! # Example
//!
//! ```no_run
//! use podgate_sdk::{CreateWorkloadOptions, GatewaySdk};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let sdk = GatewaySdk::localhost()?;
//! sdk.connect().await?;
//!
//! let health = sdk.health_check().await?;
//! println!("Gateway version: {}", health.version);
//!
//! let document = std::fs::read_to_string("pod.yaml")?;
//! let options = CreateWorkloadOptions::new(document)
//!     .with_namespace("default")
//!     .with_idempotency_token("deploy-42");
//! let outcome = sdk.create_workload(options).await?;
//! println!("{:?} {:?}", outcome.outcome, outcome.object_identity);
//! # Ok(())
//! # }
//! ```

mod client;
mod config;
mod error;
mod types;

pub use client::GatewaySdk;
pub use config::SdkConfig;
pub use error::{Result, SdkError};
pub use types::{CreateWorkloadOptions, ErrorKind, HealthStatus, Outcome, WorkloadOutcome};
