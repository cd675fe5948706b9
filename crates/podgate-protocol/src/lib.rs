// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Podgate Protocol - QUIC + Protobuf communication layer
//!
//! This crate provides the wire protocol spoken between RPC callers
//! (`podgate-sdk`, `podgate-ctl`) and the admission gateway.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                    podgate-protocol                         │
//! ├─────────────────────────────────────────────────────────────┤
//! │  RPC Layer: one request/response per bidirectional stream   │
//! ├─────────────────────────────────────────────────────────────┤
//! │  Serialization: Protobuf (prost)                            │
//! ├─────────────────────────────────────────────────────────────┤
//! │  Transport: QUIC (quinn)                                    │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Gateway Protocol (`gateway_proto`)
//!
//! - Health checks
//! - Workload creation (document + namespace + optional idempotency token)
//! - Greeting probe (`Hello`)
//!
//! # Usage
//!
//! ```ignore
//! use podgate_protocol::{PodgateClient, gateway_proto};
//!
//! let client = PodgateClient::localhost()?;
//! client.connect().await?;
//!
//! let rpc_request = gateway_proto::RpcRequest {
//!     request: Some(gateway_proto::rpc_request::Request::HealthCheck(
//!         gateway_proto::HealthCheckRequest {},
//!     )),
//! };
//!
//! let response: gateway_proto::RpcResponse = client.request(&rpc_request).await?;
//! ```

pub mod client;
pub mod frame;
pub mod gateway_proto;
pub mod server;

// Re-export main types
pub use client::{ClientError, PodgateClient, PodgateClientConfig};
pub use frame::{Frame, FrameError, MessageType, read_frame, write_frame};
pub use server::{
    ConnectionHandler, PodgateServer, PodgateServerConfig, ServerError, StreamHandler, TlsIdentity,
};
