// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Error types for podgate-gateway.
//!
//! Request-path failures are not errors here: they travel as
//! [`AdmissionResult`](crate::forwarder::AdmissionResult) values and end up in
//! the response envelope. This type covers setup and I/O.

use thiserror::Error;

/// Gateway errors.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// Configuration loading failed.
    #[error("Configuration error: {0}")]
    Config(#[from] crate::config::ConfigError),

    /// I/O operation failed.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Building the control-plane HTTP client failed.
    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),

    /// QUIC server setup failed.
    #[error("RPC server error: {0}")]
    Server(#[from] podgate_protocol::ServerError),

    /// Other error.
    #[error("{0}")]
    Other(String),
}

/// Result type using the gateway Error.
pub type Result<T> = std::result::Result<T, Error>;
