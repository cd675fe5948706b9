// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Error types for podgate-sdk.

use thiserror::Error;

/// Result type using SdkError.
pub type Result<T> = std::result::Result<T, SdkError>;

/// Errors that can occur when using the SDK.
///
/// Admission failures (invalid document, name conflict, control-plane
/// trouble) are not errors: they come back as a
/// [`WorkloadOutcome`](crate::WorkloadOutcome) with `success == false`.
#[derive(Debug, Error)]
pub enum SdkError {
    /// Configuration error (missing or invalid values).
    #[error("configuration error: {0}")]
    Config(String),

    /// Connection to podgate-gateway failed.
    #[error("connection error: {0}")]
    Connection(String),

    /// Request timed out.
    #[error("request timed out after {0}ms")]
    Timeout(u64),

    /// Server returned an error response.
    #[error("server error [{code}]: {message}")]
    Server { code: String, message: String },

    /// Unexpected response from server.
    #[error("unexpected response: {0}")]
    UnexpectedResponse(String),

    /// Invalid input.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// Protocol error.
    #[error("protocol error: {0}")]
    Protocol(String),
}

impl From<podgate_protocol::ClientError> for SdkError {
    fn from(err: podgate_protocol::ClientError) -> Self {
        match err {
            podgate_protocol::ClientError::Timeout(ms) => SdkError::Timeout(ms),
            podgate_protocol::ClientError::Frame(e) => SdkError::Protocol(e.to_string()),
            other => SdkError::Connection(other.to_string()),
        }
    }
}

impl From<podgate_protocol::FrameError> for SdkError {
    fn from(err: podgate_protocol::FrameError) -> Self {
        SdkError::Protocol(err.to_string())
    }
}

impl From<std::io::Error> for SdkError {
    fn from(err: std::io::Error) -> Self {
        SdkError::Connection(err.to_string())
    }
}
