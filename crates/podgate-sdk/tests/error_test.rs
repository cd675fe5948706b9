// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Error type tests for podgate-sdk.

use podgate_protocol::{ClientError, FrameError};
use podgate_sdk::SdkError;

#[test]
fn test_config_error_display() {
    let err = SdkError::Config("invalid PODGATE_RPC_ADDR".to_string());
    assert!(err.to_string().contains("configuration error"));
    assert!(err.to_string().contains("PODGATE_RPC_ADDR"));
}

#[test]
fn test_timeout_error_display() {
    let err = SdkError::Timeout(5000);
    assert!(err.to_string().contains("timed out"));
    assert!(err.to_string().contains("5000"));
}

#[test]
fn test_server_error_display() {
    let err = SdkError::Server {
        code: "EMPTY_REQUEST".to_string(),
        message: "request has no body".to_string(),
    };
    let display = err.to_string();
    assert!(display.contains("server error"));
    assert!(display.contains("EMPTY_REQUEST"));
    assert!(display.contains("request has no body"));
}

#[test]
fn test_invalid_input_display() {
    let err = SdkError::InvalidInput("document is empty".to_string());
    assert_eq!(err.to_string(), "invalid input: document is empty");
}

#[test]
fn test_client_timeout_maps_to_timeout() {
    let err: SdkError = ClientError::Timeout(250).into();
    assert!(matches!(err, SdkError::Timeout(250)));
}

#[test]
fn test_client_frame_error_maps_to_protocol() {
    let err: SdkError = ClientError::Frame(FrameError::ConnectionClosed).into();
    assert!(matches!(err, SdkError::Protocol(_)));
}

#[test]
fn test_client_not_connected_maps_to_connection() {
    let err: SdkError = ClientError::NotConnected.into();
    match err {
        SdkError::Connection(msg) => assert!(msg.contains("no connection")),
        other => panic!("unexpected {:?}", other),
    }
}

#[test]
fn test_frame_error_conversion() {
    let err: SdkError = FrameError::FrameTooLarge(usize::MAX).into();
    assert!(err.to_string().contains("frame too large"));
}

#[test]
fn test_io_error_conversion() {
    let io = std::io::Error::new(std::io::ErrorKind::ConnectionReset, "reset by peer");
    let err: SdkError = io.into();
    assert!(matches!(err, SdkError::Connection(_)));
    assert!(err.to_string().contains("reset by peer"));
}
