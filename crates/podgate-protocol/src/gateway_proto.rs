// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Protobuf messages for the gateway protocol.
//!
//! Message layout (package `podgate.gateway`):
//!
//! ```text
//! RpcRequest  { oneof request  { HealthCheck = 1; CreateWorkload = 2; Hello = 3; } }
//! RpcResponse { oneof response { HealthCheck = 1; CreateWorkload = 2; Hello = 3; Error = 15; } }
//! ```
//!
//! Tags are part of the wire contract; never renumber an existing field.

/// Health check request (no fields).
#[derive(Clone, Copy, PartialEq, ::prost::Message)]
pub struct HealthCheckRequest {}

/// Health check response.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct HealthCheckResponse {
    #[prost(bool, tag = "1")]
    pub healthy: bool,
    #[prost(string, tag = "2")]
    pub version: ::prost::alloc::string::String,
    #[prost(int64, tag = "3")]
    pub uptime_ms: i64,
    /// Name of the control-plane backend the gateway forwards to.
    #[prost(string, tag = "4")]
    pub control_plane: ::prost::alloc::string::String,
}

/// Greeting probe request.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct HelloRequest {
    #[prost(string, tag = "1")]
    pub name: ::prost::alloc::string::String,
}

/// Greeting probe response.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct HelloResponse {
    #[prost(string, tag = "1")]
    pub message: ::prost::alloc::string::String,
}

/// Submit a workload document for admission.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct CreateWorkloadRequest {
    /// Workload document (YAML or JSON).
    #[prost(string, tag = "1")]
    pub document: ::prost::alloc::string::String,
    /// Target namespace. Empty means "use the document's namespace".
    #[prost(string, tag = "2")]
    pub namespace: ::prost::alloc::string::String,
    /// Caller-supplied idempotency token.
    #[prost(string, optional, tag = "3")]
    pub idempotency_token: ::core::option::Option<::prost::alloc::string::String>,
    /// Per-call control-plane timeout override.
    #[prost(uint64, optional, tag = "4")]
    pub timeout_ms: ::core::option::Option<u64>,
}

/// Admission outcome, mirrors the gateway's response envelope.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct CreateWorkloadResponse {
    #[prost(bool, tag = "1")]
    pub success: bool,
    #[prost(enumeration = "Outcome", tag = "2")]
    pub outcome: i32,
    #[prost(string, optional, tag = "3")]
    pub object_identity: ::core::option::Option<::prost::alloc::string::String>,
    #[prost(enumeration = "ErrorKind", tag = "4")]
    pub error_kind: i32,
    #[prost(string, optional, tag = "5")]
    pub error_message: ::core::option::Option<::prost::alloc::string::String>,
}

/// Protocol-level error (malformed or unroutable request).
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct RpcError {
    #[prost(string, tag = "1")]
    pub code: ::prost::alloc::string::String,
    #[prost(string, tag = "2")]
    pub message: ::prost::alloc::string::String,
}

/// Terminal outcome of a workload admission.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, ::prost::Enumeration)]
#[repr(i32)]
pub enum Outcome {
    Unspecified = 0,
    Created = 1,
    AlreadyExists = 2,
    Rejected = 3,
    Transient = 4,
    Fatal = 5,
    Invalid = 6,
}

/// Machine-readable error kind. `Unspecified` means "no error".
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, ::prost::Enumeration)]
#[repr(i32)]
pub enum ErrorKind {
    Unspecified = 0,
    ParseError = 1,
    SchemaError = 2,
    PolicyError = 3,
    Rejected = 4,
    Transient = 5,
    Fatal = 6,
}

/// Request wrapper carried in every request frame.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct RpcRequest {
    #[prost(oneof = "rpc_request::Request", tags = "1, 2, 3")]
    pub request: ::core::option::Option<rpc_request::Request>,
}

/// Nested message and enum types in `RpcRequest`.
pub mod rpc_request {
    #[derive(Clone, PartialEq, ::prost::Oneof)]
    pub enum Request {
        #[prost(message, tag = "1")]
        HealthCheck(super::HealthCheckRequest),
        #[prost(message, tag = "2")]
        CreateWorkload(super::CreateWorkloadRequest),
        #[prost(message, tag = "3")]
        Hello(super::HelloRequest),
    }
}

/// Response wrapper carried in every response frame.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct RpcResponse {
    #[prost(oneof = "rpc_response::Response", tags = "1, 2, 3, 15")]
    pub response: ::core::option::Option<rpc_response::Response>,
}

/// Nested message and enum types in `RpcResponse`.
pub mod rpc_response {
    #[derive(Clone, PartialEq, ::prost::Oneof)]
    pub enum Response {
        #[prost(message, tag = "1")]
        HealthCheck(super::HealthCheckResponse),
        #[prost(message, tag = "2")]
        CreateWorkload(super::CreateWorkloadResponse),
        #[prost(message, tag = "3")]
        Hello(super::HelloResponse),
        #[prost(message, tag = "15")]
        Error(super::RpcError),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use prost::Message;

    #[test]
    fn test_create_workload_request_optional_fields() {
        let req = CreateWorkloadRequest {
            document: "kind: Pod".to_string(),
            namespace: String::new(),
            idempotency_token: None,
            timeout_ms: None,
        };
        let decoded = CreateWorkloadRequest::decode(req.encode_to_vec().as_slice()).unwrap();
        assert_eq!(decoded.idempotency_token, None);
        assert_eq!(decoded.timeout_ms, None);

        let req = CreateWorkloadRequest {
            idempotency_token: Some(String::new()),
            timeout_ms: Some(0),
            ..req
        };
        let decoded = CreateWorkloadRequest::decode(req.encode_to_vec().as_slice()).unwrap();
        // Explicit presence survives even for default values
        assert_eq!(decoded.idempotency_token, Some(String::new()));
        assert_eq!(decoded.timeout_ms, Some(0));
    }

    #[test]
    fn test_enum_accessors() {
        let resp = CreateWorkloadResponse {
            success: false,
            outcome: Outcome::Rejected as i32,
            object_identity: None,
            error_kind: ErrorKind::Rejected as i32,
            error_message: Some("conflict".to_string()),
        };
        assert_eq!(resp.outcome(), Outcome::Rejected);
        assert_eq!(resp.error_kind(), ErrorKind::Rejected);

        let unknown = CreateWorkloadResponse {
            outcome: 42,
            ..resp
        };
        assert_eq!(unknown.outcome(), Outcome::Unspecified);
    }

    #[test]
    fn test_rpc_request_oneof() {
        let req = RpcRequest {
            request: Some(rpc_request::Request::Hello(HelloRequest {
                name: "gopher".to_string(),
            })),
        };
        let decoded = RpcRequest::decode(req.encode_to_vec().as_slice()).unwrap();
        match decoded.request {
            Some(rpc_request::Request::Hello(hello)) => assert_eq!(hello.name, "gopher"),
            other => panic!("unexpected request: {:?}", other),
        }
    }

    #[test]
    fn test_empty_rpc_request_decodes_to_none() {
        let decoded = RpcRequest::decode(&[][..]).unwrap();
        assert!(decoded.request.is_none());
    }
}
