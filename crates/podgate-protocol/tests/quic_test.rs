// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! QUIC request/response tests against a loopback server.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use podgate_protocol::gateway_proto::{
    HelloRequest, HelloResponse, RpcError, RpcRequest, RpcResponse, rpc_request, rpc_response,
};
use podgate_protocol::{
    ConnectionHandler, PodgateClient, PodgateClientConfig, PodgateServer, PodgateServerConfig,
    StreamHandler, TlsIdentity,
};

async fn echo_hello(mut stream: StreamHandler) {
    let frame = match stream.read_frame().await {
        Ok(frame) => frame,
        Err(_) => return,
    };
    let request: RpcRequest = frame.decode_request().unwrap();
    let response = match request.request {
        Some(rpc_request::Request::Hello(req)) => RpcResponse {
            response: Some(rpc_response::Response::Hello(HelloResponse {
                message: format!("Hello {}", req.name),
            })),
        },
        _ => RpcResponse {
            response: Some(rpc_response::Response::Error(RpcError {
                code: "INVALID_REQUEST".to_string(),
                message: "unsupported".to_string(),
            })),
        },
    };
    stream.respond(&response).await.unwrap();
}

async fn spawn_server() -> (Arc<PodgateServer>, SocketAddr) {
    spawn_server_with(PodgateServerConfig::new("127.0.0.1:0".parse().unwrap())).await
}

async fn spawn_server_with(config: PodgateServerConfig) -> (Arc<PodgateServer>, SocketAddr) {
    let server = Arc::new(PodgateServer::bind(config).unwrap());
    let addr = server.local_addr().unwrap();

    let accept = server.clone();
    tokio::spawn(async move {
        while let Some(incoming) = accept.accept().await {
            tokio::spawn(async move {
                if let Ok(conn) = incoming.await {
                    ConnectionHandler::new(conn).run(echo_hello).await;
                }
            });
        }
    });

    (server, addr)
}

fn client_for(addr: SocketAddr) -> PodgateClient {
    PodgateClient::new(PodgateClientConfig {
        server_addr: addr,
        dangerous_skip_cert_verification: true,
        ..Default::default()
    })
    .unwrap()
}

#[tokio::test]
async fn test_hello_round_trip() {
    let (server, addr) = spawn_server().await;
    let client = client_for(addr);

    let request = RpcRequest {
        request: Some(rpc_request::Request::Hello(HelloRequest {
            name: "gopher".to_string(),
        })),
    };
    let response: RpcResponse = client.request(&request).await.unwrap();
    match response.response {
        Some(rpc_response::Response::Hello(hello)) => assert_eq!(hello.message, "Hello gopher"),
        other => panic!("unexpected response: {:?}", other),
    }
    assert!(client.is_connected().await);

    client.close().await;
    server.close();
}

#[tokio::test]
async fn test_connection_reused_across_requests() {
    let (server, addr) = spawn_server().await;
    let client = client_for(addr);

    for name in ["a", "b", "c"] {
        let request = RpcRequest {
            request: Some(rpc_request::Request::Hello(HelloRequest {
                name: name.to_string(),
            })),
        };
        let response: RpcResponse = client.request(&request).await.unwrap();
        assert!(matches!(
            response.response,
            Some(rpc_response::Response::Hello(ref h)) if h.message == format!("Hello {}", name)
        ));
    }

    client.close().await;
    server.close();
}

#[tokio::test]
async fn test_unsupported_request_gets_error_payload() {
    let (server, addr) = spawn_server().await;
    let client = client_for(addr);

    let response: RpcResponse = client.request(&RpcRequest { request: None }).await.unwrap();
    match response.response {
        Some(rpc_response::Response::Error(err)) => assert_eq!(err.code, "INVALID_REQUEST"),
        other => panic!("unexpected response: {:?}", other),
    }

    client.close().await;
    server.close();
}

fn hello(name: &str) -> RpcRequest {
    RpcRequest {
        request: Some(rpc_request::Request::Hello(HelloRequest {
            name: name.to_string(),
        })),
    }
}

#[tokio::test]
async fn test_pem_identity_verified_against_pinned_ca() {
    let generated = rcgen::generate_simple_self_signed(vec!["localhost".to_string()]).unwrap();
    let cert_pem = generated.cert.pem().into_bytes();
    let (server, addr) = spawn_server_with(PodgateServerConfig {
        identity: TlsIdentity::Pem {
            cert: cert_pem.clone(),
            key: generated.key_pair.serialize_pem().into_bytes(),
        },
        ..PodgateServerConfig::new("127.0.0.1:0".parse().unwrap())
    })
    .await;

    let trusted = PodgateClient::new(PodgateClientConfig {
        server_addr: addr,
        ca_pem: Some(cert_pem),
        ..Default::default()
    })
    .unwrap();
    let response: RpcResponse = trusted.request(&hello("tls")).await.unwrap();
    assert!(matches!(
        response.response,
        Some(rpc_response::Response::Hello(ref h)) if h.message == "Hello tls"
    ));
    trusted.close().await;

    let untrusted = PodgateClient::new(PodgateClientConfig {
        server_addr: addr,
        connect_timeout: Duration::from_secs(2),
        ..Default::default()
    })
    .unwrap();
    assert!(untrusted.connect().await.is_err());
    assert!(!untrusted.is_connected().await);

    server.close();
}
