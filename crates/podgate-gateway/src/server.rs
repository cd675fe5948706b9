// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Gateway QUIC server.
//!
//! Handles requests from the SDK and `podgate-ctl`.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use podgate_protocol::gateway_proto::{
    self, RpcError, RpcRequest, RpcResponse, rpc_request::Request, rpc_response::Response,
};
use podgate_protocol::server::{ConnectionHandler, PodgateServer, StreamHandler};

use crate::facade::{ErrorKind, Gateway, Outcome, ResponseEnvelope};
use crate::workload::WorkloadRequest;

/// Run the QUIC server on an already bound endpoint until `shutdown_rx` flips to `true`.
pub async fn run_rpc_server_with_shutdown(
    server: PodgateServer,
    gateway: Arc<Gateway>,
    mut shutdown_rx: watch::Receiver<bool>,
) -> Result<()> {
    info!(addr = ?server.local_addr().ok(), "Gateway QUIC server starting");

    loop {
        tokio::select! {
            biased;

            _ = shutdown_rx.changed() => {
                if *shutdown_rx.borrow() {
                    info!("Gateway QUIC server received shutdown signal");
                    server.close();
                    break;
                }
            }

            incoming = server.accept() => {
                match incoming {
                    Some(incoming) => {
                        let gateway = gateway.clone();
                        tokio::spawn(async move {
                            match incoming.await {
                                Ok(connection) => {
                                    handle_connection(ConnectionHandler::new(connection), gateway).await;
                                }
                                Err(e) => {
                                    debug!("failed to accept connection: {}", e);
                                }
                            }
                        });
                    }
                    None => {
                        // Endpoint closed
                        break;
                    }
                }
            }
        }
    }

    info!("Gateway QUIC server stopped");
    Ok(())
}

/// Handle a single connection.
pub async fn handle_connection(conn: ConnectionHandler, gateway: Arc<Gateway>) {
    info!(remote = %conn.remote_address(), "New gateway connection accepted");

    conn.run(move |stream: StreamHandler| {
        let gateway = gateway.clone();
        async move {
            if let Err(e) = handle_stream(stream, gateway).await {
                error!("Stream error: {}", e);
            }
        }
    })
    .await;

    debug!("Gateway connection closed");
}

/// Handle a single stream (request/response).
async fn handle_stream(mut stream: StreamHandler, gateway: Arc<Gateway>) -> Result<()> {
    let request_frame = stream.read_frame().await?;
    let rpc_request: RpcRequest = request_frame.decode_request()?;

    let request = match rpc_request.request {
        Some(req) => req,
        None => {
            warn!("Received empty RpcRequest");
            let response = RpcResponse {
                response: Some(Response::Error(RpcError {
                    code: "EMPTY_REQUEST".to_string(),
                    message: "RpcRequest contained no request".to_string(),
                })),
            };
            stream.respond(&response).await?;
            return Ok(());
        }
    };

    debug!(
        "Received gateway request: {:?}",
        std::mem::discriminant(&request)
    );

    let response = match request {
        Request::HealthCheck(_) => {
            let health = gateway.health();
            Response::HealthCheck(gateway_proto::HealthCheckResponse {
                healthy: health.healthy,
                version: health.version,
                uptime_ms: health.uptime_ms,
                control_plane: health.control_plane,
            })
        }

        Request::Hello(req) => Response::Hello(gateway_proto::HelloResponse {
            message: format!("Hello {}", req.name),
        }),

        Request::CreateWorkload(req) => {
            let raw = workload_request(req);
            // A caller that resets the stream no longer wants the answer;
            // dropping the handler aborts the in-flight control-plane call.
            tokio::select! {
                envelope = gateway.handle(raw) => Response::CreateWorkload(envelope.into()),
                _ = stream.peer_gone() => {
                    debug!("Caller went away, abandoning request");
                    return Ok(());
                }
            }
        }
    };

    stream
        .respond(&RpcResponse {
            response: Some(response),
        })
        .await?;
    Ok(())
}

fn workload_request(req: gateway_proto::CreateWorkloadRequest) -> WorkloadRequest {
    let mut raw = WorkloadRequest::new(req.document, req.namespace);
    if let Some(token) = req.idempotency_token {
        raw = raw.with_token(token);
    }
    if let Some(ms) = req.timeout_ms {
        raw = raw.with_timeout(Duration::from_millis(ms));
    }
    raw
}

impl From<Outcome> for gateway_proto::Outcome {
    fn from(outcome: Outcome) -> Self {
        match outcome {
            Outcome::Created => gateway_proto::Outcome::Created,
            Outcome::AlreadyExists => gateway_proto::Outcome::AlreadyExists,
            Outcome::Rejected => gateway_proto::Outcome::Rejected,
            Outcome::Transient => gateway_proto::Outcome::Transient,
            Outcome::Fatal => gateway_proto::Outcome::Fatal,
            Outcome::Invalid => gateway_proto::Outcome::Invalid,
        }
    }
}

impl From<ErrorKind> for gateway_proto::ErrorKind {
    fn from(kind: ErrorKind) -> Self {
        match kind {
            ErrorKind::ParseError => gateway_proto::ErrorKind::ParseError,
            ErrorKind::SchemaError => gateway_proto::ErrorKind::SchemaError,
            ErrorKind::PolicyError => gateway_proto::ErrorKind::PolicyError,
            ErrorKind::Rejected => gateway_proto::ErrorKind::Rejected,
            ErrorKind::Transient => gateway_proto::ErrorKind::Transient,
            ErrorKind::Fatal => gateway_proto::ErrorKind::Fatal,
        }
    }
}

impl From<ResponseEnvelope> for gateway_proto::CreateWorkloadResponse {
    fn from(envelope: ResponseEnvelope) -> Self {
        Self {
            success: envelope.success,
            outcome: gateway_proto::Outcome::from(envelope.outcome) as i32,
            object_identity: envelope.object_identity,
            error_kind: envelope
                .error_kind
                .map(gateway_proto::ErrorKind::from)
                .unwrap_or(gateway_proto::ErrorKind::Unspecified) as i32,
            error_message: envelope.error_message,
        }
    }
}
