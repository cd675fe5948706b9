// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! HTTP adapter.
//!
//! Routes:
//!
//! - `POST /v1/namespaces/{namespace}/workloads`: body is the workload document
//! - `POST /v1/workloads`: namespace from the document or `?namespace=`
//! - `POST /create-pod`: same as `/v1/workloads`
//! - `GET /health`
//!
//! The `Idempotency-Key` header carries the idempotency token and
//! `X-Request-Timeout-Ms` overrides the per-call control-plane timeout.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::{DefaultBodyLimit, Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tower_http::trace::TraceLayer;
use tracing::{debug, info};

use crate::facade::{ErrorKind, Gateway, HealthStatus, Outcome, ResponseEnvelope};
use crate::workload::WorkloadRequest;

/// Largest accepted request body.
pub const MAX_BODY_BYTES: usize = 1024 * 1024;

/// Header carrying the idempotency token.
pub const IDEMPOTENCY_KEY_HEADER: &str = "idempotency-key";
/// Header overriding the per-call timeout, in milliseconds.
pub const REQUEST_TIMEOUT_HEADER: &str = "x-request-timeout-ms";

#[derive(Debug, Default, Deserialize)]
struct NamespaceParams {
    namespace: Option<String>,
}

/// Build the gateway router.
pub fn router(gateway: Arc<Gateway>) -> Router {
    Router::new()
        .route(
            "/v1/namespaces/{namespace}/workloads",
            post(create_in_namespace),
        )
        .route("/v1/workloads", post(create_workload))
        .route("/create-pod", post(create_workload))
        .route("/health", get(health))
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .layer(TraceLayer::new_for_http())
        .with_state(gateway)
}

/// HTTP status for an envelope.
pub fn status_for(envelope: &ResponseEnvelope) -> StatusCode {
    match envelope.outcome {
        Outcome::Created => StatusCode::CREATED,
        Outcome::AlreadyExists => StatusCode::OK,
        Outcome::Rejected => StatusCode::CONFLICT,
        Outcome::Transient => StatusCode::SERVICE_UNAVAILABLE,
        Outcome::Fatal => StatusCode::BAD_GATEWAY,
        Outcome::Invalid => match envelope.error_kind {
            Some(ErrorKind::SchemaError) => StatusCode::UNPROCESSABLE_ENTITY,
            Some(ErrorKind::PolicyError) => StatusCode::FORBIDDEN,
            _ => StatusCode::BAD_REQUEST,
        },
    }
}

async fn create_in_namespace(
    State(gateway): State<Arc<Gateway>>,
    Path(namespace): Path<String>,
    headers: HeaderMap,
    body: String,
) -> (StatusCode, Json<ResponseEnvelope>) {
    admit(&gateway, namespace, &headers, body).await
}

async fn create_workload(
    State(gateway): State<Arc<Gateway>>,
    Query(params): Query<NamespaceParams>,
    headers: HeaderMap,
    body: String,
) -> (StatusCode, Json<ResponseEnvelope>) {
    admit(&gateway, params.namespace.unwrap_or_default(), &headers, body).await
}

async fn admit(
    gateway: &Gateway,
    namespace: String,
    headers: &HeaderMap,
    body: String,
) -> (StatusCode, Json<ResponseEnvelope>) {
    let mut raw = WorkloadRequest::new(body, namespace);

    if let Some(token) = header_str(headers, IDEMPOTENCY_KEY_HEADER) {
        raw = raw.with_token(token);
    }

    if let Some(value) = header_str(headers, REQUEST_TIMEOUT_HEADER) {
        match value.trim().parse::<u64>() {
            Ok(ms) => raw = raw.with_timeout(Duration::from_millis(ms)),
            Err(_) => {
                debug!(value, "bad request timeout header");
                let envelope = ResponseEnvelope {
                    success: false,
                    outcome: Outcome::Invalid,
                    object_identity: None,
                    error_kind: Some(ErrorKind::ParseError),
                    error_message: Some(format!(
                        "parse error: {} must be a non-negative integer, got {:?}",
                        REQUEST_TIMEOUT_HEADER, value
                    )),
                };
                return (StatusCode::BAD_REQUEST, Json(envelope));
            }
        }
    }

    let envelope = gateway.handle(raw).await;
    (status_for(&envelope), Json(envelope))
}

async fn health(State(gateway): State<Arc<Gateway>>) -> Json<HealthStatus> {
    Json(gateway.health())
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

/// Serve the router on an already bound listener until `shutdown_rx` flips to `true`.
pub async fn run_http_server_with_shutdown(
    listener: TcpListener,
    gateway: Arc<Gateway>,
    mut shutdown_rx: watch::Receiver<bool>,
) -> anyhow::Result<()> {
    let addr: Option<SocketAddr> = listener.local_addr().ok();
    info!(addr = ?addr, "Gateway HTTP server starting");

    axum::serve(listener, router(gateway))
        .with_graceful_shutdown(async move {
            while shutdown_rx.changed().await.is_ok() {
                if *shutdown_rx.borrow() {
                    break;
                }
            }
            info!("Gateway HTTP server received shutdown signal");
        })
        .await?;

    info!("Gateway HTTP server stopped");
    Ok(())
}
