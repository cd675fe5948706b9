// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! HTTP adapter tests driven through the router without a socket.

mod common;

use axum::body::Body;
use axum::http::{Method, Request, StatusCode};
use http_body_util::BodyExt;
use serde_json::Value;
use tower::ServiceExt;

use podgate_gateway::control_plane::RemoteError;
use podgate_gateway::http::{MAX_BODY_BYTES, router};

use common::{WEB_1, memory_gateway, web_1_with_image};

async fn send(
    app: &axum::Router,
    method: Method,
    uri: &str,
    headers: &[(&str, &str)],
    body: impl Into<Body>,
) -> (StatusCode, Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    for (name, value) in headers {
        builder = builder.header(*name, *value);
    }
    let request = builder.body(body.into()).unwrap();

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let json = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, json)
}

#[tokio::test]
async fn test_create_then_replay() {
    let (gateway, cp) = memory_gateway();
    let app = router(gateway);

    let (status, body) = send(
        &app,
        Method::POST,
        "/v1/namespaces/default/workloads",
        &[],
        WEB_1,
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["success"], true);
    assert_eq!(body["outcome"], "created");
    assert_eq!(body["object_identity"], "Pod/default/web-1");
    assert!(body.get("error_kind").is_none());

    let (status, body) = send(
        &app,
        Method::POST,
        "/v1/namespaces/default/workloads",
        &[],
        WEB_1,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    assert_eq!(body["outcome"], "already_exists");
    assert_eq!(cp.object_count().await, 1);
}

#[tokio::test]
async fn test_namespace_from_document_or_query() {
    let (gateway, cp) = memory_gateway();
    let app = router(gateway);

    let (status, _) = send(&app, Method::POST, "/v1/workloads", &[], WEB_1).await;
    assert_eq!(status, StatusCode::CREATED);

    let staging = WEB_1.replace("  namespace: default\n", "");
    let (status, body) = send(
        &app,
        Method::POST,
        "/v1/workloads?namespace=staging",
        &[],
        staging.clone(),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["object_identity"], "Pod/staging/web-1");

    let (status, body) = send(&app, Method::POST, "/v1/workloads", &[], staging).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["error_kind"], "schema_error");
    assert_eq!(cp.object_count().await, 2);
}

#[tokio::test]
async fn test_namespace_mismatch_is_schema_error() {
    let (gateway, _) = memory_gateway();
    let app = router(gateway);

    let (status, body) = send(
        &app,
        Method::POST,
        "/v1/namespaces/other/workloads",
        &[],
        WEB_1,
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["outcome"], "invalid");
    assert_eq!(body["error_kind"], "schema_error");
}

#[tokio::test]
async fn test_create_pod_compatibility_route() {
    let (gateway, _) = memory_gateway();
    let app = router(gateway);

    let (status, body) = send(&app, Method::POST, "/create-pod", &[], WEB_1).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["outcome"], "created");
}

#[tokio::test]
async fn test_error_status_codes() {
    let (gateway, cp) = memory_gateway();
    let app = router(gateway);

    let (status, body) = send(&app, Method::POST, "/v1/workloads", &[], "kind: [").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error_kind"], "parse_error");

    let host_network = WEB_1.replace("spec:\n", "spec:\n  hostNetwork: true\n");
    let (status, body) = send(&app, Method::POST, "/v1/workloads", &[], host_network).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["error_kind"], "policy_error");

    send(&app, Method::POST, "/v1/workloads", &[], WEB_1).await;
    let (status, body) = send(
        &app,
        Method::POST,
        "/v1/workloads",
        &[],
        web_1_with_image("nginx:1.28"),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["outcome"], "rejected");

    cp.fail_next(RemoteError::Unauthorized("expired".into())).await;
    let other = WEB_1.replace("web-1", "web-2");
    let (status, body) = send(&app, Method::POST, "/v1/workloads", &[], other).await;
    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert_eq!(body["outcome"], "fatal");
}

#[tokio::test(start_paused = true)]
async fn test_transient_is_service_unavailable() {
    let (gateway, cp) = memory_gateway();
    let app = router(gateway);
    cp.fail_next_n(3, RemoteError::Unavailable("down".into())).await;

    let (status, body) = send(&app, Method::POST, "/v1/workloads", &[], WEB_1).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["outcome"], "transient");
    assert_eq!(body["error_kind"], "transient");
}

#[tokio::test]
async fn test_idempotency_key_header() {
    let (gateway, _) = memory_gateway();
    let app = router(gateway);

    let headers = [("Idempotency-Key", "order-42")];
    let (status, _) = send(&app, Method::POST, "/v1/workloads", &headers, WEB_1).await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, _) = send(&app, Method::POST, "/v1/workloads", &headers, WEB_1).await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = send(
        &app,
        Method::POST,
        "/v1/workloads",
        &[("Idempotency-Key", "order-43")],
        WEB_1,
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
}

#[tokio::test]
async fn test_bad_timeout_header() {
    let (gateway, cp) = memory_gateway();
    let app = router(gateway);

    for value in ["soon", "0", "-5"] {
        let (status, body) = send(
            &app,
            Method::POST,
            "/v1/workloads",
            &[("X-Request-Timeout-Ms", value)],
            WEB_1,
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "{}", value);
        assert_eq!(body["error_kind"], "parse_error");
    }
    assert_eq!(cp.create_calls(), 0);

    let (status, _) = send(
        &app,
        Method::POST,
        "/v1/workloads",
        &[("X-Request-Timeout-Ms", "2500")],
        WEB_1,
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
}

#[tokio::test]
async fn test_oversized_body_is_rejected() {
    let (gateway, cp) = memory_gateway();
    let app = router(gateway);

    let huge = format!("{}# {}\n", WEB_1, "x".repeat(MAX_BODY_BYTES));
    let (status, _) = send(&app, Method::POST, "/v1/workloads", &[], huge).await;
    assert_eq!(status, StatusCode::PAYLOAD_TOO_LARGE);
    assert_eq!(cp.create_calls(), 0);
}

#[tokio::test]
async fn test_health() {
    let (gateway, _) = memory_gateway();
    let app = router(gateway);

    let (status, body) = send(&app, Method::GET, "/health", &[], Body::empty()).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["healthy"], true);
    assert_eq!(body["control_plane"], "memory");
    assert!(body["version"].is_string());
    assert!(body["uptime_ms"].is_i64());
}
