// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Shared fixtures for podgate-gateway integration tests.

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use podgate_gateway::control_plane::InMemoryControlPlane;
use podgate_gateway::{Gateway, Policy, RetryPolicy};

/// The `web-1` pod from the admission walkthrough.
pub const WEB_1: &str = r#"apiVersion: v1
kind: Pod
metadata:
  name: web-1
  namespace: default
spec:
  containers:
    - name: web
      image: nginx:1.27
"#;

/// Same pod as [`WEB_1`] with a different image.
pub fn web_1_with_image(image: &str) -> String {
    WEB_1.replace("nginx:1.27", image)
}

/// Retry policy with short delays so paused-time tests stay readable.
pub fn fast_retry() -> RetryPolicy {
    RetryPolicy {
        max_attempts: 3,
        base_delay: Duration::from_millis(10),
        max_delay: Duration::from_millis(100),
        jitter: 0.5,
    }
}

/// Gateway over a fresh in-memory control plane.
pub fn memory_gateway() -> (Arc<Gateway>, Arc<InMemoryControlPlane>) {
    let cp = Arc::new(InMemoryControlPlane::new());
    let gateway = Arc::new(Gateway::new(
        cp.clone(),
        Policy::default(),
        fast_retry(),
        Duration::from_secs(1),
    ));
    (gateway, cp)
}
