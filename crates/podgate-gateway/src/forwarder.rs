// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Admission forwarder.
//!
//! Sends a validated workload to the control plane and classifies what came
//! back. Transient faults are retried with the same object and key; a name
//! conflict is resolved by reading the stored object and comparing its
//! dedup-key and content-digest annotations.

use std::sync::Arc;
use std::time::Duration;

use serde_json::{Map, Value};
use tracing::{debug, info, instrument, warn};

use crate::control_plane::{ControlPlane, ObjectIdentity, RemoteError};
use crate::keyer::DedupKey;
use crate::retry::RetryPolicy;
use crate::workload::{CONTENT_DIGEST_ANNOTATION, DEDUP_KEY_ANNOTATION, ValidatedWorkload};

/// Default per-call timeout for control-plane requests.
pub const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(10);

/// Terminal result of forwarding one workload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AdmissionResult {
    /// The object was created by this request.
    Created(ObjectIdentity),
    /// An earlier request with the same key and content already created it.
    AlreadyExists(ObjectIdentity),
    /// The name is taken by a different object or logical request.
    Rejected(String),
    /// The retry budget ran out on transient faults.
    Transient(String),
    /// The control plane refused the request in a way retrying cannot fix.
    Fatal(String),
}

impl AdmissionResult {
    /// `Created` and `AlreadyExists` both count as success.
    pub fn is_success(&self) -> bool {
        matches!(
            self,
            AdmissionResult::Created(_) | AdmissionResult::AlreadyExists(_)
        )
    }

    /// Short label for logs.
    pub fn label(&self) -> &'static str {
        match self {
            AdmissionResult::Created(_) => "created",
            AdmissionResult::AlreadyExists(_) => "already_exists",
            AdmissionResult::Rejected(_) => "rejected",
            AdmissionResult::Transient(_) => "transient",
            AdmissionResult::Fatal(_) => "fatal",
        }
    }
}

/// Outcome of a single attempt.
enum Attempt {
    Done(AdmissionResult),
    Retry {
        detail: String,
        retry_after: Option<Duration>,
    },
}

impl From<RemoteError> for Attempt {
    fn from(err: RemoteError) -> Self {
        if err.is_transient() {
            Attempt::Retry {
                retry_after: err.retry_after(),
                detail: err.to_string(),
            }
        } else {
            Attempt::Done(AdmissionResult::Fatal(err.to_string()))
        }
    }
}

/// Issues create calls against a shared control plane.
#[derive(Clone)]
pub struct Forwarder {
    control_plane: Arc<dyn ControlPlane>,
    retry: RetryPolicy,
    call_timeout: Duration,
}

impl std::fmt::Debug for Forwarder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Forwarder")
            .field("control_plane", &self.control_plane.name())
            .field("retry", &self.retry)
            .field("call_timeout", &self.call_timeout)
            .finish()
    }
}

impl Forwarder {
    /// Create a forwarder over `control_plane`.
    pub fn new(
        control_plane: Arc<dyn ControlPlane>,
        retry: RetryPolicy,
        call_timeout: Duration,
    ) -> Self {
        Self {
            control_plane,
            retry,
            call_timeout,
        }
    }

    /// The shared control plane.
    pub fn control_plane(&self) -> &Arc<dyn ControlPlane> {
        &self.control_plane
    }

    /// Retry policy in effect.
    pub fn retry_policy(&self) -> RetryPolicy {
        self.retry
    }

    /// Default per-call timeout.
    pub fn call_timeout(&self) -> Duration {
        self.call_timeout
    }

    /// Forward `w` under `key` using the default per-call timeout.
    pub async fn forward(&self, w: &ValidatedWorkload, key: &DedupKey) -> AdmissionResult {
        self.forward_with_timeout(w, key, None).await
    }

    /// Forward `w` under `key`, bounding each remote call by `timeout` when given.
    #[instrument(
        skip_all,
        fields(key = %key.short(), kind = %w.kind(), namespace = %w.namespace(), name = %w.name())
    )]
    pub async fn forward_with_timeout(
        &self,
        w: &ValidatedWorkload,
        key: &DedupKey,
        timeout: Option<Duration>,
    ) -> AdmissionResult {
        let call_timeout = timeout.unwrap_or(self.call_timeout);
        let object = annotated(w, key);
        let attempts = self.retry.attempts();
        let mut last_detail = String::new();

        for attempt in 1..=attempts {
            match self.attempt(w, key, &object, call_timeout).await {
                Attempt::Done(result) => {
                    debug!(attempt, result = result.label(), "forward finished");
                    return result;
                }
                Attempt::Retry {
                    detail,
                    retry_after,
                } => {
                    if attempt == attempts {
                        last_detail = detail;
                        break;
                    }
                    let delay = self
                        .retry
                        .delay_for_retry(attempt, &mut rand::thread_rng());
                    let delay = self.retry.honor_retry_after(delay, retry_after);
                    warn!(
                        attempt,
                        max_attempts = attempts,
                        delay_ms = delay.as_millis() as u64,
                        error = %detail,
                        "transient control-plane fault, retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
            }
        }

        info!(attempts, error = %last_detail, "retry budget exhausted");
        AdmissionResult::Transient(format!(
            "gave up after {} attempts: {}",
            attempts, last_detail
        ))
    }

    async fn attempt(
        &self,
        w: &ValidatedWorkload,
        key: &DedupKey,
        object: &Value,
        call_timeout: Duration,
    ) -> Attempt {
        let created = tokio::time::timeout(
            call_timeout,
            self.control_plane
                .create_object(w.namespace(), w.kind(), object),
        )
        .await;

        match created {
            Err(_) => timed_out("create", call_timeout),
            Ok(Ok(identity)) => Attempt::Done(AdmissionResult::Created(identity)),
            Ok(Err(RemoteError::AlreadyExists)) => {
                self.resolve_conflict(w, key, call_timeout).await
            }
            Ok(Err(err)) => err.into(),
        }
    }

    /// Decide whether an existing object is a replay of this request.
    async fn resolve_conflict(
        &self,
        w: &ValidatedWorkload,
        key: &DedupKey,
        call_timeout: Duration,
    ) -> Attempt {
        let existing = tokio::time::timeout(
            call_timeout,
            self.control_plane
                .get_object(w.namespace(), w.kind(), w.name()),
        )
        .await;

        let existing = match existing {
            Err(_) => return timed_out("read", call_timeout),
            Ok(Err(err)) => return err.into(),
            Ok(Ok(None)) => {
                return Attempt::Retry {
                    detail: "object vanished between create and read".to_string(),
                    retry_after: None,
                };
            }
            Ok(Ok(Some(existing))) => existing,
        };

        let stored_key = annotation(&existing, DEDUP_KEY_ANNOTATION);
        let stored_digest = annotation(&existing, CONTENT_DIGEST_ANNOTATION);

        if stored_key == Some(key.as_str()) && stored_digest == Some(w.content_digest()) {
            let identity = ObjectIdentity::new(w.namespace(), w.kind(), w.name());
            let identity = match existing
                .get("metadata")
                .and_then(|m| m.get("uid"))
                .and_then(Value::as_str)
            {
                Some(uid) => identity.with_uid(uid),
                None => identity,
            };
            return Attempt::Done(AdmissionResult::AlreadyExists(identity));
        }

        let reason = if stored_key != Some(key.as_str()) {
            format!(
                "{} {}/{} already exists and was created by a different request",
                w.kind(),
                w.namespace(),
                w.name()
            )
        } else {
            format!(
                "{} {}/{} already exists with different content",
                w.kind(),
                w.namespace(),
                w.name()
            )
        };
        Attempt::Done(AdmissionResult::Rejected(reason))
    }
}

fn timed_out(call: &str, call_timeout: Duration) -> Attempt {
    Attempt::Retry {
        detail: format!(
            "{} call timed out after {}ms",
            call,
            call_timeout.as_millis()
        ),
        retry_after: None,
    }
}

/// The normalized object with dedup-key and content-digest annotations.
fn annotated(w: &ValidatedWorkload, key: &DedupKey) -> Value {
    let mut object = w.object().clone();
    if let Some(metadata) = object.get_mut("metadata").and_then(Value::as_object_mut) {
        let annotations = metadata
            .entry("annotations")
            .or_insert_with(|| Value::Object(Map::new()));
        if let Some(annotations) = annotations.as_object_mut() {
            annotations.insert(
                DEDUP_KEY_ANNOTATION.to_string(),
                Value::String(key.as_str().to_string()),
            );
            annotations.insert(
                CONTENT_DIGEST_ANNOTATION.to_string(),
                Value::String(w.content_digest().to_string()),
            );
        }
    }
    object
}

fn annotation<'a>(object: &'a Value, name: &str) -> Option<&'a str> {
    object
        .get("metadata")?
        .get("annotations")?
        .get(name)?
        .as_str()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::control_plane::{Fault, InMemoryControlPlane};
    use crate::keyer;
    use crate::policy::Policy;
    use crate::workload::{WorkloadRequest, validate};

    const WEB_1: &str = r#"
apiVersion: v1
kind: Pod
metadata:
  name: web-1
spec:
  containers:
    - name: web
      image: nginx:1.27
"#;

    fn workload(doc: &str) -> ValidatedWorkload {
        validate(&WorkloadRequest::new(doc, "default"), &Policy::default()).unwrap()
    }

    fn forwarder(cp: Arc<InMemoryControlPlane>) -> Forwarder {
        Forwarder::new(cp, RetryPolicy::default(), Duration::from_secs(1))
    }

    #[tokio::test]
    async fn test_created_then_already_exists() {
        let cp = Arc::new(InMemoryControlPlane::new());
        let fwd = forwarder(cp.clone());
        let w = workload(WEB_1);
        let key = keyer::key(&w, None);

        let first = fwd.forward(&w, &key).await;
        assert!(matches!(first, AdmissionResult::Created(_)));

        let second = fwd.forward(&w, &key).await;
        match (&first, &second) {
            (AdmissionResult::Created(a), AdmissionResult::AlreadyExists(b)) => {
                assert_eq!(a, b);
                assert!(b.uid.is_some());
            }
            other => panic!("unexpected: {:?}", other),
        }
        assert_eq!(cp.object_count().await, 1);
    }

    #[tokio::test]
    async fn test_object_is_annotated() {
        let cp = Arc::new(InMemoryControlPlane::new());
        let w = workload(WEB_1);
        let key = keyer::key(&w, Some("order-42"));
        forwarder(cp.clone()).forward(&w, &key).await;

        let stored = cp.get_object("default", "Pod", "web-1").await.unwrap().unwrap();
        assert_eq!(annotation(&stored, DEDUP_KEY_ANNOTATION), Some(key.as_str()));
        assert_eq!(
            annotation(&stored, CONTENT_DIGEST_ANNOTATION),
            Some(w.content_digest())
        );
    }

    #[tokio::test]
    async fn test_different_content_is_rejected() {
        let cp = Arc::new(InMemoryControlPlane::new());
        let fwd = forwarder(cp.clone());
        let w = workload(WEB_1);
        fwd.forward(&w, &keyer::key(&w, None)).await;

        let changed = workload(&WEB_1.replace("nginx:1.27", "nginx:1.28"));
        let result = fwd.forward(&changed, &keyer::key(&changed, None)).await;
        match result {
            AdmissionResult::Rejected(reason) => assert!(reason.contains("different content")),
            other => panic!("unexpected: {:?}", other),
        }
        assert_eq!(cp.object_count().await, 1);
    }

    #[tokio::test]
    async fn test_different_token_is_rejected() {
        let cp = Arc::new(InMemoryControlPlane::new());
        let fwd = forwarder(cp.clone());
        let w = workload(WEB_1);
        fwd.forward(&w, &keyer::key(&w, Some("a"))).await;

        let result = fwd.forward(&w, &keyer::key(&w, Some("b"))).await;
        match result {
            AdmissionResult::Rejected(reason) => assert!(reason.contains("different request")),
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_foreign_object_is_rejected() {
        let cp = Arc::new(InMemoryControlPlane::new());
        let w = workload(WEB_1);
        cp.seed("default", "Pod", w.object().clone()).await;

        let result = forwarder(cp).forward(&w, &keyer::key(&w, None)).await;
        assert!(matches!(result, AdmissionResult::Rejected(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_transient_failures_then_success() {
        let cp = Arc::new(InMemoryControlPlane::new());
        cp.fail_next_n(2, RemoteError::Unavailable("503".into())).await;
        let w = workload(WEB_1);

        let result = forwarder(cp.clone()).forward(&w, &keyer::key(&w, None)).await;
        assert!(matches!(result, AdmissionResult::Created(_)));
        assert_eq!(cp.create_calls(), 3);
        assert_eq!(cp.object_count().await, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_persistent_transient_failure_is_bounded() {
        let cp = Arc::new(InMemoryControlPlane::new());
        cp.fail_next_n(10, RemoteError::Throttled { retry_after: None })
            .await;
        let w = workload(WEB_1);
        let fwd = forwarder(cp.clone());

        let started = tokio::time::Instant::now();
        let result = fwd.forward(&w, &keyer::key(&w, None)).await;
        assert!(matches!(result, AdmissionResult::Transient(_)));
        assert_eq!(cp.create_calls(), 3);
        assert!(started.elapsed() <= fwd.retry_policy().worst_case(fwd.call_timeout()));
        assert_eq!(cp.object_count().await, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_counts_as_transient() {
        let cp = Arc::new(InMemoryControlPlane::new());
        for _ in 0..3 {
            cp.inject_create(Fault::Hang).await;
        }
        let w = workload(WEB_1);

        let result = forwarder(cp.clone())
            .forward_with_timeout(&w, &keyer::key(&w, None), Some(Duration::from_millis(50)))
            .await;
        match result {
            AdmissionResult::Transient(detail) => assert!(detail.contains("timed out after 50ms")),
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_lost_response_is_recovered_as_already_exists() {
        let cp = Arc::new(InMemoryControlPlane::new());
        cp.inject_create(Fault::CommitThenHang).await;
        let w = workload(WEB_1);

        let result = forwarder(cp.clone()).forward(&w, &keyer::key(&w, None)).await;
        assert!(matches!(result, AdmissionResult::AlreadyExists(_)));
        assert_eq!(cp.create_calls(), 2);
        assert_eq!(cp.object_count().await, 1);
    }

    #[tokio::test]
    async fn test_fatal_errors_are_not_retried() {
        for err in [
            RemoteError::Unauthorized("token expired".into()),
            RemoteError::Invalid("bad spec".into()),
            RemoteError::Unknown("418".into()),
        ] {
            let cp = Arc::new(InMemoryControlPlane::new());
            cp.fail_next(err).await;
            let w = workload(WEB_1);

            let result = forwarder(cp.clone()).forward(&w, &keyer::key(&w, None)).await;
            assert!(matches!(result, AdmissionResult::Fatal(_)));
            assert_eq!(cp.create_calls(), 1);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_vanished_object_is_retried() {
        let cp = Arc::new(InMemoryControlPlane::new());
        // First create conflicts, then the object is gone when read.
        cp.fail_next(RemoteError::AlreadyExists).await;
        let w = workload(WEB_1);

        let result = forwarder(cp.clone()).forward(&w, &keyer::key(&w, None)).await;
        assert!(matches!(result, AdmissionResult::Created(_)));
        assert_eq!(cp.get_calls(), 1);
        assert_eq!(cp.create_calls(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_conflict_reads_stay_within_worst_case() {
        let cp = Arc::new(InMemoryControlPlane::new().with_latency(Duration::from_millis(900)));
        let w = workload(WEB_1);
        cp.seed("default", "Pod", w.object().clone()).await;
        for _ in 0..3 {
            cp.inject_get(Fault::Hang).await;
        }
        let retry = RetryPolicy {
            max_attempts: 3,
            base_delay: Duration::from_millis(10),
            max_delay: Duration::from_millis(100),
            jitter: 0.0,
        };
        let fwd = Forwarder::new(cp.clone(), retry, Duration::from_secs(1));

        let started = tokio::time::Instant::now();
        let result = fwd.forward(&w, &keyer::key(&w, None)).await;
        let elapsed = started.elapsed();

        assert!(matches!(result, AdmissionResult::Transient(_)));
        assert_eq!(cp.create_calls(), 3);
        assert_eq!(cp.get_calls(), 3);
        // Each attempt spent a slow create plus a full read timeout.
        assert!(elapsed > Duration::from_millis(3 * 1900));
        assert!(elapsed <= retry.worst_case(fwd.call_timeout()));
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_after_raises_delay() {
        let cp = Arc::new(InMemoryControlPlane::new());
        cp.fail_next(RemoteError::Throttled {
            retry_after: Some(Duration::from_secs(2)),
        })
        .await;
        let w = workload(WEB_1);

        let started = tokio::time::Instant::now();
        let result = forwarder(cp).forward(&w, &keyer::key(&w, None)).await;
        assert!(matches!(result, AdmissionResult::Created(_)));
        assert!(started.elapsed() >= Duration::from_secs(2));
    }

    #[test]
    fn test_success_labels() {
        let id = ObjectIdentity::new("default", "Pod", "web-1");
        assert!(AdmissionResult::Created(id.clone()).is_success());
        assert!(AdmissionResult::AlreadyExists(id).is_success());
        assert!(!AdmissionResult::Rejected("x".into()).is_success());
        assert_eq!(AdmissionResult::Transient("x".into()).label(), "transient");
    }
}
