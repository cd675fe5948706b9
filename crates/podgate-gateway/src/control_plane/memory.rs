// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! In-memory control plane for tests and local development.
//!
//! Objects live in a map keyed by `(namespace, kind, name)`; create is an
//! atomic insert-if-absent. Faults can be scripted per call to exercise the
//! forwarder's retry and classification paths.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use serde_json::Value;
use tokio::sync::Mutex;
use tracing::debug;

use super::{ControlPlane, ObjectIdentity, RemoteError};

type ObjectKey = (String, String, String);

/// A scripted fault for the next call.
#[derive(Debug, Clone)]
pub enum Fault {
    /// Fail with this error without touching the store.
    Error(RemoteError),
    /// Never answer (the caller's timeout fires).
    Hang,
    /// Store the object, then never answer. Models a lost response.
    CommitThenHang,
}

/// In-process control plane.
#[derive(Debug, Default)]
pub struct InMemoryControlPlane {
    objects: Mutex<HashMap<ObjectKey, Value>>,
    create_faults: Mutex<VecDeque<Fault>>,
    get_faults: Mutex<VecDeque<Fault>>,
    latency: Duration,
    create_calls: AtomicUsize,
    get_calls: AtomicUsize,
}

impl InMemoryControlPlane {
    /// Create an empty control plane with no latency.
    pub fn new() -> Self {
        Self::default()
    }

    /// Delay every call by `latency`.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Fail the next create call with `err`.
    pub async fn fail_next(&self, err: RemoteError) {
        self.inject_create(Fault::Error(err)).await;
    }

    /// Fail the next `n` create calls with `err`.
    pub async fn fail_next_n(&self, n: usize, err: RemoteError) {
        let mut faults = self.create_faults.lock().await;
        faults.extend(std::iter::repeat_n(Fault::Error(err), n));
    }

    /// Script a fault for the next create call.
    pub async fn inject_create(&self, fault: Fault) {
        self.create_faults.lock().await.push_back(fault);
    }

    /// Script a fault for the next get call.
    pub async fn inject_get(&self, fault: Fault) {
        self.get_faults.lock().await.push_back(fault);
    }

    /// Store an object directly, bypassing faults and counters.
    ///
    /// Returns `false` if the name is taken.
    pub async fn seed(&self, namespace: &str, kind: &str, object: Value) -> bool {
        let Some(name) = object_name(&object) else {
            return false;
        };
        let key = (namespace.to_string(), kind.to_string(), name);
        let mut objects = self.objects.lock().await;
        if objects.contains_key(&key) {
            return false;
        }
        objects.insert(key, object);
        true
    }

    /// Remove an object, returning it if present.
    pub async fn remove(&self, namespace: &str, kind: &str, name: &str) -> Option<Value> {
        let key = (namespace.to_string(), kind.to_string(), name.to_string());
        self.objects.lock().await.remove(&key)
    }

    /// Number of stored objects.
    pub async fn object_count(&self) -> usize {
        self.objects.lock().await.len()
    }

    /// Number of create calls received, including failed ones.
    pub fn create_calls(&self) -> usize {
        self.create_calls.load(Ordering::SeqCst)
    }

    /// Number of get calls received.
    pub fn get_calls(&self) -> usize {
        self.get_calls.load(Ordering::SeqCst)
    }

    async fn store(&self, key: ObjectKey, object: &Value) -> Result<ObjectIdentity, RemoteError> {
        let mut objects = self.objects.lock().await;
        if objects.contains_key(&key) {
            return Err(RemoteError::AlreadyExists);
        }

        let uid = uuid::Uuid::new_v4().to_string();
        let mut stored = object.clone();
        if let Some(metadata) = stored.get_mut("metadata").and_then(Value::as_object_mut) {
            metadata.insert("uid".to_string(), Value::String(uid.clone()));
            metadata.insert(
                "creationTimestamp".to_string(),
                Value::String(Utc::now().to_rfc3339()),
            );
        }

        let (namespace, kind, name) = key.clone();
        objects.insert(key, stored);
        debug!(%namespace, %kind, %name, %uid, "object stored");

        Ok(ObjectIdentity::new(namespace, kind, name).with_uid(uid))
    }
}

fn object_name(object: &Value) -> Option<String> {
    object
        .get("metadata")
        .and_then(|m| m.get("name"))
        .and_then(Value::as_str)
        .map(str::to_string)
}

#[async_trait]
impl ControlPlane for InMemoryControlPlane {
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn create_object(
        &self,
        namespace: &str,
        kind: &str,
        object: &Value,
    ) -> Result<ObjectIdentity, RemoteError> {
        self.create_calls.fetch_add(1, Ordering::SeqCst);

        let name = object_name(object)
            .ok_or_else(|| RemoteError::Invalid("metadata.name is required".to_string()))?;
        let key = (namespace.to_string(), kind.to_string(), name);

        let fault = self.create_faults.lock().await.pop_front();
        match fault {
            Some(Fault::Error(err)) => return Err(err),
            Some(Fault::Hang) => return std::future::pending().await,
            Some(Fault::CommitThenHang) => {
                if let Err(err) = self.store(key, object).await {
                    debug!(error = %err, "commit before hang did not store");
                }
                return std::future::pending().await;
            }
            None => {}
        }

        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }

        self.store(key, object).await
    }

    async fn get_object(
        &self,
        namespace: &str,
        kind: &str,
        name: &str,
    ) -> Result<Option<Value>, RemoteError> {
        self.get_calls.fetch_add(1, Ordering::SeqCst);

        let fault = self.get_faults.lock().await.pop_front();
        match fault {
            Some(Fault::Error(err)) => return Err(err),
            Some(Fault::Hang) | Some(Fault::CommitThenHang) => {
                return std::future::pending().await;
            }
            None => {}
        }

        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }

        let key = (namespace.to_string(), kind.to_string(), name.to_string());
        Ok(self.objects.lock().await.get(&key).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::Arc;

    fn pod(name: &str) -> Value {
        json!({
            "apiVersion": "v1",
            "kind": "Pod",
            "metadata": {"name": name, "namespace": "default"},
            "spec": {"containers": [{"name": "c", "image": "busybox"}]}
        })
    }

    #[tokio::test]
    async fn test_create_then_get() {
        let cp = InMemoryControlPlane::new();
        let id = cp.create_object("default", "Pod", &pod("a")).await.unwrap();
        assert_eq!(id.to_string(), "Pod/default/a");
        assert!(id.uid.is_some());

        let stored = cp.get_object("default", "Pod", "a").await.unwrap().unwrap();
        assert_eq!(stored["metadata"]["uid"], json!(id.uid.unwrap()));
        assert!(stored["metadata"]["creationTimestamp"].is_string());
        assert!(cp.get_object("default", "Pod", "b").await.unwrap().is_none());
        assert!(cp.get_object("other", "Pod", "a").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_duplicate_create_conflicts() {
        let cp = InMemoryControlPlane::new();
        cp.create_object("default", "Pod", &pod("a")).await.unwrap();
        let err = cp.create_object("default", "Pod", &pod("a")).await.unwrap_err();
        assert_eq!(err, RemoteError::AlreadyExists);
        assert_eq!(cp.object_count().await, 1);
        assert_eq!(cp.create_calls(), 2);
    }

    #[tokio::test]
    async fn test_concurrent_creates_store_once() {
        let cp = Arc::new(InMemoryControlPlane::new());
        let mut handles = Vec::new();
        for _ in 0..16 {
            let cp = cp.clone();
            handles.push(tokio::spawn(async move {
                cp.create_object("default", "Pod", &pod("race")).await
            }));
        }
        let mut created = 0;
        for handle in handles {
            if handle.await.unwrap().is_ok() {
                created += 1;
            }
        }
        assert_eq!(created, 1);
        assert_eq!(cp.object_count().await, 1);
    }

    #[tokio::test]
    async fn test_scripted_failures_are_consumed_in_order() {
        let cp = InMemoryControlPlane::new();
        cp.fail_next_n(2, RemoteError::Unavailable("down".into())).await;

        for _ in 0..2 {
            let err = cp.create_object("default", "Pod", &pod("a")).await.unwrap_err();
            assert!(err.is_transient());
        }
        assert!(cp.create_object("default", "Pod", &pod("a")).await.is_ok());
        assert_eq!(cp.create_calls(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_commit_then_hang_stores_object() {
        let cp = InMemoryControlPlane::new();
        cp.inject_create(Fault::CommitThenHang).await;

        let object = pod("a");
        let call = cp.create_object("default", "Pod", &object);
        let timed = tokio::time::timeout(Duration::from_secs(1), call).await;
        assert!(timed.is_err());
        assert_eq!(cp.object_count().await, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_commit_then_hang_keeps_existing_object() {
        let cp = InMemoryControlPlane::new();
        let original = pod("a");
        cp.create_object("default", "Pod", &original).await.unwrap();
        cp.inject_create(Fault::CommitThenHang).await;

        let mut replacement = pod("a");
        replacement["spec"]["containers"][0]["image"] = json!("nginx");
        let call = cp.create_object("default", "Pod", &replacement);
        assert!(tokio::time::timeout(Duration::from_secs(1), call).await.is_err());

        let stored = cp.get_object("default", "Pod", "a").await.unwrap().unwrap();
        assert_eq!(stored["spec"]["containers"][0]["image"], json!("busybox"));
        assert_eq!(cp.object_count().await, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_hanging_get_never_answers() {
        let cp = InMemoryControlPlane::new();
        cp.inject_get(Fault::Hang).await;
        let call = cp.get_object("default", "Pod", "a");
        assert!(tokio::time::timeout(Duration::from_secs(1), call).await.is_err());
        assert_eq!(cp.get_calls(), 1);
    }

    #[tokio::test]
    async fn test_seed_and_remove() {
        let cp = InMemoryControlPlane::new();
        assert!(cp.seed("default", "Pod", pod("a")).await);
        assert!(!cp.seed("default", "Pod", pod("a")).await);
        assert_eq!(cp.create_calls(), 0);
        assert!(cp.remove("default", "Pod", "a").await.is_some());
        assert_eq!(cp.object_count().await, 0);
    }

    #[tokio::test]
    async fn test_missing_name_is_invalid() {
        let cp = InMemoryControlPlane::new();
        let err = cp
            .create_object("default", "Pod", &json!({"metadata": {}}))
            .await
            .unwrap_err();
        assert!(matches!(err, RemoteError::Invalid(_)));
    }
}
