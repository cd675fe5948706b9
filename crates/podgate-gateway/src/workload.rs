// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Workload requests and the request validator.
//!
//! [`validate`] is the only way to obtain a [`ValidatedWorkload`]. It parses
//! the raw document, checks structure, naming and policy, and produces the
//! normalized object that is later sent to the control plane. It never
//! touches the network.

use std::collections::HashSet;
use std::sync::LazyLock;
use std::time::Duration;

use regex::Regex;
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};
use thiserror::Error;

use crate::policy::{Capability, Policy, requested_capabilities};

/// Annotation carrying the deduplication key on created objects.
pub const DEDUP_KEY_ANNOTATION: &str = "podgate.io/dedup-key";
/// Annotation carrying the content digest on created objects.
pub const CONTENT_DIGEST_ANNOTATION: &str = "podgate.io/content-digest";

/// Kinds the gateway knows how to admit.
pub const SUPPORTED_KINDS: &[&str] = &["Pod"];

const MAX_LABEL_LEN: usize = 63;
const MAX_SUBDOMAIN_LEN: usize = 253;

static DNS1123_LABEL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[a-z0-9]([-a-z0-9]*[a-z0-9])?$").expect("valid DNS-1123 label regex")
});

static DNS1123_SUBDOMAIN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[a-z0-9]([-a-z0-9]*[a-z0-9])?(\.[a-z0-9]([-a-z0-9]*[a-z0-9])?)*$")
        .expect("valid DNS-1123 subdomain regex")
});

/// An inbound workload-creation request, as received by a transport adapter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkloadRequest {
    /// Raw workload document (YAML or JSON).
    pub document: String,
    /// Target namespace. Empty means "use the document's namespace".
    pub namespace: String,
    /// Caller-supplied idempotency token.
    pub idempotency_token: Option<String>,
    /// Per-call control-plane timeout override.
    pub timeout: Option<Duration>,
}

impl WorkloadRequest {
    /// Create a request without token or timeout override.
    pub fn new(document: impl Into<String>, namespace: impl Into<String>) -> Self {
        Self {
            document: document.into(),
            namespace: namespace.into(),
            idempotency_token: None,
            timeout: None,
        }
    }

    /// Attach an idempotency token.
    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.idempotency_token = Some(token.into());
        self
    }

    /// Override the per-call control-plane timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

/// A container declared by a workload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Container {
    /// Container name (DNS-1123 label).
    pub name: String,
    /// Image reference.
    pub image: String,
}

/// A workload that passed validation.
///
/// Only [`validate`] constructs this type.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidatedWorkload {
    kind: String,
    name: String,
    namespace: String,
    containers: Vec<Container>,
    object: Value,
    content_digest: String,
}

impl ValidatedWorkload {
    /// Object kind, e.g. `Pod`.
    pub fn kind(&self) -> &str {
        &self.kind
    }

    /// Object name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Effective namespace.
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Regular containers, in document order.
    pub fn containers(&self) -> &[Container] {
        &self.containers
    }

    /// The normalized object: `metadata.namespace` filled in, reserved
    /// annotations stripped.
    pub fn object(&self) -> &Value {
        &self.object
    }

    /// Hex SHA-256 of the canonical JSON form of [`object`](Self::object).
    pub fn content_digest(&self) -> &str {
        &self.content_digest
    }
}

/// Why a workload was refused before reaching the control plane.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[non_exhaustive]
pub enum ValidationError {
    /// The document is not well-formed YAML/JSON or not a mapping.
    #[error("parse error: {0}")]
    Parse(String),

    /// A required field is missing or malformed.
    #[error("schema error: {0}")]
    Schema(String),

    /// The document requests a denied capability.
    #[error("policy error: {subject} requests denied capability {capability}")]
    Policy {
        /// The denied capability.
        capability: Capability,
        /// Where in the document it was requested.
        subject: String,
    },
}

fn schema(msg: impl Into<String>) -> ValidationError {
    ValidationError::Schema(msg.into())
}

/// Whether `s` is a DNS-1123 label (namespaces, container names).
pub fn is_dns1123_label(s: &str) -> bool {
    s.len() <= MAX_LABEL_LEN && DNS1123_LABEL.is_match(s)
}

/// Whether `s` is a DNS-1123 subdomain (object names).
pub fn is_dns1123_subdomain(s: &str) -> bool {
    s.len() <= MAX_SUBDOMAIN_LEN && DNS1123_SUBDOMAIN.is_match(s)
}

/// Hex SHA-256 over the canonical JSON serialization of `object`.
///
/// Map keys are written in sorted order, so formatting and key order of the
/// source document never change the digest.
pub fn content_digest(object: &Value) -> String {
    let mut canonical = String::new();
    write_canonical(object, &mut canonical);
    hex::encode(Sha256::digest(canonical.as_bytes()))
}

fn write_canonical(value: &Value, out: &mut String) {
    match value {
        Value::Object(map) => {
            let mut entries: Vec<_> = map.iter().collect();
            entries.sort_by(|a, b| a.0.cmp(b.0));
            out.push('{');
            for (i, (k, v)) in entries.into_iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                out.push_str(&Value::String(k.clone()).to_string());
                out.push(':');
                write_canonical(v, out);
            }
            out.push('}');
        }
        Value::Array(items) => {
            out.push('[');
            for (i, v) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_canonical(v, out);
            }
            out.push(']');
        }
        scalar => out.push_str(&scalar.to_string()),
    }
}

/// Parse and validate a raw workload request against `policy`.
pub fn validate(raw: &WorkloadRequest, policy: &Policy) -> Result<ValidatedWorkload, ValidationError> {
    if raw.timeout.is_some_and(|t| t.is_zero()) {
        return Err(ValidationError::Parse(
            "request timeout must be greater than zero".to_string(),
        ));
    }
    let mut object = parse_document(&raw.document)?;

    let root = object
        .as_object()
        .ok_or_else(|| ValidationError::Parse("document must be a mapping".to_string()))?;

    let kind = required_str(root, "kind")?;
    if !SUPPORTED_KINDS.contains(&kind) {
        return Err(schema(format!(
            "unsupported kind \"{}\" (supported: {})",
            kind,
            SUPPORTED_KINDS.join(", ")
        )));
    }
    let kind = kind.to_string();

    let api_version = required_str(root, "apiVersion")?;
    if api_version != "v1" {
        return Err(schema(format!(
            "unsupported apiVersion \"{}\" for kind {}, expected v1",
            api_version, kind
        )));
    }

    let metadata = root
        .get("metadata")
        .and_then(Value::as_object)
        .ok_or_else(|| schema("metadata is required and must be a mapping"))?;

    let name = object_name(metadata)?;
    let namespace = effective_namespace(&raw.namespace, metadata)?;

    if let Some(annotations) = metadata.get("annotations")
        && !annotations.is_object()
    {
        return Err(schema("metadata.annotations must be a mapping"));
    }

    let spec = root
        .get("spec")
        .filter(|s| s.is_object())
        .ok_or_else(|| schema("spec is required and must be a mapping"))?;

    let containers = pod_containers(spec)?;

    if let Some(violation) = policy.first_violation(&requested_capabilities(spec)) {
        return Err(ValidationError::Policy {
            capability: violation.capability.clone(),
            subject: violation.subject.clone(),
        });
    }

    normalize(&mut object, &namespace);
    let content_digest = content_digest(&object);

    Ok(ValidatedWorkload {
        kind,
        name,
        namespace,
        containers,
        object,
        content_digest,
    })
}

fn parse_document(document: &str) -> Result<Value, ValidationError> {
    if document.trim().is_empty() {
        return Err(ValidationError::Parse("document is empty".to_string()));
    }
    // Strict JSON first so tab-indented JSON still parses; YAML flow
    // mappings with bare keys fall through to the YAML parser.
    if document.trim_start().starts_with('{')
        && let Ok(value) = serde_json::from_str::<Value>(document)
    {
        return Ok(value);
    }
    serde_yaml::from_str::<Value>(document).map_err(|e| ValidationError::Parse(e.to_string()))
}

fn required_str<'a>(map: &'a Map<String, Value>, field: &str) -> Result<&'a str, ValidationError> {
    match map.get(field) {
        Some(Value::String(s)) if !s.trim().is_empty() => Ok(s.as_str()),
        Some(Value::String(_)) | None | Some(Value::Null) => {
            Err(schema(format!("{} is required", field)))
        }
        Some(_) => Err(schema(format!("{} must be a string", field))),
    }
}

fn object_name(metadata: &Map<String, Value>) -> Result<String, ValidationError> {
    let name = match metadata.get("name") {
        Some(Value::String(s)) if !s.is_empty() => s,
        Some(Value::String(_)) | None | Some(Value::Null) => {
            if metadata.contains_key("generateName") {
                return Err(schema(
                    "metadata.generateName is not supported, set metadata.name",
                ));
            }
            return Err(schema("metadata.name is required"));
        }
        Some(_) => return Err(schema("metadata.name must be a string")),
    };

    if !is_dns1123_subdomain(name) {
        return Err(schema(format!(
            "metadata.name \"{}\" is not a valid DNS-1123 subdomain",
            name
        )));
    }
    Ok(name.clone())
}

fn effective_namespace(
    requested: &str,
    metadata: &Map<String, Value>,
) -> Result<String, ValidationError> {
    let document = match metadata.get("namespace") {
        Some(Value::String(s)) if !s.is_empty() => Some(s.as_str()),
        Some(Value::String(_)) | None | Some(Value::Null) => None,
        Some(_) => return Err(schema("metadata.namespace must be a string")),
    };
    let requested = requested.trim();

    let namespace = match (requested.is_empty(), document) {
        (false, Some(doc)) if doc != requested => {
            return Err(schema(format!(
                "namespace mismatch: request targets \"{}\" but document declares \"{}\"",
                requested, doc
            )));
        }
        (false, _) => requested,
        (true, Some(doc)) => doc,
        (true, None) => return Err(schema("namespace is required")),
    };

    if !is_dns1123_label(namespace) {
        return Err(schema(format!(
            "namespace \"{}\" is not a valid DNS-1123 label",
            namespace
        )));
    }
    Ok(namespace.to_string())
}

fn pod_containers(spec: &Value) -> Result<Vec<Container>, ValidationError> {
    let containers = match spec.get("containers") {
        Some(Value::Array(list)) if !list.is_empty() => list,
        Some(Value::Array(_)) | None | Some(Value::Null) => {
            return Err(schema("spec.containers must contain at least one container"));
        }
        Some(_) => return Err(schema("spec.containers must be a list")),
    };

    let init = match spec.get("initContainers") {
        Some(Value::Array(list)) => list.as_slice(),
        None | Some(Value::Null) => &[],
        Some(_) => return Err(schema("spec.initContainers must be a list")),
    };

    let mut seen = HashSet::new();
    for (field, container) in init
        .iter()
        .map(|c| ("spec.initContainers", c))
        .chain(containers.iter().map(|c| ("spec.containers", c)))
    {
        let parsed = container_ref(field, container)?;
        if !seen.insert(parsed.name.clone()) {
            return Err(schema(format!(
                "duplicate container name \"{}\"",
                parsed.name
            )));
        }
    }

    containers
        .iter()
        .map(|c| container_ref("spec.containers", c))
        .collect()
}

fn container_ref(field: &str, container: &Value) -> Result<Container, ValidationError> {
    let map = container
        .as_object()
        .ok_or_else(|| schema(format!("{} entries must be mappings", field)))?;

    let name = match map.get("name") {
        Some(Value::String(s)) if is_dns1123_label(s) => s.clone(),
        Some(Value::String(s)) => {
            return Err(schema(format!(
                "{}: container name \"{}\" is not a valid DNS-1123 label",
                field, s
            )));
        }
        _ => return Err(schema(format!("{}: container name is required", field))),
    };

    let image = match map.get("image") {
        Some(Value::String(s)) if !s.trim().is_empty() => s,
        _ => {
            return Err(schema(format!(
                "{}: container \"{}\" has no image",
                field, name
            )));
        }
    };
    if image.chars().any(char::is_whitespace) {
        return Err(schema(format!(
            "{}: container \"{}\" image \"{}\" contains whitespace",
            field, name, image
        )));
    }

    Ok(Container {
        name,
        image: image.clone(),
    })
}

/// Fill in the effective namespace and drop reserved annotations so the
/// digest only covers what the caller asked for.
fn normalize(object: &mut Value, namespace: &str) {
    let Some(metadata) = object.get_mut("metadata").and_then(Value::as_object_mut) else {
        return;
    };
    metadata.insert(
        "namespace".to_string(),
        Value::String(namespace.to_string()),
    );

    let now_empty = match metadata.get_mut("annotations").and_then(Value::as_object_mut) {
        Some(annotations) => {
            annotations.remove(DEDUP_KEY_ANNOTATION);
            annotations.remove(CONTENT_DIGEST_ANNOTATION);
            annotations.is_empty()
        }
        None => false,
    };
    if now_empty {
        metadata.remove("annotations");
    }
}
