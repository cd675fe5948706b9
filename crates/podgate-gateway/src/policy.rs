// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Capability deny-list applied to pod specs before admission.
//!
//! A [`Policy`] names the privileged capabilities a workload may not request.
//! [`requested_capabilities`] walks a pod spec and reports every capability it
//! asks for together with where it was found, so a rejection can point at the
//! offending container or volume.

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use serde_json::Value;
use thiserror::Error;

/// Deny-list used when none is configured.
pub const DEFAULT_DENIED_CAPABILITIES: &str =
    "privileged,allowPrivilegeEscalation,hostNetwork,hostPID,hostIPC,hostPath";

/// A privileged capability a pod spec can request.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Capability {
    /// `securityContext.privileged: true`
    Privileged,
    /// `securityContext.allowPrivilegeEscalation: true`
    AllowPrivilegeEscalation,
    /// `spec.hostNetwork: true`
    HostNetwork,
    /// `spec.hostPID: true`
    HostPid,
    /// `spec.hostIPC: true`
    HostIpc,
    /// A `hostPath` volume.
    HostPath,
    /// A Linux capability from `securityContext.capabilities.add`,
    /// stored upper-case without the `CAP_` prefix.
    Linux(String),
}

impl Capability {
    /// Build a Linux capability, normalizing `cap_sys_admin` to `SYS_ADMIN`.
    pub fn linux(name: &str) -> Self {
        let upper = name.trim().to_ascii_uppercase();
        let bare = upper.strip_prefix("CAP_").unwrap_or(&upper);
        Capability::Linux(bare.to_string())
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Capability::Privileged => f.write_str("privileged"),
            Capability::AllowPrivilegeEscalation => f.write_str("allowPrivilegeEscalation"),
            Capability::HostNetwork => f.write_str("hostNetwork"),
            Capability::HostPid => f.write_str("hostPID"),
            Capability::HostIpc => f.write_str("hostIPC"),
            Capability::HostPath => f.write_str("hostPath"),
            Capability::Linux(name) => write!(f, "cap:{}", name),
        }
    }
}

/// Error for an unrecognized capability name.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown capability: {0}")]
pub struct ParseCapabilityError(pub String);

impl FromStr for Capability {
    type Err = ParseCapabilityError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if let Some(name) = s.strip_prefix("cap:") {
            if name.trim().is_empty() {
                return Err(ParseCapabilityError(s.to_string()));
            }
            return Ok(Capability::linux(name));
        }
        match s.to_ascii_lowercase().as_str() {
            "privileged" => Ok(Capability::Privileged),
            "allowprivilegeescalation" => Ok(Capability::AllowPrivilegeEscalation),
            "hostnetwork" => Ok(Capability::HostNetwork),
            "hostpid" => Ok(Capability::HostPid),
            "hostipc" => Ok(Capability::HostIpc),
            "hostpath" => Ok(Capability::HostPath),
            _ => Err(ParseCapabilityError(s.to_string())),
        }
    }
}

/// Admission policy: the set of denied capabilities.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Policy {
    denied: BTreeSet<Capability>,
}

impl Default for Policy {
    fn default() -> Self {
        Self::new([
            Capability::Privileged,
            Capability::AllowPrivilegeEscalation,
            Capability::HostNetwork,
            Capability::HostPid,
            Capability::HostIpc,
            Capability::HostPath,
        ])
    }
}

impl Policy {
    /// Create a policy denying the given capabilities.
    pub fn new(denied: impl IntoIterator<Item = Capability>) -> Self {
        Self {
            denied: denied.into_iter().collect(),
        }
    }

    /// A policy that denies nothing.
    pub fn permissive() -> Self {
        Self {
            denied: BTreeSet::new(),
        }
    }

    /// Parse a comma-separated deny-list such as `privileged,hostPath,cap:SYS_ADMIN`.
    ///
    /// Empty entries are ignored, so an empty string yields a permissive policy.
    pub fn from_list(list: &str) -> Result<Self, ParseCapabilityError> {
        let denied = list
            .split(',')
            .map(str::trim)
            .filter(|entry| !entry.is_empty())
            .map(Capability::from_str)
            .collect::<Result<BTreeSet<_>, _>>()?;
        Ok(Self { denied })
    }

    /// Whether `capability` is denied.
    ///
    /// Requesting the Linux capability `ALL` is denied as soon as any Linux
    /// capability is on the list.
    pub fn denies(&self, capability: &Capability) -> bool {
        if self.denied.contains(capability) {
            return true;
        }
        match capability {
            Capability::Linux(name) if name == "ALL" => self
                .denied
                .iter()
                .any(|c| matches!(c, Capability::Linux(_))),
            _ => false,
        }
    }

    /// Iterate over the denied capabilities in a stable order.
    pub fn denied(&self) -> impl Iterator<Item = &Capability> {
        self.denied.iter()
    }

    /// Return the first requested capability this policy denies.
    pub fn first_violation<'a>(
        &self,
        requested: &'a [RequestedCapability],
    ) -> Option<&'a RequestedCapability> {
        requested.iter().find(|r| self.denies(&r.capability))
    }
}

/// A capability requested by a pod spec, with the place it was requested.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestedCapability {
    /// The capability asked for.
    pub capability: Capability,
    /// Human-readable location, e.g. `container "app"` or `volume "data"`.
    pub subject: String,
}

/// Collect every capability requested by a pod `spec`.
///
/// Covers pod-level host namespaces, `hostPath` volumes, and the security
/// context of regular, init and ephemeral containers.
pub fn requested_capabilities(spec: &Value) -> Vec<RequestedCapability> {
    let mut requested = Vec::new();

    for (field, capability) in [
        ("hostNetwork", Capability::HostNetwork),
        ("hostPID", Capability::HostPid),
        ("hostIPC", Capability::HostIpc),
    ] {
        if spec.get(field).and_then(Value::as_bool) == Some(true) {
            requested.push(RequestedCapability {
                capability,
                subject: "pod spec".to_string(),
            });
        }
    }

    if let Some(volumes) = spec.get("volumes").and_then(Value::as_array) {
        for volume in volumes {
            if volume.get("hostPath").is_some() {
                let name = volume.get("name").and_then(Value::as_str).unwrap_or("");
                requested.push(RequestedCapability {
                    capability: Capability::HostPath,
                    subject: format!("volume \"{}\"", name),
                });
            }
        }
    }

    for list in ["initContainers", "containers", "ephemeralContainers"] {
        let Some(containers) = spec.get(list).and_then(Value::as_array) else {
            continue;
        };
        for container in containers {
            let name = container.get("name").and_then(Value::as_str).unwrap_or("");
            let subject = format!("container \"{}\"", name);
            let Some(ctx) = container.get("securityContext") else {
                continue;
            };

            if ctx.get("privileged").and_then(Value::as_bool) == Some(true) {
                requested.push(RequestedCapability {
                    capability: Capability::Privileged,
                    subject: subject.clone(),
                });
            }
            if ctx.get("allowPrivilegeEscalation").and_then(Value::as_bool) == Some(true) {
                requested.push(RequestedCapability {
                    capability: Capability::AllowPrivilegeEscalation,
                    subject: subject.clone(),
                });
            }
            let added = ctx
                .get("capabilities")
                .and_then(|c| c.get("add"))
                .and_then(Value::as_array);
            for cap in added.into_iter().flatten().filter_map(Value::as_str) {
                requested.push(RequestedCapability {
                    capability: Capability::linux(cap),
                    subject: subject.clone(),
                });
            }
        }
    }

    requested
}
