//! Domain types for the Theseus entity store.
//!
//! Nested entities (the host inside a container, the team inside a user, the
//! organization inside a team) are value snapshots taken at write time. They
//! are not links and are never refreshed when the referenced record changes.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Deserializer, Serialize};

// ── Host machines ──────────────────────────────────────────────────

/// A physical or virtual machine capable of running containers.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct HostMachine {
    pub id: String,
    pub ip: String,
    /// Free-form operational state, e.g. "online" or "offline".
    pub status: String,
}

// ── Containers ─────────────────────────────────────────────────────

/// One published port: container-side `internal`, host-side `external`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct PortBinding {
    pub internal: u16,
    pub external: u16,
}

/// Lifecycle label of a container record.
///
/// Only the deployment orchestrator writes `Active`, and only after the
/// runtime reported a successful start.
///
/// Labels decode case-insensitively. "running" is the legacy spelling of
/// `Active`, and an empty or null label means `Declared`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub enum ContainerStatus {
    /// Described but never launched through the orchestrator.
    #[default]
    Declared,
    Active,
    Stopped,
    Restarting,
}

impl ContainerStatus {
    pub fn is_active(self) -> bool {
        self == ContainerStatus::Active
    }

    /// Parse a stored label. `None` for labels no release has written.
    pub fn from_label(label: &str) -> Option<Self> {
        const LABELS: &[(&str, ContainerStatus)] = &[
            ("", ContainerStatus::Declared),
            ("declared", ContainerStatus::Declared),
            ("active", ContainerStatus::Active),
            ("running", ContainerStatus::Active),
            ("stopped", ContainerStatus::Stopped),
            ("restarting", ContainerStatus::Restarting),
        ];
        LABELS
            .iter()
            .find(|(name, _)| name.eq_ignore_ascii_case(label))
            .map(|(_, status)| *status)
    }
}

impl<'de> Deserialize<'de> for ContainerStatus {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let label = Option::<String>::deserialize(deserializer)?.unwrap_or_default();
        ContainerStatus::from_label(&label).ok_or_else(|| {
            serde::de::Error::custom(format!("unknown container status {label:?}"))
        })
    }
}

/// Decode an explicit `null` as the type's default.
fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Option::unwrap_or_default)
}

impl fmt::Display for ContainerStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ContainerStatus::Declared => "Declared",
            ContainerStatus::Active => "Active",
            ContainerStatus::Stopped => "Stopped",
            ContainerStatus::Restarting => "Restarting",
        };
        f.write_str(s)
    }
}

/// A deployed (or declared) container instance.
///
/// The lower-case aliases accept records written by the first release of
/// the store, which used flat lower-case field names.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Container {
    /// Storage key. Empty on inbound requests that want one assigned.
    #[serde(default)]
    pub id: String,
    #[serde(alias = "name")]
    pub image_name: String,
    #[serde(alias = "container")]
    pub container_name: String,
    /// Snapshot of the host at write time.
    #[serde(default, alias = "hostmachine")]
    pub host_machine: HostMachine,
    /// e.g. "no", "always", "unless-stopped", "on-failure".
    #[serde(default, alias = "restartpolicy")]
    pub restart_policy: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub ports: Vec<PortBinding>,
    #[serde(default, alias = "environmentvariables", deserialize_with = "null_as_default")]
    pub environment_variables: BTreeMap<String, String>,
    /// Host path → mount path inside the container.
    #[serde(default, alias = "volumemounts", deserialize_with = "null_as_default")]
    pub volume_mounts: BTreeMap<String, String>,
    /// Human-readable size such as "1gb" or "512m".
    #[serde(default, alias = "shmsize")]
    pub shm_size: String,
    #[serde(default)]
    pub status: ContainerStatus,
}

impl Container {
    /// A declared container with only the fields the runtime needs.
    pub fn new(id: &str, image_name: &str, container_name: &str) -> Self {
        Self {
            id: id.to_string(),
            image_name: image_name.to_string(),
            container_name: container_name.to_string(),
            host_machine: HostMachine::default(),
            restart_policy: String::new(),
            ports: Vec::new(),
            environment_variables: BTreeMap::new(),
            volume_mounts: BTreeMap::new(),
            shm_size: String::new(),
            status: ContainerStatus::Declared,
        }
    }
}

// ── Users, teams, organizations ────────────────────────────────────

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Organization {
    pub name: String,
    #[serde(default)]
    pub description: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Team {
    pub name: String,
    #[serde(default)]
    pub description: String,
    /// Snapshot of the owning organization at write time.
    #[serde(default)]
    pub organization: Organization,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub username: String,
    #[serde(alias = "password_hash")]
    pub password_hash: String,
    #[serde(default)]
    pub role: String,
    /// Snapshot of the owning team at write time.
    #[serde(default)]
    pub team: Team,
}
