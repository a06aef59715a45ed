//! Container runtime boundary.
//!
//! The orchestrator needs three calls from a runtime: pull an image, create
//! a container, start it. A [`RuntimeSession`] is acquired per deploy and
//! released when dropped, so every exit path gives it back.

use std::collections::BTreeMap;
use std::fmt;

use async_trait::async_trait;
use theseus_state::{Container, PortBinding};
use thiserror::Error;

pub type RuntimeResult<T> = Result<T, RuntimeError>;

/// Coarse classification of a runtime failure, enough to pick a response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuntimeErrorKind {
    /// The image or container does not exist.
    NotFound,
    /// A container with the requested name already exists.
    Conflict,
    /// The request could not be translated (bad restart policy, bad size).
    InvalidRequest,
    /// The runtime could not be reached.
    Unavailable,
    Other,
}

impl fmt::Display for RuntimeErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RuntimeErrorKind::NotFound => "not found",
            RuntimeErrorKind::Conflict => "conflict",
            RuntimeErrorKind::InvalidRequest => "invalid request",
            RuntimeErrorKind::Unavailable => "unavailable",
            RuntimeErrorKind::Other => "runtime error",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Error)]
#[error("{kind}: {message}")]
pub struct RuntimeError {
    pub kind: RuntimeErrorKind,
    pub message: String,
}

impl RuntimeError {
    pub fn new(kind: RuntimeErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

/// Everything the runtime needs to create one container.
///
/// `image` and `name` are always used; the rest is passed through from the
/// container record and may be empty.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateSpec {
    pub image: String,
    pub name: String,
    pub restart_policy: String,
    pub ports: Vec<PortBinding>,
    pub env: BTreeMap<String, String>,
    /// Host path → mount path.
    pub mounts: BTreeMap<String, String>,
    pub shm_size: String,
}

impl CreateSpec {
    pub fn from_container(container: &Container) -> Self {
        Self {
            image: container.image_name.clone(),
            name: container.container_name.clone(),
            restart_policy: container.restart_policy.clone(),
            ports: container.ports.clone(),
            env: container.environment_variables.clone(),
            mounts: container.volume_mounts.clone(),
            shm_size: container.shm_size.clone(),
        }
    }
}

/// Hands out sessions against a container runtime.
#[async_trait]
pub trait ContainerRuntime: Send + Sync {
    async fn connect(&self) -> RuntimeResult<Box<dyn RuntimeSession>>;
}

/// One acquired client session. Each call blocks until the runtime answers.
#[async_trait]
pub trait RuntimeSession: Send + Sync {
    /// Pull `image` (name with optional tag) into the runtime's image store.
    async fn pull_image(&self, image: &str) -> RuntimeResult<()>;

    /// Create a container; returns the runtime's id for it.
    async fn create_container(&self, spec: &CreateSpec) -> RuntimeResult<String>;

    async fn start_container(&self, runtime_id: &str) -> RuntimeResult<()>;
}
