//! Deployment error types.

use theseus_state::{Container, StateError};
use thiserror::Error;

use crate::orchestrator::DeployStage;
use crate::runtime::RuntimeError;

pub type DeployResult<T> = Result<T, DeployError>;

/// What a caller can safely do after a failed deploy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Remediation {
    /// Nothing exists on the runtime yet; run the deploy again.
    Retry,
    /// A container exists on the runtime but is not running. Look at it
    /// before retrying or removing it.
    InspectRuntime,
    /// The container is running; only the record is missing. Retry the save,
    /// never the start.
    RetrySave,
}

/// One variant per failed transition of the deploy state machine.
#[derive(Debug, Error)]
pub enum DeployError {
    #[error("container runtime unavailable: {source}")]
    RuntimeUnavailable {
        #[source]
        source: RuntimeError,
    },

    #[error("failed to pull image {image}: {source}")]
    ImagePullFailed {
        image: String,
        #[source]
        source: RuntimeError,
    },

    #[error("failed to create container {name}: {source}")]
    ContainerCreateFailed {
        name: String,
        #[source]
        source: RuntimeError,
    },

    /// The runtime holds a created but stopped container that is not recorded.
    #[error("failed to start container {runtime_id}: {source}")]
    ContainerStartFailed {
        runtime_id: String,
        #[source]
        source: RuntimeError,
    },

    /// The container is running on the runtime but the store write failed.
    #[error("container {runtime_id} is running but could not be recorded: {source}")]
    ReconciliationFailed {
        runtime_id: String,
        /// The record that should have been saved, status already `Active`.
        container: Box<Container>,
        #[source]
        source: StateError,
    },
}

impl DeployError {
    /// Last stage the deploy reached before failing.
    pub fn stage(&self) -> DeployStage {
        match self {
            DeployError::RuntimeUnavailable { .. } | DeployError::ImagePullFailed { .. } => {
                DeployStage::NotStarted
            }
            DeployError::ContainerCreateFailed { .. } => DeployStage::ImagePulled,
            DeployError::ContainerStartFailed { runtime_id, .. } => DeployStage::ContainerCreated {
                runtime_id: runtime_id.clone(),
            },
            DeployError::ReconciliationFailed { runtime_id, .. } => DeployStage::ContainerRunning {
                runtime_id: runtime_id.clone(),
            },
        }
    }

    pub fn remediation(&self) -> Remediation {
        match self {
            DeployError::RuntimeUnavailable { .. }
            | DeployError::ImagePullFailed { .. }
            | DeployError::ContainerCreateFailed { .. } => Remediation::Retry,
            DeployError::ContainerStartFailed { .. } => Remediation::InspectRuntime,
            DeployError::ReconciliationFailed { .. } => Remediation::RetrySave,
        }
    }

    /// The runtime error behind this failure, if it came from the runtime.
    pub fn runtime_error(&self) -> Option<&RuntimeError> {
        match self {
            DeployError::RuntimeUnavailable { source }
            | DeployError::ImagePullFailed { source, .. }
            | DeployError::ContainerCreateFailed { source, .. }
            | DeployError::ContainerStartFailed { source, .. } => Some(source),
            DeployError::ReconciliationFailed { .. } => None,
        }
    }
}
