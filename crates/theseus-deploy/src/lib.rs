//! theseus-deploy — launch containers and record them.
//!
//! # Components
//!
//! - **`runtime`** — the container runtime boundary (`ContainerRuntime`,
//!   `RuntimeSession`) and the request/error types that cross it
//! - **`docker`** — `DockerRuntime`, the bollard-backed implementation
//! - **`orchestrator`** — the deploy state machine: pull → create → start →
//!   record, with one error kind per failed transition
//!
//! The store is always written last. A container that is running but not
//! recorded can be found and repaired; a record claiming a container runs
//! when it does not would mislead every reader of the store.

pub mod docker;
pub mod error;
pub mod orchestrator;
pub mod runtime;

#[cfg(any(test, feature = "test-util"))]
pub mod testing;

pub use docker::DockerRuntime;
pub use error::{DeployError, DeployResult, Remediation};
pub use orchestrator::{ContainerRecords, DeployStage, Deployment, Orchestrator};
pub use runtime::{
    ContainerRuntime, CreateSpec, RuntimeError, RuntimeErrorKind, RuntimeResult, RuntimeSession,
};
