//! Deployment orchestrator — drives one container from image to record.
//!
//! The deploy walks a one-way state machine:
//!
//! ```text
//! NotStarted ─pull→ ImagePulled ─create→ ContainerCreated ─start→ ContainerRunning ─save→ Recorded
//! ```
//!
//! Each transition has its own [`DeployError`] variant so the caller can
//! choose the right recovery. Nothing is retried and no timeout is applied
//! here; both belong to the caller. A container whose start fails is left
//! on the runtime as-is.

use std::fmt;
use std::sync::Arc;

use serde::Serialize;
use theseus_state::{Container, ContainerStatus, Repository, StateResult};
use tracing::{debug, error, info, warn};

use crate::error::{DeployError, DeployResult};
use crate::runtime::{ContainerRuntime, CreateSpec};

/// Where a deploy stands.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeployStage {
    NotStarted,
    ImagePulled,
    ContainerCreated { runtime_id: String },
    ContainerRunning { runtime_id: String },
    Recorded { runtime_id: String },
}

impl fmt::Display for DeployStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            DeployStage::NotStarted => "not-started",
            DeployStage::ImagePulled => "image-pulled",
            DeployStage::ContainerCreated { .. } => "container-created",
            DeployStage::ContainerRunning { .. } => "container-running",
            DeployStage::Recorded { .. } => "recorded",
        };
        f.write_str(s)
    }
}

/// Durable destination for container records.
///
/// Implemented by the container repository; tests substitute a failing one.
pub trait ContainerRecords: Send + Sync {
    fn record(&self, container: &Container) -> StateResult<()>;
}

impl ContainerRecords for Repository<Container> {
    fn record(&self, container: &Container) -> StateResult<()> {
        self.save(container)
    }
}

/// A successfully launched and recorded container.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Deployment {
    pub container: Container,
    pub runtime_id: String,
}

#[derive(Clone)]
pub struct Orchestrator {
    runtime: Arc<dyn ContainerRuntime>,
    records: Arc<dyn ContainerRecords>,
}

impl Orchestrator {
    pub fn new(runtime: Arc<dyn ContainerRuntime>, records: Arc<dyn ContainerRecords>) -> Self {
        Self { runtime, records }
    }

    /// Pull, create, start, then record `container` with status `Active`.
    pub async fn deploy(&self, container: Container) -> DeployResult<Deployment> {
        info!(
            id = %container.id,
            image = %container.image_name,
            name = %container.container_name,
            "deploying container"
        );

        let session = self
            .runtime
            .connect()
            .await
            .map_err(|source| DeployError::RuntimeUnavailable { source })?;

        let mut stage = DeployStage::NotStarted;
        loop {
            stage = match stage {
                DeployStage::NotStarted => {
                    session
                        .pull_image(&container.image_name)
                        .await
                        .map_err(|source| {
                            warn!(image = %container.image_name, %source, "image pull failed");
                            DeployError::ImagePullFailed {
                                image: container.image_name.clone(),
                                source,
                            }
                        })?;
                    DeployStage::ImagePulled
                }
                DeployStage::ImagePulled => {
                    let spec = CreateSpec::from_container(&container);
                    let runtime_id = session.create_container(&spec).await.map_err(|source| {
                        warn!(name = %spec.name, %source, "container create failed");
                        DeployError::ContainerCreateFailed {
                            name: spec.name.clone(),
                            source,
                        }
                    })?;
                    DeployStage::ContainerCreated { runtime_id }
                }
                DeployStage::ContainerCreated { runtime_id } => {
                    if let Err(source) = session.start_container(&runtime_id).await {
                        // Left in place for inspection.
                        error!(%runtime_id, %source, "container created but failed to start");
                        return Err(DeployError::ContainerStartFailed { runtime_id, source });
                    }
                    DeployStage::ContainerRunning { runtime_id }
                }
                DeployStage::ContainerRunning { runtime_id } => {
                    let mut recorded = container.clone();
                    recorded.status = ContainerStatus::Active;
                    if let Err(source) = self.records.record(&recorded) {
                        error!(
                            %runtime_id,
                            id = %recorded.id,
                            %source,
                            "container running but not recorded"
                        );
                        return Err(DeployError::ReconciliationFailed {
                            runtime_id,
                            container: Box::new(recorded),
                            source,
                        });
                    }
                    DeployStage::Recorded { runtime_id }
                }
                DeployStage::Recorded { runtime_id } => {
                    info!(id = %container.id, %runtime_id, "container deployed");
                    let mut container = container;
                    container.status = ContainerStatus::Active;
                    return Ok(Deployment {
                        container,
                        runtime_id,
                    });
                }
            };
            debug!(id = %container.id, %stage, "deploy stage reached");
        }
    }

    /// Redo only the final save for a container already running as `runtime_id`.
    ///
    /// This is the recovery for [`DeployError::ReconciliationFailed`] and the
    /// runtime is not consulted: the caller must hold that error, whose
    /// `runtime_id` and container are what belong here. Anything else writes
    /// an `Active` record no deploy ever produced.
    pub fn record(&self, container: Container, runtime_id: &str) -> DeployResult<Deployment> {
        warn!(id = %container.id, %runtime_id, "recording container without runtime check");
        let mut container = container;
        container.status = ContainerStatus::Active;
        match self.records.record(&container) {
            Ok(()) => {
                info!(id = %container.id, %runtime_id, "running container recorded");
                Ok(Deployment {
                    container,
                    runtime_id: runtime_id.to_string(),
                })
            }
            Err(source) => Err(DeployError::ReconciliationFailed {
                runtime_id: runtime_id.to_string(),
                container: Box::new(container),
                source,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Remediation;
    use crate::runtime::RuntimeErrorKind;
    use crate::testing::{FailingRecords, FakeRuntime};
    use theseus_state::{EntityStore, Repositories, StateError};

    fn setup(runtime: FakeRuntime) -> (Arc<FakeRuntime>, Repositories, Orchestrator) {
        let store = EntityStore::open_in_memory().unwrap();
        let repos = Repositories::new(&store);
        let runtime = Arc::new(runtime);
        let orchestrator = Orchestrator::new(runtime.clone(), Arc::new(repos.containers.clone()));
        (runtime, repos, orchestrator)
    }

    fn webtop() -> Container {
        let mut c = Container::new("550e8400", "lscr.io/linuxserver/webtop:latest", "webtop_dev");
        c.restart_policy = "unless-stopped".to_string();
        c
    }

    #[tokio::test]
    async fn successful_deploy_records_active_container() {
        let (runtime, repos, orchestrator) = setup(FakeRuntime::new());

        let deployment = orchestrator.deploy(webtop()).await.unwrap();

        assert_eq!(deployment.container.status, ContainerStatus::Active);
        let stored = repos.containers.get_by_key("550e8400").unwrap();
        assert_eq!(stored.status, ContainerStatus::Active);
        assert_eq!(stored.image_name, "lscr.io/linuxserver/webtop:latest");
        assert_eq!(
            runtime.calls(),
            vec![
                "pull lscr.io/linuxserver/webtop:latest".to_string(),
                "create webtop_dev".to_string(),
                format!("start {}", deployment.runtime_id),
            ]
        );
        assert_eq!(runtime.open_sessions(), 0);
    }

    #[tokio::test]
    async fn unresolvable_image_records_nothing() {
        let (runtime, repos, orchestrator) =
            setup(FakeRuntime::new().fail_pull(RuntimeErrorKind::NotFound));
        let before = repos.containers.list_all().unwrap();

        let err = orchestrator.deploy(webtop()).await.unwrap_err();

        assert!(matches!(err, DeployError::ImagePullFailed { .. }));
        assert_eq!(err.stage(), DeployStage::NotStarted);
        assert_eq!(err.remediation(), Remediation::Retry);
        assert_eq!(repos.containers.list_all().unwrap(), before);
        assert_eq!(runtime.calls().len(), 1);
        assert_eq!(runtime.open_sessions(), 0);
    }

    #[tokio::test]
    async fn create_failure_stops_before_start() {
        let (runtime, repos, orchestrator) =
            setup(FakeRuntime::new().fail_create(RuntimeErrorKind::Conflict));

        let err = orchestrator.deploy(webtop()).await.unwrap_err();

        assert!(matches!(err, DeployError::ContainerCreateFailed { .. }));
        assert_eq!(err.stage(), DeployStage::ImagePulled);
        assert_eq!(err.runtime_error().unwrap().kind, RuntimeErrorKind::Conflict);
        assert!(runtime.calls().iter().all(|c| !c.starts_with("start")));
        assert!(repos.containers.list_all().unwrap().is_empty());
    }

    #[tokio::test]
    async fn start_failure_never_saves_and_leaves_container() {
        let (runtime, repos, orchestrator) =
            setup(FakeRuntime::new().fail_start(RuntimeErrorKind::Other));

        let err = orchestrator.deploy(webtop()).await.unwrap_err();

        match &err {
            DeployError::ContainerStartFailed { runtime_id, .. } => {
                assert!(runtime.created().contains(runtime_id));
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(err.remediation(), Remediation::InspectRuntime);
        assert!(matches!(
            repos.containers.get_by_key("550e8400"),
            Err(StateError::NotFound { .. })
        ));
        assert_eq!(runtime.open_sessions(), 0);
    }

    #[tokio::test]
    async fn save_failure_is_reconciliation_failure() {
        let runtime = Arc::new(FakeRuntime::new());
        let orchestrator = Orchestrator::new(runtime.clone(), Arc::new(FailingRecords));

        let err = orchestrator.deploy(webtop()).await.unwrap_err();

        match &err {
            DeployError::ReconciliationFailed {
                container, source, ..
            } => {
                assert_eq!(container.status, ContainerStatus::Active);
                assert!(matches!(source, StateError::TransactionFailed(_)));
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(err.remediation(), Remediation::RetrySave);
        assert!(matches!(err.stage(), DeployStage::ContainerRunning { .. }));
        assert!(err.runtime_error().is_none());
        assert_eq!(runtime.open_sessions(), 0);
    }

    #[tokio::test]
    async fn unreachable_runtime_touches_nothing() {
        let (runtime, repos, orchestrator) = setup(FakeRuntime::new().unreachable());

        let err = orchestrator.deploy(webtop()).await.unwrap_err();

        assert!(matches!(err, DeployError::RuntimeUnavailable { .. }));
        assert!(runtime.calls().is_empty());
        assert!(repos.containers.list_all().unwrap().is_empty());
    }

    #[tokio::test]
    async fn record_retries_only_the_save() {
        let (runtime, repos, orchestrator) = setup(FakeRuntime::new());

        let deployment = orchestrator.record(webtop(), "abc123").unwrap();

        assert_eq!(deployment.runtime_id, "abc123");
        assert!(runtime.calls().is_empty());
        let stored = repos.containers.get_by_key("550e8400").unwrap();
        assert_eq!(stored.status, ContainerStatus::Active);
    }

    #[tokio::test]
    async fn create_receives_container_settings() {
        let (runtime, _, orchestrator) = setup(FakeRuntime::new());
        let mut container = webtop();
        container
            .environment_variables
            .insert("TZ".to_string(), "America/Toronto".to_string());

        orchestrator.deploy(container).await.unwrap();

        let specs = runtime.create_specs();
        assert_eq!(specs.len(), 1);
        assert_eq!(specs[0].restart_policy, "unless-stopped");
        assert_eq!(specs[0].env["TZ"], "America/Toronto");
    }
}
