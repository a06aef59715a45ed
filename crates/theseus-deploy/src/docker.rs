//! Docker runtime via bollard.
//!
//! Connects with the local defaults (unix socket, or `DOCKER_HOST` when set)
//! and negotiates nothing itself; API versioning stays inside bollard.

use std::collections::HashMap;
use std::pin::pin;

use async_trait::async_trait;
use bollard::Docker;
use bollard::container::{Config, CreateContainerOptions, StartContainerOptions};
use bollard::errors::Error as BollardError;
use bollard::image::CreateImageOptions;
use bollard::models::{HostConfig, PortBinding, RestartPolicy, RestartPolicyNameEnum};
use futures_util::StreamExt;
use tracing::{debug, info};

use crate::runtime::{
    ContainerRuntime, CreateSpec, RuntimeError, RuntimeErrorKind, RuntimeResult, RuntimeSession,
};

impl From<BollardError> for RuntimeError {
    fn from(err: BollardError) -> Self {
        let kind = match &err {
            BollardError::DockerResponseServerError { status_code, .. } => match *status_code {
                404 => RuntimeErrorKind::NotFound,
                409 => RuntimeErrorKind::Conflict,
                400 => RuntimeErrorKind::InvalidRequest,
                _ => RuntimeErrorKind::Other,
            },
            BollardError::DockerStreamError { error } => {
                let error = error.to_ascii_lowercase();
                if error.contains("not found")
                    || error.contains("manifest unknown")
                    || error.contains("does not exist")
                {
                    RuntimeErrorKind::NotFound
                } else {
                    RuntimeErrorKind::Other
                }
            }
            BollardError::IOError { .. } => RuntimeErrorKind::Unavailable,
            _ => RuntimeErrorKind::Other,
        };
        RuntimeError::new(kind, err.to_string())
    }
}

/// Docker Engine as the container runtime.
#[derive(Debug, Clone, Default)]
pub struct DockerRuntime;

impl DockerRuntime {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl ContainerRuntime for DockerRuntime {
    async fn connect(&self) -> RuntimeResult<Box<dyn RuntimeSession>> {
        let docker = Docker::connect_with_local_defaults().map_err(|e| {
            RuntimeError::new(RuntimeErrorKind::Unavailable, e.to_string())
        })?;
        docker
            .ping()
            .await
            .map_err(|e| RuntimeError::new(RuntimeErrorKind::Unavailable, e.to_string()))?;
        debug!("docker session opened");
        Ok(Box::new(DockerSession { docker }))
    }
}

struct DockerSession {
    docker: Docker,
}

#[async_trait]
impl RuntimeSession for DockerSession {
    async fn pull_image(&self, image: &str) -> RuntimeResult<()> {
        let (repository, tag) = split_image_reference(image);
        let options = CreateImageOptions {
            from_image: repository,
            tag,
            ..Default::default()
        };
        let mut progress = pin!(self.docker.create_image(Some(options), None, None));
        while let Some(event) = progress.next().await {
            let event = event?;
            if let Some(status) = event.status {
                debug!(%image, %status, "pull progress");
            }
        }
        info!(%image, "image pulled");
        Ok(())
    }

    async fn create_container(&self, spec: &CreateSpec) -> RuntimeResult<String> {
        let config = container_config(spec)?;
        let options = CreateContainerOptions {
            name: spec.name.as_str(),
            platform: None,
        };
        let response = self.docker.create_container(Some(options), config).await?;
        for warning in &response.warnings {
            debug!(name = %spec.name, %warning, "create warning");
        }
        info!(name = %spec.name, runtime_id = %response.id, "container created");
        Ok(response.id)
    }

    async fn start_container(&self, runtime_id: &str) -> RuntimeResult<()> {
        self.docker
            .start_container(runtime_id, None::<StartContainerOptions<String>>)
            .await?;
        info!(%runtime_id, "container started");
        Ok(())
    }
}

/// Translate a [`CreateSpec`] into Docker's create-container body.
fn container_config(spec: &CreateSpec) -> RuntimeResult<Config<String>> {
    let env: Vec<String> = spec.env.iter().map(|(k, v)| format!("{k}={v}")).collect();

    let mut exposed_ports = HashMap::new();
    let mut port_bindings = HashMap::new();
    for port in &spec.ports {
        let key = format!("{}/tcp", port.internal);
        exposed_ports.insert(key.clone(), HashMap::new());
        port_bindings
            .entry(key)
            .or_insert_with(|| Some(Vec::new()))
            .get_or_insert_with(Vec::new)
            .push(PortBinding {
                host_ip: None,
                host_port: Some(port.external.to_string()),
            });
    }

    let binds: Vec<String> = spec
        .mounts
        .iter()
        .map(|(host, target)| format!("{host}:{target}"))
        .collect();

    let host_config = HostConfig {
        port_bindings: (!port_bindings.is_empty()).then_some(port_bindings),
        binds: (!binds.is_empty()).then_some(binds),
        restart_policy: parse_restart_policy(&spec.restart_policy)?.map(|name| RestartPolicy {
            name: Some(name),
            maximum_retry_count: None,
        }),
        shm_size: parse_size(&spec.shm_size)?,
        ..Default::default()
    };

    Ok(Config {
        image: Some(spec.image.clone()),
        env: (!env.is_empty()).then_some(env),
        exposed_ports: (!exposed_ports.is_empty()).then_some(exposed_ports),
        host_config: Some(host_config),
        ..Default::default()
    })
}

/// Split an image reference into repository and tag (or digest).
///
/// An empty tag makes the engine pull every tag, so untagged names get
/// `latest`. A `:` before the last `/` is a registry port.
fn split_image_reference(image: &str) -> (&str, &str) {
    if let Some((repository, digest)) = image.split_once('@') {
        return (repository, digest);
    }
    let name_start = image.rfind('/').map_or(0, |i| i + 1);
    match image[name_start..].rfind(':') {
        Some(i) => (&image[..name_start + i], &image[name_start + i + 1..]),
        None => (image, "latest"),
    }
}

fn parse_restart_policy(policy: &str) -> RuntimeResult<Option<RestartPolicyNameEnum>> {
    let name = match policy.trim() {
        "" => return Ok(None),
        "no" => RestartPolicyNameEnum::NO,
        "always" => RestartPolicyNameEnum::ALWAYS,
        "unless-stopped" => RestartPolicyNameEnum::UNLESS_STOPPED,
        "on-failure" => RestartPolicyNameEnum::ON_FAILURE,
        other => {
            return Err(RuntimeError::new(
                RuntimeErrorKind::InvalidRequest,
                format!("unknown restart policy {other:?}"),
            ));
        }
    };
    Ok(Some(name))
}

/// Parse sizes like `1gb`, `512m`, `64k`, or a plain byte count.
fn parse_size(size: &str) -> RuntimeResult<Option<i64>> {
    let size = size.trim().to_ascii_lowercase();
    if size.is_empty() {
        return Ok(None);
    }
    let invalid = || {
        RuntimeError::new(
            RuntimeErrorKind::InvalidRequest,
            format!("invalid size {size:?}"),
        )
    };
    let digits_end = size
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(size.len());
    let (number, unit) = size.split_at(digits_end);
    let number: i64 = number.parse().map_err(|_| invalid())?;
    let multiplier: i64 = match unit.trim_end_matches('b') {
        "" => 1,
        "k" => 1 << 10,
        "m" => 1 << 20,
        "g" => 1 << 30,
        _ => return Err(invalid()),
    };
    number.checked_mul(multiplier).map(Some).ok_or_else(invalid)
}

#[cfg(test)]
mod tests {
    use super::*;
    use theseus_state::PortBinding as Binding;

    fn spec() -> CreateSpec {
        CreateSpec {
            image: "lscr.io/linuxserver/webtop:latest".to_string(),
            name: "webtop_dev".to_string(),
            restart_policy: "unless-stopped".to_string(),
            ports: vec![
                Binding { internal: 3000, external: 3000 },
                Binding { internal: 3001, external: 3101 },
            ],
            env: [("PUID".to_string(), "1000".to_string())].into(),
            mounts: [("/srv/webtop".to_string(), "/config".to_string())].into(),
            shm_size: "1gb".to_string(),
        }
    }

    #[test]
    fn sizes_parse_with_units() {
        assert_eq!(parse_size("").unwrap(), None);
        assert_eq!(parse_size("1gb").unwrap(), Some(1 << 30));
        assert_eq!(parse_size("512m").unwrap(), Some(512 << 20));
        assert_eq!(parse_size("64K").unwrap(), Some(64 << 10));
        assert_eq!(parse_size("4096").unwrap(), Some(4096));
        assert!(parse_size("lots").is_err());
        assert!(parse_size("1tb").is_err());
    }

    #[test]
    fn image_references_split() {
        assert_eq!(split_image_reference("nginx"), ("nginx", "latest"));
        assert_eq!(split_image_reference("nginx:1.27"), ("nginx", "1.27"));
        assert_eq!(
            split_image_reference("lscr.io/linuxserver/webtop:latest"),
            ("lscr.io/linuxserver/webtop", "latest")
        );
        assert_eq!(
            split_image_reference("registry:5000/team/app"),
            ("registry:5000/team/app", "latest")
        );
        assert_eq!(
            split_image_reference("registry:5000/team/app:v2"),
            ("registry:5000/team/app", "v2")
        );
        assert_eq!(
            split_image_reference("alpine@sha256:abc123"),
            ("alpine", "sha256:abc123")
        );
    }

    #[test]
    fn restart_policies_map() {
        assert_eq!(parse_restart_policy("").unwrap(), None);
        assert_eq!(
            parse_restart_policy("unless-stopped").unwrap(),
            Some(RestartPolicyNameEnum::UNLESS_STOPPED)
        );
        let err = parse_restart_policy("sometimes").unwrap_err();
        assert_eq!(err.kind, RuntimeErrorKind::InvalidRequest);
    }

    #[test]
    fn config_carries_ports_env_and_mounts() {
        let config = container_config(&spec()).unwrap();
        assert_eq!(config.image.as_deref(), Some("lscr.io/linuxserver/webtop:latest"));
        assert_eq!(config.env, Some(vec!["PUID=1000".to_string()]));

        let host = config.host_config.unwrap();
        assert_eq!(host.shm_size, Some(1 << 30));
        assert_eq!(host.binds, Some(vec!["/srv/webtop:/config".to_string()]));
        let bindings = host.port_bindings.unwrap();
        let published = bindings["3001/tcp"].as_ref().unwrap();
        assert_eq!(published[0].host_port.as_deref(), Some("3101"));
    }

    #[test]
    fn bare_spec_leaves_host_options_unset() {
        let bare = CreateSpec {
            restart_policy: String::new(),
            ports: Vec::new(),
            env: Default::default(),
            mounts: Default::default(),
            shm_size: String::new(),
            ..spec()
        };
        let config = container_config(&bare).unwrap();
        assert!(config.env.is_none());
        assert!(config.exposed_ports.is_none());
        let host = config.host_config.unwrap();
        assert!(host.restart_policy.is_none());
        assert!(host.port_bindings.is_none());
    }

    #[test]
    fn server_errors_classify_by_status() {
        let err: RuntimeError = BollardError::DockerResponseServerError {
            status_code: 409,
            message: "name already in use".to_string(),
        }
        .into();
        assert_eq!(err.kind, RuntimeErrorKind::Conflict);

        let err: RuntimeError = BollardError::DockerStreamError {
            error: "manifest unknown".to_string(),
        }
        .into();
        assert_eq!(err.kind, RuntimeErrorKind::NotFound);
    }
}
