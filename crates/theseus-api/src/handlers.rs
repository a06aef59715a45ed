//! REST API handlers.
//!
//! Reads go straight to the repositories; container launches go through the
//! orchestrator. Errors map to status codes by kind: missing records are
//! 404, store failures 500, and deploy failures depend on which step failed.

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::{Deserialize, Serialize};
use tracing::{error, warn};

use theseus_deploy::{DeployError, RuntimeErrorKind};
use theseus_state::*;

use crate::ApiState;

/// Response wrapper for consistent API format.
#[derive(Serialize)]
struct ApiResponse<T: Serialize> {
    success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl<T: Serialize> ApiResponse<T> {
    fn ok(data: T) -> Json<Self> {
        Json(Self {
            success: true,
            data: Some(data),
            error: None,
        })
    }
}

fn error_response(msg: &str, status: StatusCode) -> Response {
    (
        status,
        Json(ApiResponse::<()> {
            success: false,
            data: None,
            error: Some(msg.to_string()),
        }),
    )
        .into_response()
}

fn state_error_status(err: &StateError) -> StatusCode {
    match err {
        StateError::NotFound { .. } => StatusCode::NOT_FOUND,
        StateError::StoreUnavailable(_)
        | StateError::TransactionFailed(_)
        | StateError::CorruptRecord { .. }
        | StateError::Serialize { .. } => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn state_error_response(err: &StateError) -> Response {
    let status = state_error_status(err);
    if status.is_server_error() {
        error!(error = %err, "store request failed");
    }
    error_response(&err.to_string(), status)
}

fn deploy_error_status(err: &DeployError) -> StatusCode {
    let kind = err.runtime_error().map(|e| e.kind);
    match err {
        DeployError::RuntimeUnavailable { .. } => StatusCode::SERVICE_UNAVAILABLE,
        DeployError::ImagePullFailed { .. } => match kind {
            Some(RuntimeErrorKind::NotFound) => StatusCode::UNPROCESSABLE_ENTITY,
            _ => StatusCode::BAD_GATEWAY,
        },
        DeployError::ContainerCreateFailed { .. } => match kind {
            Some(RuntimeErrorKind::Conflict) => StatusCode::CONFLICT,
            Some(RuntimeErrorKind::InvalidRequest) => StatusCode::BAD_REQUEST,
            _ => StatusCode::BAD_GATEWAY,
        },
        DeployError::ContainerStartFailed { .. } => StatusCode::BAD_GATEWAY,
        DeployError::ReconciliationFailed { .. } => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn list_response<E: Entity>(repo: &Repository<E>) -> Response {
    match repo.list_all() {
        Ok(entities) => ApiResponse::ok(entities).into_response(),
        Err(e) => state_error_response(&e),
    }
}

fn get_response<E: Entity>(repo: &Repository<E>, key: &str) -> Response {
    match repo.get_by_key(key) {
        Ok(entity) => ApiResponse::ok(entity).into_response(),
        Err(e) => state_error_response(&e),
    }
}

fn save_response<E: Entity>(repo: &Repository<E>, entity: E) -> Response {
    if entity.key().is_empty() {
        let message = format!("{} key must not be empty", E::KIND);
        return error_response(&message, StatusCode::BAD_REQUEST);
    }
    match repo.save(&entity) {
        Ok(()) => (StatusCode::CREATED, ApiResponse::ok(entity)).into_response(),
        Err(e) => state_error_response(&e),
    }
}

/// Eight lower-case hex characters.
fn generate_container_id() -> String {
    let mut id = uuid::Uuid::new_v4().simple().to_string();
    id.truncate(8);
    id
}

// ── Status ─────────────────────────────────────────────────────

/// GET /status
pub async fn status() -> impl IntoResponse {
    Json(serde_json::json!({ "message": "Theseus service is up!" }))
}

// ── Containers ─────────────────────────────────────────────────

/// GET /api/containers
pub async fn list_containers(State(state): State<ApiState>) -> Response {
    list_response(&state.repos.containers)
}

/// GET /api/containers/:id
pub async fn get_container(State(state): State<ApiState>, Path(id): Path<String>) -> Response {
    get_response(&state.repos.containers, &id)
}

/// POST /api/containers
///
/// Launches the container and records it. The deploy is bounded by the
/// configured timeout; on expiry the runtime state is unknown and a 504 is
/// returned.
pub async fn deploy_container(
    State(state): State<ApiState>,
    Json(mut container): Json<Container>,
) -> Response {
    if container.image_name.trim().is_empty() || container.container_name.trim().is_empty() {
        return error_response(
            "imageName and containerName are required",
            StatusCode::BAD_REQUEST,
        );
    }
    if container.id.is_empty() {
        container.id = generate_container_id();
    }
    let id = container.id.clone();

    match tokio::time::timeout(state.deploy_timeout, state.orchestrator.deploy(container)).await {
        Ok(Ok(deployment)) => (StatusCode::CREATED, ApiResponse::ok(deployment)).into_response(),
        Ok(Err(e)) => {
            warn!(%id, stage = %e.stage(), remediation = ?e.remediation(), error = %e, "deploy failed");
            error_response(&e.to_string(), deploy_error_status(&e))
        }
        Err(_) => {
            error!(%id, timeout = ?state.deploy_timeout, "deploy timed out");
            error_response(
                &format!("deploy of {id} timed out; runtime state unknown"),
                StatusCode::GATEWAY_TIMEOUT,
            )
        }
    }
}

/// Record request body: the container as it should be stored, plus the
/// runtime's id for the already-running container.
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordRequest {
    pub runtime_id: String,
    pub container: Container,
}

/// POST /api/containers/:id/record
///
/// Retries the save after a deploy answered 500 with the container running.
/// The body must carry the runtime id from that failure.
pub async fn record_container(
    State(state): State<ApiState>,
    Path(id): Path<String>,
    Json(req): Json<RecordRequest>,
) -> Response {
    if req.container.id != id {
        return error_response("container id does not match path", StatusCode::BAD_REQUEST);
    }
    if req.runtime_id.trim().is_empty() {
        return error_response("runtimeId must not be empty", StatusCode::BAD_REQUEST);
    }
    match state.orchestrator.record(req.container, &req.runtime_id) {
        Ok(deployment) => (StatusCode::CREATED, ApiResponse::ok(deployment)).into_response(),
        Err(e) => error_response(&e.to_string(), deploy_error_status(&e)),
    }
}

// ── Host machines ──────────────────────────────────────────────

/// GET /api/hosts
pub async fn list_hosts(State(state): State<ApiState>) -> Response {
    list_response(&state.repos.hosts)
}

/// GET /api/hosts/:id
pub async fn get_host(State(state): State<ApiState>, Path(id): Path<String>) -> Response {
    get_response(&state.repos.hosts, &id)
}

/// POST /api/hosts
pub async fn save_host(State(state): State<ApiState>, Json(host): Json<HostMachine>) -> Response {
    save_response(&state.repos.hosts, host)
}

// ── Users, teams, organizations ────────────────────────────────

/// GET /api/users
pub async fn list_users(State(state): State<ApiState>) -> Response {
    list_response(&state.repos.users)
}

/// GET /api/users/:username
pub async fn get_user(State(state): State<ApiState>, Path(username): Path<String>) -> Response {
    get_response(&state.repos.users, &username)
}

/// POST /api/users
pub async fn save_user(State(state): State<ApiState>, Json(user): Json<User>) -> Response {
    save_response(&state.repos.users, user)
}

/// GET /api/teams
pub async fn list_teams(State(state): State<ApiState>) -> Response {
    list_response(&state.repos.teams)
}

/// GET /api/teams/:name
pub async fn get_team(State(state): State<ApiState>, Path(name): Path<String>) -> Response {
    get_response(&state.repos.teams, &name)
}

/// POST /api/teams
pub async fn save_team(State(state): State<ApiState>, Json(team): Json<Team>) -> Response {
    save_response(&state.repos.teams, team)
}

/// GET /api/organizations
pub async fn list_organizations(State(state): State<ApiState>) -> Response {
    list_response(&state.repos.organizations)
}

/// GET /api/organizations/:name
pub async fn get_organization(State(state): State<ApiState>, Path(name): Path<String>) -> Response {
    get_response(&state.repos.organizations, &name)
}

/// POST /api/organizations
pub async fn save_organization(
    State(state): State<ApiState>,
    Json(org): Json<Organization>,
) -> Response {
    save_response(&state.repos.organizations, org)
}
