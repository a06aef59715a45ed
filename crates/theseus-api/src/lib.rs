//! theseus-api — REST API for Theseus.
//!
//! Thin axum handlers over the entity repositories and the deployment
//! orchestrator. Every response uses the `{success, data, error}` envelope.
//!
//! # API Routes
//!
//! | Method | Path | Description |
//! |---|---|---|
//! | GET | `/status` | Liveness |
//! | GET | `/api/containers` | List containers |
//! | GET | `/api/containers/running` | List containers (legacy path) |
//! | POST | `/api/containers` | Deploy a container |
//! | GET | `/api/containers/{id}` | Get a container |
//! | POST | `/api/containers/{id}/record` | Re-record a running container |
//! | GET/POST | `/api/hosts` | List / save host machines |
//! | GET | `/api/hosts/{id}` | Get a host machine |
//! | GET/POST | `/api/users` | List / save users |
//! | GET | `/api/users/{username}` | Get a user |
//! | GET/POST | `/api/teams` | List / save teams |
//! | GET | `/api/teams/{name}` | Get a team |
//! | GET/POST | `/api/organizations` | List / save organizations |
//! | GET | `/api/organizations/{name}` | Get an organization |

pub mod handlers;

use std::time::Duration;

use axum::Router;
use axum::routing::{get, post};
use theseus_deploy::Orchestrator;
use theseus_state::Repositories;

/// Shared state for API handlers.
#[derive(Clone)]
pub struct ApiState {
    pub repos: Repositories,
    pub orchestrator: Orchestrator,
    /// Upper bound on one deploy call, applied around the orchestrator.
    pub deploy_timeout: Duration,
}

/// Build the complete API router.
pub fn build_router(state: ApiState) -> Router {
    let api_routes = Router::new()
        .route(
            "/containers",
            get(handlers::list_containers).post(handlers::deploy_container),
        )
        .route("/containers/running", get(handlers::list_containers))
        .route("/containers/{id}", get(handlers::get_container))
        .route("/containers/{id}/record", post(handlers::record_container))
        .route("/hosts", get(handlers::list_hosts).post(handlers::save_host))
        .route("/hosts/{id}", get(handlers::get_host))
        .route("/users", get(handlers::list_users).post(handlers::save_user))
        .route("/users/{username}", get(handlers::get_user))
        .route("/teams", get(handlers::list_teams).post(handlers::save_team))
        .route("/teams/{name}", get(handlers::get_team))
        .route(
            "/organizations",
            get(handlers::list_organizations).post(handlers::save_organization),
        )
        .route("/organizations/{name}", get(handlers::get_organization));

    Router::new()
        .nest("/api", api_routes)
        .route("/status", get(handlers::status))
        .with_state(state)
}
