//! HTTP endpoints for spawning and listing jobs.

use std::collections::HashMap;
use std::sync::Arc;

use axum::{
    Json, Router,
    body::Bytes,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde_json::json;
use tower_http::trace::TraceLayer;
use tracing::{error, warn};

use crate::error::Error;
use crate::jobs::{JobOrchestrator, SpawnOutcome};

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Arc<JobOrchestrator>,
}

/// Build the Axum router.
pub fn job_routes(orchestrator: Arc<JobOrchestrator>) -> Router {
    let state = AppState { orchestrator };

    Router::new()
        .route("/health", get(health))
        .route("/jobs", get(list_running))
        .route("/jobs/{name}", post(spawn_job))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn health() -> impl IntoResponse {
    Json(json!({
        "status": "ok",
        "service": "steved"
    }))
}

async fn list_running(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.orchestrator.guard().running())
}

fn error_response(status: StatusCode, message: impl ToString) -> Response {
    (status, Json(json!({ "error": message.to_string() }))).into_response()
}

/// Parse the request body: a JSON object of string values. Empty or `null` means no overrides.
fn parse_env(body: &[u8]) -> Result<HashMap<String, String>, serde_json::Error> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(HashMap::new());
    }
    let env: Option<HashMap<String, String>> = serde_json::from_slice(body)?;
    Ok(env.unwrap_or_default())
}

async fn spawn_job(
    State(state): State<AppState>,
    Path(name): Path<String>,
    body: Bytes,
) -> Response {
    let env = match parse_env(&body) {
        Ok(env) => env,
        Err(parse_err) => {
            // An unknown task is reported as such even when the body is also bad.
            return match state.orchestrator.tasks().resolve(&name).await {
                Ok(None) => error_response(StatusCode::NOT_FOUND, format!("no task named {name}")),
                Ok(Some(_)) => {
                    warn!(job = %name, error = %parse_err, "Rejected malformed environment");
                    error_response(StatusCode::BAD_REQUEST, parse_err)
                }
                Err(e) => {
                    error!(job = %name, error = %e, "Task registry unavailable");
                    error_response(StatusCode::INTERNAL_SERVER_ERROR, e)
                }
            };
        }
    };

    match state.orchestrator.spawn(&name, &env).await {
        Ok(SpawnOutcome::Accepted(accepted)) => (
            StatusCode::OK,
            Json(json!({
                "status": "accepted",
                "job": name,
                "job_id": accepted.job_id,
                "container": accepted.container.id(),
            })),
        )
            .into_response(),
        Ok(SpawnOutcome::NotFound) => {
            error_response(StatusCode::NOT_FOUND, format!("no task named {name}"))
        }
        Ok(SpawnOutcome::Conflict) => {
            error_response(StatusCode::CONFLICT, format!("job {name} is already running"))
        }
        Err(Error::Environment(e)) => {
            warn!(job = %name, error = %e, "Rejected invalid environment");
            error_response(StatusCode::BAD_REQUEST, e)
        }
        Err(e) => {
            error!(job = %name, error = %e, "Failed to spawn job");
            error_response(StatusCode::INTERNAL_SERVER_ERROR, e)
        }
    }
}
