//! REST endpoints: the public calculator API and the internal task API
//! used by agents.

use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Path, Query, State, rejection::JsonRejection},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    routing::post,
};
use serde::Deserialize;
use serde_json::json;
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{debug, warn};

use crate::error::SchedulerError;
use crate::model::{ExpressionId, OwnerId, TaskResult};
use crate::scheduler::Scheduler;

pub const OWNER_HEADER: &str = "x-owner-id";
pub const AGENT_HEADER: &str = "x-agent-id";

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    pub scheduler: Arc<Scheduler>,
}

/// Build the Axum router with the public and internal routes.
pub fn api_routes(scheduler: Arc<Scheduler>) -> Router {
    let state = AppState { scheduler };

    Router::new()
        .route("/health", get(health))
        .route("/api/v1/calculate", post(calculate))
        .route("/api/v1/expressions", get(list_expressions))
        .route("/api/v1/expressions/{id}", get(get_expression))
        .route("/api/v1/statistics", get(statistics))
        .route("/internal/task", get(pull_task).post(submit_result))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CorsLayer::permissive()),
        )
        .with_state(state)
}

fn error(status: StatusCode, message: impl Into<String>) -> Response {
    (status, Json(json!({ "error": message.into() }))).into_response()
}

/// Owner from `x-owner-id`; absent means the anonymous owner 0.
fn owner_id(headers: &HeaderMap) -> Result<OwnerId, Response> {
    match headers.get(OWNER_HEADER) {
        None => Ok(OwnerId::default()),
        Some(value) => value
            .to_str()
            .ok()
            .and_then(|raw| raw.trim().parse::<u64>().ok())
            .map(OwnerId)
            .ok_or_else(|| error(StatusCode::BAD_REQUEST, "invalid owner id")),
    }
}

// ── Health ──────────────────────────────────────────────────────────────

async fn health() -> impl IntoResponse {
    Json(json!({
        "status": "ok",
        "service": "calc-orchestrator"
    }))
}

// ── Public API ──────────────────────────────────────────────────────────

#[derive(Deserialize)]
struct CalculateRequest {
    expression: String,
}

async fn calculate(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Result<Json<CalculateRequest>, JsonRejection>,
) -> Response {
    let owner = match owner_id(&headers) {
        Ok(owner) => owner,
        Err(resp) => return resp,
    };
    let Json(body) = match body {
        Ok(body) => body,
        Err(rejection) => {
            debug!(error = %rejection, "Malformed calculate request");
            return error(StatusCode::UNPROCESSABLE_ENTITY, "invalid request body");
        }
    };

    match state.scheduler.submit_expression(owner, &body.expression).await {
        Ok(id) => (StatusCode::CREATED, Json(json!({ "id": id }))).into_response(),
        Err(SchedulerError::InvalidExpression { id, source }) => (
            StatusCode::UNPROCESSABLE_ENTITY,
            Json(json!({ "id": id, "error": source.to_string() })),
        )
            .into_response(),
        Err(e) => {
            warn!(error = %e, "Failed to submit expression");
            error(StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
        }
    }
}

async fn list_expressions(State(state): State<AppState>, headers: HeaderMap) -> Response {
    let owner = match owner_id(&headers) {
        Ok(owner) => owner,
        Err(resp) => return resp,
    };
    let expressions = state.scheduler.list_expressions(owner).await;
    Json(json!({ "expressions": expressions })).into_response()
}

async fn get_expression(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<u64>,
) -> Response {
    let owner = match owner_id(&headers) {
        Ok(owner) => owner,
        Err(resp) => return resp,
    };
    match state.scheduler.get_expression(owner, ExpressionId(id)).await {
        Ok(expression) => Json(json!({ "expression": expression })).into_response(),
        Err(_) => error(StatusCode::NOT_FOUND, "expression not found"),
    }
}

async fn statistics(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.scheduler.statistics().await)
}

// ── Internal task API ───────────────────────────────────────────────────

#[derive(Deserialize)]
struct TaskQuery {
    owner_id: Option<u64>,
}

async fn pull_task(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<TaskQuery>,
) -> Response {
    let holder = headers
        .get(AGENT_HEADER)
        .and_then(|value| value.to_str().ok())
        .unwrap_or("anonymous");

    let task = match query.owner_id {
        Some(owner) => state.scheduler.pull_task_for(OwnerId(owner), holder).await,
        None => state.scheduler.pull_task(holder).await,
    };

    match task {
        Some(task) => Json(json!({ "task": task })).into_response(),
        None => error(StatusCode::NOT_FOUND, "no tasks available"),
    }
}

async fn submit_result(
    State(state): State<AppState>,
    body: Result<Json<TaskResult>, JsonRejection>,
) -> Response {
    let Json(result) = match body {
        Ok(body) => body,
        Err(rejection) => {
            debug!(error = %rejection, "Malformed task result");
            return error(StatusCode::UNPROCESSABLE_ENTITY, "invalid request body");
        }
    };

    match state.scheduler.submit_result(result.clone()).await {
        Ok(_) => Json(result).into_response(),
        Err(e @ SchedulerError::TaskNotFound { .. }) => error(StatusCode::NOT_FOUND, e.to_string()),
        Err(e) => {
            warn!(task_id = %result.id, error = %e, "Failed to apply task result");
            error(StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
        }
    }
}
