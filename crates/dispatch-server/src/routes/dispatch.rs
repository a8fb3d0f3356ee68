use axum::extract::{Query, State};
use axum::{Extension, Json};
use dispatch_core::allocation::{AllocationRequest, AllocationService};
use dispatch_core::error::DispatchError;
use dispatch_core::matcher::CandidateMatcher;
use dispatch_core::store::TaskStore;
use dispatch_core::trace::replay_task;

use crate::auth::Caller;
use crate::error::AppError;
use crate::extract::ApiJson;
use crate::state::AppState;

use super::{join_error, require, task_type};

#[derive(serde::Deserialize)]
pub struct MatchBody {
    pub task_id: Option<String>,
    pub task_type: Option<String>,
}

/// POST /dispatch/match: eligible workers for a task.
pub async fn match_candidates(
    State(app): State<AppState>,
    Extension(caller): Extension<Caller>,
    ApiJson(body): ApiJson<MatchBody>,
) -> Result<Json<serde_json::Value>, AppError> {
    let task_id = require("task_id", body.task_id)?;
    let task_type = task_type(body.task_type.as_deref())?;
    let store = app.store.clone();
    let candidates = tokio::task::spawn_blocking(move || {
        CandidateMatcher::new(&*store, &*store).match_candidates(&task_id, &caller.scope, task_type)
    })
    .await
    .map_err(join_error)??;

    Ok(Json(serde_json::json!({ "candidates": candidates })))
}

#[derive(serde::Deserialize)]
pub struct RecommendQuery {
    pub task_id: Option<String>,
    pub task_type: Option<String>,
    pub model_version: Option<String>,
}

/// GET /dispatch/recommend: top-scored worker without allocating.
pub async fn recommend(
    State(app): State<AppState>,
    Extension(caller): Extension<Caller>,
    Query(q): Query<RecommendQuery>,
) -> Result<Json<serde_json::Value>, AppError> {
    let task_id = require("task_id", q.task_id)?;
    let task_type = task_type(q.task_type.as_deref())?;
    let dispatcher = app.dispatcher.clone();
    let rec = tokio::task::spawn_blocking(move || {
        dispatcher.recommend(&task_id, &caller.scope, task_type, q.model_version.as_deref())
    })
    .await
    .map_err(join_error)??;

    Ok(Json(serde_json::to_value(rec)?))
}

#[derive(serde::Deserialize)]
pub struct AllocateBody {
    pub task_id: Option<String>,
    pub worker_id: Option<String>,
    pub task_type: Option<String>,
    pub decision_trace: Option<serde_json::Value>,
}

/// POST /dispatch/allocate: commit a worker to a task.
pub async fn allocate(
    State(app): State<AppState>,
    Extension(caller): Extension<Caller>,
    ApiJson(body): ApiJson<AllocateBody>,
) -> Result<Json<serde_json::Value>, AppError> {
    let task_id = require("task_id", body.task_id)?;
    let worker_id = require("worker_id", body.worker_id)?;
    let task_type = task_type(body.task_type.as_deref())?;
    let store = app.store.clone();
    let result = tokio::task::spawn_blocking(move || {
        AllocationService::new(&*store, &*store, &*store).allocate(AllocationRequest {
            task_id,
            worker_id,
            actor_id: caller.actor_id(),
            scope: caller.scope,
            task_type,
            decision_trace: body.decision_trace,
        })
    })
    .await
    .map_err(join_error)??;

    Ok(Json(serde_json::json!({
        "allocated": result.committed,
        "table": result.table,
        "task_id": result.task.id,
        "worker_id": result.task.assigned_worker_id,
    })))
}

#[derive(serde::Deserialize)]
pub struct ReplayQuery {
    pub task_id: Option<String>,
}

/// GET /dispatch/replay: decision history of a task.
pub async fn replay(
    State(app): State<AppState>,
    Extension(caller): Extension<Caller>,
    Query(q): Query<ReplayQuery>,
) -> Result<Json<serde_json::Value>, AppError> {
    let task_id = require("task_id", q.task_id)?;
    let store = app.store.clone();
    let replay = tokio::task::spawn_blocking(move || {
        match store.find_task(&task_id, None) {
            Ok(task) if !caller.scope.allows(task.tenant_id.as_deref()) => {
                return Err(DispatchError::Forbidden(format!(
                    "task {task_id} belongs to another tenant"
                )));
            }
            Ok(_) | Err(DispatchError::TaskNotFound(_)) => {}
            Err(e) => return Err(e),
        }
        replay_task(&*store, &task_id)
    })
    .await
    .map_err(join_error)??;

    Ok(Json(serde_json::to_value(replay)?))
}
