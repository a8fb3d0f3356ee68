use axum::extract::{Path, Query, State};
use axum::{Extension, Json};
use dispatch_core::allocation::{AllocationService, TransitionRequest};
use dispatch_core::error::DispatchError;
use dispatch_core::store::TaskStore;
use dispatch_core::task::Task;

use crate::auth::Caller;
use crate::error::AppError;
use crate::extract::ApiJson;
use crate::state::AppState;

use super::{join_error, require, task_type};

#[derive(serde::Deserialize)]
pub struct TaskQuery {
    pub task_type: Option<String>,
}

/// GET /tasks/{id}: one task, if visible to the caller.
pub async fn get_task(
    State(app): State<AppState>,
    Extension(caller): Extension<Caller>,
    Path(id): Path<String>,
    Query(q): Query<TaskQuery>,
) -> Result<Json<Task>, AppError> {
    let task_type = task_type(q.task_type.as_deref())?;
    let store = app.store.clone();
    let task = tokio::task::spawn_blocking(move || {
        let task = store.find_task(&id, task_type)?;
        if !caller.scope.allows(task.tenant_id.as_deref()) {
            return Err(DispatchError::Forbidden(format!(
                "task {id} belongs to another tenant"
            )));
        }
        Ok(task)
    })
    .await
    .map_err(join_error)??;

    Ok(Json(task))
}

#[derive(serde::Deserialize)]
pub struct StatusBody {
    pub status: Option<String>,
    pub task_type: Option<String>,
}

/// POST /tasks/{id}/status: advance a task along its lifecycle graph.
pub async fn update_status(
    State(app): State<AppState>,
    Extension(caller): Extension<Caller>,
    Path(id): Path<String>,
    ApiJson(body): ApiJson<StatusBody>,
) -> Result<Json<Task>, AppError> {
    let target = require("status", body.status)?;
    let task_type = task_type(body.task_type.as_deref())?;
    let store = app.store.clone();
    let task = tokio::task::spawn_blocking(move || {
        AllocationService::new(&*store, &*store, &*store).transition(TransitionRequest {
            task_id: id,
            actor_id: caller.actor_id(),
            scope: caller.scope,
            task_type,
            target,
        })
    })
    .await
    .map_err(join_error)??;

    Ok(Json(task))
}
