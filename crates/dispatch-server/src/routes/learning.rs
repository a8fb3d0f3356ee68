use axum::extract::State;
use axum::{Extension, Json};
use dispatch_core::error::DispatchError;
use dispatch_core::store::TaskStore;
use dispatch_core::trace::{LearningOutcome, LearningRecord, TraceRecorder};

use crate::auth::Caller;
use crate::error::AppError;
use crate::extract::ApiJson;
use crate::state::AppState;

use super::{join_error, require, task_type};

#[derive(serde::Deserialize)]
pub struct RecordBody {
    pub task_id: Option<String>,
    pub worker_id: Option<String>,
    pub outcome: Option<String>,
    pub task_type: Option<String>,
    pub metrics: Option<serde_json::Value>,
}

fn parse_outcome(raw: &str) -> Result<LearningOutcome, AppError> {
    serde_json::from_value(serde_json::Value::String(raw.to_ascii_lowercase())).map_err(|_| {
        AppError::bad_request(format!(
            "unknown outcome '{raw}': expected completed, failed, cancelled or late"
        ))
    })
}

/// POST /learning/record: store the observed result of an assignment.
pub async fn record(
    State(app): State<AppState>,
    Extension(caller): Extension<Caller>,
    ApiJson(body): ApiJson<RecordBody>,
) -> Result<Json<serde_json::Value>, AppError> {
    let task_id = require("task_id", body.task_id)?;
    let worker_id = require("worker_id", body.worker_id)?;
    let outcome = parse_outcome(&require("outcome", body.outcome)?)?;
    let task_type = task_type(body.task_type.as_deref())?;

    let store = app.store.clone();
    tokio::task::spawn_blocking(move || {
        let task = store.find_task(&task_id, task_type)?;
        if !caller.scope.allows(task.tenant_id.as_deref()) {
            return Err(DispatchError::Forbidden(format!(
                "task {task_id} belongs to another tenant"
            )));
        }
        TraceRecorder::new(&*store).record_learning(
            LearningRecord {
                task_id,
                worker_id,
                outcome,
                metrics: body.metrics,
            },
            caller.actor_id(),
        )
    })
    .await
    .map_err(join_error)??;

    Ok(Json(serde_json::json!({ "success": true })))
}
