use axum::extract::State;
use axum::Json;
use dispatch_core::strategy::{TaskContext, WorkerContext};

use crate::error::AppError;
use crate::extract::ApiJson;
use crate::state::AppState;

#[derive(serde::Deserialize)]
pub struct EvaluateBody {
    #[serde(default)]
    pub task_context: TaskContext,
    #[serde(default)]
    pub workers_context: Vec<WorkerContext>,
    pub model_version: Option<String>,
}

/// POST /strategy/evaluate: score worker contexts against a task context.
///
/// Pure computation over the request body; nothing is read or written.
pub async fn evaluate(
    State(app): State<AppState>,
    ApiJson(body): ApiJson<EvaluateBody>,
) -> Result<Json<serde_json::Value>, AppError> {
    let evaluator = app.dispatcher.evaluator();
    let version = evaluator.resolve(body.model_version.as_deref());
    let scores = evaluator.evaluate(
        &body.task_context,
        &body.workers_context,
        Some(version.as_str()),
    );
    Ok(Json(serde_json::json!({
        "scores": scores,
        "model_version": version.as_str(),
    })))
}
