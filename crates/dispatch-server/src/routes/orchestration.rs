use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::{Extension, Json};
use dispatch_core::matcher::Candidate;
use dispatch_core::orchestrator::DispatchRequest;

use crate::auth::Caller;
use crate::error::AppError;
use crate::extract::ApiJson;
use crate::state::AppState;

use super::{join_error, require, task_type};

#[derive(serde::Deserialize)]
pub struct DispatchBody {
    pub task_id: Option<String>,
    pub worker_id: Option<String>,
    pub task_type: Option<String>,
    pub model_version: Option<String>,
    pub candidates: Option<Vec<Candidate>>,
}

fn status_for_code(code: &str) -> StatusCode {
    match code {
        "forbidden" => StatusCode::FORBIDDEN,
        "task_not_found" => StatusCode::NOT_FOUND,
        "timeout" => StatusCode::GATEWAY_TIMEOUT,
        "upstream_unavailable" => StatusCode::SERVICE_UNAVAILABLE,
        _ => StatusCode::BAD_REQUEST,
    }
}

/// POST /orchestration/dispatch: run the dispatch flow.
///
/// Success returns the flow's output data. A failed run returns the error
/// together with the partial data and the steps that completed.
pub async fn dispatch(
    State(app): State<AppState>,
    Extension(caller): Extension<Caller>,
    ApiJson(body): ApiJson<DispatchBody>,
) -> Result<Response, AppError> {
    let mut req = DispatchRequest::new(require("task_id", body.task_id)?, caller.scope.clone());
    req.task_type = task_type(body.task_type.as_deref())?;
    req.worker_id = body.worker_id.filter(|w| !w.trim().is_empty());
    req.model_version = body.model_version;
    req.candidates = body.candidates;
    req.actor_id = caller.actor_id();

    let dispatcher = app.dispatcher.clone();
    let state = tokio::task::spawn_blocking(move || dispatcher.dispatch(req))
        .await
        .map_err(join_error)??;

    match state.error {
        None => Ok(Json(serde_json::Value::Object(state.data)).into_response()),
        Some(err) => {
            let status = status_for_code(&err.code);
            let body = serde_json::json!({
                "error": err.message,
                "code": err.code,
                "step": err.step,
                "completed_steps": state.completed_steps,
                "data": state.data,
            });
            Ok((status, Json(body)).into_response())
        }
    }
}
