use axum::extract::State;
use axum::{Extension, Json};
use dispatch_core::error::DispatchError;
use dispatch_core::metrics::{self, DispatchMetrics};

use crate::auth::Caller;
use crate::error::AppError;
use crate::state::AppState;

use super::join_error;

/// GET /metrics/dispatch: platform-wide counters. Superuser only.
pub async fn dispatch_metrics(
    State(app): State<AppState>,
    Extension(caller): Extension<Caller>,
) -> Result<Json<DispatchMetrics>, AppError> {
    if !caller.is_superuser {
        return Err(DispatchError::Forbidden("metrics require the platform role".into()).into());
    }
    let store = app.store.clone();
    let m = tokio::task::spawn_blocking(move || metrics::collect(&*store, &*store))
        .await
        .map_err(join_error)??;
    Ok(Json(m))
}
