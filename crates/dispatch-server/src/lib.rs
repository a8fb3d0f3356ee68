pub mod auth;
pub mod error;
pub mod extract;
pub mod routes;
pub mod state;

use std::path::PathBuf;
use std::sync::Arc;

use axum::routing::{get, post};
use axum::{middleware, Router};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::state::AppState;

/// Build the axum Router for an initialized project root.
pub fn build_router(root: PathBuf) -> anyhow::Result<Router> {
    Ok(router(AppState::open(root)?))
}

/// Build the Router over existing state. Integration tests use this to seed
/// the same database handle the handlers read.
pub fn router(app_state: AppState) -> Router {
    let superuser_role: Arc<str> = Arc::from(app_state.config.auth.superuser_role.as_str());

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    // Routes that read no tenant data: a caller id is enough.
    let unscoped = Router::new()
        .route("/strategy/evaluate", post(routes::strategy::evaluate))
        .layer(middleware::from_fn(auth::caller_id_middleware));

    Router::new()
        // Dispatch
        .route("/dispatch/match", post(routes::dispatch::match_candidates))
        .route("/dispatch/recommend", get(routes::dispatch::recommend))
        .route("/dispatch/allocate", post(routes::dispatch::allocate))
        .route("/dispatch/replay", get(routes::dispatch::replay))
        // Orchestration
        .route(
            "/orchestration/dispatch",
            post(routes::orchestration::dispatch),
        )
        // Learning
        .route("/learning/record", post(routes::learning::record))
        // Tasks
        .route("/tasks/{id}", get(routes::tasks::get_task))
        .route("/tasks/{id}/status", post(routes::tasks::update_status))
        // Metrics
        .route("/metrics/dispatch", get(routes::metrics::dispatch_metrics))
        .layer(middleware::from_fn_with_state(
            superuser_role,
            auth::identity_middleware,
        ))
        .merge(unscoped)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(app_state)
}

/// Start the dispatch API server.
pub async fn serve(root: PathBuf, port: u16) -> anyhow::Result<()> {
    let addr = format!("0.0.0.0:{port}");
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    serve_on(root, listener).await
}

/// Start the dispatch API server on a pre-bound listener.
///
/// Lets the caller read the actual port before starting (useful when
/// `port = 0` and the OS picks a free one).
pub async fn serve_on(root: PathBuf, listener: tokio::net::TcpListener) -> anyhow::Result<()> {
    let actual_port = listener.local_addr()?.port();
    let app = build_router(root)?;

    tracing::info!("dispatch API listening on http://localhost:{actual_port}");

    axum::serve(listener, app).await?;
    Ok(())
}
