use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use dispatch_core::error::DispatchError;

// ---------------------------------------------------------------------------
// Internal sentinel for 401
// ---------------------------------------------------------------------------

/// Carries an explicit 401 through the `anyhow::Error` chain.
#[derive(Debug)]
struct UnauthenticatedError(String);

impl std::fmt::Display for UnauthenticatedError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::error::Error for UnauthenticatedError {}

// ---------------------------------------------------------------------------
// AppError: unified error type for HTTP responses
// ---------------------------------------------------------------------------

/// Unified error type for HTTP responses. The body is always
/// `{"error": <message>, "code": <stable code>}`.
#[derive(Debug)]
pub struct AppError(pub anyhow::Error);

impl AppError {
    /// 400 with code `invalid_input`.
    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self(DispatchError::InvalidInput(msg.into()).into())
    }

    /// 401 with code `unauthenticated`.
    pub fn unauthenticated(msg: impl Into<String>) -> Self {
        Self(UnauthenticatedError(msg.into()).into())
    }

    pub fn status_and_code(&self) -> (StatusCode, &'static str) {
        if self.0.downcast_ref::<UnauthenticatedError>().is_some() {
            return (StatusCode::UNAUTHORIZED, "unauthenticated");
        }
        match self.0.downcast_ref::<DispatchError>() {
            Some(e) => (status_for(e), e.code()),
            None => (StatusCode::INTERNAL_SERVER_ERROR, "internal"),
        }
    }
}

fn status_for(e: &DispatchError) -> StatusCode {
    match e {
        DispatchError::TaskNotFound(_) | DispatchError::WorkerNotFound(_) => StatusCode::NOT_FOUND,
        DispatchError::Forbidden(_) => StatusCode::FORBIDDEN,
        DispatchError::InvalidTransition { .. }
        | DispatchError::InvalidStatus { .. }
        | DispatchError::AlreadyAllocated(_)
        | DispatchError::Conflict(_)
        | DispatchError::NoCandidates(_)
        | DispatchError::WorkerNotEligible { .. }
        | DispatchError::FlowNotFound(_)
        | DispatchError::InvalidInput(_)
        | DispatchError::NotInitialized => StatusCode::BAD_REQUEST,
        DispatchError::Timeout { .. } => StatusCode::GATEWAY_TIMEOUT,
        DispatchError::Upstream(_) => StatusCode::SERVICE_UNAVAILABLE,
        DispatchError::Io(_) | DispatchError::Yaml(_) | DispatchError::Json(_) => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code) = self.status_and_code();
        if status.is_server_error() {
            tracing::error!(error = %format!("{:#}", self.0), code, "request failed");
        }
        let body = serde_json::json!({ "error": self.0.to_string(), "code": code });
        (status, axum::Json(body)).into_response()
    }
}

impl<E> From<E> for AppError
where
    E: Into<anyhow::Error>,
{
    fn from(err: E) -> Self {
        Self(err.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::response::IntoResponse;

    fn status_of(e: DispatchError) -> StatusCode {
        AppError(e.into()).into_response().status()
    }

    #[test]
    fn not_found_maps_to_404() {
        assert_eq!(status_of(DispatchError::TaskNotFound("T1".into())), StatusCode::NOT_FOUND);
        assert_eq!(
            status_of(DispatchError::WorkerNotFound("W1".into())),
            StatusCode::NOT_FOUND
        );
    }

    #[test]
    fn forbidden_maps_to_403() {
        assert_eq!(
            status_of(DispatchError::Forbidden("tenant".into())),
            StatusCode::FORBIDDEN
        );
    }

    #[test]
    fn allocation_failures_map_to_400() {
        assert_eq!(
            status_of(DispatchError::AlreadyAllocated("T1".into())),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            status_of(DispatchError::InvalidTransition {
                task_type: "delivery".into(),
                from: "completed".into(),
                to: "delivering".into(),
            }),
            StatusCode::BAD_REQUEST
        );
    }

    #[test]
    fn timeout_maps_to_504() {
        assert_eq!(
            status_of(DispatchError::Timeout {
                flow: "dispatch".into(),
                limit_ms: 15_000
            }),
            StatusCode::GATEWAY_TIMEOUT
        );
    }

    #[test]
    fn upstream_maps_to_503() {
        assert_eq!(
            status_of(DispatchError::Upstream("db locked".into())),
            StatusCode::SERVICE_UNAVAILABLE
        );
    }

    #[test]
    fn io_error_maps_to_500() {
        let io_err = std::io::Error::other("disk full");
        assert_eq!(
            status_of(DispatchError::Io(io_err)),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn unauthenticated_maps_to_401() {
        let err = AppError::unauthenticated("missing x-caller-id");
        assert_eq!(err.status_and_code(), (StatusCode::UNAUTHORIZED, "unauthenticated"));
    }

    #[test]
    fn foreign_error_maps_to_500() {
        let err = AppError(anyhow::anyhow!("something unexpected"));
        assert_eq!(
            err.status_and_code(),
            (StatusCode::INTERNAL_SERVER_ERROR, "internal")
        );
    }

    #[test]
    fn code_travels_with_the_error() {
        let err = AppError(DispatchError::AlreadyAllocated("T1".into()).into());
        assert_eq!(err.status_and_code().1, "already_allocated");
    }
}
