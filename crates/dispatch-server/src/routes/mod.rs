pub mod dispatch;
pub mod learning;
pub mod metrics;
pub mod orchestration;
pub mod strategy;
pub mod tasks;

use dispatch_core::types::TaskType;

use crate::error::AppError;

/// A required body or query field; blank counts as missing.
pub(crate) fn require(field: &str, value: Option<String>) -> Result<String, AppError> {
    match value {
        Some(v) if !v.trim().is_empty() => Ok(v.trim().to_string()),
        _ => Err(AppError::bad_request(format!("{field} is required"))),
    }
}

/// Optional `task_type` text, parsed leniently (case, `order` alias).
pub(crate) fn task_type(raw: Option<&str>) -> Result<Option<TaskType>, AppError> {
    match raw.map(str::trim).filter(|s| !s.is_empty()) {
        Some(s) => Ok(Some(s.parse::<TaskType>()?)),
        None => Ok(None),
    }
}

pub(crate) fn join_error(e: tokio::task::JoinError) -> AppError {
    AppError(anyhow::anyhow!("task join error: {e}"))
}
