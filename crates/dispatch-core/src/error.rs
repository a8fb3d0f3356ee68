use thiserror::Error;

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("not initialized: run 'dispatch init'")]
    NotInitialized,

    #[error("task not found: {0}")]
    TaskNotFound(String),

    #[error("worker not found: {0}")]
    WorkerNotFound(String),

    #[error("forbidden: {0}")]
    Forbidden(String),

    #[error("invalid transition for {task_type} task from {from} to {to}")]
    InvalidTransition {
        task_type: String,
        from: String,
        to: String,
    },

    #[error("invalid status '{status}' for {task_type} task")]
    InvalidStatus { task_type: String, status: String },

    #[error("task already allocated: {0}")]
    AlreadyAllocated(String),

    /// Conditional write matched zero rows.
    #[error("concurrent update conflict on task {0}")]
    Conflict(String),

    #[error("no eligible candidates for task {0}")]
    NoCandidates(String),

    #[error("worker {worker_id} is not an eligible candidate for task {task_id}")]
    WorkerNotEligible { task_id: String, worker_id: String },

    #[error("flow '{flow}' exceeded its {limit_ms}ms timeout")]
    Timeout { flow: String, limit_ms: u64 },

    #[error("flow not registered: {0}")]
    FlowNotFound(String),

    #[error("upstream unavailable: {0}")]
    Upstream(String),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl DispatchError {
    /// Stable machine-readable code returned alongside the human message.
    pub fn code(&self) -> &'static str {
        match self {
            DispatchError::NotInitialized => "not_initialized",
            DispatchError::TaskNotFound(_) => "task_not_found",
            DispatchError::WorkerNotFound(_) => "worker_not_found",
            DispatchError::Forbidden(_) => "forbidden",
            DispatchError::InvalidTransition { .. } => "invalid_transition",
            DispatchError::InvalidStatus { .. } => "invalid_status",
            DispatchError::AlreadyAllocated(_) => "already_allocated",
            DispatchError::Conflict(_) => "conflict",
            DispatchError::NoCandidates(_) => "no_candidates",
            DispatchError::WorkerNotEligible { .. } => "worker_not_eligible",
            DispatchError::Timeout { .. } => "timeout",
            DispatchError::FlowNotFound(_) => "flow_not_found",
            DispatchError::Upstream(_) => "upstream_unavailable",
            DispatchError::InvalidInput(_) => "invalid_input",
            DispatchError::Io(_) => "io",
            DispatchError::Yaml(_) => "yaml",
            DispatchError::Json(_) => "json",
        }
    }

    pub(crate) fn upstream(e: impl std::fmt::Display) -> Self {
        DispatchError::Upstream(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, DispatchError>;
