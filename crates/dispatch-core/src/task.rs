use crate::error::DispatchError;
use crate::types::{TaskStatus, TaskType};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A dispatchable unit of delivery or repair work.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawTask")]
pub struct Task {
    pub id: String,
    pub task_type: TaskType,
    /// `None` only for tasks owned by the platform itself.
    pub tenant_id: Option<String>,
    pub status: TaskStatus,
    pub assigned_worker_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub zone: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub required_skills: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Task {
    pub fn new(id: impl Into<String>, task_type: TaskType, tenant_id: Option<String>) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            task_type,
            tenant_id,
            status: task_type.initial_status(),
            assigned_worker_id: None,
            title: None,
            zone: None,
            required_skills: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn with_zone(mut self, zone: impl Into<String>) -> Self {
        self.zone = Some(zone.into());
        self
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn with_skills(mut self, skills: Vec<String>) -> Self {
        self.required_skills = skills;
        self
    }
}

/// Fields a conditional status update may set alongside the status.
#[derive(Debug, Clone, Default)]
pub struct TaskPatch {
    pub assigned_worker_id: Option<String>,
}

// ---------------------------------------------------------------------------
// Deserialization: the status vocabulary depends on `task_type`
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
struct RawTask {
    id: String,
    task_type: TaskType,
    tenant_id: Option<String>,
    status: String,
    assigned_worker_id: Option<String>,
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    zone: Option<String>,
    #[serde(default)]
    required_skills: Vec<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<RawTask> for Task {
    type Error = DispatchError;

    fn try_from(raw: RawTask) -> Result<Self, Self::Error> {
        Ok(Task {
            status: TaskStatus::parse(raw.task_type, &raw.status)?,
            id: raw.id,
            task_type: raw.task_type,
            tenant_id: raw.tenant_id,
            assigned_worker_id: raw.assigned_worker_id,
            title: raw.title,
            zone: raw.zone,
            required_skills: raw.required_skills,
            created_at: raw.created_at,
            updated_at: raw.updated_at,
        })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
