//! Append-only audit ledger entries.
//!
//! Every entry shares one envelope (`actor_id`, `target_type`, `target_id`,
//! `created_at`) and carries a typed payload selected by its `action` tag.
//! On the wire and on disk the payload sits under `metadata`:
//!
//! ```text
//! { "id": "...", "actor_id": "u-1", "target_type": "task", "target_id": "T1",
//!   "created_at": "...", "action": "PLATFORM_DISPATCH_ALLOCATE",
//!   "metadata": { "task_id": "T1", "worker_id": "W1", ... } }
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::trace::{DecisionTrace, LearningRecord};
use crate::types::TaskType;

// ---------------------------------------------------------------------------
// AuditAction
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AuditAction {
    #[serde(rename = "PLATFORM_DISPATCH_ALLOCATE")]
    DispatchAllocate,
    #[serde(rename = "PLATFORM_DECISION_TRACE")]
    DecisionTrace,
    #[serde(rename = "PLATFORM_LEARNING_RECORD")]
    LearningRecord,
    #[serde(rename = "TASK_STATUS_CHANGED")]
    TaskStatusChanged,
}

impl AuditAction {
    pub fn as_str(self) -> &'static str {
        match self {
            AuditAction::DispatchAllocate => "PLATFORM_DISPATCH_ALLOCATE",
            AuditAction::DecisionTrace => "PLATFORM_DECISION_TRACE",
            AuditAction::LearningRecord => "PLATFORM_LEARNING_RECORD",
            AuditAction::TaskStatusChanged => "TASK_STATUS_CHANGED",
        }
    }

    /// Tags Replay reads when reconstructing a task's history.
    pub fn replay_set() -> &'static [AuditAction] {
        &[
            AuditAction::DecisionTrace,
            AuditAction::LearningRecord,
            AuditAction::DispatchAllocate,
            AuditAction::TaskStatusChanged,
        ]
    }
}

impl fmt::Display for AuditAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// AuditEvent
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AllocationEvent {
    pub task_id: String,
    pub task_type: TaskType,
    pub worker_id: String,
    pub table: String,
    pub from_status: String,
    pub to_status: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub decision_trace: Option<serde_json::Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusChangeEvent {
    pub task_id: String,
    pub task_type: TaskType,
    pub from_status: String,
    pub to_status: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", content = "metadata")]
pub enum AuditEvent {
    #[serde(rename = "PLATFORM_DISPATCH_ALLOCATE")]
    DispatchAllocate(AllocationEvent),
    #[serde(rename = "PLATFORM_DECISION_TRACE")]
    DecisionTrace(DecisionTrace),
    #[serde(rename = "PLATFORM_LEARNING_RECORD")]
    LearningRecord(LearningRecord),
    #[serde(rename = "TASK_STATUS_CHANGED")]
    TaskStatusChanged(StatusChangeEvent),
}

impl AuditEvent {
    pub fn action(&self) -> AuditAction {
        match self {
            AuditEvent::DispatchAllocate(_) => AuditAction::DispatchAllocate,
            AuditEvent::DecisionTrace(_) => AuditAction::DecisionTrace,
            AuditEvent::LearningRecord(_) => AuditAction::LearningRecord,
            AuditEvent::TaskStatusChanged(_) => AuditAction::TaskStatusChanged,
        }
    }

    /// The `metadata.task_id` of the payload.
    pub fn task_id(&self) -> &str {
        match self {
            AuditEvent::DispatchAllocate(e) => &e.task_id,
            AuditEvent::DecisionTrace(t) => &t.task_id,
            AuditEvent::LearningRecord(r) => &r.task_id,
            AuditEvent::TaskStatusChanged(e) => &e.task_id,
        }
    }
}

// ---------------------------------------------------------------------------
// AuditLogEntry
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditLogEntry {
    pub id: Uuid,
    pub actor_id: Option<String>,
    pub target_type: String,
    pub target_id: String,
    pub created_at: DateTime<Utc>,
    #[serde(flatten)]
    pub event: AuditEvent,
}

impl AuditLogEntry {
    /// Build an entry targeting the task named by the payload.
    pub fn for_task(actor_id: Option<String>, event: AuditEvent) -> Self {
        Self {
            id: Uuid::new_v4(),
            actor_id,
            target_type: "task".to_string(),
            target_id: event.task_id().to_string(),
            created_at: Utc::now(),
            event,
        }
    }

    pub fn action(&self) -> AuditAction {
        self.event.action()
    }

    /// True when the entry is about `task_id`, by target or by payload.
    pub fn concerns(&self, task_id: &str) -> bool {
        self.target_id == task_id || self.event.task_id() == task_id
    }
}

// ---------------------------------------------------------------------------
// AuditQuery
// ---------------------------------------------------------------------------

/// Filter for [`crate::store::AuditLog::query`]. Results come back newest-first.
#[derive(Debug, Clone, Default)]
pub struct AuditQuery {
    pub task_id: Option<String>,
    /// Empty means every action.
    pub actions: Vec<AuditAction>,
    pub limit: Option<usize>,
}

impl AuditQuery {
    pub fn for_task(task_id: impl Into<String>, actions: &[AuditAction]) -> Self {
        Self {
            task_id: Some(task_id.into()),
            actions: actions.to_vec(),
            limit: None,
        }
    }

    pub fn matches(&self, entry: &AuditLogEntry) -> bool {
        let task_ok = self
            .task_id
            .as_deref()
            .map(|id| entry.concerns(id))
            .unwrap_or(true);
        let action_ok = self.actions.is_empty() || self.actions.contains(&entry.action());
        task_ok && action_ok
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn status_change(task_id: &str) -> AuditLogEntry {
        AuditLogEntry::for_task(
            Some("u-1".into()),
            AuditEvent::TaskStatusChanged(StatusChangeEvent {
                task_id: task_id.into(),
                task_type: TaskType::Delivery,
                from_status: "delivering".into(),
                to_status: "completed".into(),
            }),
        )
    }

    #[test]
    fn entry_serializes_action_and_metadata_at_top_level() {
        let entry = status_change("T1");
        let json = serde_json::to_value(&entry).unwrap();
        assert_eq!(json["action"], "TASK_STATUS_CHANGED");
        assert_eq!(json["metadata"]["task_id"], "T1");
        assert_eq!(json["target_id"], "T1");

        let back: AuditLogEntry = serde_json::from_value(json).unwrap();
        assert_eq!(back, entry);
    }

    #[test]
    fn query_filters_by_task_and_action() {
        let entry = status_change("T1");
        assert!(AuditQuery::for_task("T1", &[]).matches(&entry));
        assert!(!AuditQuery::for_task("T2", &[]).matches(&entry));
        assert!(!AuditQuery::for_task("T1", &[AuditAction::DecisionTrace]).matches(&entry));
        assert!(AuditQuery::default().matches(&entry));
    }
}
