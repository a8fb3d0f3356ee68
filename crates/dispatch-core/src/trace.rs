//! Decision traces, learning records, and replay.
//!
//! Both record kinds are conventions over the audit log: a trace is a
//! `PLATFORM_DECISION_TRACE` entry, a learning record a
//! `PLATFORM_LEARNING_RECORD` entry. Replay reads them back together with
//! allocation and status-change entries for one task.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::audit::{AuditAction, AuditEvent, AuditLogEntry, AuditQuery};
use crate::error::{DispatchError, Result};
use crate::matcher::Candidate;
use crate::orchestrator::FlowError;
use crate::store::AuditLog;
use crate::strategy::Score;
use crate::types::TaskType;

// ---------------------------------------------------------------------------
// DecisionTrace
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TraceOutcome {
    pub committed: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub table: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<FlowError>,
}

/// Inputs and outputs of one orchestration run for a task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecisionTrace {
    pub task_id: String,
    #[serde(default)]
    pub task_type: Option<TaskType>,
    #[serde(default)]
    pub tenant_id: Option<String>,
    pub flow: String,
    #[serde(default)]
    pub candidates: Vec<Candidate>,
    #[serde(default)]
    pub scores: Vec<Score>,
    pub selected_worker_id: Option<String>,
    #[serde(default)]
    pub model_version: Option<String>,
    pub outcome: TraceOutcome,
    pub started_at: DateTime<Utc>,
    pub duration_ms: u64,
}

// ---------------------------------------------------------------------------
// LearningRecord
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LearningOutcome {
    Completed,
    Failed,
    Cancelled,
    Late,
}

/// Observed result of an assignment, kept for later strategy tuning.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LearningRecord {
    pub task_id: String,
    pub worker_id: String,
    pub outcome: LearningOutcome,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metrics: Option<serde_json::Value>,
}

// ---------------------------------------------------------------------------
// TraceRecorder
// ---------------------------------------------------------------------------

pub struct TraceRecorder<'a> {
    audit: &'a dyn AuditLog,
}

impl<'a> TraceRecorder<'a> {
    pub fn new(audit: &'a dyn AuditLog) -> Self {
        Self { audit }
    }

    /// Persist a decision trace. Failures are logged, not returned: the run
    /// being traced has already taken effect.
    pub fn record(&self, trace: DecisionTrace, actor_id: Option<String>) -> Option<AuditLogEntry> {
        let committed = trace.outcome.committed;
        let entry = AuditLogEntry::for_task(actor_id, AuditEvent::DecisionTrace(trace));
        match self.audit.append(&entry) {
            Ok(()) => {
                tracing::debug!(task_id = %entry.target_id, committed, "decision trace recorded");
                Some(entry)
            }
            Err(e) => {
                tracing::warn!(
                    error = %e,
                    task_id = %entry.target_id,
                    "decision trace not recorded"
                );
                None
            }
        }
    }

    /// Append a learning record. Unlike traces this is the caller's primary
    /// write, so errors propagate.
    pub fn record_learning(
        &self,
        record: LearningRecord,
        actor_id: Option<String>,
    ) -> Result<AuditLogEntry> {
        if record.task_id.trim().is_empty() || record.worker_id.trim().is_empty() {
            return Err(DispatchError::InvalidInput(
                "task_id and worker_id are required".into(),
            ));
        }
        let entry = AuditLogEntry::for_task(actor_id, AuditEvent::LearningRecord(record));
        self.audit.append(&entry)?;
        Ok(entry)
    }
}

// ---------------------------------------------------------------------------
// Replay
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize)]
pub struct Replay {
    pub task_id: String,
    pub decision_trace: Option<AuditLogEntry>,
    pub learning_record: Option<AuditLogEntry>,
    /// Every related entry, newest first.
    pub all_related: Vec<AuditLogEntry>,
}

impl Replay {
    /// The typed trace payload of [`Replay::decision_trace`].
    pub fn trace(&self) -> Option<&DecisionTrace> {
        match self.decision_trace.as_ref().map(|e| &e.event) {
            Some(AuditEvent::DecisionTrace(t)) => Some(t),
            _ => None,
        }
    }
}

/// Reconstruct what happened to `task_id` from the audit log. Read-only; a
/// task with no entries replays as empty.
///
/// `decision_trace` is the newest committed trace. Failed runs appear only in
/// `all_related`.
pub fn replay_task(audit: &dyn AuditLog, task_id: &str) -> Result<Replay> {
    let all_related = audit.query(&AuditQuery::for_task(task_id, AuditAction::replay_set()))?;
    let decision_trace = all_related
        .iter()
        .find(|e| matches!(&e.event, AuditEvent::DecisionTrace(t) if t.outcome.committed))
        .cloned();
    let learning_record = all_related
        .iter()
        .find(|e| e.action() == AuditAction::LearningRecord)
        .cloned();
    Ok(Replay {
        task_id: task_id.to_string(),
        decision_trace,
        learning_record,
        all_related,
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
